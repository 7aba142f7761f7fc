//! WebSocket bridge: JSON text frames in both directions.

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tungstenite::Message;

use super::Link;
use crate::config::FRAME_CHANNEL_CAPACITY;
use crate::protocol::Frame;

/// Spawn the reader and writer tasks for `stream` and return the frame link
/// that feeds them. The link's inbound side closes when the socket closes or
/// fails; dropping or closing every outbound sender closes the socket.
pub fn spawn_pump<S>(stream: WebSocketStream<S>) -> Link
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sink, mut source) = stream.split();
    let (out_tx, out_rx) = async_channel::bounded::<Frame>(FRAME_CHANNEL_CAPACITY);
    let (in_tx, in_rx) = async_channel::bounded::<Frame>(FRAME_CHANNEL_CAPACITY);

    let writer_rx = out_rx.clone();
    let write_task = tokio::spawn(async move {
        while let Ok(frame) = writer_rx.recv().await {
            let text = match frame.to_text() {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(target: "woolly::transport", event = %frame.event, error = %e, "dropping unserializable frame");
                    continue;
                }
            };
            if let Err(e) = sink.send(Message::Text(text)).await {
                tracing::debug!(target: "woolly::transport", error = %e, "socket write failed");
                break;
            }
        }
        let _ = sink.close().await;
    });

    tokio::spawn(async move {
        while let Some(message) = source.next().await {
            match message {
                Ok(Message::Text(text)) => match Frame::from_text(&text) {
                    Ok(frame) => {
                        if in_tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(target: "woolly::transport", error = %e, "ignoring malformed frame");
                    }
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(target: "woolly::transport", error = %e, "socket read failed");
                    break;
                }
            }
        }
        in_tx.close();
        out_rx.close();
        // Give the writer a chance to flush the close frame.
        let _ = write_task.await;
    });

    Link {
        outbound: out_tx,
        inbound: in_rx,
    }
}
