//! Per-connection request loop.

use std::sync::Arc;

use uuid::Uuid;

use super::registry::ChannelRegistry;
use crate::protocol::{ClientMessage, Frame, ServerMessage};
use crate::transport::Link;

/// Serve one connection subscribed to `path` until its inbound side closes
/// or the channel shuts down.
///
/// Action requests run as their own tasks so a slow handler never delays the
/// next request on the same connection. A handler still running when the
/// connection goes away completes, and its acknowledgement is dropped.
pub async fn run(registry: Arc<ChannelRegistry>, path: String, link: Link) {
    let id = Uuid::new_v4();
    tracing::info!(target: "woolly::session", connection = %id, %path, "connection opened");

    let channel = match registry.subscribe(&path, id, link.outbound.clone()).await {
        Ok(channel) => channel,
        Err(e) => {
            tracing::info!(target: "woolly::session", connection = %id, %path, error = %e, "subscription refused");
            send(&link.outbound, ServerMessage::Error { message: e.to_string() }).await;
            link.outbound.close();
            return;
        }
    };

    let closed = channel.closed();
    tokio::pin!(closed);

    loop {
        let frame = tokio::select! {
            frame = link.inbound.recv() => match frame {
                Ok(frame) => frame,
                Err(_) => break,
            },
            _ = &mut closed => break,
        };

        let request = match ClientMessage::from_frame(frame) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(target: "woolly::session", connection = %id, error = %e, "ignoring frame");
                continue;
            }
        };

        let ClientMessage::Action {
            id: request_id,
            name,
            params,
        } = request;
        let channel = channel.clone();
        let outbound = link.outbound.clone();
        tokio::spawn(async move {
            let result = channel.dispatch(&name, params).await;
            send(
                &outbound,
                ServerMessage::Ack {
                    id: request_id,
                    result,
                },
            )
            .await;
        });
    }

    channel.leave(id);
    link.outbound.close();
    tracing::info!(target: "woolly::session", connection = %id, %path, "connection closed");
}

async fn send(outbound: &async_channel::Sender<Frame>, message: ServerMessage) {
    match message.into_frame() {
        Ok(frame) => {
            // A closed link only means the peer already left.
            let _ = outbound.send(frame).await;
        }
        Err(e) => {
            tracing::warn!(target: "woolly::session", error = %e, "failed to encode message");
        }
    }
}
