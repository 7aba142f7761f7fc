//! Frame transport.
//!
//! The sync engine only needs a [`Link`]: a sender for outgoing frames and a
//! receiver for incoming ones. A closed receiver means the peer is gone.
//! [`memory::pair`] links two endpoints in-process; [`ws::spawn_pump`] bridges
//! a WebSocket stream.

pub mod memory;
pub mod ws;

use crate::protocol::Frame;

/// Identifies one connected subscriber.
pub type ConnectionId = uuid::Uuid;

/// One end of a bidirectional frame pipe.
#[derive(Debug, Clone)]
pub struct Link {
    pub outbound: async_channel::Sender<Frame>,
    pub inbound: async_channel::Receiver<Frame>,
}

impl Link {
    /// Close both directions. Frames already queued can still be drained.
    pub fn close(&self) {
        self.outbound.close();
        self.inbound.close();
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed() || self.inbound.is_closed()
    }
}
