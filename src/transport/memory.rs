//! In-process links.

use super::Link;
use crate::config::FRAME_CHANNEL_CAPACITY;

/// Two connected endpoints: frames sent on one arrive on the other.
pub fn pair() -> (Link, Link) {
    pair_with_capacity(FRAME_CHANNEL_CAPACITY)
}

pub fn pair_with_capacity(capacity: usize) -> (Link, Link) {
    let (a_tx, a_rx) = async_channel::bounded(capacity);
    let (b_tx, b_rx) = async_channel::bounded(capacity);

    (
        Link {
            outbound: a_tx,
            inbound: b_rx,
        },
        Link {
            outbound: b_tx,
            inbound: a_rx,
        },
    )
}
