use crate::Replica;
use serde::{Deserialize, Serialize};

/// Identity of a broadcast message instance: the originating process and the
/// sequence number that process assigned to it. Sequence numbers grow
/// monotonically per origin, so the pair is unique across the group and is
/// the key for deduplication and retransmission.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId {
    pub origin: Replica,
    pub seq: u64,
}

impl MessageId {
    pub fn new(origin: Replica, seq: u64) -> Self {
        Self { origin, seq }
    }
}
