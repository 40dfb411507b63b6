use std::collections::HashSet;

use fnv::FnvHashMap;
use types::{MessageId, Replica};

/// Book-keeping of the lazy reliable broadcast layer: the dedup set, the
/// per-origin delivery logs that feed retransmission, and the quiescence
/// buffer. A log is dropped once its origin's history has been relayed once.
pub struct RbState {
    pub delivered: HashSet<MessageId>,
    pub from_log: FnvHashMap<Replica, Vec<(MessageId, Vec<u8>)>>,

    pub buffering: bool,
    pub buffered: Vec<(MessageId, Vec<u8>)>,
}

impl RbState {
    pub fn new() -> RbState {
        RbState {
            delivered: HashSet::default(),
            from_log: FnvHashMap::default(),

            buffering: false,
            buffered: Vec::new(),
        }
    }
}

impl Default for RbState {
    fn default() -> Self {
        Self::new()
    }
}
