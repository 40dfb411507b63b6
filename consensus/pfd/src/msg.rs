use serde::{Deserialize, Serialize};
use types::Replica;

/// The detector's only wire message: an "I am alive" beacon.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum ProtMsg {
    Heartbeat(Replica),
}
