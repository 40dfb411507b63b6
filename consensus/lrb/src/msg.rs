use std::time::Duration;

use serde::{Deserialize, Serialize};
use types::MessageId;

/*
 * Lazy reliable broadcast over best-effort fan-out:
 * 1. rb-broadcast(m): stamp m with (origin, seq++), beb-send to everyone
 * 2. on first reception of an id: log it under its origin and deliver upward
 * 3. on a repeated id: drop (at-most-once delivery to the upper layer)
 * 4. on crash(p), or on delivering a message whose origin already crashed:
 *    re-broadcast p's logged history once on its behalf
 */
#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum ProtMsg {
    /// A broadcast payload stamped with the id its origin assigned to it.
    /// Retransmissions keep the original id so receivers deduplicate them.
    Gossip(MessageId, Vec<u8>),
}

/// Requests accepted from the layer above.
#[derive(Debug)]
pub enum RbRequest {
    /// Reliably broadcast an opaque payload to the whole group.
    Broadcast(Vec<u8>),
    /// Hold inbound messages in a side buffer until the window elapses, then
    /// release them all in receipt order.
    ArmQuiescence(Duration),
}
