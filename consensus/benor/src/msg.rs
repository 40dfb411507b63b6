use serde::{Deserialize, Serialize};

/// "No majority" sentinel. Real proposals are non-negative.
pub const BOTTOM: i64 = -1;

/// A vote in one round of one consensus instance. `timestamp` names the
/// instance, `phase_timestamp` the round within it.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Proposal {
    pub value: i64,
    pub timestamp: usize,
    pub phase_timestamp: usize,
}

impl Proposal {
    pub fn new(value: i64, timestamp: usize, phase_timestamp: usize) -> Self {
        Self {
            value,
            timestamp,
            phase_timestamp,
        }
    }
}

/*
 * Randomized binary-exchange consensus, one instance per timestamp:
 * 1. Phase1(v, ts, pts): everyone votes its current estimate; a strict
 *    majority of identical votes fixes v*, otherwise v* = BOTTOM
 * 2. Phase2(v*, ts, pts): exactly N-F votes are awaited; more than F
 *    copies of a value decide it, fewer restart with it, none at all
 *    restart with a coin toss over the round's Phase1 votes
 * 3. Decide(ts, v): terminal, rebroadcast so every process learns it
 */
#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum ProtMsg {
    Phase1(Proposal),
    Phase2(Proposal),
    Decide(usize, i64),
}
