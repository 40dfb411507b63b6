use fnv::FnvHashMap;
use types::Replica;

/// Per-instance state: the current estimate, the round counter, and one vote
/// bucket per round and phase. First vote per process wins; votes for rounds
/// ahead of the current one are kept until the instance gets there.
pub struct RoundState {
    /// Current estimate carried into the next round
    pub value: i64,
    /// Round counter within the instance
    pub phase_timestamp: usize,
    phase1: FnvHashMap<usize, FnvHashMap<Replica, i64>>,
    phase2: FnvHashMap<usize, FnvHashMap<Replica, i64>>,
    /// The Phase2 vote for the current round has gone out
    pub phase2_sent: bool,
    /// The current round's Phase2 quorum has been evaluated
    pub evaluated: bool,
}

impl RoundState {
    pub fn new(value: i64, phase_timestamp: usize) -> Self {
        Self {
            value,
            phase_timestamp,
            phase1: FnvHashMap::default(),
            phase2: FnvHashMap::default(),
            phase2_sent: false,
            evaluated: false,
        }
    }

    /// Records a Phase1 vote and returns the size of that round's bucket.
    pub fn add_phase1(&mut self, round: usize, from: Replica, value: i64) -> usize {
        let bucket = self.phase1.entry(round).or_default();
        bucket.entry(from).or_insert(value);
        bucket.len()
    }

    /// Records a Phase2 vote and returns the size of that round's bucket.
    pub fn add_phase2(&mut self, round: usize, from: Replica, value: i64) -> usize {
        let bucket = self.phase2.entry(round).or_default();
        bucket.entry(from).or_insert(value);
        bucket.len()
    }

    pub fn phase1_quorum(&self, round: usize) -> Option<&FnvHashMap<Replica, i64>> {
        self.phase1.get(&round)
    }

    pub fn phase2_quorum(&self, round: usize) -> Option<&FnvHashMap<Replica, i64>> {
        self.phase2.get(&round)
    }

    /// Advances to the next round with a new estimate. Buckets of finished
    /// rounds are dropped, buckets of rounds still ahead are kept.
    pub fn bump_round(&mut self, value: i64) {
        self.phase_timestamp += 1;
        self.value = value;
        let current = self.phase_timestamp;
        self.phase1.retain(|round, _| *round >= current);
        self.phase2.retain(|round, _| *round >= current);
        self.phase2_sent = false;
        self.evaluated = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_vote_per_process_wins() {
        let mut state = RoundState::new(5, 0);
        assert_eq!(state.add_phase1(0, 1, 7), 1);
        assert_eq!(state.add_phase1(0, 1, 9), 1);
        assert_eq!(state.phase1_quorum(0).unwrap().get(&1), Some(&7));
    }

    #[test]
    fn bump_keeps_future_round_votes() {
        let mut state = RoundState::new(5, 0);
        state.add_phase1(0, 1, 7);
        state.add_phase1(1, 2, 8);
        state.phase2_sent = true;
        state.evaluated = true;

        state.bump_round(8);
        assert_eq!(state.phase_timestamp, 1);
        assert_eq!(state.value, 8);
        assert!(state.phase1_quorum(0).is_none());
        assert_eq!(state.phase1_quorum(1).unwrap().len(), 1);
        assert!(!state.phase2_sent);
        assert!(!state.evaluated);
    }
}
