use fnv::FnvHashMap;
use rand::Rng;
use types::Replica;

use crate::{Context, Proposal, ProtMsg, BOTTOM};

/// What a full Phase2 quorum tells this process to do next.
enum Outcome {
    Decide(i64),
    Retry(i64),
    Coin(Vec<i64>),
}

impl Context {
    /// Records a Phase2 vote and advances the instance as far as the recorded
    /// votes allow.
    pub(crate) async fn handle_phase2(&mut self, origin: Replica, prop: Proposal) {
        if prop.timestamp <= self.decided_timestamp {
            log::trace!("Dropping stale Phase2 for instance {}", prop.timestamp);
            return;
        }
        match self.instances.get_mut(&prop.timestamp) {
            Some(instance) => {
                instance.add_phase2(prop.phase_timestamp, origin, prop.value);
            }
            None => {
                log::trace!("No live instance {} for Phase2", prop.timestamp);
                return;
            }
        }
        self.advance(prop.timestamp).await;
    }

    /// Drives an instance through every round its recorded votes can already
    /// resolve. Votes run ahead of the instance's own round, so a round bump
    /// must re-check buckets that filled up before the round was entered.
    pub(crate) async fn advance(&mut self, timestamp: usize) {
        loop {
            if let Some(vote) = self.phase1_majority(timestamp) {
                self.broadcast(ProtMsg::Phase2(vote)).await;
            }
            let outcome = match self.phase2_outcome(timestamp) {
                Some(outcome) => outcome,
                None => return,
            };
            match outcome {
                Outcome::Decide(value) => {
                    log::info!(
                        "Instance {} reached a decision quorum for {}",
                        timestamp,
                        value
                    );
                    self.broadcast(ProtMsg::Decide(timestamp, value)).await;
                    return;
                }
                Outcome::Retry(value) => {
                    self.next_round(timestamp, value).await;
                }
                Outcome::Coin(pool) => {
                    if pool.is_empty() {
                        log::warn!(
                            "No Phase1 votes to toss a coin over in instance {}",
                            timestamp
                        );
                        return;
                    }
                    let pick = pool[rand::thread_rng().gen_range(0..pool.len())];
                    log::debug!(
                        "All-BOTTOM round in instance {}, coin toss picked {}",
                        timestamp,
                        pick
                    );
                    self.next_round(timestamp, pick).await;
                }
            }
        }
    }

    /// Resolution of the current round, once its Phase2 bucket holds at least
    /// N-F votes: more than F copies of a value decide it, at least one copy
    /// carries it into the next round, all-BOTTOM falls back to a coin toss
    /// over the round's Phase1 votes. Fires at most once per round; a bucket
    /// can overshoot N-F when its votes arrived before the round was entered.
    fn phase2_outcome(&mut self, timestamp: usize) -> Option<Outcome> {
        let instance = self.instances.get_mut(&timestamp)?;
        if instance.evaluated {
            return None;
        }
        let round = instance.phase_timestamp;
        let outcome = {
            let votes = instance.phase2_quorum(round)?;
            if votes.len() < self.num_nodes - self.num_faults {
                return None;
            }
            let mut counts: FnvHashMap<i64, usize> = FnvHashMap::default();
            for value in votes.values() {
                if *value != BOTTOM {
                    *counts.entry(*value).or_default() += 1;
                }
            }
            match counts.iter().max_by_key(|(_, count)| **count) {
                Some((value, count)) if *count > self.num_faults => Outcome::Decide(*value),
                Some((value, _)) => Outcome::Retry(*value),
                None => Outcome::Coin(
                    instance
                        .phase1_quorum(round)
                        .map(|quorum| quorum.values().copied().collect())
                        .unwrap_or_default(),
                ),
            }
        };
        instance.evaluated = true;
        Some(outcome)
    }

    async fn next_round(&mut self, timestamp: usize, value: i64) {
        let next = {
            let instance = match self.instances.get_mut(&timestamp) {
                Some(instance) => instance,
                None => return,
            };
            instance.bump_round(value);
            Proposal::new(value, timestamp, instance.phase_timestamp)
        };
        log::debug!(
            "Instance {} moves to round {} with estimate {}",
            timestamp,
            next.phase_timestamp,
            next.value
        );
        self.broadcast(ProtMsg::Phase1(next)).await;
    }
}
