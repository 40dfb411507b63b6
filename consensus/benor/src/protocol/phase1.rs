use types::Replica;

use crate::{Context, Proposal, ProtMsg, RoundState, BOTTOM};

impl Context {
    /// Records a Phase1 vote and advances the instance as far as the recorded
    /// votes allow.
    pub(crate) async fn handle_phase1(&mut self, origin: Replica, prop: Proposal) {
        if prop.timestamp <= self.decided_timestamp {
            log::trace!("Dropping stale Phase1 for instance {}", prop.timestamp);
            return;
        }
        let mut join_echo = None;
        if prop.timestamp > self.started_timestamp {
            if let Some(decided) = self.decisions.get(&prop.timestamp).copied() {
                self.started_timestamp = prop.timestamp;
                self.finalize(prop.timestamp, decided).await;
                return;
            }
            // Another process is ahead of us. Adopt its instance and its
            // round, vote its value as our own estimate.
            log::info!(
                "Joining instance {} at round {} with value {}",
                prop.timestamp,
                prop.phase_timestamp,
                prop.value
            );
            self.started_timestamp = prop.timestamp;
            self.instances.insert(
                prop.timestamp,
                RoundState::new(prop.value, prop.phase_timestamp),
            );
            join_echo = Some(Proposal::new(prop.value, prop.timestamp, prop.phase_timestamp));
        }
        match self.instances.get_mut(&prop.timestamp) {
            Some(instance) => {
                instance.add_phase1(prop.phase_timestamp, origin, prop.value);
            }
            None => {
                log::trace!("No live instance {} for Phase1", prop.timestamp);
                return;
            }
        }
        if let Some(echo) = join_echo {
            self.broadcast(ProtMsg::Phase1(echo)).await;
        }
        self.advance(prop.timestamp).await;
    }

    /// This process's Phase2 vote, due once the current round's Phase1 bucket
    /// holds a strict majority: the common value if the bucket is unanimous,
    /// BOTTOM otherwise. Fires at most once per round.
    pub(crate) fn phase1_majority(&mut self, timestamp: usize) -> Option<Proposal> {
        let instance = self.instances.get_mut(&timestamp)?;
        if instance.phase2_sent {
            return None;
        }
        let round = instance.phase_timestamp;
        let vstar = {
            let quorum = instance.phase1_quorum(round)?;
            if quorum.len() <= self.num_nodes / 2 {
                return None;
            }
            let mut values = quorum.values();
            let first = values.next().copied()?;
            if values.all(|v| *v == first) {
                first
            } else {
                BOTTOM
            }
        };
        instance.phase2_sent = true;
        Some(Proposal::new(vstar, timestamp, round))
    }
}

#[cfg(test)]
mod tests {
    use crate::context::testutil::{next_broadcast, test_context};
    use crate::{Proposal, ProtMsg, RoundState, BOTTOM};

    #[tokio::test]
    async fn unanimous_majority_votes_the_common_value() {
        let (mut context, mut wires) = test_context(5, 1, 0);
        context.started_timestamp = 1;
        context.instances.insert(1, RoundState::new(7, 0));

        for origin in 1..=3 {
            context
                .handle_phase1(origin, Proposal::new(7, 1, 0))
                .await;
        }
        match next_broadcast(&mut wires) {
            Some(ProtMsg::Phase2(vote)) => {
                assert_eq!(vote.value, 7);
                assert_eq!(vote.timestamp, 1);
                assert_eq!(vote.phase_timestamp, 0);
            }
            other => panic!("Expected a Phase2 broadcast, got {:?}", other),
        }
        assert!(next_broadcast(&mut wires).is_none());
    }

    #[tokio::test]
    async fn split_majority_votes_bottom() {
        let (mut context, mut wires) = test_context(5, 1, 0);
        context.started_timestamp = 1;
        context.instances.insert(1, RoundState::new(7, 0));

        for (origin, value) in [(1, 7), (2, 8), (3, 9)] {
            context
                .handle_phase1(origin, Proposal::new(value, 1, 0))
                .await;
        }
        match next_broadcast(&mut wires) {
            Some(ProtMsg::Phase2(vote)) => assert_eq!(vote.value, BOTTOM),
            other => panic!("Expected a Phase2 broadcast, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn phase2_vote_goes_out_once_per_round() {
        let (mut context, mut wires) = test_context(5, 1, 0);
        context.started_timestamp = 1;
        context.instances.insert(1, RoundState::new(7, 0));

        for origin in 1..=4 {
            context
                .handle_phase1(origin, Proposal::new(7, 1, 0))
                .await;
        }
        assert!(matches!(
            next_broadcast(&mut wires),
            Some(ProtMsg::Phase2(_))
        ));
        assert!(next_broadcast(&mut wires).is_none());
    }

    #[tokio::test]
    async fn phase1_ahead_of_us_makes_us_join_and_echo() {
        let (mut context, mut wires) = test_context(5, 1, 0);
        context
            .handle_phase1(3, Proposal::new(9, 2, 1))
            .await;

        assert_eq!(context.started_timestamp, 2);
        let instance = context.instances.get(&2).unwrap();
        assert_eq!(instance.phase_timestamp, 1);
        match next_broadcast(&mut wires) {
            Some(ProtMsg::Phase1(echo)) => {
                assert_eq!(echo.value, 9);
                assert_eq!(echo.timestamp, 2);
                assert_eq!(echo.phase_timestamp, 1);
            }
            other => panic!("Expected a Phase1 echo, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn stale_phase1_is_dropped() {
        let (mut context, mut wires) = test_context(5, 1, 0);
        context.started_timestamp = 3;
        context.decided_timestamp = 3;

        context
            .handle_phase1(1, Proposal::new(7, 3, 0))
            .await;
        assert!(context.instances.is_empty());
        assert!(next_broadcast(&mut wires).is_none());
    }
}
