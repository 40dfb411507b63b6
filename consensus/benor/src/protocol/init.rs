use lrb::RbRequest;
use tokio::sync::oneshot;

use crate::{ClientRequest, Context, Proposal, ProtMsg, RoundState};

impl Context {
    pub(crate) async fn handle_client_request(&mut self, req: ClientRequest) {
        match req {
            ClientRequest::Propose(value, resp) => self.handle_propose(value, resp).await,
            ClientRequest::ArmQuiescence(window) => {
                if self
                    .rb_req_send
                    .send(RbRequest::ArmQuiescence(window))
                    .await
                    .is_err()
                {
                    log::error!("Broadcast layer has closed its request channel");
                }
            }
        }
    }

    /// A proposal targets the instance after the last one this process
    /// started. An instance the rest of the group already decided answers
    /// from the decision record without another protocol run.
    pub(crate) async fn handle_propose(&mut self, value: i64, resp: oneshot::Sender<i64>) {
        let candidate = self.started_timestamp + 1;
        if let Some(decided) = self.decisions.get(&candidate).copied() {
            log::debug!("Instance {} decided before we reached it", candidate);
            self.started_timestamp = candidate;
            self.waiters.entry(candidate).or_default().push(resp);
            self.finalize(candidate, decided).await;
            return;
        }
        self.started_timestamp = candidate;
        self.waiters.entry(candidate).or_default().push(resp);
        log::info!("Proposing value {} for instance {}", value, candidate);
        self.instances.insert(candidate, RoundState::new(value, 0));
        self.broadcast(ProtMsg::Phase1(Proposal::new(value, candidate, 0)))
            .await;
    }

    /// All consensus traffic rides the reliable broadcast below, own votes
    /// included: they loop back through self-delivery and are counted there.
    pub(crate) async fn broadcast(&mut self, msg: ProtMsg) {
        match bincode::serialize(&msg) {
            Ok(payload) => {
                if self
                    .rb_req_send
                    .send(RbRequest::Broadcast(payload))
                    .await
                    .is_err()
                {
                    log::error!("Broadcast layer has closed its request channel");
                }
            }
            Err(e) => log::error!("Failed to serialize {:?}: {}", msg, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::oneshot;

    use crate::context::testutil::{next_broadcast, test_context};
    use crate::ProtMsg;

    #[tokio::test]
    async fn propose_starts_an_instance_with_a_phase1_vote() {
        let (mut context, mut wires) = test_context(3, 1, 0);
        let (resp_send, _resp_recv) = oneshot::channel();
        context.handle_propose(7, resp_send).await;

        assert_eq!(context.started_timestamp, 1);
        assert!(context.instances.contains_key(&1));
        match next_broadcast(&mut wires) {
            Some(ProtMsg::Phase1(prop)) => {
                assert_eq!(prop.value, 7);
                assert_eq!(prop.timestamp, 1);
                assert_eq!(prop.phase_timestamp, 0);
            }
            other => panic!("Expected a Phase1 broadcast, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn recorded_decisions_answer_proposals_without_a_new_run() {
        let (mut context, mut wires) = test_context(3, 1, 0);
        // The group decided instance 1 before this process proposed anything.
        context.handle_decide(1, 1, 42).await;
        assert_eq!(context.decisions.get(&1), Some(&42));

        let (resp_send, resp_recv) = oneshot::channel();
        context.handle_propose(7, resp_send).await;
        assert_eq!(resp_recv.await.unwrap(), 42);
        assert_eq!(context.started_timestamp, 1);
        assert_eq!(context.decided_timestamp, 1);
        assert!(next_broadcast(&mut wires).is_none());
        assert_eq!(wires.decide_recv.recv().await, Some((1, 42)));
    }
}
