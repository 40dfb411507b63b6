use types::Replica;

use crate::{Context, ProtMsg};

impl Context {
    /// Decodes and dispatches one payload the broadcast layer delivered.
    /// Undecodable payloads are dropped; a closed group never retries them.
    pub(crate) async fn process_delivery(&mut self, origin: Replica, payload: Vec<u8>) {
        let msg: ProtMsg = match bincode::deserialize(&payload) {
            Ok(msg) => msg,
            Err(e) => {
                log::warn!("Undecodable payload from process {}: {}", origin, e);
                return;
            }
        };
        log::trace!("Delivered {:?} from process {}", msg, origin);
        match msg {
            ProtMsg::Phase1(prop) => self.handle_phase1(origin, prop).await,
            ProtMsg::Phase2(prop) => self.handle_phase2(origin, prop).await,
            ProtMsg::Decide(timestamp, value) => {
                self.handle_decide(origin, timestamp, value).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::context::testutil::test_context;
    use crate::{Proposal, ProtMsg};

    #[tokio::test]
    async fn malformed_payloads_are_dropped() {
        let (mut context, _wires) = test_context(3, 1, 0);
        context
            .process_delivery(1, vec![0xff, 0xff, 0xff, 0xff, 0xff])
            .await;
        assert!(context.instances.is_empty());
    }

    #[tokio::test]
    async fn phase1_payloads_reach_the_state_machine() {
        let (mut context, _wires) = test_context(3, 1, 0);
        let payload =
            bincode::serialize(&ProtMsg::Phase1(Proposal::new(7, 1, 0))).unwrap();
        context.process_delivery(1, payload).await;
        assert!(context.instances.contains_key(&1));
    }
}
