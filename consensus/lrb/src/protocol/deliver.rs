use types::{MessageId, Replica};

use crate::{Context, ProtMsg};

impl Context {
    /// Delivery path shared by fresh receptions, local copies of our own
    /// broadcasts and released buffer entries.
    pub async fn beb_deliver(&mut self, id: MessageId, payload: Vec<u8>) {
        if self.rb_state.buffering {
            log::debug!("Quiescence window armed, holding back message {:?}", id);
            self.rb_state.buffered.push((id, payload));
            return;
        }
        if !self.rb_state.delivered.insert(id) {
            log::trace!("Duplicate message {:?}, dropping", id);
            return;
        }
        self.rb_state
            .from_log
            .entry(id.origin)
            .or_default()
            .push((id, payload.clone()));
        log::debug!("Delivering message {:?} upward", id);
        if self.deliver_send.send((id.origin, payload)).await.is_err() {
            log::error!("Upper layer has closed its delivery channel");
            return;
        }
        // A message whose origin already crashed may not have reached
        // everyone: relay that origin's history on its behalf.
        if !self.processes.is_correct(id.origin) {
            self.retransmit_log(id.origin).await;
        }
    }

    /// Re-broadcasts every logged message of `origin`, then drops the log:
    /// each entry needs to be relayed at most once.
    pub async fn retransmit_log(&mut self, origin: Replica) {
        let entries = self.rb_state.from_log.remove(&origin).unwrap_or_default();
        if entries.is_empty() {
            return;
        }
        log::info!(
            "Retransmitting {} message(s) of process {} on its behalf",
            entries.len(),
            origin
        );
        for (id, payload) in entries {
            self.beb_broadcast(ProtMsg::Gossip(id, payload)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::context::testutil::test_context;
    use types::MessageId;

    #[tokio::test]
    async fn duplicate_messages_are_delivered_at_most_once() {
        let (mut context, mut wires) = test_context(3, 1, 0, 18300);
        let id = MessageId::new(1, 0);
        context.beb_deliver(id, b"alpha".to_vec()).await;
        context.beb_deliver(id, b"alpha".to_vec()).await;

        let (origin, payload) = wires.deliver_recv.recv().await.unwrap();
        assert_eq!(origin, 1);
        assert_eq!(payload, b"alpha".to_vec());
        assert!(wires.deliver_recv.try_recv().is_err());
    }

    #[tokio::test]
    async fn deliveries_are_logged_per_origin() {
        let (mut context, mut wires) = test_context(3, 1, 0, 18310);
        context.beb_deliver(MessageId::new(1, 0), b"a".to_vec()).await;
        context.beb_deliver(MessageId::new(1, 1), b"b".to_vec()).await;
        context.beb_deliver(MessageId::new(2, 0), b"c".to_vec()).await;

        assert_eq!(context.rb_state.from_log.get(&1).unwrap().len(), 2);
        assert_eq!(context.rb_state.from_log.get(&2).unwrap().len(), 1);
        for _ in 0..3 {
            assert!(wires.deliver_recv.recv().await.is_some());
        }
    }

    #[tokio::test]
    async fn own_broadcasts_are_self_delivered() {
        let (mut context, mut wires) = test_context(3, 1, 0, 18320);
        context.rb_broadcast(b"mine".to_vec()).await;
        let (origin, payload) = wires.deliver_recv.recv().await.unwrap();
        assert_eq!(origin, 0);
        assert_eq!(payload, b"mine".to_vec());
        assert_eq!(context.seq_number, 1);
    }
}
