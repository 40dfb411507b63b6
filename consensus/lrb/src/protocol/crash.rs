use types::Replica;

use crate::Context;

impl Context {
    /// Crash signal from the failure detector. Marks the process faulty,
    /// relays its delivered history once, and forwards the signal upward
    /// unchanged. Repeated signals for the same process are no-ops.
    pub async fn handle_crash(&mut self, crashed: Replica) {
        if self.processes.get(crashed).is_none() {
            log::error!("Crash signal for unknown process {}, ignoring", crashed);
            return;
        }
        if !self.processes.mark_crashed(crashed) {
            log::debug!("Process {} was already marked crashed", crashed);
            return;
        }
        log::warn!("Process {} failed.", crashed);
        self.retransmit_log(crashed).await;
        if self.crash_send.send(crashed).await.is_err() {
            log::error!("Upper layer has closed its crash channel");
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::context::testutil::test_context;
    use crate::ProtMsg;
    use async_trait::async_trait;
    use net::{Acknowledgement, TcpReceiver, Writer};
    use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
    use types::{MessageId, WrapperMsg};

    #[derive(Debug, Clone)]
    struct CaptureHandler {
        tx: UnboundedSender<WrapperMsg<ProtMsg>>,
    }

    #[async_trait]
    impl net::Handler<Acknowledgement, WrapperMsg<ProtMsg>> for CaptureHandler {
        async fn dispatch(
            &self,
            msg: WrapperMsg<ProtMsg>,
            writer: &mut Writer<Acknowledgement>,
        ) {
            let _ = self.tx.send(msg);
            let _ = writer.send(Acknowledgement::Pong).await;
        }
    }

    /// The reliable-delivery scenario: a message from process 2 reaches this
    /// process only, then 2 is reported crashed. The layer must relay 2's
    /// history so the peer listening as process 1 receives it too.
    #[tokio::test]
    async fn crashed_origins_history_is_relayed_to_peers() {
        let base_port = 18330;
        let (mut context, mut wires) = test_context(3, 1, 0, base_port);

        // Stand up a real receiver where the roster expects process 1
        let (captured_tx, mut captured) = unbounded_channel();
        TcpReceiver::<Acknowledgement, WrapperMsg<ProtMsg>, _>::spawn(
            format!("127.0.0.1:{}", base_port + 1).parse().unwrap(),
            CaptureHandler { tx: captured_tx },
        );

        let id = MessageId::new(2, 0);
        context.beb_deliver(id, b"survivor".to_vec()).await;
        context.handle_crash(2).await;

        // The crash is forwarded upward unchanged
        assert_eq!(wires.crash_up_recv.recv().await, Some(2));

        let relayed = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            captured.recv(),
        )
        .await
        .expect("timed out waiting for the retransmission")
        .expect("capture channel closed");
        assert_eq!(relayed.sender, 0);
        let ProtMsg::Gossip(relayed_id, payload) = relayed.protmsg;
        assert_eq!(relayed_id, id);
        assert_eq!(payload, b"survivor".to_vec());

        // The log was consumed by the retransmission
        assert!(context.rb_state.from_log.get(&2).is_none());
    }

    #[tokio::test]
    async fn repeated_crash_signals_are_no_ops() {
        let (mut context, mut wires) = test_context(3, 1, 0, 18340);
        context.handle_crash(2).await;
        context.handle_crash(2).await;
        assert_eq!(wires.crash_up_recv.recv().await, Some(2));
        assert!(wires.crash_up_recv.try_recv().is_err());
    }

    /// Late messages from an already-crashed origin are relayed immediately
    /// on delivery.
    #[tokio::test]
    async fn late_messages_from_crashed_origins_are_relayed() {
        let (mut context, mut wires) = test_context(3, 1, 0, 18350);
        context.handle_crash(2).await;
        assert_eq!(wires.crash_up_recv.recv().await, Some(2));

        let id = MessageId::new(2, 7);
        context.beb_deliver(id, b"late".to_vec()).await;
        assert!(wires.deliver_recv.recv().await.is_some());
        // relayed-once: the log entry was consumed right after delivery
        assert!(context.rb_state.from_log.get(&2).is_none());
    }
}
