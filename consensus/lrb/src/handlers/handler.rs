use async_trait::async_trait;
use net::Acknowledgement;
use tokio::sync::mpsc::UnboundedSender;

use types::WrapperMsg;

use crate::ProtMsg;

#[derive(Debug, Clone)]
pub struct Handler {
    rb_tx: UnboundedSender<WrapperMsg<ProtMsg>>,
}

impl Handler {
    pub fn new(rb_tx: UnboundedSender<WrapperMsg<ProtMsg>>) -> Self {
        Self { rb_tx }
    }
}

#[async_trait]
impl net::Handler<Acknowledgement, WrapperMsg<ProtMsg>> for Handler {
    async fn dispatch(&self, msg: WrapperMsg<ProtMsg>, writer: &mut net::Writer<Acknowledgement>) {
        // Forward the message
        let status = self.rb_tx.send(msg);
        if status.is_err() {
            log::error!(
                "Failed to send broadcast message to the channel because of {:?}",
                status.err().unwrap()
            );
        }
        // Acknowledge
        let status = writer.send(Acknowledgement::Pong).await;
        if status.is_err() {
            log::error!(
                "Failed to acknowledge the message because of {:?}",
                status.err().unwrap()
            );
        }
    }
}
