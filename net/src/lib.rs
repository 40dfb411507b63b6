use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod plaintcp;
pub use plaintcp::{CancelHandler, TcpReceiver, TcpReliableSender, Writer};

/// Application-level receipt for a delivered frame. The reliable sender keeps
/// retransmitting a message until its acknowledgement arrives.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum Acknowledgement {
    Pong,
}

/// Inbound dispatch point of a [`TcpReceiver`]: decodes land here one at a
/// time per connection, and the handler acknowledges each through the writer.
#[async_trait]
pub trait Handler<Ack, Msg>: Clone + Send + Sync + 'static {
    async fn dispatch(&self, msg: Msg, writer: &mut Writer<Ack>);
}
