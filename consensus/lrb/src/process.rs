use types::WrapperMsg;

use crate::{Context, ProtMsg};

impl Context {
    pub(crate) async fn process_msg(&mut self, wrapper_msg: WrapperMsg<ProtMsg>) {
        log::trace!("Received protocol msg: {:?}", wrapper_msg);
        // Closed membership: a sender outside the roster is a configuration
        // fault surfaced to the operator, never retried
        if self.processes.get(wrapper_msg.sender).is_none() {
            log::error!(
                "Message from unknown process {}, dropping: {:?}",
                wrapper_msg.sender,
                wrapper_msg.protmsg
            );
            return;
        }
        match wrapper_msg.protmsg {
            ProtMsg::Gossip(id, payload) => {
                log::debug!(
                    "Received Gossip {:?} relayed by node {}",
                    id,
                    wrapper_msg.sender
                );
                self.beb_deliver(id, payload).await;
            }
        }
    }
}
