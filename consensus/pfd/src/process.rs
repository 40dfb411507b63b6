use types::WrapperMsg;

use crate::{Context, ProtMsg};

impl Context {
    pub(crate) async fn process_msg(&mut self, wrapper_msg: WrapperMsg<ProtMsg>) {
        log::trace!("Received protocol msg: {:?}", wrapper_msg);
        match wrapper_msg.protmsg {
            ProtMsg::Heartbeat(origin) => {
                log::trace!("Received Heartbeat from node {}", origin);
                self.record_heartbeat(origin);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use types::WrapperMsg;

    use crate::context::testutil::test_context;
    use crate::ProtMsg;

    #[tokio::test]
    async fn heartbeat_refreshes_last_seen() {
        let (mut context, _wires) = test_context(3, 1, 0, 18430);
        assert!(!context.last_seen.contains_key(&1));
        let wrapper = WrapperMsg::new(ProtMsg::Heartbeat(1), 1);
        context.process_msg(wrapper).await;
        assert!(context.last_seen.contains_key(&1));
    }
}
