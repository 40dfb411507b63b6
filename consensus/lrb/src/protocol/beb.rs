use types::{MessageId, Replica, WrapperMsg};

use crate::{Context, ProtMsg};

impl Context {
    /// Reliable-broadcast entry point for the layer above: stamp the payload
    /// with the next MessageId of this process and fan it out best-effort.
    /// The local copy goes through the same delivery path as everyone else's.
    pub async fn rb_broadcast(&mut self, payload: Vec<u8>) {
        let id = MessageId::new(self.myid, self.seq_number);
        self.seq_number += 1;
        log::debug!("Broadcasting message {:?}", id);
        self.beb_broadcast(ProtMsg::Gossip(id, payload.clone())).await;
        self.beb_deliver(id, payload).await;
    }

    /// Best-effort fan-out: one point-to-point send per member, no delivery
    /// guarantee. A crash mid-loop leaves a subset of peers without the
    /// message; the retransmission path makes up for that.
    pub async fn beb_broadcast(&mut self, protmsg: ProtMsg) {
        let replicas: Vec<Replica> = self.processes.iter().map(|p| p.id).collect();
        for replica in replicas {
            if self.simulate_crash_fault(replica) {
                // Simulates a crash fault
                continue;
            }
            if replica != self.myid {
                let wrapper_msg = WrapperMsg::new(protmsg.clone(), self.myid);
                let cancel_handler = self.net_send.send(replica, wrapper_msg).await;
                self.add_cancel_handler(cancel_handler);
            }
        }
    }
}
