use std::{
    net::SocketAddr,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Result};
use config::Node;
use fnv::{FnvHashMap, FnvHashSet};
use net::{Acknowledgement, CancelHandler, TcpReceiver, TcpReliableSender};
use tokio::sync::{
    mpsc::{unbounded_channel, Receiver, Sender, UnboundedReceiver},
    oneshot,
};
use types::{Replica, WrapperMsg};

use crate::{Handler, ProtMsg};

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(500);
pub const LIVENESS_TIMEOUT: Duration = Duration::from_millis(3000);

pub struct Context {
    /// Networking context
    pub net_send: TcpReliableSender<Replica, WrapperMsg<ProtMsg>, Acknowledgement>,
    pub net_recv: UnboundedReceiver<WrapperMsg<ProtMsg>>,
    /// Data context
    pub num_nodes: usize,
    pub myid: Replica,
    pub num_faults: usize,
    pub replicas: Vec<Replica>,
    /// Instant of the last heartbeat seen per peer
    pub last_seen: FnvHashMap<Replica, Instant>,
    /// Peers already reported crashed; reports are one-shot
    pub suspected: FnvHashSet<Replica>,
    /// Suspicion is off until the application starts the detector
    pub detecting: bool,
    /// Cancel Handlers
    pub cancel_handlers: Vec<CancelHandler<Acknowledgement>>,
    exit_rx: oneshot::Receiver<()>,
    /// Crash reports flow into the broadcast layer through here
    pub crash_send: Sender<Replica>,
    start_recv: Receiver<()>,
}

impl Context {
    pub fn spawn(
        config: Node,
        start_recv: Receiver<()>,
        crash_send: Sender<Replica>,
    ) -> Result<oneshot::Sender<()>> {
        let mut pfd_addrs: FnvHashMap<Replica, SocketAddr> = FnvHashMap::default();
        for (replica, address) in config.net_map.iter() {
            let address: SocketAddr = address
                .parse()
                .map_err(|e| anyhow!("Unable to parse address {}: {}", address, e))?;
            pfd_addrs.insert(*replica, address);
        }
        let my_address = to_listen_address(config.my_address()?.port());
        let replicas: Vec<Replica> = pfd_addrs.keys().copied().collect();

        let (tx_net_to_pfd, rx_net_to_pfd) = unbounded_channel();
        TcpReceiver::<Acknowledgement, WrapperMsg<ProtMsg>, _>::spawn(
            my_address,
            Handler::new(tx_net_to_pfd),
        );
        let pfd_net = TcpReliableSender::<Replica, WrapperMsg<ProtMsg>, Acknowledgement>::with_peers(
            pfd_addrs,
        );
        let (exit_tx, exit_rx) = oneshot::channel();

        tokio::spawn(async move {
            let mut c = Context {
                net_send: pfd_net,
                net_recv: rx_net_to_pfd,
                num_nodes: config.num_nodes,
                myid: config.id,
                num_faults: config.num_faults,
                replicas,
                last_seen: FnvHashMap::default(),
                suspected: FnvHashSet::default(),
                detecting: false,
                cancel_handlers: Vec::new(),
                exit_rx,
                crash_send,
                start_recv,
            };
            if let Err(e) = c.run().await {
                log::error!("Failure detector error: {}", e);
            }
        });
        Ok(exit_tx)
    }

    pub fn add_cancel_handler(&mut self, canc: CancelHandler<Acknowledgement>) {
        self.cancel_handlers.push(canc);
    }

    pub async fn run(&mut self) -> Result<()> {
        let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
        loop {
            tokio::select! {
                exit_val = &mut self.exit_rx => {
                    exit_val.map_err(anyhow::Error::new)?;
                    log::info!("Termination signal received by the failure detector. Exiting.");
                    break;
                },
                msg = self.net_recv.recv() => {
                    let msg = msg.ok_or_else(||
                        anyhow!("Networking layer has closed")
                    )?;
                    self.process_msg(msg).await;
                },
                started = self.start_recv.recv() => {
                    let _ = started.ok_or_else(||
                        anyhow!("Application has closed the detector start channel")
                    )?;
                    self.start_detection();
                },
                _ = ticker.tick() => {
                    self.broadcast_heartbeat().await;
                    if self.detecting {
                        self.scan().await;
                    }
                },
            };
        }
        Ok(())
    }

    pub async fn broadcast_heartbeat(&mut self) {
        // Acks from the previous beat are no longer interesting
        self.cancel_handlers.clear();
        let beacon = ProtMsg::Heartbeat(self.myid);
        let replicas = self.replicas.clone();
        for replica in replicas {
            if replica != self.myid {
                let wrapper_msg = WrapperMsg::new(beacon.clone(), self.myid);
                let cancel_handler = self.net_send.send(replica, wrapper_msg).await;
                self.add_cancel_handler(cancel_handler);
            }
        }
    }
}

pub fn to_listen_address(port: u16) -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], port))
}
