use std::net::{SocketAddr, SocketAddrV4};

use anyhow::{anyhow, Result};
use config::Node;
use fnv::FnvHashMap;
use net::{Acknowledgement, CancelHandler, TcpReceiver, TcpReliableSender};
use tokio::sync::{
    mpsc::{unbounded_channel, Receiver, Sender, UnboundedReceiver, UnboundedSender},
    oneshot,
};
use types::{ProcessSet, Replica, WrapperMsg};

use crate::{Handler, ProtMsg, RbRequest, RbState};

pub struct Context {
    /// Networking context
    pub net_send: TcpReliableSender<Replica, WrapperMsg<ProtMsg>, Acknowledgement>,
    pub net_recv: UnboundedReceiver<WrapperMsg<ProtMsg>>,
    /// Data context
    pub num_nodes: usize,
    pub myid: Replica,
    pub num_faults: usize,
    byz: bool,
    /// Membership with the per-process correct flags
    pub processes: ProcessSet,
    /// Sequence counter for messages originated by this process
    pub seq_number: u64,
    /// Dedup set, per-origin delivery logs and the quiescence buffer
    pub rb_state: RbState,
    /// Cancel Handlers
    pub cancel_handlers: Vec<CancelHandler<Acknowledgement>>,
    exit_rx: oneshot::Receiver<()>,
    /// Channels to the layer above and the failure detector
    pub req_recv: Receiver<RbRequest>,
    pub deliver_send: Sender<(Replica, Vec<u8>)>,
    pub crash_recv: Receiver<Replica>,
    pub crash_send: Sender<Replica>,
    /// One-shot quiescence timer ticks back into the reactor through here
    pub(crate) timer_tx: UnboundedSender<()>,
    timer_rx: UnboundedReceiver<()>,
}

impl Context {
    pub fn spawn(
        config: Node,
        req_recv: Receiver<RbRequest>,
        deliver_send: Sender<(Replica, Vec<u8>)>,
        crash_recv: Receiver<Replica>,
        crash_send: Sender<Replica>,
        byz: bool,
    ) -> Result<oneshot::Sender<()>> {
        let mut rb_addrs: FnvHashMap<Replica, SocketAddr> = FnvHashMap::default();
        for (replica, address) in config.net_map.iter() {
            let address: SocketAddr = address
                .parse()
                .map_err(|e| anyhow!("Unable to parse address {}: {}", address, e))?;
            rb_addrs.insert(*replica, address);
        }
        let my_address = to_socket_address("0.0.0.0", config.my_address()?.port());
        let processes = ProcessSet::new(rb_addrs.clone());

        // Setup networking
        let (tx_net_to_rb, rx_net_to_rb) = unbounded_channel();
        TcpReceiver::<Acknowledgement, WrapperMsg<ProtMsg>, _>::spawn(
            my_address,
            Handler::new(tx_net_to_rb),
        );
        let rb_net = TcpReliableSender::<Replica, WrapperMsg<ProtMsg>, Acknowledgement>::with_peers(
            rb_addrs,
        );
        let (exit_tx, exit_rx) = oneshot::channel();
        let (timer_tx, timer_rx) = unbounded_channel();

        tokio::spawn(async move {
            let mut c = Context {
                net_send: rb_net,
                net_recv: rx_net_to_rb,
                num_nodes: config.num_nodes,
                myid: config.id,
                num_faults: config.num_faults,
                byz,
                processes,
                seq_number: 0,
                rb_state: RbState::new(),
                cancel_handlers: Vec::new(),
                exit_rx,
                req_recv,
                deliver_send,
                crash_recv,
                crash_send,
                timer_tx,
                timer_rx,
            };
            if let Err(e) = c.run().await {
                log::error!("Broadcast layer error: {}", e);
            }
        });
        Ok(exit_tx)
    }

    pub fn add_cancel_handler(&mut self, canc: CancelHandler<Acknowledgement>) {
        self.cancel_handlers.push(canc);
    }

    pub async fn run(&mut self) -> Result<()> {
        loop {
            tokio::select! {
                exit_val = &mut self.exit_rx => {
                    exit_val.map_err(anyhow::Error::new)?;
                    log::info!("Termination signal received by the broadcast layer. Exiting.");
                    break;
                },
                msg = self.net_recv.recv() => {
                    let msg = msg.ok_or_else(||
                        anyhow!("Networking layer has closed")
                    )?;
                    self.process_msg(msg).await;
                },
                req = self.req_recv.recv() => {
                    let req = req.ok_or_else(||
                        anyhow!("Upper layer has closed its request channel")
                    )?;
                    self.handle_request(req).await;
                },
                crashed = self.crash_recv.recv() => {
                    let crashed = crashed.ok_or_else(||
                        anyhow!("Failure detector has closed its channel")
                    )?;
                    self.handle_crash(crashed).await;
                },
                _ = self.timer_rx.recv() => {
                    self.release_buffer().await;
                },
            };
        }
        Ok(())
    }

    async fn handle_request(&mut self, req: RbRequest) {
        match req {
            RbRequest::Broadcast(payload) => self.rb_broadcast(payload).await,
            RbRequest::ArmQuiescence(window) => self.arm_quiescence(window),
        }
    }

    /// True when a simulated crash fault should drop the send to `replica`.
    pub(crate) fn simulate_crash_fault(&self, replica: Replica) -> bool {
        self.byz && replica % 2 == 0
    }

    #[cfg(test)]
    pub(crate) async fn timer_rx_recv(&mut self) -> Option<()> {
        self.timer_rx.recv().await
    }
}

pub fn to_socket_address(ip_str: &str, port: u16) -> SocketAddr {
    let addr = SocketAddrV4::new(ip_str.parse().unwrap(), port);
    addr.into()
}
