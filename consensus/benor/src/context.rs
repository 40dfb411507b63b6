use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use config::Node;
use fnv::{FnvHashMap, FnvHashSet};
use lrb::RbRequest;
use tokio::sync::{
    mpsc::{channel, Receiver, Sender},
    oneshot,
};
use types::Replica;

use crate::{ClientRequest, ConsensusHandle, RoundState};

pub const CHANNEL_CAPACITY: usize = 10_000;
/// Port offset of the failure detector next to the broadcast listener.
pub const PFD_PORT_OFFSET: u16 = 150;
const LIVENESS_LOG_INTERVAL: Duration = Duration::from_secs(5);

pub struct Context {
    /// Data context
    pub num_nodes: usize,
    pub myid: Replica,
    pub num_faults: usize,
    /// Highest instance this process has started or joined
    pub started_timestamp: usize,
    /// Watermark: every instance at or below it has decided
    pub decided_timestamp: usize,
    /// In-flight instances, normally at most one
    pub instances: FnvHashMap<usize, RoundState>,
    /// Decision record, including instances this process has not reached
    /// yet; a propose that gets there is answered without a new run
    pub decisions: FnvHashMap<usize, i64>,
    /// Proposal response channels, woken once per decided instance
    pub waiters: FnvHashMap<usize, Vec<oneshot::Sender<i64>>>,
    /// Peers the failure detector has reported crashed
    pub crashed: FnvHashSet<Replica>,
    pub last_decision_at: Instant,
    /// Channels to the broadcast layer below and the application above
    pub rb_req_send: Sender<RbRequest>,
    pub rb_out_recv: Receiver<(Replica, Vec<u8>)>,
    pub crash_recv: Receiver<Replica>,
    pub client_req_recv: Receiver<ClientRequest>,
    pub decide_send: Sender<(usize, i64)>,
    exit_rx: oneshot::Receiver<()>,
    _sub_services: Vec<oneshot::Sender<()>>,
}

impl Context {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        num_nodes: usize,
        myid: Replica,
        num_faults: usize,
        rb_req_send: Sender<RbRequest>,
        rb_out_recv: Receiver<(Replica, Vec<u8>)>,
        crash_recv: Receiver<Replica>,
        client_req_recv: Receiver<ClientRequest>,
        decide_send: Sender<(usize, i64)>,
        exit_rx: oneshot::Receiver<()>,
    ) -> Self {
        Context {
            num_nodes,
            myid,
            num_faults,
            started_timestamp: 0,
            decided_timestamp: 0,
            instances: FnvHashMap::default(),
            decisions: FnvHashMap::default(),
            waiters: FnvHashMap::default(),
            crashed: FnvHashSet::default(),
            last_decision_at: Instant::now(),
            rb_req_send,
            rb_out_recv,
            crash_recv,
            client_req_recv,
            decide_send,
            exit_rx,
            _sub_services: Vec::new(),
        }
    }

    /// Spawns the whole stack: the reliable broadcast layer on the configured
    /// ports, the failure detector on ports shifted by `PFD_PORT_OFFSET`, and
    /// the consensus reactor on top. Returns the application handle and the
    /// exit handle for the reactor.
    pub fn spawn(config: Node, byz: bool) -> Result<(ConsensusHandle, oneshot::Sender<()>)> {
        let (rb_req_send, rb_req_recv) = channel(CHANNEL_CAPACITY);
        let (rb_deliver_send, rb_deliver_recv) = channel(CHANNEL_CAPACITY);
        let (crash_fd_send, crash_fd_recv) = channel(CHANNEL_CAPACITY);
        let (crash_up_send, crash_up_recv) = channel(CHANNEL_CAPACITY);
        let (client_req_send, client_req_recv) = channel(CHANNEL_CAPACITY);
        let (decide_send, decide_recv) = channel(CHANNEL_CAPACITY);
        let (pfd_start_send, pfd_start_recv) = channel(1);

        let rb_exit = lrb::Context::spawn(
            config.clone(),
            rb_req_recv,
            rb_deliver_send,
            crash_fd_recv,
            crash_up_send,
            byz,
        )?;
        let pfd_exit = pfd::Context::spawn(
            config.with_port_offset(PFD_PORT_OFFSET)?,
            pfd_start_recv,
            crash_fd_send,
        )?;
        let (exit_tx, exit_rx) = oneshot::channel();

        tokio::spawn(async move {
            let mut c = Context::new(
                config.num_nodes,
                config.id,
                config.num_faults,
                rb_req_send,
                rb_deliver_recv,
                crash_up_recv,
                client_req_recv,
                decide_send,
                exit_rx,
            );
            c._sub_services = vec![rb_exit, pfd_exit];
            if let Err(e) = c.run().await {
                log::error!("Consensus engine error: {}", e);
            }
        });
        let handle = ConsensusHandle {
            req_send: client_req_send,
            decide_recv,
            pfd_start: pfd_start_send,
        };
        Ok((handle, exit_tx))
    }

    pub async fn run(&mut self) -> Result<()> {
        let mut liveness = tokio::time::interval(LIVENESS_LOG_INTERVAL);
        liveness.tick().await;
        loop {
            tokio::select! {
                exit_val = &mut self.exit_rx => {
                    exit_val.map_err(anyhow::Error::new)?;
                    log::info!("Termination signal received by the consensus engine. Exiting.");
                    break;
                },
                delivered = self.rb_out_recv.recv() => {
                    let (origin, payload) = delivered.ok_or_else(||
                        anyhow!("Broadcast layer has closed")
                    )?;
                    self.process_delivery(origin, payload).await;
                },
                req = self.client_req_recv.recv() => {
                    let req = req.ok_or_else(||
                        anyhow!("Application has closed its request channel")
                    )?;
                    self.handle_client_request(req).await;
                },
                crashed = self.crash_recv.recv() => {
                    let crashed = crashed.ok_or_else(||
                        anyhow!("Broadcast layer has closed its crash channel")
                    )?;
                    self.handle_crash(crashed);
                },
                _ = liveness.tick() => {
                    self.log_liveness();
                },
            };
        }
        Ok(())
    }

    /// Quorum slack bookkeeping. The protocol itself needs no reaction to a
    /// crash, but losing more than F peers makes N-F unreachable and every
    /// outstanding proposal hangs.
    pub(crate) fn handle_crash(&mut self, replica: Replica) {
        if !self.crashed.insert(replica) {
            return;
        }
        log::warn!("Process {} reported crashed", replica);
        if self.crashed.len() > self.num_faults {
            log::error!(
                "{} processes crashed with F = {}, outstanding proposals may never decide",
                self.crashed.len(),
                self.num_faults
            );
        }
    }

    /// The only visibility into a quorum that never forms is time: surface
    /// how long proposals have been waiting.
    fn log_liveness(&self) {
        let outstanding: usize = self.waiters.values().map(Vec::len).sum();
        if outstanding > 0 {
            log::warn!(
                "{} proposal(s) outstanding, {:?} since the last decision",
                outstanding,
                self.last_decision_at.elapsed()
            );
        }
    }
}
