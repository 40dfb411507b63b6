use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::sync::{
    mpsc::{Receiver, Sender},
    oneshot,
};

/// Requests accepted from the application.
#[derive(Debug)]
pub enum ClientRequest {
    /// Propose a value for the next undecided instance. The engine answers on
    /// the enclosed channel once the group has decided, with the decided
    /// value, which is not necessarily the proposer's own.
    Propose(i64, oneshot::Sender<i64>),
    /// Ask the broadcast layer to buffer deliveries for the given window.
    ArmQuiescence(Duration),
}

/// The application's side of the engine: proposals in, decisions out.
pub struct ConsensusHandle {
    pub(crate) req_send: Sender<ClientRequest>,
    pub(crate) decide_recv: Receiver<(usize, i64)>,
    pub(crate) pfd_start: Sender<()>,
}

impl ConsensusHandle {
    /// Proposes `value` and waits for the group-wide decision.
    pub async fn propose(&self, value: i64) -> Result<i64> {
        propose_on(&self.req_send, value).await
    }

    /// The next decision the engine has made, in deciding order.
    /// `None` once the engine has shut down.
    pub async fn next_decision(&mut self) -> Option<(usize, i64)> {
        self.decide_recv.recv().await
    }

    /// A clonable control handle for tasks that drive the engine while this
    /// handle stays parked on `next_decision`.
    pub fn control(&self) -> ConsensusControl {
        ConsensusControl {
            req_send: self.req_send.clone(),
            pfd_start: self.pfd_start.clone(),
        }
    }
}

#[derive(Clone)]
pub struct ConsensusControl {
    req_send: Sender<ClientRequest>,
    pfd_start: Sender<()>,
}

impl ConsensusControl {
    /// Proposes `value` and waits for the group-wide decision.
    pub async fn propose(&self, value: i64) -> Result<i64> {
        propose_on(&self.req_send, value).await
    }

    /// Starts the heartbeat failure detector. Until this is called no peer is
    /// ever suspected, so crash retransmission stays dormant.
    pub async fn start_detector(&self) -> Result<()> {
        self.pfd_start
            .send(())
            .await
            .map_err(|_| anyhow!("Failure detector has shut down"))
    }

    /// Buffers broadcast deliveries for `window`, releasing them all at once
    /// when it elapses.
    pub async fn arm_quiescence(&self, window: Duration) -> Result<()> {
        self.req_send
            .send(ClientRequest::ArmQuiescence(window))
            .await
            .map_err(|_| anyhow!("Consensus engine has shut down"))
    }
}

async fn propose_on(req_send: &Sender<ClientRequest>, value: i64) -> Result<i64> {
    let (resp_send, resp_recv) = oneshot::channel();
    req_send
        .send(ClientRequest::Propose(value, resp_send))
        .await
        .map_err(|_| anyhow!("Consensus engine has shut down"))?;
    resp_recv
        .await
        .map_err(|_| anyhow!("Consensus engine dropped the proposal"))
}
