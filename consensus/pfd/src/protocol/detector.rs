use std::time::Instant;

use types::Replica;

use crate::{Context, LIVENESS_TIMEOUT};

impl Context {
    /// Application request: begin suspecting peers. Every peer gets a full
    /// timeout of grace from this moment, so a late start does not condemn
    /// processes whose heartbeats were never awaited.
    pub fn start_detection(&mut self) {
        if self.detecting {
            log::warn!("Failure detection already running");
            return;
        }
        log::info!("Starting failure detection");
        self.detecting = true;
        let now = Instant::now();
        let replicas = self.replicas.clone();
        for replica in replicas {
            if replica != self.myid {
                self.last_seen.insert(replica, now);
            }
        }
    }

    /// One suspicion pass: peers silent for longer than the liveness timeout
    /// are reported crashed, exactly once each.
    pub async fn scan(&mut self) {
        let silent: Vec<Replica> = self
            .last_seen
            .iter()
            .filter(|(replica, seen)| {
                !self.suspected.contains(replica) && seen.elapsed() > LIVENESS_TIMEOUT
            })
            .map(|(replica, _)| *replica)
            .collect();
        for replica in silent {
            self.suspected.insert(replica);
            log::warn!(
                "No heartbeat from process {} for over {:?}, reporting crash",
                replica,
                LIVENESS_TIMEOUT
            );
            if self.crash_send.send(replica).await.is_err() {
                log::error!("Broadcast layer has closed its crash channel");
            }
        }
    }

    pub fn record_heartbeat(&mut self, origin: Replica) {
        self.last_seen.insert(origin, Instant::now());
    }
}
