use std::time::Instant;

use types::Replica;

use crate::Context;

impl Context {
    /// A terminal Decide for an instance. Stale ones are steady-state noise,
    /// ones for instances this process has not reached yet go straight into
    /// the decision record, where the propose that gets there finds them.
    pub(crate) async fn handle_decide(&mut self, origin: Replica, timestamp: usize, value: i64) {
        if timestamp <= self.decided_timestamp {
            log::trace!("Dropping stale Decide for instance {}", timestamp);
            return;
        }
        if timestamp > self.started_timestamp {
            log::debug!(
                "Decide for future instance {} from process {}, recording it",
                timestamp,
                origin
            );
            self.decisions.insert(timestamp, value);
            return;
        }
        self.finalize(timestamp, value).await;
    }

    /// The single point where an instance concludes: record the decision,
    /// advance the watermark, drop the instance state, wake the proposers and
    /// push the decision to the application.
    pub(crate) async fn finalize(&mut self, timestamp: usize, value: i64) {
        log::info!("Decided value {} for instance {}", value, timestamp);
        self.decisions.insert(timestamp, value);
        if timestamp > self.decided_timestamp {
            self.decided_timestamp = timestamp;
        }
        self.last_decision_at = Instant::now();
        // Instances at or below the watermark can never resolve anymore, their
        // Decide would be dropped as stale. Answer their proposers from the
        // record where one exists, otherwise drop the channel so the caller
        // sees an error instead of waiting forever.
        let watermark = self.decided_timestamp;
        self.instances.retain(|ts, _| *ts > watermark);
        let overtaken: Vec<usize> = self
            .waiters
            .keys()
            .filter(|ts| **ts <= watermark)
            .copied()
            .collect();
        for ts in overtaken {
            let recorded = self.decisions.get(&ts).copied();
            if recorded.is_none() {
                log::warn!(
                    "Instance {} was overtaken by instance {} without deciding, failing its proposers",
                    ts,
                    timestamp
                );
            }
            if let Some(waiters) = self.waiters.remove(&ts) {
                for waiter in waiters {
                    match recorded {
                        Some(decided) => {
                            let _ = waiter.send(decided);
                        }
                        None => drop(waiter),
                    }
                }
            }
        }
        if self.decide_send.send((timestamp, value)).await.is_err() {
            log::warn!("Application has closed its decision channel");
        }
    }
}
