use std::{collections::BTreeMap, fmt, net::SocketAddr};

use crate::Replica;

/// One member of the static roster. `correct` flips to false when the failure
/// detector reports a crash and never flips back: crash-stop processes do not
/// recover.
#[derive(Debug, Clone)]
pub struct Process {
    pub id: Replica,
    pub address: SocketAddr,
    pub correct: bool,
}

/// Raised when an address or id outside the roster shows up. In a closed
/// membership model this is a configuration fault, not a runtime condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownProcess(pub String);

impl fmt::Display for UnknownProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown process: {}", self.0)
    }
}

impl std::error::Error for UnknownProcess {}

/// The closed membership of the group: an ordered mapping from process id to
/// descriptor. Fixed size N for the lifetime of the process; only the
/// `correct` flags ever change. Crashed processes stay in the set so
/// retransmission logic can still reference them. Each service context carries
/// its own id alongside the set.
#[derive(Debug, Clone)]
pub struct ProcessSet {
    processes: BTreeMap<Replica, Process>,
}

impl ProcessSet {
    pub fn new(members: impl IntoIterator<Item = (Replica, SocketAddr)>) -> Self {
        let processes = members
            .into_iter()
            .map(|(id, address)| {
                (
                    id,
                    Process {
                        id,
                        address,
                        correct: true,
                    },
                )
            })
            .collect();
        Self { processes }
    }

    pub fn get(&self, id: Replica) -> Option<&Process> {
        self.processes.get(&id)
    }

    /// Maps an inbound message's source address back to its process.
    pub fn resolve(&self, address: &SocketAddr) -> Result<&Process, UnknownProcess> {
        self.processes
            .values()
            .find(|p| p.address == *address)
            .ok_or_else(|| UnknownProcess(address.to_string()))
    }

    pub fn size(&self) -> usize {
        self.processes.len()
    }

    /// Flips the `correct` flag of a process. Returns false when the process
    /// was already marked crashed (or is unknown), so repeated crash signals
    /// degrade to no-ops.
    pub fn mark_crashed(&mut self, id: Replica) -> bool {
        match self.processes.get_mut(&id) {
            Some(process) if process.correct => {
                process.correct = false;
                true
            }
            _ => false,
        }
    }

    pub fn is_correct(&self, id: Replica) -> bool {
        self.processes.get(&id).map(|p| p.correct).unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Process> {
        self.processes.values()
    }
}
