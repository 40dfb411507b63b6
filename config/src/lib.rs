use std::{collections::HashMap, fs, net::SocketAddr, path::Path};

use anyhow::{anyhow, Context as _, Result};
use serde::{Deserialize, Serialize};

/// Static configuration of a single process: the closed roster of all group
/// members plus this process's own id and the tolerated-failures bound F.
///
/// The roster never changes for the lifetime of the process; crashed members
/// stay in `net_map` so retransmission logic can still address them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Id of this process.
    pub id: usize,
    /// Total number of processes N.
    pub num_nodes: usize,
    /// Number of crash failures F the group must tolerate.
    pub num_faults: usize,
    /// Map from process id to its `ip:port` address.
    pub net_map: HashMap<usize, String>,
}

impl Node {
    /// Reads a roster file with one `id host port` line per process.
    /// Empty lines and lines starting with `#` are skipped.
    pub fn from_roster(path: impl AsRef<Path>, id: usize, num_faults: usize) -> Result<Node> {
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Unable to read roster file {:?}", path.as_ref()))?;
        Self::parse_roster(&data, id, num_faults)
    }

    pub fn parse_roster(data: &str, id: usize, num_faults: usize) -> Result<Node> {
        let mut net_map = HashMap::new();
        for (lineno, line) in data.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.split_whitespace();
            let pid: usize = parts
                .next()
                .ok_or_else(|| anyhow!("Missing process id on roster line {}", lineno + 1))?
                .parse()
                .with_context(|| format!("Bad process id on roster line {}", lineno + 1))?;
            let host = parts
                .next()
                .ok_or_else(|| anyhow!("Missing host on roster line {}", lineno + 1))?;
            let port: u16 = parts
                .next()
                .ok_or_else(|| anyhow!("Missing port on roster line {}", lineno + 1))?
                .parse()
                .with_context(|| format!("Bad port on roster line {}", lineno + 1))?;
            let address = format!("{}:{}", host, port);
            // Addresses must parse as socket addresses: the roster uses IPs
            let _: SocketAddr = address
                .parse()
                .with_context(|| format!("Bad address on roster line {}", lineno + 1))?;
            if net_map.insert(pid, address).is_some() {
                return Err(anyhow!("Duplicate process id {} in the roster", pid));
            }
        }
        if net_map.is_empty() {
            return Err(anyhow!("Empty roster"));
        }
        if !net_map.contains_key(&id) {
            return Err(anyhow!("Self id {} does not appear in the roster", id));
        }
        Ok(Node {
            id,
            num_nodes: net_map.len(),
            num_faults,
            net_map,
        })
    }

    /// Returns a copy of this configuration with every port shifted by
    /// `offset`. Auxiliary services run next to the main one on shifted ports.
    pub fn with_port_offset(&self, offset: u16) -> Result<Node> {
        let mut shifted = self.clone();
        for (replica, address) in self.net_map.iter() {
            let address: SocketAddr = address
                .parse()
                .map_err(|e| anyhow!("Unable to parse address {}: {}", address, e))?;
            let moved = SocketAddr::new(address.ip(), address.port() + offset);
            shifted.net_map.insert(*replica, moved.to_string());
        }
        Ok(shifted)
    }

    /// The address this process itself is configured to listen on.
    pub fn my_address(&self) -> Result<SocketAddr> {
        let address = self
            .net_map
            .get(&self.id)
            .ok_or_else(|| anyhow!("Self id {} does not appear in the roster", self.id))?;
        address
            .parse()
            .map_err(|e| anyhow!("Unable to parse address {}: {}", address, e))
    }
}
