//! Cluster Configuration
//!
//! Addressing, ring geometry and timing knobs shared by routers and replicas.
//! The binary fills this from CLI flags and `SHOPPING_*` environment variables;
//! tests build it from `Default` and shorten the timers.

use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub host: String,
    /// Replica `S` listens on `server_base_port + S`.
    pub server_base_port: u16,
    /// Candidate router ports, probed in order.
    pub router_ports: Vec<u16>,
    /// Size of the hash space.
    pub hash_modulus: u64,
    pub virtual_nodes_per_server: u32,
    /// Servers placed on the bootstrap ring by a router.
    pub initial_servers: u32,
    /// Successor replicas kept for every list (levels 1..=replica_count).
    pub replica_count: usize,
    /// Ring successors tried during replication fan-out.
    pub fanout_candidates: usize,
    pub probe_timeout: Duration,
    pub data_timeout: Duration,
    pub fanout_deadline: Duration,
    pub request_deadline: Duration,
    pub join_settle_delay: Duration,
    /// Period of the hinted-handoff sweep. Zero disables it.
    pub handoff_interval: Duration,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            server_base_port: 5000,
            router_ports: vec![6001, 6002, 6003],
            hash_modulus: 1000,
            virtual_nodes_per_server: 3,
            initial_servers: 4,
            replica_count: 2,
            fanout_candidates: 10,
            probe_timeout: Duration::from_millis(200),
            data_timeout: Duration::from_secs(1),
            fanout_deadline: Duration::from_secs(10),
            request_deadline: Duration::from_secs(5),
            join_settle_delay: Duration::from_secs(1),
            handoff_interval: Duration::from_secs(10),
        }
    }
}

impl ClusterConfig {
    /// Port of replica `server_id`. Ids that would land past the last port are rejected
    /// rather than wrapped onto another server's port.
    pub fn server_port(&self, server_id: u32) -> anyhow::Result<u16> {
        u16::try_from(server_id)
            .ok()
            .and_then(|offset| self.server_base_port.checked_add(offset))
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "server {} has no port above base {}",
                    server_id,
                    self.server_base_port
                )
            })
    }

    pub fn server_url(&self, server_id: u32) -> anyhow::Result<String> {
        Ok(format!("http://{}:{}", self.host, self.server_port(server_id)?))
    }

    pub fn router_url(&self, port: u16) -> String {
        format!("http://{}:{}", self.host, port)
    }

    pub fn server_bind_addr(&self, server_id: u32) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.server_port(server_id)?).parse()?)
    }

    pub fn router_bind_addr(&self, port: u16) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, port).parse()?)
    }

    /// Server ids placed on the bootstrap ring.
    pub fn initial_server_ids(&self) -> impl Iterator<Item = u32> {
        1..=self.initial_servers
    }
}
