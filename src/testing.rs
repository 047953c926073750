//! In-process cluster for protocol tests.
//!
//! `LoopbackTransport` delivers messages straight to registered replicas and routers,
//! passing them through JSON on the way so the wire format is exercised too.
//! Individual servers can be switched off to simulate crashes and partitions.

use crate::config::ClusterConfig;
use crate::node::ReplicaNode;
use crate::protocol::{Endpoint, Message, Transport};
use crate::router::RouterService;
use crate::storage::{KeyValueStore, MemoryStore};

use anyhow::Result;
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use std::time::Duration;

pub const ROUTER_PORT: u16 = 6001;
pub const PEER_ROUTER_PORT: u16 = 6002;

#[derive(Default)]
pub struct LoopbackTransport {
    nodes: DashMap<u32, Arc<ReplicaNode<LoopbackTransport>>>,
    routers: DashMap<u16, Arc<RouterService<LoopbackTransport>>>,
    down: DashSet<u32>,
}

impl LoopbackTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register_node(&self, node: Arc<ReplicaNode<LoopbackTransport>>) {
        self.nodes.insert(node.server_id(), node);
    }

    pub fn register_router(&self, router: Arc<RouterService<LoopbackTransport>>) {
        self.routers.insert(router.port(), router);
    }

    pub fn set_down(&self, server_id: u32, down: bool) {
        if down {
            self.down.insert(server_id);
        } else {
            self.down.remove(&server_id);
        }
    }

    fn through_wire(message: &Message) -> Result<Message> {
        Ok(serde_json::from_str(&serde_json::to_string(message)?)?)
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&self, target: Endpoint, message: &Message, timeout: Duration) -> Result<Message> {
        let message = Self::through_wire(message)?;
        let reply = match target {
            Endpoint::Server(id) => {
                if self.down.contains(&id) {
                    return Err(anyhow::anyhow!("{} is down", target));
                }
                let node = self
                    .nodes
                    .get(&id)
                    .map(|entry| entry.value().clone())
                    .ok_or_else(|| anyhow::anyhow!("{} not listening", target))?;
                tokio::time::timeout(timeout, node.handle(message)).await
            }
            Endpoint::Router(port) => {
                let router = self
                    .routers
                    .get(&port)
                    .map(|entry| entry.value().clone())
                    .ok_or_else(|| anyhow::anyhow!("{} not listening", target))?;
                tokio::time::timeout(timeout, router.handle(message)).await
            }
        };
        let reply = reply.map_err(|_| anyhow::anyhow!("{} timed out", target))?;
        Self::through_wire(&reply)
    }
}

/// Short timers and no background sweeps.
pub fn test_config() -> ClusterConfig {
    ClusterConfig {
        router_ports: vec![ROUTER_PORT, PEER_ROUTER_PORT],
        data_timeout: Duration::from_secs(2),
        fanout_deadline: Duration::from_secs(5),
        request_deadline: Duration::from_secs(5),
        join_settle_delay: Duration::ZERO,
        handoff_interval: Duration::ZERO,
        ..ClusterConfig::default()
    }
}

/// Router plus `initial_servers` replicas wired through one loopback transport.
pub struct TestCluster {
    pub config: Arc<ClusterConfig>,
    pub transport: Arc<LoopbackTransport>,
    pub router: Arc<RouterService<LoopbackTransport>>,
}

impl TestCluster {
    /// Starts the router and the bootstrap servers, each with the router's ring.
    pub async fn start(config: ClusterConfig) -> Self {
        let config = Arc::new(config);
        let transport = LoopbackTransport::new();
        let router = RouterService::new(ROUTER_PORT, config.clone(), transport.clone());
        transport.register_router(router.clone());

        let cluster = Self {
            config,
            transport,
            router,
        };
        for server_id in cluster.config.initial_server_ids() {
            let node = cluster.add_node(server_id);
            node.enter_cluster(false).await.unwrap();
        }
        cluster
    }

    /// Starts another router that takes its ring from the running ones.
    pub async fn add_router(&self, port: u16) -> Arc<RouterService<LoopbackTransport>> {
        let router = RouterService::new(port, self.config.clone(), self.transport.clone());
        router.sync_from_peers().await;
        self.transport.register_router(router.clone());
        router
    }

    /// Registers a replica without telling the router about it.
    pub fn add_node(&self, server_id: u32) -> Arc<ReplicaNode<LoopbackTransport>> {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let node = ReplicaNode::new(server_id, self.config.clone(), store, self.transport.clone());
        self.transport.register_node(node.clone());
        node
    }

    pub fn node(&self, server_id: u32) -> Arc<ReplicaNode<LoopbackTransport>> {
        self.transport
            .nodes
            .get(&server_id)
            .map(|entry| entry.value().clone())
            .unwrap()
    }

    /// Sends a client request to the first router.
    pub async fn request(&self, message: Message) -> Message {
        self.request_via(ROUTER_PORT, message).await
    }

    pub async fn request_via(&self, port: u16, message: Message) -> Message {
        self.transport
            .send(Endpoint::Router(port), &message, self.config.request_deadline)
            .await
            .unwrap()
    }
}

/// Polls `check` until it holds or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
