use crate::config::ClusterConfig;
use crate::protocol::{Endpoint, ListQuery, ListReply, ListWrite, Message, Transport};
use crate::ring::{HashRing, SharedRing};

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Front door of the cluster: routes list requests and drives membership changes.
///
/// Holds the authoritative ring but no list data.
pub struct RouterService<T: Transport> {
    port: u16,
    config: Arc<ClusterConfig>,
    ring: SharedRing,
    transport: Arc<T>,
    /// Serializes joins and leaves.
    membership: Mutex<()>,
}

/// How a `getList` fan-out ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Found(ListReply),
    /// Some replica answered, none had the list.
    Missing(ListReply),
    Unreachable,
}

impl<T: Transport> RouterService<T> {
    /// Creates a router with the bootstrap ring of `initial_servers` servers.
    ///
    /// Routers joining a running cluster call [`RouterService::sync_from_peers`] before serving.
    pub fn new(port: u16, config: Arc<ClusterConfig>, transport: Arc<T>) -> Arc<Self> {
        let ring = HashRing::build(
            config.initial_server_ids(),
            config.virtual_nodes_per_server,
            config.hash_modulus,
        );
        tracing::info!("Router :{} built ring with {} virtual nodes", port, ring.len());
        Arc::new(Self {
            port,
            config,
            ring: SharedRing::new(ring),
            transport,
            membership: Mutex::new(()),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn request_deadline(&self) -> std::time::Duration {
        self.config.request_deadline
    }

    pub async fn ring(&self) -> Arc<HashRing> {
        self.ring.snapshot().await
    }

    pub async fn handle(self: &Arc<Self>, message: Message) -> Message {
        tracing::debug!("Router :{} received {}", self.port, message.method());

        match message {
            Message::Hello => Message::Hello,
            Message::CreateHashRing { .. } => Message::CreateHashRing {
                hash_ring: Some(self.ring.snapshot().await.encode()),
            },
            Message::JoinHashRing { server_id } => {
                let router = self.clone();
                tokio::spawn(async move {
                    if let Err(e) = router.join_server(server_id).await {
                        tracing::error!("Join of server {} failed: {}", server_id, e);
                    }
                });
                Message::ack(format!("Server {} joining", server_id))
            }
            Message::LeaveHashRing { server_id } => {
                let router = self.clone();
                tokio::spawn(async move {
                    if let Err(e) = router.leave_server(server_id).await {
                        tracing::error!("Leave of server {} failed: {}", server_id, e);
                    }
                });
                Message::ack(format!("Server {} leaving", server_id))
            }
            Message::AddServerToHashRing { hash_ring, .. } | Message::RemoveServerFromHashRing { hash_ring, .. } => {
                match HashRing::decode(&hash_ring, self.config.hash_modulus) {
                    Ok(ring) => {
                        tracing::info!("Router :{} adopted peer ring with {} virtual nodes", self.port, ring.len());
                        self.ring.replace(ring).await;
                        Message::ack(format!("Router :{} updated its ring", self.port))
                    }
                    Err(e) => {
                        tracing::warn!("Router :{} got an unreadable ring: {}", self.port, e);
                        Message::error(format!("bad hash ring: {}", e))
                    }
                }
            }
            Message::GetList(query) => match self.get_list(query).await {
                ReadOutcome::Found(reply) | ReadOutcome::Missing(reply) => Message::List(reply),
                ReadOutcome::Unreachable => Message::error("no replica of the list is reachable"),
            },
            Message::CreateList(write) => self.forward_write(write, Message::CreateList).await,
            Message::UpdateList(write) => self.forward_write(write, Message::UpdateList).await,
            other => {
                tracing::warn!("Router :{} cannot handle {}", self.port, other.method());
                Message::error(format!("unhandled method {}", other.method()))
            }
        }
    }

    /// Replaces the bootstrap ring with the ring of the first peer router that answers.
    ///
    /// Returns the peer's port, or `None` when this is the only live router.
    pub async fn sync_from_peers(&self) -> Option<u16> {
        for port in self.peer_ports() {
            let request = Message::CreateHashRing { hash_ring: None };
            match self
                .transport
                .send(Endpoint::Router(port), &request, self.config.probe_timeout)
                .await
            {
                Ok(Message::CreateHashRing {
                    hash_ring: Some(text),
                }) => match HashRing::decode(&text, self.config.hash_modulus) {
                    Ok(ring) => {
                        tracing::info!("Router :{} took the ring of router :{} ({} virtual nodes)", self.port, port, ring.len());
                        self.ring.replace(ring).await;
                        return Some(port);
                    }
                    Err(e) => tracing::warn!("Router :{} sent an unreadable ring: {}", port, e),
                },
                Ok(other) => tracing::debug!("Router :{} answered createHashRing with {}", port, other.method()),
                Err(e) => tracing::debug!("No peer router on :{}: {}", port, e),
            }
        }
        tracing::info!("Router :{} found no peer, keeping the bootstrap ring", self.port);
        None
    }

    fn peer_ports(&self) -> Vec<u16> {
        self.config
            .router_ports
            .iter()
            .copied()
            .filter(|&port| port != self.port)
            .collect()
    }

    /// Pushes a membership announcement to the other routers. Absent routers are skipped.
    async fn tell_peer_routers(&self, announce: &Message) -> usize {
        let mut told = 0;
        for port in self.peer_ports() {
            match self
                .transport
                .send(Endpoint::Router(port), announce, self.config.data_timeout)
                .await
            {
                Ok(reply) if reply.is_ack() => told += 1,
                Ok(reply) => tracing::warn!("Router :{} refused {}: {:?}", port, announce.method(), reply),
                Err(e) => tracing::debug!("Router :{} missed {}: {}", port, announce.method(), e),
            }
        }
        told
    }

    /// Stamps the write with its responsible virtual node and relays the owner's reply.
    async fn forward_write(&self, mut write: ListWrite, wrap: fn(ListWrite) -> Message) -> Message {
        let ring = self.ring.snapshot().await;
        let Some(vnode) = ring.responsible_node(&write.list_uuid.to_string()) else {
            return Message::error("hash ring is empty");
        };
        write.virtual_node = Some(vnode);
        let message = wrap(write);

        match self
            .transport
            .send(Endpoint::Server(vnode.server_id), &message, self.config.data_timeout)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!("Owner {} of a {} is unreachable: {}", vnode, message.method(), e);
                Message::error(format!("responsible node {} is unreachable", vnode))
            }
        }
    }

    /// Asks the responsible node and its successors, in ring order, for a list.
    pub async fn get_list(&self, query: ListQuery) -> ReadOutcome {
        let ring = self.ring.snapshot().await;
        let candidates = ring.preference_list(&query.list_uuid.to_string(), self.config.replica_count);
        let mut answered = false;

        for vnode in candidates {
            let request = Message::GetList(ListQuery {
                virtual_node: Some(vnode),
                list_uuid: query.list_uuid,
            });
            match self
                .transport
                .send(Endpoint::Server(vnode.server_id), &request, self.config.data_timeout)
                .await
            {
                Ok(Message::List(reply)) if reply.is_found() => {
                    tracing::debug!("List {} served by {}", query.list_uuid, vnode);
                    return ReadOutcome::Found(reply);
                }
                Ok(Message::List(_)) => answered = true,
                Ok(other) => tracing::warn!("{} answered getList with {}", vnode, other.method()),
                Err(e) => tracing::warn!("{} unreachable for getList: {}", vnode, e),
            }
        }

        if answered {
            ReadOutcome::Missing(ListReply::not_found(query.list_uuid))
        } else {
            ReadOutcome::Unreachable
        }
    }

    /// Adds `server_id` to the ring and walks the peer routers and every server through the change.
    pub async fn join_server(&self, server_id: u32) -> Result<()> {
        let _guard = self.membership.lock().await;
        // Give the new server time to bind its listener.
        tokio::time::sleep(self.config.join_settle_delay).await;

        let virtual_nodes = self.config.virtual_nodes_per_server;
        let (ring, added) = self.ring.update(|ring| ring.add_server(server_id, virtual_nodes)).await;
        if !added {
            tracing::warn!("Server {} is already on the ring", server_id);
            return Ok(());
        }
        tracing::info!("Server {} joined, ring has {} virtual nodes", server_id, ring.len());

        let servers = ring.servers();
        let announce = Message::AddServerToHashRing {
            hash_ring: ring.encode(),
            server_id,
            nr_virtual_nodes: virtual_nodes,
        };
        self.tell_peer_routers(&announce).await;
        self.broadcast(&servers, &announce).await;
        self.broadcast(&servers, &Message::DeleteKeys).await;
        self.broadcast(&servers, &Message::ReplicateKeys).await;
        Ok(())
    }

    /// Removes `server_id` from the ring and walks every server through the change.
    pub async fn leave_server(&self, server_id: u32) -> Result<()> {
        let _guard = self.membership.lock().await;

        let (ring, removed) = self.ring.update(|ring| ring.remove_server(server_id)).await;
        if !removed {
            tracing::warn!("Server {} is not on the ring", server_id);
            return Ok(());
        }
        tracing::info!("Server {} left, ring has {} virtual nodes", server_id, ring.len());

        let remaining = ring.servers();
        let mut told = remaining.clone();
        told.push(server_id);
        let announce = Message::RemoveServerFromHashRing {
            hash_ring: ring.encode(),
            server_id,
        };
        self.tell_peer_routers(&announce).await;
        self.broadcast(&told, &announce).await;
        self.broadcast(&remaining, &Message::DeleteKeys).await;
        self.broadcast(&remaining, &Message::ReplicateKeys).await;
        Ok(())
    }

    /// Sends `message` to each server in turn. Unreachable servers are skipped.
    async fn broadcast(&self, servers: &[u32], message: &Message) -> usize {
        let mut delivered = 0;
        for &server_id in servers {
            match self
                .transport
                .send(Endpoint::Server(server_id), message, self.config.request_deadline)
                .await
            {
                Ok(Message::Error { reason }) => {
                    tracing::warn!("Server {} failed {}: {}", server_id, message.method(), reason);
                }
                Ok(reply) => {
                    tracing::debug!("Server {} answered {}: {:?}", server_id, message.method(), reply);
                    delivered += 1;
                }
                Err(e) => {
                    tracing::warn!("Server {} missed {}: {}", server_id, message.method(), e);
                }
            }
        }
        tracing::info!("{} delivered to {}/{} servers", message.method(), delivered, servers.len());
        delivered
    }
}
