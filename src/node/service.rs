use crate::config::ClusterConfig;
use crate::crdt::Merge;
use crate::protocol::{
    Endpoint, KeyRecord, ListQuery, ListReply, ListWrite, Message, ReplicaWrite, ReplicationLevel,
    Transport,
};
use crate::ring::{HashRing, SharedRing, VirtualNodeId};
use crate::storage::{KeyValueStore, ListRecord, RecordKey};

use anyhow::Result;
use std::sync::Arc;

/// A storage server: owns the rows of its virtual nodes and takes part in
/// replication and rebalancing.
pub struct ReplicaNode<T: Transport> {
    pub(super) server_id: u32,
    pub(super) config: Arc<ClusterConfig>,
    pub(super) ring: SharedRing,
    pub(super) store: Arc<dyn KeyValueStore>,
    pub(super) transport: Arc<T>,
}

impl<T: Transport> std::fmt::Debug for ReplicaNode<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicaNode")
            .field("server_id", &self.server_id)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> ReplicaNode<T> {
    /// Creates a node with an empty ring; the ring arrives from the router.
    pub fn new(
        server_id: u32,
        config: Arc<ClusterConfig>,
        store: Arc<dyn KeyValueStore>,
        transport: Arc<T>,
    ) -> Arc<Self> {
        let ring = SharedRing::new(HashRing::new(config.hash_modulus));
        Arc::new(Self {
            server_id,
            config,
            ring,
            store,
            transport,
        })
    }

    pub fn server_id(&self) -> u32 {
        self.server_id
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn request_deadline(&self) -> std::time::Duration {
        self.config.request_deadline
    }

    pub async fn ring(&self) -> Arc<HashRing> {
        self.ring.snapshot().await
    }

    pub async fn install_ring(&self, ring: HashRing) {
        tracing::info!("Server {} installed ring with {} virtual nodes", self.server_id, ring.len());
        self.ring.replace(ring).await;
    }

    pub(super) fn decode_ring(&self, text: &str) -> Result<HashRing> {
        Ok(HashRing::decode(text, self.config.hash_modulus)?)
    }

    pub(super) fn is_local(&self, vnode: VirtualNodeId) -> bool {
        vnode.server_id == self.server_id
    }

    /// Handles one inbound message and produces its reply.
    ///
    /// Failures are logged and answered with `error`; nothing here takes the node down.
    pub async fn handle(self: &Arc<Self>, message: Message) -> Message {
        let method = message.method();
        tracing::debug!("Server {} received {}", self.server_id, method);

        match message {
            Message::Hello => Message::Hello,
            Message::CreateHashRing {
                hash_ring: Some(text),
            } => match self.decode_ring(&text) {
                Ok(ring) => {
                    self.install_ring(ring).await;
                    Message::ack(format!("Created hash ring in server {}", self.server_id))
                }
                Err(e) => self.failure(method, e),
            },
            Message::CreateList(write) | Message::UpdateList(write) => self.handle_write(write).await,
            Message::GetList(query) => match self.read_list(query).await {
                Ok(reply) => Message::List(reply),
                Err(e) => self.failure(method, e),
            },
            Message::ReplicateList(write)
            | Message::ReplicateCreationList(write)
            | Message::ReplicateUpdateList(write) => match self.apply_replica(write).await {
                Ok(record) => Message::ack(format!(
                    "Replicated list {} in server {} at level {}",
                    record.list_uuid, self.server_id, record.replication_level
                )),
                Err(e) => self.failure(method, e),
            },
            Message::GetKeys {
                virtual_node,
                replication_level,
            } => match self.get_keys(virtual_node, replication_level) {
                Ok(keys) => Message::Keys { keys },
                Err(e) => self.failure(method, e),
            },
            Message::AddServerToHashRing {
                hash_ring,
                server_id,
                nr_virtual_nodes,
            } => {
                self.run_detached(method, move |node| async move {
                    node.add_server_to_ring(&hash_ring, server_id, nr_virtual_nodes).await?;
                    Ok(Message::ack(format!(
                        "Added server {} to hash ring in server {}",
                        server_id, node.server_id
                    )))
                })
                .await
            }
            Message::RemoveServerFromHashRing {
                hash_ring,
                server_id,
            } => {
                self.run_detached(method, move |node| async move {
                    node.remove_server_from_ring(&hash_ring, server_id).await?;
                    Ok(Message::ack(format!(
                        "Removed server {} from hash ring in server {}",
                        server_id, node.server_id
                    )))
                })
                .await
            }
            Message::DeleteKeys => match self.delete_keys() {
                Ok(purged) => Message::ack(format!("Deleted {} keys in server {}", purged, self.server_id)),
                Err(e) => self.failure(method, e),
            },
            Message::ReplicateKeys => {
                let node = self.clone();
                tokio::spawn(async move {
                    if let Err(e) = node.replicate_keys().await {
                        tracing::error!("Server {} failed to replicate keys: {}", node.server_id, e);
                    }
                });
                Message::ack(format!("Replicating keys in server {}", self.server_id))
            }
            other => {
                tracing::warn!("Server {} cannot handle {}", self.server_id, other.method());
                Message::error(format!("unhandled method {}", other.method()))
            }
        }
    }

    /// Runs membership work on its own task so a caller's deadline cannot cut it short.
    async fn run_detached<F, Fut>(self: &Arc<Self>, method: &'static str, work: F) -> Message
    where
        F: FnOnce(Arc<Self>) -> Fut,
        Fut: std::future::Future<Output = Result<Message>> + Send + 'static,
    {
        let task = tokio::spawn(work(self.clone()));
        match task.await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => self.failure(method, e),
            Err(e) => self.failure(method, anyhow::anyhow!("task failed: {}", e)),
        }
    }

    fn failure(&self, method: &str, error: anyhow::Error) -> Message {
        tracing::error!("Server {} failed to handle {}: {}", self.server_id, method, error);
        Message::error(format!("{} failed on server {}: {}", method, self.server_id, error))
    }

    /// Virtual node a request targets: the stamped one, else the ring's answer.
    async fn target_vnode(&self, stamped: Option<VirtualNodeId>, list_uuid: uuid::Uuid) -> Result<VirtualNodeId> {
        if let Some(vnode) = stamped {
            return Ok(vnode);
        }
        self.ring
            .snapshot()
            .await
            .responsible_node(&list_uuid.to_string())
            .ok_or_else(|| anyhow::anyhow!("ring is empty"))
    }

    async fn handle_write(self: &Arc<Self>, write: ListWrite) -> Message {
        let ring = self.ring.snapshot().await;
        let (record, created) = match self.write_list(&ring, write).await {
            Ok(result) => result,
            Err(e) => return self.failure("write", e),
        };

        let verb = if created { "Created" } else { "Updated" };
        let reply = Message::ack(format!("{} list in server {}", verb, self.server_id));

        let node = self.clone();
        let deadline = self.config.fanout_deadline;
        tokio::spawn(async move {
            let fanout = node.replicate_record(&ring, &record, created);
            match tokio::time::timeout(deadline, fanout).await {
                Ok(outcome) => tracing::debug!(
                    "List {} replicated to {:?} (hinted {:?})",
                    record.list_uuid,
                    outcome.acknowledged,
                    outcome.hinted
                ),
                Err(_) => tracing::warn!("Replication of list {} hit its deadline", record.list_uuid),
            }
        });

        reply
    }

    /// Applies a client write locally: inserts a new primary row or merges into the
    /// existing one. Returns the stored row and whether it was created.
    pub async fn write_list(&self, ring: &HashRing, write: ListWrite) -> Result<(ListRecord, bool)> {
        let vnode = match write.virtual_node {
            Some(vnode) => vnode,
            None => ring
                .responsible_node(&write.list_uuid.to_string())
                .ok_or_else(|| anyhow::anyhow!("ring is empty"))?,
        };
        let key = RecordKey::new(vnode, write.list_uuid);

        let mut created = false;
        let stored = self.store.update(&key, &mut |current| {
            let next = match current {
                Some(mut existing) => {
                    existing.content.merge_from(&write.list_content);
                    if !write.list_name.is_empty() {
                        existing.list_name = write.list_name.clone();
                    }
                    existing.replication_level = ReplicationLevel::PRIMARY;
                    existing.to_delete = false;
                    existing.hinted_handoff = None;
                    existing
                }
                None => {
                    created = true;
                    ListRecord {
                        virtual_node: vnode,
                        list_uuid: write.list_uuid,
                        list_name: write.list_name.clone(),
                        content: write.list_content.clone(),
                        replication_level: ReplicationLevel::PRIMARY,
                        to_delete: false,
                        hinted_handoff: None,
                    }
                }
            };
            Some(next)
        })?;

        let record = stored.ok_or_else(|| anyhow::anyhow!("write of {} was dropped", key.list_uuid))?;
        tracing::info!(
            "{} list {} on {} in server {}",
            if created { "Created" } else { "Updated" },
            record.list_uuid,
            vnode,
            self.server_id
        );
        Ok((record, created))
    }

    /// Local row for the requested list, or a reply without content.
    pub async fn read_list(&self, query: ListQuery) -> Result<ListReply> {
        let vnode = self.target_vnode(query.virtual_node, query.list_uuid).await?;
        let reply = match self.store.get(&RecordKey::new(vnode, query.list_uuid))? {
            Some(record) => ListReply {
                list_uuid: record.list_uuid,
                list_name: Some(record.list_name),
                list_content: Some(record.content),
            },
            None => ListReply::not_found(query.list_uuid),
        };
        Ok(reply)
    }

    /// Stores a copy pushed by another node, merging with any existing row.
    ///
    /// A live primary row keeps level 0 even if an older ring still sees it as a replica.
    pub async fn apply_replica(&self, write: ReplicaWrite) -> Result<ListRecord> {
        let key = RecordKey::new(write.virtual_node, write.list_uuid);
        let stored = self.store.update(&key, &mut |current| {
            let next = match current {
                Some(mut existing) => {
                    existing.content.merge_from(&write.list_content);
                    if !write.list_name.is_empty() {
                        existing.list_name = write.list_name.clone();
                    }
                    if !(existing.is_primary() && !existing.to_delete) {
                        existing.replication_level = write.replication_level;
                        existing.hinted_handoff = write.hinted_handoff;
                    }
                    existing.to_delete = false;
                    existing
                }
                None => ListRecord {
                    virtual_node: write.virtual_node,
                    list_uuid: write.list_uuid,
                    list_name: write.list_name.clone(),
                    content: write.list_content.clone(),
                    replication_level: write.replication_level,
                    to_delete: false,
                    hinted_handoff: write.hinted_handoff,
                },
            };
            Some(next)
        })?;

        let record = stored.ok_or_else(|| anyhow::anyhow!("replica of {} was dropped", key.list_uuid))?;
        tracing::debug!(
            "Stored replica of {} on {} at level {} (hint {:?})",
            record.list_uuid,
            record.virtual_node,
            record.replication_level,
            record.hinted_handoff
        );
        Ok(record)
    }

    /// Every list stored under `vnode` at `level`, including rows already flagged
    /// for deletion: a joining node may ask after the owner has flagged them.
    pub fn get_keys(&self, vnode: VirtualNodeId, level: ReplicationLevel) -> Result<Vec<KeyRecord>> {
        let rows = self
            .store
            .scan(&|row| row.virtual_node == vnode && row.replication_level == level)?;
        Ok(rows.iter().map(ListRecord::to_key_record).collect())
    }

    /// Sends `message` to the server owning `vnode` within the data timeout.
    pub(super) async fn send_to(&self, vnode: VirtualNodeId, message: &Message) -> Result<Message> {
        self.transport
            .send(Endpoint::Server(vnode.server_id), message, self.config.data_timeout)
            .await
    }

    /// Finds a router and either fetches the bootstrap ring or asks to join it.
    pub async fn enter_cluster(&self, join: bool) -> Result<u16> {
        let port = crate::protocol::discover_router(
            self.transport.as_ref(),
            &self.config.router_ports,
            self.config.probe_timeout,
        )
        .await
        .ok_or_else(|| anyhow::anyhow!("no router answered on {:?}", self.config.router_ports))?;

        let router = Endpoint::Router(port);
        if join {
            let request = Message::JoinHashRing {
                server_id: self.server_id,
            };
            match self.transport.send(router, &request, self.config.data_timeout).await? {
                Message::Ack { detail } => tracing::info!("Join accepted: {}", detail),
                other => return Err(anyhow::anyhow!("router refused join: {:?}", other)),
            }
        } else {
            let request = Message::CreateHashRing { hash_ring: None };
            match self.transport.send(router, &request, self.config.data_timeout).await? {
                Message::CreateHashRing {
                    hash_ring: Some(text),
                } => {
                    let ring = self.decode_ring(&text)?;
                    self.install_ring(ring).await;
                }
                other => return Err(anyhow::anyhow!("unexpected bootstrap reply: {:?}", other)),
            }
        }
        Ok(port)
    }
}
