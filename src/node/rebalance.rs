//! Membership rebalancing: what a replica does when the ring gains or loses a server.

use super::service::ReplicaNode;
use crate::crdt::Merge;
use crate::protocol::{KeyRecord, Message, ReplicationLevel, Transport};
use crate::ring::{HashRing, VirtualNodeId};
use crate::storage::{ListRecord, RecordKey};

use anyhow::Result;

impl<T: Transport> ReplicaNode<T> {
    /// Installs the ring that now includes `joined` and re-evaluates ownership.
    ///
    /// The joining server pulls the primary keys of each of its positions from that
    /// position's successor. Every other server flags primaries it no longer owns.
    /// All servers flag their replica copies; `replicateKeys` rebuilds them.
    pub async fn add_server_to_ring(&self, ring_text: &str, joined: u32, virtual_nodes: u32) -> Result<()> {
        let ring = self.decode_ring(ring_text)?;
        self.install_ring(ring.clone()).await;

        if joined == self.server_id {
            let own = ring.virtual_nodes_of(self.server_id);
            tracing::info!("Server {} joining with {} of {} virtual nodes", self.server_id, own.len(), virtual_nodes);
            for vnode in own {
                match self.adopt_keys(&ring, vnode).await {
                    Ok(adopted) => tracing::info!("{} adopted {} lists", vnode, adopted),
                    Err(e) => tracing::warn!("{} could not adopt keys: {}", vnode, e),
                }
            }
        } else {
            let moved = self
                .store
                .mark_to_delete(&|row| row.is_primary() && !owns(&ring, row))?;
            if moved > 0 {
                tracing::info!("Server {} handed {} lists to server {}", self.server_id, moved, joined);
            }
        }

        let replicas = self.store.mark_to_delete(&|row| !row.is_primary())?;
        tracing::info!("Server {} flagged {} replica copies after join of {}", self.server_id, replicas, joined);
        Ok(())
    }

    /// Pulls the primary keys that `vnode` is now responsible for from the position
    /// that held them before the join: the first successor on another server.
    async fn adopt_keys(&self, ring: &HashRing, vnode: VirtualNodeId) -> Result<usize> {
        let mut previous_owner = vnode;
        loop {
            match ring.successor(previous_owner) {
                Some(next) if next == vnode => return Ok(0),
                Some(next) if self.is_local(next) => previous_owner = next,
                Some(next) => {
                    previous_owner = next;
                    break;
                }
                None => return Ok(0),
            }
        }

        let request = Message::GetKeys {
            virtual_node: previous_owner,
            replication_level: ReplicationLevel::PRIMARY,
        };
        let keys: Vec<KeyRecord> = match self.send_to(previous_owner, &request).await? {
            Message::Keys { keys } => keys,
            other => return Err(anyhow::anyhow!("{} answered getKeys with {:?}", previous_owner, other)),
        };

        let mut adopted = 0;
        for key in keys {
            if ring.responsible_node(&key.list_uuid.to_string()) != Some(vnode) {
                continue;
            }
            self.store.update(&RecordKey::new(vnode, key.list_uuid), &mut |current| {
                Some(match current {
                    Some(mut existing) => {
                        existing.content.merge_from(&key.list_content);
                        existing.replication_level = ReplicationLevel::PRIMARY;
                        existing.to_delete = false;
                        existing.hinted_handoff = None;
                        existing
                    }
                    None => ListRecord {
                        virtual_node: vnode,
                        list_uuid: key.list_uuid,
                        list_name: key.list_name.clone(),
                        content: key.list_content.clone(),
                        replication_level: ReplicationLevel::PRIMARY,
                        to_delete: false,
                        hinted_handoff: None,
                    },
                })
            })?;
            adopted += 1;
        }
        Ok(adopted)
    }

    /// Handles the departure of `removed`, then installs the ring without it.
    ///
    /// Against the old ring, a position whose `k` nearest predecessors all belonged to
    /// the removed server promotes its level-`k` copies of keys it now owns to primary.
    pub async fn remove_server_from_ring(&self, ring_text: &str, removed: u32) -> Result<()> {
        let next = self.decode_ring(ring_text)?;
        let previous = self.ring.snapshot().await;

        if removed != self.server_id {
            for vnode in previous.virtual_nodes_of(self.server_id) {
                let mut cursor = vnode;
                for depth in 0..self.config.replica_count {
                    let Some(predecessor) = previous.predecessor(cursor) else {
                        break;
                    };
                    if predecessor.server_id != removed {
                        break;
                    }
                    let level = ReplicationLevel::successor(depth);
                    let promoted = self.store.set_replication_level(
                        &|row| {
                            row.virtual_node == vnode
                                && row.replication_level == level
                                && row.hinted_handoff.is_none()
                                && owns(&next, row)
                        },
                        ReplicationLevel::PRIMARY,
                    )?;
                    if promoted > 0 {
                        tracing::info!("{} promoted {} level-{} copies after {} left", vnode, promoted, level, removed);
                    }
                    cursor = predecessor;
                }
            }
        } else {
            tracing::info!("Server {} is leaving the ring", self.server_id);
        }

        let replicas = self.store.mark_to_delete(&|row| !row.is_primary())?;
        tracing::info!("Server {} flagged {} replica copies after removal of {}", self.server_id, replicas, removed);

        self.install_ring(next).await;
        Ok(())
    }

    /// Physically removes flagged rows.
    pub fn delete_keys(&self) -> Result<usize> {
        let purged = self.store.purge_marked()?;
        tracing::info!("Server {} deleted {} flagged lists", self.server_id, purged);
        Ok(purged)
    }

    /// Re-runs the replication fan-out for every live primary row under the current ring.
    pub async fn replicate_keys(&self) -> Result<usize> {
        let ring = self.ring.snapshot().await;
        let primaries = self.store.scan(&|row| row.is_primary() && !row.to_delete)?;
        tracing::info!("Server {} replicating {} lists", self.server_id, primaries.len());

        for record in &primaries {
            let outcome = self.replicate_record(&ring, record, false).await;
            tracing::debug!("List {} now on {:?}", record.list_uuid, outcome.acknowledged);
        }
        Ok(primaries.len())
    }
}

/// Whether `row` sits on the virtual node `ring` makes responsible for its list.
fn owns(ring: &HashRing, row: &ListRecord) -> bool {
    ring.responsible_node(&row.list_uuid.to_string()) == Some(row.virtual_node)
}
