use super::service::ReplicaNode;
use crate::protocol::{Message, ReplicaWrite, ReplicationLevel, Transport};
use crate::ring::{HashRing, VirtualNodeId};
use crate::storage::ListRecord;

/// Where one fan-out ended up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutOutcome {
    /// Virtual nodes that stored a copy, in the order they acknowledged.
    pub acknowledged: Vec<VirtualNodeId>,
    /// Subset of `acknowledged` that holds the copy as a hint for a missing slot.
    pub hinted: Vec<VirtualNodeId>,
    /// Candidates that did not answer or refused the copy.
    pub unreachable: Vec<VirtualNodeId>,
}

impl<T: Transport> ReplicaNode<T> {
    /// Pushes `record` to the replica set of its key under `ring`.
    ///
    /// The first `replica_count` ring successors of the responsible node are the
    /// canonical slots (levels 1, 2, ...). Later candidates only stand in for a slot
    /// that is still uncovered, at that slot's level and with a hint pointing at it.
    /// Stops once every slot is covered or candidates run out.
    pub async fn replicate_record(&self, ring: &HashRing, record: &ListRecord, created: bool) -> FanoutOutcome {
        let mut outcome = FanoutOutcome::default();
        let Some(primary) = ring.responsible_node(&record.list_uuid.to_string()) else {
            tracing::warn!("No ring installed, list {} not replicated", record.list_uuid);
            return outcome;
        };

        let candidates = ring.nodes_for_replication(primary, self.config.fanout_candidates);
        let slots: Vec<VirtualNodeId> = candidates.iter().take(self.config.replica_count).copied().collect();
        let mut covered = vec![false; slots.len()];

        for (position, &candidate) in candidates.iter().enumerate() {
            let (slot, hint) = if position < slots.len() {
                (position, None)
            } else {
                match covered.iter().position(|done| !done) {
                    Some(slot) => (slot, Some(slots[slot])),
                    None => break,
                }
            };

            let write = ReplicaWrite {
                virtual_node: candidate,
                list_uuid: record.list_uuid,
                list_name: record.list_name.clone(),
                list_content: record.content.clone(),
                replication_level: ReplicationLevel::successor(slot),
                hinted_handoff: hint,
            };

            if self.push_replica(write, created).await {
                covered[slot] = true;
                outcome.acknowledged.push(candidate);
                if hint.is_some() {
                    outcome.hinted.push(candidate);
                }
            } else {
                outcome.unreachable.push(candidate);
            }

            if covered.iter().all(|done| *done) {
                break;
            }
        }

        if outcome.acknowledged.len() < slots.len() {
            tracing::warn!(
                "List {} has only {} of {} replicas",
                record.list_uuid,
                outcome.acknowledged.len(),
                slots.len()
            );
        }
        outcome
    }

    /// Stores one copy, directly when the target is on this server.
    async fn push_replica(&self, write: ReplicaWrite, created: bool) -> bool {
        let target = write.virtual_node;
        if self.is_local(target) {
            return match self.apply_replica(write).await {
                Ok(_) => true,
                Err(e) => {
                    tracing::error!("Local replica on {} failed: {}", target, e);
                    false
                }
            };
        }

        let message = if created {
            Message::ReplicateCreationList(write)
        } else {
            Message::ReplicateUpdateList(write)
        };
        match self.send_to(target, &message).await {
            Ok(reply) if reply.is_ack() => true,
            Ok(reply) => {
                tracing::warn!("{} refused replica: {:?}", target, reply);
                false
            }
            Err(e) => {
                tracing::warn!("Replica target {} unreachable: {}", target, e);
                false
            }
        }
    }
}
