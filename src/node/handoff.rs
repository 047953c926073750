use super::service::ReplicaNode;
use crate::protocol::{Message, ReplicaWrite, Transport};
use crate::storage::RecordKey;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

impl<T: Transport> ReplicaNode<T> {
    /// Starts the periodic hinted-handoff sweep. A zero interval disables it.
    pub fn start_handoff_loop(self: Arc<Self>) {
        let period = self.config.handoff_interval;
        if period.is_zero() {
            tracing::info!("Hinted handoff sweep disabled on server {}", self.server_id);
            return;
        }

        tokio::spawn(async move {
            // Spread the sweeps of servers started together.
            let jitter = rand::random::<u64>() % (period.as_millis() as u64).max(1);
            tokio::time::sleep(Duration::from_millis(jitter)).await;

            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                match self.forward_hints().await {
                    Ok(0) => {}
                    Ok(delivered) => tracing::info!("Server {} delivered {} hinted lists", self.server_id, delivered),
                    Err(e) => tracing::error!("Hinted handoff sweep failed on server {}: {}", self.server_id, e),
                }
            }
        });
    }

    /// Sends every hinted copy to the owner it stands in for. Copies the owner
    /// acknowledges are removed locally. Returns how many were delivered.
    pub async fn forward_hints(&self) -> Result<usize> {
        let hinted = self
            .store
            .scan(&|row| row.hinted_handoff.is_some() && !row.to_delete)?;
        let mut delivered = 0;

        for record in hinted {
            let Some(owner) = record.hinted_handoff else {
                continue;
            };
            let write = ReplicaWrite {
                virtual_node: owner,
                list_uuid: record.list_uuid,
                list_name: record.list_name.clone(),
                list_content: record.content.clone(),
                replication_level: record.replication_level,
                hinted_handoff: None,
            };

            let accepted = if self.is_local(owner) {
                self.apply_replica(write).await.is_ok()
            } else {
                match self.send_to(owner, &Message::ReplicateList(write)).await {
                    Ok(reply) => reply.is_ack(),
                    Err(e) => {
                        tracing::debug!("Hint owner {} still unreachable: {}", owner, e);
                        false
                    }
                }
            };
            if !accepted {
                continue;
            }

            // Drop the hint only if no newer write replaced it meanwhile.
            let sent = record.content.clone();
            self.store.update(&RecordKey::new(record.virtual_node, record.list_uuid), &mut |current| {
                match current {
                    Some(row) if row.hinted_handoff == Some(owner) && row.content == sent => None,
                    other => other,
                }
            })?;
            tracing::info!("Handed list {} back to {}", record.list_uuid, owner);
            delivered += 1;
        }
        Ok(delivered)
    }
}
