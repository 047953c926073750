use crate::crdt::MapCrdt;
use crate::protocol::{KeyRecord, ReplicationLevel};
use crate::ring::VirtualNodeId;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Primary key of a stored copy: one row per (virtual node, list) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub virtual_node: VirtualNodeId,
    pub list_uuid: Uuid,
}

impl RecordKey {
    pub fn new(virtual_node: VirtualNodeId, list_uuid: Uuid) -> Self {
        Self {
            virtual_node,
            list_uuid,
        }
    }
}

/// One stored copy of a shopping list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListRecord {
    pub virtual_node: VirtualNodeId,
    pub list_uuid: Uuid,
    pub list_name: String,
    pub content: MapCrdt,
    pub replication_level: ReplicationLevel,
    /// Set during rebalancing; physically removed by `purge_marked`.
    #[serde(default)]
    pub to_delete: bool,
    /// Owner this copy is held for while that owner is unreachable.
    #[serde(default)]
    pub hinted_handoff: Option<VirtualNodeId>,
}

impl ListRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.virtual_node, self.list_uuid)
    }

    pub fn is_primary(&self) -> bool {
        self.replication_level.is_primary()
    }

    pub fn to_key_record(&self) -> KeyRecord {
        KeyRecord {
            list_uuid: self.list_uuid,
            list_name: self.list_name.clone(),
            list_content: self.content.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt record: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("corrupt storage key: {0:?}")]
    CorruptKey(String),
}

pub type RecordFilter<'a> = &'a dyn Fn(&ListRecord) -> bool;

/// Local table of list copies keyed by `(virtual node, list uuid)`.
///
/// `update` is the atomic read-modify-write every merge goes through: concurrent
/// updates of the same key are serialized by the implementation.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &RecordKey) -> Result<Option<ListRecord>, StoreError>;

    /// Inserts or replaces the row at `record.key()`.
    fn put(&self, record: ListRecord) -> Result<(), StoreError>;

    /// Returns whether a row was removed.
    fn delete(&self, key: &RecordKey) -> Result<bool, StoreError>;

    fn scan(&self, filter: RecordFilter<'_>) -> Result<Vec<ListRecord>, StoreError>;

    /// Replaces the row at `key` with `change(current)`. `None` leaves it absent.
    fn update(
        &self,
        key: &RecordKey,
        change: &mut dyn FnMut(Option<ListRecord>) -> Option<ListRecord>,
    ) -> Result<Option<ListRecord>, StoreError>;

    /// Flags matching rows for the next purge. Returns how many were flagged.
    fn mark_to_delete(&self, filter: RecordFilter<'_>) -> Result<usize, StoreError> {
        let mut marked = 0;
        for record in self.scan(&|record| !record.to_delete && filter(record))? {
            self.update(&record.key(), &mut |current| {
                current.map(|mut row| {
                    row.to_delete = true;
                    row
                })
            })?;
            marked += 1;
        }
        Ok(marked)
    }

    /// Moves matching rows to `level`. Returns how many were changed.
    fn set_replication_level(
        &self,
        filter: RecordFilter<'_>,
        level: ReplicationLevel,
    ) -> Result<usize, StoreError> {
        let mut changed = 0;
        for record in self.scan(&|record| record.replication_level != level && filter(record))? {
            self.update(&record.key(), &mut |current| {
                current.map(|mut row| {
                    row.replication_level = level;
                    row
                })
            })?;
            changed += 1;
        }
        Ok(changed)
    }

    /// Physically removes every row flagged `to_delete`.
    fn purge_marked(&self) -> Result<usize, StoreError> {
        let mut purged = 0;
        for record in self.scan(&|record| record.to_delete)? {
            // A write may have revived the row since the scan.
            let mut removed = false;
            self.update(&record.key(), &mut |current| match current {
                Some(row) if row.to_delete => {
                    removed = true;
                    None
                }
                other => other,
            })?;
            if removed {
                purged += 1;
            }
        }
        Ok(purged)
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.scan(&|_| true)?.len())
    }
}
