use super::store::{KeyValueStore, ListRecord, RecordFilter, RecordKey, StoreError};
use crate::ring::VirtualNodeId;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use uuid::Uuid;

/// In-memory table: virtual node -> (list uuid -> record).
///
/// Writers of one virtual node hold that node's outer entry while they work, which
/// serializes read-modify-write cycles on the same key.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    partitions: Arc<DashMap<VirtualNodeId, DashMap<Uuid, ListRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record stored under `virtual_node`.
    pub fn dump_partition(&self, virtual_node: VirtualNodeId) -> Vec<ListRecord> {
        self.partitions
            .get(&virtual_node)
            .map(|partition| partition.iter().map(|entry| entry.value().clone()).collect())
            .unwrap_or_default()
    }

    /// Virtual nodes with a partition allocated. Empty partitions are dropped eagerly.
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &RecordKey) -> Result<Option<ListRecord>, StoreError> {
        let Some(partition) = self.partitions.get(&key.virtual_node) else {
            return Ok(None);
        };
        Ok(partition.get(&key.list_uuid).map(|record| record.value().clone()))
    }

    fn put(&self, record: ListRecord) -> Result<(), StoreError> {
        let partition = self.partitions.entry(record.virtual_node).or_default();
        partition.insert(record.list_uuid, record);
        Ok(())
    }

    fn delete(&self, key: &RecordKey) -> Result<bool, StoreError> {
        let Entry::Occupied(occupied) = self.partitions.entry(key.virtual_node) else {
            return Ok(false);
        };
        let removed = occupied.get().remove(&key.list_uuid).is_some();
        if occupied.get().is_empty() {
            occupied.remove();
        }
        Ok(removed)
    }

    fn scan(&self, filter: RecordFilter<'_>) -> Result<Vec<ListRecord>, StoreError> {
        let mut records = Vec::new();
        for partition in self.partitions.iter() {
            for entry in partition.value().iter() {
                if filter(entry.value()) {
                    records.push(entry.value().clone());
                }
            }
        }
        Ok(records)
    }

    fn update(
        &self,
        key: &RecordKey,
        change: &mut dyn FnMut(Option<ListRecord>) -> Option<ListRecord>,
    ) -> Result<Option<ListRecord>, StoreError> {
        match self.partitions.entry(key.virtual_node) {
            Entry::Occupied(occupied) => {
                let current = occupied
                    .get()
                    .get(&key.list_uuid)
                    .map(|record| record.value().clone());
                match change(current) {
                    Some(next) => {
                        occupied.get().insert(key.list_uuid, next.clone());
                        Ok(Some(next))
                    }
                    None => {
                        occupied.get().remove(&key.list_uuid);
                        if occupied.get().is_empty() {
                            occupied.remove();
                        }
                        Ok(None)
                    }
                }
            }
            // Nothing is allocated unless the change actually stores a row.
            Entry::Vacant(vacant) => match change(None) {
                Some(next) => {
                    let partition = DashMap::new();
                    partition.insert(key.list_uuid, next.clone());
                    vacant.insert(partition);
                    Ok(Some(next))
                }
                None => Ok(None),
            },
        }
    }
}
