//! Local List Storage
//!
//! Each replica keeps one row per (virtual node, list) pair it holds a copy of.
//!
//! ## Core Concepts
//! - **ListRecord**: the list's CRDT content plus bookkeeping: replication level,
//!   soft-delete flag and an optional hinted-handoff target.
//! - **KeyValueStore**: the storage contract (`get`/`put`/`delete`/`scan` plus an atomic
//!   `update`). Rebalancing helpers (`mark_to_delete`, `set_replication_level`,
//!   `purge_marked`) are built on top of it.
//! - **Backends**: `MemoryStore` (sharded `DashMap`, the default) and `DiskStore`
//!   (one JSON file per record, survives restarts).

pub mod disk;
pub mod memory;
pub mod store;

pub use disk::DiskStore;
pub use memory::MemoryStore;
pub use store::{KeyValueStore, ListRecord, RecordFilter, RecordKey, StoreError};
