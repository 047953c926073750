//! Replicated Shopping-List Store
//!
//! This library crate holds the cluster logic; the binary (`main.rs`) wires it to HTTP.
//!
//! ## Architecture Modules
//! Lists are spread over a consistent-hash ring and kept on three servers each:
//!
//! - **`crdt`**: PN-Counters and the per-list map of them. Every copy of a list converges
//!   by merging, so replicas never need to agree on an order of writes.
//! - **`ring`**: the consistent-hash ring with virtual nodes. Decides which server owns a
//!   list and which servers hold its replicas.
//! - **`protocol`**: the JSON message envelope shared by routers and servers, and the
//!   `Transport` seam used to deliver it.
//! - **`storage`**: per-server list rows (in memory or on disk) with the bookkeeping flags
//!   that rebalancing relies on.
//! - **`node`**: the storage server. Applies writes, replicates them, hands hints back and
//!   rebalances when the ring changes.
//! - **`router`**: the front door. Routes client requests and drives joins and leaves.
//! - **`config`**: addresses, ring geometry and timers.

pub mod config;
pub mod crdt;
pub mod node;
pub mod protocol;
pub mod ring;
pub mod router;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;
