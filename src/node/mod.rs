//! Replica Node
//!
//! A storage server of the cluster. It owns the rows of its virtual nodes,
//! replicates every write to the ring successors and keeps ownership in step
//! with ring membership.
//!
//! ## Core Concepts
//! - **Write path**: a write is merged into the local row (never overwritten), answered,
//!   and then fanned out to the next ring successors on a background task.
//! - **Replication levels**: 0 marks the primary copy, 1 and 2 the successor copies.
//! - **Hinted handoff**: when a canonical successor is down, a later candidate keeps the
//!   copy with a pointer to it; a periodic sweep hands the copy back once it answers.
//! - **Rebalancing**: on join/leave every node re-checks ownership against the new ring,
//!   flags rows for deletion and rebuilds replicas via `replicateKeys`.

pub mod handlers;
pub mod handoff;
pub mod rebalance;
pub mod replication;
pub mod service;

pub use replication::FanoutOutcome;
pub use service::ReplicaNode;
