//! Consistent-Hash Ring
//!
//! Maps list keys onto virtual nodes and defines the replica set of every key.
//!
//! ## Core Concepts
//! - **Virtual nodes**: each physical server owns several ring positions (`S<server>V<index>`),
//!   hashed with SHA-256 modulo a small fixed modulus.
//! - **Responsibility**: a key belongs to the first virtual node whose hash is >= the key's
//!   hash, wrapping around to the smallest entry.
//! - **Replica set**: the ring successors of the responsible node hold levels 1 and 2.
//! - **Sharing**: `SharedRing` hands out immutable snapshots and swaps in whole new rings on
//!   membership changes, so a lookup never sees a half-applied topology.

pub mod hash_ring;
pub mod shared;
pub mod types;

pub use hash_ring::{HashRing, ring_hash};
pub use shared::SharedRing;
pub use types::{RingError, VirtualNode, VirtualNodeId};

#[cfg(test)]
mod tests;
