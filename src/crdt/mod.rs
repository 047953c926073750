//! Convergent List State
//!
//! State-based CRDTs that make concurrent edits to the same shopping list
//! converge without coordination.
//!
//! ## Core Concepts
//! - **PN-Counter**: per-actor increment and decrement tallies. Merging takes the
//!   per-actor maximum of each side, so no acknowledged edit is ever lost.
//! - **MapCrdt**: item name -> `PnCounter`. This is the replicated content of one list.
//! - **Merge**: a join on a semilattice. It is commutative, associative and idempotent,
//!   which is what lets replicas apply writes in any order and still agree.

pub mod map;
pub mod pn_counter;

pub use map::MapCrdt;
pub use pn_counter::PnCounter;

#[cfg(test)]
mod tests;

/// Join operation of a state-based CRDT.
///
/// Implementations must satisfy, for all states `a`, `b`, `c`:
/// - `a.merge(b) == b.merge(a)`
/// - `a.merge(b).merge(c) == a.merge(b.merge(c))`
/// - `a.merge(a) == a`
pub trait Merge: Sized + Clone {
    /// Returns the least upper bound of `self` and `other`.
    fn merge(&self, other: &Self) -> Self;

    /// In-place variant of [`Merge::merge`].
    fn merge_from(&mut self, other: &Self) {
        *self = self.merge(other);
    }
}
