use super::hash_ring::HashRing;

use std::sync::Arc;
use tokio::sync::RwLock;

/// Process-wide handle to the current ring.
///
/// Readers get an immutable snapshot that stays valid for the whole operation;
/// writers replace the ring as a unit.
#[derive(Debug, Clone)]
pub struct SharedRing {
    current: Arc<RwLock<Arc<HashRing>>>,
}

impl SharedRing {
    pub fn new(ring: HashRing) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(ring))),
        }
    }

    pub async fn snapshot(&self) -> Arc<HashRing> {
        self.current.read().await.clone()
    }

    /// Installs `ring` and returns the ring it replaced.
    pub async fn replace(&self, ring: HashRing) -> Arc<HashRing> {
        let mut guard = self.current.write().await;
        std::mem::replace(&mut *guard, Arc::new(ring))
    }

    /// Applies `change` to a copy of the current ring and installs the result.
    ///
    /// The write lock is held across the change, so concurrent updates serialize.
    pub async fn update<F, T>(&self, change: F) -> (Arc<HashRing>, T)
    where
        F: FnOnce(&mut HashRing) -> T,
    {
        let mut guard = self.current.write().await;
        let mut next = (**guard).clone();
        let result = change(&mut next);
        let next = Arc::new(next);
        *guard = next.clone();
        (next, result)
    }
}
