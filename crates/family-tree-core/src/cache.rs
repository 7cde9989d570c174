//! Explicit cache for the normalized node list.
//!
//! Owned by [`FamilyService`](crate::service::FamilyService). Entries never
//! expire on their own; every successful write calls
//! [`TreeCache::invalidate`]. A value computed while an invalidation
//! happened is returned to its caller but not stored.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use anyhow::{anyhow, Result};

use crate::models::NormalizedNode;

pub type SharedNodes = Arc<Vec<NormalizedNode>>;

#[derive(Default)]
pub struct TreeCache {
    nodes: RwLock<Option<SharedNodes>>,
    generation: AtomicU64,
}

impl TreeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<SharedNodes> {
        self.nodes.read().ok().and_then(|slot| slot.clone())
    }

    /// Returns the cached list, or runs `compute` and stores its result.
    pub async fn get_or_compute<F, Fut>(&self, compute: F) -> Result<SharedNodes>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<NormalizedNode>>>,
    {
        if let Some(hit) = self.get() {
            return Ok(hit);
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let fresh = Arc::new(compute().await?);

        let mut slot = self
            .nodes
            .write()
            .map_err(|_| anyhow!("tree cache lock poisoned"))?;
        if self.generation.load(Ordering::SeqCst) == generation {
            *slot = Some(fresh.clone());
        }
        Ok(fresh)
    }

    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut slot) = self.nodes.write() {
            *slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PersonRecord;
    use std::sync::atomic::AtomicUsize;

    fn node(id: &str) -> NormalizedNode {
        NormalizedNode {
            person: PersonRecord::new(id, id),
            parents: vec![],
            children: vec![],
            spouses: vec![],
            siblings: vec![],
        }
    }

    #[tokio::test]
    async fn test_computes_once_until_invalidated() {
        let cache = TreeCache::new();
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let compute = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            anyhow::Ok(vec![node("a")])
        };

        cache.get_or_compute(compute).await.unwrap();
        cache.get_or_compute(compute).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.invalidate();
        assert!(cache.get().is_none());
        let nodes = cache.get_or_compute(compute).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(nodes[0].person.id, "a");
    }

    #[tokio::test]
    async fn test_invalidation_during_compute_is_not_stored() {
        let cache = TreeCache::new();
        let shared = &cache;
        let nodes = cache
            .get_or_compute(move || async move {
                shared.invalidate();
                Ok(vec![node("stale")])
            })
            .await
            .unwrap();
        assert_eq!(nodes.len(), 1);
        assert!(cache.get().is_none());
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let cache = TreeCache::new();
        let result = cache
            .get_or_compute(|| async { Err(anyhow!("database is locked")) })
            .await;
        assert!(result.is_err());
        assert!(cache.get().is_none());
    }
}
