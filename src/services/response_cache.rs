//! Optional read-through cache for per-owner file listings.
//!
//! Purely an optimization, never load-bearing: entries expire on a TTL and
//! are invalidated whenever a mutating operation touches the same owner's
//! records. Scoped per owner so one caller's mutations never serve another
//! caller stale data.

use crate::models::uploaded_file::UploadedFile;
use dashmap::DashMap;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use uuid::Uuid;

#[derive(Clone)]
pub struct ResponseCache {
    entries: Arc<DashMap<Uuid, CachedListing>>,
    ttl: Duration,
}

struct CachedListing {
    stored_at: Instant,
    files: Vec<UploadedFile>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Fresh listing for an owner, if one is cached.
    pub fn get(&self, owner_id: Uuid) -> Option<Vec<UploadedFile>> {
        let expired = match self.entries.get(&owner_id) {
            Some(entry) if entry.stored_at.elapsed() <= self.ttl => {
                return Some(entry.files.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(&owner_id);
        }
        None
    }

    pub fn put(&self, owner_id: Uuid, files: Vec<UploadedFile>) {
        self.entries.insert(
            owner_id,
            CachedListing {
                stored_at: Instant::now(),
                files,
            },
        );
    }

    /// Drop the cached listing after any mutation of this owner's records.
    pub fn invalidate(&self, owner_id: Uuid) {
        self.entries.remove(&owner_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_invalidate_cycle() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        let owner = Uuid::new_v4();

        assert!(cache.get(owner).is_none());
        cache.put(owner, Vec::new());
        assert_eq!(cache.get(owner).unwrap().len(), 0);

        cache.invalidate(owner);
        assert!(cache.get(owner).is_none());
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = ResponseCache::new(Duration::ZERO);
        let owner = Uuid::new_v4();
        cache.put(owner, Vec::new());
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(owner).is_none());
    }

    #[test]
    fn owners_are_isolated() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        cache.put(a, Vec::new());
        cache.put(b, Vec::new());

        cache.invalidate(a);
        assert!(cache.get(a).is_none());
        assert!(cache.get(b).is_some());
    }
}
