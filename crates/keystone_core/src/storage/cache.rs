//! Read-through cache of own-hub descriptors.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::descriptor::Descriptor;

/// Descriptors last read from or written to the own hub, keyed by
/// `(owner identity, path)`.
///
/// Copies fetched from other members are never cached; they must be read
/// fresh on every fan-in.
#[derive(Debug, Default)]
pub struct DescriptorCache {
    entries: RwLock<HashMap<(String, String), Descriptor>>,
}

impl DescriptorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, owner: &str, path: &str) -> Option<Descriptor> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(&(owner.to_string(), path.to_string())).cloned()
    }

    /// Store the latest own copy, replacing any previous one.
    pub fn insert(&self, owner: &str, descriptor: Descriptor) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert((owner.to_string(), descriptor.path.clone()), descriptor);
    }

    pub fn invalidate(&self, owner: &str, path: &str) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(&(owner.to_string(), path.to_string()));
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::PathRequest;
    use serde_json::json;

    #[test]
    fn test_cache_is_keyed_by_owner() {
        let cache = DescriptorCache::new();
        let d = Descriptor::create(
            ".env",
            PathRequest::file("app/1", "default", ".env", "alice"),
            json!("A=1\n"),
            "alice",
        )
        .unwrap();

        cache.insert("alice", d.clone());
        assert_eq!(cache.get("alice", &d.path), Some(d.clone()));
        assert_eq!(cache.get("bob", &d.path), None);

        let mut newer = d.clone();
        newer.version = 3;
        cache.insert("alice", newer.clone());
        assert_eq!(cache.get("alice", &d.path).unwrap().version, 3);
        assert_eq!(cache.len(), 1);

        cache.invalidate("alice", &d.path);
        assert!(cache.is_empty());
    }
}
