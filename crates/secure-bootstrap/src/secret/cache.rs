//! [`SecretsCache`]: read-through cache of secret groups.

use std::collections::HashMap;

use tokio::sync::RwLock;

type Group = HashMap<String, String>;

#[derive(Debug, Default)]
struct CacheState {
    groups: HashMap<String, Group>,
    /// Bumped by every [`SecretsCache::clear`].
    generation: u64,
}

/// In-memory map from secret name to its cached key/value pairs.
///
/// Backed by a fair [`RwLock`]: lookups share the lock, updates and
/// invalidation take it exclusively and are not starved by readers.
///
/// Populating after a store read is tied to the generation observed before
/// the read, so a read that overlaps an invalidation cannot put pre-write
/// values back.
#[derive(Debug, Default)]
pub struct SecretsCache {
    inner: RwLock<CacheState>,
}

impl SecretsCache {
    /// Create a new, empty [`SecretsCache`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `keys` of group `name`.
    ///
    /// A hit requires every requested key to be cached; one missing key makes
    /// the whole lookup a miss. With no keys, a hit only requires the group to
    /// exist and returns everything cached for it.
    pub async fn get(&self, name: &str, keys: &[&str]) -> Option<Group> {
        let guard = self.inner.read().await;
        let group = guard.groups.get(name)?;

        if keys.is_empty() {
            return Some(group.clone());
        }

        keys.iter()
            .map(|k| group.get(*k).map(|v| ((*k).to_owned(), v.clone())))
            .collect()
    }

    /// Current invalidation generation. Capture it before reading the store
    /// and hand it back to [`update`](Self::update).
    pub async fn generation(&self) -> u64 {
        self.inner.read().await.generation
    }

    /// Upsert `secrets` into group `name`. Keys absent from `secrets` are kept.
    ///
    /// Skipped, returning `false`, when the cache was cleared since
    /// `generation` was observed.
    pub async fn update(&self, name: &str, secrets: &Group, generation: u64) -> bool {
        let mut guard = self.inner.write().await;
        if guard.generation != generation {
            return false;
        }
        let group = guard.groups.entry(name.to_owned()).or_default();
        for (k, v) in secrets {
            group.insert(k.clone(), v.clone());
        }
        true
    }

    /// Drop every cached group and start a new generation.
    pub async fn clear(&self) {
        let mut guard = self.inner.write().await;
        guard.groups.clear();
        guard.generation = guard.generation.wrapping_add(1);
    }

    /// Number of cached groups.
    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.inner.read().await.groups.len()
    }

    #[cfg(test)]
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(pairs: &[(&str, &str)]) -> Group {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    async fn fill(cache: &SecretsCache, name: &str, pairs: &[(&str, &str)]) {
        let generation = cache.generation().await;
        assert!(cache.update(name, &group(pairs), generation).await);
    }

    #[tokio::test]
    async fn initially_empty() {
        let cache = SecretsCache::new();
        assert!(cache.is_empty().await);
        assert!(cache.get("db", &[]).await.is_none());
    }

    #[tokio::test]
    async fn partial_key_lookup_is_a_miss() {
        let cache = SecretsCache::new();
        fill(&cache, "g", &[("a", "1")]).await;

        assert_eq!(cache.get("g", &["a"]).await, Some(group(&[("a", "1")])));
        assert!(cache.get("g", &["a", "b"]).await.is_none());
    }

    #[tokio::test]
    async fn no_keys_requires_only_the_group() {
        let cache = SecretsCache::new();
        fill(&cache, "g", &[("a", "1"), ("b", "2")]).await;
        assert_eq!(cache.get("g", &[]).await.map(|g| g.len()), Some(2));
        assert!(cache.get("other", &[]).await.is_none());
    }

    #[tokio::test]
    async fn update_upserts_without_deleting() {
        let cache = SecretsCache::new();
        fill(&cache, "g", &[("a", "1"), ("b", "2")]).await;
        fill(&cache, "g", &[("b", "3"), ("c", "4")]).await;

        let got = cache.get("g", &["a", "b", "c"]).await.unwrap();
        assert_eq!(got, group(&[("a", "1"), ("b", "3"), ("c", "4")]));
    }

    #[tokio::test]
    async fn clear_drops_every_group() {
        let cache = SecretsCache::new();
        fill(&cache, "g1", &[("a", "1")]).await;
        fill(&cache, "g2", &[("a", "1")]).await;
        assert_eq!(cache.len().await, 2);

        cache.clear().await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn update_from_before_a_clear_is_dropped() {
        let cache = SecretsCache::new();
        let before = cache.generation().await;

        cache.clear().await;
        assert!(!cache.update("db", &group(&[("password", "old")]), before).await);
        assert!(cache.get("db", &[]).await.is_none());

        let now = cache.generation().await;
        assert_ne!(now, before);
        assert!(cache.update("db", &group(&[("password", "new")]), now).await);
        assert_eq!(cache.get("db", &["password"]).await, Some(group(&[("password", "new")])));
    }
}
