use std::{
    any::Any,
    fmt::{self, Display},
    sync::Arc,
    time::Duration,
};

use dashmap::DashMap;
use ethers::types::Address;
use tokio::time::Instant;

/// Identity of one view call: contract address, function name and the
/// rendered arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub address: Address,
    pub function: &'static str,
    pub args: Vec<String>,
}

impl QueryKey {
    pub fn new(address: Address, function: &'static str) -> Self {
        Self {
            address,
            function,
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Display) -> Self {
        self.args.push(arg.to_string());
        self
    }
}

impl Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}.{}({})", self.address, self.function, self.args.join(","))
    }
}

struct Entry {
    value: Arc<dyn Any + Send + Sync>,
    fetched_at: Instant,
}

/// Upper bound on cached queries unless configured otherwise.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Last successful result per query. Entries older than the staleness
/// window are treated as missing and dropped; once `max_entries` is reached
/// stale entries are swept and, if that is not enough, the oldest one goes.
pub struct QueryCache {
    entries: DashMap<QueryKey, Entry>,
    stale_after: Duration,
    max_entries: usize,
}

impl QueryCache {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            stale_after,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    fn is_stale(&self, entry: &Entry) -> bool {
        entry.fetched_at.elapsed() >= self.stale_after
    }

    pub fn get<T: Clone + Send + Sync + 'static>(&self, key: &QueryKey) -> Option<T> {
        {
            let entry = self.entries.get(key)?;
            if !self.is_stale(&entry) {
                return entry.value.downcast_ref::<T>().cloned();
            }
        }
        self.entries.remove_if(key, |_, entry| self.is_stale(entry));
        None
    }

    pub fn insert<T: Send + Sync + 'static>(&self, key: QueryKey, value: T) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            self.make_room();
        }
        self.entries.insert(
            key,
            Entry {
                value: Arc::new(value),
                fetched_at: Instant::now(),
            },
        );
    }

    /// Removes every stale entry and returns how many went.
    pub fn sweep(&self) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = !self.is_stale(entry);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    fn make_room(&self) {
        if self.sweep() > 0 && self.entries.len() < self.max_entries {
            return;
        }
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().fetched_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }

    pub fn invalidate(&self, key: &QueryKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drops every cached query against `address` whose function is one of
    /// `functions`, whatever its arguments.
    pub fn invalidate_functions(&self, address: Address, functions: &[&str]) -> usize {
        let mut removed = 0;
        self.entries.retain(|key, _| {
            let matches = key.address == address && functions.contains(&key.function);
            if matches {
                removed += 1;
            }
            !matches
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entries_go_stale() {
        let cache = QueryCache::new(Duration::from_secs(300));
        let key = QueryKey::new(Address::repeat_byte(1), "name");
        cache.insert(key.clone(), "Harbor".to_string());
        assert_eq!(cache.get::<String>(&key), Some("Harbor".to_string()));

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(cache.get::<String>(&key).is_some());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get::<String>(&key).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_entries_are_dropped() {
        let cache = QueryCache::new(Duration::from_secs(300));
        let archive = Address::repeat_byte(5);
        let keys: Vec<QueryKey> = (0..10_000u64)
            .map(|offset| QueryKey::new(archive, "getDonors").arg(offset).arg(10))
            .collect();
        for key in &keys {
            cache.insert(key.clone(), 1u8);
        }
        assert_eq!(cache.len(), 10_000);

        tokio::time::advance(Duration::from_secs(3600)).await;
        for key in &keys[..100] {
            assert!(cache.get::<u8>(key).is_none());
        }
        assert_eq!(cache.len(), 9_900);
        assert_eq!(cache.sweep(), 9_900);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_size_is_bounded() {
        let cache = QueryCache::new(Duration::from_secs(300)).with_max_entries(3);
        let archive = Address::repeat_byte(6);
        let key = |id: u64| QueryKey::new(archive, "getArtifact").arg(id);
        for id in 0..3 {
            cache.insert(key(id), id);
            tokio::time::advance(Duration::from_secs(1)).await;
        }

        // all fresh: the oldest makes room
        cache.insert(key(3), 3u64);
        assert_eq!(cache.len(), 3);
        assert!(cache.get::<u64>(&key(0)).is_none());
        assert_eq!(cache.get::<u64>(&key(3)), Some(3));

        // overwriting an existing key never evicts
        cache.insert(key(3), 33u64);
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get::<u64>(&key(1)), Some(1));

        tokio::time::advance(Duration::from_secs(300)).await;
        cache.insert(key(4), 4u64);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_wrong_type_is_a_miss() {
        let cache = QueryCache::new(Duration::from_secs(300));
        let key = QueryKey::new(Address::zero(), "totalArchives");
        cache.insert(key.clone(), 5u64);
        assert_eq!(cache.get::<String>(&key), None);
        assert_eq!(cache.get::<u64>(&key), Some(5));
    }

    #[test]
    fn test_keys_include_arguments() {
        let cache = QueryCache::new(Duration::from_secs(300));
        let archive = Address::repeat_byte(2);
        let first = QueryKey::new(archive, "getDonors").arg(0).arg(10);
        let second = QueryKey::new(archive, "getDonors").arg(10).arg(10);
        cache.insert(first.clone(), 1u8);
        assert!(cache.get::<u8>(&second).is_none());
        assert_eq!(first.to_string(), format!("{:?}.getDonors(0,10)", archive));
    }

    #[test]
    fn test_invalidate_functions() {
        let cache = QueryCache::new(Duration::from_secs(300));
        let archive = Address::repeat_byte(3);
        let other = Address::repeat_byte(4);
        cache.insert(QueryKey::new(archive, "getDonors").arg(0).arg(10), 1u8);
        cache.insert(QueryKey::new(archive, "getDonors").arg(10).arg(10), 1u8);
        cache.insert(QueryKey::new(archive, "name"), 1u8);
        cache.insert(QueryKey::new(other, "getDonors").arg(0).arg(10), 1u8);

        assert_eq!(cache.invalidate_functions(archive, &["getDonors"]), 2);
        assert_eq!(cache.len(), 2);
        assert!(cache.invalidate(&QueryKey::new(archive, "name")));
        assert!(!cache.invalidate(&QueryKey::new(archive, "name")));
    }
}
