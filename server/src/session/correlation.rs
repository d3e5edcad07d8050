//! Correlation tables bridging multi-step flows across requests

use indexmap::IndexMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Map from a server-issued identifier to a locally held payload.
///
/// Entries are kept in insertion order. When a capacity is set, registering
/// past it evicts the oldest entry; a capacity of `0` never evicts.
pub struct CorrelationTable<V> {
    name: &'static str,
    entries: RwLock<IndexMap<String, V>>,
    capacity: usize,
}

impl<V: Clone> CorrelationTable<V> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            entries: RwLock::new(IndexMap::new()),
            capacity,
        }
    }

    /// Insert or refresh `id`. Refreshing moves the entry to the newest slot.
    pub async fn register(&self, id: impl Into<String>, payload: V) {
        let mut entries = self.entries.write().await;
        self.insert_locked(&mut entries, id.into(), payload);
    }

    /// Insert a batch under a single lock acquisition
    pub async fn register_all<I>(&self, items: I) -> usize
    where
        I: IntoIterator<Item = (String, V)>,
    {
        let mut entries = self.entries.write().await;
        let mut count = 0;
        for (id, payload) in items {
            self.insert_locked(&mut entries, id, payload);
            count += 1;
        }
        count
    }

    /// Look up `id`, returning a copy of its payload
    pub async fn resolve(&self, id: &str) -> Option<V> {
        self.entries.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn insert_locked(&self, entries: &mut IndexMap<String, V>, id: String, payload: V) {
        // Re-insert so a refreshed id counts as the most recent one
        entries.shift_remove(&id);
        entries.insert(id, payload);

        if self.capacity > 0 {
            while entries.len() > self.capacity {
                if let Some((evicted, _)) = entries.shift_remove_index(0) {
                    debug!("Evicted {} from {} table", evicted, self.name);
                }
            }
        }
    }
}
