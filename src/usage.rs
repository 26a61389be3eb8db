use tracing::{debug, warn};

use crate::store::{read_seconds, SharedStore};

/// Seconds of interaction accumulated under one store key.
///
/// Every increment is written through immediately. The counter never
/// decreases except through [`UsageCounter::reset`], which only the quota
/// clock calls on rollover.
pub struct UsageCounter {
    key: &'static str,
    store: SharedStore,
    used_secs: u64,
}

impl UsageCounter {
    pub fn new(key: &'static str, store: SharedStore) -> Self {
        let mut counter = Self {
            key,
            store,
            used_secs: 0,
        };
        counter.load();
        counter
    }

    /// Re-reads the persisted value. Absent or corrupt reads as zero.
    pub fn load(&mut self) -> u64 {
        self.used_secs = read_seconds(self.store.as_ref(), self.key);
        debug!("Loaded {}={}", self.key, self.used_secs);
        self.used_secs
    }

    pub fn tick(&mut self) -> u64 {
        self.used_secs = self.used_secs.saturating_add(1);
        self.persist();
        self.used_secs
    }

    pub fn used_secs(&self) -> u64 {
        self.used_secs
    }

    pub(crate) fn reset(&mut self) {
        self.used_secs = 0;
        self.persist();
    }

    fn persist(&self) {
        if let Err(e) = self.store.set(self.key, &self.used_secs.to_string()) {
            warn!("Failed to persist {}: {}", self.key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{KeyValueStore, MemoryStore, DEMO_USAGE_KEY};
    use std::sync::Arc;

    #[test]
    fn absent_value_loads_as_zero() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let counter = UsageCounter::new(DEMO_USAGE_KEY, store);
        assert_eq!(counter.used_secs(), 0);
    }

    #[test]
    fn n_ticks_add_n_and_persist_each() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        store.set(DEMO_USAGE_KEY, "7").unwrap();
        let mut counter = UsageCounter::new(DEMO_USAGE_KEY, store.clone());

        for n in 1..=25u64 {
            assert_eq!(counter.tick(), 7 + n);
            assert_eq!(store.get(DEMO_USAGE_KEY), Some((7 + n).to_string()));
        }
    }

    #[test]
    fn reload_picks_up_persisted_value() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let mut first = UsageCounter::new(DEMO_USAGE_KEY, store.clone());
        first.tick();
        first.tick();

        let mut second = UsageCounter::new(DEMO_USAGE_KEY, store.clone());
        assert_eq!(second.used_secs(), 2);
        store.set(DEMO_USAGE_KEY, "garbage").unwrap();
        assert_eq!(second.load(), 0);
    }
}
