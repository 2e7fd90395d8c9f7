use std::{
  num::NonZeroUsize,
  sync::{Mutex, PoisonError},
};

use tracing::debug;

use crate::{config::DEFAULT_MAX_ENTRIES, lru::LruCache};

/// Hash to query text store shared by every connection of the gateway.
///
/// All access goes through one lock, so a reader never observes a half-applied
/// insertion or eviction.
#[derive(Debug)]
pub struct PersistedQueryCache {
  store: Mutex<LruCache<String, String>>,
}

impl Default for PersistedQueryCache {
  fn default() -> Self {
    Self::new(DEFAULT_MAX_ENTRIES)
  }
}

impl PersistedQueryCache {
  /// Creates an empty cache. A capacity of zero is raised to one.
  pub fn new(max_entries: usize) -> Self {
    let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);

    PersistedQueryCache {
      store: Mutex::new(LruCache::new(capacity)),
    }
  }

  pub fn get(&self, hash: &str) -> Option<String> {
    self.lock().get(hash).cloned()
  }

  pub fn put(&self, hash: impl Into<String>, query: impl Into<String>) {
    if let Some((evicted, _)) = self.lock().put(hash.into(), query.into()) {
      debug!("persisted query cache is full, evicted hash {}", evicted);
    }
  }

  pub fn contains(&self, hash: &str) -> bool {
    self.lock().contains(hash)
  }

  pub fn len(&self) -> usize {
    self.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn capacity(&self) -> usize {
    self.lock().capacity()
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<String, String>> {
    // A panic while holding the lock cannot leave the list half-linked: every
    // mutation completes before the guard is released.
    self.store.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

#[cfg(test)]
mod tests {
  use std::{sync::Arc, thread};

  use super::*;

  #[test]
  fn capacity_two_scenario() {
    let cache = PersistedQueryCache::new(2);
    cache.put("h1", "q1");
    cache.put("h2", "q2");

    assert_eq!(cache.get("h1").as_deref(), Some("q1"));

    cache.put("h3", "q3");

    assert_eq!(cache.get("h2"), None);
    assert_eq!(cache.get("h1").as_deref(), Some("q1"));
    assert_eq!(cache.get("h3").as_deref(), Some("q3"));
  }

  #[test]
  fn zero_capacity_is_raised_to_one() {
    let cache = PersistedQueryCache::new(0);
    cache.put("h1", "q1");

    assert_eq!(cache.capacity(), 1);
    assert_eq!(cache.len(), 1);
  }

  #[test]
  fn default_capacity() {
    assert_eq!(PersistedQueryCache::default().capacity(), 100);
  }

  #[test]
  fn concurrent_writers_never_exceed_capacity() {
    let cache = Arc::new(PersistedQueryCache::new(8));

    let handles = (0..4)
      .map(|worker| {
        let cache = cache.clone();

        thread::spawn(move || {
          for i in 0..200 {
            let hash = format!("h{}", (worker * 31 + i) % 20);
            cache.put(hash.clone(), format!("q-{hash}"));

            if let Some(query) = cache.get(&hash) {
              assert_eq!(query, format!("q-{hash}"));
            }
          }
        })
      })
      .collect::<Vec<_>>();

    for handle in handles {
      handle.join().unwrap();
    }

    assert_eq!(cache.len(), 8);
  }
}
