use std::{
  borrow::Borrow,
  collections::HashMap,
  hash::Hash,
  mem,
  num::NonZeroUsize,
};

#[derive(Debug)]
struct Entry<K, V> {
  key: K,
  value: V,
  prev: Option<usize>,
  next: Option<usize>,
}

/// A bounded map with least-recently-used eviction.
///
/// Entries live in a slab and are linked into a recency list (head is the most
/// recently used). The index map points into the slab, so `get` and `put` are O(1).
/// Slots are never freed: once the cache is full, the evicted slot is reused.
#[derive(Debug)]
pub struct LruCache<K, V> {
  capacity: NonZeroUsize,
  index: HashMap<K, usize>,
  entries: Vec<Entry<K, V>>,
  head: Option<usize>,
  tail: Option<usize>,
}

impl<K, V> LruCache<K, V>
where
  K: Hash + Eq + Clone,
{
  pub fn new(capacity: NonZeroUsize) -> Self {
    LruCache {
      capacity,
      index: HashMap::with_capacity(capacity.get()),
      entries: Vec::with_capacity(capacity.get()),
      head: None,
      tail: None,
    }
  }

  pub fn capacity(&self) -> usize {
    self.capacity.get()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Returns the value and marks the entry as most recently used.
  pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    let idx = *self.index.get(key)?;
    self.touch(idx);

    Some(&self.entries[idx].value)
  }

  /// Returns the value without changing the recency order.
  pub fn peek<Q>(&self, key: &Q) -> Option<&V>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    self.index.get(key).map(|idx| &self.entries[*idx].value)
  }

  pub fn contains<Q>(&self, key: &Q) -> bool
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    self.index.contains_key(key)
  }

  /// Inserts or overwrites an entry and marks it as most recently used.
  ///
  /// When the key is new and the cache is full, the least recently used entry is
  /// evicted first and returned.
  pub fn put(&mut self, key: K, value: V) -> Option<(K, V)> {
    if let Some(&idx) = self.index.get(&key) {
      self.entries[idx].value = value;
      self.touch(idx);

      return None;
    }

    if self.entries.len() < self.capacity.get() {
      let idx = self.entries.len();
      self.entries.push(Entry {
        key: key.clone(),
        value,
        prev: None,
        next: None,
      });
      self.index.insert(key, idx);
      self.push_front(idx);

      return None;
    }

    // Full: the tail always exists here since capacity is non-zero.
    let idx = self.tail?;
    self.detach(idx);

    let entry = &mut self.entries[idx];
    let evicted_key = mem::replace(&mut entry.key, key.clone());
    let evicted_value = mem::replace(&mut entry.value, value);

    self.index.remove(&evicted_key);
    self.index.insert(key, idx);
    self.push_front(idx);

    Some((evicted_key, evicted_value))
  }

  /// Keys from the most to the least recently used.
  pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
    let mut cursor = self.head;

    std::iter::from_fn(move || {
      let idx = cursor?;
      let entry = &self.entries[idx];
      cursor = entry.next;

      Some(&entry.key)
    })
  }

  fn touch(&mut self, idx: usize) {
    if self.head == Some(idx) {
      return;
    }

    self.detach(idx);
    self.push_front(idx);
  }

  fn detach(&mut self, idx: usize) {
    let (prev, next) = {
      let entry = &self.entries[idx];
      (entry.prev, entry.next)
    };

    match prev {
      Some(p) => self.entries[p].next = next,
      None => self.head = next,
    }

    match next {
      Some(n) => self.entries[n].prev = prev,
      None => self.tail = prev,
    }

    let entry = &mut self.entries[idx];
    entry.prev = None;
    entry.next = None;
  }

  fn push_front(&mut self, idx: usize) {
    let old_head = self.head;

    {
      let entry = &mut self.entries[idx];
      entry.prev = None;
      entry.next = old_head;
    }

    if let Some(h) = old_head {
      self.entries[h].prev = Some(idx);
    }

    self.head = Some(idx);

    if self.tail.is_none() {
      self.tail = Some(idx);
    }
  }
}
