//! Capacity-Bounded Storage Engine
//!
//! This module implements the core storage engine for lrukv.
//! It provides a thread-safe key-value map with a fixed total byte budget
//! and least-recently-used eviction.
//!
//! ## Design Decisions
//!
//! 1. **One Guarded Aggregate**: The map, the remaining-capacity counter and both
//!    recency indexes live behind a single `Mutex`. Capacity, mapping and
//!    recency can never drift apart because no operation touches one without
//!    the others.
//! 2. **Two Orderings**: Access-order (last successful `get`) decides eviction,
//!    modify-order (last successful `set`) decides `STREAM` output.
//! 3. **Fresh Keys Evict First**: A `set` resets the key's access record to
//!    "never accessed", so a value nobody has read is the first to go.
//! 4. **Evict-then-Insert in One Critical Section**: Concurrent observers see
//!    either the store before the `set` or after it, never in between.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌───────────────────────────────────────────────────────┐  │
//! │  │                  Mutex<Inner>                         │  │
//! │  │  ┌──────────┐ ┌───────────┐ ┌──────────┐ ┌──────────┐ │  │
//! │  │  │ HashMap  │ │ remaining │ │ accessed │ │ modified │ │  │
//! │  │  │ key→val  │ │  bytes    │ │  index   │ │  index   │ │  │
//! │  │  └──────────┘ └───────────┘ └──────────┘ └──────────┘ │  │
//! │  └───────────────────────────────────────────────────────┘  │
//! │   get/set/del counters (atomics, outside the lock)          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! `get` mutates the access index, so every operation takes the lock
//! exclusively. Critical sections are short and never span I/O.

use crate::storage::recency::{RecencyIndex, SortOrder, Touch};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::debug;

/// Errors returned by the storage engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The value is larger than the whole store, so no eviction can make room
    #[error("value too large: {size} bytes (capacity: {capacity})")]
    ValueTooLarge { size: usize, capacity: usize },
}

/// Everything guarded by the store lock.
#[derive(Debug)]
struct Inner {
    /// Key → value mapping
    data: HashMap<Bytes, Bytes>,
    /// Bytes still available
    remaining: usize,
    /// Ordering by last successful `get` (eviction order)
    accessed: RecencyIndex,
    /// Ordering by last successful `set` (stream order)
    modified: RecencyIndex,
}

impl Inner {
    fn new(capacity: usize) -> Self {
        Self {
            data: HashMap::new(),
            remaining: capacity,
            accessed: RecencyIndex::new(),
            modified: RecencyIndex::new(),
        }
    }

    /// Removes a key with both of its recency records and credits its bytes back.
    fn remove_entry(&mut self, key: &[u8]) -> Option<Bytes> {
        let value = self.data.remove(key)?;
        self.remaining += value.len();
        self.accessed.remove(key);
        self.modified.remove(key);
        Some(value)
    }

    /// Evicts least-recently-accessed keys until `needed` bytes are free or
    /// the store is empty. Returns the number of evicted keys.
    fn evict_until(&mut self, needed: usize) -> u64 {
        let mut evicted = 0;

        while self.remaining < needed {
            let victim = match self.accessed.oldest() {
                Some(key) => key.clone(),
                None => break,
            };

            match self.remove_entry(&victim) {
                Some(value) => {
                    debug!(
                        key = %String::from_utf8_lossy(&victim),
                        freed = value.len(),
                        "Evicted key"
                    );
                }
                // Index and map disagree; drop the orphan record so the loop makes progress
                None => {
                    self.accessed.remove(&victim);
                }
            }
            evicted += 1;
        }

        evicted
    }
}

/// Statistics about the storage engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageStats {
    /// Number of keys
    pub keys: u64,
    /// Configured total capacity in bytes
    pub capacity: u64,
    /// Bytes still available
    pub remaining: u64,
    /// Total GET operations
    pub get_ops: u64,
    /// Total SET operations
    pub set_ops: u64,
    /// Total DELETE operations
    pub del_ops: u64,
    /// Keys evicted to make room
    pub evicted: u64,
    /// SET operations rejected as too large
    pub rejected: u64,
}

/// The main storage engine for lrukv.
///
/// Stores values up to a fixed total byte budget. When a `set` does not fit,
/// the least recently accessed keys are evicted until it does.
///
/// # Thread Safety
///
/// This struct is designed to be wrapped in an `Arc` and shared across
/// all client handler tasks. All operations are thread-safe.
///
/// # Example
///
/// ```
/// use lrukv::storage::StorageEngine;
/// use bytes::Bytes;
///
/// let engine = StorageEngine::new(10);
///
/// engine.set(Bytes::from("a"), Bytes::from("12345")).unwrap();
/// engine.set(Bytes::from("b"), Bytes::from("12345")).unwrap();
/// assert_eq!(engine.remaining_capacity(), 0);
///
/// // "a" was never read, so it is evicted to make room for "c"
/// engine.set(Bytes::from("c"), Bytes::from("123")).unwrap();
/// assert_eq!(engine.get(b"a"), None);
/// assert_eq!(engine.get(b"b"), Some(Bytes::from("12345")));
/// ```
pub struct StorageEngine {
    /// Mapping, capacity and recency, always updated together
    inner: Mutex<Inner>,

    /// Configured total capacity in bytes
    capacity: usize,

    /// Statistics: total GET operations
    get_count: AtomicU64,

    /// Statistics: total SET operations
    set_count: AtomicU64,

    /// Statistics: total DELETE operations
    del_count: AtomicU64,

    /// Statistics: keys evicted to make room
    evicted_count: AtomicU64,

    /// Statistics: SET operations rejected as too large
    rejected_count: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("capacity", &self.capacity)
            .field("remaining", &self.remaining_capacity())
            .field("get_count", &self.get_count.load(Ordering::Relaxed))
            .field("set_count", &self.set_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl StorageEngine {
    /// Creates a storage engine holding at most `capacity` bytes of values.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::new(capacity)),
            capacity,
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            del_count: AtomicU64::new(0),
            evicted_count: AtomicU64::new(0),
            rejected_count: AtomicU64::new(0),
        }
    }

    /// Acquires the store lock, recovering it if a previous holder panicked.
    #[inline]
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `value` under `key`, overwriting any existing value.
    ///
    /// If the value does not fit in the remaining capacity, least recently
    /// accessed keys are evicted first. The key's modify time becomes now and
    /// its access record is reset to "never accessed".
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ValueTooLarge`] if `value` is larger than the
    /// total capacity. The store is left untouched in that case.
    pub fn set(&self, key: Bytes, value: Bytes) -> Result<(), StoreError> {
        self.set_count.fetch_add(1, Ordering::Relaxed);

        let size = value.len();
        if size > self.capacity {
            self.rejected_count.fetch_add(1, Ordering::Relaxed);
            return Err(StoreError::ValueTooLarge {
                size,
                capacity: self.capacity,
            });
        }

        let mut inner = self.lock();

        // An overwritten value gives its bytes back before anything is evicted
        inner.remove_entry(&key);

        let evicted = inner.evict_until(size);
        if evicted > 0 {
            self.evicted_count.fetch_add(evicted, Ordering::Relaxed);
        }

        inner.remaining -= size;
        inner.modified.upsert(key.clone(), Touch::now());
        inner.accessed.upsert(key.clone(), Touch::Never);
        inner.data.insert(key, value);

        Ok(())
    }

    /// Gets the value for a key.
    ///
    /// A hit records the access time; a miss changes nothing.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        let mut inner = self.lock();
        let (stored, value) = inner
            .data
            .get_key_value(key)
            .map(|(k, v)| (k.clone(), v.clone()))?;

        inner.accessed.upsert(stored, Touch::now());
        Some(value)
    }

    /// Gets the value for a key without recording an access.
    pub fn peek(&self, key: &[u8]) -> Option<Bytes> {
        self.lock().data.get(key).cloned()
    }

    /// Deletes a key from the store.
    ///
    /// # Returns
    ///
    /// Returns `true` if the key was deleted, `false` if it didn't exist.
    pub fn delete(&self, key: &[u8]) -> bool {
        self.del_count.fetch_add(1, Ordering::Relaxed);
        self.lock().remove_entry(key).is_some()
    }

    /// Checks if a key exists without recording an access.
    pub fn exists(&self, key: &[u8]) -> bool {
        self.lock().data.contains_key(key)
    }

    /// Returns every entry, most recently modified first.
    ///
    /// The ordering is copied under the lock; values are then resolved one
    /// key at a time so a long stream never holds the lock for its whole
    /// duration. Keys removed in between are skipped. Resolving a value does
    /// not count as an access.
    pub fn stream_snapshot(&self) -> Vec<(Bytes, Bytes)> {
        let keys = self.lock().modified.snapshot_sorted(SortOrder::Descending);

        keys.into_iter()
            .filter_map(|key| self.peek(&key).map(|value| (key, value)))
            .collect()
    }

    /// Returns keys ordered from first to last eviction candidate.
    pub fn eviction_order(&self) -> Vec<Bytes> {
        self.lock().accessed.snapshot_sorted(SortOrder::Ascending)
    }

    /// Returns the number of bytes still available.
    pub fn remaining_capacity(&self) -> usize {
        self.lock().remaining
    }

    /// Returns the configured total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of bytes currently used by values.
    pub fn used_bytes(&self) -> usize {
        self.capacity - self.remaining_capacity()
    }

    /// Returns the number of keys in the store.
    pub fn len(&self) -> usize {
        self.lock().data.len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns statistics about the store.
    pub fn stats(&self) -> StorageStats {
        let (keys, remaining) = {
            let inner = self.lock();
            (inner.data.len() as u64, inner.remaining as u64)
        };

        StorageStats {
            keys,
            capacity: self.capacity as u64,
            remaining,
            get_ops: self.get_count.load(Ordering::Relaxed),
            set_ops: self.set_count.load(Ordering::Relaxed),
            del_ops: self.del_count.load(Ordering::Relaxed),
            evicted: self.evicted_count.load(Ordering::Relaxed),
            rejected: self.rejected_count.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn b(s: &str) -> Bytes {
        Bytes::from(s.to_string())
    }

    /// Checks that capacity, mapping and both indexes agree.
    fn assert_consistent(engine: &StorageEngine) {
        let inner = engine.lock();
        let used: usize = inner.data.values().map(Bytes::len).sum();

        assert_eq!(used + inner.remaining, engine.capacity());
        assert_eq!(inner.accessed.len(), inner.data.len());
        assert_eq!(inner.modified.len(), inner.data.len());
        for key in inner.data.keys() {
            assert!(inner.accessed.contains(key));
            assert!(inner.modified.contains(key));
        }
    }

    #[test]
    fn test_set_get() {
        let engine = StorageEngine::new(100);

        engine.set(b("name"), b("Ariz")).unwrap();
        assert_eq!(engine.get(b"name"), Some(b("Ariz")));
        assert_eq!(engine.remaining_capacity(), 96);
        assert_consistent(&engine);
    }

    #[test]
    fn test_get_nonexistent() {
        let engine = StorageEngine::new(100);
        assert_eq!(engine.get(b"missing"), None);
        assert_eq!(engine.stats().get_ops, 1);
    }

    #[test]
    fn test_overwrite_credits_old_value() {
        let engine = StorageEngine::new(10);

        engine.set(b("key"), b("123456")).unwrap();
        engine.set(b("key"), b("12")).unwrap();

        assert_eq!(engine.get(b"key"), Some(b("12")));
        assert_eq!(engine.remaining_capacity(), 8);
        assert_eq!(engine.len(), 1);
        assert_consistent(&engine);
    }

    #[test]
    fn test_overwrite_full_store_does_not_evict_neighbours() {
        let engine = StorageEngine::new(10);

        engine.set(b("a"), b("12345")).unwrap();
        engine.set(b("b"), b("12345")).unwrap();
        // Replacing "b" with a same-sized value fits in the bytes "b" frees
        engine.set(b("b"), b("abcde")).unwrap();

        assert!(engine.exists(b"a"));
        assert_eq!(engine.peek(b"b"), Some(b("abcde")));
        assert_eq!(engine.stats().evicted, 0);
        assert_consistent(&engine);
    }

    #[test]
    fn test_delete() {
        let engine = StorageEngine::new(100);

        engine.set(b("key"), b("value")).unwrap();
        assert!(engine.delete(b"key"));
        assert!(!engine.exists(b"key"));
        assert_eq!(engine.remaining_capacity(), 100);
        assert_consistent(&engine);
    }

    #[test]
    fn test_delete_nonexistent_keeps_capacity() {
        let engine = StorageEngine::new(100);
        engine.set(b("key"), b("value")).unwrap();

        assert!(!engine.delete(b"missing"));
        assert_eq!(engine.remaining_capacity(), 95);
        assert_consistent(&engine);
    }

    #[test]
    fn test_eviction_in_insertion_order_without_reads() {
        let engine = StorageEngine::new(9);

        engine.set(b("A"), b("aaa")).unwrap();
        engine.set(b("B"), b("bbb")).unwrap();
        engine.set(b("C"), b("ccc")).unwrap();

        engine.set(b("D"), b("ddd")).unwrap();
        assert!(!engine.exists(b"A"));
        assert!(engine.exists(b"B"));

        engine.set(b("E"), b("eeeeee")).unwrap();
        assert!(!engine.exists(b"B"));
        assert!(!engine.exists(b"C"));
        assert!(engine.exists(b"D"));
        assert!(engine.exists(b"E"));

        assert_eq!(engine.stats().evicted, 3);
        assert_consistent(&engine);
    }

    #[test]
    fn test_read_protects_from_eviction() {
        let engine = StorageEngine::new(9);

        engine.set(b("A"), b("aaa")).unwrap();
        engine.set(b("B"), b("bbb")).unwrap();
        engine.set(b("C"), b("ccc")).unwrap();

        assert!(engine.get(b"A").is_some());

        engine.set(b("D"), b("ddd")).unwrap();
        assert!(engine.exists(b"A"));
        assert!(!engine.exists(b"B"));
        assert_consistent(&engine);
    }

    #[test]
    fn test_rewrite_resets_access_record() {
        let engine = StorageEngine::new(6);

        engine.set(b("A"), b("aaa")).unwrap();
        engine.set(b("B"), b("bbb")).unwrap();
        engine.get(b"A");
        engine.get(b"B");

        // Rewriting A makes it "never accessed" again, so it goes first
        engine.set(b("A"), b("AAA")).unwrap();
        assert_eq!(engine.eviction_order(), vec![b("A"), b("B")]);

        engine.set(b("C"), b("ccc")).unwrap();
        assert!(!engine.exists(b"A"));
        assert!(engine.exists(b"B"));
    }

    #[test]
    fn test_get_after_eviction_misses() {
        let engine = StorageEngine::new(4);

        engine.set(b("K"), b("kkkk")).unwrap();
        engine.set(b("L"), b("llll")).unwrap();

        assert_eq!(engine.get(b"K"), None);
        assert_eq!(engine.get(b"L"), Some(b("llll")));
    }

    #[test]
    fn test_value_too_large_leaves_store_untouched() {
        let engine = StorageEngine::new(5);
        engine.set(b("a"), b("12")).unwrap();
        let order_before = engine.eviction_order();

        let result = engine.set(b("x"), b("123456"));
        assert_eq!(
            result,
            Err(StoreError::ValueTooLarge {
                size: 6,
                capacity: 5
            })
        );

        assert!(engine.exists(b"a"));
        assert!(!engine.exists(b"x"));
        assert_eq!(engine.remaining_capacity(), 3);
        assert_eq!(engine.eviction_order(), order_before);
        assert_eq!(engine.stats().rejected, 1);
        assert_consistent(&engine);
    }

    #[test]
    fn test_value_equal_to_capacity_evicts_everything() {
        let engine = StorageEngine::new(5);
        engine.set(b("a"), b("12")).unwrap();
        engine.set(b("b"), b("34")).unwrap();

        engine.set(b("c"), b("12345")).unwrap();
        assert_eq!(engine.len(), 1);
        assert_eq!(engine.remaining_capacity(), 0);
        assert_consistent(&engine);
    }

    #[test]
    fn test_empty_value() {
        let engine = StorageEngine::new(0);

        engine.set(b("empty"), Bytes::new()).unwrap();
        assert_eq!(engine.get(b"empty"), Some(Bytes::new()));
        assert_consistent(&engine);
    }

    #[test]
    fn test_stream_snapshot_most_recently_modified_first() {
        let engine = StorageEngine::new(100);

        engine.set(b("a"), b("1")).unwrap();
        engine.set(b("b"), b("2")).unwrap();
        engine.set(b("a"), b("3")).unwrap();

        assert_eq!(
            engine.stream_snapshot(),
            vec![(b("a"), b("3")), (b("b"), b("2"))]
        );
    }

    #[test]
    fn test_stream_does_not_count_as_access() {
        let engine = StorageEngine::new(100);

        engine.set(b("a"), b("1")).unwrap();
        engine.set(b("b"), b("2")).unwrap();
        engine.stream_snapshot();

        assert_eq!(engine.eviction_order(), vec![b("a"), b("b")]);
        assert_eq!(engine.stats().get_ops, 0);
    }

    #[test]
    fn test_stats() {
        let engine = StorageEngine::new(4);

        engine.set(b("a"), b("12")).unwrap();
        engine.set(b("b"), b("34")).unwrap();
        engine.set(b("c"), b("56")).unwrap();
        engine.get(b"c");
        engine.delete(b"c");
        let _ = engine.set(b("d"), b("too large"));

        let stats = engine.stats();
        assert_eq!(stats.keys, 1);
        assert_eq!(stats.capacity, 4);
        assert_eq!(stats.remaining, 2);
        assert_eq!(stats.get_ops, 1);
        assert_eq!(stats.set_ops, 4);
        assert_eq!(stats.del_ops, 1);
        assert_eq!(stats.evicted, 1);
        assert_eq!(stats.rejected, 1);
        assert_eq!(engine.used_bytes(), 2);
    }

    #[test]
    fn test_concurrent_access() {
        use std::sync::Arc;
        use std::thread;

        let engine = Arc::new(StorageEngine::new(1_000_000));
        let mut handles = vec![];

        for i in 0..10 {
            let engine = Arc::clone(&engine);
            handles.push(thread::spawn(move || {
                for j in 0..100 {
                    let key = Bytes::from(format!("key-{}-{}", i, j));
                    engine.set(key.clone(), b("value")).unwrap();
                    assert_eq!(engine.get(&key), Some(b("value")));
                    if j % 3 == 0 {
                        engine.delete(&key);
                    }
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        // 34 of every 100 keys per thread were deleted
        assert_eq!(engine.len(), 660);
        assert_consistent(&engine);
    }

    #[test]
    fn test_concurrent_eviction_stays_consistent() {
        use std::sync::Arc;
        use std::thread;

        let engine = Arc::new(StorageEngine::new(64));
        let mut handles = vec![];

        for i in 0..8 {
            let engine = Arc::clone(&engine);
            handles.push(thread::spawn(move || {
                for j in 0..200 {
                    let key = Bytes::from(format!("k{}", (i * 7 + j) % 40));
                    match j % 3 {
                        0 => engine.set(key, Bytes::from(vec![b'x'; j % 9])).unwrap(),
                        1 => {
                            engine.get(&key);
                        }
                        _ => {
                            engine.delete(&key);
                        }
                    }
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_consistent(&engine);
    }

    #[derive(Debug, Clone)]
    enum StoreOp {
        Set { key: u8, len: usize },
        Get { key: u8 },
        Delete { key: u8 },
    }

    fn store_op_strategy() -> impl Strategy<Value = StoreOp> {
        prop_oneof![
            (0u8..10, 0usize..40).prop_map(|(key, len)| StoreOp::Set { key, len }),
            (0u8..10).prop_map(|key| StoreOp::Get { key }),
            (0u8..10).prop_map(|key| StoreOp::Delete { key }),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        // Remaining capacity plus stored bytes always equals the total capacity,
        // and every stored key has exactly one record in each index.
        #[test]
        fn prop_capacity_accounting(ops in prop::collection::vec(store_op_strategy(), 1..80)) {
            let engine = StorageEngine::new(32);

            for op in ops {
                match op {
                    StoreOp::Set { key, len } => {
                        let result = engine.set(Bytes::from(vec![key]), Bytes::from(vec![b'v'; len]));
                        prop_assert_eq!(result.is_err(), len > 32);
                    }
                    StoreOp::Get { key } => {
                        engine.get(&[key]);
                    }
                    StoreOp::Delete { key } => {
                        engine.delete(&[key]);
                    }
                }

                let inner = engine.lock();
                let used: usize = inner.data.values().map(Bytes::len).sum();
                prop_assert_eq!(used + inner.remaining, 32);
                prop_assert_eq!(inner.accessed.len(), inner.data.len());
                prop_assert_eq!(inner.modified.len(), inner.data.len());
            }
        }

        // The stream lists each key once, newest write first.
        #[test]
        fn prop_stream_matches_write_order(keys in prop::collection::vec(0u8..6, 1..30)) {
            let engine = StorageEngine::new(1024);

            for key in &keys {
                engine.set(Bytes::from(vec![*key]), Bytes::from_static(b"v")).unwrap();
            }

            let mut expected: Vec<u8> = Vec::new();
            for key in keys.iter().rev() {
                if !expected.contains(key) {
                    expected.push(*key);
                }
            }

            let streamed: Vec<u8> = engine
                .stream_snapshot()
                .into_iter()
                .map(|(key, _)| key[0])
                .collect();
            prop_assert_eq!(streamed, expected);
        }
    }
}
