//! Recency Index
//!
//! Keeps one record per key, ordered by the time the key was last touched.
//! The storage engine holds two of these: one ordered by last access (drives
//! eviction) and one ordered by last modification (drives `STREAM`).
//!
//! ## Layout
//!
//! ```text
//!   handles: HashMap<key, Stamp>          order: BTreeMap<Stamp, key>
//!   ┌──────────┬──────────────┐           ┌──────────────┬──────────┐
//!   │ "a"      │ (Never, 0)   │ ────────> │ (Never, 0)   │ "a"      │  oldest
//!   │ "b"      │ (At(t1), 3)  │ ────────> │ (Never, 1)   │ "c"      │
//!   │ "c"      │ (Never, 1)   │ ────────> │ (At(t1), 3)  │ "b"      │  newest
//!   └──────────┴──────────────┘           └──────────────┴──────────┘
//! ```
//!
//! The key→stamp map lets `upsert` and `remove` find the stale record in
//! O(1) and drop it from the ordered map in O(log N).
//!
//! Every upsert also draws a sequence number from the index. Two records with
//! the same timestamp are therefore ordered by when they were recorded, which
//! keeps snapshots deterministic.

use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

/// When a key was last touched.
///
/// `Never` sorts before every `At`, so a key that was stored but never read
/// is the first eviction candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Touch {
    /// The key has not been touched since it was (re)written
    Never,
    /// The key was touched at this instant
    At(Instant),
}

impl Touch {
    /// A touch at the current instant.
    pub fn now() -> Self {
        Touch::At(Instant::now())
    }
}

/// Direction of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Oldest first
    Ascending,
    /// Newest first
    Descending,
}

/// Position of a record in the ordered map: timestamp, then insertion sequence.
type Stamp = (Touch, u64);

/// An ordering over keys by last-touch time.
#[derive(Debug, Default)]
pub struct RecencyIndex {
    /// Records sorted by stamp
    order: BTreeMap<Stamp, Bytes>,
    /// Current stamp of every tracked key
    handles: HashMap<Bytes, Stamp>,
    /// Sequence for the next upsert
    next_seq: u64,
}

impl RecencyIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `touch` for `key`, replacing any existing record.
    pub fn upsert(&mut self, key: Bytes, touch: Touch) {
        let stamp = (touch, self.next_seq);
        self.next_seq += 1;

        if let Some(stale) = self.handles.insert(key.clone(), stamp) {
            self.order.remove(&stale);
        }
        self.order.insert(stamp, key);
    }

    /// Removes the record for `key`.
    ///
    /// Returns `true` if a record existed.
    pub fn remove(&mut self, key: &[u8]) -> bool {
        match self.handles.remove(key) {
            Some(stamp) => {
                self.order.remove(&stamp);
                true
            }
            None => false,
        }
    }

    /// Returns the key with the oldest record, if any.
    pub fn oldest(&self) -> Option<&Bytes> {
        self.order.values().next()
    }

    /// Returns every tracked key in the requested order.
    ///
    /// The result is an owned copy; later mutations of the index do not
    /// affect it.
    pub fn snapshot_sorted(&self, order: SortOrder) -> Vec<Bytes> {
        match order {
            SortOrder::Ascending => self.order.values().cloned().collect(),
            SortOrder::Descending => self.order.values().rev().cloned().collect(),
        }
    }

    /// Returns `true` if `key` has a record.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.handles.contains_key(key)
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns `true` if no keys are tracked.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;

    fn key(s: &str) -> Bytes {
        Bytes::from(s.to_string())
    }

    #[test]
    fn test_upsert_replaces_existing_record() {
        let mut index = RecencyIndex::new();

        index.upsert(key("a"), Touch::Never);
        index.upsert(key("b"), Touch::Never);
        index.upsert(key("a"), Touch::now());

        assert_eq!(index.len(), 2);
        assert_eq!(
            index.snapshot_sorted(SortOrder::Ascending),
            vec![key("b"), key("a")]
        );
    }

    #[test]
    fn test_never_sorts_before_touched() {
        let mut index = RecencyIndex::new();

        index.upsert(key("touched"), Touch::now());
        index.upsert(key("fresh"), Touch::Never);

        assert_eq!(index.oldest(), Some(&key("fresh")));
    }

    #[test]
    fn test_ties_broken_by_insertion_order() {
        let mut index = RecencyIndex::new();
        let at = Touch::At(Instant::now());

        index.upsert(key("a"), at);
        index.upsert(key("b"), at);
        index.upsert(key("c"), at);

        assert_eq!(
            index.snapshot_sorted(SortOrder::Ascending),
            vec![key("a"), key("b"), key("c")]
        );
        assert_eq!(
            index.snapshot_sorted(SortOrder::Descending),
            vec![key("c"), key("b"), key("a")]
        );
    }

    #[test]
    fn test_timestamp_dominates_sequence() {
        let mut index = RecencyIndex::new();
        let earlier = Instant::now();
        let later = earlier + Duration::from_secs(1);

        index.upsert(key("late"), Touch::At(later));
        index.upsert(key("early"), Touch::At(earlier));

        assert_eq!(index.oldest(), Some(&key("early")));
    }

    #[test]
    fn test_remove() {
        let mut index = RecencyIndex::new();

        index.upsert(key("a"), Touch::Never);
        index.upsert(key("b"), Touch::Never);

        assert!(index.remove(b"a"));
        assert!(!index.remove(b"a"));
        assert!(!index.remove(b"missing"));

        assert!(!index.contains(b"a"));
        assert_eq!(index.snapshot_sorted(SortOrder::Ascending), vec![key("b")]);
    }

    #[test]
    fn test_oldest_on_empty_index() {
        let mut index = RecencyIndex::new();
        assert!(index.oldest().is_none());

        index.upsert(key("a"), Touch::Never);
        index.remove(b"a");

        assert!(index.is_empty());
        assert!(index.oldest().is_none());
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut index = RecencyIndex::new();
        index.upsert(key("a"), Touch::Never);

        let snapshot = index.snapshot_sorted(SortOrder::Descending);
        index.upsert(key("b"), Touch::Never);
        index.remove(b"a");

        assert_eq!(snapshot, vec![key("a")]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        // However keys are upserted and removed, each key keeps exactly one
        // record and both views of the index agree.
        #[test]
        fn prop_one_record_per_key(ops in prop::collection::vec((0u8..8, any::<bool>()), 1..100)) {
            let mut index = RecencyIndex::new();
            let mut live = std::collections::HashSet::new();

            for (k, remove) in ops {
                let k = Bytes::from(vec![b'k', k]);
                if remove {
                    index.remove(&k);
                    live.remove(&k);
                } else {
                    index.upsert(k.clone(), Touch::now());
                    live.insert(k);
                }
            }

            let snapshot = index.snapshot_sorted(SortOrder::Ascending);
            prop_assert_eq!(snapshot.len(), live.len());
            prop_assert_eq!(index.order.len(), index.handles.len());
            for k in &snapshot {
                prop_assert!(live.contains(k));
            }
        }
    }
}
