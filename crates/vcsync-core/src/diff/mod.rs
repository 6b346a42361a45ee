//! Sorted-diff merge
//!
//! Two-pointer merge over two key-ordered snapshots. Every key present on
//! either side yields exactly one [`Change`]:
//!
//! | old | new | change |
//! |-----|-----|--------|
//! | —   | k   | `Create` |
//! | k   | k   | `Update` |
//! | k   | —   | `Delete` |
//!
//! [`SortedDiff`] is the pure iterator; [`reconcile`] drives it through the
//! [`Lifecycle`] contract and never stops on a per-entity failure.

use std::cmp::Ordering;
use std::collections::{BTreeMap, btree_map};
use std::iter::Peekable;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::lifecycle::{Lifecycle, SyncContext};

/// One classified key of a diff
#[derive(Debug, PartialEq, Eq)]
pub enum Change<'a, K, V> {
    /// Present only in the new snapshot
    Create(&'a K, &'a V),
    /// Present in both
    Update { key: &'a K, old: &'a V, new: &'a V },
    /// Present only in the old snapshot
    Delete(&'a K, &'a V),
}

impl<'a, K, V> Change<'a, K, V> {
    pub fn key(&self) -> &'a K {
        match self {
            Change::Create(key, _) | Change::Delete(key, _) => key,
            Change::Update { key, .. } => key,
        }
    }
}

/// Linear merge of two ascending `(key, value)` sequences
///
/// Both inputs must be sorted ascending by the same order and free of
/// duplicate keys; `BTreeMap` iterators always are. Runs in O(n + m).
pub struct SortedDiff<I: Iterator, J: Iterator> {
    old: Peekable<I>,
    new: Peekable<J>,
}

impl<I: Iterator, J: Iterator> SortedDiff<I, J> {
    pub fn new(old: I, new: J) -> Self {
        Self {
            old: old.peekable(),
            new: new.peekable(),
        }
    }
}

impl<'a, K: Ord + 'a, V: 'a, I, J> Iterator for SortedDiff<I, J>
where
    I: Iterator<Item = (&'a K, &'a V)>,
    J: Iterator<Item = (&'a K, &'a V)>,
{
    type Item = Change<'a, K, V>;

    fn next(&mut self) -> Option<Self::Item> {
        let step = match (self.old.peek(), self.new.peek()) {
            (None, None) => return None,
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (Some((old_key, _)), Some((new_key, _))) => new_key.cmp(old_key),
        };

        match step {
            Ordering::Equal => {
                let (key, old) = self.old.next()?;
                let (_, new) = self.new.next()?;
                Some(Change::Update { key, old, new })
            }
            Ordering::Less => {
                let (key, new) = self.new.next()?;
                Some(Change::Create(key, new))
            }
            Ordering::Greater => {
                let (key, old) = self.old.next()?;
                Some(Change::Delete(key, old))
            }
        }
    }
}

/// Diff two maps
pub fn diff_maps<'a, K: Ord, V>(
    old: &'a BTreeMap<K, V>,
    new: &'a BTreeMap<K, V>,
) -> SortedDiff<btree_map::Iter<'a, K, V>, btree_map::Iter<'a, K, V>> {
    SortedDiff::new(old.iter(), new.iter())
}

/// Which lifecycle operation matched pairs go through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Event-driven: `update`
    Incremental,
    /// Full reconciliation: `sync`, which carries over fields the fresh
    /// snapshot lacks
    Full,
}

/// Options of one merge pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOptions {
    pub mode: MergeMode,
    /// When false, old-only entries are left alone remotely
    pub propagate_deletes: bool,
}

impl MergeOptions {
    pub fn incremental() -> Self {
        Self {
            mode: MergeMode::Incremental,
            propagate_deletes: true,
        }
    }

    pub fn full(propagate_deletes: bool) -> Self {
        Self {
            mode: MergeMode::Full,
            propagate_deletes,
        }
    }
}

/// Counts of one merge pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Old-only entries kept because deletes are not propagated
    pub retained: usize,
    pub failed: usize,
}

impl MergeReport {
    /// Keys visited
    pub fn total(&self) -> usize {
        self.created + self.updated + self.deleted + self.retained + self.failed
    }
}

#[derive(Clone, Copy)]
enum Op {
    Create,
    Update,
    Delete,
}

/// Apply the diff of `old` → `new` through the lifecycle contract
///
/// Per-entity errors are logged and counted; the pass always covers every
/// key of both sides.
pub async fn reconcile<V: Lifecycle>(
    old: &BTreeMap<Uuid, V>,
    new: &BTreeMap<Uuid, V>,
    scope: &V::Scope,
    options: MergeOptions,
    ctx: &SyncContext,
) -> MergeReport {
    let mut report = MergeReport::default();

    for change in diff_maps(old, new) {
        let key = change.key();
        let (op, result) = match change {
            Change::Create(_, new) => (Op::Create, new.create(scope, ctx).await),
            Change::Update { old, new, .. } => {
                let result = match options.mode {
                    MergeMode::Incremental => new.update(old, scope, ctx).await,
                    MergeMode::Full => new.sync(old, scope, ctx).await,
                };
                (Op::Update, result)
            }
            Change::Delete(_, old) => {
                if !options.propagate_deletes {
                    debug!(kind = V::KIND, id = %key, "Not in snapshot, retained remotely");
                    report.retained += 1;
                    continue;
                }
                (Op::Delete, old.delete(scope, ctx).await)
            }
        };

        match (op, result) {
            (Op::Create, Ok(())) => report.created += 1,
            (Op::Update, Ok(())) => report.updated += 1,
            (Op::Delete, Ok(())) => report.deleted += 1,
            (_, Err(e)) => {
                report.failed += 1;
                warn!(kind = V::KIND, id = %key, "Reconcile failed: {}", e);
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(keys: &[u32]) -> BTreeMap<u32, char> {
        keys.iter().map(|k| (*k, 'v')).collect()
    }

    fn classify(old: &[u32], new: &[u32]) -> Vec<(char, u32)> {
        let (old, new) = (map(old), map(new));
        diff_maps(&old, &new)
            .map(|c| match c {
                Change::Create(k, _) => ('c', *k),
                Change::Update { key, .. } => ('u', *key),
                Change::Delete(k, _) => ('d', *k),
            })
            .collect()
    }

    #[test]
    fn interleaved_keys_in_order() {
        assert_eq!(
            classify(&[1, 2], &[2, 3]),
            vec![('d', 1), ('u', 2), ('c', 3)]
        );
    }

    #[test]
    fn tails_are_flushed() {
        assert_eq!(classify(&[], &[1, 2]), vec![('c', 1), ('c', 2)]);
        assert_eq!(classify(&[1, 2], &[]), vec![('d', 1), ('d', 2)]);
        assert_eq!(classify(&[1], &[2, 3, 4]), vec![('d', 1), ('c', 2), ('c', 3), ('c', 4)]);
        assert!(classify(&[], &[]).is_empty());
    }

    #[test]
    fn every_key_classified_exactly_once() {
        // Deterministic pseudo-random subsets of 0..40
        let mut seed: u64 = 0x9e37_79b9_7f4a_7c15;
        let mut next = || {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed
        };

        for _ in 0..200 {
            let old: Vec<u32> = (0..40).filter(|_| next() % 2 == 0).collect();
            let new: Vec<u32> = (0..40).filter(|_| next() % 3 != 0).collect();
            let changes = classify(&old, &new);

            let mut keys: Vec<u32> = changes.iter().map(|(_, k)| *k).collect();
            let mut expected: Vec<u32> = old.iter().chain(new.iter()).copied().collect();
            expected.sort();
            expected.dedup();
            assert_eq!(keys, expected, "keys visited in order, once each");
            keys.dedup();
            assert_eq!(keys.len(), expected.len());

            for (op, k) in changes {
                let in_old = old.contains(&k);
                let in_new = new.contains(&k);
                let expected_op = match (in_old, in_new) {
                    (true, true) => 'u',
                    (false, true) => 'c',
                    (true, false) => 'd',
                    (false, false) => unreachable!(),
                };
                assert_eq!(op, expected_op, "key {k}");
            }
        }
    }

    #[test]
    fn works_over_sorted_slices() {
        let old = [(1, 'a'), (3, 'c')];
        let new = [(1, 'a'), (2, 'b')];
        let changes: Vec<_> = SortedDiff::new(
            old.iter().map(|(k, v)| (k, v)),
            new.iter().map(|(k, v)| (k, v)),
        )
        .collect();

        assert_eq!(
            changes,
            vec![
                Change::Update { key: &1, old: &'a', new: &'a' },
                Change::Create(&2, &'b'),
                Change::Delete(&3, &'c'),
            ]
        );
    }
}
