//! Sync plan: the three-way diff between source entries and store objects.
//!
//! Both sides are walked as key-sorted sequences and merged in one pass, so
//! the diff itself never needs a lookup table for either side.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::iter::Peekable;

use mirror_core::{Fingerprint, SourceEntry, StoreObject};

/// One step of a sorted merge over source names and store keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeItem {
    /// Present in the source only: a new file.
    SourceOnly(SourceEntry),
    /// Present in the store only: an orphan to delete.
    StoreOnly(StoreObject),
    /// Present on both sides under the same name.
    Both(SourceEntry, StoreObject),
}

/// Merge two key-sorted sequences.
///
/// `source` must be sorted by `logical_name` and `store` by `key`, each
/// without duplicates.
pub struct SortedMerge<S, T>
where
    S: Iterator<Item = SourceEntry>,
    T: Iterator<Item = StoreObject>,
{
    source: Peekable<S>,
    store: Peekable<T>,
}

impl<S, T> SortedMerge<S, T>
where
    S: Iterator<Item = SourceEntry>,
    T: Iterator<Item = StoreObject>,
{
    pub fn new(source: S, store: T) -> Self {
        Self {
            source: source.peekable(),
            store: store.peekable(),
        }
    }
}

impl<S, T> Iterator for SortedMerge<S, T>
where
    S: Iterator<Item = SourceEntry>,
    T: Iterator<Item = StoreObject>,
{
    type Item = MergeItem;

    fn next(&mut self) -> Option<MergeItem> {
        let order = match (self.source.peek(), self.store.peek()) {
            (None, None) => return None,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(entry), Some(object)) => entry.logical_name.as_str().cmp(object.key.as_str()),
        };
        match order {
            Ordering::Less => self.source.next().map(MergeItem::SourceOnly),
            Ordering::Greater => self.store.next().map(MergeItem::StoreOnly),
            Ordering::Equal => match (self.source.next(), self.store.next()) {
                (Some(entry), Some(object)) => Some(MergeItem::Both(entry, object)),
                _ => None,
            },
        }
    }
}

/// A source entry that needs to be fetched and compared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedUpload {
    pub entry: SourceEntry,
    /// The fingerprint the inventory reported for this key, if it exists.
    pub existing: Option<Fingerprint>,
}

impl PlannedUpload {
    pub fn key(&self) -> &str {
        &self.entry.logical_name
    }
}

/// Derived, per-pass work list. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    /// Store keys with no source counterpart, in key order.
    pub to_delete: Vec<String>,
    /// Every source entry, in logical-name order.
    pub to_upload: Vec<PlannedUpload>,
}

impl SyncPlan {
    /// Diff a source listing against a store inventory.
    ///
    /// Duplicate logical names in `entries` resolve to the last one
    /// observed.
    pub fn build(entries: Vec<SourceEntry>, objects: Vec<StoreObject>) -> Self {
        let source = dedupe_last_wins(entries);

        let mut objects = objects;
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        objects.dedup_by(|a, b| a.key == b.key);

        let mut plan = SyncPlan::default();
        for item in SortedMerge::new(source.into_values(), objects.into_iter()) {
            match item {
                MergeItem::SourceOnly(entry) => plan.to_upload.push(PlannedUpload {
                    entry,
                    existing: None,
                }),
                MergeItem::StoreOnly(object) => plan.to_delete.push(object.key),
                MergeItem::Both(entry, object) => plan.to_upload.push(PlannedUpload {
                    entry,
                    existing: Some(object.fingerprint),
                }),
            }
        }
        plan
    }

    /// Entries whose key is not in the store yet.
    pub fn new_count(&self) -> usize {
        self.to_upload.iter().filter(|u| u.existing.is_none()).count()
    }
}

fn dedupe_last_wins(entries: Vec<SourceEntry>) -> BTreeMap<String, SourceEntry> {
    let mut by_name = BTreeMap::new();
    for entry in entries {
        if let Some(previous) = by_name.insert(entry.logical_name.clone(), entry) {
            tracing::warn!(
                name = %previous.logical_name,
                dropped = %previous.locator,
                "duplicate logical name in source listing; keeping the later locator"
            );
        }
    }
    by_name
}
