//! Reconciler: source snapshot vs. destination keys → add / delete / skip.
//!
//! Append-plus-delete only. A key present on both sides is never rewritten,
//! even if its fields changed upstream.

use serde::Serialize;

use crate::filter::{include, RecordFilter};
use crate::model::{normalize_key, KeySet, OutputRow, SourceRecord};
use crate::transform::transform;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncPlan {
    /// Rows for keys in `S − E`, in source order.
    pub rows_to_add: Vec<OutputRow>,
    /// Keys behind `rows_to_add`, one entry per record.
    pub new_keys: Vec<String>,
    /// `E − S`, in destination order.
    pub keys_to_delete: Vec<String>,
    /// `E ∩ S`, in destination order.
    pub keys_unchanged: Vec<String>,
    /// Records handed to [`plan`] before filtering.
    pub fetched: usize,
    /// Records that survived the filter.
    pub filtered: usize,
    /// Records dropped because their key was already seen in this snapshot.
    pub duplicate_keys: usize,
    /// Records dropped because their key was blank.
    pub blank_keys: usize,
}

impl SyncPlan {
    /// Nothing to add and nothing to delete.
    pub fn is_noop(&self) -> bool {
        self.rows_to_add.is_empty() && self.keys_to_delete.is_empty()
    }
}

/// Filter the snapshot, then reconcile what survives.
///
/// Filtering and deletion share one key set: a record filtered out of this
/// run is absent from `S`, so tightening a filter prunes rows synced earlier.
pub fn plan(records: &[SourceRecord], filter: &RecordFilter, existing: &KeySet) -> SyncPlan {
    let surviving: Vec<&SourceRecord> = records.iter().filter(|r| include(r, filter)).collect();
    let mut plan = reconcile(surviving.iter().copied(), existing);
    plan.fetched = records.len();
    plan.filtered = surviving.len();
    plan
}

/// Reconcile already-filtered records against the destination keys.
pub fn reconcile<'a, I>(records: I, existing: &KeySet) -> SyncPlan
where
    I: IntoIterator<Item = &'a SourceRecord>,
{
    let mut plan = SyncPlan::default();
    let mut source_keys = KeySet::new();

    for record in records {
        plan.filtered += 1;
        let Some(key) = normalize_key(&record.key) else {
            plan.blank_keys += 1;
            continue;
        };
        if !source_keys.insert(key.clone()) {
            plan.duplicate_keys += 1;
            continue;
        }
        if !existing.contains(&key) {
            plan.rows_to_add.extend(transform(record));
            plan.new_keys.push(key);
        }
    }
    plan.fetched = plan.filtered;

    for key in existing.iter() {
        if source_keys.contains(key) {
            plan.keys_unchanged.push(key.clone());
        } else {
            plan.keys_to_delete.push(key.clone());
        }
    }

    plan
}

/// Clear-and-rewrite variant: every surviving record is written again and
/// every existing key is scheduled for deletion.
pub fn full_rewrite(records: &[SourceRecord], filter: &RecordFilter, existing: &KeySet) -> SyncPlan {
    let mut plan = plan(records, filter, &KeySet::new());
    plan.keys_to_delete = existing.iter().cloned().collect();
    plan.keys_unchanged.clear();
    plan
}
