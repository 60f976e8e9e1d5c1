//! `sheetsync-engine`: the pure core of a spreadsheet sync.
//!
//! Receives already-fetched source records and the keys already present in
//! the destination, returns the rows to append and the keys to delete.
//! No network, no file IO, no clocks.

pub mod filter;
pub mod model;
pub mod reconcile;
pub mod transform;

pub use filter::{include, parse_status_list, RecordFilter};
pub use model::{key_from_json, normalize_key, Cell, KeySet, OutputRow, SourceRecord, SubItem};
pub use reconcile::{full_rewrite, plan, reconcile, SyncPlan};
pub use transform::{extract_users_and_term, transform, HEADERS, KEY_COLUMN};
