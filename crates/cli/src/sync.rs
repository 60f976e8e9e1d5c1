//! `sheetsync sync`: fetch → filter → read existing keys → plan → apply.
//!
//! Nothing is written to the destination until the full source snapshot
//! and the full existing-key snapshot are in hand. Add and delete go out
//! as one unit; header formatting afterwards is cosmetic and its failures
//! are only logged.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use sheetsync_config::SyncConfig;
use sheetsync_engine::{full_rewrite, plan, KeySet, SyncPlan, HEADERS, KEY_COLUMN};
use sheetsync_store::{ApplyOutcome, SheetStore, StoreError};

use crate::exit_codes::{self, store_exit_code};
use crate::source::RecordSource;
use crate::CliError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Append new keys, delete vanished keys, leave the rest untouched
    Diff,
    /// Clear the sheet and rewrite every surviving record
    Full,
}

#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    pub mode: SyncMode,
    pub dry_run: bool,
}

/// Outcome of one run. Produced whenever reconciliation was reached, even
/// if the apply step failed afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub fetched: usize,
    pub filtered: usize,
    /// Distinct keys found in the destination.
    pub existing: usize,
    pub added_rows: usize,
    pub added_keys: usize,
    /// Keys scheduled for deletion.
    pub deleted: usize,
    /// Rows the destination reported as removed.
    pub deleted_rows: usize,
    /// Keys present on both sides and left as they are.
    pub skipped: usize,
    pub duplicate_keys: usize,
    pub blank_keys: usize,
    pub mode: SyncMode,
    pub destination: String,
    pub sheet: String,
    pub dry_run: bool,
    pub synced_at: String,
    pub success: bool,
    pub error: Option<String>,
    #[serde(skip)]
    pub exit_code: u8,
}

impl SyncReport {
    fn from_plan(plan: &SyncPlan, existing: usize, opts: &SyncOptions, destination: &str, sheet: &str) -> Self {
        Self {
            fetched: plan.fetched,
            filtered: plan.filtered,
            existing,
            added_rows: plan.rows_to_add.len(),
            added_keys: plan.new_keys.len(),
            deleted: plan.keys_to_delete.len(),
            deleted_rows: 0,
            skipped: plan.keys_unchanged.len(),
            duplicate_keys: plan.duplicate_keys,
            blank_keys: plan.blank_keys,
            mode: opts.mode,
            destination: destination.to_string(),
            sheet: sheet.to_string(),
            dry_run: opts.dry_run,
            synced_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            success: false,
            error: None,
            exit_code: exit_codes::EXIT_SUCCESS,
        }
    }

    fn fail(&mut self, err: &StoreError) {
        self.success = false;
        self.error = Some(err.to_string());
        self.exit_code = store_exit_code(err);
    }

    /// Human summary, written to stderr.
    pub fn print_summary(&self) {
        let title = match (self.mode, self.dry_run) {
            (SyncMode::Diff, false) => "diff sync",
            (SyncMode::Diff, true) => "diff sync (dry run)",
            (SyncMode::Full, false) => "full rewrite",
            (SyncMode::Full, true) => "full rewrite (dry run)",
        };
        eprintln!("{} → {} sheet '{}'", title, self.destination, self.sheet);
        eprintln!("  fetched:       {}", self.fetched);
        eprintln!("  after filter:  {}", self.filtered);
        eprintln!("  existing keys: {}", self.existing);
        eprintln!("  added:         {} keys ({} rows)", self.added_keys, self.added_rows);
        eprintln!("  deleted:       {} keys", self.deleted);
        eprintln!("  unchanged:     {} keys", self.skipped);
        if self.duplicate_keys > 0 || self.blank_keys > 0 {
            eprintln!(
                "  ignored:       {} duplicate, {} blank keys",
                self.duplicate_keys, self.blank_keys
            );
        }
        eprintln!("  synced at:     {}", self.synced_at);
        match (&self.error, self.dry_run) {
            (Some(err), _) => eprintln!("  status:        FAILED ({})", err),
            (None, true) => eprintln!("  status:        ok, nothing written"),
            (None, false) => eprintln!("  status:        ok"),
        }
    }

    pub fn to_json(&self) -> Result<String, CliError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| CliError::io(format!("cannot serialize report: {}", e)))
    }
}

/// Run one sync pass.
///
/// Errors before reconciliation come back as `Err`. A failure while
/// applying comes back as a report with `success == false` so the caller
/// can still print the summary.
pub fn run_sync(
    config: &SyncConfig,
    source: &mut dyn RecordSource,
    store: &mut dyn SheetStore,
    opts: &SyncOptions,
) -> Result<SyncReport, CliError> {
    let sheet = config.sheet_name.as_str();

    info!(
        category = %config.filter.category,
        statuses = ?config.filter.statuses,
        "fetching records"
    );
    let records = source.fetch_all()?;

    info!(sheet, destination = store.label(), "reading existing keys");
    let existing = KeySet::from_column(store.read_key_column(sheet, KEY_COLUMN)?);

    let plan = match opts.mode {
        SyncMode::Diff => plan(&records, &config.filter, &existing),
        SyncMode::Full => full_rewrite(&records, &config.filter, &existing),
    };
    if plan.duplicate_keys > 0 {
        warn!(count = plan.duplicate_keys, "duplicate keys in source; first occurrence kept");
    }
    if plan.blank_keys > 0 {
        warn!(count = plan.blank_keys, "records without a key skipped");
    }
    debug!(add = ?plan.new_keys, delete = ?plan.keys_to_delete, "plan");
    info!(
        fetched = plan.fetched,
        filtered = plan.filtered,
        existing = existing.len(),
        add = plan.new_keys.len(),
        delete = plan.keys_to_delete.len(),
        "reconciled"
    );

    let mut report = SyncReport::from_plan(&plan, existing.len(), opts, store.label(), sheet);

    if opts.dry_run {
        report.success = true;
        return Ok(report);
    }

    let applied = match opts.mode {
        SyncMode::Diff if plan.is_noop() => {
            info!("destination already up to date");
            report.success = true;
            return Ok(report);
        }
        SyncMode::Diff => store.apply(sheet, &HEADERS, &plan.rows_to_add, &plan.keys_to_delete, KEY_COLUMN),
        SyncMode::Full => store
            .replace_all(sheet, &HEADERS, &plan.rows_to_add)
            .map(|added_rows| ApplyOutcome {
                deleted_rows: plan.keys_to_delete.len(),
                added_rows,
            }),
    };

    match applied {
        Ok(outcome) => {
            report.deleted_rows = outcome.deleted_rows;
            report.success = true;
            info!(added = outcome.added_rows, deleted = outcome.deleted_rows, "applied");
        }
        Err(err) => {
            warn!(error = %err, "apply failed");
            report.fail(&err);
            return Ok(report);
        }
    }

    format_sheet(store, sheet);
    Ok(report)
}

/// Bold frozen header and sized columns. Failures are warnings only.
fn format_sheet(store: &mut dyn SheetStore, sheet: &str) {
    if let Err(err) = store.format_header_row(sheet, HEADERS.len()) {
        warn!(error = %err, "could not format header row");
    }
    if let Err(err) = store.auto_resize_columns(sheet, HEADERS.len()) {
        warn!(error = %err, "could not resize columns");
    }
}

#[cfg(test)]
mod tests {
    use sheetsync_config::{FileConfig, Needs, Overrides};
    use sheetsync_engine::{OutputRow, SourceRecord};
    use sheetsync_store::MemoryStore;

    use super::*;
    use crate::source::SourceError;

    struct FixedSource(Vec<SourceRecord>);

    impl RecordSource for FixedSource {
        fn fetch_all(&mut self) -> Result<Vec<SourceRecord>, SourceError> {
            Ok(self.0.clone())
        }
    }

    struct FailingSource;

    impl RecordSource for FailingSource {
        fn fetch_all(&mut self) -> Result<Vec<SourceRecord>, SourceError> {
            Err(SourceError::Upstream { status: 500, body: "boom".into() })
        }
    }

    /// Memory store whose cosmetic calls always fail.
    struct NoFormatStore(MemoryStore);

    impl SheetStore for NoFormatStore {
        fn label(&self) -> &'static str {
            "memory"
        }
        fn ping(&mut self) -> Result<String, StoreError> {
            self.0.ping()
        }
        fn read_key_column(&mut self, sheet: &str, column: usize) -> Result<Vec<String>, StoreError> {
            self.0.read_key_column(sheet, column)
        }
        fn ensure_header(&mut self, sheet: &str, headers: &[&str]) -> Result<(), StoreError> {
            self.0.ensure_header(sheet, headers)
        }
        fn append_rows(&mut self, sheet: &str, rows: &[OutputRow]) -> Result<(), StoreError> {
            self.0.append_rows(sheet, rows)
        }
        fn delete_rows(&mut self, sheet: &str, keys: &[String], key_column: usize) -> Result<usize, StoreError> {
            self.0.delete_rows(sheet, keys, key_column)
        }
        fn clear(&mut self, sheet: &str) -> Result<(), StoreError> {
            self.0.clear(sheet)
        }
        fn replace_all(&mut self, sheet: &str, headers: &[&str], rows: &[OutputRow]) -> Result<usize, StoreError> {
            self.0.replace_all(sheet, headers, rows)
        }
        fn format_header_row(&mut self, _sheet: &str, _column_count: usize) -> Result<(), StoreError> {
            Err(StoreError::Http { status: 429, body: "quota".into() })
        }
        fn auto_resize_columns(&mut self, _sheet: &str, _column_count: usize) -> Result<(), StoreError> {
            Err(StoreError::Network("reset".into()))
        }
    }

    fn record(key: &str, status: &str) -> SourceRecord {
        SourceRecord {
            key: key.into(),
            name: format!("Deal {}", key),
            status: Some(status.into()),
            ..Default::default()
        }
    }

    fn config(statuses: &str) -> SyncConfig {
        let overrides = Overrides {
            statuses: Some(statuses.into()),
            ..Default::default()
        };
        SyncConfig::resolve(&overrides, &FileConfig::default(), Needs::NONE).unwrap()
    }

    fn existing_row(key: &str) -> Vec<String> {
        let mut row = vec![String::new(); HEADERS.len()];
        row[0] = key.to_string();
        row
    }

    fn store_with(keys: &[&str]) -> MemoryStore {
        MemoryStore::new().with_sheet("Deals", &HEADERS, keys.iter().map(|k| existing_row(k)).collect())
    }

    const DIFF: SyncOptions = SyncOptions { mode: SyncMode::Diff, dry_run: false };

    #[test]
    fn test_filtered_record_is_deleted_and_present_one_kept() {
        // Source {1 Won, 2 Lost}, filter Won, destination {1, 3}
        let mut source = FixedSource(vec![record("1", "Won"), record("2", "Lost")]);
        let mut store = store_with(&["1", "3"]);

        let report = run_sync(&config("Won"), &mut source, &mut store, &DIFF).unwrap();

        assert!(report.success);
        assert_eq!(report.fetched, 2);
        assert_eq!(report.filtered, 1);
        assert_eq!(report.existing, 2);
        assert_eq!(report.deleted, 1);
        assert_eq!(report.deleted_rows, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.added_rows, 0);
        assert_eq!(store.read_key_column("Deals", 0).unwrap(), vec!["1"]);
        assert!(store.is_formatted("Deals"));
    }

    #[test]
    fn test_new_records_appended_with_header() {
        let mut source = FixedSource(vec![record("1", "Won"), record("2", "Won")]);
        let mut store = MemoryStore::new();

        let report = run_sync(&config(""), &mut source, &mut store, &DIFF).unwrap();

        assert_eq!(report.added_keys, 2);
        assert_eq!(report.added_rows, 2);
        assert_eq!(store.rows("Deals")[0][0], HEADERS[0]);
        assert_eq!(store.read_key_column("Deals", 0).unwrap(), vec!["1", "2"]);
    }

    #[test]
    fn test_second_run_is_noop() {
        let mut source = FixedSource(vec![record("1", "Won"), record("2", "Won")]);
        let mut store = MemoryStore::new();

        run_sync(&config(""), &mut source, &mut store, &DIFF).unwrap();
        let before = store.rows("Deals").to_vec();
        let report = run_sync(&config(""), &mut source, &mut store, &DIFF).unwrap();

        assert!(report.success);
        assert_eq!(report.added_rows, 0);
        assert_eq!(report.deleted, 0);
        assert_eq!(report.skipped, 2);
        assert_eq!(store.rows("Deals"), before.as_slice());
    }

    #[test]
    fn test_empty_source_deletes_everything() {
        let mut source = FixedSource(Vec::new());
        let mut store = store_with(&["1", "2"]);

        let report = run_sync(&config(""), &mut source, &mut store, &DIFF).unwrap();

        assert_eq!(report.deleted, 2);
        assert_eq!(report.added_rows, 0);
        assert!(store.read_key_column("Deals", 0).unwrap().is_empty());
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let mut source = FixedSource(vec![record("9", "Won")]);
        let mut store = store_with(&["1"]);
        let opts = SyncOptions { mode: SyncMode::Diff, dry_run: true };

        let report = run_sync(&config(""), &mut source, &mut store, &opts).unwrap();

        assert!(report.success);
        assert!(report.dry_run);
        assert_eq!(report.added_keys, 1);
        assert_eq!(report.deleted, 1);
        assert_eq!(store.read_key_column("Deals", 0).unwrap(), vec!["1"]);
        assert!(!store.is_formatted("Deals"));
    }

    #[test]
    fn test_full_mode_rewrites() {
        let mut source = FixedSource(vec![record("1", "Won"), record("2", "Won")]);
        let mut store = store_with(&["1", "3"]);
        let opts = SyncOptions { mode: SyncMode::Full, dry_run: false };

        let report = run_sync(&config(""), &mut source, &mut store, &opts).unwrap();

        assert_eq!(report.added_keys, 2);
        assert_eq!(report.deleted, 2);
        assert_eq!(report.skipped, 0);
        assert_eq!(store.read_key_column("Deals", 0).unwrap(), vec!["1", "2"]);
    }

    #[test]
    fn test_failed_full_rewrite_keeps_existing_rows() {
        let mut source = FixedSource(vec![record("3", "Won")]);
        let mut store = store_with(&["1", "2"]).failing_writes("quota");
        let opts = SyncOptions { mode: SyncMode::Full, dry_run: false };

        let report = run_sync(&config(""), &mut source, &mut store, &opts).unwrap();

        assert!(!report.success);
        assert_eq!(report.deleted_rows, 0);
        assert_eq!(store.read_key_column("Deals", 0).unwrap(), vec!["1", "2"]);
        assert_eq!(store.rows("Deals").len(), 3);
    }

    #[test]
    fn test_apply_failure_still_reports() {
        let mut source = FixedSource(vec![record("1", "Won")]);
        let mut store = MemoryStore::new().failing_writes("Invalid secret key");

        let report = run_sync(&config(""), &mut source, &mut store, &DIFF).unwrap();

        assert!(!report.success);
        assert_eq!(report.added_keys, 1);
        assert_eq!(report.exit_code, exit_codes::EXIT_STORE_REJECTED);
        assert!(report.error.as_deref().unwrap_or_default().contains("Invalid secret key"));
    }

    #[test]
    fn test_format_failure_is_not_fatal() {
        let mut source = FixedSource(vec![record("1", "Won")]);
        let mut store = NoFormatStore(MemoryStore::new());

        let report = run_sync(&config(""), &mut source, &mut store, &DIFF).unwrap();

        assert!(report.success);
        assert_eq!(store.0.read_key_column("Deals", 0).unwrap(), vec!["1"]);
    }

    #[test]
    fn test_source_failure_is_error_without_writes() {
        let mut store = store_with(&["1"]);

        let err = run_sync(&config(""), &mut FailingSource, &mut store, &DIFF).unwrap_err();

        assert_eq!(err.code, exit_codes::EXIT_SOURCE_UPSTREAM);
        assert_eq!(store.read_key_column("Deals", 0).unwrap(), vec!["1"]);
    }

    #[test]
    fn test_report_json_shape() {
        let mut source = FixedSource(vec![record("1", "Won")]);
        let mut store = MemoryStore::new();
        let report = run_sync(&config(""), &mut source, &mut store, &DIFF).unwrap();

        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(value["mode"], "diff");
        assert_eq!(value["destination"], "memory");
        assert_eq!(value["success"], true);
        assert!(value["error"].is_null());
        assert!(value.get("exit_code").is_none());
    }
}
