//! Sheet Store: the spreadsheet destination behind one trait.
//!
//! Two network adapters ([`DirectStore`], [`RelayStore`]) and one in-process
//! adapter ([`MemoryStore`]). Every call is blocking and sequential; any
//! failure aborts the run.

mod direct;
mod error;
mod memory;
mod relay;

use std::time::Duration;

use sheetsync_engine::OutputRow;

pub use direct::DirectStore;
pub use error::StoreError;
pub use memory::MemoryStore;
pub use relay::RelayStore;

pub(crate) const USER_AGENT: &str = concat!("sheetsync/", env!("CARGO_PKG_VERSION"));
pub(crate) const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Counts reported back by [`SheetStore::apply`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub deleted_rows: usize,
    pub added_rows: usize,
}

/// Primitives the sync pipeline needs from a destination.
///
/// Column indices are zero-based. Keys read back are normalized with
/// [`sheetsync_engine::normalize_key`] so `"12"` and `12.0` compare equal.
pub trait SheetStore {
    /// Short adapter name for logs and reports.
    fn label(&self) -> &'static str;

    /// Check the destination is reachable. Returns a human-readable detail.
    fn ping(&mut self) -> Result<String, StoreError>;

    /// Non-blank keys from `column`, header row excluded, in row order.
    /// A key spanning several rows appears once per row.
    fn read_key_column(&mut self, sheet: &str, column: usize) -> Result<Vec<String>, StoreError>;

    /// Create the sheet if needed and write `headers` into row 1.
    fn ensure_header(&mut self, sheet: &str, headers: &[&str]) -> Result<(), StoreError>;

    fn append_rows(&mut self, sheet: &str, rows: &[OutputRow]) -> Result<(), StoreError>;

    /// Remove every row whose `key_column` value is in `keys`.
    /// Zero matches is not an error. Returns the number of rows removed.
    fn delete_rows(&mut self, sheet: &str, keys: &[String], key_column: usize) -> Result<usize, StoreError>;

    /// Remove all values, header included.
    fn clear(&mut self, sheet: &str) -> Result<(), StoreError>;

    /// Swap the whole sheet for `headers` plus `rows` in one request.
    /// On failure the previous contents are left in place. Returns the
    /// number of data rows written.
    fn replace_all(&mut self, sheet: &str, headers: &[&str], rows: &[OutputRow]) -> Result<usize, StoreError>;

    fn format_header_row(&mut self, sheet: &str, column_count: usize) -> Result<(), StoreError>;

    fn auto_resize_columns(&mut self, sheet: &str, column_count: usize) -> Result<(), StoreError>;

    /// Delete, then append, as one unit. Network adapters override this
    /// with a single request so a failure leaves the sheet untouched.
    fn apply(
        &mut self,
        sheet: &str,
        headers: &[&str],
        rows: &[OutputRow],
        delete_keys: &[String],
        key_column: usize,
    ) -> Result<ApplyOutcome, StoreError> {
        self.ensure_header(sheet, headers)?;
        let deleted_rows = if delete_keys.is_empty() {
            0
        } else {
            self.delete_rows(sheet, delete_keys, key_column)?
        };
        if !rows.is_empty() {
            self.append_rows(sheet, rows)?;
        }
        Ok(ApplyOutcome {
            deleted_rows,
            added_rows: rows.len(),
        })
    }
}

impl<S: SheetStore + ?Sized> SheetStore for Box<S> {
    fn label(&self) -> &'static str {
        (**self).label()
    }

    fn ping(&mut self) -> Result<String, StoreError> {
        (**self).ping()
    }

    fn read_key_column(&mut self, sheet: &str, column: usize) -> Result<Vec<String>, StoreError> {
        (**self).read_key_column(sheet, column)
    }

    fn ensure_header(&mut self, sheet: &str, headers: &[&str]) -> Result<(), StoreError> {
        (**self).ensure_header(sheet, headers)
    }

    fn append_rows(&mut self, sheet: &str, rows: &[OutputRow]) -> Result<(), StoreError> {
        (**self).append_rows(sheet, rows)
    }

    fn delete_rows(&mut self, sheet: &str, keys: &[String], key_column: usize) -> Result<usize, StoreError> {
        (**self).delete_rows(sheet, keys, key_column)
    }

    fn clear(&mut self, sheet: &str) -> Result<(), StoreError> {
        (**self).clear(sheet)
    }

    fn replace_all(&mut self, sheet: &str, headers: &[&str], rows: &[OutputRow]) -> Result<usize, StoreError> {
        (**self).replace_all(sheet, headers, rows)
    }

    fn format_header_row(&mut self, sheet: &str, column_count: usize) -> Result<(), StoreError> {
        (**self).format_header_row(sheet, column_count)
    }

    fn auto_resize_columns(&mut self, sheet: &str, column_count: usize) -> Result<(), StoreError> {
        (**self).auto_resize_columns(sheet, column_count)
    }

    fn apply(
        &mut self,
        sheet: &str,
        headers: &[&str],
        rows: &[OutputRow],
        delete_keys: &[String],
        key_column: usize,
    ) -> Result<ApplyOutcome, StoreError> {
        (**self).apply(sheet, headers, rows, delete_keys, key_column)
    }
}

pub(crate) fn http_client() -> Result<reqwest::blocking::Client, StoreError> {
    reqwest::blocking::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| StoreError::Network(format!("cannot build HTTP client: {}", e)))
}

/// Turn a non-2xx response into [`StoreError::Http`].
pub(crate) fn check(
    response: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response, StoreError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().unwrap_or_default();
    Err(StoreError::Http { status, body })
}
