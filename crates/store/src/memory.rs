use std::collections::{BTreeMap, HashSet};

use sheetsync_engine::{normalize_key, OutputRow};

use crate::{SheetStore, StoreError};

/// In-process destination. Cells are stored in rendered text form, row 0 is
/// the header once [`SheetStore::ensure_header`] has run.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    sheets: BTreeMap<String, Vec<Vec<String>>>,
    formatted: HashSet<String>,
    fail_writes: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `rows` under a header, as if synced by an earlier run.
    pub fn with_sheet(mut self, sheet: &str, headers: &[&str], rows: Vec<Vec<String>>) -> Self {
        let mut all = vec![headers.iter().map(|h| h.to_string()).collect()];
        all.extend(rows);
        self.sheets.insert(sheet.to_string(), all);
        self
    }

    /// Make every mutating call fail with [`StoreError::Rejected`].
    pub fn failing_writes(mut self, message: &str) -> Self {
        self.fail_writes = Some(message.to_string());
        self
    }

    /// All rows including the header.
    pub fn rows(&self, sheet: &str) -> &[Vec<String>] {
        self.sheets.get(sheet).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_formatted(&self, sheet: &str) -> bool {
        self.formatted.contains(sheet)
    }

    fn guard(&self) -> Result<(), StoreError> {
        match &self.fail_writes {
            Some(message) => Err(StoreError::Rejected(message.clone())),
            None => Ok(()),
        }
    }

    fn sheet_mut(&mut self, sheet: &str) -> Result<&mut Vec<Vec<String>>, StoreError> {
        self.sheets
            .get_mut(sheet)
            .ok_or_else(|| StoreError::SheetNotFound(sheet.to_string()))
    }
}

impl SheetStore for MemoryStore {
    fn label(&self) -> &'static str {
        "memory"
    }

    fn ping(&mut self) -> Result<String, StoreError> {
        Ok(format!("{} sheet(s) in memory", self.sheets.len()))
    }

    fn read_key_column(&mut self, sheet: &str, column: usize) -> Result<Vec<String>, StoreError> {
        Ok(self
            .rows(sheet)
            .iter()
            .skip(1)
            .filter_map(|row| row.get(column).and_then(|v| normalize_key(v)))
            .collect())
    }

    fn ensure_header(&mut self, sheet: &str, headers: &[&str]) -> Result<(), StoreError> {
        self.guard()?;
        let header: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
        let rows = self.sheets.entry(sheet.to_string()).or_default();
        match rows.first_mut() {
            Some(first) => *first = header,
            None => rows.push(header),
        }
        Ok(())
    }

    fn append_rows(&mut self, sheet: &str, rows: &[OutputRow]) -> Result<(), StoreError> {
        self.guard()?;
        let target = self.sheet_mut(sheet)?;
        target.extend(rows.iter().map(OutputRow::rendered));
        Ok(())
    }

    fn delete_rows(&mut self, sheet: &str, keys: &[String], key_column: usize) -> Result<usize, StoreError> {
        self.guard()?;
        let doomed: HashSet<&str> = keys.iter().map(String::as_str).collect();
        let target = self.sheet_mut(sheet)?;
        let before = target.len();
        let mut index = 0;
        target.retain(|row| {
            let keep = index == 0
                || !row
                    .get(key_column)
                    .and_then(|v| normalize_key(v))
                    .is_some_and(|k| doomed.contains(k.as_str()));
            index += 1;
            keep
        });
        Ok(before - target.len())
    }

    fn clear(&mut self, sheet: &str) -> Result<(), StoreError> {
        self.guard()?;
        if let Some(rows) = self.sheets.get_mut(sheet) {
            rows.clear();
        }
        self.formatted.remove(sheet);
        Ok(())
    }

    fn replace_all(&mut self, sheet: &str, headers: &[&str], rows: &[OutputRow]) -> Result<usize, StoreError> {
        self.guard()?;
        let mut all = vec![headers.iter().map(|h| h.to_string()).collect()];
        all.extend(rows.iter().map(OutputRow::rendered));
        self.sheets.insert(sheet.to_string(), all);
        self.formatted.remove(sheet);
        Ok(rows.len())
    }

    fn format_header_row(&mut self, sheet: &str, _column_count: usize) -> Result<(), StoreError> {
        self.formatted.insert(sheet.to_string());
        Ok(())
    }

    fn auto_resize_columns(&mut self, _sheet: &str, _column_count: usize) -> Result<(), StoreError> {
        Ok(())
    }
}
