//! Relay adapter: one POST endpoint (a spreadsheet-bound web hook) that
//! speaks a JSON envelope.
//!
//! Request:  `{action, sheet_name, headers, rows, clear_before, secret_key?}`
//! plus `id_column`, `new_rows`, `delete_ids` for the `get_ids` and `sync`
//! actions. `id_column` is 1-based on the wire.
//!
//! Response: `{success: bool, message?, ids?, deleted?, added?}`. A non-2xx
//! status or `success: false` is a hard failure.

use serde::{Deserialize, Serialize};
use tracing::debug;

use sheetsync_engine::{key_from_json, OutputRow};

use crate::{check, http_client, ApplyOutcome, SheetStore, StoreError};

#[derive(Debug)]
pub struct RelayStore {
    http: reqwest::blocking::Client,
    url: String,
    secret: Option<String>,
    /// Header from the last `ensure_header`, resent with every `write`.
    headers: Vec<String>,
}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    action: &'a str,
    sheet_name: &'a str,
    headers: Vec<&'a str>,
    rows: &'a [OutputRow],
    clear_before: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    secret_key: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id_column: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    new_rows: Option<&'a [OutputRow]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    delete_ids: Option<&'a [String]>,
}

impl<'a> Envelope<'a> {
    fn new(action: &'a str, sheet_name: &'a str) -> Self {
        Self {
            action,
            sheet_name,
            headers: Vec::new(),
            rows: &[],
            clear_before: false,
            secret_key: None,
            id_column: None,
            new_rows: None,
            delete_ids: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RelayResponse {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    ids: Vec<serde_json::Value>,
    #[serde(default)]
    deleted: Option<usize>,
    #[serde(default)]
    added: Option<usize>,
}

impl RelayStore {
    pub fn new(url: &str, secret: Option<&str>) -> Result<Self, StoreError> {
        Ok(Self {
            http: http_client()?,
            url: url.to_string(),
            secret: secret.map(String::from),
            headers: Vec::new(),
        })
    }

    fn send<'a>(&'a self, mut envelope: Envelope<'a>) -> Result<RelayResponse, StoreError> {
        envelope.secret_key = self.secret.as_deref();
        debug!(action = envelope.action, sheet = envelope.sheet_name, "relay request");

        let response = self.http.post(&self.url).json(&envelope).send()?;
        let text = check(response)?.text()?;
        let parsed: RelayResponse = serde_json::from_str(&text)
            .map_err(|e| StoreError::Parse(format!("{} in relay response {:?}", e, preview(&text))))?;

        if !parsed.success {
            return Err(StoreError::Rejected(
                parsed.message.unwrap_or_else(|| "relay reported failure".to_string()),
            ));
        }
        if let Some(message) = &parsed.message {
            debug!(action = envelope.action, message = %message, "relay response");
        }
        Ok(parsed)
    }

    fn header_refs(&self) -> Vec<&str> {
        self.headers.iter().map(String::as_str).collect()
    }
}

impl SheetStore for RelayStore {
    fn label(&self) -> &'static str {
        "relay"
    }

    fn ping(&mut self) -> Result<String, StoreError> {
        let response = self.send(Envelope::new("ping", ""))?;
        Ok(response.message.unwrap_or_else(|| "ok".to_string()))
    }

    fn read_key_column(&mut self, sheet: &str, column: usize) -> Result<Vec<String>, StoreError> {
        let mut envelope = Envelope::new("get_ids", sheet);
        envelope.id_column = Some(column + 1);
        let response = self.send(envelope)?;
        Ok(response.ids.iter().filter_map(key_from_json).collect())
    }

    fn ensure_header(&mut self, sheet: &str, headers: &[&str]) -> Result<(), StoreError> {
        self.headers = headers.iter().map(|h| h.to_string()).collect();
        let mut envelope = Envelope::new("write", sheet);
        envelope.headers = headers.to_vec();
        self.send(envelope)?;
        Ok(())
    }

    fn append_rows(&mut self, sheet: &str, rows: &[OutputRow]) -> Result<(), StoreError> {
        let mut envelope = Envelope::new("write", sheet);
        envelope.headers = self.header_refs();
        envelope.rows = rows;
        self.send(envelope)?;
        Ok(())
    }

    fn delete_rows(&mut self, sheet: &str, keys: &[String], key_column: usize) -> Result<usize, StoreError> {
        let mut envelope = Envelope::new("sync", sheet);
        envelope.headers = self.header_refs();
        envelope.id_column = Some(key_column + 1);
        envelope.new_rows = Some(&[]);
        envelope.delete_ids = Some(keys);
        let response = self.send(envelope)?;
        Ok(response.deleted.unwrap_or(keys.len()))
    }

    fn clear(&mut self, sheet: &str) -> Result<(), StoreError> {
        self.send(Envelope::new("clear", sheet))?;
        Ok(())
    }

    // The relay script formats the sheet itself on every write.
    fn format_header_row(&mut self, _sheet: &str, _column_count: usize) -> Result<(), StoreError> {
        Ok(())
    }

    fn auto_resize_columns(&mut self, _sheet: &str, _column_count: usize) -> Result<(), StoreError> {
        Ok(())
    }

    /// One `write` with `clear_before`, so the relay swaps the contents in
    /// a single call.
    fn replace_all(&mut self, sheet: &str, headers: &[&str], rows: &[OutputRow]) -> Result<usize, StoreError> {
        self.headers = headers.iter().map(|h| h.to_string()).collect();
        let mut envelope = Envelope::new("write", sheet);
        envelope.headers = headers.to_vec();
        envelope.rows = rows;
        envelope.clear_before = true;
        let response = self.send(envelope)?;
        Ok(response.added.unwrap_or(rows.len()))
    }

    fn apply(
        &mut self,
        sheet: &str,
        headers: &[&str],
        rows: &[OutputRow],
        delete_keys: &[String],
        key_column: usize,
    ) -> Result<ApplyOutcome, StoreError> {
        self.headers = headers.iter().map(|h| h.to_string()).collect();
        let mut envelope = Envelope::new("sync", sheet);
        envelope.headers = headers.to_vec();
        envelope.id_column = Some(key_column + 1);
        envelope.new_rows = Some(rows);
        envelope.delete_ids = Some(delete_keys);
        let response = self.send(envelope)?;
        Ok(ApplyOutcome {
            deleted_rows: response.deleted.unwrap_or(delete_keys.len()),
            added_rows: response.added.unwrap_or(rows.len()),
        })
    }
}

fn preview(text: &str) -> String {
    const MAX: usize = 200;
    match text.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}
