//! Direct adapter: spreadsheet REST API (Sheets v4) with a bearer token.
//!
//! Endpoints used, relative to `{api_base}/v4/spreadsheets/{id}`:
//!
//! | Call                          | Purpose                                   |
//! |-------------------------------|-------------------------------------------|
//! | `GET ?fields=…`               | resolve sheet name → `sheetId`, ping      |
//! | `POST :batchUpdate`           | addSheet, apply, replace, format, resize  |
//! | `GET values:batchGet`         | read the key column                       |
//! | `POST values:batchUpdate`     | write the header row                      |
//! | `POST values/{range}:append`  | append rows                               |
//! | `POST values/{range}:clear`   | clear `A:Z`                               |
//!
//! `apply` and `replace_all` go out as one `:batchUpdate`, which the API
//! applies all-or-nothing. Values are written as typed cells (or `RAW`), so
//! text such as `"007"` or `"=1+1"` is stored exactly as sent.

use std::collections::{HashMap, HashSet};

use serde_json::{json, Value};
use tracing::{debug, info};

use sheetsync_engine::{key_from_json, Cell, OutputRow};

use crate::{check, http_client, ApplyOutcome, SheetStore, StoreError};

#[derive(Debug)]
pub struct DirectStore {
    http: reqwest::blocking::Client,
    api_base: String,
    spreadsheet_id: String,
    token: String,
    sheet_ids: HashMap<String, i64>,
}

impl DirectStore {
    pub fn new(api_base: &str, spreadsheet_id: &str, token: &str) -> Result<Self, StoreError> {
        Ok(Self {
            http: http_client()?,
            api_base: api_base.trim_end_matches('/').to_string(),
            spreadsheet_id: spreadsheet_id.to_string(),
            token: token.to_string(),
            sheet_ids: HashMap::new(),
        })
    }

    // ── URLs ────────────────────────────────────────────────────────

    /// `{api_base}/v4/spreadsheets/{id}{id_suffix}/{rest…}` with every path
    /// segment percent-encoded.
    fn url(&self, id_suffix: &str, rest: &[&str]) -> Result<reqwest::Url, StoreError> {
        let invalid = || StoreError::Network(format!("invalid API base {:?}", self.api_base));
        let mut url = reqwest::Url::parse(&self.api_base).map_err(|_| invalid())?;
        {
            let mut path = url.path_segments_mut().map_err(|_| invalid())?;
            path.pop_if_empty()
                .push("v4")
                .push("spreadsheets")
                .push(&format!("{}{}", self.spreadsheet_id, id_suffix));
            for segment in rest {
                path.push(segment);
            }
        }
        Ok(url)
    }

    // ── HTTP ────────────────────────────────────────────────────────

    fn get(&self, url: reqwest::Url, query: &[(&str, &str)]) -> Result<Value, StoreError> {
        debug!(url = %url, "GET");
        let response = self.http.get(url).bearer_auth(&self.token).query(query).send()?;
        Ok(check(response)?.json()?)
    }

    fn post(&self, url: reqwest::Url, query: &[(&str, &str)], body: &Value) -> Result<Value, StoreError> {
        debug!(url = %url, "POST");
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .query(query)
            .json(body)
            .send()?;
        Ok(check(response)?.json()?)
    }

    fn batch_update(&self, requests: Vec<Value>) -> Result<Value, StoreError> {
        let url = self.url(":batchUpdate", &[])?;
        self.post(url, &[], &json!({ "requests": requests }))
    }

    // ── Sheets ──────────────────────────────────────────────────────

    fn lookup_sheet_id(&mut self, sheet: &str) -> Result<Option<i64>, StoreError> {
        if let Some(id) = self.sheet_ids.get(sheet) {
            return Ok(Some(*id));
        }
        let url = self.url("", &[])?;
        let metadata = self.get(url, &[("fields", "sheets.properties(sheetId,title)")])?;
        let sheets = metadata
            .get("sheets")
            .and_then(Value::as_array)
            .ok_or_else(|| StoreError::Parse("spreadsheet metadata has no sheets".to_string()))?;

        for entry in sheets {
            let props = &entry["properties"];
            if let (Some(title), Some(id)) = (props["title"].as_str(), props["sheetId"].as_i64()) {
                self.sheet_ids.insert(title.to_string(), id);
            }
        }
        Ok(self.sheet_ids.get(sheet).copied())
    }

    fn sheet_id(&mut self, sheet: &str) -> Result<i64, StoreError> {
        self.lookup_sheet_id(sheet)?
            .ok_or_else(|| StoreError::SheetNotFound(sheet.to_string()))
    }

    fn ensure_sheet(&mut self, sheet: &str) -> Result<i64, StoreError> {
        if let Some(id) = self.lookup_sheet_id(sheet)? {
            return Ok(id);
        }
        info!(sheet, "creating sheet");
        let reply = self.batch_update(vec![json!({
            "addSheet": { "properties": { "title": sheet } }
        })])?;
        let id = reply["replies"][0]["addSheet"]["properties"]["sheetId"]
            .as_i64()
            .ok_or_else(|| StoreError::Parse("addSheet reply has no sheetId".to_string()))?;
        self.sheet_ids.insert(sheet.to_string(), id);
        Ok(id)
    }

    /// Raw values of one column, header row included. Blank cells are `None`.
    fn column_values(&mut self, sheet: &str, column: usize) -> Result<Vec<Option<String>>, StoreError> {
        if self.lookup_sheet_id(sheet)?.is_none() {
            return Ok(Vec::new());
        }
        let letter = column_letter(column);
        let range = format!("{}!{}:{}", quote_sheet(sheet), letter, letter);
        let url = self.url("", &["values:batchGet"])?;
        let body = self.get(
            url,
            &[
                ("ranges", range.as_str()),
                ("majorDimension", "COLUMNS"),
                ("valueRenderOption", "UNFORMATTED_VALUE"),
            ],
        )?;

        let values = match body["valueRanges"][0]["values"][0].as_array() {
            Some(values) => values,
            // An empty column comes back without `values`
            None => return Ok(Vec::new()),
        };
        Ok(values.iter().map(key_from_json).collect())
    }
}

impl SheetStore for DirectStore {
    fn label(&self) -> &'static str {
        "direct"
    }

    fn ping(&mut self) -> Result<String, StoreError> {
        let url = self.url("", &[])?;
        let metadata = self.get(url, &[("fields", "properties.title")])?;
        let title = metadata["properties"]["title"].as_str().unwrap_or("(untitled)");
        Ok(format!("spreadsheet {:?}", title))
    }

    fn read_key_column(&mut self, sheet: &str, column: usize) -> Result<Vec<String>, StoreError> {
        Ok(self
            .column_values(sheet, column)?
            .into_iter()
            .skip(1)
            .flatten()
            .collect())
    }

    fn ensure_header(&mut self, sheet: &str, headers: &[&str]) -> Result<(), StoreError> {
        self.ensure_sheet(sheet)?;
        let url = self.url("", &["values:batchUpdate"])?;
        self.post(
            url,
            &[],
            &json!({
                "valueInputOption": "RAW",
                "data": [{
                    "range": format!("{}!A1", quote_sheet(sheet)),
                    "values": [headers],
                }],
            }),
        )?;
        Ok(())
    }

    fn append_rows(&mut self, sheet: &str, rows: &[OutputRow]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        let range = format!("{}!A1", quote_sheet(sheet));
        let url = self.url("", &["values", &format!("{}:append", range)])?;
        self.post(
            url,
            &[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")],
            &json!({ "majorDimension": "ROWS", "values": rows }),
        )?;
        debug!(sheet, rows = rows.len(), "appended");
        Ok(())
    }

    fn delete_rows(&mut self, sheet: &str, keys: &[String], key_column: usize) -> Result<usize, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let values = self.column_values(sheet, key_column)?;
        let indices = rows_to_delete(&values, keys);
        if indices.is_empty() {
            return Ok(0);
        }

        let sheet_id = self.sheet_id(sheet)?;
        self.batch_update(indices.iter().map(|&i| delete_row(sheet_id, i)).collect())?;
        Ok(indices.len())
    }

    fn clear(&mut self, sheet: &str) -> Result<(), StoreError> {
        if self.lookup_sheet_id(sheet)?.is_none() {
            return Ok(());
        }
        let range = format!("{}!A:Z", quote_sheet(sheet));
        let url = self.url("", &["values", &format!("{}:clear", range)])?;
        self.post(url, &[], &json!({}))?;
        Ok(())
    }

    fn replace_all(&mut self, sheet: &str, headers: &[&str], rows: &[OutputRow]) -> Result<usize, StoreError> {
        let sheet_id = self.ensure_sheet(sheet)?;
        let mut all = vec![header_row(headers)];
        all.extend(rows.iter().map(row_data));
        self.batch_update(vec![
            json!({
                "updateCells": {
                    "range": { "sheetId": sheet_id },
                    "fields": "userEnteredValue",
                }
            }),
            append_cells(sheet_id, all),
        ])?;
        info!(sheet, rows = rows.len(), "sheet replaced");
        Ok(rows.len())
    }

    /// Header write, row deletions and the append in one `:batchUpdate`.
    fn apply(
        &mut self,
        sheet: &str,
        headers: &[&str],
        rows: &[OutputRow],
        delete_keys: &[String],
        key_column: usize,
    ) -> Result<ApplyOutcome, StoreError> {
        let sheet_id = self.ensure_sheet(sheet)?;
        let indices = if delete_keys.is_empty() {
            Vec::new()
        } else {
            rows_to_delete(&self.column_values(sheet, key_column)?, delete_keys)
        };

        let mut requests = vec![json!({
            "updateCells": {
                "start": { "sheetId": sheet_id, "rowIndex": 0, "columnIndex": 0 },
                "rows": [header_row(headers)],
                "fields": "userEnteredValue",
            }
        })];
        requests.extend(indices.iter().map(|&i| delete_row(sheet_id, i)));
        if !rows.is_empty() {
            requests.push(append_cells(sheet_id, rows.iter().map(row_data).collect()));
        }
        self.batch_update(requests)?;
        debug!(sheet, deleted = indices.len(), appended = rows.len(), "applied in one batch");

        Ok(ApplyOutcome {
            deleted_rows: indices.len(),
            added_rows: rows.len(),
        })
    }

    fn format_header_row(&mut self, sheet: &str, column_count: usize) -> Result<(), StoreError> {
        let sheet_id = self.sheet_id(sheet)?;
        self.batch_update(vec![
            json!({
                "repeatCell": {
                    "range": {
                        "sheetId": sheet_id,
                        "startRowIndex": 0,
                        "endRowIndex": 1,
                        "startColumnIndex": 0,
                        "endColumnIndex": column_count,
                    },
                    "cell": {
                        "userEnteredFormat": {
                            "textFormat": { "bold": true },
                            "backgroundColor": { "red": 0.9, "green": 0.9, "blue": 0.9 },
                        }
                    },
                    "fields": "userEnteredFormat(textFormat,backgroundColor)",
                }
            }),
            json!({
                "updateSheetProperties": {
                    "properties": {
                        "sheetId": sheet_id,
                        "gridProperties": { "frozenRowCount": 1 },
                    },
                    "fields": "gridProperties.frozenRowCount",
                }
            }),
        ])?;
        Ok(())
    }

    fn auto_resize_columns(&mut self, sheet: &str, column_count: usize) -> Result<(), StoreError> {
        let sheet_id = self.sheet_id(sheet)?;
        self.batch_update(vec![json!({
            "autoResizeDimensions": {
                "dimensions": {
                    "sheetId": sheet_id,
                    "dimension": "COLUMNS",
                    "startIndex": 0,
                    "endIndex": column_count,
                }
            }
        })])?;
        Ok(())
    }
}

/// Positions (0 = header) whose key is in `keys`, in descending order so
/// that each deletion leaves the remaining indices valid.
fn rows_to_delete(values: &[Option<String>], keys: &[String]) -> Vec<usize> {
    let doomed: HashSet<&str> = keys.iter().map(String::as_str).collect();
    let mut indices: Vec<usize> = values
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(_, v)| v.as_deref().is_some_and(|k| doomed.contains(k)))
        .map(|(i, _)| i)
        .collect();
    indices.reverse();
    indices
}

// ── Batch requests ──────────────────────────────────────────────────

fn delete_row(sheet_id: i64, index: usize) -> Value {
    json!({
        "deleteDimension": {
            "range": {
                "sheetId": sheet_id,
                "dimension": "ROWS",
                "startIndex": index,
                "endIndex": index + 1,
            }
        }
    })
}

/// Appends after the last row with data, growing the grid as needed.
fn append_cells(sheet_id: i64, rows: Vec<Value>) -> Value {
    json!({
        "appendCells": {
            "sheetId": sheet_id,
            "rows": rows,
            "fields": "userEnteredValue",
        }
    })
}

fn header_row(headers: &[&str]) -> Value {
    let values: Vec<Value> = headers
        .iter()
        .map(|h| json!({ "userEnteredValue": { "stringValue": h } }))
        .collect();
    json!({ "values": values })
}

fn row_data(row: &OutputRow) -> Value {
    let values: Vec<Value> = row.cells().iter().map(cell_data).collect();
    json!({ "values": values })
}

/// Text goes in as `stringValue`, never parsed as a number or formula.
fn cell_data(cell: &Cell) -> Value {
    match cell {
        Cell::Empty => json!({}),
        Cell::Text(s) => json!({ "userEnteredValue": { "stringValue": s } }),
        Cell::Number(n) if n.is_finite() => json!({ "userEnteredValue": { "numberValue": n } }),
        Cell::Number(_) => json!({}),
        Cell::Int(n) => json!({ "userEnteredValue": { "numberValue": n } }),
    }
}

// ── A1 notation ─────────────────────────────────────────────────────

/// Zero-based column index → letters (`0` → `A`, `26` → `AA`).
fn column_letter(mut index: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.iter().rev().map(|&b| b as char).collect()
}

/// Sheet names are always quoted; embedded quotes are doubled.
fn quote_sheet(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}
