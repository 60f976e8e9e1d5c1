//! Offline source: deals from a JSON file instead of the CRM.

use std::fs;
use std::path::PathBuf;

use serde_json::Value;
use tracing::info;

use sheetsync_engine::SourceRecord;

use super::crm::parse_deal;
use super::{RecordSource, SourceError};

/// Reads either a bare array of deal objects or a page envelope
/// `{"deals": [...]}` (a saved `/deals` response).
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn error(&self, message: impl Into<String>) -> SourceError {
        SourceError::File {
            path: self.path.clone(),
            message: message.into(),
        }
    }
}

impl RecordSource for JsonFileSource {
    fn fetch_all(&mut self) -> Result<Vec<SourceRecord>, SourceError> {
        let text = fs::read_to_string(&self.path).map_err(|e| self.error(e.to_string()))?;
        let value: Value = serde_json::from_str(&text).map_err(|e| self.error(e.to_string()))?;

        let deals = match &value {
            Value::Array(deals) => deals,
            Value::Object(map) => match map.get("deals") {
                Some(Value::Array(deals)) => deals,
                _ => return Err(self.error("expected an array of deals or an object with a 'deals' array")),
            },
            _ => return Err(self.error("expected an array of deals or an object with a 'deals' array")),
        };

        let records = deals
            .iter()
            .enumerate()
            .map(|(i, deal)| {
                parse_deal(deal).map_err(|e| self.error(format!("deal #{}: {}", i + 1, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!(records = records.len(), path = %self.path.display(), "loaded deals from file");
        Ok(records)
    }
}
