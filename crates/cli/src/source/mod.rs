//! Source Reader: where deal records come from.
//!
//! [`RecordSource`] is the narrow seam the sync pipeline depends on. The CRM
//! client and the offline JSON reader both sit behind it, and any other
//! extractor (a scraper, a fixture) can too.

mod common;
mod crm;
mod file;

use std::path::PathBuf;

use thiserror::Error;

use sheetsync_engine::SourceRecord;

pub use crm::CrmClient;
pub use file::JsonFileSource;

pub trait RecordSource {
    /// Full snapshot, every page. Any failure aborts the whole fetch.
    fn fetch_all(&mut self) -> Result<Vec<SourceRecord>, SourceError>;
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("CRM auth failed ({status}): {body}")]
    Auth { status: u16, body: String },

    #[error("CRM error ({status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("CRM rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("network error: {0}")]
    Network(String),

    #[error("malformed CRM response: {0}")]
    Parse(String),

    #[error("cannot load {}: {message}", .path.display())]
    File { path: PathBuf, message: String },
}
