// Sync settings
// Built once at startup and passed by reference to every component

use std::fmt;
use std::time::Duration;

use sheetsync_engine::{parse_status_list, RecordFilter};

use crate::error::ConfigError;
use crate::file::FileConfig;

pub const DEFAULT_BASE_URL: &str = "https://senses-open-api.mazrica.com/v1";
pub const DEFAULT_SHEETS_API_BASE: &str = "https://sheets.googleapis.com";
pub const DEFAULT_SHEET_NAME: &str = "Deals";
pub const DEFAULT_SORT: &str = "-updatedAt";
pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const MAX_PAGE_SIZE: u32 = 1000;
/// 3 requests per second.
pub const DEFAULT_RATE_LIMIT_MS: u64 = 340;
pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 1000;

/// A credential that never shows up in `Debug` output or logs.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "Secret(<empty>)")
        } else {
            write!(f, "Secret(***)")
        }
    }
}

/// Values supplied on the command line or through the environment.
/// `None` means "not given"; the file and then the defaults fill the gap.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub page_size: Option<u32>,
    pub rate_limit_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub deal_type_id: Option<i64>,
    pub sort: Option<String>,
    pub category: Option<String>,
    /// Comma-separated.
    pub statuses: Option<String>,
    pub sheet_name: Option<String>,
    pub relay_url: Option<String>,
    pub relay_secret: Option<String>,
    pub spreadsheet_id: Option<String>,
    pub access_token: Option<String>,
    pub sheets_api_base: Option<String>,
}

/// Which halves of the configuration a command actually uses.
/// Only those halves are validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Needs {
    pub source: bool,
    pub destination: bool,
}

impl Needs {
    pub const ALL: Needs = Needs { source: true, destination: true };
    pub const SOURCE: Needs = Needs { source: true, destination: false };
    pub const DESTINATION: Needs = Needs { source: false, destination: true };
    pub const NONE: Needs = Needs { source: false, destination: false };
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceSettings {
    pub api_key: Secret,
    pub base_url: String,
    pub page_size: u32,
    /// Minimum spacing between consecutive requests.
    pub rate_limit: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub deal_type_id: Option<i64>,
    pub sort: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Destination {
    /// Single web-hook endpoint speaking the JSON envelope protocol.
    Relay { url: String, secret: Option<Secret> },
    /// Spreadsheet REST API with a bearer token.
    Direct {
        spreadsheet_id: String,
        access_token: Secret,
        api_base: String,
    },
}

impl Destination {
    pub fn label(&self) -> &'static str {
        match self {
            Destination::Relay { .. } => "relay",
            Destination::Direct { .. } => "direct",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    pub source: SourceSettings,
    pub filter: RecordFilter,
    pub sheet_name: String,
    /// `None` only when the command does not need a destination and none
    /// was configured.
    pub destination: Option<Destination>,
}

impl SyncConfig {
    /// Layer flags/env over the file over the defaults, then validate the
    /// parts named in `needs`. All problems are reported together.
    pub fn resolve(overrides: &Overrides, file: &FileConfig, needs: Needs) -> Result<Self, ConfigError> {
        let mut problems = Vec::new();
        let src = &file.source;
        let dst = &file.destination;

        // ── Source ──────────────────────────────────────────────────
        let api_key = pick_str(&overrides.api_key, &src.api_key);
        if needs.source && api_key.is_none() {
            problems.push("CRM API key is not set (--api-key or CRM_API_KEY)".to_string());
        }

        let base_url = pick_str(&overrides.base_url, &src.base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        if needs.source && !is_http_url(&base_url) {
            problems.push(format!("CRM base URL must start with http:// or https:// (got {:?})", base_url));
        }

        let page_size = overrides.page_size.or(src.page_size).unwrap_or(DEFAULT_PAGE_SIZE);
        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            problems.push(format!("page size must be between 1 and {} (got {})", MAX_PAGE_SIZE, page_size));
        }

        let source = SourceSettings {
            api_key: Secret::new(api_key.unwrap_or_default()),
            base_url: base_url.trim_end_matches('/').to_string(),
            page_size,
            rate_limit: Duration::from_millis(
                overrides.rate_limit_ms.or(src.rate_limit_ms).unwrap_or(DEFAULT_RATE_LIMIT_MS),
            ),
            max_retries: overrides.max_retries.or(src.max_retries).unwrap_or(DEFAULT_MAX_RETRIES),
            initial_backoff: Duration::from_millis(
                src.initial_backoff_ms.unwrap_or(DEFAULT_INITIAL_BACKOFF_MS),
            ),
            deal_type_id: overrides.deal_type_id.or(src.deal_type_id),
            sort: pick_str(&overrides.sort, &src.sort).unwrap_or_else(|| DEFAULT_SORT.to_string()),
        };

        // ── Filter ──────────────────────────────────────────────────
        // A flag given as "" clears whatever the file set.
        let category = match &overrides.category {
            Some(c) => c.trim().to_string(),
            None => file.filter.category.as_deref().unwrap_or("").trim().to_string(),
        };
        let statuses = match &overrides.statuses {
            Some(s) => parse_status_list(s),
            None => file
                .filter
                .statuses
                .iter()
                .flatten()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        };
        let filter = RecordFilter::new(category, statuses);

        // ── Destination ─────────────────────────────────────────────
        let sheet_name = pick_str(&overrides.sheet_name, &dst.sheet_name)
            .unwrap_or_else(|| DEFAULT_SHEET_NAME.to_string());

        let relay_url = pick_str(&overrides.relay_url, &dst.relay_url);
        let spreadsheet_id = pick_str(&overrides.spreadsheet_id, &dst.spreadsheet_id);

        let destination = match (relay_url, spreadsheet_id) {
            (Some(_), Some(_)) => Err(
                "set either a relay URL or a spreadsheet id, not both".to_string(),
            ),
            (None, None) => Err(
                "destination is not set (--relay-url / RELAY_URL or --spreadsheet-id / SPREADSHEET_ID)"
                    .to_string(),
            ),
            (Some(url), None) => {
                if is_http_url(&url) {
                    Ok(Destination::Relay {
                        url,
                        secret: pick_str(&overrides.relay_secret, &dst.relay_secret).map(Secret::new),
                    })
                } else {
                    Err(format!("relay URL must start with http:// or https:// (got {:?})", url))
                }
            }
            (None, Some(spreadsheet_id)) => {
                match pick_str(&overrides.access_token, &dst.access_token) {
                    Some(token) => Ok(Destination::Direct {
                        spreadsheet_id,
                        access_token: Secret::new(token),
                        api_base: pick_str(&overrides.sheets_api_base, &dst.sheets_api_base)
                            .unwrap_or_else(|| DEFAULT_SHEETS_API_BASE.to_string())
                            .trim_end_matches('/')
                            .to_string(),
                    }),
                    None => Err(
                        "access token is not set for direct mode (--access-token or GOOGLE_ACCESS_TOKEN)"
                            .to_string(),
                    ),
                }
            }
        };

        let destination = match destination {
            Ok(d) => Some(d),
            Err(problem) => {
                if needs.destination {
                    problems.push(problem);
                }
                None
            }
        };

        if !problems.is_empty() {
            return Err(ConfigError::Invalid(problems));
        }

        Ok(Self {
            source,
            filter,
            sheet_name,
            destination,
        })
    }
}

/// First non-blank value, flag before file.
fn pick_str(flag: &Option<String>, file: &Option<String>) -> Option<String> {
    [flag, file]
        .into_iter()
        .flatten()
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
        .map(String::from)
}

fn is_http_url(s: &str) -> bool {
    s.starts_with("https://") || s.starts_with("http://")
}
