// Optional TOML config file
// Loaded from --config, else ~/.config/sheetsync/config.toml when present

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

/// On-disk configuration. Every field is optional; flags and environment
/// variables take precedence over anything set here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub source: SourceSection,
    pub filter: FilterSection,
    pub destination: DestinationSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceSection {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub page_size: Option<u32>,
    pub rate_limit_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub initial_backoff_ms: Option<u64>,
    pub deal_type_id: Option<i64>,
    pub sort: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterSection {
    pub category: Option<String>,
    pub statuses: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DestinationSection {
    pub sheet_name: Option<String>,
    pub relay_url: Option<String>,
    pub relay_secret: Option<String>,
    pub spreadsheet_id: Option<String>,
    pub access_token: Option<String>,
    pub sheets_api_base: Option<String>,
}

impl FileConfig {
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Load the config file.
    ///
    /// An explicit path must exist. Without one, the default location is
    /// used if present and an empty config is returned otherwise.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => match default_config_path() {
                Some(p) if p.exists() => p,
                _ => return Ok((Self::default(), None)),
            },
        };

        let text = fs::read_to_string(&path).map_err(|e| ConfigError::Read {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let config = Self::from_toml(&text).map_err(|e| ConfigError::Parse {
            path: path.clone(),
            message: e.to_string(),
        })?;
        Ok((config, Some(path)))
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("sheetsync").join("config.toml"))
}

/// Load `.env` from the working directory (or a parent). Variables already
/// set in the process environment win.
pub fn load_dotenv() -> Option<PathBuf> {
    dotenvy::dotenv().ok()
}
