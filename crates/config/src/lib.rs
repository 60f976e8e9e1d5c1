// Configuration loading

pub mod error;
pub mod file;
pub mod settings;

pub use error::ConfigError;
pub use file::{default_config_path, load_dotenv, FileConfig};
pub use settings::{
    Destination, Needs, Overrides, Secret, SourceSettings, SyncConfig, DEFAULT_BASE_URL,
    DEFAULT_SHEETS_API_BASE,
};
