// sheetsync - diff-based sync of CRM deals into a spreadsheet

mod exit_codes;
mod export;
mod logging;
mod source;
mod sync;

use std::any::Any;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing::{debug, error, info};

use sheetsync_config::{ConfigError, Destination, FileConfig, Needs, Overrides, SyncConfig};
use sheetsync_store::{DirectStore, RelayStore, SheetStore, StoreError};

use exit_codes::{EXIT_CONFIG, EXIT_ERROR, EXIT_SUCCESS, EXIT_USAGE};
use source::{CrmClient, JsonFileSource, RecordSource, SourceError};
use sync::{run_sync, SyncMode, SyncOptions};

#[derive(Parser)]
#[command(name = "sheetsync")]
#[command(about = "Keep a spreadsheet in step with CRM deals (append new, delete vanished)")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// TOML config file [default: ~/.config/sheetsync/config.toml when present]
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Warnings and errors only
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(flatten)]
    overrides: OverrideArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Settings that override the config file. Each also reads its
/// environment variable.
#[derive(Args, Debug, Default)]
struct OverrideArgs {
    /// CRM API key
    #[arg(long, global = true, env = "CRM_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// CRM API base URL
    #[arg(long, global = true, env = "CRM_BASE_URL")]
    base_url: Option<String>,

    /// Relay web hook URL (relayed mode)
    #[arg(long, global = true, env = "RELAY_URL")]
    relay_url: Option<String>,

    /// Shared secret sent to the relay
    #[arg(long, global = true, env = "RELAY_SECRET", hide_env_values = true)]
    relay_secret: Option<String>,

    /// Spreadsheet id (direct mode)
    #[arg(long, global = true, env = "SPREADSHEET_ID")]
    spreadsheet_id: Option<String>,

    /// OAuth bearer token for the spreadsheet API (direct mode)
    #[arg(long, global = true, env = "GOOGLE_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Destination sheet name [default: Deals]
    #[arg(long = "sheet", global = true, env = "SHEET_NAME")]
    sheet_name: Option<String>,

    /// Keep records whose product name contains this (case-insensitive)
    #[arg(long, global = true, env = "FILTER_CATEGORY")]
    category: Option<String>,

    /// Keep records whose phase is one of these (comma-separated, exact)
    #[arg(long, global = true, env = "FILTER_STATUSES")]
    statuses: Option<String>,

    /// Only fetch deals of this deal type
    #[arg(long = "deal-type", global = true, env = "DEAL_TYPE_ID")]
    deal_type_id: Option<i64>,

    /// Records per page [default: 100]
    #[arg(long, global = true, env = "PAGE_SIZE")]
    page_size: Option<u32>,

    /// Minimum milliseconds between CRM requests [default: 340]
    #[arg(long, global = true, env = "RATE_LIMIT_MS")]
    rate_limit_ms: Option<u64>,
}

impl OverrideArgs {
    fn to_overrides(&self) -> Overrides {
        Overrides {
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            page_size: self.page_size,
            rate_limit_ms: self.rate_limit_ms,
            deal_type_id: self.deal_type_id,
            category: self.category.clone(),
            statuses: self.statuses.clone(),
            sheet_name: self.sheet_name.clone(),
            relay_url: self.relay_url.clone(),
            relay_secret: self.relay_secret.clone(),
            spreadsheet_id: self.spreadsheet_id.clone(),
            access_token: self.access_token.clone(),
            ..Default::default()
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch all deals and reconcile them into the destination sheet
    #[command(after_help = "\
Examples:
  sheetsync sync --relay-url https://script.google.com/macros/s/…/exec
  sheetsync sync --statuses Won,Closed --dry-run
  sheetsync sync --mode full --json > report.json
  sheetsync sync --input deals.json")]
    Sync {
        /// diff appends and deletes; full clears and rewrites
        #[arg(long, value_enum, default_value = "diff")]
        mode: SyncMode,

        /// Compute and report the plan without writing
        #[arg(long)]
        dry_run: bool,

        /// Print the report as JSON on stdout
        #[arg(long)]
        json: bool,

        /// Read deals from a JSON file instead of the CRM
        #[arg(long, value_name = "FILE")]
        input: Option<PathBuf>,
    },

    /// Write the filtered rows as CSV (no destination needed)
    Export {
        /// Read deals from a JSON file instead of the CRM
        #[arg(long, value_name = "FILE")]
        input: Option<PathBuf>,

        /// Output file [default: stdout]
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },

    /// List the CRM's deal types (ids for --deal-type)
    DealTypes {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check the destination is reachable
    Ping,

    /// Remove every value from the destination sheet, header included
    Clear,
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\nengine:  sheetsync-engine ", env!("CARGO_PKG_VERSION"),
        "\ntarget:  ", env!("TARGET"),
    )
}

fn main() -> ExitCode {
    // Before parsing so clap's `env` lookups see .env values
    let dotenv = sheetsync_config::load_dotenv();
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet);
    install_panic_hook();
    if let Some(path) = dotenv {
        debug!(path = %path.display(), "loaded .env");
    }

    match run(cli) {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            eprintln!("error: {}", message);
            if let Some(hint) = hint {
                eprintln!("hint: {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

/// Log any panic with its location and exit with `EXIT_ERROR` instead of
/// unwinding with the default message.
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let message = panic_message(info.payload());
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown".to_string());
        error!(location = %location, message = %message, "internal error");
        eprintln!("error: internal error: {}", message);
        eprintln!("hint: rerun with -v and report the output");
        std::process::exit(i32::from(EXIT_ERROR));
    }));
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let overrides = cli.overrides.to_overrides();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Sync { mode, dry_run, json, input } => {
            let needs = if input.is_some() { Needs::DESTINATION } else { Needs::ALL };
            let config = load_config(config_path, &overrides, needs)?;
            cmd_sync(&config, input, SyncOptions { mode, dry_run }, json)
        }
        Commands::Export { input, out } => {
            let needs = if input.is_some() { Needs::NONE } else { Needs::SOURCE };
            let config = load_config(config_path, &overrides, needs)?;
            cmd_export(&config, input, out)
        }
        Commands::DealTypes { json } => {
            let config = load_config(config_path, &overrides, Needs::SOURCE)?;
            cmd_deal_types(&config, json)
        }
        Commands::Ping => {
            let config = load_config(config_path, &overrides, Needs::DESTINATION)?;
            cmd_ping(&config)
        }
        Commands::Clear => {
            let config = load_config(config_path, &overrides, Needs::DESTINATION)?;
            cmd_clear(&config)
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self { code: EXIT_CONFIG, message: msg.into(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl std::fmt::Debug for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CliError({}: {})", self.code, self.message)
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        let hint = match &err {
            ConfigError::Invalid(_) => {
                "settings come from flags, environment variables, .env and the config file"
            }
            _ => "check the file passed with --config",
        };
        CliError::config(err.to_string()).with_hint(hint)
    }
}

impl From<SourceError> for CliError {
    fn from(err: SourceError) -> Self {
        let code = exit_codes::source_exit_code(&err);
        let hint = match &err {
            SourceError::Auth { .. } => Some("check CRM_API_KEY".to_string()),
            SourceError::RateLimited { .. } => Some("raise --rate-limit-ms or retry later".to_string()),
            _ => None,
        };
        Self { code, message: err.to_string(), hint }
    }
}

impl From<StoreError> for CliError {
    fn from(err: StoreError) -> Self {
        let code = exit_codes::store_exit_code(&err);
        let hint = match &err {
            StoreError::Http { status: 401 | 403, .. } => {
                Some("check GOOGLE_ACCESS_TOKEN and that the sheet is shared with it".to_string())
            }
            StoreError::Rejected(_) => Some("check RELAY_SECRET and the relay deployment".to_string()),
            _ => None,
        };
        Self { code, message: err.to_string(), hint }
    }
}

// ============================================================================
// Wiring
// ============================================================================

fn load_config(path: Option<&std::path::Path>, overrides: &Overrides, needs: Needs) -> Result<SyncConfig, CliError> {
    let (file, used) = FileConfig::load(path)?;
    if let Some(used) = used {
        debug!(path = %used.display(), "loaded config file");
    }
    Ok(SyncConfig::resolve(overrides, &file, needs)?)
}

fn open_source(config: &SyncConfig, input: Option<PathBuf>) -> Result<Box<dyn RecordSource>, CliError> {
    match input {
        Some(path) => Ok(Box::new(JsonFileSource::new(path))),
        None => Ok(Box::new(CrmClient::new(&config.source)?)),
    }
}

fn open_store(config: &SyncConfig) -> Result<Box<dyn SheetStore>, CliError> {
    match &config.destination {
        Some(Destination::Relay { url, secret }) => {
            Ok(Box::new(RelayStore::new(url, secret.as_ref().map(|s| s.expose()))?))
        }
        Some(Destination::Direct { spreadsheet_id, access_token, api_base }) => {
            Ok(Box::new(DirectStore::new(api_base, spreadsheet_id, access_token.expose())?))
        }
        None => Err(CliError::config("destination is not set")),
    }
}

// ============================================================================
// Commands
// ============================================================================

fn cmd_sync(config: &SyncConfig, input: Option<PathBuf>, opts: SyncOptions, json: bool) -> Result<(), CliError> {
    let mut source = open_source(config, input)?;
    let mut store = open_store(config)?;

    let report = run_sync(config, source.as_mut(), store.as_mut(), &opts)?;

    if json {
        println!("{}", report.to_json()?);
    } else {
        report.print_summary();
    }

    match report.error {
        Some(message) => Err(CliError { code: report.exit_code, message, hint: None }),
        None => Ok(()),
    }
}

fn cmd_export(config: &SyncConfig, input: Option<PathBuf>, out: Option<PathBuf>) -> Result<(), CliError> {
    let mut source = open_source(config, input)?;
    let records = source.fetch_all()?;
    let rows = export::export_rows(&records, &config.filter);
    let label = export::write_csv(&rows, &out)?;
    if out.is_some() {
        eprintln!("wrote {} rows to {}", rows.len(), label);
    }
    Ok(())
}

fn cmd_deal_types(config: &SyncConfig, json: bool) -> Result<(), CliError> {
    let mut client = CrmClient::new(&config.source)?;
    let types = client.deal_types()?;

    if json {
        let text = serde_json::to_string_pretty(&types)
            .map_err(|e| CliError::io(format!("cannot serialize deal types: {}", e)))?;
        println!("{}", text);
    } else {
        for t in &types {
            let id = t.id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string());
            println!("{:>8}  {}", id, t.name);
        }
    }
    Ok(())
}

fn cmd_ping(config: &SyncConfig) -> Result<(), CliError> {
    let mut store = open_store(config)?;
    let detail = store.ping()?;
    println!("{}: {}", store.label(), detail);
    Ok(())
}

fn cmd_clear(config: &SyncConfig) -> Result<(), CliError> {
    let mut store = open_store(config)?;
    store.clear(&config.sheet_name)?;
    info!(sheet = %config.sheet_name, destination = store.label(), "cleared");
    Ok(())
}
