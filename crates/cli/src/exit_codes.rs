//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract. Cron jobs and schedulers
//! rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain           | Description                              |
//! |---------|------------------|------------------------------------------|
//! | 0       | Universal        | Success                                  |
//! | 1       | Universal        | General error (unspecified)              |
//! | 2       | Universal        | CLI usage error (bad args, missing file) |
//! | 3       | config           | Missing or invalid settings              |
//! | 50-59   | source           | CRM deal API                             |
//! | 60-69   | store            | Spreadsheet destination                  |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant error mapping below

use sheetsync_store::StoreError;

use crate::source::SourceError;

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure, including internal panics.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, unreadable input file, unwritable output.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Configuration (3)
// =============================================================================

/// One or more settings missing or invalid. Nothing was fetched or written.
pub const EXIT_CONFIG: u8 = 3;

// =============================================================================
// Source (50-59) - CRM deal API
// =============================================================================

/// Auth rejected by the CRM (401/403).
pub const EXIT_SOURCE_AUTH: u8 = 51;

/// Request rejected by the CRM (400/422).
pub const EXIT_SOURCE_REJECTED: u8 = 52;

/// Still rate limited (429) after all retries.
pub const EXIT_SOURCE_RATE_LIMIT: u8 = 53;

/// Any other non-2xx, a network failure, or a malformed response.
pub const EXIT_SOURCE_UPSTREAM: u8 = 54;

// =============================================================================
// Store (60-69) - spreadsheet destination
// =============================================================================

/// Destination unreachable (connect, TLS, timeout).
pub const EXIT_STORE_NETWORK: u8 = 60;

/// Destination answered with a non-2xx status.
pub const EXIT_STORE_HTTP: u8 = 61;

/// Destination refused the operation (`success: false`, unknown sheet).
pub const EXIT_STORE_REJECTED: u8 = 62;

/// Destination response could not be understood.
pub const EXIT_STORE_PARSE: u8 = 63;

// =============================================================================
// Error mapping
// =============================================================================

pub fn source_exit_code(err: &SourceError) -> u8 {
    match err {
        SourceError::Auth { .. } => EXIT_SOURCE_AUTH,
        SourceError::Upstream { status: 400 | 422, .. } => EXIT_SOURCE_REJECTED,
        SourceError::Upstream { .. } => EXIT_SOURCE_UPSTREAM,
        SourceError::RateLimited { .. } => EXIT_SOURCE_RATE_LIMIT,
        SourceError::Network(_) | SourceError::Parse(_) => EXIT_SOURCE_UPSTREAM,
        SourceError::File { .. } => EXIT_USAGE,
    }
}

pub fn store_exit_code(err: &StoreError) -> u8 {
    match err {
        StoreError::Network(_) => EXIT_STORE_NETWORK,
        StoreError::Http { .. } => EXIT_STORE_HTTP,
        StoreError::Rejected(_) | StoreError::SheetNotFound(_) => EXIT_STORE_REJECTED,
        StoreError::Parse(_) => EXIT_STORE_PARSE,
    }
}
