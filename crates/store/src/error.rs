use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection, TLS or timeout failure before a status was received.
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The relay answered 2xx with `success: false`.
    #[error("rejected by destination: {0}")]
    Rejected(String),

    #[error("malformed response: {0}")]
    Parse(String),

    #[error("sheet not found: {0}")]
    SheetNotFound(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            StoreError::Parse(e.to_string())
        } else {
            StoreError::Network(e.to_string())
        }
    }
}
