use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Every missing or invalid setting found during validation.
    #[error("invalid configuration:\n{}", bullet_list(.0))]
    Invalid(Vec<String>),

    #[error("cannot read config file {}: {message}", .path.display())]
    Read { path: PathBuf, message: String },

    #[error("cannot parse config file {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },
}

impl ConfigError {
    /// Problems reported by validation; empty for file errors.
    pub fn problems(&self) -> &[String] {
        match self {
            Self::Invalid(problems) => problems,
            _ => &[],
        }
    }
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("  - {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}
