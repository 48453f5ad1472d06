use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MarlinError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Required file does not exist: {0}")]
    MissingFile(PathBuf),

    #[error("Required directory does not exist: {0}")]
    MissingDir(PathBuf),

    #[error("Empty or missing config value `{key}` for partition {sid_dck}")]
    MissingValue { key: &'static str, sid_dck: String },

    #[error("No period configured for partition {0}")]
    MissingPeriod(String),

    #[error("Invalid period `{0}`: expected YYYY or YYYY-MM")]
    InvalidPeriod(String),

    #[error("Invalid partition list line: `{0}`")]
    InvalidListLine(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Invalid input descriptor {path}: {reason}")]
    Descriptor { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}
