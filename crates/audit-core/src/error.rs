use std::path::PathBuf;
use thiserror::Error;

/// Failures raised by the audit crates.
///
/// Only loading and configuration are fatal; the report builders surface the
/// per-declaration variants as log lines and carry on.
#[derive(Error, Debug)]
pub enum AuditError {
    /// A history export could not be opened.
    #[error("Cannot read history export {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// No accepted format matched.
    #[error("Unrecognised timestamp: {0}")]
    TimestampParse(String),

    #[error("Declaration {0} has no events")]
    EmptyHistory(String),

    /// A declaration history holds an event filed under another declaration.
    #[error("Declaration {declaration_id} history contains an event of {found}")]
    MixedHistory {
        declaration_id: String,
        found: String,
    },

    /// A team name is not present in the configured rosters.
    #[error("Unknown team: {0}")]
    UnknownTeam(String),

    #[error("History data path not found: {0}")]
    DataPathNotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AuditError>;
