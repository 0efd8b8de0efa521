use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DarwinError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("Oracle invocation failed ({command}): {reason}")]
    OracleInvocation {
        command: String,
        reason: String,
        stderr: String,
    },

    #[error("Report parse error: {reason}")]
    ReportParse { reason: String, raw: String },

    #[error("Persistence error writing {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Config source error: {0}")]
    ConfigSource(#[from] config::ConfigError),
}

impl DarwinError {
    pub(crate) fn parse(reason: impl Into<String>, raw: &str) -> Self {
        DarwinError::ReportParse {
            reason: reason.into(),
            raw: raw.to_string(),
        }
    }

    pub(crate) fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DarwinError::Persistence {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, DarwinError>;
