use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogLoadError {
    #[error("Failed to read catalog snapshot {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Catalog snapshot {path} is not a JSON object of item_id -> [representation]: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Malformed metadata for item '{item_id}' in representation '{representation}': {source}")]
    Metadata {
        item_id: String,
        representation: String,
        source: serde_json::Error,
    },
}

#[derive(Error, Debug)]
pub enum ProgressLogError {
    /// Resume position cannot be determined.
    #[error("Failed to read progress log {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Completion was not durably recorded; the item may be transferred again on resume.
    #[error("Failed to append to progress log {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize progress record: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    ProgressLog(#[from] ProgressLogError),

    #[error("Failed to stat {path}: {source}")]
    Stat {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Completion for catalog index {got} does not match the next item (expected {expected:?})")]
    StaleCompletion { expected: Option<usize>, got: usize },
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Failed to transfer {path}: {source}")]
    Transfer {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("No destination album for {0}")]
    NoAlbum(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}
