// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunwardenError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Entity store error: {0}")]
    StoreError(#[from] rusqlite::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Ambiguous: {0}")]
    Ambiguous(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Sample sheet of version {0} not supported")]
    UnsupportedSheetVersion(String),

    #[error("Malformed sample sheet: {0}")]
    MalformedSheet(String),

    #[error("Invalid tag: {0}")]
    InvalidTag(String),

    #[error("Unknown {kind} class '{name}'")]
    UnknownClass { kind: &'static str, name: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, RunwardenError>;
