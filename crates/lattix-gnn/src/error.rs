//! Error types for lattix-gnn.

use thiserror::Error;

/// Backbone error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Candle tensor error (shape mismatches in malformed batches land here).
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    /// Config JSON could not be parsed.
    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration, rejected at construction.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// The layer stack could not be built from the first batch.
    #[error("build error: {0}")]
    Build(String),

    /// A batch is missing information the configured operator requires.
    #[error("input error: {0}")]
    Input(String),

    /// Edge features could not be turned into scalar edge weights.
    #[error("edge weight derivation failed: {0}")]
    EdgeWeight(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
