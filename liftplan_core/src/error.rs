//! Error types for the liftplan_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for liftplan_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catalog validation error
    #[error("Catalog validation error: {0}")]
    CatalogValidation(String),

    /// Structure edit on a plan-derived session or on an active block
    #[error("Structural edit not allowed: {0}")]
    StructuralEditNotAllowed(String),

    /// A block, exercise, set or record id did not resolve
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transition requires the block to be active
    #[error("Block {0} is not active")]
    BlockNotActive(String),

    /// Edit is well-addressed but its values are invalid
    #[error("Invalid edit: {0}")]
    InvalidEdit(String),

    /// Any schedule/log/goal store read or write failure
    #[error("Persistence failure: {0}")]
    Persistence(String),

    /// History/PB enrichment failed
    #[error("History lookup failure: {0}")]
    HistoryLookup(String),
}
