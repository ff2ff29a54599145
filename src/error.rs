//! Top-level error type for the cleaning and splitting pipelines.
//!
//! Per the error handling design: lexical and structural problems in a
//! G-code stream are never surfaced here — malformed tokens are dropped,
//! invalid lines are flagged and passed through. `GCodeCleanError` only
//! covers resource, I/O, configuration-impossible, and splitter
//! precondition failures (exit codes 1+ at the CLI boundary).
//!
//! Serialized with serde's adjacently-tagged representation:
//! `{ "kind": "<variant>", "message": "<human-readable text>" }`, matching
//! the shape a downstream tool (GUI, CI log) would want to pattern-match on.

#[derive(Debug, thiserror::Error, serde::Serialize)]
#[serde(tag = "kind", content = "message")]
pub enum GCodeCleanError {
    /// The input file does not exist or could not be opened for reading.
    #[error("input file not found: {0}")]
    InputNotFound(String),

    /// A generic I/O error; converted to a string at the boundary so the
    /// error stays serializable.
    #[error("{0}")]
    Io(String),

    /// The token-definition catalogue JSON file is missing or malformed.
    #[error("token definition catalogue error: {0}")]
    Catalogue(String),

    /// A configuration value could not be honoured at all (distinct from an
    /// out-of-range value, which is silently clamped and logged).
    #[error("configuration error: {0}")]
    Config(String),

    /// The splitter was asked to process a file with no travelling comments.
    #[error("file has not been pre-processed: {0}")]
    NotPreProcessed(String),
}

impl From<std::io::Error> for GCodeCleanError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
