use thiserror::Error;

/// Core error type for the Waypoint engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// Task state, task identifier, or flow position could not be resolved.
    ///
    /// Deliberately carries no detail: a malformed task identifier, an
    /// unknown identifier, a binder mismatch, and a mid-flow entry without
    /// an entry point are indistinguishable to the caller, so a response
    /// built from this error leaks nothing about task existence.
    #[error("not found")]
    NotFound,

    /// Configuration error - a wiring or flow-definition mistake, fatal at
    /// startup or surfaced to the developer, never to the end user
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Navigation error - a redirect target unreachable from the current
    /// position through any ancestor's child set
    #[error("navigation error: {0}")]
    Navigation(String),

    /// State store error
    #[error("state store error: {0}")]
    StateStore(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for FlowError {
    fn from(err: serde_json::Error) -> Self {
        FlowError::Serialization(err.to_string())
    }
}
