//! Error taxonomy for the data plane.
//!
//! Transient failures (watch disconnects, scrape errors) are absorbed and
//! retried by their owning component; only semantic errors cross module
//! boundaries.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Credential configuration could not be loaded or the cluster is
    /// unreachable at startup. Fatal; the binary exits 1.
    #[error("credential error: {0}")]
    Credential(String),

    /// An access review denied get/list on a resource. The affected view is
    /// disabled; other views keep refreshing.
    #[error("access denied for {resource} (verb: {verb})")]
    Authorization { resource: String, verb: String },

    /// Network error, server 5xx, or timeout. Retried internally and counted
    /// by the health tracker.
    #[error("transient API error: {0}")]
    Transient(String),

    /// No metrics source is configured, or all configured sources failed.
    /// Views are produced with zero usage fields.
    #[error("metrics unavailable: {0}")]
    MetricsUnavailable(String),

    /// The source exists but is currently failing its collection cycle.
    /// Triggers fallback when the hybrid coordinator has it enabled.
    #[error("metrics source unhealthy: {0}")]
    SourceUnhealthy(String),

    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },

    /// Context cancellation. Never logged.
    #[error("cancelled")]
    Cancelled,

    #[error("log stream error: {0}")]
    LogStream(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Api(#[from] kube::Error),
}

impl Error {
    /// True for errors the refresh loops absorb (retry or count) rather than
    /// surface to the caller.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_) | Error::Api(_))
    }
}
