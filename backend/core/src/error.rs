use thiserror::Error;

/// Top-level error type for the Keel runtime.
///
/// Deliberately narrow: adapter failures are recovered in place with
/// degraded context and gate failures collapse to a fail-safe decision,
/// so neither ever crosses this boundary.
#[derive(Debug, Error)]
pub enum KeelError {
    #[error("external call timed out: {0}")]
    Timeout(String),

    #[error("request cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
