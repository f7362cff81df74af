//! Collaborator-level error type.

use thiserror::Error;

/// Errors returned by an external collaborator.
///
/// The engine never lets these abort a committed transition:
/// - `Unavailable`: the collaborator could not be reached.
/// - `Rejected`: the collaborator refused the request.
#[derive(Debug, Error, Clone)]
pub enum ServiceError {
    /// Transient failure talking to the collaborator.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The collaborator answered but refused the request.
    #[error("service rejected request: {0}")]
    Rejected(String),
}
