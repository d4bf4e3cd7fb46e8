// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for warren-control.
//!
//! The orchestrator translates backend errors into this taxonomy only
//! where the kind changes caller behavior (not-found, already-exists,
//! invalid-state); everything else passes through wrapped.

use thiserror::Error;

use crate::backend::BackendError;
use crate::store::StoreError;
use warren_mesh::MeshError;

/// Control plane errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The instance (or backend resource) does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The user already has an active instance.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// The operation is not valid in the instance's current status.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// No backend is registered under the requested name.
    #[error("Backend not configured: {0}")]
    BackendNotConfigured(String),

    /// Backend failure that carries no lifecycle meaning.
    #[error("Backend error: {0}")]
    Backend(BackendError),

    /// Mesh provider failure.
    #[error("Mesh error: {0}")]
    Mesh(#[from] MeshError),

    /// Store failure.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<BackendError> for Error {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NotFound(id) => Error::NotFound(format!("backend resource {id}")),
            BackendError::AlreadyExists(user) => {
                Error::AlreadyExists(format!("backend resource for user {user}"))
            }
            BackendError::InvalidState(msg) => Error::InvalidState(msg),
            other => Error::Backend(other),
        }
    }
}

/// Result type using the control plane [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_translation() {
        assert!(matches!(
            Error::from(BackendError::NotFound("r-1".to_string())),
            Error::NotFound(_)
        ));
        assert!(matches!(
            Error::from(BackendError::AlreadyExists("u-1".to_string())),
            Error::AlreadyExists(_)
        ));
        assert!(matches!(
            Error::from(BackendError::InvalidState("paused".to_string())),
            Error::InvalidState(_)
        ));
        assert!(matches!(
            Error::from(BackendError::Provision("boom".to_string())),
            Error::Backend(_)
        ));
    }
}
