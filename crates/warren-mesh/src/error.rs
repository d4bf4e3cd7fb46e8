// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for mesh API calls.

use thiserror::Error;

/// Errors from mesh provider calls.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MeshError {
    /// Transport-level failure (connection, TLS, timeout).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider rejected the request.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code returned by the provider.
        status: u16,
        /// Error body, verbatim.
        message: String,
    },

    /// Response body could not be decoded.
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl MeshError {
    /// True when the provider reported that the resource does not exist.
    ///
    /// Teardown paths treat this as success so a partially-deleted record
    /// can be retried safely.
    pub fn is_not_found(&self) -> bool {
        matches!(self, MeshError::Api { status: 404, .. })
    }
}

/// Result type for mesh operations.
pub type Result<T> = std::result::Result<T, MeshError>;
