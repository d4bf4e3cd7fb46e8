// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The mesh API trait.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    EnrollmentKey, MeshGroup, MeshPolicy, MeshRoute, NewEnrollmentKey, NewPolicy, NewRoute,
};

/// Operations against the mesh provider.
///
/// Each method is a single request/response call with no retry logic of
/// its own. Implementations must map a provider-side "does not exist"
/// response to an error for which [`MeshError::is_not_found`] returns
/// true, so callers can distinguish it without string matching.
///
/// [`MeshError::is_not_found`]: crate::error::MeshError::is_not_found
#[async_trait]
pub trait MeshApi: Send + Sync {
    /// Create a peer isolation group.
    async fn create_group(&self, name: &str) -> Result<MeshGroup>;

    /// List all groups.
    async fn list_groups(&self) -> Result<Vec<MeshGroup>>;

    /// Delete a group by id.
    async fn delete_group(&self, id: &str) -> Result<()>;

    /// Create an enrollment key.
    async fn create_enrollment_key(&self, req: &NewEnrollmentKey) -> Result<EnrollmentKey>;

    /// List all enrollment keys.
    async fn list_enrollment_keys(&self) -> Result<Vec<EnrollmentKey>>;

    /// Revoke an enrollment key by id.
    async fn revoke_enrollment_key(&self, id: &str) -> Result<()>;

    /// Create a network route.
    async fn create_route(&self, req: &NewRoute) -> Result<MeshRoute>;

    /// List all routes.
    async fn list_routes(&self) -> Result<Vec<MeshRoute>>;

    /// Delete a route by id.
    async fn delete_route(&self, id: &str) -> Result<()>;

    /// Create an access policy.
    async fn create_policy(&self, req: &NewPolicy) -> Result<MeshPolicy>;

    /// List all policies.
    async fn list_policies(&self) -> Result<Vec<MeshPolicy>>;

    /// Delete a policy by id.
    async fn delete_policy(&self, id: &str) -> Result<()>;
}
