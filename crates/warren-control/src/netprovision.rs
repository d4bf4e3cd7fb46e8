// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Two-phase network provisioning for instances.
//!
//! The mesh setup for an instance cannot happen in one shot: the
//! enrollment secret must exist *before* the compute resource boots (it
//! is baked into the bootstrap configuration), while the route and the
//! access policy can only be created *after* the resource has a known
//! address. Hence two phases:
//!
//! 1. [`prepare`](NetworkProvisioner::prepare): isolation group +
//!    single-use enrollment key. Rolls the group back if the key cannot
//!    be created.
//! 2. [`finalize`](NetworkProvisioner::finalize): per-user subnet route +
//!    self-allow policy. Rolls the route back if the policy cannot be
//!    created.
//!
//! [`teardown`](NetworkProvisioner::teardown) deletes in reverse order
//! and tolerates partially-deleted records, so a failed teardown can be
//! retried as a whole.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;
use warren_mesh::{MeshApi, MeshError, NewEnrollmentKey, NewPolicy, NewRoute};

use crate::store::NetworkRecord;

/// Lifetime of an enrollment key. Long enough for the slowest backend
/// to boot and join, short enough that a leaked key is useless soon.
const ENROLLMENT_KEY_TTL_SECS: u64 = 900;

/// Result of phase 1. Never persisted - the enrollment secret exists
/// only in memory between the two phases.
#[derive(Debug, Clone)]
pub struct PreparedNetwork {
    /// Isolation group id.
    pub group_id: String,
    /// Enrollment key id.
    pub key_id: String,
    /// One-time secret handed to the backend's bootstrap configuration.
    pub enrollment_secret: String,
}

impl From<&PreparedNetwork> for NetworkRecord {
    /// Partial record covering only phase-1 resources, for rollback
    /// before phase 2 ran.
    fn from(prepared: &PreparedNetwork) -> Self {
        NetworkRecord {
            group_id: Some(prepared.group_id.clone()),
            key_id: Some(prepared.key_id.clone()),
            route_id: None,
            policy_id: None,
        }
    }
}

/// Runs the two-phase network setup and its rollback chains.
pub struct NetworkProvisioner {
    mesh: Arc<dyn MeshApi>,
}

impl NetworkProvisioner {
    /// Create a provisioner over a mesh client.
    pub fn new(mesh: Arc<dyn MeshApi>) -> Self {
        Self { mesh }
    }

    /// Deterministic per-user /24 inside 100.64.0.0/10.
    ///
    /// Hashing the user id gives 14 bits of subnet space without any
    /// allocation state to persist or coordinate.
    pub fn user_subnet(user_id: Uuid) -> String {
        let digest = Sha256::digest(user_id.as_bytes());
        format!("100.{}.{}.0/24", 64 + (digest[0] & 0x3f), digest[1])
    }

    /// Phase 1: create the isolation group and a single-use enrollment
    /// key assigned to it.
    ///
    /// If key creation fails the group is deleted again - a group
    /// without a key can never be joined and would leak forever.
    pub async fn prepare(&self, user_id: Uuid) -> Result<PreparedNetwork, MeshError> {
        let group = self
            .mesh
            .create_group(&format!("user-{}", user_id.simple()))
            .await?;
        debug!(user_id = %user_id, group_id = %group.id, "created isolation group");

        let key = match self
            .mesh
            .create_enrollment_key(&NewEnrollmentKey {
                name: format!("enroll-{}", user_id.simple()),
                usage_limit: 1,
                expires_in: ENROLLMENT_KEY_TTL_SECS,
                ephemeral: true,
                auto_groups: vec![group.id.clone()],
            })
            .await
        {
            Ok(key) => key,
            Err(e) => {
                warn!(
                    user_id = %user_id,
                    group_id = %group.id,
                    error = %e,
                    "enrollment key creation failed, rolling back group"
                );
                if let Err(rollback) = self.mesh.delete_group(&group.id).await {
                    warn!(
                        group_id = %group.id,
                        error = %rollback,
                        "group rollback failed"
                    );
                }
                return Err(e);
            }
        };

        info!(
            user_id = %user_id,
            group_id = %group.id,
            key_id = %key.id,
            "network prepared"
        );
        Ok(PreparedNetwork {
            group_id: group.id,
            key_id: key.id,
            enrollment_secret: key.key,
        })
    }

    /// Phase 2: route the user's subnet to the group and allow traffic
    /// within it.
    ///
    /// If policy creation fails the route is deleted again - a route
    /// without a policy carries no reachable traffic and would leak.
    pub async fn finalize(
        &self,
        user_id: Uuid,
        prepared: &PreparedNetwork,
    ) -> Result<NetworkRecord, MeshError> {
        let subnet = Self::user_subnet(user_id);
        let route = self
            .mesh
            .create_route(&NewRoute {
                network: subnet.clone(),
                groups: vec![prepared.group_id.clone()],
                description: Some(format!("instance subnet for user {user_id}")),
            })
            .await?;
        debug!(user_id = %user_id, route_id = %route.id, subnet = %subnet, "created route");

        let policy = match self
            .mesh
            .create_policy(&NewPolicy {
                name: format!("allow-user-{}", user_id.simple()),
                sources: vec![prepared.group_id.clone()],
                destinations: vec![prepared.group_id.clone()],
                bidirectional: true,
            })
            .await
        {
            Ok(policy) => policy,
            Err(e) => {
                warn!(
                    user_id = %user_id,
                    route_id = %route.id,
                    error = %e,
                    "policy creation failed, rolling back route"
                );
                if let Err(rollback) = self.mesh.delete_route(&route.id).await {
                    warn!(
                        route_id = %route.id,
                        error = %rollback,
                        "route rollback failed"
                    );
                }
                return Err(e);
            }
        };

        info!(
            user_id = %user_id,
            route_id = %route.id,
            policy_id = %policy.id,
            "network finalized"
        );
        Ok(NetworkRecord {
            group_id: Some(prepared.group_id.clone()),
            key_id: Some(prepared.key_id.clone()),
            route_id: Some(route.id),
            policy_id: Some(policy.id),
        })
    }

    /// Delete everything a record points at: policy, then route, then
    /// group.
    ///
    /// Each deletion is attempted regardless of earlier failures and
    /// "already gone" counts as success, so retrying a partially
    /// torn-down record converges. The first real error is returned.
    pub async fn teardown(&self, record: &NetworkRecord) -> Result<(), MeshError> {
        let mut first_error: Option<MeshError> = None;

        if let Some(policy_id) = &record.policy_id {
            if let Err(e) = self.mesh.delete_policy(policy_id).await {
                if !e.is_not_found() {
                    warn!(policy_id = %policy_id, error = %e, "policy deletion failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(route_id) = &record.route_id {
            if let Err(e) = self.mesh.delete_route(route_id).await {
                if !e.is_not_found() {
                    warn!(route_id = %route_id, error = %e, "route deletion failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(group_id) = &record.group_id {
            if let Err(e) = self.mesh.delete_group(group_id).await {
                if !e.is_not_found() {
                    warn!(group_id = %group_id, error = %e, "group deletion failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    /// Revoke enrollment keys the provider reports as no longer valid.
    ///
    /// Runs independently of any instance lifecycle; keys are single-use
    /// and short-lived, so anything invalid and unrevoked is garbage.
    pub async fn cleanup_expired_keys(&self) -> Result<(), MeshError> {
        let keys = self.mesh.list_enrollment_keys().await?;
        let mut revoked = 0usize;
        for key in keys {
            if key.valid || key.revoked {
                continue;
            }
            match self.mesh.revoke_enrollment_key(&key.id).await {
                Ok(()) => revoked += 1,
                Err(e) => {
                    warn!(key_id = %key.id, error = %e, "key revocation failed, continuing");
                }
            }
        }
        if revoked > 0 {
            info!(revoked = revoked, "revoked expired enrollment keys");
        }
        Ok(())
    }
}
