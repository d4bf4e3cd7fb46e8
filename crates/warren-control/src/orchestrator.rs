// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Instance lifecycle orchestration.
//!
//! Drives the state machine
//!
//! ```text
//! provisioning ──► running ◄──► stopped
//!                     │            │
//!                     └─► destroyed ◄┘
//! ```
//!
//! across three independently-failing systems (store, compute backend,
//! mesh provider) without distributed transactions. Every multi-step
//! sequence pairs its forward steps with explicit, best-effort reverse
//! steps inline, triggered on failure; cleanup failures are logged and
//! discarded so the primary error is always what the caller sees.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{BackendError, BackendRegistry, ComputeBackend, CreateOptions, ResourceState};
use crate::error::{Error, Result};
use crate::netprovision::{NetworkProvisioner, PreparedNetwork};
use crate::store::{
    ACTIVE_STATUSES, Instance, InstanceStatus, InstanceStore, NetworkRecord, NewInstance,
};

impl From<ResourceState> for InstanceStatus {
    fn from(state: ResourceState) -> Self {
        match state {
            ResourceState::Provisioning => InstanceStatus::Provisioning,
            ResourceState::Running => InstanceStatus::Running,
            ResourceState::Stopped => InstanceStatus::Stopped,
        }
    }
}

/// Bound on each compensating cleanup step.
const ROLLBACK_TIMEOUT: Duration = Duration::from_secs(30);

/// The lifecycle state machine over store, backends, and mesh.
///
/// Operations may run concurrently for different users; per-user they
/// are serialized by the duplicate guard in [`create`](Self::create)
/// and by the fail-fast status checks in pause/wake/destroy, which
/// bound a lost race to a single rejected request.
pub struct InstanceOrchestrator {
    store: Arc<dyn InstanceStore>,
    backends: Arc<BackendRegistry>,
    default_backend: String,
    network: Option<Arc<NetworkProvisioner>>,
}

fn generate_shared_secret() -> String {
    format!(
        "{}{}",
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    )
}

impl InstanceOrchestrator {
    /// Create an orchestrator.
    ///
    /// `network` is `None` when the deployment runs without the mesh;
    /// instances are then created without an enrollment secret and
    /// carry no network record.
    pub fn new(
        store: Arc<dyn InstanceStore>,
        backends: Arc<BackendRegistry>,
        default_backend: impl Into<String>,
        network: Option<Arc<NetworkProvisioner>>,
    ) -> Self {
        Self {
            store,
            backends,
            default_backend: default_backend.into(),
            network,
        }
    }

    fn backend(&self, name: &str) -> Result<Arc<dyn ComputeBackend>> {
        self.backends
            .get(name)
            .ok_or_else(|| Error::BackendNotConfigured(name.to_string()))
    }

    /// Provision a new instance for the user.
    ///
    /// Sequence: duplicate guard, network phase 1, backend create,
    /// network phase 2, persist. Each later step failing unwinds the
    /// earlier ones best-effort before the original error is returned.
    pub async fn create(&self, user_id: Uuid) -> Result<Instance> {
        // Duplicate guard. A concurrent create can slip past this read;
        // the backend's own AlreadyExists rejection is the final guard.
        if self.store.exists_for_user(user_id, &ACTIVE_STATUSES).await? {
            return Err(Error::AlreadyExists(format!(
                "user {user_id} already has an active instance"
            )));
        }

        let backend = self.backend(&self.default_backend)?;
        let shared_secret = generate_shared_secret();

        let prepared = match &self.network {
            Some(provisioner) => Some(provisioner.prepare(user_id).await?),
            None => None,
        };

        let options = CreateOptions {
            user_id,
            shared_secret: shared_secret.clone(),
            enrollment_secret: prepared.as_ref().map(|p| p.enrollment_secret.clone()),
            env: HashMap::new(),
        };

        let descriptor = match backend.create(&options).await {
            Ok(descriptor) => descriptor,
            Err(e) => {
                self.rollback_prepared(prepared.as_ref()).await;
                return Err(e.into());
            }
        };
        info!(
            user_id = %user_id,
            backend = backend.name(),
            resource_id = %descriptor.resource_id,
            "backend resource created"
        );

        let record = match (&self.network, &prepared) {
            (Some(provisioner), Some(prepared)) => {
                match provisioner.finalize(user_id, prepared).await {
                    Ok(record) => Some(record),
                    Err(e) => {
                        // The backend resource must never outlive its
                        // network registration when networking is on.
                        self.rollback_resource(&backend, &descriptor.resource_id)
                            .await;
                        self.rollback_prepared(Some(prepared)).await;
                        return Err(e.into());
                    }
                }
            }
            _ => None,
        };

        let new = NewInstance {
            user_id,
            backend: backend.name().to_string(),
            resource_id: descriptor.resource_id.clone(),
            host: descriptor.host,
            volume_id: descriptor.volume_id,
            shared_secret,
            network: record.clone(),
            status: InstanceStatus::Running,
        };
        match self.store.insert(new).await {
            Ok(instance) => {
                info!(
                    instance_id = %instance.id,
                    user_id = %user_id,
                    "instance created"
                );
                Ok(instance)
            }
            Err(e) => {
                self.rollback_resource(&backend, &descriptor.resource_id)
                    .await;
                if let Some(record) = record {
                    self.rollback_network(record).await;
                }
                Err(e.into())
            }
        }
    }

    /// Fetch an instance, reconciling the stored status against the
    /// backend's view.
    ///
    /// The backend authoritatively owns liveness once a resource exists;
    /// the store is a cache of it. Disagreements are resolved in the
    /// backend's favor and persisted; a backend that no longer knows
    /// the resource marks the instance destroyed. Transport failures
    /// leave the stored view untouched - reconciliation is
    /// opportunistic, not required.
    pub async fn get(&self, id: Uuid) -> Result<Instance> {
        let mut instance = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("instance {id}")))?;
        if instance.status == InstanceStatus::Destroyed {
            return Ok(instance);
        }

        let backend = self.backend(&instance.backend)?;
        match backend.status(&instance.resource_id).await {
            Ok(descriptor) => {
                let observed = InstanceStatus::from(descriptor.state);
                if observed != instance.status {
                    info!(
                        instance_id = %id,
                        stored = %instance.status,
                        observed = %observed,
                        "reconciling stored status with backend"
                    );
                    self.store.update_status(id, observed).await?;
                    instance.status = observed;
                }
            }
            Err(BackendError::NotFound(_)) => {
                warn!(
                    instance_id = %id,
                    resource_id = %instance.resource_id,
                    "backend no longer knows the resource, marking destroyed"
                );
                self.store
                    .update_status(id, InstanceStatus::Destroyed)
                    .await?;
                instance.status = InstanceStatus::Destroyed;
            }
            Err(e) => {
                debug!(instance_id = %id, error = %e, "status probe failed, returning stored view");
            }
        }
        Ok(instance)
    }

    /// Destroy an instance: mesh teardown, backend destroy, persist.
    ///
    /// A mesh teardown failure aborts the destroy with the instance
    /// still non-destroyed, so the caller can retry and teardown can
    /// finish the remaining deletions. Backend "not found" counts as
    /// success - the compute is gone either way. The row is kept with
    /// status `destroyed` for audit.
    pub async fn destroy(&self, id: Uuid) -> Result<()> {
        let instance = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("instance {id}")))?;
        if instance.status == InstanceStatus::Destroyed {
            return Err(Error::InvalidState(format!(
                "instance {id} is already destroyed"
            )));
        }
        let backend = self.backend(&instance.backend)?;

        if let Some(record) = &instance.network {
            match &self.network {
                Some(provisioner) => {
                    provisioner.teardown(record).await?;
                    self.store.update_network_record(id, None).await?;
                }
                None => {
                    warn!(
                        instance_id = %id,
                        "instance carries a network record but networking is disabled, skipping teardown"
                    );
                }
            }
        }

        match backend.destroy(&instance.resource_id).await {
            Ok(()) => {}
            Err(BackendError::NotFound(_)) => {
                debug!(
                    instance_id = %id,
                    resource_id = %instance.resource_id,
                    "backend resource already gone"
                );
            }
            Err(e) => return Err(e.into()),
        }

        self.store
            .update_status(id, InstanceStatus::Destroyed)
            .await?;
        info!(instance_id = %id, "instance destroyed");
        Ok(())
    }

    /// Pause a running instance.
    ///
    /// The backend call runs first; if it fails the stored status stays
    /// untouched, so a failed pause never strands the row in `stopped`.
    pub async fn pause(&self, id: Uuid) -> Result<()> {
        let instance = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("instance {id}")))?;
        if instance.status != InstanceStatus::Running {
            return Err(Error::InvalidState(format!(
                "cannot pause instance in status {}",
                instance.status
            )));
        }
        let backend = self.backend(&instance.backend)?;
        backend.pause(&instance.resource_id).await?;
        self.store
            .update_status(id, InstanceStatus::Stopped)
            .await?;
        info!(instance_id = %id, "instance paused");
        Ok(())
    }

    /// Wake a stopped instance.
    pub async fn wake(&self, id: Uuid) -> Result<()> {
        let instance = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("instance {id}")))?;
        if instance.status != InstanceStatus::Stopped {
            return Err(Error::InvalidState(format!(
                "cannot wake instance in status {}",
                instance.status
            )));
        }
        let backend = self.backend(&instance.backend)?;
        backend.wake(&instance.resource_id).await?;
        self.store
            .update_status(id, InstanceStatus::Running)
            .await?;
        info!(instance_id = %id, "instance woken");
        Ok(())
    }

    /// Best-effort destroy of a freshly-created backend resource.
    ///
    /// Runs on its own task with its own deadline so a cancelled create
    /// still unwinds the resource; awaited here so the error path is
    /// deterministic for callers that are not cancelled.
    async fn rollback_resource(&self, backend: &Arc<dyn ComputeBackend>, resource_id: &str) {
        let backend = backend.clone();
        let resource_id = resource_id.to_string();
        let task = tokio::spawn(async move {
            match tokio::time::timeout(ROLLBACK_TIMEOUT, backend.destroy(&resource_id)).await {
                Ok(Ok(())) | Ok(Err(BackendError::NotFound(_))) => {
                    info!(resource_id = %resource_id, "rolled back backend resource");
                }
                Ok(Err(e)) => {
                    warn!(
                        resource_id = %resource_id,
                        error = %e,
                        "backend resource rollback failed"
                    );
                }
                Err(_) => {
                    warn!(
                        resource_id = %resource_id,
                        "backend resource rollback timed out"
                    );
                }
            }
        });
        let _ = task.await;
    }

    /// Best-effort teardown of phase-1 network resources.
    async fn rollback_prepared(&self, prepared: Option<&PreparedNetwork>) {
        if let Some(prepared) = prepared {
            self.rollback_network(NetworkRecord::from(prepared)).await;
        }
    }

    /// Best-effort teardown of a network record, on its own task like
    /// [`rollback_resource`](Self::rollback_resource).
    async fn rollback_network(&self, record: NetworkRecord) {
        let Some(provisioner) = self.network.clone() else {
            return;
        };
        let task = tokio::spawn(async move {
            match tokio::time::timeout(ROLLBACK_TIMEOUT, provisioner.teardown(&record)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(
                        group_id = ?record.group_id,
                        error = %e,
                        "network rollback failed"
                    );
                }
                Err(_) => {
                    warn!(group_id = ?record.group_id, "network rollback timed out");
                }
            }
        });
        let _ = task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_state_maps_to_status() {
        assert_eq!(
            InstanceStatus::from(ResourceState::Provisioning),
            InstanceStatus::Provisioning
        );
        assert_eq!(
            InstanceStatus::from(ResourceState::Running),
            InstanceStatus::Running
        );
        assert_eq!(
            InstanceStatus::from(ResourceState::Stopped),
            InstanceStatus::Stopped
        );
    }

    #[test]
    fn test_shared_secret_shape() {
        let secret = generate_shared_secret();
        assert_eq!(secret.len(), 64);
        assert!(secret.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(secret, generate_shared_secret());
    }
}
