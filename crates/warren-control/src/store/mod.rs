// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence interface and backends for instance records.
//!
//! The store is the durable record of every instance the control plane
//! has provisioned. It is a cache of backend-observed reality: once a
//! resource exists, the backend owns liveness, and reconciliation writes
//! the backend's view back here. Rows are never deleted - destroyed
//! instances are retained for audit.

pub mod memory;
pub mod postgres;

pub use self::memory::MemoryStore;
pub use self::postgres::PostgresStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Lifecycle status of an instance.
///
/// Transitions run `provisioning → running ↔ stopped → destroyed`;
/// `destroyed` is terminal and `provisioning` is never re-entered.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "instance_status", rename_all = "lowercase")]
pub enum InstanceStatus {
    /// The backend resource is still coming up.
    Provisioning,
    /// The backend resource is live.
    Running,
    /// The backend resource is paused; the data volume persists.
    Stopped,
    /// The backend resource is gone. Terminal.
    Destroyed,
}

impl InstanceStatus {
    /// Lowercase wire/database form.
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Provisioning => "provisioning",
            InstanceStatus::Running => "running",
            InstanceStatus::Stopped => "stopped",
            InstanceStatus::Destroyed => "destroyed",
        }
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statuses that count against the one-instance-per-user limit.
pub const ACTIVE_STATUSES: [InstanceStatus; 3] = [
    InstanceStatus::Provisioning,
    InstanceStatus::Running,
    InstanceStatus::Stopped,
];

/// Persisted network-provisioning record.
///
/// Written by the provisioning sequencer when phase 2 completes and read
/// back by it for teardown. No other component interprets the fields.
/// Every field is optional so a partially-torn-down record can be
/// retried without erroring on the already-absent pieces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkRecord {
    /// Peer isolation group id.
    pub group_id: Option<String>,
    /// Enrollment key id.
    pub key_id: Option<String>,
    /// Route id.
    pub route_id: Option<String>,
    /// Access policy id.
    pub policy_id: Option<String>,
}

/// Instance record.
#[derive(Debug, Clone)]
pub struct Instance {
    /// Store-assigned id.
    pub id: Uuid,
    /// Owning user.
    pub user_id: Uuid,
    /// Name of the backend that provisioned the resource.
    pub backend: String,
    /// Backend-assigned resource id. Immutable once set.
    pub resource_id: String,
    /// Network address or hostname of the resource.
    pub host: Option<String>,
    /// Current lifecycle status.
    pub status: InstanceStatus,
    /// Attached storage volume id, if the backend reports one.
    pub volume_id: Option<String>,
    /// Opaque per-instance secret handed to downstream collaborators.
    pub shared_secret: String,
    /// Network-provisioning record, owned by the sequencer.
    pub network: Option<NetworkRecord>,
    /// When activity was last observed on the instance.
    pub last_active_at: Option<DateTime<Utc>>,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
    /// When the row was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Fields for inserting a new instance row.
#[derive(Debug, Clone)]
pub struct NewInstance {
    /// Owning user.
    pub user_id: Uuid,
    /// Name of the backend that provisioned the resource.
    pub backend: String,
    /// Backend-assigned resource id.
    pub resource_id: String,
    /// Network address or hostname of the resource.
    pub host: Option<String>,
    /// Attached storage volume id.
    pub volume_id: Option<String>,
    /// Opaque per-instance secret.
    pub shared_secret: String,
    /// Network-provisioning record.
    pub network: Option<NetworkRecord>,
    /// Initial status.
    pub status: InstanceStatus,
}

/// Store errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Network record (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The targeted row does not exist.
    #[error("Instance row not found")]
    NotFound,

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Persistence interface for instance rows.
///
/// Updates target individual field subsets so callers never rewrite a
/// whole row; `resource_id` in particular has no update method because
/// it is immutable once set.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Insert a new instance row and return it with store-assigned fields.
    async fn insert(&self, new: NewInstance) -> Result<Instance, StoreError>;

    /// Fetch an instance by id.
    async fn get(&self, id: Uuid) -> Result<Option<Instance>, StoreError>;

    /// Fetch an instance by backend name and backend resource id.
    async fn get_by_resource(
        &self,
        backend: &str,
        resource_id: &str,
    ) -> Result<Option<Instance>, StoreError>;

    /// Fetch the user's instance whose status is in `statuses`, if any.
    async fn find_for_user(
        &self,
        user_id: Uuid,
        statuses: &[InstanceStatus],
    ) -> Result<Option<Instance>, StoreError>;

    /// True if the user has an instance whose status is in `statuses`.
    async fn exists_for_user(
        &self,
        user_id: Uuid,
        statuses: &[InstanceStatus],
    ) -> Result<bool, StoreError>;

    /// List all instances with the given status.
    async fn list_by_status(&self, status: InstanceStatus) -> Result<Vec<Instance>, StoreError>;

    /// Update the lifecycle status.
    async fn update_status(&self, id: Uuid, status: InstanceStatus) -> Result<(), StoreError>;

    /// Update the last-observed-activity timestamp.
    async fn update_last_active(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Replace (or clear) the network-provisioning record.
    async fn update_network_record(
        &self,
        id: Uuid,
        record: Option<&NetworkRecord>,
    ) -> Result<(), StoreError>;
}
