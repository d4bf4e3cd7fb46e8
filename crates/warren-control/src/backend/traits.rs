// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Backend trait definitions.
//!
//! Defines the abstract interface every compute backend must implement.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// Errors from backend operations.
///
/// `NotFound`, `AlreadyExists`, and `InvalidState` are lifecycle kinds
/// the orchestrator reacts to; everything else passes through.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BackendError {
    /// The resource does not exist (any more).
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A live resource already exists for this user.
    #[error("Resource already exists for user: {0}")]
    AlreadyExists(String),

    /// The resource is not in a state that permits the operation.
    #[error("Invalid resource state: {0}")]
    InvalidState(String),

    /// Provisioning failed (image pull, plan apply, quota, ...).
    #[error("Provisioning failed: {0}")]
    Provision(String),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Result type for backend operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Backend-observed state of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    /// Still coming up.
    Provisioning,
    /// Live and reachable.
    Running,
    /// Paused; compute released, data volume kept.
    Stopped,
}

/// Point-in-time description of a backend resource.
#[derive(Debug, Clone)]
pub struct ResourceDescriptor {
    /// Backend-assigned resource id (container id, VM id, ...).
    pub resource_id: String,
    /// Network address or hostname, once known.
    pub host: Option<String>,
    /// Durable data volume attached to the resource.
    pub volume_id: Option<String>,
    /// Observed state.
    pub state: ResourceState,
}

/// Options for creating an environment.
///
/// Carries backend-agnostic extras; a backend may ignore fields it has
/// no use for.
#[derive(Debug, Clone)]
pub struct CreateOptions {
    /// Owning user.
    pub user_id: Uuid,
    /// Per-instance secret baked into the environment for downstream
    /// collaborators.
    pub shared_secret: String,
    /// Mesh enrollment secret for the boot-time network join, when
    /// network provisioning is enabled.
    pub enrollment_secret: Option<String>,
    /// Additional credential material passed into the environment.
    pub env: HashMap<String, String>,
}

/// Result of an activity probe.
///
/// Transient; only its effects (timestamp update, health counter, pause
/// decision) are durable. Activity and health are separate signals - an
/// unhealthy instance may still be active.
#[derive(Debug, Clone, Copy)]
pub struct ActivityInfo {
    /// Whether the environment is currently in use.
    pub active: bool,
    /// Whether the environment looks healthy.
    pub healthy: bool,
    /// Backend-specific signal magnitude (e.g. session or process count).
    pub signal: u64,
}

/// Trait for compute backends.
///
/// Backends are pure provisioning engines - they do NOT touch the
/// instance store. Every method is async and therefore bounded by the
/// caller's deadline or cancellation; the reclamation worker wraps each
/// probe in a timeout, user-facing operations inherit the request's.
#[async_trait]
pub trait ComputeBackend: Send + Sync {
    /// Backend name, used as the registry key and stored on each
    /// instance row.
    fn name(&self) -> &'static str;

    /// Provision a new environment for the user.
    ///
    /// At most one live resource per user: if one already exists this
    /// must fail with [`BackendError::AlreadyExists`], never silently
    /// return the existing resource.
    async fn create(&self, opts: &CreateOptions) -> Result<ResourceDescriptor>;

    /// Remove the compute resource, preserving its durable data volume.
    ///
    /// Fails with [`BackendError::NotFound`] if the resource is already
    /// gone; callers treat that as success.
    async fn destroy(&self, resource_id: &str) -> Result<()>;

    /// Point-in-time read of the backend-observed state.
    async fn status(&self, resource_id: &str) -> Result<ResourceDescriptor>;

    /// Pause a running resource. Fails with
    /// [`BackendError::InvalidState`] unless it is running.
    async fn pause(&self, resource_id: &str) -> Result<()>;

    /// Wake a stopped resource. Fails with
    /// [`BackendError::InvalidState`] unless it is stopped.
    async fn wake(&self, resource_id: &str) -> Result<()>;

    /// Cheap liveness/health probe. Must not block longer than a few
    /// seconds.
    async fn activity(&self, resource_id: &str) -> Result<ActivityInfo>;
}
