// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for warren-control.
//!
//! This module provides [`ControlRuntime`] which wires the orchestrator
//! and background workers into an existing tokio application. All
//! configuration is builder parameters - the control plane does no
//! environment or CLI parsing of its own.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use warren_control::runtime::ControlRuntime;
//! use warren_control::store::PostgresStore;
//! use warren_mesh::HttpMeshClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pool = sqlx::PgPool::connect("postgres://...").await?;
//!     warren_control::migrations::run(&pool).await?;
//!
//!     let runtime = ControlRuntime::builder()
//!         .store(Arc::new(PostgresStore::new(pool)))
//!         .register_backend(Arc::new(docker_backend))
//!         .mesh(Arc::new(HttpMeshClient::new("https://mesh.example.com", token)?))
//!         .networking_enabled(true)
//!         .idle_threshold(std::time::Duration::from_secs(2 * 3600))
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     let orchestrator = runtime.orchestrator();
//!     // ... hand the orchestrator to the request layer ...
//!
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use warren_mesh::MeshApi;

use crate::backend::{BackendRegistry, ComputeBackend};
use crate::idle_reclaimer::{ActivityCallback, IdleReclaimer, IdleReclaimerConfig};
use crate::key_cleanup_worker::{KeyCleanupConfig, KeyCleanupWorker};
use crate::netprovision::NetworkProvisioner;
use crate::orchestrator::InstanceOrchestrator;
use crate::store::InstanceStore;

/// Builder for creating a [`ControlRuntime`].
pub struct ControlRuntimeBuilder {
    store: Option<Arc<dyn InstanceStore>>,
    backends: BackendRegistry,
    first_backend: Option<&'static str>,
    default_backend: Option<String>,
    mesh: Option<Arc<dyn MeshApi>>,
    networking_enabled: bool,
    reclaimer_config: IdleReclaimerConfig,
    key_cleanup_config: KeyCleanupConfig,
    on_active: Option<ActivityCallback>,
}

impl Default for ControlRuntimeBuilder {
    fn default() -> Self {
        Self {
            store: None,
            backends: BackendRegistry::new(),
            first_backend: None,
            default_backend: None,
            mesh: None,
            networking_enabled: false,
            reclaimer_config: IdleReclaimerConfig::default(),
            key_cleanup_config: KeyCleanupConfig::default(),
            on_active: None,
        }
    }
}

impl ControlRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the instance store (required).
    pub fn store(mut self, store: Arc<dyn InstanceStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Register a compute backend (at least one required).
    ///
    /// The first registered backend is the default for new instances
    /// unless [`default_backend`](Self::default_backend) overrides it.
    pub fn register_backend(mut self, backend: Arc<dyn ComputeBackend>) -> Self {
        if self.first_backend.is_none() {
            self.first_backend = Some(backend.name());
        }
        self.backends.register(backend);
        self
    }

    /// Select the backend new instances are created on.
    pub fn default_backend(mut self, name: impl Into<String>) -> Self {
        self.default_backend = Some(name.into());
        self
    }

    /// Set the mesh provider client.
    pub fn mesh(mut self, mesh: Arc<dyn MeshApi>) -> Self {
        self.mesh = Some(mesh);
        self
    }

    /// Enable or disable per-instance network provisioning.
    ///
    /// When enabled, [`mesh`](Self::mesh) must be set. Default: disabled.
    pub fn networking_enabled(mut self, enabled: bool) -> Self {
        self.networking_enabled = enabled;
        self
    }

    /// Set the reclamation sweep interval.
    ///
    /// Default: 60 seconds
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.reclaimer_config.poll_interval = interval;
        self
    }

    /// Set the inactivity duration after which a running instance is
    /// paused.
    ///
    /// Default: 2 hours
    pub fn idle_threshold(mut self, threshold: Duration) -> Self {
        self.reclaimer_config.idle_threshold = threshold;
        self
    }

    /// Set the per-instance activity probe timeout.
    ///
    /// Default: 5 seconds
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.reclaimer_config.probe_timeout = timeout;
        self
    }

    /// Set the enrollment key sweep interval.
    ///
    /// Default: 1 hour
    pub fn key_cleanup_interval(mut self, interval: Duration) -> Self {
        self.key_cleanup_config.poll_interval = interval;
        self
    }

    /// Register the usage-accounting callback, invoked once per sweep
    /// per detected-active instance.
    pub fn on_active(mut self, callback: ActivityCallback) -> Self {
        self.on_active = Some(callback);
        self
    }

    /// Validate the configuration and assemble the runtime.
    pub fn build(self) -> Result<ControlRuntime> {
        let Some(store) = self.store else {
            bail!("store is required");
        };
        if self.backends.is_empty() {
            bail!("at least one backend must be registered");
        }
        let default_backend = match self.default_backend {
            Some(name) => {
                if self.backends.get(&name).is_none() {
                    bail!("default backend '{name}' is not registered");
                }
                name
            }
            // Registry is non-empty, so a first backend exists.
            None => self
                .first_backend
                .map(str::to_string)
                .unwrap_or_default(),
        };

        let provisioner = if self.networking_enabled {
            let Some(mesh) = self.mesh else {
                bail!("networking is enabled but no mesh client is set");
            };
            Some(Arc::new(NetworkProvisioner::new(mesh)))
        } else {
            None
        };

        let backends = Arc::new(self.backends);
        let orchestrator = Arc::new(InstanceOrchestrator::new(
            store.clone(),
            backends.clone(),
            default_backend,
            provisioner.clone(),
        ));

        let mut reclaimer = IdleReclaimer::new(
            store,
            backends,
            orchestrator.clone(),
            self.reclaimer_config,
        );
        if let Some(callback) = self.on_active {
            reclaimer = reclaimer.with_activity_callback(callback);
        }

        let key_worker = provisioner
            .map(|p| Arc::new(KeyCleanupWorker::new(p, self.key_cleanup_config)));

        Ok(ControlRuntime {
            orchestrator,
            reclaimer: Arc::new(reclaimer),
            key_worker,
            workers: Vec::new(),
        })
    }
}

/// The assembled control plane: orchestrator plus background workers.
pub struct ControlRuntime {
    orchestrator: Arc<InstanceOrchestrator>,
    reclaimer: Arc<IdleReclaimer>,
    key_worker: Option<Arc<KeyCleanupWorker>>,
    workers: Vec<(Arc<Notify>, JoinHandle<()>)>,
}

impl std::fmt::Debug for ControlRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlRuntime")
            .field("key_worker", &self.key_worker.is_some())
            .field("workers", &self.workers.len())
            .finish()
    }
}

impl ControlRuntime {
    /// Create a new builder.
    pub fn builder() -> ControlRuntimeBuilder {
        ControlRuntimeBuilder::new()
    }

    /// The orchestrator, for the request layer.
    pub fn orchestrator(&self) -> Arc<InstanceOrchestrator> {
        self.orchestrator.clone()
    }

    /// Spawn the background workers.
    pub async fn start(mut self) -> Result<Self> {
        let reclaimer = self.reclaimer.clone();
        let handle = tokio::spawn(async move { reclaimer.run().await });
        self.workers
            .push((self.reclaimer.shutdown_handle(), handle));

        if let Some(worker) = &self.key_worker {
            let worker_task = worker.clone();
            let handle = tokio::spawn(async move { worker_task.run().await });
            self.workers.push((worker.shutdown_handle(), handle));
        }

        info!(workers = self.workers.len(), "Control runtime started");
        Ok(self)
    }

    /// Signal every worker to stop and wait for them to finish.
    pub async fn shutdown(self) -> Result<()> {
        for (notify, _) in &self.workers {
            notify.notify_one();
        }
        for (_, handle) in self.workers {
            if let Err(e) = handle.await {
                warn!(error = %e, "Worker task panicked during shutdown");
            }
        }
        info!("Control runtime stopped");
        Ok(())
    }
}
