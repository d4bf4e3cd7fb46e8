// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background worker for reclaiming idle instances.
//!
//! There is no centralized heartbeat protocol: each tick the worker
//! polls every running instance's backend for a cheap activity probe.
//! Detected activity advances the instance's last-activity timestamp
//! and feeds the usage-accounting callback; detected idleness past the
//! configured threshold pauses the instance through the orchestrator.
//!
//! Health is tracked but deliberately decoupled from reclamation:
//! consecutive unhealthy probes only ever produce a warning, never a
//! pause. An unhealthy instance may still be in active use.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backend::BackendRegistry;
use crate::orchestrator::InstanceOrchestrator;
use crate::store::{Instance, InstanceStatus, InstanceStore};

/// Consecutive unhealthy probes before a warning is emitted.
const UNHEALTHY_WARN_THRESHOLD: u32 = 3;

/// Callback invoked once per tick per detected-active instance.
pub type ActivityCallback = Arc<dyn Fn(&Instance) + Send + Sync>;

/// Configuration for the idle reclamation worker.
#[derive(Debug, Clone)]
pub struct IdleReclaimerConfig {
    /// How often to sweep running instances.
    pub poll_interval: Duration,
    /// Inactivity duration after which a running instance is paused.
    pub idle_threshold: Duration,
    /// Per-instance bound on the activity probe, so one unresponsive
    /// backend call skips that instance instead of stalling the sweep.
    pub probe_timeout: Duration,
}

impl Default for IdleReclaimerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            idle_threshold: Duration::from_secs(2 * 3600),
            probe_timeout: Duration::from_secs(5),
        }
    }
}

/// Background worker that pauses instances idle past the threshold.
pub struct IdleReclaimer {
    store: Arc<dyn InstanceStore>,
    backends: Arc<BackendRegistry>,
    orchestrator: Arc<InstanceOrchestrator>,
    config: IdleReclaimerConfig,
    on_active: Option<ActivityCallback>,
    /// Transient consecutive-unhealthy counters, keyed by instance id.
    /// Lost on restart by design.
    unhealthy: Mutex<HashMap<Uuid, u32>>,
    shutdown: Arc<Notify>,
}

impl IdleReclaimer {
    /// Create a new idle reclamation worker.
    pub fn new(
        store: Arc<dyn InstanceStore>,
        backends: Arc<BackendRegistry>,
        orchestrator: Arc<InstanceOrchestrator>,
        config: IdleReclaimerConfig,
    ) -> Self {
        Self {
            store,
            backends,
            orchestrator,
            config,
            on_active: None,
            unhealthy: Mutex::new(HashMap::new()),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Register the usage-accounting callback.
    pub fn with_activity_callback(mut self, callback: ActivityCallback) -> Self {
        self.on_active = Some(callback);
        self
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run the reclamation loop.
    ///
    /// The loop exits when the shutdown signal is received. Failures
    /// never escape - this worker has no caller to surface them to, so
    /// everything becomes a log line and a skip until the next tick.
    pub async fn run(&self) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            idle_threshold_secs = self.config.idle_threshold.as_secs(),
            "Idle reclaimer started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Idle reclaimer received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.config.poll_interval) => {
                    self.run_once().await;
                }
            }
        }

        info!("Idle reclaimer stopped");
    }

    /// Process a single reclamation sweep.
    ///
    /// Public so embedders can drive ticks themselves.
    pub async fn run_once(&self) {
        let running = match self.store.list_by_status(InstanceStatus::Running).await {
            Ok(instances) => instances,
            Err(e) => {
                error!(error = %e, "Failed to list running instances");
                return;
            }
        };
        if running.is_empty() {
            debug!("No running instances to probe");
            return;
        }

        let Ok(idle_threshold) = chrono::Duration::from_std(self.config.idle_threshold) else {
            error!("Idle threshold out of range");
            return;
        };

        let mut seen = HashSet::with_capacity(running.len());
        for instance in &running {
            seen.insert(instance.id);
            self.probe_instance(instance, idle_threshold).await;
        }

        // Counters for instances that are no longer running are dead
        // weight; prune to the current sweep.
        self.unhealthy.lock().await.retain(|id, _| seen.contains(id));
    }

    async fn probe_instance(&self, instance: &Instance, idle_threshold: chrono::Duration) {
        let Some(backend) = self.backends.get(&instance.backend) else {
            warn!(
                instance_id = %instance.id,
                backend = %instance.backend,
                "No backend registered for instance, skipping"
            );
            return;
        };

        let probe = match tokio::time::timeout(
            self.config.probe_timeout,
            backend.activity(&instance.resource_id),
        )
        .await
        {
            Ok(Ok(info)) => info,
            Ok(Err(e)) => {
                warn!(
                    instance_id = %instance.id,
                    error = %e,
                    "Activity probe failed, skipping this tick"
                );
                return;
            }
            Err(_) => {
                warn!(
                    instance_id = %instance.id,
                    timeout_secs = self.config.probe_timeout.as_secs(),
                    "Activity probe timed out, skipping this tick"
                );
                return;
            }
        };

        // Health bookkeeping, independent of the pause decision below.
        if probe.healthy {
            self.unhealthy.lock().await.remove(&instance.id);
        } else {
            let mut counters = self.unhealthy.lock().await;
            let count = counters.entry(instance.id).or_insert(0);
            *count += 1;
            if *count >= UNHEALTHY_WARN_THRESHOLD {
                warn!(
                    instance_id = %instance.id,
                    consecutive = *count,
                    "Instance unhealthy"
                );
            }
        }

        if probe.active {
            let now = Utc::now();
            if let Err(e) = self.store.update_last_active(instance.id, now).await {
                warn!(
                    instance_id = %instance.id,
                    error = %e,
                    "Failed to record activity"
                );
                return;
            }
            debug!(
                instance_id = %instance.id,
                signal = probe.signal,
                "Activity observed"
            );
            if let Some(callback) = &self.on_active {
                callback(instance);
            }
            return;
        }

        let idle_since = instance.last_active_at.unwrap_or(instance.created_at);
        let idle_for = Utc::now().signed_duration_since(idle_since);
        if idle_for < idle_threshold {
            return;
        }

        info!(
            instance_id = %instance.id,
            idle_minutes = idle_for.num_minutes(),
            "Pausing idle instance"
        );
        match self.orchestrator.pause(instance.id).await {
            Ok(()) => {
                self.unhealthy.lock().await.remove(&instance.id);
            }
            Err(e) => {
                warn!(
                    instance_id = %instance.id,
                    error = %e,
                    "Failed to pause idle instance"
                );
            }
        }
    }
}
