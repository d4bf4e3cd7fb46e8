// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background worker for sweeping expired enrollment keys.
//!
//! Enrollment keys are single-use and short-lived; most are consumed
//! within seconds of creation. Keys from aborted creates or backends
//! that never booted stay behind as invalid-but-unrevoked entries at
//! the provider. This worker revokes them on a slow cadence,
//! independent of any instance lifecycle.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{error, info};

use crate::netprovision::NetworkProvisioner;

/// Configuration for the key cleanup worker.
#[derive(Debug, Clone)]
pub struct KeyCleanupConfig {
    /// How often to sweep the provider's key list.
    pub poll_interval: Duration,
}

impl Default for KeyCleanupConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3600), // 1 hour
        }
    }
}

/// Background worker that revokes expired enrollment keys.
pub struct KeyCleanupWorker {
    provisioner: Arc<NetworkProvisioner>,
    config: KeyCleanupConfig,
    shutdown: Arc<Notify>,
}

impl KeyCleanupWorker {
    /// Create a new key cleanup worker.
    pub fn new(provisioner: Arc<NetworkProvisioner>, config: KeyCleanupConfig) -> Self {
        Self {
            provisioner,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run the cleanup loop.
    ///
    /// The loop exits when the shutdown signal is received.
    pub async fn run(&self) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            "Key cleanup worker started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Key cleanup worker received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.config.poll_interval) => {
                    if let Err(e) = self.provisioner.cleanup_expired_keys().await {
                        error!(error = %e, "Failed to sweep enrollment keys");
                    }
                }
            }
        }

        info!("Key cleanup worker stopped");
    }
}
