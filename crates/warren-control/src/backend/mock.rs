// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock backend for testing.
//!
//! A simple backend implementation that keeps resources in memory
//! without touching containers or cloud infrastructure. Activity probe
//! results are scripted per resource so scheduler behavior can be
//! driven deterministically.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::traits::*;

#[derive(Debug, Clone)]
struct MockResource {
    user_id: Uuid,
    state: ResourceState,
    activity: ActivityInfo,
    host: String,
    volume_id: String,
}

/// Mock backend for testing.
#[derive(Default)]
pub struct MockBackend {
    resources: Mutex<HashMap<String, MockResource>>,
    /// If true, `create` fails with a provisioning error.
    pub fail_create: bool,
    /// If true, `activity` fails for every resource.
    pub fail_activity: bool,
    destroy_calls: AtomicU64,
}

impl MockBackend {
    /// Create a new mock backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock backend whose `create` always fails.
    pub fn failing_create() -> Self {
        Self {
            fail_create: true,
            ..Self::default()
        }
    }

    /// Create a mock backend whose activity probe always fails.
    pub fn failing_activity() -> Self {
        Self {
            fail_activity: true,
            ..Self::default()
        }
    }

    /// Script the activity probe result for a resource.
    pub async fn set_activity(&self, resource_id: &str, active: bool, healthy: bool, signal: u64) {
        if let Some(resource) = self.resources.lock().await.get_mut(resource_id) {
            resource.activity = ActivityInfo {
                active,
                healthy,
                signal,
            };
        }
    }

    /// Force a resource into a state, simulating drift behind the
    /// control plane's back.
    pub async fn set_state(&self, resource_id: &str, state: ResourceState) {
        if let Some(resource) = self.resources.lock().await.get_mut(resource_id) {
            resource.state = state;
        }
    }

    /// Remove a resource as if it were deleted externally.
    pub async fn remove_resource(&self, resource_id: &str) {
        self.resources.lock().await.remove(resource_id);
    }

    /// Number of live resources.
    pub async fn resource_count(&self) -> usize {
        self.resources.lock().await.len()
    }

    /// True if the resource exists.
    pub async fn has_resource(&self, resource_id: &str) -> bool {
        self.resources.lock().await.contains_key(resource_id)
    }

    /// How many times `destroy` was called.
    pub fn destroy_calls(&self) -> u64 {
        self.destroy_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ComputeBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn create(&self, opts: &CreateOptions) -> Result<ResourceDescriptor> {
        if self.fail_create {
            return Err(BackendError::Provision(
                "injected create failure".to_string(),
            ));
        }
        let mut resources = self.resources.lock().await;
        if resources.values().any(|r| r.user_id == opts.user_id) {
            return Err(BackendError::AlreadyExists(opts.user_id.to_string()));
        }
        let resource_id = format!("mock-{}", Uuid::new_v4().simple());
        let resource = MockResource {
            user_id: opts.user_id,
            state: ResourceState::Running,
            activity: ActivityInfo {
                active: false,
                healthy: true,
                signal: 0,
            },
            host: format!("{resource_id}.mock.internal"),
            volume_id: format!("vol-{}", Uuid::new_v4().simple()),
        };
        let descriptor = ResourceDescriptor {
            resource_id: resource_id.clone(),
            host: Some(resource.host.clone()),
            volume_id: Some(resource.volume_id.clone()),
            state: resource.state,
        };
        resources.insert(resource_id, resource);
        Ok(descriptor)
    }

    async fn destroy(&self, resource_id: &str) -> Result<()> {
        self.destroy_calls.fetch_add(1, Ordering::SeqCst);
        let mut resources = self.resources.lock().await;
        // The durable volume would be preserved here; the mock only
        // tracks compute.
        match resources.remove(resource_id) {
            Some(_) => Ok(()),
            None => Err(BackendError::NotFound(resource_id.to_string())),
        }
    }

    async fn status(&self, resource_id: &str) -> Result<ResourceDescriptor> {
        let resources = self.resources.lock().await;
        let resource = resources
            .get(resource_id)
            .ok_or_else(|| BackendError::NotFound(resource_id.to_string()))?;
        Ok(ResourceDescriptor {
            resource_id: resource_id.to_string(),
            host: Some(resource.host.clone()),
            volume_id: Some(resource.volume_id.clone()),
            state: resource.state,
        })
    }

    async fn pause(&self, resource_id: &str) -> Result<()> {
        let mut resources = self.resources.lock().await;
        let resource = resources
            .get_mut(resource_id)
            .ok_or_else(|| BackendError::NotFound(resource_id.to_string()))?;
        if resource.state != ResourceState::Running {
            return Err(BackendError::InvalidState(format!(
                "cannot pause resource in state {:?}",
                resource.state
            )));
        }
        resource.state = ResourceState::Stopped;
        Ok(())
    }

    async fn wake(&self, resource_id: &str) -> Result<()> {
        let mut resources = self.resources.lock().await;
        let resource = resources
            .get_mut(resource_id)
            .ok_or_else(|| BackendError::NotFound(resource_id.to_string()))?;
        if resource.state != ResourceState::Stopped {
            return Err(BackendError::InvalidState(format!(
                "cannot wake resource in state {:?}",
                resource.state
            )));
        }
        resource.state = ResourceState::Running;
        Ok(())
    }

    async fn activity(&self, resource_id: &str) -> Result<ActivityInfo> {
        if self.fail_activity {
            return Err(BackendError::Other("injected probe failure".to_string()));
        }
        let resources = self.resources.lock().await;
        resources
            .get(resource_id)
            .map(|r| r.activity)
            .ok_or_else(|| BackendError::NotFound(resource_id.to_string()))
    }
}
