// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory implementation of [`MeshApi`] for tests.
//!
//! Holds all four resource kinds in maps and supports injecting failures
//! per operation, so rollback paths in the provisioning sequencer can be
//! exercised without a real provider.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::api::MeshApi;
use crate::error::{MeshError, Result};
use crate::types::{
    EnrollmentKey, MeshGroup, MeshPolicy, MeshRoute, NewEnrollmentKey, NewPolicy, NewRoute,
};

/// Per-operation failure switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeshFaults {
    /// Fail group creation.
    pub create_group: bool,
    /// Fail enrollment key creation.
    pub create_enrollment_key: bool,
    /// Fail route creation.
    pub create_route: bool,
    /// Fail policy creation.
    pub create_policy: bool,
    /// Fail group deletion.
    pub delete_group: bool,
    /// Fail route deletion.
    pub delete_route: bool,
    /// Fail policy deletion.
    pub delete_policy: bool,
    /// Fail key revocation.
    pub revoke_key: bool,
}

#[derive(Default)]
struct State {
    groups: HashMap<String, MeshGroup>,
    keys: HashMap<String, EnrollmentKey>,
    routes: HashMap<String, MeshRoute>,
    policies: HashMap<String, MeshPolicy>,
    faults: MeshFaults,
}

/// In-memory mesh provider.
#[derive(Default)]
pub struct InMemoryMesh {
    state: Mutex<State>,
}

fn injected() -> MeshError {
    MeshError::Api {
        status: 500,
        message: "injected failure".to_string(),
    }
}

fn not_found(id: &str) -> MeshError {
    MeshError::Api {
        status: 404,
        message: format!("no such resource: {id}"),
    }
}

fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

impl InMemoryMesh {
    /// Create an empty in-memory mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the failure switches.
    pub async fn set_faults(&self, faults: MeshFaults) {
        self.state.lock().await.faults = faults;
    }

    /// Number of groups currently held.
    pub async fn group_count(&self) -> usize {
        self.state.lock().await.groups.len()
    }

    /// Number of routes currently held.
    pub async fn route_count(&self) -> usize {
        self.state.lock().await.routes.len()
    }

    /// Number of policies currently held.
    pub async fn policy_count(&self) -> usize {
        self.state.lock().await.policies.len()
    }

    /// Number of enrollment keys currently held, revoked ones included.
    pub async fn key_count(&self) -> usize {
        self.state.lock().await.keys.len()
    }

    /// True if a group with this id exists.
    pub async fn has_group(&self, id: &str) -> bool {
        self.state.lock().await.groups.contains_key(id)
    }

    /// Fetch a key by id.
    pub async fn key(&self, id: &str) -> Option<EnrollmentKey> {
        self.state.lock().await.keys.get(id).cloned()
    }

    /// Mark a key as no longer valid, as the provider does on expiry.
    pub async fn expire_key(&self, id: &str) {
        if let Some(key) = self.state.lock().await.keys.get_mut(id) {
            key.valid = false;
        }
    }
}

#[async_trait]
impl MeshApi for InMemoryMesh {
    async fn create_group(&self, name: &str) -> Result<MeshGroup> {
        let mut state = self.state.lock().await;
        if state.faults.create_group {
            return Err(injected());
        }
        let group = MeshGroup {
            id: new_id("grp"),
            name: name.to_string(),
        };
        state.groups.insert(group.id.clone(), group.clone());
        Ok(group)
    }

    async fn list_groups(&self) -> Result<Vec<MeshGroup>> {
        Ok(self.state.lock().await.groups.values().cloned().collect())
    }

    async fn delete_group(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.faults.delete_group {
            return Err(injected());
        }
        state.groups.remove(id).map(|_| ()).ok_or_else(|| not_found(id))
    }

    async fn create_enrollment_key(&self, req: &NewEnrollmentKey) -> Result<EnrollmentKey> {
        let mut state = self.state.lock().await;
        if state.faults.create_enrollment_key {
            return Err(injected());
        }
        let key = EnrollmentKey {
            id: new_id("key"),
            key: new_id("secret"),
            name: req.name.clone(),
            valid: true,
            revoked: false,
            auto_groups: req.auto_groups.clone(),
            expires_at: Some(Utc::now() + Duration::seconds(req.expires_in as i64)),
        };
        state.keys.insert(key.id.clone(), key.clone());
        Ok(key)
    }

    async fn list_enrollment_keys(&self) -> Result<Vec<EnrollmentKey>> {
        Ok(self.state.lock().await.keys.values().cloned().collect())
    }

    async fn revoke_enrollment_key(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.faults.revoke_key {
            return Err(injected());
        }
        match state.keys.get_mut(id) {
            Some(key) => {
                key.revoked = true;
                key.valid = false;
                Ok(())
            }
            None => Err(not_found(id)),
        }
    }

    async fn create_route(&self, req: &NewRoute) -> Result<MeshRoute> {
        let mut state = self.state.lock().await;
        if state.faults.create_route {
            return Err(injected());
        }
        let route = MeshRoute {
            id: new_id("rt"),
            network: req.network.clone(),
            groups: req.groups.clone(),
        };
        state.routes.insert(route.id.clone(), route.clone());
        Ok(route)
    }

    async fn list_routes(&self) -> Result<Vec<MeshRoute>> {
        Ok(self.state.lock().await.routes.values().cloned().collect())
    }

    async fn delete_route(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.faults.delete_route {
            return Err(injected());
        }
        state.routes.remove(id).map(|_| ()).ok_or_else(|| not_found(id))
    }

    async fn create_policy(&self, req: &NewPolicy) -> Result<MeshPolicy> {
        let mut state = self.state.lock().await;
        if state.faults.create_policy {
            return Err(injected());
        }
        let policy = MeshPolicy {
            id: new_id("pol"),
            name: req.name.clone(),
            enabled: true,
            sources: req.sources.clone(),
            destinations: req.destinations.clone(),
            bidirectional: req.bidirectional,
        };
        state.policies.insert(policy.id.clone(), policy.clone());
        Ok(policy)
    }

    async fn list_policies(&self) -> Result<Vec<MeshPolicy>> {
        Ok(self.state.lock().await.policies.values().cloned().collect())
    }

    async fn delete_policy(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.faults.delete_policy {
            return Err(injected());
        }
        state
            .policies
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found(id))
    }
}
