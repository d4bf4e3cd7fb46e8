// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory instance store for tests.
//!
//! Mirrors the PostgreSQL store's behavior, including the one active
//! instance per user constraint, and supports injecting insert/update
//! failures so rollback paths can be exercised.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    ACTIVE_STATUSES, Instance, InstanceStatus, InstanceStore, NetworkRecord, NewInstance,
    StoreError,
};

/// In-memory instance store.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<Uuid, Instance>>,
    fail_inserts: AtomicBool,
    fail_updates: AtomicBool,
}

fn injected() -> StoreError {
    StoreError::Other("injected store failure".to_string())
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent inserts fail.
    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent field updates fail.
    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    /// Number of rows held, destroyed ones included.
    pub async fn row_count(&self) -> usize {
        self.rows.lock().await.len()
    }

    /// Backdate a row's creation timestamp (for idle-fallback tests).
    pub async fn set_created_at(&self, id: Uuid, at: DateTime<Utc>) {
        if let Some(row) = self.rows.lock().await.get_mut(&id) {
            row.created_at = at;
        }
    }
}

#[async_trait]
impl InstanceStore for MemoryStore {
    async fn insert(&self, new: NewInstance) -> Result<Instance, StoreError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(injected());
        }
        let mut rows = self.rows.lock().await;
        let duplicate = rows
            .values()
            .any(|i| i.user_id == new.user_id && ACTIVE_STATUSES.contains(&i.status));
        if duplicate {
            return Err(StoreError::Other(format!(
                "user {} already has an active instance row",
                new.user_id
            )));
        }
        let now = Utc::now();
        let instance = Instance {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            backend: new.backend,
            resource_id: new.resource_id,
            host: new.host,
            status: new.status,
            volume_id: new.volume_id,
            shared_secret: new.shared_secret,
            network: new.network,
            last_active_at: None,
            created_at: now,
            updated_at: now,
        };
        rows.insert(instance.id, instance.clone());
        Ok(instance)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Instance>, StoreError> {
        Ok(self.rows.lock().await.get(&id).cloned())
    }

    async fn get_by_resource(
        &self,
        backend: &str,
        resource_id: &str,
    ) -> Result<Option<Instance>, StoreError> {
        Ok(self
            .rows
            .lock()
            .await
            .values()
            .find(|i| i.backend == backend && i.resource_id == resource_id)
            .cloned())
    }

    async fn find_for_user(
        &self,
        user_id: Uuid,
        statuses: &[InstanceStatus],
    ) -> Result<Option<Instance>, StoreError> {
        Ok(self
            .rows
            .lock()
            .await
            .values()
            .filter(|i| i.user_id == user_id && statuses.contains(&i.status))
            .max_by_key(|i| i.created_at)
            .cloned())
    }

    async fn exists_for_user(
        &self,
        user_id: Uuid,
        statuses: &[InstanceStatus],
    ) -> Result<bool, StoreError> {
        Ok(self
            .rows
            .lock()
            .await
            .values()
            .any(|i| i.user_id == user_id && statuses.contains(&i.status)))
    }

    async fn list_by_status(&self, status: InstanceStatus) -> Result<Vec<Instance>, StoreError> {
        let mut instances: Vec<Instance> = self
            .rows
            .lock()
            .await
            .values()
            .filter(|i| i.status == status)
            .cloned()
            .collect();
        instances.sort_by_key(|i| i.created_at);
        Ok(instances)
    }

    async fn update_status(&self, id: Uuid, status: InstanceStatus) -> Result<(), StoreError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(injected());
        }
        let mut rows = self.rows.lock().await;
        let row = rows.get_mut(&id).ok_or(StoreError::NotFound)?;
        row.status = status;
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn update_last_active(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(injected());
        }
        let mut rows = self.rows.lock().await;
        let row = rows.get_mut(&id).ok_or(StoreError::NotFound)?;
        row.last_active_at = Some(at);
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn update_network_record(
        &self,
        id: Uuid,
        record: Option<&NetworkRecord>,
    ) -> Result<(), StoreError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(injected());
        }
        let mut rows = self.rows.lock().await;
        let row = rows.get_mut(&id).ok_or(StoreError::NotFound)?;
        row.network = record.cloned();
        row.updated_at = Utc::now();
        Ok(())
    }
}
