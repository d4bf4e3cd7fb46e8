// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL-backed instance store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{Instance, InstanceStatus, InstanceStore, NetworkRecord, NewInstance, StoreError};

/// Raw row shape; `network` is carried as JSON text and parsed on the
/// way out so the column stays opaque to the database layer.
#[derive(Debug, sqlx::FromRow)]
struct InstanceRow {
    id: Uuid,
    user_id: Uuid,
    backend: String,
    resource_id: String,
    host: Option<String>,
    status: InstanceStatus,
    volume_id: Option<String>,
    shared_secret: String,
    network: Option<String>,
    last_active_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<InstanceRow> for Instance {
    type Error = StoreError;

    fn try_from(row: InstanceRow) -> Result<Self, StoreError> {
        let network = row
            .network
            .as_deref()
            .map(serde_json::from_str::<NetworkRecord>)
            .transpose()?;
        Ok(Instance {
            id: row.id,
            user_id: row.user_id,
            backend: row.backend,
            resource_id: row.resource_id,
            host: row.host,
            status: row.status,
            volume_id: row.volume_id,
            shared_secret: row.shared_secret,
            network,
            last_active_at: row.last_active_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const INSTANCE_COLUMNS: &str = "id, user_id, backend, resource_id, host, status, volume_id, \
     shared_secret, network::TEXT as network, last_active_at, created_at, updated_at";

fn status_names(statuses: &[InstanceStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

/// Instance store backed by PostgreSQL.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a store over an existing connection pool.
    ///
    /// Run [`crate::migrations::run`] against the pool first.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InstanceStore for PostgresStore {
    async fn insert(&self, new: NewInstance) -> Result<Instance, StoreError> {
        let network = new
            .network
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let row = sqlx::query_as::<_, InstanceRow>(&format!(
            r#"
            INSERT INTO instances
                (user_id, backend, resource_id, host, status, volume_id,
                 shared_secret, network)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8::jsonb)
            RETURNING {INSTANCE_COLUMNS}
            "#,
        ))
        .bind(new.user_id)
        .bind(&new.backend)
        .bind(&new.resource_id)
        .bind(&new.host)
        .bind(new.status)
        .bind(&new.volume_id)
        .bind(&new.shared_secret)
        .bind(network)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn get(&self, id: Uuid) -> Result<Option<Instance>, StoreError> {
        let row = sqlx::query_as::<_, InstanceRow>(&format!(
            r#"SELECT {INSTANCE_COLUMNS} FROM instances WHERE id = $1"#,
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Instance::try_from).transpose()
    }

    async fn get_by_resource(
        &self,
        backend: &str,
        resource_id: &str,
    ) -> Result<Option<Instance>, StoreError> {
        let row = sqlx::query_as::<_, InstanceRow>(&format!(
            r#"
            SELECT {INSTANCE_COLUMNS} FROM instances
            WHERE backend = $1 AND resource_id = $2
            "#,
        ))
        .bind(backend)
        .bind(resource_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Instance::try_from).transpose()
    }

    async fn find_for_user(
        &self,
        user_id: Uuid,
        statuses: &[InstanceStatus],
    ) -> Result<Option<Instance>, StoreError> {
        let row = sqlx::query_as::<_, InstanceRow>(&format!(
            r#"
            SELECT {INSTANCE_COLUMNS} FROM instances
            WHERE user_id = $1 AND status::TEXT = ANY($2)
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        ))
        .bind(user_id)
        .bind(status_names(statuses))
        .fetch_optional(&self.pool)
        .await?;
        row.map(Instance::try_from).transpose()
    }

    async fn exists_for_user(
        &self,
        user_id: Uuid,
        statuses: &[InstanceStatus],
    ) -> Result<bool, StoreError> {
        let exists: (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM instances
                WHERE user_id = $1 AND status::TEXT = ANY($2)
            )
            "#,
        )
        .bind(user_id)
        .bind(status_names(statuses))
        .fetch_one(&self.pool)
        .await?;
        Ok(exists.0)
    }

    async fn list_by_status(&self, status: InstanceStatus) -> Result<Vec<Instance>, StoreError> {
        let rows = sqlx::query_as::<_, InstanceRow>(&format!(
            r#"
            SELECT {INSTANCE_COLUMNS} FROM instances
            WHERE status = $1
            ORDER BY created_at ASC
            "#,
        ))
        .bind(status)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Instance::try_from).collect()
    }

    async fn update_status(&self, id: Uuid, status: InstanceStatus) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE instances
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn update_last_active(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE instances
            SET last_active_at = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn update_network_record(
        &self,
        id: Uuid,
        record: Option<&NetworkRecord>,
    ) -> Result<(), StoreError> {
        let network = record.map(serde_json::to_string).transpose()?;
        let result = sqlx::query(
            r#"
            UPDATE instances
            SET network = $2::jsonb, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(network)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
