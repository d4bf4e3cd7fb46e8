// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Database migrations for warren-control.

use sqlx::PgPool;
use sqlx::migrate::MigrateError;

/// Apply all pending migrations to the pool.
pub async fn run(pool: &PgPool) -> Result<(), MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
