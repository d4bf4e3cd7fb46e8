// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tests for runtime assembly, worker wiring, and shutdown.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;
use warren_control::ControlRuntime;
use warren_control::backend::MockBackend;
use warren_control::store::{InstanceStatus, InstanceStore, MemoryStore};
use warren_mesh::InMemoryMesh;

#[test]
fn test_build_requires_store() {
    let err = ControlRuntime::builder()
        .register_backend(Arc::new(MockBackend::new()))
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("store"));
}

#[test]
fn test_build_requires_backend() {
    let err = ControlRuntime::builder()
        .store(Arc::new(MemoryStore::new()))
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("backend"));
}

#[test]
fn test_build_rejects_unknown_default_backend() {
    let err = ControlRuntime::builder()
        .store(Arc::new(MemoryStore::new()))
        .register_backend(Arc::new(MockBackend::new()))
        .default_backend("docker")
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("docker"));
}

#[test]
fn test_build_requires_mesh_when_networking_enabled() {
    let err = ControlRuntime::builder()
        .store(Arc::new(MemoryStore::new()))
        .register_backend(Arc::new(MockBackend::new()))
        .networking_enabled(true)
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("mesh"));
}

#[tokio::test]
async fn test_started_runtime_reclaims_and_shuts_down() {
    let store = Arc::new(MemoryStore::new());
    let backend = Arc::new(MockBackend::new());

    let runtime = ControlRuntime::builder()
        .store(store.clone())
        .register_backend(backend.clone())
        .mesh(Arc::new(InMemoryMesh::new()))
        .networking_enabled(true)
        .poll_interval(Duration::from_millis(50))
        .idle_threshold(Duration::ZERO)
        .build()
        .unwrap()
        .start()
        .await
        .unwrap();

    let orchestrator = runtime.orchestrator();
    let instance = orchestrator.create(Uuid::new_v4()).await.unwrap();

    // The instance never reports activity, the threshold is zero, so
    // the first sweep pauses it.
    let mut paused = false;
    for _ in 0..40 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let row = store.get(instance.id).await.unwrap().unwrap();
        if row.status == InstanceStatus::Stopped {
            paused = true;
            break;
        }
    }
    assert!(paused, "idle instance was not reclaimed");

    runtime.shutdown().await.unwrap();
}
