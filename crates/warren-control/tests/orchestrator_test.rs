// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Lifecycle tests for the instance orchestrator: create with its
//! compensating rollbacks, reconciliation, pause/wake, and destroy.

mod common;

use uuid::Uuid;
use warren_control::Error;
use warren_control::backend::{MockBackend, ResourceState};
use warren_control::store::{InstanceStatus, InstanceStore};
use warren_mesh::MeshFaults;

#[tokio::test]
async fn test_create_provisions_running_instance() {
    let plane = common::networked();
    let user = Uuid::new_v4();

    let instance = plane.orchestrator.create(user).await.unwrap();

    assert_eq!(instance.user_id, user);
    assert_eq!(instance.status, InstanceStatus::Running);
    assert_eq!(instance.backend, "mock");
    assert!(plane.backend.has_resource(&instance.resource_id).await);
    assert_eq!(instance.shared_secret.len(), 64);

    // Both network phases ran.
    let record = instance.network.expect("network record");
    assert!(record.group_id.is_some());
    assert!(record.key_id.is_some());
    assert!(record.route_id.is_some());
    assert!(record.policy_id.is_some());
    assert_eq!(plane.mesh.group_count().await, 1);
    assert_eq!(plane.mesh.route_count().await, 1);
    assert_eq!(plane.mesh.policy_count().await, 1);
}

#[tokio::test]
async fn test_create_without_networking_skips_mesh() {
    let plane = common::standalone();

    let instance = plane.orchestrator.create(Uuid::new_v4()).await.unwrap();

    assert!(instance.network.is_none());
    assert_eq!(plane.mesh.group_count().await, 0);
}

#[tokio::test]
async fn test_second_create_rejected() {
    let plane = common::networked();
    let user = Uuid::new_v4();
    plane.orchestrator.create(user).await.unwrap();

    let err = plane.orchestrator.create(user).await.unwrap_err();
    assert!(matches!(err, Error::AlreadyExists(_)));
    assert_eq!(plane.backend.resource_count().await, 1);
}

#[tokio::test]
async fn test_create_allowed_after_destroy() {
    let plane = common::networked();
    let user = Uuid::new_v4();
    let first = plane.orchestrator.create(user).await.unwrap();
    plane.orchestrator.destroy(first.id).await.unwrap();

    let second = plane.orchestrator.create(user).await.unwrap();
    assert_ne!(second.id, first.id);
    assert_eq!(second.status, InstanceStatus::Running);
}

#[tokio::test]
async fn test_backend_create_failure_unwinds_phase_one() {
    let plane = common::with_backend(MockBackend::failing_create(), true);
    let user = Uuid::new_v4();

    let err = plane.orchestrator.create(user).await.unwrap_err();
    assert!(matches!(err, Error::Backend(_)));

    // The group from phase 1 must not leak.
    assert_eq!(plane.mesh.group_count().await, 0);
    assert_eq!(plane.store.row_count().await, 0);
}

#[tokio::test]
async fn test_phase_two_failure_destroys_backend_resource() {
    let plane = common::networked();
    plane
        .mesh
        .set_faults(MeshFaults {
            create_policy: true,
            ..MeshFaults::default()
        })
        .await;

    let err = plane.orchestrator.create(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, Error::Mesh(_)));

    // No row, no compute, no mesh leftovers.
    assert_eq!(plane.store.row_count().await, 0);
    assert_eq!(plane.backend.resource_count().await, 0);
    assert_eq!(plane.mesh.route_count().await, 0);
    assert_eq!(plane.mesh.policy_count().await, 0);
    assert_eq!(plane.mesh.group_count().await, 0);
}

#[tokio::test]
async fn test_persist_failure_destroys_backend_resource() {
    let plane = common::networked();
    plane.store.fail_inserts(true);

    let err = plane.orchestrator.create(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, Error::Store(_)));

    assert_eq!(plane.backend.resource_count().await, 0);
    assert_eq!(plane.mesh.group_count().await, 0);
    assert_eq!(plane.mesh.route_count().await, 0);
    assert_eq!(plane.mesh.policy_count().await, 0);
}

#[tokio::test]
async fn test_pause_then_wake_roundtrip() {
    let plane = common::standalone();
    let instance = plane.orchestrator.create(Uuid::new_v4()).await.unwrap();

    plane.orchestrator.pause(instance.id).await.unwrap();
    let paused = plane.store.get(instance.id).await.unwrap().unwrap();
    assert_eq!(paused.status, InstanceStatus::Stopped);

    plane.orchestrator.wake(instance.id).await.unwrap();
    let woken = plane.store.get(instance.id).await.unwrap().unwrap();
    assert_eq!(woken.status, InstanceStatus::Running);
}

#[tokio::test]
async fn test_wake_running_and_pause_stopped_rejected() {
    let plane = common::standalone();
    let instance = plane.orchestrator.create(Uuid::new_v4()).await.unwrap();

    let err = plane.orchestrator.wake(instance.id).await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
    let unchanged = plane.store.get(instance.id).await.unwrap().unwrap();
    assert_eq!(unchanged.status, InstanceStatus::Running);

    plane.orchestrator.pause(instance.id).await.unwrap();
    let err = plane.orchestrator.pause(instance.id).await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
    let unchanged = plane.store.get(instance.id).await.unwrap().unwrap();
    assert_eq!(unchanged.status, InstanceStatus::Stopped);
}

#[tokio::test]
async fn test_destroy_tears_down_network() {
    let plane = common::networked();
    let instance = plane.orchestrator.create(Uuid::new_v4()).await.unwrap();

    plane.orchestrator.destroy(instance.id).await.unwrap();

    let destroyed = plane.store.get(instance.id).await.unwrap().unwrap();
    assert_eq!(destroyed.status, InstanceStatus::Destroyed);
    assert!(destroyed.network.is_none());
    assert_eq!(plane.mesh.policy_count().await, 0);
    assert_eq!(plane.mesh.route_count().await, 0);
    assert_eq!(plane.mesh.group_count().await, 0);
    assert_eq!(plane.backend.resource_count().await, 0);
}

#[tokio::test]
async fn test_destroy_tolerates_backend_resource_already_gone() {
    let plane = common::networked();
    let instance = plane.orchestrator.create(Uuid::new_v4()).await.unwrap();
    plane.backend.remove_resource(&instance.resource_id).await;

    plane.orchestrator.destroy(instance.id).await.unwrap();

    let destroyed = plane.store.get(instance.id).await.unwrap().unwrap();
    assert_eq!(destroyed.status, InstanceStatus::Destroyed);
}

#[tokio::test]
async fn test_destroy_twice_rejected() {
    let plane = common::standalone();
    let instance = plane.orchestrator.create(Uuid::new_v4()).await.unwrap();
    plane.orchestrator.destroy(instance.id).await.unwrap();

    let err = plane.orchestrator.destroy(instance.id).await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
}

#[tokio::test]
async fn test_destroy_retries_after_teardown_failure() {
    let plane = common::networked();
    let instance = plane.orchestrator.create(Uuid::new_v4()).await.unwrap();

    // First attempt: the policy deletion fails, the rest of the
    // teardown still runs, and the destroy aborts.
    plane
        .mesh
        .set_faults(MeshFaults {
            delete_policy: true,
            ..MeshFaults::default()
        })
        .await;
    assert!(plane.orchestrator.destroy(instance.id).await.is_err());
    let row = plane.store.get(instance.id).await.unwrap().unwrap();
    assert_eq!(row.status, InstanceStatus::Running);
    assert_eq!(plane.mesh.route_count().await, 0);
    assert_eq!(plane.mesh.group_count().await, 0);
    assert_eq!(plane.mesh.policy_count().await, 1);

    // Retry converges: the surviving policy goes, the already-deleted
    // route and group are tolerated.
    plane.mesh.set_faults(MeshFaults::default()).await;
    plane.orchestrator.destroy(instance.id).await.unwrap();
    assert_eq!(plane.mesh.policy_count().await, 0);
    let row = plane.store.get(instance.id).await.unwrap().unwrap();
    assert_eq!(row.status, InstanceStatus::Destroyed);
}

#[tokio::test]
async fn test_get_reconciles_backend_drift() {
    let plane = common::standalone();
    let instance = plane.orchestrator.create(Uuid::new_v4()).await.unwrap();

    // The backend paused the resource behind the control plane's back.
    plane
        .backend
        .set_state(&instance.resource_id, ResourceState::Stopped)
        .await;

    let observed = plane.orchestrator.get(instance.id).await.unwrap();
    assert_eq!(observed.status, InstanceStatus::Stopped);
    let row = plane.store.get(instance.id).await.unwrap().unwrap();
    assert_eq!(row.status, InstanceStatus::Stopped);
}

#[tokio::test]
async fn test_get_marks_destroyed_when_backend_lost_resource() {
    let plane = common::standalone();
    let instance = plane.orchestrator.create(Uuid::new_v4()).await.unwrap();
    plane.backend.remove_resource(&instance.resource_id).await;

    let observed = plane.orchestrator.get(instance.id).await.unwrap();
    assert_eq!(observed.status, InstanceStatus::Destroyed);
    let row = plane.store.get(instance.id).await.unwrap().unwrap();
    assert_eq!(row.status, InstanceStatus::Destroyed);
}

#[tokio::test]
async fn test_get_unknown_instance_is_not_found() {
    let plane = common::standalone();
    let err = plane.orchestrator.get(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_unregistered_backend_is_reported() {
    use std::sync::Arc;
    use warren_control::backend::BackendRegistry;
    use warren_control::orchestrator::InstanceOrchestrator;
    use warren_control::store::MemoryStore;

    let store = Arc::new(MemoryStore::new());
    let orchestrator = InstanceOrchestrator::new(
        store,
        Arc::new(BackendRegistry::new()),
        "docker",
        None,
    );

    let err = orchestrator.create(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, Error::BackendNotConfigured(_)));
}
