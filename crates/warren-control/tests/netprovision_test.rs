// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tests for the two-phase network provisioning sequencer and its
//! rollback chains.

use std::sync::Arc;

use uuid::Uuid;
use warren_control::netprovision::NetworkProvisioner;
use warren_control::store::NetworkRecord;
use warren_mesh::{InMemoryMesh, MeshApi, MeshFaults};

fn provisioner() -> (Arc<InMemoryMesh>, NetworkProvisioner) {
    let mesh = Arc::new(InMemoryMesh::new());
    let provisioner = NetworkProvisioner::new(mesh.clone());
    (mesh, provisioner)
}

#[tokio::test]
async fn test_prepare_creates_group_and_key() {
    let (mesh, provisioner) = provisioner();

    let prepared = provisioner.prepare(Uuid::new_v4()).await.unwrap();

    assert_eq!(mesh.group_count().await, 1);
    assert_eq!(mesh.key_count().await, 1);
    assert!(!prepared.enrollment_secret.is_empty());

    // The key enrolls peers straight into the new group.
    let key = mesh.key(&prepared.key_id).await.unwrap();
    assert_eq!(key.auto_groups, vec![prepared.group_id.clone()]);
}

#[tokio::test]
async fn test_prepare_rolls_back_group_on_key_failure() {
    let (mesh, provisioner) = provisioner();
    mesh.set_faults(MeshFaults {
        create_enrollment_key: true,
        ..MeshFaults::default()
    })
    .await;

    assert!(provisioner.prepare(Uuid::new_v4()).await.is_err());
    assert_eq!(mesh.group_count().await, 0);
}

#[tokio::test]
async fn test_finalize_creates_route_and_policy() {
    let (mesh, provisioner) = provisioner();
    let user = Uuid::new_v4();
    let prepared = provisioner.prepare(user).await.unwrap();

    let record = provisioner.finalize(user, &prepared).await.unwrap();

    assert_eq!(record.group_id.as_deref(), Some(prepared.group_id.as_str()));
    assert!(record.route_id.is_some());
    assert!(record.policy_id.is_some());
    assert_eq!(mesh.route_count().await, 1);
    assert_eq!(mesh.policy_count().await, 1);
}

#[tokio::test]
async fn test_finalize_rolls_back_route_on_policy_failure() {
    let (mesh, provisioner) = provisioner();
    let user = Uuid::new_v4();
    let prepared = provisioner.prepare(user).await.unwrap();

    mesh.set_faults(MeshFaults {
        create_policy: true,
        ..MeshFaults::default()
    })
    .await;

    assert!(provisioner.finalize(user, &prepared).await.is_err());
    assert_eq!(mesh.route_count().await, 0);
    // Phase-1 resources are the caller's to unwind.
    assert_eq!(mesh.group_count().await, 1);
}

#[tokio::test]
async fn test_teardown_deletes_everything() {
    let (mesh, provisioner) = provisioner();
    let user = Uuid::new_v4();
    let prepared = provisioner.prepare(user).await.unwrap();
    let record = provisioner.finalize(user, &prepared).await.unwrap();

    provisioner.teardown(&record).await.unwrap();

    assert_eq!(mesh.policy_count().await, 0);
    assert_eq!(mesh.route_count().await, 0);
    assert_eq!(mesh.group_count().await, 0);
}

#[tokio::test]
async fn test_teardown_tolerates_partial_record() {
    let (mesh, provisioner) = provisioner();
    let group = mesh.create_group("user-x").await.unwrap();

    // Route and policy already absent; only the group remains.
    let record = NetworkRecord {
        group_id: Some(group.id),
        ..NetworkRecord::default()
    };
    provisioner.teardown(&record).await.unwrap();
    assert_eq!(mesh.group_count().await, 0);
}

#[tokio::test]
async fn test_teardown_tolerates_already_deleted_ids() {
    let (_mesh, provisioner) = provisioner();
    let record = NetworkRecord {
        group_id: Some("grp-gone".to_string()),
        key_id: Some("key-gone".to_string()),
        route_id: Some("rt-gone".to_string()),
        policy_id: Some("pol-gone".to_string()),
    };
    provisioner.teardown(&record).await.unwrap();
}

#[tokio::test]
async fn test_teardown_continues_past_first_error() {
    let (mesh, provisioner) = provisioner();
    let user = Uuid::new_v4();
    let prepared = provisioner.prepare(user).await.unwrap();
    let record = provisioner.finalize(user, &prepared).await.unwrap();

    mesh.set_faults(MeshFaults {
        delete_policy: true,
        ..MeshFaults::default()
    })
    .await;

    // The policy deletion fails and is reported, but route and group
    // are still deleted.
    assert!(provisioner.teardown(&record).await.is_err());
    assert_eq!(mesh.policy_count().await, 1);
    assert_eq!(mesh.route_count().await, 0);
    assert_eq!(mesh.group_count().await, 0);
}

#[tokio::test]
async fn test_cleanup_revokes_only_invalid_keys() {
    let (mesh, provisioner) = provisioner();
    let user = Uuid::new_v4();
    let expired = provisioner.prepare(user).await.unwrap();
    let live = provisioner.prepare(Uuid::new_v4()).await.unwrap();
    mesh.expire_key(&expired.key_id).await;

    provisioner.cleanup_expired_keys().await.unwrap();

    assert!(mesh.key(&expired.key_id).await.unwrap().revoked);
    assert!(!mesh.key(&live.key_id).await.unwrap().revoked);
}

#[tokio::test]
async fn test_cleanup_survives_revoke_failures() {
    let (mesh, provisioner) = provisioner();
    let prepared = provisioner.prepare(Uuid::new_v4()).await.unwrap();
    mesh.expire_key(&prepared.key_id).await;
    mesh.set_faults(MeshFaults {
        revoke_key: true,
        ..MeshFaults::default()
    })
    .await;

    // Individual revoke failures are logged, not surfaced.
    provisioner.cleanup_expired_keys().await.unwrap();
    assert!(!mesh.key(&prepared.key_id).await.unwrap().revoked);
}
