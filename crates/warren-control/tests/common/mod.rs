// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared test fixtures: an assembled control plane over the in-memory
//! store, mock backend, and in-memory mesh.

#![allow(dead_code)]

use std::sync::Arc;

use warren_control::backend::{BackendRegistry, MockBackend};
use warren_control::idle_reclaimer::{IdleReclaimer, IdleReclaimerConfig};
use warren_control::netprovision::NetworkProvisioner;
use warren_control::orchestrator::InstanceOrchestrator;
use warren_control::store::MemoryStore;
use warren_mesh::InMemoryMesh;

/// A control plane wired against in-memory collaborators.
pub struct TestPlane {
    pub store: Arc<MemoryStore>,
    pub backend: Arc<MockBackend>,
    pub mesh: Arc<InMemoryMesh>,
    pub registry: Arc<BackendRegistry>,
    pub orchestrator: Arc<InstanceOrchestrator>,
}

/// Plane with network provisioning enabled.
pub fn networked() -> TestPlane {
    with_backend(MockBackend::new(), true)
}

/// Plane without network provisioning.
pub fn standalone() -> TestPlane {
    with_backend(MockBackend::new(), false)
}

/// Plane over a specific backend instance.
pub fn with_backend(backend: MockBackend, networking: bool) -> TestPlane {
    let store = Arc::new(MemoryStore::new());
    let backend = Arc::new(backend);
    let mesh = Arc::new(InMemoryMesh::new());

    let mut registry = BackendRegistry::new();
    registry.register(backend.clone());
    let registry = Arc::new(registry);

    let provisioner =
        networking.then(|| Arc::new(NetworkProvisioner::new(mesh.clone())));
    let orchestrator = Arc::new(InstanceOrchestrator::new(
        store.clone(),
        registry.clone(),
        "mock",
        provisioner,
    ));

    TestPlane {
        store,
        backend,
        mesh,
        registry,
        orchestrator,
    }
}

/// Reclamation worker over the plane's collaborators.
pub fn reclaimer(plane: &TestPlane, config: IdleReclaimerConfig) -> IdleReclaimer {
    IdleReclaimer::new(
        plane.store.clone(),
        plane.registry.clone(),
        plane.orchestrator.clone(),
        config,
    )
}
