// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Compute backend contract and registry.
//!
//! A backend is a pluggable provisioning engine (local container engine,
//! remote VM via infrastructure-as-code, ...). The orchestration core
//! only ever holds the [`ComputeBackend`] trait, so adding a backend
//! never touches the orchestrator, sequencer, or reclamation worker.

pub mod mock;
pub mod traits;

pub use self::mock::MockBackend;
pub use self::traits::{
    ActivityInfo, BackendError, ComputeBackend, CreateOptions, ResourceDescriptor, ResourceState,
};

use std::collections::HashMap;
use std::sync::Arc;

/// Backends keyed by name.
///
/// Shared between the orchestrator and the idle reclamation worker so
/// both resolve an instance's `backend` column to the same driver.
#[derive(Default)]
pub struct BackendRegistry {
    backends: HashMap<&'static str, Arc<dyn ComputeBackend>>,
}

impl BackendRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend under its own [`ComputeBackend::name`].
    pub fn register(&mut self, backend: Arc<dyn ComputeBackend>) {
        self.backends.insert(backend.name(), backend);
    }

    /// Look up a backend by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ComputeBackend>> {
        self.backends.get(name).cloned()
    }

    /// Registered backend names.
    pub fn names(&self) -> Vec<&'static str> {
        self.backends.keys().copied().collect()
    }

    /// True if no backend is registered.
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lookup() {
        let mut registry = BackendRegistry::new();
        assert!(registry.is_empty());

        registry.register(Arc::new(MockBackend::new()));
        assert!(registry.get("mock").is_some());
        assert!(registry.get("docker").is_none());
        assert_eq!(registry.names(), vec!["mock"]);
    }
}
