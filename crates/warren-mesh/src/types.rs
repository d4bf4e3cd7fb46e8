// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Value types for the mesh provider's resources.
//!
//! Field names follow the provider's JSON schema so the HTTP client can
//! (de)serialize responses directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A peer isolation group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshGroup {
    /// Provider-assigned group id.
    pub id: String,
    /// Group name.
    pub name: String,
}

/// An enrollment key that lets a booting peer join the mesh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentKey {
    /// Provider-assigned key id.
    pub id: String,
    /// The secret value. Only populated in the create response.
    #[serde(default)]
    pub key: String,
    /// Key name.
    pub name: String,
    /// Whether the key can still be used (not expired, not exhausted).
    pub valid: bool,
    /// Whether the key has been revoked.
    pub revoked: bool,
    /// Groups a peer enrolling with this key is assigned to.
    #[serde(default)]
    pub auto_groups: Vec<String>,
    /// When the key expires.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Request body for creating an enrollment key.
#[derive(Debug, Clone, Serialize)]
pub struct NewEnrollmentKey {
    /// Key name.
    pub name: String,
    /// Maximum number of peers that can enroll with this key.
    pub usage_limit: u32,
    /// Key lifetime in seconds.
    pub expires_in: u64,
    /// Whether peers enrolled with this key are removed when they
    /// disconnect for good.
    pub ephemeral: bool,
    /// Groups to auto-assign enrolling peers to.
    pub auto_groups: Vec<String>,
}

/// A network route scoping a subnet to a set of groups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshRoute {
    /// Provider-assigned route id.
    pub id: String,
    /// Routed network in CIDR notation.
    pub network: String,
    /// Groups the route is distributed to.
    #[serde(default)]
    pub groups: Vec<String>,
}

/// Request body for creating a route.
#[derive(Debug, Clone, Serialize)]
pub struct NewRoute {
    /// Routed network in CIDR notation.
    pub network: String,
    /// Groups to distribute the route to.
    pub groups: Vec<String>,
    /// Human-readable description.
    pub description: Option<String>,
}

/// An access policy between groups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshPolicy {
    /// Provider-assigned policy id.
    pub id: String,
    /// Policy name.
    pub name: String,
    /// Whether the policy is active.
    pub enabled: bool,
    /// Source group ids.
    #[serde(default)]
    pub sources: Vec<String>,
    /// Destination group ids.
    #[serde(default)]
    pub destinations: Vec<String>,
    /// Whether traffic is allowed in both directions.
    pub bidirectional: bool,
}

/// Request body for creating a policy.
#[derive(Debug, Clone, Serialize)]
pub struct NewPolicy {
    /// Policy name.
    pub name: String,
    /// Source group ids.
    pub sources: Vec<String>,
    /// Destination group ids.
    pub destinations: Vec<String>,
    /// Whether traffic is allowed in both directions.
    pub bidirectional: bool,
}
