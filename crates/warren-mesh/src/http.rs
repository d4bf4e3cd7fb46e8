// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP implementation of [`MeshApi`].
//!
//! JSON over HTTPS against the provider's management API, authenticated
//! with a bearer token. Requests carry a bounded timeout so a slow
//! provider degrades to an error instead of stalling the caller.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::api::MeshApi;
use crate::error::{MeshError, Result};
use crate::types::{
    EnrollmentKey, MeshGroup, MeshPolicy, MeshRoute, NewEnrollmentKey, NewPolicy, NewRoute,
};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Client for the mesh provider's REST API.
pub struct HttpMeshClient {
    base_url: String,
    token: String,
    client: Client,
}

impl HttpMeshClient {
    /// Create a client for the given management API base URL and token.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
    }

    async fn execute<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T> {
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(MeshError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp.json().await?)
    }

    /// Like [`execute`](Self::execute) but discards the response body.
    async fn execute_empty(&self, req: RequestBuilder) -> Result<()> {
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(MeshError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        debug!(path = path, "mesh GET");
        self.execute(self.request(Method::GET, path)).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        debug!(path = path, "mesh POST");
        self.execute(self.request(Method::POST, path).json(body))
            .await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        debug!(path = path, "mesh DELETE");
        self.execute_empty(self.request(Method::DELETE, path)).await
    }
}

#[async_trait]
impl MeshApi for HttpMeshClient {
    async fn create_group(&self, name: &str) -> Result<MeshGroup> {
        self.post("/api/groups", &serde_json::json!({ "name": name }))
            .await
    }

    async fn list_groups(&self) -> Result<Vec<MeshGroup>> {
        self.get("/api/groups").await
    }

    async fn delete_group(&self, id: &str) -> Result<()> {
        self.delete(&format!("/api/groups/{id}")).await
    }

    async fn create_enrollment_key(&self, req: &NewEnrollmentKey) -> Result<EnrollmentKey> {
        self.post("/api/setup-keys", req).await
    }

    async fn list_enrollment_keys(&self) -> Result<Vec<EnrollmentKey>> {
        self.get("/api/setup-keys").await
    }

    async fn revoke_enrollment_key(&self, id: &str) -> Result<()> {
        // The provider revokes keys via update, not delete.
        let req = self
            .request(Method::PUT, &format!("/api/setup-keys/{id}"))
            .json(&serde_json::json!({ "revoked": true }));
        self.execute_empty(req).await
    }

    async fn create_route(&self, req: &NewRoute) -> Result<MeshRoute> {
        self.post("/api/routes", req).await
    }

    async fn list_routes(&self) -> Result<Vec<MeshRoute>> {
        self.get("/api/routes").await
    }

    async fn delete_route(&self, id: &str) -> Result<()> {
        self.delete(&format!("/api/routes/{id}")).await
    }

    async fn create_policy(&self, req: &NewPolicy) -> Result<MeshPolicy> {
        self.post("/api/policies", req).await
    }

    async fn list_policies(&self) -> Result<Vec<MeshPolicy>> {
        self.get("/api/policies").await
    }

    async fn delete_policy(&self, id: &str) -> Result<()> {
        self.delete(&format!("/api/policies/{id}")).await
    }
}
