// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::error::ApiError;
use crate::settings_types::Settings;
use crate::tenant::TenantScope;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ResourceQuota;
use kube::{
    api::{Api, ListParams, Patch, PatchParams, PostParams},
    Client, Config,
};
use std::collections::HashMap;
use std::sync::Mutex;

// ClusterClient is the only way the reconciler reaches the API server.
// Every call except the cross-cluster list is addressed to one logical cluster,
// and NotFound/AlreadyExists/Conflict come back as distinct ApiError variants.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn get_settings(
        &self,
        scope: &TenantScope,
        namespace: &str,
        name: &str,
    ) -> Result<Settings, ApiError>;

    /// Lists Settings in every logical cluster the endpoint serves.
    async fn list_settings(&self) -> Result<Vec<Settings>, ApiError>;

    async fn get_quota(
        &self,
        scope: &TenantScope,
        namespace: &str,
        name: &str,
    ) -> Result<ResourceQuota, ApiError>;

    async fn create_quota(
        &self,
        scope: &TenantScope,
        quota: &ResourceQuota,
    ) -> Result<ResourceQuota, ApiError>;

    /// Replaces the quota. The object's resourceVersion is sent along, so a
    /// quota changed since it was read is rejected with a Conflict.
    async fn update_quota(
        &self,
        scope: &TenantScope,
        quota: &ResourceQuota,
    ) -> Result<ResourceQuota, ApiError>;

    /// Applies a JSON merge patch to the status sub-resource of a Settings object.
    async fn patch_settings_status(
        &self,
        scope: &TenantScope,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<Settings, ApiError>;
}

/// ClusterClient backed by kube-rs. Scoped calls go through a client built for
/// the logical cluster's endpoint; unscoped calls use the base client.
pub struct KubeClusterClient {
    client: Client,
    config: Config,
    // One client per logical-cluster endpoint, built on first use.
    scoped_clients: Mutex<HashMap<String, Client>>,
}

impl KubeClusterClient {
    pub fn new(config: Config) -> Result<KubeClusterClient, kube::Error> {
        let client = Client::try_from(config.clone())?;
        Ok(KubeClusterClient {
            client,
            config,
            scoped_clients: Mutex::new(HashMap::new()),
        })
    }

    pub fn client(&self) -> Client {
        self.client.clone()
    }

    fn scoped(&self, scope: &TenantScope) -> Result<Client, ApiError> {
        if scope.name().is_none() {
            return Ok(self.client.clone());
        }
        let cluster_url = scope.cluster_url(&self.config.cluster_url)?;
        let url = cluster_url.to_string();
        let mut clients = self
            .scoped_clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(client) = clients.get(&url) {
            return Ok(client.clone());
        }
        let mut config = self.config.clone();
        config.cluster_url = cluster_url;
        let client = Client::try_from(config).map_err(ApiError::Request)?;
        clients.insert(url, client.clone());
        Ok(client)
    }
}

fn name_of(quota: &ResourceQuota) -> Result<&str, ApiError> {
    quota
        .metadata
        .name
        .as_deref()
        .ok_or_else(|| ApiError::Rejected {
            reason: "BadRequest".to_string(),
            message: "ResourceQuota misses \".metadata.name\"".to_string(),
            code: 400,
        })
}

fn namespace_of(quota: &ResourceQuota) -> Result<&str, ApiError> {
    quota
        .metadata
        .namespace
        .as_deref()
        .ok_or_else(|| ApiError::Rejected {
            reason: "BadRequest".to_string(),
            message: "ResourceQuota misses \".metadata.namespace\"".to_string(),
            code: 400,
        })
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn get_settings(
        &self,
        scope: &TenantScope,
        namespace: &str,
        name: &str,
    ) -> Result<Settings, ApiError> {
        let api = Api::<Settings>::namespaced(self.scoped(scope)?, namespace);
        Ok(api.get(name).await?)
    }

    async fn list_settings(&self) -> Result<Vec<Settings>, ApiError> {
        let api = Api::<Settings>::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn get_quota(
        &self,
        scope: &TenantScope,
        namespace: &str,
        name: &str,
    ) -> Result<ResourceQuota, ApiError> {
        let api = Api::<ResourceQuota>::namespaced(self.scoped(scope)?, namespace);
        Ok(api.get(name).await?)
    }

    async fn create_quota(
        &self,
        scope: &TenantScope,
        quota: &ResourceQuota,
    ) -> Result<ResourceQuota, ApiError> {
        let api = Api::<ResourceQuota>::namespaced(self.scoped(scope)?, namespace_of(quota)?);
        Ok(api.create(&PostParams::default(), quota).await?)
    }

    async fn update_quota(
        &self,
        scope: &TenantScope,
        quota: &ResourceQuota,
    ) -> Result<ResourceQuota, ApiError> {
        let api = Api::<ResourceQuota>::namespaced(self.scoped(scope)?, namespace_of(quota)?);
        Ok(api.replace(name_of(quota)?, &PostParams::default(), quota).await?)
    }

    async fn patch_settings_status(
        &self,
        scope: &TenantScope,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<Settings, ApiError> {
        let api = Api::<Settings>::namespaced(self.scoped(scope)?, namespace);
        Ok(api
            .patch_status(name, &PatchParams::default(), &Patch::Merge(patch))
            .await?)
    }
}
