// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT

// FakeCluster is an in-memory API server for tests. It keeps objects keyed by
// (logical cluster, namespace, name), assigns a fresh resource_version on every
// write, and validates updates and status patches against it the way the API
// server does: a stale resource_version is rejected with a Conflict.
use crate::client::ClusterClient;
use crate::error::ApiError;
use crate::policy::QuotaIdentity;
use crate::settings_types::Settings;
use crate::tenant::TenantScope;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ResourceQuota;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

type Key = (TenantScope, String, String);

#[derive(Default)]
struct State {
    settings: BTreeMap<Key, Settings>,
    quotas: BTreeMap<Key, ResourceQuota>,
    resource_version_counter: u64,
    settings_gets: usize,
    quota_writes: usize,
    status_patches: usize,
    quota_create_failure: Option<(String, u16)>,
    status_patch_failure: Option<(String, u16)>,
    racing_quota: Option<(TenantScope, ResourceQuota)>,
    touch_before_status_patch: bool,
}

impl State {
    fn next_resource_version(&mut self) -> String {
        self.resource_version_counter += 1;
        self.resource_version_counter.to_string()
    }
}

#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<State>,
    read_delay: Mutex<Option<Duration>>,
}

fn key(scope: &TenantScope, namespace: &str, name: &str) -> Key {
    (scope.clone(), namespace.to_string(), name.to_string())
}

fn quota_key(scope: &TenantScope, quota: &ResourceQuota) -> Key {
    key(
        scope,
        quota.metadata.namespace.as_deref().unwrap_or_default(),
        quota.metadata.name.as_deref().unwrap_or_default(),
    )
}

fn not_found(resource: &str, name: &str) -> ApiError {
    ApiError::ObjectNotFound(format!("{} \"{}\" not found", resource, name))
}

fn rejected(failure: &(String, u16)) -> ApiError {
    ApiError::Rejected {
        reason: failure.0.clone(),
        message: "injected failure".to_string(),
        code: failure.1,
    }
}

impl FakeCluster {
    pub fn new() -> FakeCluster {
        FakeCluster::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    async fn simulate_latency(&self) {
        let delay = *self.read_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    pub fn insert_settings(&self, scope: &TenantScope, mut settings: Settings) -> Settings {
        let mut state = self.lock();
        settings.metadata.resource_version = Some(state.next_resource_version());
        settings.metadata.generation.get_or_insert(1);
        let namespace = settings.metadata.namespace.clone().unwrap_or_default();
        let name = settings.metadata.name.clone().unwrap_or_default();
        state.settings.insert(key(scope, &namespace, &name), settings.clone());
        settings
    }

    pub fn settings(&self, scope: &TenantScope, namespace: &str, name: &str) -> Option<Settings> {
        self.lock().settings.get(&key(scope, namespace, name)).cloned()
    }

    /// Simulates another actor writing the Settings object.
    pub fn touch_settings(&self, scope: &TenantScope, namespace: &str, name: &str) {
        let mut state = self.lock();
        let resource_version = state.next_resource_version();
        if let Some(settings) = state.settings.get_mut(&key(scope, namespace, name)) {
            settings.metadata.resource_version = Some(resource_version);
        }
    }

    pub fn insert_quota(&self, scope: &TenantScope, mut quota: ResourceQuota) -> ResourceQuota {
        let mut state = self.lock();
        quota.metadata.resource_version = Some(state.next_resource_version());
        state.quotas.insert(quota_key(scope, &quota), quota.clone());
        quota
    }

    pub fn quota(&self, scope: &TenantScope, identity: &QuotaIdentity) -> Option<ResourceQuota> {
        self.lock()
            .quotas
            .get(&key(scope, &identity.namespace, &identity.name))
            .cloned()
    }

    pub fn settings_gets(&self) -> usize {
        self.lock().settings_gets
    }

    pub fn quota_writes(&self) -> usize {
        self.lock().quota_writes
    }

    pub fn status_patches(&self) -> usize {
        self.lock().status_patches
    }

    pub fn fail_quota_creates(&self, reason: &str, code: u16) {
        self.lock().quota_create_failure = Some((reason.to_string(), code));
    }

    pub fn fail_status_patches(&self, reason: &str, code: u16) {
        self.lock().status_patch_failure = Some((reason.to_string(), code));
    }

    /// The next create_quota finds `quota` already stored, as if another writer won the race.
    pub fn create_quota_before_next_create(&self, scope: &TenantScope, quota: ResourceQuota) {
        self.lock().racing_quota = Some((scope.clone(), quota));
    }

    /// The next status patch finds the Settings object modified since it was read.
    pub fn touch_settings_before_next_status_patch(&self) {
        self.lock().touch_before_status_patch = true;
    }

    pub fn delay_reads(&self, delay: Duration) {
        *self.read_delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn get_settings(
        &self,
        scope: &TenantScope,
        namespace: &str,
        name: &str,
    ) -> Result<Settings, ApiError> {
        self.simulate_latency().await;
        let mut state = self.lock();
        state.settings_gets += 1;
        state
            .settings
            .get(&key(scope, namespace, name))
            .cloned()
            .ok_or_else(|| not_found("settings", name))
    }

    async fn list_settings(&self) -> Result<Vec<Settings>, ApiError> {
        self.simulate_latency().await;
        Ok(self.lock().settings.values().cloned().collect())
    }

    async fn get_quota(
        &self,
        scope: &TenantScope,
        namespace: &str,
        name: &str,
    ) -> Result<ResourceQuota, ApiError> {
        self.simulate_latency().await;
        self.lock()
            .quotas
            .get(&key(scope, namespace, name))
            .cloned()
            .ok_or_else(|| not_found("resourcequotas", name))
    }

    async fn create_quota(
        &self,
        scope: &TenantScope,
        quota: &ResourceQuota,
    ) -> Result<ResourceQuota, ApiError> {
        let mut state = self.lock();
        if let Some((racing_scope, mut racing)) = state.racing_quota.take() {
            racing.metadata.resource_version = Some(state.next_resource_version());
            state.quotas.insert(quota_key(&racing_scope, &racing), racing);
        }
        if let Some(failure) = &state.quota_create_failure {
            return Err(rejected(failure));
        }
        let key = quota_key(scope, quota);
        if state.quotas.contains_key(&key) {
            return Err(ApiError::ObjectAlreadyExists(format!(
                "resourcequotas \"{}\" already exists",
                key.2
            )));
        }
        let mut created = quota.clone();
        created.metadata.resource_version = Some(state.next_resource_version());
        state.quotas.insert(key, created.clone());
        state.quota_writes += 1;
        Ok(created)
    }

    async fn update_quota(
        &self,
        scope: &TenantScope,
        quota: &ResourceQuota,
    ) -> Result<ResourceQuota, ApiError> {
        let mut state = self.lock();
        let key = quota_key(scope, quota);
        let current = state
            .quotas
            .get(&key)
            .ok_or_else(|| not_found("resourcequotas", &key.2))?;
        if quota.metadata.resource_version.is_some()
            && quota.metadata.resource_version != current.metadata.resource_version
        {
            return Err(ApiError::Conflict("the object has been modified".to_string()));
        }
        let mut updated = ResourceQuota {
            status: current.status.clone(),
            ..quota.clone()
        };
        updated.metadata.resource_version = Some(state.next_resource_version());
        state.quotas.insert(key, updated.clone());
        state.quota_writes += 1;
        Ok(updated)
    }

    async fn patch_settings_status(
        &self,
        scope: &TenantScope,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<Settings, ApiError> {
        let mut state = self.lock();
        let key = key(scope, namespace, name);
        if std::mem::take(&mut state.touch_before_status_patch) {
            let resource_version = state.next_resource_version();
            if let Some(settings) = state.settings.get_mut(&key) {
                settings.metadata.resource_version = Some(resource_version);
            }
        }
        if let Some(failure) = &state.status_patch_failure {
            return Err(rejected(failure));
        }
        let current = state
            .settings
            .get(&key)
            .ok_or_else(|| not_found("settings", name))?;
        if let Some(expected) = patch.pointer("/metadata/resourceVersion") {
            if current.metadata.resource_version.as_deref() != expected.as_str() {
                return Err(ApiError::Conflict("the object has been modified".to_string()));
            }
        }

        let invalid = |err: serde_json::Error| ApiError::Rejected {
            reason: "Invalid".to_string(),
            message: err.to_string(),
            code: 422,
        };
        let mut status = serde_json::to_value(&current.status).map_err(invalid)?;
        if let Some(status_patch) = patch.get("status") {
            json_patch::merge(&mut status, status_patch);
        }
        let mut patched = current.clone();
        patched.status = serde_json::from_value(status).map_err(invalid)?;
        patched.metadata.resource_version = Some(state.next_resource_version());
        state.settings.insert(key, patched.clone());
        state.status_patches += 1;
        Ok(patched)
    }
}
