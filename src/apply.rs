// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::client::ClusterClient;
use crate::error::ApiError;
use crate::policy::QuotaIdentity;
use crate::tenant::TenantScope;
use k8s_openapi::api::core::v1::{ResourceQuota, ResourceQuotaSpec};
use kube_core::ObjectMeta;
use std::collections::BTreeMap;
use std::fmt;
use tracing::*;

/// What apply_quota did to converge the quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    Unchanged,
    Created,
    Updated,
}

impl fmt::Display for OperationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationResult::Unchanged => "unchanged",
            OperationResult::Created => "created",
            OperationResult::Updated => "updated",
        };
        f.write_str(s)
    }
}

fn make_quota(identity: &QuotaIdentity, spec: ResourceQuotaSpec) -> ResourceQuota {
    ResourceQuota {
        metadata: ObjectMeta {
            name: Some(identity.name.clone()),
            namespace: Some(identity.namespace.clone()),
            ..ObjectMeta::default()
        },
        spec: Some(spec),
        ..ResourceQuota::default()
    }
}

// The API server drops empty collections, so an empty and an absent field
// describe the same quota.
fn normalized(spec: Option<&ResourceQuotaSpec>) -> ResourceQuotaSpec {
    let mut spec = spec.cloned().unwrap_or_default();
    if spec.hard.as_ref().map_or(false, BTreeMap::is_empty) {
        spec.hard = None;
    }
    if spec.scopes.as_ref().map_or(false, Vec::is_empty) {
        spec.scopes = None;
    }
    spec
}

// Replaces the whole spec, so limits that are no longer desired disappear.
async fn update_if_changed(
    client: &dyn ClusterClient,
    scope: &TenantScope,
    observed: ResourceQuota,
    desired: ResourceQuotaSpec,
) -> Result<OperationResult, ApiError> {
    if normalized(observed.spec.as_ref()) == normalized(Some(&desired)) {
        return Ok(OperationResult::Unchanged);
    }
    let updated = ResourceQuota {
        spec: Some(desired),
        ..observed
    };
    client.update_quota(scope, &updated).await?;
    Ok(OperationResult::Updated)
}

/// Creates the quota named by `identity` if it is absent, or replaces its spec
/// when it differs from the one `desired` computes. A create that loses the
/// race against another writer falls back to the update path.
pub async fn apply_quota<F>(
    client: &dyn ClusterClient,
    scope: &TenantScope,
    identity: &QuotaIdentity,
    desired: F,
) -> Result<OperationResult, ApiError>
where
    F: FnOnce() -> ResourceQuotaSpec,
{
    let observed = match client.get_quota(scope, &identity.namespace, &identity.name).await {
        Ok(quota) => Some(quota),
        Err(err) if err.is_not_found() => None,
        Err(err) => return Err(err),
    };
    let desired = desired();

    match observed {
        Some(observed) => update_if_changed(client, scope, observed, desired).await,
        None => {
            info!("Create {}", identity.key());
            match client.create_quota(scope, &make_quota(identity, desired.clone())).await {
                Ok(_) => Ok(OperationResult::Created),
                Err(err) if err.is_already_exists() => {
                    debug!("{} was created concurrently, falling back to update", identity.key());
                    let observed = client
                        .get_quota(scope, &identity.namespace, &identity.name)
                        .await?;
                    update_if_changed(client, scope, observed, desired).await
                }
                Err(err) => Err(err),
            }
        }
    }
}
