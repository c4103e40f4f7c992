// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::config::QuotaConfig;
use crate::tenant::TenantScope;
use k8s_openapi::api::core::v1::ResourceQuotaSpec;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;

/// Where the dependent ResourceQuota lives inside each logical cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaIdentity {
    pub namespace: String,
    pub name: String,
}

impl QuotaIdentity {
    pub fn key(&self) -> String {
        format!("ResourceQuota/{}/{}", self.namespace, self.name)
    }
}

// QuotaPolicy decides what the ResourceQuota of a logical cluster should look like.
pub trait QuotaPolicy: Send + Sync {
    fn identity(&self) -> QuotaIdentity;
    fn desired_spec(&self, scope: &TenantScope) -> ResourceQuotaSpec;
}

/// A policy read from configuration: one default set of hard limits, replaced
/// wholesale for the logical clusters that have an override.
#[derive(Debug, Clone)]
pub struct StaticQuotaPolicy {
    identity: QuotaIdentity,
    hard: BTreeMap<String, Quantity>,
    tenant_overrides: BTreeMap<String, BTreeMap<String, Quantity>>,
}

impl StaticQuotaPolicy {
    pub fn from_config(config: &QuotaConfig) -> StaticQuotaPolicy {
        StaticQuotaPolicy {
            identity: QuotaIdentity {
                namespace: config.namespace.clone(),
                name: config.name.clone(),
            },
            hard: config.hard.clone(),
            tenant_overrides: config.tenant_overrides.clone(),
        }
    }
}

impl QuotaPolicy for StaticQuotaPolicy {
    fn identity(&self) -> QuotaIdentity {
        self.identity.clone()
    }

    fn desired_spec(&self, scope: &TenantScope) -> ResourceQuotaSpec {
        let hard = scope
            .name()
            .and_then(|cluster| self.tenant_overrides.get(cluster))
            .unwrap_or(&self.hard);
        ResourceQuotaSpec {
            hard: Some(hard.clone()),
            ..ResourceQuotaSpec::default()
        }
    }
}
