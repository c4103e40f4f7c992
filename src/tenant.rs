// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::error::ApiError;
use crate::Error;
use kube::ResourceExt;
use std::fmt;

pub const KCP_CLUSTER_ANNOTATION: &str = "kcp.io/cluster";
pub const LEGACY_KCP_CLUSTER_ANNOTATION: &str = "kcp.dev/cluster";

// TenantScope names the logical cluster that every API call of one reconcile
// is addressed to. An unscoped TenantScope talks to the base endpoint, which
// is what a plain (non-kcp) cluster needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TenantScope {
    cluster: Option<String>,
}

impl TenantScope {
    pub fn cluster(name: impl Into<String>) -> TenantScope {
        TenantScope {
            cluster: Some(name.into()),
        }
    }

    pub fn unscoped() -> TenantScope {
        TenantScope { cluster: None }
    }

    pub fn name(&self) -> Option<&str> {
        self.cluster.as_deref()
    }

    /// Returns the endpoint serving this logical cluster, which kcp exposes
    /// under `<base>/clusters/<name>`.
    pub fn cluster_url(&self, base: &http::Uri) -> Result<http::Uri, ApiError> {
        let cluster = match &self.cluster {
            None => return Ok(base.clone()),
            Some(cluster) => cluster,
        };
        let base = base.to_string();
        let url = format!("{}/clusters/{}", base.trim_end_matches('/'), cluster);
        url.parse::<http::Uri>()
            .map_err(|err| ApiError::InvalidScope {
                scope: cluster.clone(),
                message: err.to_string(),
            })
    }
}

impl fmt::Display for TenantScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cluster {
            Some(cluster) => write!(f, "{}", cluster),
            None => write!(f, "<unscoped>"),
        }
    }
}

/// Identifies one object to reconcile: the logical cluster it lives in plus
/// its namespace and name within that cluster.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub scope: TenantScope,
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(
        scope: TenantScope,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> ObjectKey {
        ObjectKey {
            scope,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Builds the key from an object delivered by the watch. The scope comes from
    /// the first logical-cluster annotation present on the object.
    pub fn from_object<K: ResourceExt>(
        obj: &K,
        cluster_annotations: &[String],
    ) -> Result<ObjectKey, Error> {
        let name = obj
            .meta()
            .name
            .as_ref()
            .ok_or(Error::MissingObjectKey(".metadata.name"))?;
        let namespace = obj
            .meta()
            .namespace
            .as_ref()
            .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
        Ok(ObjectKey::new(scope_of(obj, cluster_annotations), namespace, name))
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}/{}", self.scope, self.namespace, self.name)
    }
}

pub fn scope_of<K: ResourceExt>(obj: &K, cluster_annotations: &[String]) -> TenantScope {
    let annotations = obj.annotations();
    cluster_annotations
        .iter()
        .find_map(|key| annotations.get(key))
        .filter(|cluster| !cluster.is_empty())
        .map(|cluster| TenantScope::cluster(cluster.clone()))
        .unwrap_or_default()
}
