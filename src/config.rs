// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::tenant::{KCP_CLUSTER_ANNOTATION, LEGACY_KCP_CLUSTER_ANNOTATION};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_PATH_ENV: &str = "SETTINGS_CONTROLLER_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    ParseFailed {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Controller configuration. Every field has a default, so running without a
/// config file reconciles `kcp-system/quota` with `count/namespace: 10`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControllerConfig {
    pub quota: QuotaConfig,
    pub cluster_annotations: Vec<String>,
    pub reconcile_timeout_secs: u64,
    pub error_requeue_secs: u64,
    pub resync_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuotaConfig {
    pub namespace: String,
    pub name: String,
    pub hard: BTreeMap<String, Quantity>,
    pub tenant_overrides: BTreeMap<String, BTreeMap<String, Quantity>>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            quota: QuotaConfig::default(),
            cluster_annotations: vec![
                KCP_CLUSTER_ANNOTATION.to_string(),
                LEGACY_KCP_CLUSTER_ANNOTATION.to_string(),
            ],
            reconcile_timeout_secs: 30,
            error_requeue_secs: 10,
            resync_secs: None,
        }
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        QuotaConfig {
            namespace: "kcp-system".to_string(),
            name: "quota".to_string(),
            hard: BTreeMap::from([("count/namespace".to_string(), Quantity("10".to_string()))]),
            tenant_overrides: BTreeMap::new(),
        }
    }
}

impl ControllerConfig {
    pub fn from_yaml(path: &str, yaml: &str) -> Result<ControllerConfig, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|source| ConfigError::ParseFailed {
            path: path.to_string(),
            source,
        })
    }

    /// Loads the configuration from `path`, or from the file named by
    /// `SETTINGS_CONTROLLER_CONFIG`, falling back to the defaults.
    pub fn load(path: Option<&Path>) -> Result<ControllerConfig, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match std::env::var_os(CONFIG_PATH_ENV) {
                Some(path) => path.into(),
                None => return Ok(ControllerConfig::default()),
            },
        };
        let display = path.display().to_string();
        let yaml = std::fs::read_to_string(&path).map_err(|source| ConfigError::ReadFailed {
            path: display.clone(),
            source,
        })?;
        ControllerConfig::from_yaml(&display, &yaml)
    }

    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_secs)
    }

    pub fn error_requeue(&self) -> Duration {
        Duration::from_secs(self.error_requeue_secs)
    }

    pub fn resync(&self) -> Option<Duration> {
        self.resync_secs.map(Duration::from_secs)
    }
}
