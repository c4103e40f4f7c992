// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "configuration.pipeline-service.io",
    version = "v1alpha1",
    kind = "Settings",
    plural = "settings"
)]
#[kube(namespaced, status = "SettingsStatus")]
pub struct SettingsSpec {}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct SettingsStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl Settings {
    pub fn conditions(&self) -> &[Condition] {
        self.status
            .as_ref()
            .map(|status| status.conditions.as_slice())
            .unwrap_or_default()
    }

    pub fn set_conditions(&mut self, conditions: Vec<Condition>) {
        self.status
            .get_or_insert_with(SettingsStatus::default)
            .conditions = conditions;
    }
}
