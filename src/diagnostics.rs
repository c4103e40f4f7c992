// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::client::ClusterClient;
use crate::error::ApiError;
use crate::tenant::scope_of;
use std::collections::BTreeMap;

/// Counts the Settings objects of every logical cluster the endpoint serves,
/// keyed by the displayed tenant scope. Read-only; reconciliation never uses it.
pub async fn settings_per_cluster(
    client: &dyn ClusterClient,
    cluster_annotations: &[String],
) -> Result<BTreeMap<String, usize>, ApiError> {
    let mut counts = BTreeMap::new();
    for settings in client.list_settings().await? {
        *counts
            .entry(scope_of(&settings, cluster_annotations).to_string())
            .or_insert(0) += 1;
    }
    Ok(counts)
}
