// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::settings_types::Settings;
use serde_json::{json, Value};

/// Builds the JSON merge patch that writes the status of `modified`.
///
/// The status is sent whole, so the condition list replaces the stored one.
/// The snapshot's resourceVersion is attached as a precondition, so the API
/// server rejects the patch with a Conflict if the object changed after the
/// snapshot was taken.
pub fn status_patch(snapshot: &Settings, modified: &Settings) -> Result<Value, serde_json::Error> {
    let status = serde_json::to_value(&modified.status)?;
    Ok(match &snapshot.metadata.resource_version {
        Some(resource_version) => json!({
            "metadata": { "resourceVersion": resource_version },
            "status": status,
        }),
        None => json!({ "status": status }),
    })
}
