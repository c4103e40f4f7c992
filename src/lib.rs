// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
pub mod apply;
pub mod client;
pub mod conditions;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod patch;
pub mod policy;
pub mod reconciler;
pub mod settings_types;
pub mod tenant;
pub mod trigger;

#[cfg(test)]
pub mod testing;

use crate::error::ApiError;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to get Settings: {0}")]
    SettingsGetFailed(#[source] ApiError),
    #[error("Failed to reconcile ResourceQuota: {0}")]
    ReconcileQuotaFailed(#[source] ApiError),
    #[error("Failed to patch Settings status: {0}")]
    StatusPatchFailed(#[source] ApiError),
    #[error("Failed to build status patch: {0}")]
    StatusPatchBuildFailed(#[source] serde_json::Error),
    #[error("MissingObjectKey: {0}")]
    MissingObjectKey(&'static str),
    #[error("Reconcile did not finish within {0:?}")]
    Timeout(Duration),
}
