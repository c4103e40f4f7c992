// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::apply::apply_quota;
use crate::client::ClusterClient;
use crate::conditions::{merge_condition, quota_ready_condition};
use crate::patch::status_patch;
use crate::policy::QuotaPolicy;
use crate::settings_types::Settings;
use crate::tenant::ObjectKey;
use crate::Error;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use k8s_openapi::chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::*;

/// Drives the ResourceQuota of a logical cluster from its Settings objects and
/// reports the outcome as the QuotaReady condition.
///
/// Nothing is cached across invocations: every call re-reads the Settings
/// object and the quota, so redelivered or reordered triggers converge to the
/// same state.
pub struct SettingsReconciler {
    client: Arc<dyn ClusterClient>,
    policy: Arc<dyn QuotaPolicy>,
    timeout: Duration,
    resync: Option<Duration>,
}

impl SettingsReconciler {
    pub fn new(
        client: Arc<dyn ClusterClient>,
        policy: Arc<dyn QuotaPolicy>,
        timeout: Duration,
        resync: Option<Duration>,
    ) -> SettingsReconciler {
        SettingsReconciler {
            client,
            policy,
            timeout,
            resync,
        }
    }

    /// Reconciles the Settings object named by `key`. Returns when to requeue
    /// on success; errors are meant to be retried with backoff.
    #[instrument(
        skip(self, key),
        fields(cluster = %key.scope, namespace = %key.namespace, name = %key.name)
    )]
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<Option<Duration>, Error> {
        match tokio::time::timeout(self.timeout, self.reconcile_once(key)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(self.timeout)),
        }
    }

    async fn reconcile_once(&self, key: &ObjectKey) -> Result<Option<Duration>, Error> {
        let scope = &key.scope;

        info!("Getting Settings");
        let settings = match self.client.get_settings(scope, &key.namespace, &key.name).await {
            Ok(settings) => settings,
            Err(err) if err.is_not_found() => {
                info!("Settings not found, end reconcile");
                return Ok(None);
            }
            Err(err) => return Err(Error::SettingsGetFailed(err)),
        };
        let snapshot = settings.clone();

        let identity = self.policy.identity();
        let outcome = apply_quota(self.client.as_ref(), scope, &identity, || {
            self.policy.desired_spec(scope)
        })
        .await;
        match &outcome {
            Ok(result) => info!(resource_quota = %identity.key(), "{}", result),
            Err(err) => error!(
                resource_quota = %identity.key(),
                error = %err,
                "unable to create or patch the ResourceQuota"
            ),
        }

        let condition = quota_ready_condition(
            &outcome,
            &identity,
            snapshot.metadata.generation,
            Time(Utc::now()),
        );
        let (conditions, changed) = merge_condition(snapshot.conditions(), condition);

        let patch_result = if changed {
            info!("Patching Settings status to store the new condition(s)");
            self.patch_status(key, &snapshot, conditions).await
        } else {
            debug!("Conditions unchanged, skip status patch");
            Ok(())
        };

        // An apply failure takes precedence over a failed status patch.
        outcome.map_err(Error::ReconcileQuotaFailed)?;
        patch_result?;
        Ok(self.resync)
    }

    async fn patch_status(
        &self,
        key: &ObjectKey,
        snapshot: &Settings,
        conditions: Vec<Condition>,
    ) -> Result<(), Error> {
        let mut modified = snapshot.clone();
        modified.set_conditions(conditions);
        let patch = status_patch(snapshot, &modified).map_err(Error::StatusPatchBuildFailed)?;
        match self
            .client
            .patch_settings_status(&key.scope, &key.namespace, &key.name, &patch)
            .await
        {
            Ok(_) => Ok(()),
            Err(err) => {
                warn!(error = %err, "Patch error");
                Err(Error::StatusPatchFailed(err))
            }
        }
    }
}
