// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT

// Turns watch events into reconciles. kube-runtime's Controller identifies an
// object by namespace and name, which collapses same-named Settings of
// different logical clusters into one entry. Here every trigger is keyed by
// ObjectKey, so each (cluster, namespace, name) is tracked and reconciled on
// its own. Reconciles of one key never overlap; triggers that arrive while
// the key is being reconciled are folded into one follow-up run. Different
// keys are reconciled concurrently.
use crate::policy::QuotaIdentity;
use crate::reconciler::SettingsReconciler;
use crate::settings_types::Settings;
use crate::tenant::{scope_of, ObjectKey, TenantScope};
use crate::Error;
use k8s_openapi::api::core::v1::ResourceQuota;
use kube::runtime::watcher::Event;
use kube::ResourceExt;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::*;

/// The Settings objects known from the watch, keyed per logical cluster.
#[derive(Debug, Default)]
pub struct SettingsIndex {
    keys: BTreeSet<ObjectKey>,
}

fn key_of(settings: &Settings, cluster_annotations: &[String]) -> Option<ObjectKey> {
    match ObjectKey::from_object(settings, cluster_annotations) {
        Ok(key) => Some(key),
        Err(err) => {
            warn!(error = %err, "Skipping Settings without a complete key");
            None
        }
    }
}

impl SettingsIndex {
    pub fn keys(&self) -> impl Iterator<Item = &ObjectKey> {
        self.keys.iter()
    }

    /// Records a Settings watch event and returns the keys to reconcile.
    pub fn on_settings_event(
        &mut self,
        event: Event<Settings>,
        cluster_annotations: &[String],
    ) -> Vec<ObjectKey> {
        match event {
            Event::Applied(settings) => match key_of(&settings, cluster_annotations) {
                Some(key) => {
                    self.keys.insert(key.clone());
                    vec![key]
                }
                None => Vec::new(),
            },
            Event::Deleted(settings) => {
                if let Some(key) = key_of(&settings, cluster_annotations) {
                    self.keys.remove(&key);
                }
                Vec::new()
            }
            Event::Restarted(all) => {
                self.keys = all
                    .iter()
                    .filter_map(|settings| key_of(settings, cluster_annotations))
                    .collect();
                self.keys.iter().cloned().collect()
            }
        }
    }

    /// Maps a quota watch event to the Settings of the logical clusters the
    /// quota belongs to. Quotas other than `identity` are ignored.
    pub fn on_quota_event(
        &self,
        event: Event<ResourceQuota>,
        identity: &QuotaIdentity,
        cluster_annotations: &[String],
    ) -> Vec<ObjectKey> {
        let quotas = match event {
            Event::Applied(quota) | Event::Deleted(quota) => vec![quota],
            Event::Restarted(quotas) => quotas,
        };
        let scopes = quotas
            .iter()
            .filter(|quota| {
                quota.namespace().as_deref() == Some(identity.namespace.as_str())
                    && quota.name_any() == identity.name
            })
            .map(|quota| scope_of(quota, cluster_annotations))
            .collect::<BTreeSet<TenantScope>>();
        self.keys
            .iter()
            .filter(|key| scopes.contains(&key.scope))
            .cloned()
            .collect()
    }
}

pub fn report_reconciled(key: &ObjectKey, result: &Result<Option<Duration>, Error>) {
    match result {
        Ok(_) => {
            tracing::info!(object = %key, "Reconciled object");
        }
        Err(err) => {
            tracing::error!(
                object = %key,
                error = err as &dyn std::error::Error,
                "Failed to reconcile object",
            );
        }
    }
}

/// Runs reconciles for the keys it is triggered with.
pub struct Dispatcher {
    reconciler: SettingsReconciler,
    error_requeue: Duration,
    // Keys being reconciled, each with whether another run was requested meanwhile.
    workers: Mutex<BTreeMap<ObjectKey, bool>>,
    idle: Notify,
}

impl Dispatcher {
    pub fn new(reconciler: SettingsReconciler, error_requeue: Duration) -> Arc<Dispatcher> {
        Arc::new(Dispatcher {
            reconciler,
            error_requeue,
            workers: Mutex::new(BTreeMap::new()),
            idle: Notify::new(),
        })
    }

    fn workers(&self) -> MutexGuard<'_, BTreeMap<ObjectKey, bool>> {
        self.workers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Schedules a reconcile of `key`. If `key` is being reconciled right now,
    /// one more run is queued after the current one.
    pub fn trigger(self: &Arc<Self>, key: ObjectKey) {
        {
            let mut workers = self.workers();
            if let Some(pending) = workers.get_mut(&key) {
                *pending = true;
                return;
            }
            workers.insert(key.clone(), false);
        }
        let dispatcher = self.clone();
        tokio::spawn(async move { dispatcher.work(key).await });
    }

    fn requeue(self: &Arc<Self>, key: ObjectKey, after: Duration) {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            dispatcher.trigger(key);
        });
    }

    async fn work(self: Arc<Self>, key: ObjectKey) {
        loop {
            let result = self.reconciler.reconcile(&key).await;
            report_reconciled(&key, &result);
            match result {
                Ok(Some(after)) => self.requeue(key.clone(), after),
                Ok(None) => {}
                Err(_) => self.requeue(key.clone(), self.error_requeue),
            }

            let again = {
                let mut workers = self.workers();
                match workers.get_mut(&key) {
                    Some(pending) if *pending => {
                        *pending = false;
                        true
                    }
                    _ => {
                        workers.remove(&key);
                        false
                    }
                }
            };
            if !again {
                break;
            }
        }
        self.idle.notify_waiters();
    }

    /// Resolves once no key is being reconciled.
    #[cfg(test)]
    pub async fn wait_idle(&self) {
        loop {
            let idle = self.idle.notified();
            if self.workers().is_empty() {
                return;
            }
            idle.await;
        }
    }
}
