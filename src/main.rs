// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT

use anyhow::Result;
use futures::{stream, StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::ResourceQuota;
use kube::{
    api::{Api, ListParams},
    runtime::watcher::{self, watcher},
    Config, CustomResourceExt,
};
use settings_controller::client::KubeClusterClient;
use settings_controller::config::ControllerConfig;
use settings_controller::diagnostics::settings_per_cluster;
use settings_controller::policy::{QuotaPolicy, StaticQuotaPolicy};
use settings_controller::reconciler::SettingsReconciler;
use settings_controller::settings_types::Settings;
use settings_controller::trigger::{Dispatcher, SettingsIndex};
use std::path::Path;
use std::{env, sync::Arc};
use tracing::*;

enum WatchEvent {
    Settings(watcher::Event<Settings>),
    Quota(watcher::Event<ResourceQuota>),
}

async fn run(config: ControllerConfig) -> Result<()> {
    let cluster_client = Arc::new(KubeClusterClient::new(Config::infer().await?)?);
    let client = cluster_client.client();
    let policy = Arc::new(StaticQuotaPolicy::from_config(&config.quota));
    let identity = policy.identity();
    let dispatcher = Dispatcher::new(
        SettingsReconciler::new(
            cluster_client,
            policy,
            config.reconcile_timeout(),
            config.resync(),
        ),
        config.error_requeue(),
    );

    let quota_lp = ListParams::default().fields(&format!("metadata.name={}", identity.name));
    let mut events = stream::select(
        watcher(Api::<Settings>::all(client.clone()), ListParams::default())
            .map_ok(WatchEvent::Settings)
            .boxed(),
        watcher(Api::<ResourceQuota>::all(client), quota_lp)
            .map_ok(WatchEvent::Quota)
            .boxed(),
    );
    let mut index = SettingsIndex::default();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!("watching Settings and {}", identity.key());
    loop {
        let event = tokio::select! {
            _ = &mut shutdown => break,
            event = events.next() => event,
        };
        let keys = match event {
            Some(Ok(WatchEvent::Settings(event))) => {
                index.on_settings_event(event, &config.cluster_annotations)
            }
            Some(Ok(WatchEvent::Quota(event))) => {
                index.on_quota_event(event, &identity, &config.cluster_annotations)
            }
            Some(Err(err)) => {
                warn!(error = %err, "Watch failed, retrying");
                tokio::time::sleep(config.error_requeue()).await;
                continue;
            }
            None => break,
        };
        for key in keys {
            dispatcher.trigger(key);
        }
    }
    info!("controller terminated");
    Ok(())
}

async fn list(config: ControllerConfig) -> Result<()> {
    let cluster_client = KubeClusterClient::new(Config::infer().await?)?;
    let counts = settings_per_cluster(&cluster_client, &config.cluster_annotations).await?;
    info!(
        "Listed all Settings across all workspaces, count: {}",
        counts.values().sum::<usize>()
    );
    for (cluster, count) in counts {
        info!(cluster = %cluster, count, "Settings in logical cluster");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let cmd = args.get(1).map(String::as_str).unwrap_or_default();
    let config_path = args.get(2).map(Path::new);
    if cmd == "export" {
        info!("exporting custom resource definition");
        println!("{}", serde_yaml::to_string(&Settings::crd())?);
    } else if cmd == "run" {
        info!("running settings-controller");
        run(ControllerConfig::load(config_path)?).await?;
    } else if cmd == "list" {
        list(ControllerConfig::load(config_path)?).await?;
    } else {
        warn!("wrong command; please use \"export\", \"run\" or \"list\"");
    }
    Ok(())
}
