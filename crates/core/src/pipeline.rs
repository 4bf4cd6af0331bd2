use crate::config::{self, AppConfig};
use crate::events::EventSink;
use crate::jobs::PollingJobWaiter;
use crate::paths::PathMutationTable;
use crate::permissions::{NormalizeReport, PermissionNormalizer};
use crate::poller::Cycle;
use crate::rescan::{RescanError, RescanReport, RescanSettings, RescanTrigger};
use anyhow::Context;
use providers::ai_tagger::{AiTaggerClient, AiTaggerConfig};
use providers::noop::DisabledTagger;
use providers::stash::{StashClient, StashConfig};
use providers::{HealthProbe, LibraryServer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

/// Everything the watcher and the poller act through: the permission pass
/// over the configured roots and the rescan trigger.
pub struct Pipeline {
    server: Arc<dyn LibraryServer>,
    normalizer: PermissionNormalizer,
    permission_roots: Vec<PathBuf>,
    trigger: RescanTrigger,
}

impl Pipeline {
    pub fn new(
        server: Arc<dyn LibraryServer>,
        normalizer: PermissionNormalizer,
        permission_roots: Vec<PathBuf>,
        trigger: RescanTrigger,
    ) -> Self {
        Self {
            server,
            normalizer,
            permission_roots,
            trigger,
        }
    }

    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let server: Arc<dyn LibraryServer> = build_server(config)?;
        let normalizer = PermissionNormalizer::new(config.permissions.uid, config.permissions.gid);
        let roots = config
            .permissions
            .roots
            .iter()
            .map(PathBuf::from)
            .collect();
        let trigger = build_trigger(config, server.clone());
        Ok(Self::new(server, normalizer, roots, trigger))
    }

    pub fn server(&self) -> Arc<dyn LibraryServer> {
        self.server.clone()
    }

    /// Full permission pass, run off the async executor.
    pub async fn fix_permissions(&self) -> anyhow::Result<NormalizeReport> {
        let normalizer = self.normalizer;
        let roots = self.permission_roots.clone();
        let report = tokio::task::spawn_blocking(move || normalizer.normalize(&roots))
            .await
            .context("permission pass panicked")?;
        Ok(report)
    }

    pub async fn rescan(&self, paths: &[PathBuf]) -> Result<RescanReport, RescanError> {
        self.trigger.run(paths).await
    }
}

#[async_trait::async_trait]
impl EventSink for Pipeline {
    fn normalize_one(&self, path: &Path) {
        self.normalizer.normalize_one(path);
    }

    async fn rescan(&self, paths: Vec<PathBuf>) -> anyhow::Result<()> {
        self.trigger.run(&paths).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Cycle for Pipeline {
    async fn run_cycle(&self) -> anyhow::Result<()> {
        self.fix_permissions().await?;
        self.trigger.run(&[]).await.context("scheduled rescan")?;
        Ok(())
    }
}

pub fn build_server(config: &AppConfig) -> anyhow::Result<Arc<StashClient>> {
    let client = StashClient::new(StashConfig {
        base_url: config.stash.base_url.clone(),
        api_key: config.stash.api_key.clone(),
        accept_invalid_certs: config.stash.accept_invalid_certs,
    })
    .context("building stash client")?;
    Ok(Arc::new(client))
}

/// AI tagger URL and path rewrites, preferring the plugin's own config file
/// when one is configured and readable.
pub fn resolve_ai_tagger(config: &AppConfig) -> (Option<String>, PathMutationTable) {
    let settings = &config.ai_tagger;
    let mut base_url = settings.base_url.clone();
    let mut rules = settings.path_mutation.clone();
    if let Some(path) = &settings.plugin_config {
        match config::load_plugin_config(path) {
            Ok(plugin) => {
                if plugin.api_base_url.is_some() {
                    base_url = plugin.api_base_url;
                }
                if !plugin.path_mutation.is_empty() {
                    rules = plugin.path_mutation;
                }
            }
            Err(e) => error!("failed to load ai tagger config {}: {:#}", path, e),
        }
    }
    (base_url, PathMutationTable::new(rules))
}

pub fn build_tagger(config: &AppConfig, base_url: Option<String>) -> Arc<dyn HealthProbe> {
    match base_url {
        Some(url) if !url.is_empty() => Arc::new(AiTaggerClient::new(AiTaggerConfig {
            base_url: url,
            timeout: config.ai_tagger.health_timeout(),
        })),
        _ => Arc::new(DisabledTagger),
    }
}

pub fn build_trigger(config: &AppConfig, server: Arc<dyn LibraryServer>) -> RescanTrigger {
    let (tagger_url, mutations) = resolve_ai_tagger(config);
    if !mutations.is_empty() {
        info!("path mutations: {:?}", mutations.rules());
    }
    let waiter = Arc::new(PollingJobWaiter::new(
        server.clone(),
        config.jobs.period(),
        config.jobs.timeout(),
    ));
    RescanTrigger::new(server, waiter, RescanSettings::from_config(config))
        .with_tagger(build_tagger(config, tagger_url))
        .with_mutations(mutations)
}
