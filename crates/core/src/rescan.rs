//! Rescan trigger: asks the server to rescan changed paths, waits for the
//! scan, then runs the post-scan maintenance pipeline.

use crate::config::{AiTaggerSettings, AppConfig, DuplicateConfig, IdentifyConfig, TaggingConfig};
use crate::jobs::{JobWaitError, JobWaiter};
use crate::paths::{scan_targets, PathMutationTable};
use providers::noop::DisabledTagger;
use providers::{
    FindFilter, HealthProbe, JobStatus, LibraryServer, ProviderError, Scene, SceneFilter,
};
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use storage::ShunnedSceneStore;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum RescanError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Wait(#[from] JobWaitError),
    #[error("scan job {job_id} did not finish")]
    ScanNotFinished { job_id: String },
    #[error("{task} job {job_id} did not finish")]
    TaskNotFinished { task: &'static str, job_id: String },
    #[error("tag {0:?} does not exist")]
    MissingTag(String),
}

#[derive(Debug, Clone)]
pub struct RescanSettings {
    pub duplicates: DuplicateConfig,
    pub identify: IdentifyConfig,
    pub tagging: TaggingConfig,
    pub plugin_id: String,
    pub task_name: String,
}

impl Default for RescanSettings {
    fn default() -> Self {
        let ai = AiTaggerSettings::default();
        Self {
            duplicates: DuplicateConfig::default(),
            identify: IdentifyConfig::default(),
            tagging: TaggingConfig::default(),
            plugin_id: ai.plugin_id,
            task_name: ai.task_name,
        }
    }
}

impl RescanSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            duplicates: cfg.duplicates.clone(),
            identify: cfg.identify.clone(),
            tagging: cfg.tagging.clone(),
            plugin_id: cfg.ai_tagger.plugin_id.clone(),
            task_name: cfg.ai_tagger.task_name.clone(),
        }
    }
}

/// What one invocation did. Stages that failed leave their fields empty.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RescanReport {
    pub scan_paths: Vec<String>,
    pub scan_job: String,
    pub deleted_duplicates: Vec<String>,
    /// Scene IDs submitted for identification.
    pub identified: Vec<String>,
    /// Submitted IDs that were still unorganized afterwards.
    pub shunned: Vec<String>,
    pub tagged: usize,
    pub ai_tagger_ran: bool,
    pub generate_job: Option<String>,
}

#[derive(Debug, Default)]
struct IdentifyOutcome {
    submitted: Vec<String>,
    shunned: Vec<String>,
}

pub struct RescanTrigger {
    server: Arc<dyn LibraryServer>,
    waiter: Arc<dyn JobWaiter>,
    tagger: Arc<dyn HealthProbe>,
    mutations: PathMutationTable,
    shunned: ShunnedSceneStore,
    settings: RescanSettings,
}

impl RescanTrigger {
    pub fn new(
        server: Arc<dyn LibraryServer>,
        waiter: Arc<dyn JobWaiter>,
        settings: RescanSettings,
    ) -> Self {
        let shunned = ShunnedSceneStore::new(&settings.identify.shunned_path);
        Self {
            server,
            waiter,
            tagger: Arc::new(DisabledTagger),
            mutations: PathMutationTable::default(),
            shunned,
            settings,
        }
    }

    pub fn with_tagger(mut self, tagger: Arc<dyn HealthProbe>) -> Self {
        self.tagger = tagger;
        self
    }

    pub fn with_mutations(mut self, mutations: PathMutationTable) -> Self {
        self.mutations = mutations;
        self
    }

    /// Rescans the directories covering `paths` (everything when empty).
    ///
    /// A scan that times out or ends unfinished is an error and skips the
    /// post-scan stages. Each post-scan stage is independent: a failure is
    /// logged and the next stage still runs.
    pub async fn run(&self, paths: &[PathBuf]) -> Result<RescanReport, RescanError> {
        let scan_paths = scan_targets(paths, &self.mutations);
        info!("scanning {} path(s): {:?}", scan_paths.len(), scan_paths);
        let scan_job = self.server.metadata_scan(&scan_paths).await?;
        if !self
            .waiter
            .wait_for_job(&scan_job, JobStatus::Finished)
            .await?
        {
            return Err(RescanError::ScanNotFinished { job_id: scan_job });
        }

        let mut report = RescanReport {
            scan_paths,
            scan_job,
            ..Default::default()
        };

        match self.prune_duplicates().await {
            Ok(ids) => report.deleted_duplicates = ids,
            Err(e) => error!("duplicate pruning failed: {}", e),
        }
        match self.identify_unorganized().await {
            Ok(outcome) => {
                report.identified = outcome.submitted;
                report.shunned = outcome.shunned;
            }
            Err(e) => error!("identifying unorganized scenes failed: {}", e),
        }
        match self.tag_pending().await {
            Ok(n) => report.tagged = n,
            Err(e) => error!(
                "failed to add {} tag to untagged scenes: {}",
                self.settings.tagging.pending_tag, e
            ),
        }
        match self.hand_off_to_ai_tagger().await {
            Ok(ran) => report.ai_tagger_ran = ran,
            Err(e) => error!("ai tagger task failed: {}", e),
        }
        info!("generating metadata");
        match self.server.metadata_generate().await {
            Ok(job) => report.generate_job = Some(job),
            Err(e) => error!("metadata generate failed: {}", e),
        }
        Ok(report)
    }

    async fn prune_duplicates(&self) -> Result<Vec<String>, RescanError> {
        let dup = &self.settings.duplicates;
        let groups = self
            .server
            .find_duplicate_scenes(dup.distance, dup.duration_diff)
            .await?;
        let ids = duplicates_to_delete(groups);
        info!("duplicate scenes to delete: {:?}", ids);
        if !ids.is_empty() {
            self.server.destroy_scenes(&ids).await?;
        }
        Ok(ids)
    }

    async fn unorganized_ids(&self) -> Result<Vec<String>, ProviderError> {
        let scenes = self
            .server
            .find_scenes(SceneFilter::unorganized(), FindFilter::all())
            .await?;
        Ok(scenes.into_iter().map(|s| s.id).collect())
    }

    /// Runs identification on unorganized scenes not already shunned, then
    /// overwrites the shunned file with the submitted scenes that are still
    /// unorganized. Previously shunned IDs that were not submitted this run
    /// are not carried over.
    async fn identify_unorganized(&self) -> Result<IdentifyOutcome, RescanError> {
        let unorganized = match self.unorganized_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                error!("failed to list unorganized scenes: {}", e);
                Vec::new()
            }
        };
        info!("unorganized scenes: {}", unorganized.len());

        let shunned = self.shunned.load();
        let candidates: Vec<String> = unorganized
            .into_iter()
            .filter(|id| !shunned.contains(id))
            .collect();
        if candidates.is_empty() {
            return Ok(IdentifyOutcome::default());
        }

        info!("identifying {} unorganized scenes", candidates.len());
        debug!("identify candidates: {:?}", candidates);
        let job = self
            .server
            .identify(&candidates, &self.settings.identify.stash_box_endpoint)
            .await?;
        if !self.waiter.wait_for_job(&job, JobStatus::Finished).await? {
            return Err(RescanError::TaskNotFinished {
                task: "identify",
                job_id: job,
            });
        }

        let still_unorganized: HashSet<String> = self.unorganized_ids().await?.into_iter().collect();
        let shunned: Vec<String> = candidates
            .iter()
            .filter(|id| still_unorganized.contains(*id))
            .cloned()
            .collect();
        info!("{} scenes could not be identified", shunned.len());
        self.shunned.save_or_log(&shunned);
        Ok(IdentifyOutcome {
            submitted: candidates,
            shunned,
        })
    }

    async fn tag_pending(&self) -> Result<usize, RescanError> {
        let tagging = &self.settings.tagging;
        let scenes = self
            .server
            .find_scenes(SceneFilter::default(), FindFilter::all())
            .await?;
        let ids: Vec<String> = scenes
            .into_iter()
            .filter(|s| !s.has_tag(&tagging.done_tag))
            .map(|s| s.id)
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }
        let tag = self
            .server
            .find_tag_by_name(&tagging.pending_tag)
            .await?
            .ok_or_else(|| RescanError::MissingTag(tagging.pending_tag.clone()))?;
        self.server.add_tags_to_scenes(&ids, &[tag.id]).await?;
        info!("tagged {} scenes with {}", ids.len(), tagging.pending_tag);
        Ok(ids.len())
    }

    /// Returns whether the tagging task ran. An unreachable tagger is not an
    /// error.
    async fn hand_off_to_ai_tagger(&self) -> Result<bool, RescanError> {
        match self.tagger.check().await {
            Ok(()) => {}
            Err(ProviderError::NotConfigured(what)) => {
                debug!("ai tagger disabled: {} not configured", what);
                return Ok(false);
            }
            Err(e) => {
                warn!("failed to connect to ai tagger, skipping: {}", e);
                return Ok(false);
            }
        }
        info!("ai tagger is running, starting {}", self.settings.task_name);
        let job = self
            .server
            .run_plugin_task(&self.settings.plugin_id, &self.settings.task_name)
            .await?;
        if !self.waiter.wait_for_job(&job, JobStatus::Finished).await? {
            return Err(RescanError::TaskNotFinished {
                task: "ai tagger",
                job_id: job,
            });
        }
        Ok(true)
    }
}

/// For each duplicate group, every scene except the one with the biggest
/// file. Ties keep the scene listed last.
pub fn duplicates_to_delete(groups: Vec<Vec<Scene>>) -> Vec<String> {
    let mut ids = Vec::new();
    for mut group in groups {
        group.sort_by_key(Scene::largest_file_size);
        group.pop();
        ids.extend(group.into_iter().map(|s| s.id));
    }
    ids
}
