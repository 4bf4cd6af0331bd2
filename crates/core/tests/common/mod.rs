#![allow(dead_code)]

use providers::{
    FindFilter, HealthProbe, Job, JobStatus, LibraryRoot, LibraryServer, ProviderError, Scene,
    SceneFile, SceneFilter, Tag,
};
use std::collections::{HashMap, VecDeque};
use std::os::unix::fs::MetadataExt;
use std::path::PathBuf;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Scan(Vec<String>),
    FindJob(String),
    FindScenes(Option<bool>),
    FindDuplicates,
    Destroy(Vec<String>),
    Identify(Vec<String>),
    FindTag(String),
    AddTags(Vec<String>, Vec<String>),
    RunPluginTask(String, String),
    Generate,
}

/// In-memory library server. Jobs report the statuses queued for them in
/// order, repeating the last one; unknown jobs finish immediately.
#[derive(Default)]
pub struct FakeServer {
    pub calls: Mutex<Vec<Call>>,
    pub roots: Vec<LibraryRoot>,
    pub job_statuses: Mutex<HashMap<String, VecDeque<JobStatus>>>,
    pub missing_jobs: Vec<String>,
    pub scenes: Vec<Scene>,
    /// Responses to successive unorganized-scene queries; the last repeats.
    pub unorganized: Mutex<VecDeque<Vec<String>>>,
    pub duplicate_groups: Vec<Vec<Scene>>,
    pub tags: Vec<Tag>,
    pub fail_duplicates: bool,
    pub fail_unorganized: bool,
    /// When set, every scan records this path's mode bits first.
    pub watched_file: Option<PathBuf>,
    pub modes_at_scan: Mutex<Vec<u32>>,
    pub next_job: Mutex<u32>,
}

impl FakeServer {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn script_job(&self, id: &str, statuses: &[JobStatus]) {
        self.job_statuses
            .lock()
            .unwrap()
            .insert(id.to_string(), statuses.iter().cloned().collect());
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn new_job(&self, prefix: &str) -> String {
        let mut n = self.next_job.lock().unwrap();
        *n += 1;
        format!("{prefix}-{n}")
    }
}

pub fn scene(id: &str, size: u64, tags: &[&str]) -> Scene {
    Scene {
        id: id.into(),
        organized: false,
        files: vec![SceneFile {
            path: format!("/lib/{id}.mp4"),
            size,
        }],
        tags: tags
            .iter()
            .enumerate()
            .map(|(i, name)| Tag {
                id: format!("t{i}"),
                name: name.to_string(),
            })
            .collect(),
    }
}

#[async_trait::async_trait]
impl LibraryServer for FakeServer {
    async fn library_roots(&self) -> Result<Vec<LibraryRoot>, ProviderError> {
        Ok(self.roots.clone())
    }

    async fn metadata_scan(&self, paths: &[String]) -> Result<String, ProviderError> {
        self.record(Call::Scan(paths.to_vec()));
        if let Some(path) = &self.watched_file {
            let mode = std::fs::metadata(path).map(|m| m.mode() & 0o7777).unwrap_or(0);
            self.modes_at_scan.lock().unwrap().push(mode);
        }
        Ok(self.new_job("scan"))
    }

    async fn find_job(&self, job_id: &str) -> Result<Option<Job>, ProviderError> {
        self.record(Call::FindJob(job_id.to_string()));
        if self.missing_jobs.iter().any(|j| j == job_id) {
            return Ok(None);
        }
        let mut scripted = self.job_statuses.lock().unwrap();
        let status = match scripted.get_mut(job_id) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap_or(JobStatus::Finished),
            None => JobStatus::Finished,
        };
        Ok(Some(Job {
            id: job_id.to_string(),
            status,
            progress: None,
            description: None,
        }))
    }

    async fn find_scenes(
        &self,
        scene_filter: SceneFilter,
        _filter: FindFilter,
    ) -> Result<Vec<Scene>, ProviderError> {
        self.record(Call::FindScenes(scene_filter.organized));
        if scene_filter.organized == Some(false) {
            if self.fail_unorganized {
                return Err(ProviderError::Status {
                    status: 502,
                    body: "bad gateway".into(),
                });
            }
            let mut queue = self.unorganized.lock().unwrap();
            let ids = if queue.len() > 1 {
                queue.pop_front().unwrap_or_default()
            } else {
                queue.front().cloned().unwrap_or_default()
            };
            return Ok(ids.iter().map(|id| scene(id, 1, &[])).collect());
        }
        Ok(self.scenes.clone())
    }

    async fn find_duplicate_scenes(
        &self,
        _distance: i64,
        _duration_diff: f64,
    ) -> Result<Vec<Vec<Scene>>, ProviderError> {
        self.record(Call::FindDuplicates);
        if self.fail_duplicates {
            return Err(ProviderError::RequestFailed("connection reset".into()));
        }
        Ok(self.duplicate_groups.clone())
    }

    async fn destroy_scenes(&self, ids: &[String]) -> Result<(), ProviderError> {
        self.record(Call::Destroy(ids.to_vec()));
        Ok(())
    }

    async fn identify(
        &self,
        scene_ids: &[String],
        _stash_box_endpoint: &str,
    ) -> Result<String, ProviderError> {
        self.record(Call::Identify(scene_ids.to_vec()));
        Ok(self.new_job("identify"))
    }

    async fn find_tag_by_name(&self, name: &str) -> Result<Option<Tag>, ProviderError> {
        self.record(Call::FindTag(name.to_string()));
        Ok(self.tags.iter().find(|t| t.name == name).cloned())
    }

    async fn add_tags_to_scenes(
        &self,
        scene_ids: &[String],
        tag_ids: &[String],
    ) -> Result<(), ProviderError> {
        self.record(Call::AddTags(scene_ids.to_vec(), tag_ids.to_vec()));
        Ok(())
    }

    async fn run_plugin_task(
        &self,
        plugin_id: &str,
        task_name: &str,
    ) -> Result<String, ProviderError> {
        self.record(Call::RunPluginTask(
            plugin_id.to_string(),
            task_name.to_string(),
        ));
        Ok(self.new_job("task"))
    }

    async fn metadata_generate(&self) -> Result<String, ProviderError> {
        self.record(Call::Generate);
        Ok(self.new_job("generate"))
    }
}

pub struct UpTagger;

#[async_trait::async_trait]
impl HealthProbe for UpTagger {
    async fn check(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

pub struct DownTagger;

#[async_trait::async_trait]
impl HealthProbe for DownTagger {
    async fn check(&self) -> Result<(), ProviderError> {
        Err(ProviderError::RequestFailed("connection refused".into()))
    }
}
