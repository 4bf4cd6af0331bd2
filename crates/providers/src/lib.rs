//! Remote collaborators: the media-library server and the AI tagging service.

use thiserror::Error;

pub mod ai_tagger;
pub mod noop;
pub mod stash;
pub mod types;

pub use types::{FindFilter, Job, JobStatus, LibraryRoot, Scene, SceneFile, SceneFilter, Tag};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("not configured: {0}")]
    NotConfigured(String),
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("status {status} body {body}")]
    Status { status: u16, body: String },
    #[error("graphql errors: {}", .0.join("; "))]
    GraphQl(Vec<String>),
    #[error("missing field in response: {0}")]
    MissingData(String),
}

/// Operations the watcher needs from the library server. Asynchronous
/// operations return the server's opaque job ID.
#[async_trait::async_trait]
pub trait LibraryServer: Send + Sync {
    async fn library_roots(&self) -> Result<Vec<LibraryRoot>, ProviderError>;

    /// Starts a scan of `paths`; an empty slice scans the whole library.
    async fn metadata_scan(&self, paths: &[String]) -> Result<String, ProviderError>;

    /// `Ok(None)` when the server no longer knows the job.
    async fn find_job(&self, job_id: &str) -> Result<Option<Job>, ProviderError>;

    async fn find_scenes(
        &self,
        scene_filter: SceneFilter,
        filter: FindFilter,
    ) -> Result<Vec<Scene>, ProviderError>;

    async fn find_duplicate_scenes(
        &self,
        distance: i64,
        duration_diff: f64,
    ) -> Result<Vec<Vec<Scene>>, ProviderError>;

    /// Deletes the scenes along with their files and generated media.
    async fn destroy_scenes(&self, ids: &[String]) -> Result<(), ProviderError>;

    async fn identify(
        &self,
        scene_ids: &[String],
        stash_box_endpoint: &str,
    ) -> Result<String, ProviderError>;

    async fn find_tag_by_name(&self, name: &str) -> Result<Option<Tag>, ProviderError>;

    async fn add_tags_to_scenes(
        &self,
        scene_ids: &[String],
        tag_ids: &[String],
    ) -> Result<(), ProviderError>;

    async fn run_plugin_task(
        &self,
        plugin_id: &str,
        task_name: &str,
    ) -> Result<String, ProviderError>;

    /// Regenerates derived media with the server's default generate options.
    async fn metadata_generate(&self) -> Result<String, ProviderError>;
}

/// Reachability check for an optional external service.
#[async_trait::async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self) -> Result<(), ProviderError>;
}
