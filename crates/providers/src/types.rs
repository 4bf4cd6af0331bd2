//! Wire types shared by the library server client and its callers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One configured library root ("stash") of the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryRoot {
    pub path: String,
    #[serde(rename = "excludeVideo", default)]
    pub exclude_video: bool,
    #[serde(rename = "excludeImage", default)]
    pub exclude_image: bool,
}

impl LibraryRoot {
    /// True when the root indexes video or image content.
    pub fn includes_media(&self) -> bool {
        !self.exclude_video || !self.exclude_image
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    Ready,
    Running,
    Stopping,
    Finished,
    Cancelled,
    Failed,
    Other(String),
}

impl JobStatus {
    /// A job in one of these states will never change status again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Finished | JobStatus::Cancelled | JobStatus::Failed
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Ready => "READY",
            JobStatus::Running => "RUNNING",
            JobStatus::Stopping => "STOPPING",
            JobStatus::Finished => "FINISHED",
            JobStatus::Cancelled => "CANCELLED",
            JobStatus::Failed => "FAILED",
            JobStatus::Other(s) => s,
        }
    }
}

impl From<String> for JobStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "READY" => JobStatus::Ready,
            "RUNNING" => JobStatus::Running,
            "STOPPING" => JobStatus::Stopping,
            "FINISHED" => JobStatus::Finished,
            "CANCELLED" => JobStatus::Cancelled,
            "FAILED" => JobStatus::Failed,
            _ => JobStatus::Other(s),
        }
    }
}

impl From<JobStatus> for String {
    fn from(status: JobStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneFile {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub id: String,
    #[serde(default)]
    pub organized: bool,
    #[serde(default)]
    pub files: Vec<SceneFile>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl Scene {
    /// Size of the biggest file attached to the scene, 0 when it has none.
    pub fn largest_file_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).max().unwrap_or(0)
    }

    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.iter().any(|t| t.name == name)
    }
}

/// `SceneFilterType` subset used by the watcher. Build a new value per query.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SceneFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organized: Option<bool>,
}

impl SceneFilter {
    pub fn unorganized() -> Self {
        Self {
            organized: Some(false),
        }
    }
}

/// `FindFilterType`. `per_page = -1` returns every match in one page.
#[derive(Debug, Clone, Serialize)]
pub struct FindFilter {
    pub per_page: i64,
    pub q: String,
}

impl FindFilter {
    pub fn all() -> Self {
        Self {
            per_page: -1,
            q: String::new(),
        }
    }
}

impl Default for FindFilter {
    fn default() -> Self {
        Self::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_job_status_is_preserved() {
        let job: Job =
            serde_json::from_str(r#"{"id":"7","status":"PAUSED","progress":null}"#).unwrap();
        assert_eq!(job.status, JobStatus::Other("PAUSED".into()));
        assert!(!job.status.is_terminal());
    }

    #[test]
    fn failed_and_cancelled_are_terminal() {
        assert!(JobStatus::from("FAILED".to_string()).is_terminal());
        assert!(JobStatus::from("CANCELLED".to_string()).is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }

    #[test]
    fn largest_file_size_picks_max_and_defaults_to_zero() {
        let scene: Scene = serde_json::from_str(
            r#"{"id":"1","files":[{"path":"/a","size":10},{"path":"/b","size":90}]}"#,
        )
        .unwrap();
        assert_eq!(scene.largest_file_size(), 90);

        let empty: Scene = serde_json::from_str(r#"{"id":"2"}"#).unwrap();
        assert_eq!(empty.largest_file_size(), 0);
    }

    #[test]
    fn root_without_media_is_excluded() {
        let root = LibraryRoot {
            path: "/audio".into(),
            exclude_video: true,
            exclude_image: true,
        };
        assert!(!root.includes_media());
        let images_only = LibraryRoot {
            exclude_image: false,
            ..root
        };
        assert!(images_only.includes_media());
    }

    #[test]
    fn scene_filter_omits_unset_fields() {
        let json = serde_json::to_value(SceneFilter::default()).unwrap();
        assert_eq!(json, serde_json::json!({}));
        let json = serde_json::to_value(SceneFilter::unorganized()).unwrap();
        assert_eq!(json, serde_json::json!({"organized": false}));
    }
}
