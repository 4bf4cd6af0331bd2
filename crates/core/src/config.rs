use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variables understood for compatibility with existing
/// deployments, mapped onto their config keys. They override file values.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("stash.base_url", "STASH_BASE_URL"),
    ("stash.api_key", "STASH_API_KEY"),
    ("poll.interval_secs", "POLL_INTERVAL"),
    ("layout.data_root", "DATA_ROOT"),
    ("permissions.uid", "FIX_PERMS_UID"),
    ("permissions.gid", "FIX_PERMS_GID"),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub stash: StashSettings,
    #[serde(default)]
    pub permissions: PermissionConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub jobs: JobConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub duplicates: DuplicateConfig,
    #[serde(default)]
    pub identify: IdentifyConfig,
    #[serde(default)]
    pub tagging: TaggingConfig,
    #[serde(default)]
    pub ai_tagger: AiTaggerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StashSettings {
    pub base_url: String,
    pub api_key: String,
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionConfig {
    pub uid: u32,
    pub gid: u32,
    pub roots: Vec<String>,
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            uid: 1000,
            gid: 1000,
            roots: vec!["/provision".into(), "/data/torrents-stash".into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub interval_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30 * 60,
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    pub period_ms: u64,
    pub timeout_secs: u64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            period_ms: 1500,
            timeout_secs: 12000,
        }
    }
}

impl JobConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchBackend {
    /// Periodic directory snapshots; works on network and bind mounts.
    #[default]
    Poll,
    /// The platform's native notification API.
    Native,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub backend: WatchBackend,
    pub poll_interval_secs: u64,
    /// Glob patterns; events on matching paths are dropped.
    pub ignore: Vec<String>,
    pub channel_capacity: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            backend: WatchBackend::Poll,
            poll_interval_secs: 2,
            ignore: Vec::new(),
            channel_capacity: 100,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub data_root: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicateConfig {
    pub distance: i64,
    pub duration_diff: f64,
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            distance: 10,
            duration_diff: -1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentifyConfig {
    pub shunned_path: String,
    pub stash_box_endpoint: String,
}

impl Default for IdentifyConfig {
    fn default() -> Self {
        Self {
            shunned_path: "shunned_scenes.json".into(),
            stash_box_endpoint: "https://stashdb.org/graphql".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaggingConfig {
    /// Scenes carrying this tag are left alone.
    pub done_tag: String,
    /// Tag added to every scene still lacking `done_tag`.
    pub pending_tag: String,
}

impl Default for TaggingConfig {
    fn default() -> Self {
        Self {
            done_tag: "AI_Tagged".into(),
            pending_tag: "AI_TagMe".into(),
        }
    }
}

/// One path prefix rewrite. Stored as a list of pairs because config keys
/// are case-folded and split on dots, which would mangle paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathMutation {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiTaggerSettings {
    pub base_url: Option<String>,
    /// Plugin configuration file whose `api_base_url` and `path_mutation`
    /// take precedence over the values in this section.
    pub plugin_config: Option<String>,
    pub plugin_id: String,
    pub task_name: String,
    pub health_timeout_secs: u64,
    pub path_mutation: Vec<PathMutation>,
}

impl Default for AiTaggerSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            plugin_config: None,
            plugin_id: "ai_tagger".into(),
            task_name: "Tag Scenes".into(),
            health_timeout_secs: 10,
            path_mutation: Vec::new(),
        }
    }
}

impl AiTaggerSettings {
    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }
}

/// The subset of the AI tagger plugin's own configuration the watcher reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PluginConfig {
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub path_mutation: Vec<PathMutation>,
}

pub fn load(path: Option<&str>) -> anyhow::Result<AppConfig> {
    load_with(path, |var| std::env::var(var).ok())
}

/// Like [`load`], reading legacy variables through `lookup`.
pub fn load_with<F>(path: Option<&str>, lookup: F) -> anyhow::Result<AppConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut settings = config::Config::builder();
    if let Some(p) = path {
        settings = settings.add_source(config::File::with_name(p));
    } else {
        settings = settings.add_source(config::File::with_name("config/default").required(false));
    }
    settings = settings.add_source(config::Environment::with_prefix("STASH_WATCHER").separator("__"));
    for (key, var) in LEGACY_ENV {
        settings = settings.set_override_option(*key, lookup(var))?;
    }
    let cfg = settings.build()?;
    Ok(cfg.try_deserialize()?)
}

pub fn load_plugin_config(path: &str) -> anyhow::Result<PluginConfig> {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(path))
        .build()?;
    Ok(cfg.try_deserialize()?)
}
