//! Pipeline configuration.
//!
//! Constructed once at the binary boundary and passed by reference into each
//! component's constructor. Components never read environment state
//! themselves; `PipelineConfig::from_env` is the single place ambient
//! variables are consulted.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::manifest::BuildVariant;

/// Configuration shared by every pipeline component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Source repository slug (owner/name).
    pub repository: String,

    /// Tracked branch.
    pub branch: String,

    /// Build variant to produce.
    pub variant: BuildVariant,

    /// Directory holding manifests and the last-seen-commit pointer.
    pub state_dir: PathBuf,

    /// Directory under which per-preparation workspaces are created.
    pub workspace_root: PathBuf,

    /// Artifact cache directory.
    pub cache_dir: PathBuf,

    /// Hosting API base URL.
    pub api_base_url: String,

    /// API token for the hosting service and workflow dispatch.
    pub api_token: Option<String>,

    /// Workflow file the remote CI system runs.
    pub workflow_id: String,

    /// Whether remote jobs should send their own completion notifications.
    pub notify_on_completion: bool,

    /// Android SDK root, when one is installed locally.
    pub sdk_root: Option<PathBuf>,

    /// Seconds between progress-monitor polls.
    pub poll_interval_secs: u64,

    /// Upper bound on waiting for preparation to reach a terminal status.
    pub prepare_timeout_secs: u64,

    /// Upper bound on waiting for a build to reach a terminal status.
    pub build_timeout_secs: u64,

    /// Retention: artifacts older than this many days are swept.
    pub retention_max_age_days: u64,

    /// Retention: oldest artifacts are evicted once the cache exceeds this.
    pub retention_max_total_bytes: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            repository: "acme/mobile-app".to_string(),
            branch: "main".to_string(),
            variant: BuildVariant::Debug,
            state_dir: PathBuf::from(".shipwright/state"),
            workspace_root: PathBuf::from(".shipwright/workspaces"),
            cache_dir: PathBuf::from(".shipwright/cache"),
            api_base_url: "https://api.github.com".to_string(),
            api_token: None,
            workflow_id: "mobile-build.yml".to_string(),
            notify_on_completion: true,
            sdk_root: None,
            poll_interval_secs: 30,
            prepare_timeout_secs: 1800,
            build_timeout_secs: 3600,
            retention_max_age_days: 30,
            retention_max_total_bytes: None,
        }
    }
}

impl PipelineConfig {
    /// Build a config from `SHIPWRIGHT_*` environment variables, falling back
    /// to defaults. Call this once in `main`; components receive the result.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("SHIPWRIGHT_REPOSITORY") {
            config.repository = v;
        }
        if let Ok(v) = std::env::var("SHIPWRIGHT_BRANCH") {
            config.branch = v;
        }
        if let Ok(v) = std::env::var("SHIPWRIGHT_VARIANT") {
            if let Ok(variant) = v.parse() {
                config.variant = variant;
            }
        }
        if let Ok(v) = std::env::var("SHIPWRIGHT_STATE_DIR") {
            config.state_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("SHIPWRIGHT_WORKSPACE_ROOT") {
            config.workspace_root = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("SHIPWRIGHT_CACHE_DIR") {
            config.cache_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("SHIPWRIGHT_API_URL") {
            config.api_base_url = v;
        }
        if let Ok(v) = std::env::var("SHIPWRIGHT_API_TOKEN") {
            config.api_token = Some(v);
        }
        if let Ok(v) = std::env::var("SHIPWRIGHT_WORKFLOW") {
            config.workflow_id = v;
        }
        if let Ok(v) = std::env::var("ANDROID_HOME") {
            config.sdk_root = Some(PathBuf::from(v));
        }

        config
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn prepare_timeout(&self) -> Duration {
        Duration::from_secs(self.prepare_timeout_secs)
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }
}
