//! Aggregate health probe backing the `health` command.

use std::fs;
use std::path::Path;

use serde::Serialize;

use shipwright_core::cache::ArtifactCache;
use shipwright_core::manifest::ManifestStore;
use shipwright_core::PipelineConfig;

use crate::hosting::HostingApi;
use crate::toolchain;

/// Point-in-time view of the pipeline's dependencies.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub hosting_api_reachable: bool,
    pub toolchain_available: bool,
    pub state_dir_writable: bool,
    pub cache_dir_writable: bool,
    pub preparations: usize,
    pub cached_artifacts: usize,
}

impl HealthReport {
    /// A missing toolchain is expected on delegation-only hosts, so it does
    /// not count against overall health.
    pub fn healthy(&self) -> bool {
        self.hosting_api_reachable && self.state_dir_writable && self.cache_dir_writable
    }
}

/// Probe every dependency and assemble a report.
pub async fn check_health(config: &PipelineConfig, api: &dyn HostingApi) -> HealthReport {
    let hosting_api_reachable = api
        .latest_commit(&config.repository, &config.branch)
        .await
        .is_ok();

    let preparations = ManifestStore::new(&config.state_dir)
        .and_then(|s| s.list())
        .map(|r| r.len())
        .unwrap_or(0);
    let cached_artifacts = ArtifactCache::new(&config.cache_dir)
        .and_then(|c| c.list())
        .map(|a| a.len())
        .unwrap_or(0);

    HealthReport {
        hosting_api_reachable,
        toolchain_available: toolchain::probe(config.sdk_root.as_deref()).usable(),
        state_dir_writable: dir_writable(&config.state_dir),
        cache_dir_writable: dir_writable(&config.cache_dir),
        preparations,
        cached_artifacts,
    }
}

fn dir_writable(dir: &Path) -> bool {
    if fs::create_dir_all(dir).is_err() {
        return false;
    }
    tempfile::NamedTempFile::new_in(dir).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeHostingApi;

    #[tokio::test]
    async fn test_healthy_with_reachable_api_and_writable_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            state_dir: dir.path().join("state"),
            workspace_root: dir.path().join("workspaces"),
            cache_dir: dir.path().join("cache"),
            ..PipelineConfig::default()
        };
        let api = FakeHostingApi::with_commit("abc123de");

        let report = check_health(&config, &api).await;
        assert!(report.hosting_api_reachable);
        assert!(report.state_dir_writable);
        assert!(report.cache_dir_writable);
        assert!(report.healthy());
        assert_eq!(report.preparations, 0);
        assert_eq!(report.cached_artifacts, 0);
    }

    #[tokio::test]
    async fn test_unreachable_api_is_unhealthy() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            state_dir: dir.path().join("state"),
            cache_dir: dir.path().join("cache"),
            ..PipelineConfig::default()
        };
        let api = FakeHostingApi::unreachable();

        let report = check_health(&config, &api).await;
        assert!(!report.hosting_api_reachable);
        assert!(!report.healthy());
    }
}
