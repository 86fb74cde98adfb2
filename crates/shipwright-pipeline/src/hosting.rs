//! Version-control hosting API and repository change detection.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use shipwright_core::error::{PipelineError, Result};
use shipwright_core::manifest::PointerStore;
use shipwright_core::PipelineConfig;

/// Read access to the version-control hosting service.
#[async_trait]
pub trait HostingApi: Send + Sync {
    /// Latest commit reference on a branch.
    ///
    /// Unreachability surfaces as `ApiUnavailable`; a branch that resolves
    /// to nothing surfaces as `CommitNotFound`.
    async fn latest_commit(&self, repository: &str, branch: &str) -> Result<String>;
}

/// GitHub commits API client.
pub struct GitHubHostingApi {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl GitHubHostingApi {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("shipwright/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PipelineError::ApiUnavailable(e.to_string()))?;

        Ok(Self {
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token: config.api_token.clone(),
            client,
        })
    }
}

#[derive(Deserialize)]
struct CommitResponse {
    sha: String,
}

#[async_trait]
impl HostingApi for GitHubHostingApi {
    async fn latest_commit(&self, repository: &str, branch: &str) -> Result<String> {
        let url = format!("{}/repos/{repository}/commits/{branch}", self.base_url);

        let mut request = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PipelineError::ApiUnavailable(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PipelineError::CommitNotFound {
                repository: repository.to_string(),
                branch: branch.to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(PipelineError::ApiUnavailable(format!(
                "{url} returned {}",
                response.status()
            )));
        }

        let commit: CommitResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::ApiUnavailable(e.to_string()))?;
        if commit.sha.is_empty() {
            return Err(PipelineError::CommitNotFound {
                repository: repository.to_string(),
                branch: branch.to_string(),
            });
        }
        Ok(commit.sha)
    }
}

/// Outcome of one detection pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeDetection {
    /// Whether the branch moved since the last observed commit.
    pub changed: bool,
    /// The commit reference currently at the branch head.
    pub commit: String,
}

/// Compares the branch head against a persisted last-seen pointer.
pub struct ChangeDetector {
    api: Arc<dyn HostingApi>,
    pointer: PointerStore,
    repository: String,
    branch: String,
}

impl ChangeDetector {
    pub fn new(config: &PipelineConfig, api: Arc<dyn HostingApi>) -> Self {
        Self {
            api,
            pointer: PointerStore::new(&config.state_dir),
            repository: config.repository.clone(),
            branch: config.branch.clone(),
        }
    }

    /// One detection pass.
    ///
    /// The first run persists a baseline and reports no change. The pointer
    /// is written only after comparing, so a second pass with no intervening
    /// remote change never reports a change.
    pub async fn detect(&self) -> Result<ChangeDetection> {
        let commit = self
            .api
            .latest_commit(&self.repository, &self.branch)
            .await?;

        match self.pointer.load()? {
            None => {
                self.pointer.store(&commit)?;
                info!(commit = %commit, "first run: recorded baseline commit");
                Ok(ChangeDetection {
                    changed: false,
                    commit,
                })
            }
            Some(seen) if seen == commit => {
                debug!(commit = %commit, "branch unchanged");
                Ok(ChangeDetection {
                    changed: false,
                    commit,
                })
            }
            Some(seen) => {
                self.pointer.store(&commit)?;
                info!(previous = %seen, commit = %commit, "new commit detected");
                Ok(ChangeDetection {
                    changed: true,
                    commit,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeHostingApi;

    fn config(dir: &std::path::Path) -> PipelineConfig {
        PipelineConfig {
            state_dir: dir.join("state"),
            ..PipelineConfig::default()
        }
    }

    #[tokio::test]
    async fn test_first_run_records_baseline_without_change() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let api = Arc::new(FakeHostingApi::with_commit("abc123de99887766"));
        let detector = ChangeDetector::new(&config, api);

        let detection = detector.detect().await.unwrap();
        assert!(!detection.changed);
        assert_eq!(detection.commit, "abc123de99887766");

        // Pointer file now holds the fetched commit.
        let pointer = PointerStore::new(&config.state_dir);
        assert_eq!(
            pointer.load().unwrap(),
            Some("abc123de99887766".to_string())
        );
    }

    #[tokio::test]
    async fn test_detect_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let api = Arc::new(FakeHostingApi::with_commit("abc123de"));
        let detector = ChangeDetector::new(&config, api);

        detector.detect().await.unwrap();
        let second = detector.detect().await.unwrap();
        assert!(!second.changed);
        let third = detector.detect().await.unwrap();
        assert!(!third.changed);
    }

    #[tokio::test]
    async fn test_detect_reports_new_commit_once() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let api = Arc::new(FakeHostingApi::with_commit("abc123de"));
        let detector = ChangeDetector::new(&config, api.clone());

        detector.detect().await.unwrap();
        api.set_commit("feedface");

        let detection = detector.detect().await.unwrap();
        assert!(detection.changed);
        assert_eq!(detection.commit, "feedface");

        let again = detector.detect().await.unwrap();
        assert!(!again.changed);
    }

    #[tokio::test]
    async fn test_unreachable_api_does_not_touch_pointer() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let api = Arc::new(FakeHostingApi::unreachable());
        let detector = ChangeDetector::new(&config, api);

        let err = detector.detect().await.unwrap_err();
        assert!(matches!(err, PipelineError::ApiUnavailable(_)));
        assert_eq!(PointerStore::new(&config.state_dir).load().unwrap(), None);
    }
}
