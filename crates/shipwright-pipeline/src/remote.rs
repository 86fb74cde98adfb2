//! Remote CI delegation via workflow dispatch.
//!
//! A successful dispatch means the *trigger* was accepted, not that the job
//! finished. Completion is observed indirectly: the remote job rewrites the
//! shared manifest, and the progress monitor polls it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use shipwright_core::error::{PipelineError, Result};
use shipwright_core::manifest::BuildVariant;
use shipwright_core::PipelineConfig;

/// Which phase the remote workflow should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowAction {
    Prepare,
    Build,
}

impl WorkflowAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowAction::Prepare => "prepare",
            WorkflowAction::Build => "build",
        }
    }
}

/// Parameters for one remote workflow run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowRequest {
    pub repository: String,
    pub branch: String,
    pub action: WorkflowAction,
    pub variant: BuildVariant,
    pub notify: bool,
}

/// Remote CI system, consumed at its trigger boundary only.
#[async_trait]
pub trait RemoteCi: Send + Sync {
    /// Trigger a workflow run. Failures here are recoverable: callers fall
    /// back to local execution instead of surfacing a hard error.
    async fn dispatch(&self, request: &WorkflowRequest) -> Result<()>;
}

/// GitHub Actions `workflow_dispatch` client.
pub struct GitHubActionsCi {
    base_url: String,
    token: Option<String>,
    workflow_id: String,
    client: reqwest::Client,
}

impl GitHubActionsCi {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("shipwright/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PipelineError::ApiUnavailable(e.to_string()))?;

        Ok(Self {
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token: config.api_token.clone(),
            workflow_id: config.workflow_id.clone(),
            client,
        })
    }
}

#[async_trait]
impl RemoteCi for GitHubActionsCi {
    async fn dispatch(&self, request: &WorkflowRequest) -> Result<()> {
        let token = self.token.as_ref().ok_or_else(|| {
            PipelineError::ApiUnavailable("no API token configured for workflow dispatch".into())
        })?;

        let url = format!(
            "{}/repos/{}/actions/workflows/{}/dispatches",
            self.base_url, request.repository, self.workflow_id
        );
        let body = json!({
            "ref": request.branch,
            "inputs": {
                "action": request.action.as_str(),
                "variant": request.variant.as_str(),
                "notify": request.notify.to_string(),
            },
        });

        debug!(url = %url, action = request.action.as_str(), "dispatching workflow");
        let response = self
            .client
            .post(&url)
            .header("Accept", "application/vnd.github+json")
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::ApiUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PipelineError::ApiUnavailable(format!(
                "workflow dispatch returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&WorkflowAction::Prepare).unwrap(),
            "\"prepare\""
        );
        assert_eq!(WorkflowAction::Build.as_str(), "build");
    }

    #[tokio::test]
    async fn test_dispatch_without_token_is_unavailable() {
        let config = PipelineConfig::default();
        let ci = GitHubActionsCi::new(&config).unwrap();
        let request = WorkflowRequest {
            repository: config.repository.clone(),
            branch: config.branch.clone(),
            action: WorkflowAction::Prepare,
            variant: config.variant,
            notify: true,
        };

        let err = ci.dispatch(&request).await.unwrap_err();
        assert!(matches!(err, PipelineError::ApiUnavailable(_)));
    }
}
