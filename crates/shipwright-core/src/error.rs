//! Error taxonomy for the Shipwright pipeline.

use crate::manifest::PreparationStatus;

/// Pipeline errors.
///
/// Remote-delegation failures (`ApiUnavailable`) are recovered by local
/// fallback execution and are never a hard failure on their own.
/// `NotificationFailed` is always non-fatal and only ever logged.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("hosting API unavailable: {0}")]
    ApiUnavailable(String),

    #[error("no commit found for {repository}@{branch}")]
    CommitNotFound { repository: String, branch: String },

    #[error("no preparation found for commit {0}")]
    PreparationNotFound(String),

    #[error("preparation {id} is not ready for build (status: {status})")]
    PreparationNotReady {
        id: String,
        status: PreparationStatus,
    },

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: PreparationStatus,
        to: PreparationStatus,
    },

    #[error("no local toolchain installation found")]
    ToolchainMissing,

    #[error("workspace staging failed: {0}")]
    StagingFailed(String),

    #[error("build failed: {0}")]
    BuildFailed(String),

    #[error("cache write failed: {0}")]
    CacheWriteFailed(String),

    #[error("cached artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("notification delivery failed: {0}")]
    NotificationFailed(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_ready_error_display() {
        let err = PipelineError::PreparationNotReady {
            id: "20260830120000-abc123de".to_string(),
            status: PreparationStatus::Preparing,
        };
        let msg = err.to_string();
        assert!(msg.contains("20260830120000-abc123de"));
        assert!(msg.contains("preparing"));
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = PipelineError::InvalidTransition {
            from: PreparationStatus::BuildComplete,
            to: PreparationStatus::Preparing,
        };
        let msg = err.to_string();
        assert!(msg.contains("build-complete"));
        assert!(msg.contains("preparing"));
    }

    #[test]
    fn test_commit_not_found_display() {
        let err = PipelineError::CommitNotFound {
            repository: "acme/mobile-app".to_string(),
            branch: "main".to_string(),
        };
        assert!(err.to_string().contains("acme/mobile-app@main"));
    }
}
