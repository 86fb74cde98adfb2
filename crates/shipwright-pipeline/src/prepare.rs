//! Preparation orchestration: remote delegation with local fallback.
//!
//! `prepare` always creates exactly one new record and a dedicated
//! workspace. When the remote CI trigger is accepted, completion is awaited
//! through the manifest; when it is not, the environment is validated and
//! staged locally instead.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, warn};

use shipwright_core::error::{PipelineError, Result};
use shipwright_core::manifest::{ManifestStore, PreparationRecord, PreparationStatus};
use shipwright_core::{monitor, PipelineConfig};

use crate::notify::{self, Notifier};
use crate::remote::{RemoteCi, WorkflowAction, WorkflowRequest};
use crate::toolchain;

/// Directories staged for the mobile project skeleton.
const SKELETON_DIRS: &[&str] = &[
    "app/src/main/java",
    "app/src/main/res/layout",
    "app/src/main/res/values",
    "app/src/main/assets",
    "gradle/wrapper",
];

/// Auxiliary build scripts copied into every workspace.
const SKELETON_FILES: &[(&str, &str)] = &[
    (
        "settings.gradle",
        "rootProject.name = 'app'\ninclude ':app'\n",
    ),
    (
        "build.gradle",
        "// Top-level build configuration; module config lives in app/build.gradle.\n",
    ),
    (
        "app/build.gradle",
        "apply plugin: 'com.android.application'\n",
    ),
    ("gradle.properties", "org.gradle.jvmargs=-Xmx2048m\n"),
];

/// Creates preparation records and readies build environments.
pub struct PreparationOrchestrator {
    config: PipelineConfig,
    store: ManifestStore,
    remote: Arc<dyn RemoteCi>,
    notifier: Arc<dyn Notifier>,
}

impl PreparationOrchestrator {
    pub fn new(
        config: &PipelineConfig,
        remote: Arc<dyn RemoteCi>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        Ok(Self {
            store: ManifestStore::new(&config.state_dir)?,
            config: config.clone(),
            remote,
            notifier,
        })
    }

    /// Ready a build environment for `commit`.
    ///
    /// Always creates a new record; the returned record's status says how
    /// preparation ended. A remote-delegated preparation that outlives the
    /// monitor timeout comes back still in-flight, which the caller treats
    /// as stalled rather than failed.
    pub async fn prepare(&self, commit: &str) -> Result<PreparationRecord> {
        let record = PreparationRecord::new(
            commit,
            self.config.variant,
            &self.config.repository,
            &self.config.branch,
        );
        let workspace = self.config.workspace_root.join(&record.id);
        fs::create_dir_all(&workspace)?;
        self.store.save(&record)?;
        info!(id = %record.id, commit = %record.commit, "preparation started");

        let request = WorkflowRequest {
            repository: self.config.repository.clone(),
            branch: self.config.branch.clone(),
            action: WorkflowAction::Prepare,
            variant: self.config.variant,
            notify: self.config.notify_on_completion,
        };

        match self.remote.dispatch(&request).await {
            Ok(()) => {
                info!(id = %record.id, "preparation delegated to remote CI; polling manifest");
                self.await_remote_preparation(record).await
            }
            Err(e) => {
                warn!(error = %e, "remote delegation failed; preparing locally");
                self.prepare_locally(record, &workspace).await
            }
        }
    }

    async fn await_remote_preparation(
        &self,
        record: PreparationRecord,
    ) -> Result<PreparationRecord> {
        let id = record.id.clone();
        let done = monitor::await_terminal(
            || Ok(self.store.load(&id)?.status.is_terminal_for_preparation()),
            self.config.prepare_timeout(),
            self.config.poll_interval(),
        )
        .await?;

        let record = self.store.load(&record.id)?;
        if !done {
            warn!(id = %record.id, status = %record.status, "preparation still pending after timeout");
            return Ok(record);
        }

        match record.status {
            PreparationStatus::ReadyForBuild => {
                notify::send(
                    self.notifier.as_ref(),
                    &format!(
                        "preparation {} ready for build (commit {})",
                        record.id, record.commit
                    ),
                )
                .await;
            }
            PreparationStatus::PreparationFailed => {
                notify::send(
                    self.notifier.as_ref(),
                    &format!("preparation {} failed on remote CI", record.id),
                )
                .await;
            }
            _ => {}
        }
        Ok(record)
    }

    async fn prepare_locally(
        &self,
        mut record: PreparationRecord,
        workspace: &Path,
    ) -> Result<PreparationRecord> {
        record.advance(PreparationStatus::Validating)?;
        self.store.save(&record)?;

        let toolchain = toolchain::probe(self.config.sdk_root.as_deref());
        record.environment_validated = toolchain.usable();
        if !record.environment_validated {
            // Non-fatal: the remote CI owns the actual compile step.
            info!(
                id = %record.id,
                "no usable local toolchain; builds will be delegated or simulated"
            );
        }

        match stage_workspace(workspace) {
            Ok(()) => {
                record.dependencies_ready = true;
                record.build_ready = true;
                record.advance(PreparationStatus::ReadyForBuild)?;
                self.store.save(&record)?;
                info!(id = %record.id, "workspace staged; ready for manual build trigger");
                notify::send(
                    self.notifier.as_ref(),
                    &format!(
                        "preparation {} ready for build (commit {})",
                        record.id, record.commit
                    ),
                )
                .await;
            }
            Err(e) => {
                error!(id = %record.id, error = %e, "workspace staging failed");
                record.advance(PreparationStatus::PreparationFailed)?;
                self.store.save(&record)?;
                notify::send(
                    self.notifier.as_ref(),
                    &format!("preparation {} failed: {e}", record.id),
                )
                .await;
            }
        }
        Ok(record)
    }
}

/// Stage the expected project skeleton and copy auxiliary build scripts.
/// Failure here is fatal to preparation.
fn stage_workspace(workspace: &Path) -> Result<()> {
    for dir in SKELETON_DIRS {
        fs::create_dir_all(workspace.join(dir))
            .map_err(|e| PipelineError::StagingFailed(format!("create {dir}: {e}")))?;
    }
    for (name, contents) in SKELETON_FILES {
        fs::write(workspace.join(name), contents)
            .map_err(|e| PipelineError::StagingFailed(format!("write {name}: {e}")))?;
    }
    Ok(())
}
