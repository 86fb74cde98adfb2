//! Manual build trigger gate and local build execution.
//!
//! A build starts only from a record whose persisted status is exactly
//! `ready-for-build`; the gate refuses everything else, including when the
//! caller supplies an explicit preparation id.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use shipwright_core::cache::{ArtifactCache, CachedArtifact};
use shipwright_core::error::{PipelineError, Result};
use shipwright_core::manifest::{ManifestStore, PreparationRecord, PreparationStatus};
use shipwright_core::{monitor, PipelineConfig};

use crate::notify::{self, Notifier};
use crate::remote::{RemoteCi, WorkflowAction, WorkflowRequest};
use crate::toolchain;

/// Result of a triggered build.
#[derive(Debug)]
pub struct BuildOutcome {
    /// The record after the build phase, with authoritative status.
    pub record: PreparationRecord,
    /// The cached artifact, when the build succeeded and caching worked.
    pub artifact: Option<CachedArtifact>,
    /// Whether the package was synthesized rather than compiled.
    pub simulated: bool,
}

impl BuildOutcome {
    pub fn succeeded(&self) -> bool {
        self.record.status == PreparationStatus::BuildComplete
    }
}

/// The manual entry point from a ready environment to an actual build.
pub struct BuildGate {
    config: PipelineConfig,
    store: ManifestStore,
    cache: ArtifactCache,
    remote: Arc<dyn RemoteCi>,
    notifier: Arc<dyn Notifier>,
}

impl BuildGate {
    pub fn new(
        config: &PipelineConfig,
        remote: Arc<dyn RemoteCi>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        Ok(Self {
            store: ManifestStore::new(&config.state_dir)?,
            cache: ArtifactCache::new(&config.cache_dir)?,
            config: config.clone(),
            remote,
            notifier,
        })
    }

    /// Trigger a build for `commit`.
    ///
    /// Without an explicit preparation id, the most recently created
    /// preparation matching the commit prefix is used. The persisted status
    /// must be exactly `ready-for-build`.
    pub async fn trigger_build(
        &self,
        commit: &str,
        preparation_id: Option<&str>,
    ) -> Result<BuildOutcome> {
        let mut record = match preparation_id {
            Some(id) => self.store.load(id)?,
            None => self.store.find_latest_for_commit(commit)?,
        };

        if record.status != PreparationStatus::ReadyForBuild {
            return Err(PipelineError::PreparationNotReady {
                id: record.id,
                status: record.status,
            });
        }

        record.advance(PreparationStatus::Building)?;
        self.store.save(&record)?;
        info!(id = %record.id, commit = %record.commit, "build triggered");

        let request = WorkflowRequest {
            repository: self.config.repository.clone(),
            branch: self.config.branch.clone(),
            action: WorkflowAction::Build,
            variant: record.variant,
            notify: self.config.notify_on_completion,
        };

        match self.remote.dispatch(&request).await {
            Ok(()) => {
                info!(id = %record.id, "build delegated to remote CI; polling manifest");
                self.await_remote_build(record).await
            }
            Err(e) => {
                warn!(error = %e, "remote delegation failed; building locally");
                self.build_locally(record).await
            }
        }
    }

    async fn await_remote_build(&self, record: PreparationRecord) -> Result<BuildOutcome> {
        let id = record.id.clone();
        let done = monitor::await_terminal(
            || Ok(self.store.load(&id)?.status.is_terminal_for_build()),
            self.config.build_timeout(),
            self.config.poll_interval(),
        )
        .await?;

        let record = self.store.load(&record.id)?;
        if !done {
            warn!(id = %record.id, status = %record.status, "build still pending after timeout");
            return Ok(BuildOutcome {
                record,
                artifact: None,
                simulated: false,
            });
        }

        let artifact = match record.status {
            PreparationStatus::BuildComplete => {
                notify::send(
                    self.notifier.as_ref(),
                    &format!("build succeeded for {} ({})", record.commit, record.id),
                )
                .await;
                self.cache.latest()?
            }
            _ => {
                notify::send(
                    self.notifier.as_ref(),
                    &format!("build failed for {} ({})", record.commit, record.id),
                )
                .await;
                None
            }
        };
        Ok(BuildOutcome {
            record,
            artifact,
            simulated: false,
        })
    }

    async fn build_locally(&self, mut record: PreparationRecord) -> Result<BuildOutcome> {
        let workspace = self.config.workspace_root.join(&record.id);
        let toolchain = toolchain::probe(self.config.sdk_root.as_deref());

        let (built, simulated) = if toolchain.usable() {
            (run_gradle(&workspace, &record), false)
        } else {
            // Deliberate fallback for hosts without a toolchain; must stay
            // visible to operators.
            warn!(id = %record.id, "no local toolchain; producing a SIMULATED package");
            (synthesize_package(&workspace, &record), true)
        };

        match built {
            Ok(package) => {
                record.advance(PreparationStatus::BuildComplete)?;
                self.store.save(&record)?;

                // Cache failures do not roll back an otherwise-successful build.
                let artifact = match self.cache.store(&record.id, &package) {
                    Ok(artifact) => Some(artifact),
                    Err(e) => {
                        error!(id = %record.id, error = %e, "failed to cache build artifact");
                        None
                    }
                };

                let label = if simulated { " (simulated)" } else { "" };
                notify::send(
                    self.notifier.as_ref(),
                    &format!(
                        "build succeeded for {} ({}){label}",
                        record.commit, record.id
                    ),
                )
                .await;
                Ok(BuildOutcome {
                    record,
                    artifact,
                    simulated,
                })
            }
            Err(e) => {
                error!(id = %record.id, error = %e, "local build failed");
                record.advance(PreparationStatus::BuildFailed)?;
                self.store.save(&record)?;
                notify::send(
                    self.notifier.as_ref(),
                    &format!("build failed for {} ({}): {e}", record.commit, record.id),
                )
                .await;
                // Never cache a failed build's output.
                Ok(BuildOutcome {
                    record,
                    artifact: None,
                    simulated,
                })
            }
        }
    }
}

/// Invoke Gradle in the staged workspace and locate the produced package.
fn run_gradle(workspace: &Path, record: &PreparationRecord) -> Result<PathBuf> {
    let output = Command::new("gradle")
        .arg(record.variant.gradle_task())
        .current_dir(workspace)
        .output()
        .map_err(|e| PipelineError::BuildFailed(format!("failed to run gradle: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PipelineError::BuildFailed(format!(
            "gradle {} failed: {}",
            record.variant.gradle_task(),
            stderr.trim()
        )));
    }

    let package = package_path(workspace, record);
    if !package.is_file() {
        return Err(PipelineError::BuildFailed(format!(
            "expected package missing: {}",
            package.display()
        )));
    }
    Ok(package)
}

/// Write a minimal placeholder package so downstream caching and
/// notification logic is still exercised on toolchain-less hosts.
fn synthesize_package(workspace: &Path, record: &PreparationRecord) -> Result<PathBuf> {
    let package = package_path(workspace, record);
    let out_dir = package
        .parent()
        .ok_or_else(|| PipelineError::BuildFailed("package path has no parent".into()))?;
    fs::create_dir_all(out_dir)
        .map_err(|e| PipelineError::BuildFailed(format!("create output dir: {e}")))?;

    let body = format!(
        "SIMULATED BUILD\npreparation: {}\ncommit: {}\nvariant: {}\ncreated: {}\n",
        record.id,
        record.commit,
        record.variant,
        Utc::now().to_rfc3339()
    );
    fs::write(&package, body)
        .map_err(|e| PipelineError::BuildFailed(format!("write placeholder: {e}")))?;
    Ok(package)
}

/// Conventional Gradle output location for the assembled variant.
fn package_path(workspace: &Path, record: &PreparationRecord) -> PathBuf {
    let variant = record.variant.as_str();
    workspace
        .join("app/build/outputs/apk")
        .join(variant)
        .join(format!("app-{variant}.apk"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{CollectingNotifier, RejectingRemoteCi};
    use shipwright_core::manifest::BuildVariant;

    fn config(dir: &Path) -> PipelineConfig {
        PipelineConfig {
            state_dir: dir.join("state"),
            workspace_root: dir.join("workspaces"),
            cache_dir: dir.join("cache"),
            ..PipelineConfig::default()
        }
    }

    fn gate(config: &PipelineConfig) -> (BuildGate, Arc<CollectingNotifier>) {
        let notifier = Arc::new(CollectingNotifier::new());
        let gate = BuildGate::new(config, Arc::new(RejectingRemoteCi), notifier.clone()).unwrap();
        (gate, notifier)
    }

    fn ready_record(store: &ManifestStore) -> PreparationRecord {
        let mut record = PreparationRecord::new(
            "abc123de99887766",
            BuildVariant::Debug,
            "acme/mobile-app",
            "main",
        );
        record.advance(PreparationStatus::Validating).unwrap();
        record.advance(PreparationStatus::ReadyForBuild).unwrap();
        record.build_ready = true;
        record.dependencies_ready = true;
        store.save(&record).unwrap();
        record
    }

    #[tokio::test]
    async fn test_gate_refuses_every_non_ready_status() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let store = ManifestStore::new(&config.state_dir).unwrap();
        let (gate, notifier) = gate(&config);

        for status in [
            PreparationStatus::Preparing,
            PreparationStatus::Validating,
            PreparationStatus::PreparationFailed,
            PreparationStatus::Building,
            PreparationStatus::BuildComplete,
            PreparationStatus::BuildFailed,
        ] {
            let mut record = PreparationRecord::new(
                "abc123de99887766",
                BuildVariant::Debug,
                "acme/mobile-app",
                "main",
            );
            record.status = status;
            store.save(&record).unwrap();

            let err = gate
                .trigger_build("abc123de99887766", Some(&record.id))
                .await
                .unwrap_err();
            assert!(
                matches!(err, PipelineError::PreparationNotReady { .. }),
                "status {status} must be refused"
            );
        }
        // No executor ran, so nothing was notified or cached.
        assert!(notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn test_build_for_unknown_commit() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let (gate, _) = gate(&config);

        let err = gate.trigger_build("cafebabe", None).await.unwrap_err();
        assert!(matches!(err, PipelineError::PreparationNotFound(_)));
    }

    #[tokio::test]
    async fn test_simulated_build_caches_and_aliases() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let store = ManifestStore::new(&config.state_dir).unwrap();
        let record = ready_record(&store);
        let (gate, notifier) = gate(&config);

        let outcome = gate
            .trigger_build("abc123de99887766", None)
            .await
            .unwrap();
        assert!(outcome.succeeded());
        assert!(outcome.simulated);

        let artifact = outcome.artifact.expect("artifact cached");
        assert_eq!(artifact.preparation_id, record.id);

        // Checksum in the metadata matches the stored file's content.
        let cache = ArtifactCache::new(&config.cache_dir).unwrap();
        let latest = cache.latest().unwrap().expect("latest alias set");
        assert_eq!(latest, artifact);
        let stored = fs::read(cache.artifact_path(&latest.file_name)).unwrap();
        use sha2::{Digest, Sha256};
        assert_eq!(hex::encode(Sha256::digest(&stored)), latest.checksum);

        assert_eq!(cache.list().unwrap().len(), 1);
        assert!(notifier.messages()[0].contains("simulated"));

        let persisted = store.load(&record.id).unwrap();
        assert_eq!(persisted.status, PreparationStatus::BuildComplete);
    }

    #[tokio::test]
    async fn test_retrigger_after_build_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let store = ManifestStore::new(&config.state_dir).unwrap();
        ready_record(&store);
        let (gate, _) = gate(&config);

        gate.trigger_build("abc123de99887766", None).await.unwrap();
        let err = gate
            .trigger_build("abc123de99887766", None)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::PreparationNotReady { .. }));
    }
}
