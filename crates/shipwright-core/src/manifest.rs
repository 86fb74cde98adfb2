//! Preparation records, the status state machine, and the manifest store.
//!
//! Every preparation attempt is persisted as one JSON manifest under the
//! state directory. The manifest is the rendezvous point with the remote CI
//! job: the remote side rewrites the same file to signal completion, and the
//! progress monitor observes it by polling.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{PipelineError, Result};

/// Build variant of the produced package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildVariant {
    Debug,
    Release,
}

impl BuildVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildVariant::Debug => "debug",
            BuildVariant::Release => "release",
        }
    }

    /// Gradle task that assembles this variant.
    pub fn gradle_task(&self) -> &'static str {
        match self {
            BuildVariant::Debug => "assembleDebug",
            BuildVariant::Release => "assembleRelease",
        }
    }
}

impl fmt::Display for BuildVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildVariant {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "debug" => Ok(BuildVariant::Debug),
            "release" => Ok(BuildVariant::Release),
            other => Err(format!("unknown build variant: {other}")),
        }
    }
}

/// Status of a preparation record.
///
/// Legal transitions:
///
/// ```text
/// preparing -> validating -> {ready-for-build | preparation-failed}
/// ready-for-build -> building -> {build-complete | build-failed}
/// ```
///
/// A remote CI job may also move `preparing` directly to a preparation
/// terminal when it performs validation on its side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PreparationStatus {
    Preparing,
    Validating,
    ReadyForBuild,
    PreparationFailed,
    Building,
    BuildComplete,
    BuildFailed,
}

impl PreparationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PreparationStatus::Preparing => "preparing",
            PreparationStatus::Validating => "validating",
            PreparationStatus::ReadyForBuild => "ready-for-build",
            PreparationStatus::PreparationFailed => "preparation-failed",
            PreparationStatus::Building => "building",
            PreparationStatus::BuildComplete => "build-complete",
            PreparationStatus::BuildFailed => "build-failed",
        }
    }

    /// Whether the preparation phase can make no further automatic progress.
    pub fn is_terminal_for_preparation(&self) -> bool {
        matches!(
            self,
            PreparationStatus::ReadyForBuild | PreparationStatus::PreparationFailed
        )
    }

    /// Whether the build phase can make no further automatic progress.
    pub fn is_terminal_for_build(&self) -> bool {
        matches!(
            self,
            PreparationStatus::BuildComplete | PreparationStatus::BuildFailed
        )
    }

    /// Whether moving to `next` is a legal forward transition.
    pub fn can_transition_to(self, next: PreparationStatus) -> bool {
        use PreparationStatus::*;
        matches!(
            (self, next),
            (Preparing, Validating)
                | (Preparing, ReadyForBuild)
                | (Preparing, PreparationFailed)
                | (Validating, ReadyForBuild)
                | (Validating, PreparationFailed)
                | (ReadyForBuild, Building)
                | (Building, BuildComplete)
                | (Building, BuildFailed)
        )
    }
}

impl fmt::Display for PreparationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One attempt to ready a build environment for a specific commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparationRecord {
    /// Unique identifier: UTC timestamp plus a prefix of the commit.
    pub id: String,

    /// Full commit reference this preparation targets.
    pub commit: String,

    /// Build variant to produce.
    pub variant: BuildVariant,

    /// Source repository slug (owner/name).
    pub repository: String,

    /// Tracked branch.
    pub branch: String,

    /// Current phase of this record.
    pub status: PreparationStatus,

    /// Whether a usable local toolchain was found during validation.
    pub environment_validated: bool,

    /// Whether the project skeleton and auxiliary scripts are staged.
    pub dependencies_ready: bool,

    /// Whether the environment is ready for a build to start.
    pub build_ready: bool,

    /// Builds are never started automatically from this record.
    pub manual_trigger_required: bool,

    /// When this preparation was created.
    pub created_at: DateTime<Utc>,
}

impl PreparationRecord {
    /// Create a new record in `preparing` status.
    ///
    /// The id combines a second-resolution timestamp with the first eight
    /// characters of the commit, so two concurrent preparations for the same
    /// commit get distinct ids. The flip side is that "find the preparation
    /// for commit X" is a newest-match lookup, not an exact one.
    pub fn new(commit: &str, variant: BuildVariant, repository: &str, branch: &str) -> Self {
        let created_at = Utc::now();
        let prefix: String = commit.chars().take(8).collect();
        let id = format!("{}-{}", created_at.format("%Y%m%d%H%M%S"), prefix);

        Self {
            id,
            commit: commit.to_string(),
            variant,
            repository: repository.to_string(),
            branch: branch.to_string(),
            status: PreparationStatus::Preparing,
            environment_validated: false,
            dependencies_ready: false,
            build_ready: false,
            manual_trigger_required: true,
            created_at,
        }
    }

    /// Advance the status, enforcing monotonic transitions.
    pub fn advance(&mut self, next: PreparationStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(PipelineError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// First eight characters of the commit, as embedded in the id.
    pub fn commit_prefix(&self) -> String {
        self.commit.chars().take(8).collect()
    }
}

/// Filesystem-backed store of preparation manifests.
///
/// Layout: `<root>/<record id>.json`, one pretty-printed record per file so
/// external tooling (and the remote CI job) can read and rewrite them.
pub struct ManifestStore {
    root: PathBuf,
}

impl ManifestStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn manifest_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    /// Persist a record, atomically replacing any previous version.
    pub fn save(&self, record: &PreparationRecord) -> Result<()> {
        let data = serde_json::to_vec_pretty(record)?;
        let path = self.manifest_path(&record.id);

        // Atomic write: temp file in the same directory, then rename.
        let mut tmp = NamedTempFile::new_in(&self.root)?;
        tmp.write_all(&data)?;
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Load a record by id.
    pub fn load(&self, id: &str) -> Result<PreparationRecord> {
        let path = self.manifest_path(id);
        let data = fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PipelineError::PreparationNotFound(id.to_string())
            } else {
                PipelineError::Io(e)
            }
        })?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Find the most recently created preparation whose id embeds the
    /// commit's prefix. Newest-match: concurrent preparations for the same
    /// commit are not deduplicated.
    pub fn find_latest_for_commit(&self, commit: &str) -> Result<PreparationRecord> {
        let prefix: String = commit.chars().take(8).collect();
        let suffix = format!("-{prefix}");

        let mut matching: Vec<String> = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            if stem.ends_with(&suffix) {
                matching.push(stem.to_string());
            }
        }

        // Ids start with a fixed-width UTC timestamp, so the lexicographic
        // maximum is the newest.
        matching.sort();
        match matching.last() {
            Some(id) => self.load(id),
            None => Err(PipelineError::PreparationNotFound(commit.to_string())),
        }
    }

    /// All records, ordered by creation time, most recent last.
    pub fn list(&self) -> Result<Vec<PreparationRecord>> {
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            records.push(self.load(stem)?);
        }
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(records)
    }
}

/// Persistence for the last commit reference the change detector observed.
///
/// The pointer is written only after a comparison has been made, never
/// speculatively.
pub struct PointerStore {
    path: PathBuf,
}

impl PointerStore {
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            path: state_dir.as_ref().join("last-seen-commit"),
        }
    }

    /// Read the last-seen commit; `None` when no pointer exists yet.
    pub fn load(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(s) => Ok(Some(s.trim().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist a new pointer value atomically.
    pub fn store(&self, commit: &str) -> Result<()> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| PipelineError::Io(std::io::Error::other("pointer path has no parent")))?;
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(commit.as_bytes())?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(commit: &str) -> PreparationRecord {
        PreparationRecord::new(commit, BuildVariant::Debug, "acme/mobile-app", "main")
    }

    #[test]
    fn test_new_record_defaults() {
        let r = record("abc123de99887766");
        assert_eq!(r.status, PreparationStatus::Preparing);
        assert!(!r.environment_validated);
        assert!(!r.dependencies_ready);
        assert!(!r.build_ready);
        assert!(r.manual_trigger_required);
        assert!(r.id.ends_with("-abc123de"));
    }

    #[test]
    fn test_status_serde_kebab_case() {
        let json = serde_json::to_string(&PreparationStatus::ReadyForBuild).unwrap();
        assert_eq!(json, "\"ready-for-build\"");
        let status: PreparationStatus = serde_json::from_str("\"build-complete\"").unwrap();
        assert_eq!(status, PreparationStatus::BuildComplete);
    }

    #[test]
    fn test_legal_preparation_transitions() {
        let mut r = record("abc123de");
        r.advance(PreparationStatus::Validating).unwrap();
        r.advance(PreparationStatus::ReadyForBuild).unwrap();
        r.advance(PreparationStatus::Building).unwrap();
        r.advance(PreparationStatus::BuildComplete).unwrap();
    }

    #[test]
    fn test_no_regression_to_earlier_phase() {
        let mut r = record("abc123de");
        r.advance(PreparationStatus::Validating).unwrap();
        r.advance(PreparationStatus::ReadyForBuild).unwrap();

        let err = r.advance(PreparationStatus::Preparing).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidTransition { .. }));
        assert_eq!(r.status, PreparationStatus::ReadyForBuild);

        let err = r.advance(PreparationStatus::Validating).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidTransition { .. }));
    }

    #[test]
    fn test_terminal_states_accept_no_transition() {
        for terminal in [
            PreparationStatus::PreparationFailed,
            PreparationStatus::BuildComplete,
            PreparationStatus::BuildFailed,
        ] {
            for next in [
                PreparationStatus::Preparing,
                PreparationStatus::Validating,
                PreparationStatus::ReadyForBuild,
                PreparationStatus::Building,
                PreparationStatus::BuildComplete,
                PreparationStatus::BuildFailed,
            ] {
                assert!(
                    !terminal.can_transition_to(next),
                    "{terminal} should not advance to {next}"
                );
            }
        }
    }

    #[test]
    fn test_terminal_classification() {
        assert!(PreparationStatus::ReadyForBuild.is_terminal_for_preparation());
        assert!(PreparationStatus::PreparationFailed.is_terminal_for_preparation());
        assert!(!PreparationStatus::Validating.is_terminal_for_preparation());

        assert!(PreparationStatus::BuildComplete.is_terminal_for_build());
        assert!(PreparationStatus::BuildFailed.is_terminal_for_build());
        assert!(!PreparationStatus::Building.is_terminal_for_build());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path()).unwrap();

        let r = record("abc123de99887766");
        store.save(&r).unwrap();
        let loaded = store.load(&r.id).unwrap();
        assert_eq!(loaded, r);
    }

    #[test]
    fn test_load_missing_is_preparation_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path()).unwrap();
        let err = store.load("20260101000000-deadbeef").unwrap_err();
        assert!(matches!(err, PipelineError::PreparationNotFound(_)));
    }

    #[test]
    fn test_find_latest_for_commit_prefers_newest() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path()).unwrap();

        let mut older = record("abc123de99887766");
        older.id = "20260101000000-abc123de".to_string();
        let mut newer = record("abc123de99887766");
        newer.id = "20260102000000-abc123de".to_string();
        let mut unrelated = record("feedface00112233");
        unrelated.id = "20260103000000-feedface".to_string();

        store.save(&older).unwrap();
        store.save(&newer).unwrap();
        store.save(&unrelated).unwrap();

        let found = store.find_latest_for_commit("abc123de99887766").unwrap();
        assert_eq!(found.id, newer.id);
    }

    #[test]
    fn test_find_latest_for_unknown_commit() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path()).unwrap();
        let err = store.find_latest_for_commit("cafebabe").unwrap_err();
        assert!(matches!(err, PipelineError::PreparationNotFound(_)));
    }

    #[test]
    fn test_list_ordered_by_creation() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path()).unwrap();

        let mut a = record("aaaaaaaa");
        a.id = "20260101000000-aaaaaaaa".to_string();
        a.created_at = "2026-01-01T00:00:00Z".parse().unwrap();
        let mut b = record("bbbbbbbb");
        b.id = "20260102000000-bbbbbbbb".to_string();
        b.created_at = "2026-01-02T00:00:00Z".parse().unwrap();

        store.save(&b).unwrap();
        store.save(&a).unwrap();

        let all = store.list().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, a.id);
        assert_eq!(all[1].id, b.id);
    }

    #[test]
    fn test_pointer_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let pointer = PointerStore::new(dir.path());

        assert_eq!(pointer.load().unwrap(), None);
        pointer.store("abc123de").unwrap();
        assert_eq!(pointer.load().unwrap(), Some("abc123de".to_string()));
        pointer.store("feedface").unwrap();
        assert_eq!(pointer.load().unwrap(), Some("feedface".to_string()));
    }

    #[test]
    fn test_variant_parse_and_task() {
        assert_eq!("debug".parse::<BuildVariant>().unwrap(), BuildVariant::Debug);
        assert_eq!(
            "release".parse::<BuildVariant>().unwrap(),
            BuildVariant::Release
        );
        assert!("beta".parse::<BuildVariant>().is_err());
        assert_eq!(BuildVariant::Release.gradle_task(), "assembleRelease");
    }
}
