//! Artifact cache with checksum metadata, a "latest" alias, and retention.
//!
//! Layout under the cache root:
//!
//! ```text
//! <root>/<preparation id>-<package name>            artifact bytes
//! <root>/<preparation id>-<package name>.meta.json  sidecar metadata
//! <root>/LATEST                                     name of the newest artifact
//! ```
//!
//! The alias is repointed only after both the copy and the metadata write
//! have landed, so `LATEST` never references a partially written file.
//! Retention sweeps artifacts only; preparation records and workspaces are
//! deliberately left alone (see DESIGN.md).

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::error::{PipelineError, Result};

const LATEST_ALIAS: &str = "LATEST";
const META_SUFFIX: &str = ".meta.json";

/// A successfully produced and cached package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedArtifact {
    /// Preparation record that produced this package.
    pub preparation_id: String,

    /// File name within the cache directory.
    pub file_name: String,

    /// Size of the artifact in bytes.
    pub size_bytes: u64,

    /// Hex-encoded SHA-256 of the artifact contents.
    pub checksum: String,

    /// When the artifact entered the cache.
    pub created_at: DateTime<Utc>,
}

/// Knobs for a retention sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Remove artifacts older than this many days.
    pub max_age_days: u64,
    /// Evict oldest artifacts first once the cache exceeds this many bytes.
    pub max_total_bytes: Option<u64>,
}

/// Result of a retention sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionReport {
    pub removed_count: usize,
    pub remaining_count: usize,
    pub reclaimed_bytes: u64,
    pub removed_files: Vec<String>,
}

/// Filesystem-backed artifact cache.
pub struct ArtifactCache {
    root: PathBuf,
}

impl ArtifactCache {
    /// Create a cache rooted at `root`, creating the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Absolute path of a cached artifact by file name.
    pub fn artifact_path(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    fn meta_path(&self, file_name: &str) -> PathBuf {
        self.root.join(format!("{file_name}{META_SUFFIX}"))
    }

    fn alias_path(&self) -> PathBuf {
        self.root.join(LATEST_ALIAS)
    }

    /// Copy a produced package into the cache and repoint the `latest` alias.
    ///
    /// Checksum and size are computed from the bytes actually copied. The
    /// alias moves only after the copy and the metadata write both succeed.
    pub fn store(&self, preparation_id: &str, artifact_path: &Path) -> Result<CachedArtifact> {
        let original = artifact_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                PipelineError::CacheWriteFailed(format!(
                    "artifact path has no file name: {}",
                    artifact_path.display()
                ))
            })?;
        let file_name = format!("{preparation_id}-{original}");

        let data = fs::read(artifact_path).map_err(|e| {
            PipelineError::CacheWriteFailed(format!(
                "cannot read {}: {e}",
                artifact_path.display()
            ))
        })?;
        let checksum = hex::encode(Sha256::digest(&data));

        let artifact = CachedArtifact {
            preparation_id: preparation_id.to_string(),
            file_name: file_name.clone(),
            size_bytes: data.len() as u64,
            checksum,
            created_at: Utc::now(),
        };

        self.write_atomic(&self.artifact_path(&file_name), &data)
            .map_err(|e| PipelineError::CacheWriteFailed(format!("copy {file_name}: {e}")))?;

        let meta = serde_json::to_vec_pretty(&artifact)?;
        self.write_atomic(&self.meta_path(&file_name), &meta)
            .map_err(|e| PipelineError::CacheWriteFailed(format!("metadata {file_name}: {e}")))?;

        self.write_atomic(&self.alias_path(), file_name.as_bytes())
            .map_err(|e| PipelineError::CacheWriteFailed(format!("latest alias: {e}")))?;

        info!(
            file = %file_name,
            size_bytes = artifact.size_bytes,
            "artifact cached and aliased as latest"
        );
        Ok(artifact)
    }

    fn write_atomic(&self, path: &Path, data: &[u8]) -> std::io::Result<()> {
        let mut tmp = NamedTempFile::new_in(&self.root)?;
        tmp.write_all(data)?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Resolve the `latest` alias; `None` when the cache has never stored.
    pub fn latest(&self) -> Result<Option<CachedArtifact>> {
        let name = match fs::read_to_string(self.alias_path()) {
            Ok(s) => s.trim().to_string(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        self.load_meta(&name).map(Some)
    }

    fn load_meta(&self, file_name: &str) -> Result<CachedArtifact> {
        let data = fs::read(self.meta_path(file_name)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PipelineError::ArtifactNotFound(file_name.to_string())
            } else {
                PipelineError::Io(e)
            }
        })?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// All cached artifacts, ordered by creation time, most recent last.
    pub fn list(&self) -> Result<Vec<CachedArtifact>> {
        let mut artifacts = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(file_name) = name.to_str().and_then(|n| n.strip_suffix(META_SUFFIX)) else {
                continue;
            };
            artifacts.push(self.load_meta(file_name)?);
        }
        artifacts.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.file_name.cmp(&b.file_name))
        });
        Ok(artifacts)
    }

    /// Copy a cached artifact to `destination`.
    ///
    /// A directory destination receives the artifact under its cached name;
    /// otherwise `destination` is the target file path.
    pub fn fetch(&self, file_name: &str, destination: &Path) -> Result<PathBuf> {
        let src = self.artifact_path(file_name);
        if !src.exists() {
            return Err(PipelineError::ArtifactNotFound(file_name.to_string()));
        }

        let dest = if destination.is_dir() {
            destination.join(file_name)
        } else {
            destination.to_path_buf()
        };
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&src, &dest)?;
        Ok(dest)
    }

    /// Apply the retention policy: an age sweep first, then oldest-first
    /// eviction until the cache fits the size budget.
    ///
    /// The sole remaining artifact is never deleted, even when over-age or
    /// over-budget; eviction stops short and logs a warning instead of
    /// leaving an empty cache behind a dangling alias.
    pub fn retain(&self, policy: &RetentionPolicy) -> Result<RetentionReport> {
        let mut artifacts = self.list()?;
        let mut removed_files = Vec::new();
        let mut reclaimed_bytes = 0u64;

        let cutoff = Utc::now() - chrono::Duration::days(policy.max_age_days as i64);

        // Phase 1: age sweep, oldest first.
        while let Some(oldest) = artifacts.first() {
            if oldest.created_at >= cutoff {
                break;
            }
            if artifacts.len() == 1 {
                warn!(
                    file = %oldest.file_name,
                    "retention stopped short: sole remaining artifact is over-age"
                );
                break;
            }
            let removed = artifacts.remove(0);
            self.remove_artifact(&removed)?;
            reclaimed_bytes += removed.size_bytes;
            removed_files.push(removed.file_name);
        }

        // Phase 2: size eviction, oldest first.
        if let Some(budget) = policy.max_total_bytes {
            let mut total: u64 = artifacts.iter().map(|a| a.size_bytes).sum();
            while total > budget {
                if artifacts.len() <= 1 {
                    warn!("retention stopped short: sole remaining artifact exceeds size budget");
                    break;
                }
                let removed = artifacts.remove(0);
                self.remove_artifact(&removed)?;
                total -= removed.size_bytes;
                reclaimed_bytes += removed.size_bytes;
                removed_files.push(removed.file_name);
            }
        }

        let report = RetentionReport {
            removed_count: removed_files.len(),
            remaining_count: artifacts.len(),
            reclaimed_bytes,
            removed_files,
        };
        info!(
            removed = report.removed_count,
            remaining = report.remaining_count,
            reclaimed_bytes = report.reclaimed_bytes,
            "retention sweep finished"
        );
        Ok(report)
    }

    fn remove_artifact(&self, artifact: &CachedArtifact) -> Result<()> {
        fs::remove_file(self.artifact_path(&artifact.file_name))?;
        fs::remove_file(self.meta_path(&artifact.file_name))?;
        Ok(())
    }
}
