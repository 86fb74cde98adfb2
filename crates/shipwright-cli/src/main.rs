//! Shipwright - gated two-phase mobile build pipeline CLI
//!
//! The `shipwright` command keeps a build environment warm without burning
//! resources on every push: preparation runs automatically when the tracked
//! branch moves, and the actual build waits for an explicit trigger.
//!
//! ## Commands
//!
//! - `detect-change`: one detection pass against the tracked branch
//! - `monitor`: continuous detection loop; prepares on every new commit
//! - `prepare`: ready a build environment for a commit
//! - `build`: manually trigger a build from a ready preparation
//! - `artifacts`: list or fetch cached packages
//! - `health`: probe external dependencies and local state
//! - `retention`: sweep old artifacts from the cache

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::Level;

use shipwright_core::cache::{ArtifactCache, RetentionPolicy};
use shipwright_core::manifest::PreparationStatus;
use shipwright_core::{init_tracing, PipelineConfig};
use shipwright_pipeline::{
    check_health, run_monitor_loop, BuildGate, ChangeDetector, GitHubActionsCi, GitHubHostingApi,
    HostingApi, LogNotifier, PreparationOrchestrator,
};

#[derive(Parser)]
#[command(name = "shipwright")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Gated two-phase mobile build pipeline", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare the branch head against the last-seen commit
    DetectChange,

    /// Run detection continuously, preparing on every new commit
    Monitor {
        /// Seconds between detection passes
        #[arg(short, long, default_value = "300")]
        interval: u64,
    },

    /// Ready a build environment for a commit
    Prepare {
        /// Commit reference (default: current branch head)
        commit: Option<String>,
    },

    /// Manually trigger a build from a ready preparation
    Build {
        /// Commit reference the preparation targets
        commit: String,

        /// Explicit preparation id (default: newest match for the commit)
        #[arg(short, long)]
        preparation: Option<String>,
    },

    /// Inspect cached build artifacts
    Artifacts {
        #[command(subcommand)]
        action: ArtifactsAction,
    },

    /// Probe external dependencies and local state
    Health,

    /// Sweep old artifacts from the cache
    Retention {
        /// Remove artifacts older than this many days
        #[arg(long)]
        max_age_days: Option<u64>,

        /// Evict oldest artifacts once the cache exceeds this size
        #[arg(long)]
        max_total_mb: Option<u64>,
    },
}

#[derive(Subcommand)]
enum ArtifactsAction {
    /// List cached artifacts, most recent last
    List,

    /// Copy a cached artifact out of the cache
    Fetch {
        /// Cached file name (see `artifacts list`)
        name: String,

        /// Destination file or directory
        destination: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    // The single place ambient environment state is read.
    let config = PipelineConfig::from_env();

    match cli.command {
        Commands::DetectChange => detect_change(&config).await,
        Commands::Monitor { interval } => monitor(&config, interval).await,
        Commands::Prepare { commit } => prepare(&config, commit).await,
        Commands::Build {
            commit,
            preparation,
        } => build(&config, &commit, preparation.as_deref()).await,
        Commands::Artifacts { action } => artifacts(&config, action),
        Commands::Health => health(&config).await,
        Commands::Retention {
            max_age_days,
            max_total_mb,
        } => retention(&config, max_age_days, max_total_mb),
    }
}

async fn detect_change(config: &PipelineConfig) -> Result<()> {
    let api: Arc<dyn HostingApi> = Arc::new(GitHubHostingApi::new(config)?);
    let detector = ChangeDetector::new(config, api);

    let detection = detector.detect().await.context("detection pass failed")?;
    if detection.changed {
        println!("changed: {}", detection.commit);
    } else {
        println!("unchanged: {}", detection.commit);
    }
    Ok(())
}

async fn monitor(config: &PipelineConfig, interval: u64) -> Result<()> {
    let api: Arc<dyn HostingApi> = Arc::new(GitHubHostingApi::new(config)?);
    let detector = ChangeDetector::new(config, api);
    let orchestrator = PreparationOrchestrator::new(
        config,
        Arc::new(GitHubActionsCi::new(config)?),
        Arc::new(LogNotifier),
    )?;

    run_monitor_loop(&detector, &orchestrator, Duration::from_secs(interval))
        .await
        .context("monitoring loop failed")
}

async fn prepare(config: &PipelineConfig, commit: Option<String>) -> Result<()> {
    let commit = match commit {
        Some(commit) => commit,
        None => {
            let api = GitHubHostingApi::new(config)?;
            api.latest_commit(&config.repository, &config.branch)
                .await
                .context("cannot resolve branch head")?
        }
    };

    let orchestrator = PreparationOrchestrator::new(
        config,
        Arc::new(GitHubActionsCi::new(config)?),
        Arc::new(LogNotifier),
    )?;
    let record = orchestrator
        .prepare(&commit)
        .await
        .context("preparation failed")?;

    println!("preparation {} -> {}", record.id, record.status);
    if record.status == PreparationStatus::PreparationFailed {
        bail!("preparation {} failed", record.id);
    }
    Ok(())
}

async fn build(
    config: &PipelineConfig,
    commit: &str,
    preparation: Option<&str>,
) -> Result<()> {
    let gate = BuildGate::new(
        config,
        Arc::new(GitHubActionsCi::new(config)?),
        Arc::new(LogNotifier),
    )?;

    let outcome = gate
        .trigger_build(commit, preparation)
        .await
        .context("build trigger refused")?;

    println!(
        "build {} -> {}{}",
        outcome.record.id,
        outcome.record.status,
        if outcome.simulated { " (simulated)" } else { "" }
    );
    if let Some(artifact) = &outcome.artifact {
        println!(
            "cached {} ({} bytes, sha256 {})",
            artifact.file_name, artifact.size_bytes, artifact.checksum
        );
    }
    if !outcome.succeeded() {
        bail!("build ended in {}", outcome.record.status);
    }
    Ok(())
}

fn artifacts(config: &PipelineConfig, action: ArtifactsAction) -> Result<()> {
    let cache = ArtifactCache::new(&config.cache_dir)?;
    match action {
        ArtifactsAction::List => {
            let all = cache.list()?;
            if all.is_empty() {
                println!("cache is empty");
                return Ok(());
            }
            let latest = cache.latest()?;
            for artifact in &all {
                let marker = match &latest {
                    Some(l) if l.file_name == artifact.file_name => " (latest)",
                    _ => "",
                };
                println!(
                    "{}  {:>10} bytes  {}{}",
                    artifact.created_at.format("%Y-%m-%d %H:%M:%S"),
                    artifact.size_bytes,
                    artifact.file_name,
                    marker
                );
            }
            Ok(())
        }
        ArtifactsAction::Fetch { name, destination } => {
            let dest = cache.fetch(&name, &destination)?;
            println!("fetched {} -> {}", name, dest.display());
            Ok(())
        }
    }
}

async fn health(config: &PipelineConfig) -> Result<()> {
    let api = GitHubHostingApi::new(config)?;
    let report = check_health(config, &api).await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.healthy() {
        bail!("pipeline is unhealthy");
    }
    Ok(())
}

fn retention(
    config: &PipelineConfig,
    max_age_days: Option<u64>,
    max_total_mb: Option<u64>,
) -> Result<()> {
    let cache = ArtifactCache::new(&config.cache_dir)?;
    let policy = RetentionPolicy {
        max_age_days: max_age_days.unwrap_or(config.retention_max_age_days),
        max_total_bytes: max_total_mb
            .map(|mb| mb * 1024 * 1024)
            .or(config.retention_max_total_bytes),
    };

    let report = cache.retain(&policy)?;
    println!(
        "removed {} artifact(s), {} remaining, {} bytes reclaimed",
        report.removed_count, report.remaining_count, report.reclaimed_bytes
    );
    for file in &report.removed_files {
        println!("  removed {file}");
    }
    Ok(())
}
