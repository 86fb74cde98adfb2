//! Shipwright Core Library
//!
//! Domain model for the two-phase build pipeline: the preparation status
//! state machine and manifest store, the poll-based progress monitor, and
//! the artifact cache with retention and "latest" aliasing.

pub mod cache;
pub mod config;
pub mod error;
pub mod manifest;
pub mod monitor;
pub mod telemetry;

pub use cache::{ArtifactCache, CachedArtifact, RetentionPolicy, RetentionReport};
pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use manifest::{
    BuildVariant, ManifestStore, PointerStore, PreparationRecord, PreparationStatus,
};
pub use monitor::{await_terminal, DEFAULT_POLL_INTERVAL};
pub use telemetry::init_tracing;

/// Shipwright version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
