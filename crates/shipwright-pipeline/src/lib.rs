//! Shipwright pipeline orchestration.
//!
//! Wires the core state machine to its external collaborators: the
//! version-control hosting API, the remote CI system, and the notification
//! dispatcher. Preparation runs automatically on detected changes; builds
//! are gated behind a manual trigger.

pub mod build;
pub mod fakes;
pub mod health;
pub mod hosting;
pub mod notify;
pub mod prepare;
pub mod remote;
pub mod toolchain;
pub mod watch;

pub use build::{BuildGate, BuildOutcome};
pub use health::{check_health, HealthReport};
pub use hosting::{ChangeDetection, ChangeDetector, GitHubHostingApi, HostingApi};
pub use notify::{LogNotifier, Notifier};
pub use prepare::PreparationOrchestrator;
pub use remote::{GitHubActionsCi, RemoteCi, WorkflowAction, WorkflowRequest};
pub use toolchain::ToolchainStatus;
pub use watch::run_monitor_loop;
