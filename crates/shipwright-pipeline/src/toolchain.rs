//! Local Android toolchain probing.
//!
//! The pipeline relies on the remote CI system for the real compile step,
//! so a missing local toolchain is a logged, non-fatal condition during
//! preparation. The build phase uses the probe to choose between a real
//! Gradle invocation and a simulated package.

use std::path::Path;
use std::process::Command;

use tracing::debug;

/// What the probe found on this host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolchainStatus {
    /// Gradle is runnable on PATH.
    pub gradle: bool,
    /// A configured Android SDK root exists.
    pub sdk: bool,
}

impl ToolchainStatus {
    /// Whether a local build can actually be attempted.
    pub fn usable(&self) -> bool {
        self.gradle && self.sdk
    }
}

/// Check whether Gradle is available on PATH.
pub fn is_gradle_available() -> bool {
    Command::new("gradle")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Probe for a usable local toolchain. The SDK root comes from config, not
/// from ambient environment state.
pub fn probe(sdk_root: Option<&Path>) -> ToolchainStatus {
    let status = ToolchainStatus {
        gradle: is_gradle_available(),
        sdk: sdk_root.map(Path::is_dir).unwrap_or(false),
    };
    debug!(gradle = status.gradle, sdk = status.sdk, "toolchain probe");
    status
}
