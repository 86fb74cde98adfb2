//! Continuous monitoring: one detection pass per interval.
//!
//! A detected change starts preparation automatically; the build itself
//! always stays behind the manual trigger. Single logical thread of
//! control, no internal parallelism; the loop ends only with the process.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use shipwright_core::error::Result;

use crate::hosting::ChangeDetector;
use crate::prepare::PreparationOrchestrator;

/// Run detection passes forever, preparing on every new commit.
pub async fn run_monitor_loop(
    detector: &ChangeDetector,
    orchestrator: &PreparationOrchestrator,
    interval: Duration,
) -> Result<()> {
    info!(interval_secs = interval.as_secs(), "monitoring started");
    loop {
        match detector.detect().await {
            Ok(detection) if detection.changed => {
                info!(commit = %detection.commit, "change detected; starting preparation");
                match orchestrator.prepare(&detection.commit).await {
                    Ok(record) => {
                        info!(id = %record.id, status = %record.status, "preparation finished")
                    }
                    Err(e) => error!(error = %e, "preparation failed"),
                }
            }
            Ok(_) => debug!("no change"),
            Err(e) => warn!(error = %e, "detection pass failed"),
        }
        tokio::time::sleep(interval).await;
    }
}
