//! Poll-until-terminal progress monitoring with a bounded timeout.
//!
//! The monitor knows nothing about what it is waiting for beyond the
//! predicate it is given; the same loop serves both the
//! preparation-completion and build-completion waits.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::info;

use crate::error::Result;

/// Default interval between predicate polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Log a heartbeat roughly this often while waiting.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(300);

/// Repeatedly invoke `check` until it reports a terminal state or `timeout`
/// elapses.
///
/// Returns `Ok(false)` on timeout. Callers treat that as "stalled", not as a
/// failure classification: the underlying job may still complete later and
/// be observed by a subsequent invocation.
pub async fn await_terminal<F>(
    mut check: F,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<bool>
where
    F: FnMut() -> Result<bool>,
{
    let started = Instant::now();
    let mut last_heartbeat = started;

    loop {
        if check()? {
            return Ok(true);
        }
        if started.elapsed() >= timeout {
            return Ok(false);
        }
        if last_heartbeat.elapsed() >= HEARTBEAT_INTERVAL {
            info!(
                waited_secs = started.elapsed().as_secs(),
                "still waiting for terminal status"
            );
            last_heartbeat = Instant::now();
        }
        sleep(poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    #[tokio::test]
    async fn test_immediate_terminal() {
        let done = await_terminal(
            || Ok(true),
            Duration::from_secs(5),
            Duration::from_millis(1),
        )
        .await
        .unwrap();
        assert!(done);
    }

    #[tokio::test]
    async fn test_terminal_after_polls() {
        let mut calls = 0;
        let done = await_terminal(
            || {
                calls += 1;
                Ok(calls >= 3)
            },
            Duration::from_secs(5),
            Duration::from_millis(1),
        )
        .await
        .unwrap();
        assert!(done);
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_timeout_reports_stall() {
        let done = await_terminal(
            || Ok(false),
            Duration::from_millis(20),
            Duration::from_millis(5),
        )
        .await
        .unwrap();
        assert!(!done);
    }

    #[tokio::test]
    async fn test_predicate_error_propagates() {
        let result = await_terminal(
            || Err(PipelineError::PreparationNotFound("gone".to_string())),
            Duration::from_secs(1),
            Duration::from_millis(1),
        )
        .await;
        assert!(matches!(
            result,
            Err(PipelineError::PreparationNotFound(_))
        ));
    }
}
