//! In-memory fakes for the external-seam traits (testing only).
//!
//! Satisfy the `HostingApi`, `RemoteCi`, and `Notifier` contracts without
//! network access, so orchestration paths can be exercised deterministically.

use std::sync::Mutex;

use async_trait::async_trait;

use shipwright_core::error::{PipelineError, Result};

use crate::hosting::HostingApi;
use crate::notify::Notifier;
use crate::remote::{RemoteCi, WorkflowRequest};

// ---------------------------------------------------------------------------
// FakeHostingApi
// ---------------------------------------------------------------------------

/// Hosting API returning a settable commit, or failing as unreachable.
#[derive(Debug)]
pub struct FakeHostingApi {
    commit: Mutex<Option<String>>,
}

impl FakeHostingApi {
    pub fn with_commit(commit: &str) -> Self {
        Self {
            commit: Mutex::new(Some(commit.to_string())),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            commit: Mutex::new(None),
        }
    }

    /// Move the simulated branch head.
    pub fn set_commit(&self, commit: &str) {
        *self.commit.lock().unwrap() = Some(commit.to_string());
    }
}

#[async_trait]
impl HostingApi for FakeHostingApi {
    async fn latest_commit(&self, _repository: &str, _branch: &str) -> Result<String> {
        self.commit
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| PipelineError::ApiUnavailable("fake hosting API is offline".into()))
    }
}

// ---------------------------------------------------------------------------
// Remote CI fakes
// ---------------------------------------------------------------------------

/// Remote CI whose trigger is always refused, forcing local fallback.
pub struct RejectingRemoteCi;

#[async_trait]
impl RemoteCi for RejectingRemoteCi {
    async fn dispatch(&self, _request: &WorkflowRequest) -> Result<()> {
        Err(PipelineError::ApiUnavailable(
            "fake remote CI refuses all dispatches".into(),
        ))
    }
}

/// Remote CI that accepts every trigger and records the requests.
#[derive(Debug, Default)]
pub struct RecordingRemoteCi {
    requests: Mutex<Vec<WorkflowRequest>>,
}

impl RecordingRemoteCi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<WorkflowRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteCi for RecordingRemoteCi {
    async fn dispatch(&self, request: &WorkflowRequest) -> Result<()> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Notifier fakes
// ---------------------------------------------------------------------------

/// Notifier collecting delivered messages.
#[derive(Debug, Default)]
pub struct CollectingNotifier {
    messages: Mutex<Vec<String>>,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for CollectingNotifier {
    async fn notify(&self, message: &str) -> Result<()> {
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

/// Notifier whose delivery always fails.
pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify(&self, _message: &str) -> Result<()> {
        Err(PipelineError::NotificationFailed(
            "fake channel is down".into(),
        ))
    }
}
