use anyhow::Result;
use async_trait::async_trait;

use crate::models::answer::{AutoSavePayload, SubmissionPayload};
use crate::models::question::AssessmentBundle;

pub mod answer_service;
pub mod autosave_service;
pub mod http_client;
pub mod integrity_service;
pub mod session_service;
pub mod submission_service;
pub mod timer_service;

/// Question/answer data source. Called once at mount; a failure here is
/// fatal to session start and no engine state survives it.
#[async_trait]
pub trait AssessmentSource: Send + Sync {
    async fn fetch_session(&self, session_id: &str) -> Result<AssessmentBundle>;
}

/// Persistence boundary for both final submission and periodic auto-save.
/// Auto-save errors are swallowed by the caller; submit errors are retried
/// under the bounded policy of the Submission Coordinator.
#[async_trait]
pub trait SubmissionSink: Send + Sync {
    async fn submit(&self, session_id: &str, payload: &SubmissionPayload) -> Result<()>;
    async fn auto_save(&self, session_id: &str, payload: &AutoSavePayload) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaAccess {
    Granted,
    Denied,
}

/// Camera/microphone consent, where the assessment requires it. The request
/// suspends on user consent; denial aborts start and leaves the session in
/// `NotStarted`.
#[async_trait]
pub trait PermissionProvider: Send + Sync {
    async fn request_media(&self) -> Result<MediaAccess>;
}
