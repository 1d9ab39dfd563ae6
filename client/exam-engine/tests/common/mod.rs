#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use talentgate_engine::models::answer::{AnswerValue, AutoSavePayload, SubmissionPayload};
use talentgate_engine::models::question::{AssessmentBundle, Question, QuestionKind};
use talentgate_engine::{
    AssessmentSource, EngineConfig, MediaAccess, PermissionProvider, SessionService, SessionState,
    SubmissionSink,
};

pub const OPEN_UA: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/120.0 Safari/537.36";
pub const LOCKED_UA: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 SEB/3.5.0 (x64)";

/// Engine config with intervals small enough for test wall-clocks. Autosave
/// and inactivity default to "effectively off"; tests that exercise them
/// override the relevant knob.
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        tick_interval_ms: 10,
        autosave_interval_ms: 60_000,
        inactivity_timeout_ms: 600_000,
        inactivity_poll_ms: 20,
        submit_max_attempts: 3,
        ..EngineConfig::default()
    }
}

pub struct StubSource {
    pub duration_ms: u64,
    pub question_count: usize,
    pub prior_answers: Option<HashMap<String, AnswerValue>>,
    pub fail: bool,
}

impl StubSource {
    pub fn new(duration_ms: u64, question_count: usize) -> Self {
        Self {
            duration_ms,
            question_count,
            prior_answers: None,
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            duration_ms: 0,
            question_count: 0,
            prior_answers: None,
            fail: true,
        }
    }
}

#[async_trait]
impl AssessmentSource for StubSource {
    async fn fetch_session(&self, _session_id: &str) -> Result<AssessmentBundle> {
        if self.fail {
            bail!("assessment service unavailable");
        }
        let questions = (1..=self.question_count)
            .map(|n| Question {
                id: format!("q{}", n),
                prompt: format!("Question {}", n),
                kind: QuestionKind::Essay,
                options: Vec::new(),
            })
            .collect();
        Ok(AssessmentBundle {
            duration_ms: self.duration_ms,
            questions,
            prior_answers: self.prior_answers.clone(),
        })
    }
}

/// Records every sink call; optionally fails the first N submits or all
/// auto-saves.
#[derive(Default)]
pub struct RecordingSink {
    pub submits: Mutex<Vec<SubmissionPayload>>,
    pub submit_attempts: AtomicUsize,
    pub fail_first_submits: usize,
    pub autosaves: Mutex<Vec<AutoSavePayload>>,
    pub fail_autosaves: bool,
}

impl RecordingSink {
    pub fn failing_first(n: usize) -> Self {
        Self {
            fail_first_submits: n,
            ..Self::default()
        }
    }

    pub fn failing_autosaves() -> Self {
        Self {
            fail_autosaves: true,
            ..Self::default()
        }
    }

    pub fn submit_count(&self) -> usize {
        self.submits.lock().unwrap().len()
    }

    pub fn autosave_count(&self) -> usize {
        self.autosaves.lock().unwrap().len()
    }
}

#[async_trait]
impl SubmissionSink for RecordingSink {
    async fn submit(&self, _session_id: &str, payload: &SubmissionPayload) -> Result<()> {
        let attempt = self.submit_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.fail_first_submits {
            bail!("submission sink unavailable (attempt {})", attempt);
        }
        self.submits.lock().unwrap().push(payload.clone());
        Ok(())
    }

    async fn auto_save(&self, _session_id: &str, payload: &AutoSavePayload) -> Result<()> {
        if self.fail_autosaves {
            bail!("autosave sink unavailable");
        }
        self.autosaves.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

pub struct StubPermissions {
    pub grant: bool,
}

#[async_trait]
impl PermissionProvider for StubPermissions {
    async fn request_media(&self) -> Result<MediaAccess> {
        Ok(if self.grant {
            MediaAccess::Granted
        } else {
            MediaAccess::Denied
        })
    }
}

/// Mount an `Open`-environment session against a stub source.
pub async fn open_session(
    config: EngineConfig,
    duration_ms: u64,
    question_count: usize,
    sink: Arc<RecordingSink>,
) -> SessionService {
    let source = Arc::new(StubSource::new(duration_ms, question_count));
    SessionService::mount(config, "sess-test", OPEN_UA, source, sink, None)
        .await
        .expect("mount should succeed")
}

pub async fn wait_for_state(service: &SessionService, wanted: SessionState) {
    let mut rx = service.state_updates();
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| *s == wanted))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {:?}", wanted))
        .expect("state channel closed");
}
