use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use crate::metrics::AUTOSAVE_TOTAL;
use crate::models::answer::AutoSavePayload;
use crate::services::answer_service::AnswerStore;
use crate::services::integrity_service::ActivityTracker;
use crate::services::SubmissionSink;

/// Periodically flushes the answer store to the sink while the session is
/// active. Strictly best-effort: a failed flush is logged and the next tick
/// tries again naturally; nothing here can interrupt the exam.
pub struct AutoSaveScheduler {
    running: Arc<AtomicBool>,
}

impl AutoSaveScheduler {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn start(
        &self,
        session_id: &str,
        sink: Arc<dyn SubmissionSink>,
        answers: Arc<AnswerStore>,
        activity: Arc<ActivityTracker>,
        interval_ms: u64,
    ) {
        if self.running.swap(true, Ordering::AcqRel) {
            tracing::warn!("Auto-save scheduler already running, ignoring");
            return;
        }

        let running = Arc::clone(&self.running);
        let session_id = session_id.to_string();
        let interval = Duration::from_millis(interval_ms.max(1));

        tracing::info!(
            "Auto-save scheduler started: session={}, interval={}ms",
            session_id,
            interval_ms
        );

        tokio::spawn(async move {
            loop {
                sleep(interval).await;

                if !running.load(Ordering::Acquire) {
                    tracing::debug!("Auto-save scheduler stopped: session={}", session_id);
                    break;
                }

                let payload = AutoSavePayload {
                    answers: answers.snapshot(),
                    last_activity_at: activity.last_at(),
                };

                match sink.auto_save(&session_id, &payload).await {
                    Ok(()) => {
                        AUTOSAVE_TOTAL.with_label_values(&["ok"]).inc();
                        tracing::debug!(
                            "Auto-saved {} answers: session={}",
                            payload.answers.len(),
                            session_id
                        );
                    }
                    Err(e) => {
                        // swallowed: the next tick retries naturally
                        AUTOSAVE_TOTAL.with_label_values(&["error"]).inc();
                        tracing::warn!("Auto-save failed: session={}, error={:#}", session_id, e);
                    }
                }
            }
        });
    }

    /// Idempotent; the loop observes the flag on its next cycle.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Default for AutoSaveScheduler {
    fn default() -> Self {
        Self::new()
    }
}
