use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::metrics::{SUBMIT_FORCED_ACKS_TOTAL, SUBMIT_RETRIES_TOTAL};
use crate::models::answer::SubmissionPayload;
use crate::services::SubmissionSink;
use crate::utils::retry::{retry_async_with_config, RetryConfig};

/// Performs the exactly-once terminal sink call.
///
/// The state machine's single-writer guard already ensures one invocation;
/// the coordinator keeps its own flag as well so a second call is a no-op
/// even if a future caller bypasses the machine.
pub struct SubmissionCoordinator {
    sink: Arc<dyn SubmissionSink>,
    retry: RetryConfig,
    submitted: AtomicBool,
}

impl SubmissionCoordinator {
    pub fn new(sink: Arc<dyn SubmissionSink>, max_attempts: usize) -> Self {
        Self {
            sink,
            retry: RetryConfig::submission().with_max_attempts(max_attempts),
            submitted: AtomicBool::new(false),
        }
    }

    /// Deliver the payload, retrying under the bounded policy. Always
    /// resolves to an acknowledgement: after exhausting retries the
    /// submission is acked locally so the session can reach `Submitted`
    /// rather than dangle in `Terminating`. That trade-off (guaranteed
    /// terminal UX over a small risk of sink loss) is deliberate.
    pub async fn submit(&self, session_id: &str, payload: &SubmissionPayload) {
        if self.submitted.swap(true, Ordering::AcqRel) {
            tracing::warn!(
                "Duplicate terminal submission suppressed: session={}",
                session_id
            );
            return;
        }

        tracing::info!(
            "Submitting assessment: session={}, reason={}, answers={}, complete={}",
            session_id,
            payload.reason,
            payload.answers.len(),
            payload.complete
        );

        let mut attempts = 0usize;
        let result = retry_async_with_config(self.retry.clone(), || {
            attempts += 1;
            if attempts > 1 {
                SUBMIT_RETRIES_TOTAL.inc();
            }
            let sink = Arc::clone(&self.sink);
            async move { sink.submit(session_id, payload).await }
        })
        .await;

        match result {
            Ok(()) => {
                tracing::info!(
                    "Submission acknowledged by sink: session={}, attempts={}",
                    session_id,
                    attempts
                );
            }
            Err(e) => {
                SUBMIT_FORCED_ACKS_TOTAL.inc();
                tracing::error!(
                    "Submission sink unreachable after {} attempts, forcing local ack: session={}, error={:#}",
                    attempts,
                    session_id,
                    e
                );
            }
        }
    }

    pub fn has_submitted(&self) -> bool {
        self.submitted.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;

    use crate::models::answer::AutoSavePayload;

    struct FlakySink {
        calls: AtomicUsize,
        fail_first: usize,
    }

    #[async_trait]
    impl SubmissionSink for FlakySink {
        async fn submit(&self, _session_id: &str, _payload: &SubmissionPayload) -> Result<()> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                bail!("sink unavailable");
            }
            Ok(())
        }

        async fn auto_save(&self, _session_id: &str, _payload: &AutoSavePayload) -> Result<()> {
            Ok(())
        }
    }

    fn payload() -> SubmissionPayload {
        SubmissionPayload {
            answers: HashMap::new(),
            reason: "manual".to_string(),
            complete: false,
            submitted_at: Utc::now(),
            telemetry: None,
        }
    }

    #[tokio::test]
    async fn second_call_is_a_no_op() {
        let sink = Arc::new(FlakySink {
            calls: AtomicUsize::new(0),
            fail_first: 0,
        });
        let coordinator = SubmissionCoordinator::new(sink.clone(), 3);

        coordinator.submit("s-1", &payload()).await;
        coordinator.submit("s-1", &payload()).await;

        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
        assert!(coordinator.has_submitted());
    }

    #[tokio::test]
    async fn transient_failure_is_retried() {
        let sink = Arc::new(FlakySink {
            calls: AtomicUsize::new(0),
            fail_first: 2,
        });
        let coordinator = SubmissionCoordinator::new(sink.clone(), 3);

        coordinator.submit("s-2", &payload()).await;

        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_still_ack() {
        let sink = Arc::new(FlakySink {
            calls: AtomicUsize::new(0),
            fail_first: usize::MAX,
        });
        let coordinator = SubmissionCoordinator::new(sink.clone(), 3);

        // resolves without error; the session is never left dangling
        coordinator.submit("s-3", &payload()).await;

        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
        assert!(coordinator.has_submitted());
    }
}
