use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::config::EngineConfig;
use crate::metrics::{SESSIONS_ACTIVE, SESSIONS_TOTAL, SUBMISSIONS_TOTAL, VIOLATIONS_TOTAL};
use crate::models::answer::{AnswerValue, SubmissionPayload};
use crate::models::integrity::{
    EventDisposition, HostEvent, IncidentRecord, IntegrityTelemetry, ViolationKind,
};
use crate::models::question::Question;
use crate::models::timer::TimerEvent;
use crate::models::{Environment, RenderState, SessionState, TerminationReason, UserIntent};
use crate::services::answer_service::AnswerStore;
use crate::services::autosave_service::AutoSaveScheduler;
use crate::services::integrity_service::{ActivityTracker, IntegrityMonitor};
use crate::services::submission_service::SubmissionCoordinator;
use crate::services::timer_service::CountdownClock;
use crate::services::{AssessmentSource, MediaAccess, PermissionProvider, SubmissionSink};
use crate::utils::time::format_clock;

/// Setup failures are fatal to session start: nothing is installed, no
/// partial state survives, and the caller may simply mount again.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("failed to load assessment: {0:#}")]
    Fetch(anyhow::Error),
    #[error("media permission denied")]
    PermissionDenied,
    #[error("media permission request failed: {0:#}")]
    Permission(anyhow::Error),
    #[error("session already started")]
    AlreadyStarted,
}

struct SessionCore {
    state: SessionState,
    started_at: Option<DateTime<Utc>>,
    termination_reason: Option<TerminationReason>,
    current_index: usize,
}

struct SessionInner {
    session_id: String,
    config: EngineConfig,
    environment: Environment,
    questions: Vec<Question>,
    sink: Arc<dyn SubmissionSink>,
    permissions: Option<Arc<dyn PermissionProvider>>,
    core: Mutex<SessionCore>,
    /// Single-writer termination guard. The first signal to win the
    /// compare-and-set owns the transition; every later signal is discarded,
    /// whatever callback it arrived on.
    terminating: AtomicBool,
    answers: Arc<AnswerStore>,
    activity: Arc<ActivityTracker>,
    clock: CountdownClock,
    /// `Some` iff `environment == Open`. A locked kiosk session never even
    /// constructs the monitor.
    monitor: Option<Arc<IntegrityMonitor>>,
    autosave: Arc<AutoSaveScheduler>,
    coordinator: SubmissionCoordinator,
    incidents: Mutex<Vec<IncidentRecord>>,
    state_tx: watch::Sender<SessionState>,
}

/// One assessment session: the state machine plus the components it wires
/// together. Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct SessionService {
    inner: Arc<SessionInner>,
}

impl SessionService {
    /// Load assessment metadata and build the session in `NotStarted`. The
    /// data source is consulted exactly once, and the environment is
    /// classified exactly once; neither is ever re-evaluated mid-session.
    pub async fn mount(
        config: EngineConfig,
        session_id: &str,
        host_signature: &str,
        source: Arc<dyn AssessmentSource>,
        sink: Arc<dyn SubmissionSink>,
        permissions: Option<Arc<dyn PermissionProvider>>,
    ) -> Result<SessionService, StartError> {
        let bundle = source
            .fetch_session(session_id)
            .await
            .map_err(StartError::Fetch)?;

        let environment = Environment::detect(host_signature, &config.locked_signatures);

        tracing::info!(
            "Session mounted: id={}, environment={:?}, questions={}, duration={}ms",
            session_id,
            environment,
            bundle.questions.len(),
            bundle.duration_ms
        );

        let answers = Arc::new(AnswerStore::new());
        if let Some(prior) = bundle.prior_answers {
            answers.seed(prior);
        }

        let monitor = match environment {
            Environment::Open => Some(Arc::new(IntegrityMonitor::new())),
            Environment::Locked => None,
        };

        let coordinator = SubmissionCoordinator::new(Arc::clone(&sink), config.submit_max_attempts);
        let (state_tx, _) = watch::channel(SessionState::NotStarted);

        Ok(SessionService {
            inner: Arc::new(SessionInner {
                session_id: session_id.to_string(),
                environment,
                questions: bundle.questions,
                sink,
                permissions,
                core: Mutex::new(SessionCore {
                    state: SessionState::NotStarted,
                    started_at: None,
                    termination_reason: None,
                    current_index: 0,
                }),
                terminating: AtomicBool::new(false),
                answers,
                activity: Arc::new(ActivityTracker::new()),
                clock: CountdownClock::new(bundle.duration_ms),
                monitor,
                autosave: Arc::new(AutoSaveScheduler::new()),
                coordinator,
                incidents: Mutex::new(Vec::new()),
                state_tx,
                config,
            }),
        })
    }

    /// `NotStarted → Active`. Requests device permissions first where the
    /// assessment requires them; a denial aborts and the session stays in
    /// `NotStarted` with no timer or watcher installed.
    pub async fn start(&self) -> Result<(), StartError> {
        if self.state() != SessionState::NotStarted {
            tracing::warn!(
                "start() rejected, session not in NotStarted: id={}",
                self.inner.session_id
            );
            return Err(StartError::AlreadyStarted);
        }

        if let Some(provider) = &self.inner.permissions {
            match provider.request_media().await {
                Ok(MediaAccess::Granted) => {}
                Ok(MediaAccess::Denied) => {
                    tracing::warn!(
                        "Media permission denied, start aborted: id={}",
                        self.inner.session_id
                    );
                    return Err(StartError::PermissionDenied);
                }
                Err(e) => {
                    tracing::warn!(
                        "Media permission request failed, start aborted: id={}, error={:#}",
                        self.inner.session_id,
                        e
                    );
                    return Err(StartError::Permission(e));
                }
            }
        }

        {
            let mut core = self.lock_core();
            if core.state != SessionState::NotStarted {
                return Err(StartError::AlreadyStarted);
            }
            core.state = SessionState::Active;
            core.started_at = Some(Utc::now());
        }
        self.publish_state(SessionState::Active);

        SESSIONS_TOTAL.with_label_values(&["started"]).inc();
        SESSIONS_ACTIVE.inc();
        tracing::info!(
            "Session started: id={}, environment={:?}",
            self.inner.session_id,
            self.inner.environment
        );

        let ticks = self
            .inner
            .clock
            .start(&self.inner.session_id, self.inner.config.tick_interval_ms);
        self.spawn_clock_listener(ticks);

        if let Some(monitor) = &self.inner.monitor {
            let violations = monitor.attach(
                Arc::clone(&self.inner.activity),
                self.inner.config.inactivity_timeout_ms,
                self.inner.config.inactivity_poll_ms,
            );
            self.spawn_violation_listener(violations);
        }

        self.inner.autosave.start(
            &self.inner.session_id,
            Arc::clone(&self.inner.sink),
            Arc::clone(&self.inner.answers),
            Arc::clone(&self.inner.activity),
            self.inner.config.autosave_interval_ms,
        );

        Ok(())
    }

    /// Record a response. Allowed only while `Active`; anything else is a
    /// logged no-op.
    pub fn answer(&self, question_id: &str, value: AnswerValue) {
        if self.state() != SessionState::Active {
            tracing::warn!(
                "Answer ignored, session not active: id={}, question={}",
                self.inner.session_id,
                question_id
            );
            return;
        }
        if !self.inner.questions.iter().any(|q| q.id == question_id) {
            tracing::warn!(
                "Answer ignored, unknown question: id={}, question={}",
                self.inner.session_id,
                question_id
            );
            return;
        }
        self.inner.answers.set(question_id, value);
        self.inner.activity.touch();
    }

    /// Move the current-question cursor, clamped to the question list.
    pub fn navigate(&self, index: usize) {
        if self.state() != SessionState::Active {
            return;
        }
        let clamped = index.min(self.inner.questions.len().saturating_sub(1));
        self.lock_core().current_index = clamped;
    }

    /// Candidate-initiated submission. Blocked while unanswered questions
    /// remain unless `force` is set; auto-submits (violation, expiry) never
    /// consult this gate. Returns whether the termination was accepted.
    pub fn manual_submit(&self, force: bool) -> bool {
        if self.state() != SessionState::Active {
            tracing::warn!(
                "Manual submit ignored, session not active: id={}",
                self.inner.session_id
            );
            return false;
        }
        if !force && !self.inner.answers.is_complete(&self.inner.questions) {
            tracing::warn!(
                "Manual submit blocked, unanswered questions remain: id={}",
                self.inner.session_id
            );
            return false;
        }
        self.request_termination(TerminationReason::Manual);
        true
    }

    /// Entry point for every forwarded host/browser event. Returns what the
    /// host must do with the event; the returned `cancel_default` must be
    /// honored synchronously, before termination lands.
    pub fn handle_host_event(&self, event: &HostEvent) -> EventDisposition {
        if self.inner.terminating.load(Ordering::Acquire) {
            return EventDisposition::ignore();
        }
        if self.state() != SessionState::Active {
            return EventDisposition::ignore();
        }

        if matches!(
            event,
            HostEvent::PointerMoved { .. } | HostEvent::KeyDown { .. }
        ) {
            self.inner.activity.touch();
        }

        let Some(monitor) = &self.inner.monitor else {
            // locked kiosk host: it enforces its own lockdown
            return EventDisposition::ignore();
        };

        let disposition = monitor.handle_event(event);
        if let Some(kind) = disposition.violation {
            self.raise_violation(kind, None);
        }
        disposition
    }

    /// Route a UI intent into the state machine.
    pub async fn dispatch(&self, intent: UserIntent) -> Result<(), StartError> {
        match intent {
            UserIntent::Start => self.start().await,
            UserIntent::Answer { question_id, value } => {
                self.answer(&question_id, value);
                Ok(())
            }
            UserIntent::Navigate { index } => {
                self.navigate(index);
                Ok(())
            }
            UserIntent::ManualSubmit { force } => {
                self.manual_submit(force);
                Ok(())
            }
        }
    }

    /// Immutable snapshot for the UI surface.
    pub fn render_state(&self) -> RenderState {
        let core = self.lock_core();
        let remaining_ms = self.inner.clock.remaining_ms();
        let violation_message = match core.termination_reason {
            Some(TerminationReason::Violation(kind)) => Some(kind.message().to_string()),
            _ => None,
        };
        RenderState {
            state: core.state,
            remaining_ms,
            remaining_clock: format_clock(remaining_ms),
            current_question_index: core.current_index,
            answers: self.inner.answers.snapshot(),
            violation_message,
            started_at: core.started_at,
        }
    }

    pub fn state(&self) -> SessionState {
        self.lock_core().state
    }

    /// Subscribe to state transitions.
    pub fn state_updates(&self) -> watch::Receiver<SessionState> {
        self.inner.state_tx.subscribe()
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn environment(&self) -> Environment {
        self.inner.environment
    }

    pub fn questions(&self) -> &[Question] {
        &self.inner.questions
    }

    pub fn remaining_ms(&self) -> u64 {
        self.inner.clock.remaining_ms()
    }

    pub fn termination_reason(&self) -> Option<TerminationReason> {
        self.lock_core().termination_reason
    }

    fn spawn_clock_listener(&self, mut ticks: mpsc::UnboundedReceiver<TimerEvent>) {
        let service = self.clone();
        tokio::spawn(async move {
            while let Some(event) = ticks.recv().await {
                match event {
                    TimerEvent::TimerTick(ref tick) => {
                        tracing::debug!(
                            "Tick: session={}, remaining={}ms",
                            tick.session_id,
                            tick.remaining_ms
                        );
                    }
                    TimerEvent::TimeExpired(_) => {
                        service.request_termination(TerminationReason::Expired);
                    }
                }
            }
        });
    }

    fn spawn_violation_listener(&self, mut violations: mpsc::UnboundedReceiver<ViolationKind>) {
        let service = self.clone();
        tokio::spawn(async move {
            while let Some(kind) = violations.recv().await {
                service.raise_violation(kind, Some("raised by inactivity poll".to_string()));
            }
        });
    }

    fn raise_violation(&self, kind: ViolationKind, detail: Option<String>) {
        VIOLATIONS_TOTAL.with_label_values(&[kind.as_str()]).inc();
        {
            let mut incidents = self.inner.incidents.lock().expect("incident log poisoned");
            incidents.push(IncidentRecord::new(kind, detail));
        }
        tracing::warn!(
            "Integrity violation: session={}, kind={}",
            self.inner.session_id,
            kind
        );
        self.request_termination(TerminationReason::Violation(kind));
    }

    /// `Active → Terminating`, exactly once. Loser signals are discarded by
    /// the compare-and-set; the winner tears everything down synchronously
    /// and hands off to the Submission Coordinator.
    fn request_termination(&self, reason: TerminationReason) {
        if self
            .inner
            .terminating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(
                "Termination already in progress, discarding signal: session={}, reason={}",
                self.inner.session_id,
                reason
            );
            return;
        }

        {
            let mut core = self.lock_core();
            core.state = SessionState::Terminating;
            // write-once: only the CAS winner reaches this store
            core.termination_reason = Some(reason);
        }

        self.inner.clock.stop();
        if let Some(monitor) = &self.inner.monitor {
            monitor.detach_all();
        }
        self.inner.autosave.stop();

        self.publish_state(SessionState::Terminating);
        tracing::info!(
            "Session terminating: id={}, reason={}",
            self.inner.session_id,
            reason
        );

        let service = self.clone();
        tokio::spawn(async move {
            let payload = service.build_submission_payload(reason);
            service
                .inner
                .coordinator
                .submit(&service.inner.session_id, &payload)
                .await;

            {
                let mut core = service.lock_core();
                core.state = SessionState::Submitted;
            }
            service.publish_state(SessionState::Submitted);

            SESSIONS_ACTIVE.dec();
            SESSIONS_TOTAL.with_label_values(&["submitted"]).inc();
            SUBMISSIONS_TOTAL
                .with_label_values(&[reason.as_str()])
                .inc();
            tracing::info!(
                "Session submitted: id={}, reason={}",
                service.inner.session_id,
                reason
            );
        });
    }

    fn build_submission_payload(&self, reason: TerminationReason) -> SubmissionPayload {
        let telemetry = match self.inner.environment {
            Environment::Open => Some(IntegrityTelemetry {
                environment: Environment::Open,
                incidents: self
                    .inner
                    .incidents
                    .lock()
                    .expect("incident log poisoned")
                    .clone(),
            }),
            Environment::Locked => None,
        };

        SubmissionPayload {
            answers: self.inner.answers.snapshot(),
            reason: reason.as_str().to_string(),
            complete: self.inner.answers.is_complete(&self.inner.questions),
            submitted_at: Utc::now(),
            telemetry,
        }
    }

    fn publish_state(&self, state: SessionState) {
        // send_replace: the transition must land even before the UI
        // surface has subscribed
        self.inner.state_tx.send_replace(state);
    }

    fn lock_core(&self) -> std::sync::MutexGuard<'_, SessionCore> {
        self.inner.core.lock().expect("session core poisoned")
    }
}
