use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Environment;

/// Why a watcher terminated the session. Reasons are informational; every
/// violation has identical severity (immediate termination).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViolationKind {
    TabHidden,
    FocusLost,
    PointerLeft,
    FullscreenExited,
    ClipboardBlocked,
    ShortcutBlocked,
    Inactivity,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::TabHidden => "tab-hidden",
            ViolationKind::FocusLost => "focus-lost",
            ViolationKind::PointerLeft => "pointer-left",
            ViolationKind::FullscreenExited => "fullscreen-exited",
            ViolationKind::ClipboardBlocked => "clipboard-blocked",
            ViolationKind::ShortcutBlocked => "shortcut-blocked",
            ViolationKind::Inactivity => "inactivity",
        }
    }

    /// Candidate-facing explanation used as the render contract's
    /// `violation_message`.
    pub fn message(&self) -> &'static str {
        match self {
            ViolationKind::TabHidden => "The exam tab was hidden or minimized",
            ViolationKind::FocusLost => "The exam window lost focus",
            ViolationKind::PointerLeft => "The cursor left the exam window",
            ViolationKind::FullscreenExited => "Fullscreen mode was exited",
            ViolationKind::ClipboardBlocked => "Copy/paste is not allowed during the exam",
            ViolationKind::ShortcutBlocked => "A blocked keyboard shortcut was used",
            ViolationKind::Inactivity => "No activity was detected for too long",
        }
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A discrete host/browser event delivered into the engine by the embedding
/// surface. The engine never touches the DOM itself; the host forwards these
/// and applies the returned [`EventDisposition`].
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    PageHidden,
    PageVisible,
    WindowBlurred,
    WindowFocused,
    PointerMoved { x: i32, y: i32 },
    FullscreenChanged { active: bool },
    KeyDown { key: String, ctrl: bool, alt: bool, meta: bool },
    ClipboardCopy,
    ClipboardCut,
    ClipboardPaste,
    BeforeUnload,
}

/// What the host must do with the event it just forwarded.
///
/// `cancel_default` is mandatory to honor: for blocked shortcuts the
/// browser's default action would otherwise complete (refresh, copy) before
/// termination lands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventDisposition {
    pub cancel_default: bool,
    pub violation: Option<ViolationKind>,
}

impl EventDisposition {
    pub fn ignore() -> Self {
        Self::default()
    }

    pub fn violation(kind: ViolationKind) -> Self {
        Self {
            cancel_default: false,
            violation: Some(kind),
        }
    }

    pub fn cancelled_violation(kind: ViolationKind) -> Self {
        Self {
            cancel_default: true,
            violation: Some(kind),
        }
    }
}

/// One observed integrity event, kept for the audit trail. Violations that
/// lose the termination race are still recorded if they were observed before
/// monitoring shut down.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentRecord {
    pub id: String,
    pub kind: ViolationKind,
    pub detail: Option<String>,
    pub observed_at: DateTime<Utc>,
}

impl IncidentRecord {
    pub fn new(kind: ViolationKind, detail: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            detail,
            observed_at: Utc::now(),
        }
    }
}

/// Rides in the submission payload when the session ran in an open browser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityTelemetry {
    pub environment: Environment,
    pub incidents: Vec<IncidentRecord>,
}
