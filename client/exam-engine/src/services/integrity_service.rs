use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::mpsc;
use tokio::time::sleep;

use crate::models::integrity::{EventDisposition, HostEvent, ViolationKind};

/// Timestamp of the last observed pointer-move or keystroke. Shared between
/// the inactivity poll and the auto-save payload.
pub struct ActivityTracker {
    last_ms: AtomicI64,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self {
            last_ms: AtomicI64::new(Utc::now().timestamp_millis()),
        }
    }

    pub fn touch(&self) {
        self.last_ms
            .store(Utc::now().timestamp_millis(), Ordering::Release);
    }

    pub fn idle_ms(&self) -> u64 {
        let last = self.last_ms.load(Ordering::Acquire);
        (Utc::now().timestamp_millis() - last).max(0) as u64
    }

    pub fn last_at(&self) -> DateTime<Utc> {
        let last = self.last_ms.load(Ordering::Acquire);
        Utc.timestamp_millis_opt(last)
            .single()
            .unwrap_or_else(Utc::now)
    }
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// One independently testable guard. Watchers observe every forwarded host
/// event and return what the host must do with it; they never talk to the
/// session directly.
pub trait IntegrityWatcher: Send + Sync {
    fn name(&self) -> &'static str;
    fn observe(&self, event: &HostEvent) -> EventDisposition;
}

/// Fires when the page becomes hidden.
struct VisibilityWatcher;

impl IntegrityWatcher for VisibilityWatcher {
    fn name(&self) -> &'static str {
        "visibility"
    }

    fn observe(&self, event: &HostEvent) -> EventDisposition {
        match event {
            HostEvent::PageHidden => EventDisposition::violation(ViolationKind::TabHidden),
            _ => EventDisposition::ignore(),
        }
    }
}

/// Fires when the window loses focus. Any blur, however brief, terminates.
struct FocusWatcher;

impl IntegrityWatcher for FocusWatcher {
    fn name(&self) -> &'static str {
        "focus"
    }

    fn observe(&self, event: &HostEvent) -> EventDisposition {
        match event {
            HostEvent::WindowBlurred => EventDisposition::violation(ViolationKind::FocusLost),
            _ => EventDisposition::ignore(),
        }
    }
}

/// A negative vertical coordinate means the cursor left through the top
/// edge, the taskbar/dock app-switch gesture.
struct PointerWatcher;

impl IntegrityWatcher for PointerWatcher {
    fn name(&self) -> &'static str {
        "pointer"
    }

    fn observe(&self, event: &HostEvent) -> EventDisposition {
        match event {
            HostEvent::PointerMoved { y, .. } if *y < 0 => {
                EventDisposition::violation(ViolationKind::PointerLeft)
            }
            _ => EventDisposition::ignore(),
        }
    }
}

/// Fires only when an element we previously saw enter fullscreen exits it.
struct FullscreenWatcher {
    was_fullscreen: AtomicBool,
}

impl FullscreenWatcher {
    fn new() -> Self {
        Self {
            was_fullscreen: AtomicBool::new(false),
        }
    }
}

impl IntegrityWatcher for FullscreenWatcher {
    fn name(&self) -> &'static str {
        "fullscreen"
    }

    fn observe(&self, event: &HostEvent) -> EventDisposition {
        match event {
            HostEvent::FullscreenChanged { active: true } => {
                self.was_fullscreen.store(true, Ordering::Release);
                EventDisposition::ignore()
            }
            HostEvent::FullscreenChanged { active: false } => {
                if self.was_fullscreen.swap(false, Ordering::AcqRel) {
                    EventDisposition::violation(ViolationKind::FullscreenExited)
                } else {
                    EventDisposition::ignore()
                }
            }
            _ => EventDisposition::ignore(),
        }
    }
}

/// Blocks refresh, clipboard, and task-switch shortcuts plus raw clipboard
/// events. Cancelling the default action is mandatory (otherwise the
/// refresh/copy completes before termination lands), and the blocked
/// keystroke itself raises the violation.
struct ShortcutWatcher;

impl ShortcutWatcher {
    fn classify_key(key: &str, ctrl: bool, alt: bool, meta: bool) -> Option<ViolationKind> {
        let lower = key.to_ascii_lowercase();

        let refresh = lower == "f5" || ((ctrl || meta) && lower == "r");
        let task_switch =
            (alt && lower == "tab") || (meta && lower == "tab") || (ctrl && lower == "escape");
        if refresh || task_switch {
            return Some(ViolationKind::ShortcutBlocked);
        }

        if (ctrl || meta) && matches!(lower.as_str(), "c" | "x" | "v") {
            return Some(ViolationKind::ClipboardBlocked);
        }

        None
    }
}

impl IntegrityWatcher for ShortcutWatcher {
    fn name(&self) -> &'static str {
        "shortcut"
    }

    fn observe(&self, event: &HostEvent) -> EventDisposition {
        match event {
            HostEvent::KeyDown {
                key,
                ctrl,
                alt,
                meta,
            } => match Self::classify_key(key, *ctrl, *alt, *meta) {
                Some(kind) => EventDisposition::cancelled_violation(kind),
                None => EventDisposition::ignore(),
            },
            HostEvent::ClipboardCopy | HostEvent::ClipboardCut | HostEvent::ClipboardPaste => {
                EventDisposition::cancelled_violation(ViolationKind::ClipboardBlocked)
            }
            _ => EventDisposition::ignore(),
        }
    }
}

/// Best-effort "confirm navigation" prompt on page close. Cancelling the
/// default is what makes the browser show the prompt; no violation is raised.
struct UnloadWatcher;

impl IntegrityWatcher for UnloadWatcher {
    fn name(&self) -> &'static str {
        "unload"
    }

    fn observe(&self, event: &HostEvent) -> EventDisposition {
        match event {
            HostEvent::BeforeUnload => EventDisposition {
                cancel_default: true,
                violation: None,
            },
            _ => EventDisposition::ignore(),
        }
    }
}

/// Composes the watcher set and owns the inactivity poll. Constructed only
/// for `Open` environments; a locked kiosk session never instantiates it.
pub struct IntegrityMonitor {
    watchers: Vec<Box<dyn IntegrityWatcher>>,
    attached: Arc<AtomicBool>,
    page_visible: Arc<AtomicBool>,
}

impl IntegrityMonitor {
    pub fn new() -> Self {
        Self {
            watchers: vec![
                Box::new(VisibilityWatcher),
                Box::new(FocusWatcher),
                Box::new(PointerWatcher),
                Box::new(FullscreenWatcher::new()),
                Box::new(ShortcutWatcher),
                Box::new(UnloadWatcher),
            ],
            attached: Arc::new(AtomicBool::new(false)),
            page_visible: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Attach all watchers and start the inactivity poll. Returns the channel
    /// the poll delivers violations on; it closes on detach.
    pub fn attach(
        &self,
        activity: Arc<ActivityTracker>,
        inactivity_timeout_ms: u64,
        inactivity_poll_ms: u64,
    ) -> mpsc::UnboundedReceiver<ViolationKind> {
        self.attached.store(true, Ordering::Release);
        tracing::info!(
            "Integrity watchers attached: {} watchers, inactivity_timeout={}ms",
            self.watchers.len(),
            inactivity_timeout_ms
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let attached = Arc::clone(&self.attached);
        let page_visible = Arc::clone(&self.page_visible);
        let poll = Duration::from_millis(inactivity_poll_ms.max(1));

        tokio::spawn(async move {
            loop {
                sleep(poll).await;

                if !attached.load(Ordering::Acquire) {
                    break;
                }

                // A hidden tab is the visibility watcher's case; polling here
                // too would race the single-writer guard with a second signal.
                if !page_visible.load(Ordering::Acquire) {
                    continue;
                }

                if activity.idle_ms() >= inactivity_timeout_ms {
                    tracing::warn!(
                        "Inactivity threshold exceeded: idle={}ms, threshold={}ms",
                        activity.idle_ms(),
                        inactivity_timeout_ms
                    );
                    let _ = tx.send(ViolationKind::Inactivity);
                    break;
                }
            }
        });

        rx
    }

    /// Run the forwarded event past every watcher. The first violation wins;
    /// cancel flags accumulate so a blocked shortcut is cancelled even if
    /// another watcher terminated first.
    pub fn handle_event(&self, event: &HostEvent) -> EventDisposition {
        if !self.is_attached() {
            return EventDisposition::ignore();
        }

        match event {
            HostEvent::PageHidden => self.page_visible.store(false, Ordering::Release),
            HostEvent::PageVisible => self.page_visible.store(true, Ordering::Release),
            _ => {}
        }

        let mut disposition = EventDisposition::ignore();
        for watcher in &self.watchers {
            let verdict = watcher.observe(event);
            disposition.cancel_default |= verdict.cancel_default;
            if disposition.violation.is_none() {
                if let Some(kind) = verdict.violation {
                    tracing::warn!("Watcher {:?} raised violation: {}", watcher.name(), kind);
                    disposition.violation = Some(kind);
                }
            }
        }
        disposition
    }

    /// Tear down every watcher. The inactivity poll observes the flag on its
    /// next cycle and exits.
    pub fn detach_all(&self) {
        if self.attached.swap(false, Ordering::AcqRel) {
            tracing::info!("Integrity watchers detached");
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    pub fn page_visible(&self) -> bool {
        self.page_visible.load(Ordering::Acquire)
    }
}

impl Default for IntegrityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attached_monitor() -> Arc<IntegrityMonitor> {
        let monitor = Arc::new(IntegrityMonitor::new());
        monitor.attached.store(true, Ordering::Release);
        monitor
    }

    fn key(key: &str, ctrl: bool, alt: bool, meta: bool) -> HostEvent {
        HostEvent::KeyDown {
            key: key.to_string(),
            ctrl,
            alt,
            meta,
        }
    }

    #[test]
    fn page_hidden_raises_tab_hidden() {
        let monitor = attached_monitor();
        let d = monitor.handle_event(&HostEvent::PageHidden);
        assert_eq!(d.violation, Some(ViolationKind::TabHidden));
    }

    #[test]
    fn blur_raises_focus_lost() {
        let monitor = attached_monitor();
        let d = monitor.handle_event(&HostEvent::WindowBlurred);
        assert_eq!(d.violation, Some(ViolationKind::FocusLost));
    }

    #[test]
    fn pointer_above_top_edge_raises_violation() {
        let monitor = attached_monitor();
        let safe = monitor.handle_event(&HostEvent::PointerMoved { x: 10, y: 40 });
        assert_eq!(safe.violation, None);

        let out = monitor.handle_event(&HostEvent::PointerMoved { x: 10, y: -1 });
        assert_eq!(out.violation, Some(ViolationKind::PointerLeft));
    }

    #[test]
    fn fullscreen_exit_only_counts_after_entering() {
        let monitor = attached_monitor();

        // exit without a prior enter: not ours
        let d = monitor.handle_event(&HostEvent::FullscreenChanged { active: false });
        assert_eq!(d.violation, None);

        monitor.handle_event(&HostEvent::FullscreenChanged { active: true });
        let d = monitor.handle_event(&HostEvent::FullscreenChanged { active: false });
        assert_eq!(d.violation, Some(ViolationKind::FullscreenExited));
    }

    #[test]
    fn copy_shortcut_is_cancelled_and_raised() {
        let monitor = attached_monitor();
        let d = monitor.handle_event(&key("c", true, false, false));
        assert!(d.cancel_default);
        assert_eq!(d.violation, Some(ViolationKind::ClipboardBlocked));
    }

    #[test]
    fn refresh_and_task_switch_are_blocked() {
        let monitor = attached_monitor();

        let f5 = monitor.handle_event(&key("F5", false, false, false));
        assert!(f5.cancel_default);
        assert_eq!(f5.violation, Some(ViolationKind::ShortcutBlocked));

        let alt_tab = monitor.handle_event(&key("Tab", false, true, false));
        assert!(alt_tab.cancel_default);
        assert_eq!(alt_tab.violation, Some(ViolationKind::ShortcutBlocked));
    }

    #[test]
    fn plain_typing_is_not_a_violation() {
        let monitor = attached_monitor();
        let d = monitor.handle_event(&key("a", false, false, false));
        assert!(!d.cancel_default);
        assert_eq!(d.violation, None);
    }

    #[test]
    fn unload_warns_without_violation() {
        let monitor = attached_monitor();
        let d = monitor.handle_event(&HostEvent::BeforeUnload);
        assert!(d.cancel_default);
        assert_eq!(d.violation, None);
    }

    #[test]
    fn detached_monitor_ignores_everything() {
        let monitor = Arc::new(IntegrityMonitor::new());
        let d = monitor.handle_event(&HostEvent::PageHidden);
        assert_eq!(d, EventDisposition::ignore());

        monitor.attached.store(true, Ordering::Release);
        monitor.detach_all();
        let d = monitor.handle_event(&HostEvent::WindowBlurred);
        assert_eq!(d, EventDisposition::ignore());
    }

    #[tokio::test]
    async fn inactivity_poll_fires_after_threshold() {
        let monitor = Arc::new(IntegrityMonitor::new());
        let activity = Arc::new(ActivityTracker::new());
        let mut rx = monitor.attach(Arc::clone(&activity), 50, 10);

        let got = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("poll should fire");
        assert_eq!(got, Some(ViolationKind::Inactivity));
    }

    #[tokio::test]
    async fn inactivity_poll_stops_on_detach() {
        let monitor = Arc::new(IntegrityMonitor::new());
        let activity = Arc::new(ActivityTracker::new());
        let mut rx = monitor.attach(Arc::clone(&activity), 60_000, 10);

        monitor.detach_all();

        // channel closes without ever delivering a violation
        let got = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("channel should close");
        assert_eq!(got, None);
    }
}
