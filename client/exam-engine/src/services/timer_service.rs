use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::sleep;

use crate::models::timer::{TimeExpired, TimerEvent, TimerTick};

/// Single authoritative countdown for one session.
///
/// Remaining time decrements in fixed 1000 ms logical steps regardless of the
/// configured tick interval; a step that would go below zero clamps to zero
/// and delivers `TimeExpired` on that same tick. `stop()` is idempotent and a
/// clock stopped before expiry never delivers `TimeExpired`.
pub struct CountdownClock {
    remaining_ms: Arc<AtomicU64>,
    total_ms: u64,
    stopped: Arc<AtomicBool>,
    started: AtomicBool,
}

const TICK_STEP_MS: u64 = 1000;

impl CountdownClock {
    pub fn new(duration_ms: u64) -> Self {
        Self {
            remaining_ms: Arc::new(AtomicU64::new(duration_ms)),
            total_ms: duration_ms,
            stopped: Arc::new(AtomicBool::new(false)),
            started: AtomicBool::new(false),
        }
    }

    /// Frozen at its last ticked value once the clock stops.
    pub fn remaining_ms(&self) -> u64 {
        self.remaining_ms.load(Ordering::Acquire)
    }

    /// Begin ticking. Returns the event stream the session listens on; the
    /// stream closes after `TimeExpired` or `stop()`.
    pub fn start(
        &self,
        session_id: &str,
        tick_interval_ms: u64,
    ) -> mpsc::UnboundedReceiver<TimerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();

        if self.started.swap(true, Ordering::AcqRel) {
            tracing::warn!("Countdown clock already started, ignoring");
            return rx;
        }

        let session_id = session_id.to_string();
        let remaining = Arc::clone(&self.remaining_ms);
        let stopped = Arc::clone(&self.stopped);
        let total_ms = self.total_ms;
        let tick = Duration::from_millis(tick_interval_ms.max(1));

        tracing::info!(
            "Starting countdown: session={}, total={}ms, tick={}ms",
            session_id,
            total_ms,
            tick_interval_ms
        );

        tokio::spawn(async move {
            loop {
                sleep(tick).await;

                if stopped.load(Ordering::Acquire) {
                    tracing::debug!("Countdown stopped: session={}", session_id);
                    break;
                }

                let next = remaining
                    .load(Ordering::Acquire)
                    .saturating_sub(TICK_STEP_MS);
                remaining.store(next, Ordering::Release);

                if next == 0 {
                    tracing::info!("Countdown expired: session={}", session_id);
                    let _ = tx.send(TimerEvent::TimeExpired(TimeExpired {
                        session_id: session_id.clone(),
                        timestamp: Utc::now(),
                    }));
                    break;
                }

                let _ = tx.send(TimerEvent::TimerTick(TimerTick {
                    session_id: session_id.clone(),
                    remaining_ms: next,
                    elapsed_ms: total_ms.saturating_sub(next),
                    total_ms,
                    timestamp: Utc::now(),
                }));
            }
        });

        rx
    }

    /// Halt ticking. Safe to call any number of times, before or after
    /// expiry.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn drain(mut rx: mpsc::UnboundedReceiver<TimerEvent>) -> Vec<TimerEvent> {
        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }
        events
    }

    #[tokio::test]
    async fn counts_down_and_expires_once() {
        let clock = CountdownClock::new(3000);
        let rx = clock.start("s-1", 5);

        let events = drain(rx).await;

        let expired: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, TimerEvent::TimeExpired(_)))
            .collect();
        assert_eq!(expired.len(), 1);
        assert_eq!(clock.remaining_ms(), 0);

        // expiry is the final event
        assert!(matches!(events.last(), Some(TimerEvent::TimeExpired(_))));
    }

    #[tokio::test]
    async fn remaining_is_monotonically_non_increasing() {
        let clock = CountdownClock::new(5000);
        let rx = clock.start("s-2", 5);

        let events = drain(rx).await;

        let mut last = u64::MAX;
        for ev in &events {
            if let TimerEvent::TimerTick(tick) = ev {
                assert!(tick.remaining_ms <= last);
                last = tick.remaining_ms;
            }
        }
    }

    #[tokio::test]
    async fn sub_second_remainder_clamps_to_zero() {
        let clock = CountdownClock::new(1500);
        let rx = clock.start("s-3", 5);

        let events = drain(rx).await;

        // 1500 -> 500 -> 0; no tick ever reports a negative-wrapped value
        assert_eq!(clock.remaining_ms(), 0);
        assert!(matches!(events.last(), Some(TimerEvent::TimeExpired(_))));
    }

    #[tokio::test]
    async fn stop_before_expiry_never_delivers_expired() {
        let clock = CountdownClock::new(60_000);
        let rx = clock.start("s-4", 5);

        tokio::time::sleep(Duration::from_millis(30)).await;
        clock.stop();
        clock.stop(); // idempotent

        let events = drain(rx).await;
        assert!(events
            .iter()
            .all(|e| matches!(e, TimerEvent::TimerTick(_))));

        let frozen = clock.remaining_ms();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(clock.remaining_ms(), frozen);
    }
}
