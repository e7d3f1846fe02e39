//! Timer engine - rest countdown and session clock
//!
//! Both timers tick from their own tokio task. Cancelling one never
//! touches the other, and a tick that fires after cancellation is a no-op.

pub mod rest;
pub mod session;

pub use rest::{Countdown, RestTimer, Tick};
pub use session::SessionTimer;

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, UnboundedReceiver};

pub(crate) const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerPhase {
    #[default]
    Idle,
    Running,
    Finished,
}

/// Notifications emitted by the timers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    RestTick { remaining: u32 },
    /// Rest countdown reached zero on its own (not via reset)
    RestFinished,
    /// Prompt to re-read the session elapsed time
    SessionTick,
}

/// The rest timer and the session timer of the single active workout
pub struct TimerEngine {
    rest: RestTimer,
    session: SessionTimer,
}

impl TimerEngine {
    pub fn new() -> (Self, UnboundedReceiver<TimerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = Self {
            rest: RestTimer::new(tx.clone()),
            session: SessionTimer::new(tx),
        };
        (engine, rx)
    }

    pub fn start_rest(&mut self, duration_secs: u32) {
        self.rest.start(duration_secs);
    }

    pub fn reset_rest(&mut self) {
        self.rest.reset();
    }

    pub fn start_session(&mut self, now: DateTime<Utc>) {
        self.session.start(now);
    }

    pub fn stop_session(&mut self) {
        self.session.stop();
    }

    /// Reset both timers
    pub fn stop_all(&mut self) {
        self.rest.reset();
        self.session.stop();
    }

    pub fn rest(&self) -> &RestTimer {
        &self.rest
    }

    pub fn session(&self) -> &SessionTimer {
        &self.session
    }
}

/// Format seconds as `MM:SS`, or `HH:MM:SS` from one hour on
pub fn format_elapsed(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(0), "00:00");
        assert_eq!(format_elapsed(75), "01:15");
        assert_eq!(format_elapsed(3599), "59:59");
        assert_eq!(format_elapsed(3600), "01:00:00");
        assert_eq!(format_elapsed(3725), "01:02:05");
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_rest_leaves_session_running() {
        let (mut engine, mut rx) = TimerEngine::new();
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 7, 0, 0).unwrap();
        engine.start_session(start);
        engine.start_rest(30);
        engine.reset_rest();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(rx.recv().await, Some(TimerEvent::SessionTick));
        assert!(!engine.rest().is_active());
        assert_eq!(engine.session().started_at(), Some(start));
    }

    #[tokio::test]
    async fn test_stop_all() {
        let (mut engine, _rx) = TimerEngine::new();
        engine.start_session(Utc::now());
        engine.start_rest(60);
        engine.stop_all();
        assert_eq!(engine.rest().remaining(), 0);
        assert!(engine.session().started_at().is_none());
    }
}
