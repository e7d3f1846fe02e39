//! Elapsed-time clock for the active workout

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};

use super::{TICK, TimerEvent, TimerPhase};

/// Session timer. Elapsed time is always `now - started_at`; the periodic
/// tick only tells consumers to re-read it.
pub struct SessionTimer {
    started_at: Option<DateTime<Utc>>,
    generation: Arc<AtomicU64>,
    task: Option<JoinHandle<()>>,
    events: UnboundedSender<TimerEvent>,
}

impl SessionTimer {
    pub fn new(events: UnboundedSender<TimerEvent>) -> Self {
        Self {
            started_at: None,
            generation: Arc::new(AtomicU64::new(0)),
            task: None,
            events,
        }
    }

    /// Record the start instant. No-op while already running.
    pub fn start(&mut self, now: DateTime<Utc>) {
        if self.started_at.is_some() {
            return;
        }
        self.started_at = Some(now);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let current = Arc::clone(&self.generation);
        let events = self.events.clone();
        self.task = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + TICK, TICK);
            loop {
                ticker.tick().await;
                if current.load(Ordering::SeqCst) != generation {
                    break;
                }
                if events.send(TimerEvent::SessionTick).is_err() {
                    break;
                }
            }
        }));
    }

    pub fn stop(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.started_at = None;
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Time since start, zero when stopped
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        match self.started_at {
            Some(start) if now > start => now - start,
            _ => Duration::zero(),
        }
    }

    pub fn phase(&self) -> TimerPhase {
        if self.started_at.is_some() {
            TimerPhase::Running
        } else {
            TimerPhase::Idle
        }
    }
}

impl Drop for SessionTimer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
