//! Rest countdown started after each main set

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tracing::debug;

use super::{TICK, TimerEvent, TimerPhase};

/// Result of applying one tick to a [`Countdown`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Tick belongs to a cancelled run, nothing changed
    Stale,
    Running(u32),
    Finished,
}

/// Pure countdown state. Every `start` and `reset` bumps the generation,
/// so ticks captured for an older run are ignored.
#[derive(Debug, Clone, Default)]
pub struct Countdown {
    remaining: u32,
    phase: TimerPhase,
    generation: u64,
}

impl Countdown {
    /// Begin a new run and return its generation
    pub fn start(&mut self, duration_secs: u32) -> u64 {
        self.generation += 1;
        self.remaining = duration_secs;
        self.phase = if duration_secs == 0 {
            TimerPhase::Finished
        } else {
            TimerPhase::Running
        };
        self.generation
    }

    pub fn tick(&mut self, generation: u64) -> Tick {
        if generation != self.generation || self.phase != TimerPhase::Running {
            return Tick::Stale;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.phase = TimerPhase::Finished;
            Tick::Finished
        } else {
            Tick::Running(self.remaining)
        }
    }

    pub fn reset(&mut self) {
        self.generation += 1;
        self.remaining = 0;
        self.phase = TimerPhase::Idle;
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn phase(&self) -> TimerPhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase == TimerPhase::Running
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Countdown driven by a once-per-second tokio task
pub struct RestTimer {
    countdown: Arc<Mutex<Countdown>>,
    task: Option<JoinHandle<()>>,
    events: UnboundedSender<TimerEvent>,
}

impl RestTimer {
    pub fn new(events: UnboundedSender<TimerEvent>) -> Self {
        Self {
            countdown: Arc::new(Mutex::new(Countdown::default())),
            task: None,
            events,
        }
    }

    /// Cancel any running countdown and start a fresh one
    pub fn start(&mut self, duration_secs: u32) {
        self.reset();
        let generation = self.lock().start(duration_secs);
        if duration_secs == 0 {
            let _ = self.events.send(TimerEvent::RestFinished);
            return;
        }
        debug!(duration_secs, generation, "Rest timer started");

        let countdown = Arc::clone(&self.countdown);
        let events = self.events.clone();
        self.task = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + TICK, TICK);
            loop {
                ticker.tick().await;
                let tick = countdown
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .tick(generation);
                match tick {
                    Tick::Stale => break,
                    Tick::Running(remaining) => {
                        let _ = events.send(TimerEvent::RestTick { remaining });
                    }
                    Tick::Finished => {
                        debug!(generation, "Rest timer finished");
                        let _ = events.send(TimerEvent::RestFinished);
                        break;
                    }
                }
            }
        }));
    }

    /// Stop the countdown and zero it. Safe to call in any state.
    pub fn reset(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.lock().reset();
    }

    pub fn remaining(&self) -> u32 {
        self.lock().remaining()
    }

    pub fn is_active(&self) -> bool {
        self.lock().is_active()
    }

    pub fn phase(&self) -> TimerPhase {
        self.lock().phase()
    }

    fn lock(&self) -> MutexGuard<'_, Countdown> {
        self.countdown.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for RestTimer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[test]
    fn test_countdown_runs_to_zero() {
        let mut countdown = Countdown::default();
        let generation = countdown.start(60);
        assert!(countdown.is_active());

        for expected in (1..60).rev() {
            assert_eq!(countdown.tick(generation), Tick::Running(expected));
        }
        assert_eq!(countdown.tick(generation), Tick::Finished);
        assert_eq!(countdown.remaining(), 0);
        assert!(!countdown.is_active());
        assert_eq!(countdown.phase(), TimerPhase::Finished);

        // further ticks are ignored once finished
        assert_eq!(countdown.tick(generation), Tick::Stale);
    }

    #[test]
    fn test_countdown_reset_is_immediate_and_idempotent() {
        let mut countdown = Countdown::default();
        let generation = countdown.start(30);
        countdown.tick(generation);

        countdown.reset();
        assert_eq!(countdown.remaining(), 0);
        assert!(!countdown.is_active());
        countdown.reset();
        assert_eq!(countdown.phase(), TimerPhase::Idle);
    }

    #[test]
    fn test_stale_generation_is_ignored() {
        let mut countdown = Countdown::default();
        let old = countdown.start(10);
        let current = countdown.start(10);

        assert_eq!(countdown.tick(old), Tick::Stale);
        assert_eq!(countdown.remaining(), 10);
        assert_eq!(countdown.tick(current), Tick::Running(9));

        countdown.reset();
        assert_eq!(countdown.tick(current), Tick::Stale);
        assert_eq!(countdown.remaining(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rest_timer_finishes_and_notifies() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = RestTimer::new(tx);
        timer.start(3);
        assert!(timer.is_active());
        assert_eq!(timer.remaining(), 3);

        tokio::time::sleep(Duration::from_millis(3500)).await;

        assert_eq!(timer.remaining(), 0);
        assert!(!timer.is_active());
        assert_eq!(rx.recv().await, Some(TimerEvent::RestTick { remaining: 2 }));
        assert_eq!(rx.recv().await, Some(TimerEvent::RestTick { remaining: 1 }));
        assert_eq!(rx.recv().await, Some(TimerEvent::RestFinished));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rest_timer_sixty_seconds() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut timer = RestTimer::new(tx);
        timer.start(60);

        tokio::time::sleep(Duration::from_millis(59_500)).await;
        assert!(timer.is_active());
        assert_eq!(timer.remaining(), 1);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(timer.remaining(), 0);
        assert!(!timer.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_cancels_previous_countdown() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = RestTimer::new(tx);
        timer.start(2);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        timer.start(5);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        // only the second run is ticking
        assert!(timer.is_active());
        assert_eq!(timer.remaining(), 3);

        let mut finished = 0;
        while let Ok(event) = rx.try_recv() {
            if event == TimerEvent::RestFinished {
                finished += 1;
            }
        }
        assert_eq!(finished, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_stops_ticks() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = RestTimer::new(tx);
        timer.start(10);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        timer.reset();
        assert_eq!(timer.remaining(), 0);
        assert!(!timer.is_active());

        while rx.try_recv().is_ok() {}
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(timer.remaining(), 0);
    }
}
