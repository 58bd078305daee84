// Warmup gate: per-class Cold -> Warming -> Warm handshake

use serde::{Deserialize, Serialize};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Warmup state of one class
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarmupState {
    /// Nothing ingested yet
    #[default]
    Cold,
    /// Updates seen, no Full applied yet
    Warming,
    /// At least one Full applied. Never left.
    Warm,
}

/// Result of waiting on a cell
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    Warm,
    TimedOut,
    Closed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Phase {
    state: WarmupState,
    closed: bool,
}

impl Phase {
    fn settled(&self) -> bool {
        self.state == WarmupState::Warm || self.closed
    }

    fn outcome(&self) -> WaitOutcome {
        if self.state == WarmupState::Warm {
            WaitOutcome::Warm
        } else {
            WaitOutcome::Closed
        }
    }
}

/// Warmup condition of one class.
///
/// Written only by the ingestion path; read by any number of blocking
/// (condvar) or async (watch) waiters.
#[derive(Debug)]
pub(crate) struct WarmupCell {
    phase: Mutex<Phase>,
    changed: Condvar,
    watch: watch::Sender<Phase>,
}

impl WarmupCell {
    pub fn new() -> Self {
        let (watch, _) = watch::channel(Phase::default());
        Self {
            phase: Mutex::new(Phase::default()),
            changed: Condvar::new(),
            watch,
        }
    }

    pub fn state(&self) -> WarmupState {
        self.phase
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state
    }

    pub fn is_warm(&self) -> bool {
        self.state() == WarmupState::Warm
    }

    /// Cold -> Warming. Returns true on transition.
    pub fn mark_warming(&self) -> bool {
        self.transition(|phase| {
            if phase.state == WarmupState::Cold {
                phase.state = WarmupState::Warming;
                true
            } else {
                false
            }
        })
    }

    /// Cold/Warming -> Warm. Returns true on transition.
    pub fn mark_warm(&self) -> bool {
        self.transition(|phase| {
            if phase.state != WarmupState::Warm {
                phase.state = WarmupState::Warm;
                true
            } else {
                false
            }
        })
    }

    /// Release every waiter; waiters still not warm see `Closed`
    pub fn close(&self) {
        self.transition(|phase| {
            let changed = !phase.closed;
            phase.closed = true;
            changed
        });
    }

    fn transition<F: FnOnce(&mut Phase) -> bool>(&self, f: F) -> bool {
        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        let changed = f(&mut phase);
        if changed {
            self.watch.send_replace(*phase);
            self.changed.notify_all();
        }
        changed
    }

    /// Block the calling thread until warm, closed, or `deadline`
    pub fn wait_until(&self, deadline: Instant) -> WaitOutcome {
        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if phase.settled() {
                return phase.outcome();
            }
            let now = Instant::now();
            if now >= deadline {
                return WaitOutcome::TimedOut;
            }
            let (guard, _) = self
                .changed
                .wait_timeout(phase, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            phase = guard;
        }
    }

    pub async fn wait_async(&self, timeout: Duration) -> WaitOutcome {
        let mut rx = self.watch.subscribe();
        let outcome = match tokio::time::timeout(timeout, rx.wait_for(Phase::settled)).await {
            Ok(Ok(phase)) => phase.outcome(),
            // Sender lives as long as the cell
            Ok(Err(_)) => WaitOutcome::Closed,
            Err(_) => WaitOutcome::TimedOut,
        };
        outcome
    }
}

impl Default for WarmupCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_transitions() {
        let cell = WarmupCell::new();
        assert_eq!(cell.state(), WarmupState::Cold);

        assert!(cell.mark_warming());
        assert!(!cell.mark_warming());
        assert_eq!(cell.state(), WarmupState::Warming);

        assert!(cell.mark_warm());
        assert!(!cell.mark_warm());
        // Warm is terminal
        assert!(!cell.mark_warming());
        assert!(cell.is_warm());
    }

    #[test]
    fn test_cold_straight_to_warm() {
        let cell = WarmupCell::new();
        assert!(cell.mark_warm());
        assert_eq!(cell.state(), WarmupState::Warm);
    }

    #[test]
    fn test_wait_times_out() {
        let cell = WarmupCell::new();
        let start = Instant::now();
        let outcome = cell.wait_until(start + Duration::from_millis(50));
        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_wait_returns_immediately_when_warm() {
        let cell = WarmupCell::new();
        cell.mark_warm();
        // Deadline already passed; warm still wins
        assert_eq!(cell.wait_until(Instant::now()), WaitOutcome::Warm);
    }

    #[test]
    fn test_wait_wakes_on_warm_from_other_thread() {
        let cell = Arc::new(WarmupCell::new());
        let writer = Arc::clone(&cell);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            writer.mark_warm();
        });

        let outcome = cell.wait_until(Instant::now() + Duration::from_secs(5));
        assert_eq!(outcome, WaitOutcome::Warm);
        handle.join().unwrap();
    }

    #[test]
    fn test_close_releases_waiters() {
        let cell = Arc::new(WarmupCell::new());
        let closer = Arc::clone(&cell);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            closer.close();
        });

        let outcome = cell.wait_until(Instant::now() + Duration::from_secs(5));
        assert_eq!(outcome, WaitOutcome::Closed);
        handle.join().unwrap();
    }

    #[tokio::test]
    async fn test_async_wait() {
        let cell = Arc::new(WarmupCell::new());
        assert_eq!(
            cell.wait_async(Duration::from_millis(20)).await,
            WaitOutcome::TimedOut
        );

        let writer = Arc::clone(&cell);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            writer.mark_warm();
        });

        assert_eq!(
            cell.wait_async(Duration::from_secs(5)).await,
            WaitOutcome::Warm
        );
    }

    #[tokio::test]
    async fn test_async_wait_released_by_close() {
        let cell = Arc::new(WarmupCell::new());
        let closer = Arc::clone(&cell);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            closer.close();
        });

        assert_eq!(
            cell.wait_async(Duration::from_secs(5)).await,
            WaitOutcome::Closed
        );
    }
}
