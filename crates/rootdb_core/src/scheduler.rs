//! Debounced write scheduling.
//!
//! Repeated change notifications coalesce into one disk write per wait
//! window. The scheduler is an explicit three-state machine (Idle,
//! Pending, Failed) driven through an injectable timer, so the debounce
//! behavior is testable without real wall-clock waits.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// A deferred job scheduled on a [`Timer`].
pub type TimerJob = Box<dyn FnOnce() + Send>;

/// Cancellation handle for a scheduled job.
#[derive(Debug)]
pub struct TimerGuard {
    cancelled: Arc<AtomicBool>,
}

impl TimerGuard {
    fn new(cancelled: Arc<AtomicBool>) -> Self {
        Self { cancelled }
    }

    /// Prevents the job from running if it has not fired yet.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// Schedules a job to run once after a delay.
pub trait Timer: Send + Sync {
    /// Arms a one-shot timer.
    fn schedule(&self, delay: Duration, job: TimerJob) -> TimerGuard;
}

/// Production timer backed by a spawned sleeper thread.
#[derive(Debug, Default)]
pub struct ThreadTimer;

impl Timer for ThreadTimer {
    fn schedule(&self, delay: Duration, job: TimerJob) -> TimerGuard {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        thread::spawn(move || {
            thread::sleep(delay);
            if !flag.load(Ordering::SeqCst) {
                job();
            }
        });
        TimerGuard::new(cancelled)
    }
}

/// Test timer that collects jobs until they are fired explicitly.
#[derive(Default)]
pub struct ManualTimer {
    jobs: Mutex<Vec<(TimerJob, Arc<AtomicBool>)>>,
}

impl ManualTimer {
    /// Creates an empty manual timer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs currently armed (including cancelled ones).
    #[must_use]
    pub fn armed(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Runs every armed, non-cancelled job.
    pub fn fire_all(&self) {
        let jobs: Vec<_> = self.jobs.lock().drain(..).collect();
        for (job, cancelled) in jobs {
            if !cancelled.load(Ordering::SeqCst) {
                job();
            }
        }
    }
}

impl Timer for ManualTimer {
    fn schedule(&self, _delay: Duration, job: TimerJob) -> TimerGuard {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.jobs.lock().push((job, Arc::clone(&cancelled)));
        TimerGuard::new(cancelled)
    }
}

/// Scheduler state.
#[derive(Debug)]
enum WriteState {
    /// No write pending.
    Idle,
    /// A deferred write is armed.
    Pending(TimerGuard),
    /// The last write failed; the next notification retries synchronously.
    Failed(String),
}

/// What a change notification resolved to.
#[derive(Debug, PartialEq, Eq)]
pub enum ChangePlan {
    /// The caller must write synchronously, now.
    WriteNow,
    /// The debounce timer was armed.
    Arm,
    /// A write was already pending; the notification folded into it.
    Coalesce,
}

struct SchedulerInner {
    state: WriteState,
    first_write_done: bool,
}

/// Tracks the debounce state machine for one database.
pub struct WriteScheduler {
    inner: Mutex<SchedulerInner>,
}

impl Default for WriteScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteScheduler {
    /// Creates an idle scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SchedulerInner {
                state: WriteState::Idle,
                first_write_done: false,
            }),
        }
    }

    /// Handles a change notification, arming the debounce timer with
    /// `job` when the state calls for it. The decision and the Idle to
    /// Pending transition happen under one lock hold, so concurrent
    /// notifications can never arm two timers.
    ///
    /// The very first notification writes synchronously so configuration
    /// and serialization errors surface early instead of being deferred.
    /// A zero window always writes synchronously. While a write is
    /// pending, notifications coalesce. After a failure the write retries
    /// synchronously so the caller observes the error at the next
    /// mutation.
    pub fn on_change(&self, window: Duration, timer: &dyn Timer, job: TimerJob) -> ChangePlan {
        let mut inner = self.inner.lock();

        if !inner.first_write_done {
            inner.first_write_done = true;
            return ChangePlan::WriteNow;
        }
        if window.is_zero() {
            return ChangePlan::WriteNow;
        }
        match inner.state {
            WriteState::Failed(_) => {
                inner.state = WriteState::Idle;
                ChangePlan::WriteNow
            }
            WriteState::Pending(_) => ChangePlan::Coalesce,
            WriteState::Idle => {
                inner.state = WriteState::Pending(timer.schedule(window, job));
                ChangePlan::Arm
            }
        }
    }

    /// Records the outcome of a write: back to Idle on success, Failed
    /// with the cause otherwise.
    pub fn record_result<T>(&self, result: &Result<T, crate::error::CoreError>) {
        let mut inner = self.inner.lock();
        inner.state = match result {
            Ok(_) => WriteState::Idle,
            Err(e) => WriteState::Failed(e.to_string()),
        };
    }

    /// Cancels a pending deferred write, if any.
    pub fn cancel_pending(&self) {
        let mut inner = self.inner.lock();
        if let WriteState::Pending(guard) = &inner.state {
            guard.cancel();
            inner.state = WriteState::Idle;
        }
    }

    /// The last write failure, if the scheduler is in the failed state.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        match &self.inner.lock().state {
            WriteState::Failed(cause) => Some(cause.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;

    const WINDOW: Duration = Duration::from_secs(60);

    fn noop() -> TimerJob {
        Box::new(|| {})
    }

    #[test]
    fn first_notification_writes_synchronously() {
        let scheduler = WriteScheduler::new();
        let timer = ManualTimer::new();
        assert_eq!(scheduler.on_change(WINDOW, &timer, noop()), ChangePlan::WriteNow);
        assert_eq!(scheduler.on_change(WINDOW, &timer, noop()), ChangePlan::Arm);
    }

    #[test]
    fn zero_window_is_always_synchronous() {
        let scheduler = WriteScheduler::new();
        let timer = ManualTimer::new();
        assert_eq!(
            scheduler.on_change(Duration::ZERO, &timer, noop()),
            ChangePlan::WriteNow
        );
        assert_eq!(
            scheduler.on_change(Duration::ZERO, &timer, noop()),
            ChangePlan::WriteNow
        );
        assert_eq!(timer.armed(), 0);
    }

    #[test]
    fn pending_notifications_coalesce() {
        let scheduler = WriteScheduler::new();
        let timer = ManualTimer::new();

        let _ = scheduler.on_change(WINDOW, &timer, noop()); // first, sync
        assert_eq!(scheduler.on_change(WINDOW, &timer, noop()), ChangePlan::Arm);

        assert_eq!(
            scheduler.on_change(WINDOW, &timer, noop()),
            ChangePlan::Coalesce
        );
        assert_eq!(
            scheduler.on_change(WINDOW, &timer, noop()),
            ChangePlan::Coalesce
        );
        assert_eq!(timer.armed(), 1);
    }

    #[test]
    fn concurrent_notifications_arm_exactly_one_timer() {
        let scheduler = Arc::new(WriteScheduler::new());
        let timer = Arc::new(ManualTimer::new());

        let _ = scheduler.on_change(WINDOW, &*timer, noop()); // first, sync

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let scheduler = Arc::clone(&scheduler);
                let timer = Arc::clone(&timer);
                thread::spawn(move || {
                    let _ = scheduler.on_change(WINDOW, &*timer, noop());
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(timer.armed(), 1);
    }

    #[test]
    fn failure_forces_synchronous_retry() {
        let scheduler = WriteScheduler::new();
        let timer = ManualTimer::new();
        let _ = scheduler.on_change(WINDOW, &timer, noop());

        scheduler.record_result::<()>(&Err(CoreError::RoundtripMismatch));
        assert!(scheduler.last_error().is_some());

        assert_eq!(
            scheduler.on_change(WINDOW, &timer, noop()),
            ChangePlan::WriteNow
        );
        scheduler.record_result(&Ok(()));
        assert!(scheduler.last_error().is_none());
    }

    #[test]
    fn cancelled_jobs_do_not_fire() {
        let scheduler = WriteScheduler::new();
        let timer = ManualTimer::new();
        let fired = Arc::new(AtomicBool::new(false));

        let _ = scheduler.on_change(WINDOW, &timer, noop()); // first, sync
        let flag = Arc::clone(&fired);
        let plan = scheduler.on_change(
            WINDOW,
            &timer,
            Box::new(move || flag.store(true, Ordering::SeqCst)),
        );
        assert_eq!(plan, ChangePlan::Arm);
        scheduler.cancel_pending();

        timer.fire_all();
        assert!(!fired.load(Ordering::SeqCst));
    }
}
