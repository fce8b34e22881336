//! Native event processing.
//!
//! Drains are always non-blocking when requested through [`do_events`] and
//! only ever touch the calling thread's queue.  The [`Scheduler`] bridges
//! the native notifier into tokio: a task spawned into the caller's
//! `LocalSet` wakes up every `interval` (after an initial `delay`) and
//! drains whatever was ready at that tick.
//!
//! ```text
//!   stopped ──resume(local, delay, interval)──▶ running ──suspend()──▶ stopped
//!      ▲                                          │  resume() is a no-op here
//!      └────────────── task ends with its LocalSet ┘
//! ```

use std::ops::{BitAnd, BitOr, Not};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Duration;

use tokio::task::{AbortHandle, LocalSet};
use tokio::time::MissedTickBehavior;

use crate::config::Config;
use crate::interp::reap_deferred;
use crate::sys;

// ── Flags ─────────────────────────────────────────────────────────────────────

/// Which event sources a single step may service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventFlags(i32);

impl EventFlags {
    pub const WINDOW: Self = Self(sys::WINDOW_EVENTS);
    pub const FILE: Self = Self(sys::FILE_EVENTS);
    pub const TIMER: Self = Self(sys::TIMER_EVENTS);
    pub const IDLE: Self = Self(sys::IDLE_EVENTS);
    pub const ALL: Self = Self(sys::ALL_EVENTS);
    /// Return immediately instead of sleeping until the next timer.
    pub const DONT_WAIT: Self = Self(sys::DONT_WAIT);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> i32 {
        self.0
    }
}

impl Default for EventFlags {
    fn default() -> Self {
        Self::ALL
    }
}

impl BitOr for EventFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd for EventFlags {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Not for EventFlags {
    type Output = Self;
    fn not(self) -> Self {
        Self(!self.0)
    }
}

// ── Manual drains ─────────────────────────────────────────────────────────────

/// Service at most one event.  Without [`EventFlags::DONT_WAIT`] this
/// sleeps until the earliest pending timer is due.
pub fn do_one_event(flags: EventFlags) -> bool {
    sys::do_one_event(flags.bits())
}

/// Service the events that are ready when the call starts, without
/// blocking.  Callbacks queued while draining wait for the next call.
/// Deferred interpreter deletions for this thread are reaped first.
/// Returns the number of events serviced.
pub fn do_events() -> usize {
    reap_deferred();
    let count = sys::drain_events((EventFlags::ALL | EventFlags::DONT_WAIT).bits());
    if count > 0 {
        tracing::trace!(count, "drained events");
    }
    count
}

/// True if any timer or idle callback is queued on this thread.
pub fn pending() -> bool {
    sys::events_pending()
}

// ── Scheduler ─────────────────────────────────────────────────────────────────

struct Running {
    abort: AbortHandle,
    owner: ThreadId,
    delay: Duration,
    interval: Duration,
}

static STATE: Mutex<Option<Running>> = Mutex::new(None);

/// Snapshot of the scheduler singleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStatus {
    pub owner: ThreadId,
    pub delay: Duration,
    pub interval: Duration,
}

/// Process-wide periodic drain of the native event queue.
pub struct Scheduler;

impl Scheduler {
    /// Start draining after `delay`, then every `interval`, on a task
    /// spawned into `local`.  The drains happen while `local` is being
    /// driven, on the thread driving it.  Does nothing if already running.
    /// Returns whether a new task was started.
    pub fn resume(local: &LocalSet, delay: Duration, interval: Duration) -> bool {
        let mut state = STATE.lock().unwrap_or_else(PoisonError::into_inner);
        if state.as_ref().is_some_and(|r| !r.abort.is_finished()) {
            return false;
        }
        let period = interval.max(Duration::from_millis(1));
        let task = local.spawn_local(async move {
            tokio::time::sleep(delay).await;
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                do_events();
            }
        });
        let owner = thread::current().id();
        tracing::debug!(?owner, ?delay, interval = ?period, "event scheduler resumed");
        *state = Some(Running { abort: task.abort_handle(), owner, delay, interval: period });
        true
    }

    /// [`resume`](Self::resume) with the timing from `config`.
    pub fn resume_with(local: &LocalSet, config: &Config) -> bool {
        Self::resume(local, config.event_delay, config.event_interval)
    }

    /// [`resume`](Self::resume) with the timing from the environment.
    pub fn resume_default(local: &LocalSet) -> bool {
        let (config, errors) = Config::from_env();
        for e in &errors {
            tracing::warn!("config: {e}");
        }
        Self::resume_with(local, &config)
    }

    /// Stop the periodic drain.  Returns whether it was running.
    pub fn suspend() -> bool {
        let running = STATE.lock().unwrap_or_else(PoisonError::into_inner).take();
        match running {
            Some(r) => {
                let was_live = !r.abort.is_finished();
                r.abort.abort();
                tracing::debug!(owner = ?r.owner, "event scheduler suspended");
                was_live
            }
            None => false,
        }
    }

    pub fn is_running() -> bool {
        STATE
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|r| !r.abort.is_finished())
    }

    /// Current timing and owner, if running.
    pub fn status() -> Option<SchedulerStatus> {
        STATE
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|r| !r.abort.is_finished())
            .map(|r| SchedulerStatus { owner: r.owner, delay: r.delay, interval: r.interval })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
//
// Scheduler start/stop is process-wide, so it is exercised from a single
// integration test binary (tests/event_drain.rs) rather than here.

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::Interp;

    #[test]
    fn empty_thread_drains_nothing() {
        assert_eq!(do_events(), 0);
        assert!(!do_one_event(EventFlags::ALL | EventFlags::DONT_WAIT));
        assert!(!pending());
    }

    #[test]
    fn idle_callbacks_drain_in_one_batch() {
        let interp = Interp::new();
        interp.eval::<()>("set n 0; after idle {incr n}; after idle {incr n}").unwrap();
        assert!(pending());
        assert_eq!(do_events(), 2);
        assert_eq!(interp.get::<i32>("n").unwrap(), 2);
        interp.delete().unwrap();
    }

    #[test]
    fn self_requeueing_callback_runs_once_per_drain() {
        let interp = Interp::new();
        interp
            .eval::<()>("set n 0; set s {incr n; after idle $s}; after idle $s")
            .unwrap();
        for round in 1..=3 {
            assert_eq!(do_events(), 1);
            assert_eq!(interp.get::<i32>("n").unwrap(), round);
        }
        assert!(pending());
        interp.delete().unwrap();
        assert!(!pending());
    }

    #[test]
    fn timers_wait_for_their_deadline() {
        let interp = Interp::new();
        interp.eval::<()>("set hit 0; after 30 {set hit 1}").unwrap();
        assert_eq!(do_events(), 0);
        assert_eq!(interp.get::<i32>("hit").unwrap(), 0);
        // Blocking step sleeps until the timer is due.
        assert!(do_one_event(EventFlags::TIMER));
        assert_eq!(interp.get::<i32>("hit").unwrap(), 1);
        interp.delete().unwrap();
    }

    #[test]
    fn drain_reaps_deferred_deletions() {
        let interp = Interp::new();
        let ptr = interp.as_ptr();
        thread::spawn(move || drop(interp)).join().unwrap();
        do_events();
        assert!(!sys::interp_exists(ptr));
    }

    #[test]
    fn flag_helpers() {
        let f = EventFlags::TIMER | EventFlags::DONT_WAIT;
        assert!(f.contains(EventFlags::TIMER));
        assert!(!f.contains(EventFlags::IDLE));
        assert!(EventFlags::ALL.contains(EventFlags::IDLE));
        assert!(!EventFlags::ALL.contains(EventFlags::DONT_WAIT));
        assert_eq!((EventFlags::ALL & !EventFlags::IDLE) & EventFlags::IDLE, EventFlags(0));
    }
}
