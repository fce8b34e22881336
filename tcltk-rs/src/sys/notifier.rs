//! Per-thread notifier (`Tcl_DoOneEvent`).
//!
//! Holds the timer queue fed by `after ms script` and the idle queue fed by
//! `after idle script`.  There is exactly one notifier per thread; event
//! sources registered on one thread are only ever serviced there.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::heap;
use super::interp::{self, InterpPtr, Status};
use super::{enter, eval};

pub const DONT_WAIT: i32 = 1 << 1;
pub const WINDOW_EVENTS: i32 = 1 << 2;
pub const FILE_EVENTS: i32 = 1 << 3;
pub const TIMER_EVENTS: i32 = 1 << 4;
pub const IDLE_EVENTS: i32 = 1 << 5;
pub const ALL_EVENTS: i32 = !DONT_WAIT;

#[derive(Debug)]
struct Event {
    id: u64,
    interp: InterpPtr,
    script: String,
}

#[derive(Debug)]
struct Timer {
    due: Instant,
    event: Event,
}

#[derive(Debug, Default)]
struct Notifier {
    /// Sorted by due time, then by creation order.
    timers: Vec<Timer>,
    idle: VecDeque<Event>,
    next_id: u64,
}

thread_local! {
    static NOTIFIER: RefCell<Notifier> = RefCell::new(Notifier::default());
}

fn event_name(id: u64) -> String {
    format!("after#{id}")
}

pub(super) fn create_timer(interp: InterpPtr, delay: Duration, script: String) -> String {
    NOTIFIER.with(|n| {
        let mut n = n.borrow_mut();
        let id = n.next_id;
        n.next_id += 1;
        let due = Instant::now() + delay;
        let at = n.timers.partition_point(|t| t.due <= due);
        n.timers.insert(at, Timer { due, event: Event { id, interp, script } });
        event_name(id)
    })
}

pub(super) fn when_idle(interp: InterpPtr, script: String) -> String {
    NOTIFIER.with(|n| {
        let mut n = n.borrow_mut();
        let id = n.next_id;
        n.next_id += 1;
        n.idle.push_back(Event { id, interp, script });
        event_name(id)
    })
}

/// Cancel the first pending event of `interp` whose id or script matches.
pub(super) fn cancel(interp: InterpPtr, id_or_script: &str) {
    NOTIFIER.with(|n| {
        let mut n = n.borrow_mut();
        let matches = |e: &Event| {
            e.interp == interp && (event_name(e.id) == id_or_script || e.script == id_or_script)
        };
        if let Some(at) = n.timers.iter().position(|t| matches(&t.event)) {
            n.timers.remove(at);
        } else if let Some(at) = n.idle.iter().position(|e| matches(e)) {
            n.idle.remove(at);
        }
    });
}

/// Drop every event belonging to a deleted interpreter.
pub(super) fn forget_interp(interp: InterpPtr) {
    NOTIFIER.with(|n| {
        let mut n = n.borrow_mut();
        n.timers.retain(|t| t.event.interp != interp);
        n.idle.retain(|e| e.interp != interp);
    });
}

enum Next {
    Run(Event),
    Wait(Instant),
    Nothing,
}

fn next_event(flags: i32) -> Next {
    NOTIFIER.with(|n| {
        let mut n = n.borrow_mut();
        if flags & TIMER_EVENTS != 0 {
            if let Some(first) = n.timers.first() {
                if first.due <= Instant::now() {
                    return Next::Run(n.timers.remove(0).event);
                }
            }
        }
        if flags & IDLE_EVENTS != 0 {
            if let Some(event) = n.idle.pop_front() {
                return Next::Run(event);
            }
        }
        match n.timers.first() {
            Some(t) if flags & TIMER_EVENTS != 0 => Next::Wait(t.due),
            _ => Next::Nothing,
        }
    })
}

/// Evaluate an event script, preserving the interpreter's current result.
fn dispatch(event: Event) {
    if !interp::interp_exists(event.interp) {
        return;
    }
    let saved = interp::get_obj_result(event.interp);
    heap::incr_ref_count(saved);
    let status = eval::eval_script(event.interp, &event.script);
    if status == Status::Error {
        let msg = heap::get_string(interp::get_obj_result(event.interp));
        tracing::warn!(event = %event_name(event.id), "background error: {msg}");
    }
    interp::set_obj_result(event.interp, saved);
    heap::decr_ref_count(saved);
}

/// `Tcl_DoOneEvent`.  Services at most one event and reports whether one
/// was serviced.  Without `DONT_WAIT` it sleeps until the next timer is due;
/// with nothing queued it returns `false` immediately instead of blocking
/// forever.
pub fn do_one_event(flags: i32) -> bool {
    enter();
    loop {
        match next_event(flags) {
            Next::Run(event) => {
                dispatch(event);
                return true;
            }
            Next::Wait(due) if flags & DONT_WAIT == 0 => {
                std::thread::sleep(due.saturating_duration_since(Instant::now()));
            }
            Next::Wait(_) | Next::Nothing => return false,
        }
    }
}

/// Service the events that are ready when the call starts: timers already
/// due, then the idle callbacks queued so far.  Events queued by those
/// callbacks wait for the next drain.  Never blocks; returns the number
/// serviced.
pub fn drain_events(flags: i32) -> usize {
    enter();
    let batch: Vec<u64> = NOTIFIER.with(|n| {
        let n = n.borrow();
        let now = Instant::now();
        let timers = n
            .timers
            .iter()
            .take_while(|t| flags & TIMER_EVENTS != 0 && t.due <= now)
            .map(|t| t.event.id);
        let idle = n
            .idle
            .iter()
            .take_while(|_| flags & IDLE_EVENTS != 0)
            .map(|e| e.id);
        timers.chain(idle).collect()
    });
    let mut count = 0;
    for id in batch {
        // An earlier callback may have cancelled it.
        if let Some(event) = take_event(id) {
            dispatch(event);
            count += 1;
        }
    }
    count
}

fn take_event(id: u64) -> Option<Event> {
    NOTIFIER.with(|n| {
        let mut n = n.borrow_mut();
        if let Some(at) = n.timers.iter().position(|t| t.event.id == id) {
            return Some(n.timers.remove(at).event);
        }
        let at = n.idle.iter().position(|e| e.id == id)?;
        n.idle.remove(at)
    })
}

/// True if any timer or idle callback is queued on this thread.
pub fn events_pending() -> bool {
    enter();
    NOTIFIER.with(|n| {
        let n = n.borrow();
        !n.timers.is_empty() || !n.idle.is_empty()
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn var(interp: InterpPtr, name: &str) -> Option<String> {
        interp::get_var(interp, name, None).ok().map(heap::get_string)
    }

    #[test]
    fn nothing_queued_returns_false() {
        assert!(!do_one_event(ALL_EVENTS));
        assert!(!do_one_event(ALL_EVENTS | DONT_WAIT));
    }

    #[test]
    fn timers_fire_in_due_order() {
        let i = interp::create_interp();
        create_timer(i, Duration::from_millis(20), "lappend order late".into());
        create_timer(i, Duration::ZERO, "lappend order early".into());
        assert!(do_one_event(ALL_EVENTS));
        assert!(do_one_event(ALL_EVENTS));
        assert_eq!(var(i, "order").as_deref(), Some("early late"));
        assert!(!events_pending());
        interp::delete_interp(i);
    }

    #[test]
    fn dont_wait_skips_future_timers() {
        let i = interp::create_interp();
        create_timer(i, Duration::from_secs(60), "set fired 1".into());
        assert!(!do_one_event(ALL_EVENTS | DONT_WAIT));
        assert!(events_pending());
        interp::delete_interp(i);
        assert!(!events_pending());
    }

    #[test]
    fn idle_only_flag_leaves_timers() {
        let i = interp::create_interp();
        create_timer(i, Duration::ZERO, "set t 1".into());
        when_idle(i, "set idle 1".into());
        assert!(do_one_event(IDLE_EVENTS | DONT_WAIT));
        assert!(!do_one_event(IDLE_EVENTS | DONT_WAIT));
        assert_eq!(var(i, "idle").as_deref(), Some("1"));
        assert_eq!(var(i, "t"), None);
        interp::delete_interp(i);
    }

    #[test]
    fn background_error_keeps_result() {
        let i = interp::create_interp();
        interp::set_string_result(i, "kept");
        when_idle(i, "error boom".into());
        assert!(do_one_event(ALL_EVENTS | DONT_WAIT));
        assert_eq!(heap::get_string(interp::get_obj_result(i)), "kept");
        interp::delete_interp(i);
    }

    #[test]
    fn drain_stops_at_requeued_idle() {
        let i = interp::create_interp();
        eval::eval_script(i, "set n 0; set s {incr n; after idle $s}; after idle $s");
        assert_eq!(drain_events(ALL_EVENTS | DONT_WAIT), 1);
        assert_eq!(var(i, "n").as_deref(), Some("1"));
        assert!(events_pending());
        assert_eq!(drain_events(ALL_EVENTS | DONT_WAIT), 1);
        assert_eq!(var(i, "n").as_deref(), Some("2"));
        interp::delete_interp(i);
        assert_eq!(drain_events(ALL_EVENTS | DONT_WAIT), 0);
    }

    #[test]
    fn drain_takes_due_timers_then_idle() {
        let i = interp::create_interp();
        create_timer(i, Duration::ZERO, "lappend order t1; after 0 {lappend order t2}".into());
        when_idle(i, "lappend order i1".into());
        create_timer(i, Duration::from_secs(60), "lappend order never".into());
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(drain_events(ALL_EVENTS | DONT_WAIT), 2);
        assert_eq!(var(i, "order").as_deref(), Some("t1 i1"));
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(drain_events(TIMER_EVENTS | DONT_WAIT), 1);
        assert_eq!(var(i, "order").as_deref(), Some("t1 i1 t2"));
        interp::delete_interp(i);
    }

    #[test]
    fn cancelled_by_earlier_callback_is_skipped() {
        let i = interp::create_interp();
        when_idle(i, "after cancel {set late 1}".into());
        when_idle(i, "set late 1".into());
        assert_eq!(drain_events(IDLE_EVENTS | DONT_WAIT), 1);
        assert_eq!(var(i, "late"), None);
        interp::delete_interp(i);
    }

    #[test]
    fn cancel_by_script_text() {
        let i = interp::create_interp();
        when_idle(i, "set x 1".into());
        cancel(i, "set x 1");
        assert!(!events_pending());
        interp::delete_interp(i);
    }
}
