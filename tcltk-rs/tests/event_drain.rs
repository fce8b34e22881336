//! Periodic event draining.  The scheduler is process-wide, so every
//! assertion about it lives in the single test below.

use std::time::Duration;

use tcltk::{Interp, Scheduler};
use tokio::task::LocalSet;
use tokio::time::sleep;

#[tokio::test]
async fn scheduler_drives_native_timers() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let interp = Interp::new();
            interp.eval::<()>("set counter 0; after 120 {incr counter}").unwrap();

            // Stopped: nothing drains the queue.
            assert!(!Scheduler::is_running());
            sleep(Duration::from_millis(40)).await;
            assert_eq!(interp.get::<i64>("counter").unwrap(), 0);

            assert!(Scheduler::resume(&local, Duration::ZERO, Duration::from_millis(10)));
            assert!(Scheduler::is_running());
            assert!(!Scheduler::resume(&local, Duration::ZERO, Duration::from_millis(10)));
            assert!(!Scheduler::resume_default(&local));
            let status = Scheduler::status().unwrap();
            assert_eq!(status.interval, Duration::from_millis(10));
            assert_eq!(status.owner, std::thread::current().id());

            sleep(Duration::from_millis(300)).await;
            assert_eq!(interp.get::<i64>("counter").unwrap(), 1);

            // Idle callbacks are picked up on the next tick.
            interp.eval::<()>("after idle {incr counter}").unwrap();
            sleep(Duration::from_millis(60)).await;
            assert_eq!(interp.get::<i64>("counter").unwrap(), 2);

            assert!(Scheduler::suspend());
            assert!(!Scheduler::is_running());
            assert!(!Scheduler::suspend());

            interp.eval::<()>("after 10 {incr counter}").unwrap();
            sleep(Duration::from_millis(60)).await;
            assert_eq!(interp.get::<i64>("counter").unwrap(), 2);
            assert_eq!(tcltk::do_events(), 1);
            assert_eq!(interp.get::<i64>("counter").unwrap(), 3);

            // A callback that re-queues itself does not stall the ticks.
            interp
                .eval::<()>("set n 0; set s {incr n; after idle $s}; after idle $s")
                .unwrap();
            assert!(Scheduler::resume(&local, Duration::ZERO, Duration::from_millis(10)));
            sleep(Duration::from_millis(100)).await;
            assert!(Scheduler::suspend());
            assert!(interp.get::<i64>("n").unwrap() >= 2);

            interp.delete().unwrap();
        })
        .await;

    // Outside any driven set the task is only queued.
    let idle = LocalSet::new();
    assert!(Scheduler::resume(&idle, Duration::ZERO, Duration::from_millis(10)));
    assert!(Scheduler::is_running());
    assert_eq!(Scheduler::status().unwrap().owner, std::thread::current().id());
    assert!(Scheduler::suspend());
    assert!(!Scheduler::is_running());
}

#[test]
fn manual_drain_counts_events() {
    let interp = Interp::new();
    interp
        .eval::<()>("after idle {set a 1}; after 0 {set b 2}; after 5000 {set c 3}")
        .unwrap();
    std::thread::sleep(Duration::from_millis(5));
    assert_eq!(tcltk::do_events(), 2);
    assert!(tcltk::event::pending());
    assert!(!interp.exists("c").unwrap());
    interp.eval::<()>("after cancel {set c 3}").unwrap();
    assert!(!tcltk::event::pending());
    interp.delete().unwrap();
}
