// Chicago-TDD-style integration tests for the alarm scheduler.
// State-based tests with real collaborators: a live Scheduler, real
// background threads, no mocked clock or timer.

use alarm_scheduler::{Alarm, OsCallouts, Scheduler, SchedulerConfig};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// FIXTURE: a real scheduler, torn down at the end of every test
// ============================================================================

struct SchedulerFixture {
    scheduler: Scheduler,
}

impl SchedulerFixture {
    fn new() -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        Self {
            scheduler: Scheduler::new(SchedulerConfig::default()).expect("scheduler init"),
        }
    }
}

impl Drop for SchedulerFixture {
    fn drop(&mut self) {
        self.scheduler.cleanup();
    }
}

fn wait_until(mut predicate: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    predicate()
}

// ============================================================================
// BEHAVIOR: one-shot alarm on the default processing queue
// ============================================================================

#[test]
fn one_shot_alarm_fires_exactly_once_on_the_default_queue() {
    // Given: a scheduler and a fresh one-shot alarm
    let fixture = SchedulerFixture::new();
    let alarm = Alarm::new(&fixture.scheduler, "one-shot-default-queue");
    let fire_count = Arc::new(AtomicU64::new(0));
    let fire_count_clone = fire_count.clone();

    // When: it is set for a short delay with no explicit queue
    alarm.set(20, Arc::new(()), move |_data| {
        fire_count_clone.fetch_add(1, Ordering::SeqCst);
    });
    assert!(alarm.is_scheduled());

    // Then: it fires exactly once, and is no longer scheduled afterward
    assert!(wait_until(|| fire_count.load(Ordering::SeqCst) == 1, Duration::from_millis(500)));
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(fire_count.load(Ordering::SeqCst), 1);
    assert!(!alarm.is_scheduled());
}

// ============================================================================
// BEHAVIOR: periodic alarm holds phase lock against its creation time
// ============================================================================

#[test]
fn periodic_alarm_does_not_drift_from_creation_time() {
    // Given: a periodic alarm at a short period
    let fixture = SchedulerFixture::new();
    let alarm = Alarm::new_periodic(&fixture.scheduler, "heartbeat");
    let ticks: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
    let ticks_clone = ticks.clone();
    let period_ms = 25;

    // When: the callback itself takes a few ms to run (simulating real work)
    alarm.set(period_ms, Arc::new(()), move |_data| {
        ticks_clone.lock().unwrap().push(0);
        std::thread::sleep(Duration::from_millis(5));
    });

    // Then: over several periods, it fires close to the expected count —
    // execution time inside the callback must not accumulate as drift.
    std::thread::sleep(Duration::from_millis(period_ms * 8));
    alarm.cancel();
    let observed = ticks.lock().unwrap().len() as u64;
    assert!(observed >= 5, "expected at least 5 ticks in 8 periods, saw {observed}");
}

// ============================================================================
// BEHAVIOR: cancel() blocks until an in-flight callback completes
// ============================================================================

#[test]
fn cancel_blocks_until_in_flight_callback_completes() {
    // Given: an alarm whose callback sleeps, to give cancel() a window to
    // race against it
    let fixture = SchedulerFixture::new();
    let alarm = Alarm::new(&fixture.scheduler, "slow-callback");
    let callback_finished = Arc::new(AtomicBool::new(false));
    let callback_finished_clone = callback_finished.clone();

    alarm.set(10, Arc::new(()), move |_data| {
        std::thread::sleep(Duration::from_millis(100));
        callback_finished_clone.store(true, Ordering::SeqCst);
    });

    // When: cancel() is called once the callback is known to be running
    std::thread::sleep(Duration::from_millis(40));
    alarm.cancel();

    // Then: cancel() did not return until the callback had actually finished
    assert!(callback_finished.load(Ordering::SeqCst));
}

// ============================================================================
// BEHAVIOR: a callback may cancel its own alarm without deadlocking
// ============================================================================

#[test]
fn callback_cancelling_its_own_alarm_does_not_deadlock() {
    // Given: a one-shot alarm whose callback cancels itself
    let fixture = SchedulerFixture::new();
    let alarm = Alarm::new(&fixture.scheduler, "self-cancelling");
    let inner_alarm = alarm.clone();
    let completed = Arc::new(AtomicBool::new(false));
    let completed_clone = completed.clone();

    alarm.set(10, Arc::new(()), move |_data| {
        inner_alarm.cancel();
        completed_clone.store(true, Ordering::SeqCst);
    });

    // Then: the re-entrant cancel returns promptly instead of deadlocking
    assert!(wait_until(|| completed.load(Ordering::SeqCst), Duration::from_millis(500)));
}

// ============================================================================
// BEHAVIOR: rescheduling the earliest deadline rearms the OS timer
// ============================================================================

#[test]
fn setting_an_earlier_alarm_preempts_a_later_one() {
    // Given: a long-deadline alarm already scheduled
    let fixture = SchedulerFixture::new();
    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let late = Alarm::new(&fixture.scheduler, "late");
    let order_late = order.clone();
    late.set(200, Arc::new(()), move |_data| order_late.lock().unwrap().push("late"));

    // When: an earlier alarm is set afterward
    let early = Alarm::new(&fixture.scheduler, "early");
    let order_early = order.clone();
    early.set(20, Arc::new(()), move |_data| order_early.lock().unwrap().push("early"));

    // Then: the earlier deadline fires first even though it was armed second
    assert!(wait_until(
        || order.lock().unwrap().len() == 2,
        Duration::from_millis(500)
    ));
    assert_eq!(*order.lock().unwrap(), vec!["early", "late"]);
}

// ============================================================================
// BEHAVIOR: custom processing queues isolate callback execution
// ============================================================================

#[test]
fn alarms_on_distinct_queues_run_on_distinct_worker_threads() {
    // Given: two processing queues, each observing which thread runs on
    let fixture = SchedulerFixture::new();
    fixture.scheduler.register_processing_queue("queue-a").unwrap();
    fixture.scheduler.register_processing_queue("queue-b").unwrap();

    let thread_a = Arc::new(Mutex::new(None));
    let thread_b = Arc::new(Mutex::new(None));

    let a = Alarm::new(&fixture.scheduler, "a");
    let thread_a_clone = thread_a.clone();
    a.set_on_queue(10, Arc::new(()), move |_data| {
        *thread_a_clone.lock().unwrap() = Some(std::thread::current().id());
    }, "queue-a");

    let b = Alarm::new(&fixture.scheduler, "b");
    let thread_b_clone = thread_b.clone();
    b.set_on_queue(10, Arc::new(()), move |_data| {
        *thread_b_clone.lock().unwrap() = Some(std::thread::current().id());
    }, "queue-b");

    // When: both fire
    assert!(wait_until(
        || thread_a.lock().unwrap().is_some() && thread_b.lock().unwrap().is_some(),
        Duration::from_millis(500)
    ));

    // Then: they ran on two distinct worker threads
    assert_ne!(*thread_a.lock().unwrap(), *thread_b.lock().unwrap());
}

// ============================================================================
// BEHAVIOR: unregistering a queue cancels every alarm still bound to it
// ============================================================================

#[test]
fn unregistering_a_queue_cancels_alarms_still_bound_to_it() {
    // Given: an alarm bound to a non-default queue, not yet due
    let fixture = SchedulerFixture::new();
    fixture.scheduler.register_processing_queue("doomed").unwrap();
    let alarm = Alarm::new(&fixture.scheduler, "bound-to-doomed-queue");
    let fired = Arc::new(AtomicBool::new(false));
    let fired_clone = fired.clone();
    alarm.set_on_queue(60_000, Arc::new(()), move |_data| {
        fired_clone.store(true, Ordering::SeqCst);
    }, "doomed");
    assert!(alarm.is_scheduled());

    // When: the queue is unregistered
    fixture.scheduler.unregister_processing_queue("doomed").unwrap();

    // Then: the alarm was cancelled as a side effect and will never fire
    assert!(!alarm.is_scheduled());
    std::thread::sleep(Duration::from_millis(50));
    assert!(!fired.load(Ordering::SeqCst));
}

// ============================================================================
// BEHAVIOR: wake-lock vs. wake-alarm path selection
// ============================================================================

#[derive(Default)]
struct PathRecordingCallouts {
    wake_lock_acquired: AtomicBool,
    wake_alarm_set: AtomicBool,
}

impl OsCallouts for PathRecordingCallouts {
    fn set_wake_alarm(&self, delta_ms: u64, on_fire: Arc<dyn Fn() + Send + Sync>) -> bool {
        self.wake_alarm_set.store(true, Ordering::SeqCst);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(delta_ms.min(20)));
            on_fire();
        });
        true
    }

    fn acquire_wake_lock(&self, _id: &str) -> bool {
        self.wake_lock_acquired.store(true, Ordering::SeqCst);
        true
    }

    fn release_wake_lock(&self, _id: &str) -> bool {
        true
    }
}

#[test]
fn short_deadline_uses_the_wake_lock_path_not_the_wake_alarm() {
    // Given: a scheduler with the default 3000ms wakelock threshold
    let callouts = Arc::new(PathRecordingCallouts::default());
    let scheduler =
        Scheduler::with_os_callouts(SchedulerConfig::default(), callouts.clone()).expect("init");
    let alarm = Alarm::new(&scheduler, "short");
    let fired = Arc::new(AtomicBool::new(false));
    let fired_clone = fired.clone();

    // When: it is set well inside the threshold
    alarm.set(20, Arc::new(()), move |_data| {
        fired_clone.store(true, Ordering::SeqCst);
    });

    // Then: the wake lock path was used, not the wake alarm
    assert!(wait_until(|| fired.load(Ordering::SeqCst), Duration::from_millis(300)));
    assert!(callouts.wake_lock_acquired.load(Ordering::SeqCst));
    assert!(!callouts.wake_alarm_set.load(Ordering::SeqCst));
    scheduler.cleanup();
}

#[test]
fn long_deadline_uses_the_wake_alarm_path_not_the_wake_lock() {
    // Given: a scheduler with a 3000ms wakelock threshold (the default)
    let callouts = Arc::new(PathRecordingCallouts::default());
    let scheduler =
        Scheduler::with_os_callouts(SchedulerConfig::default(), callouts.clone()).expect("init");
    let alarm = Alarm::new(&scheduler, "long");
    let fired = Arc::new(AtomicBool::new(false));
    let fired_clone = fired.clone();

    // When: it is set well beyond the threshold
    alarm.set(10_000, Arc::new(()), move |_data| {
        fired_clone.store(true, Ordering::SeqCst);
    });
    std::thread::sleep(Duration::from_millis(50));

    // Then: the wake alarm path was armed immediately, and the wake lock
    // was never acquired for this deadline
    assert!(callouts.wake_alarm_set.load(Ordering::SeqCst));
    assert!(!callouts.wake_lock_acquired.load(Ordering::SeqCst));
    scheduler.cleanup();
}

// ============================================================================
// BEHAVIOR: stats accumulate across the alarm's lifetime
// ============================================================================

#[test]
fn stats_record_scheduling_and_cancellation_counts() {
    // Given: an alarm that is set, allowed to fire, then set again and cancelled
    let fixture = SchedulerFixture::new();
    let alarm = Alarm::new(&fixture.scheduler, "stats-tracked");

    alarm.set(10, Arc::new(()), |_data| {});
    assert!(wait_until(|| !alarm.is_scheduled(), Duration::from_millis(300)));

    alarm.set(60_000, Arc::new(()), |_data| {});
    alarm.cancel();

    // Then: the lifetime counters reflect both events
    let stats = alarm.stats();
    assert_eq!(stats.scheduled_count, 2);
    assert_eq!(stats.canceled_count, 1);
    assert_eq!(stats.total_updates, 1);
}
