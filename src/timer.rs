//! Expiration timer (C3) and the host-OS callout surface it depends on.
//!
//! Two physical timers hide behind [`ExpirationTimer::arm_absolute`]: a
//! *process timer*, driven by a background thread waiting on this crate's
//! own [`Clock`], which does not survive process/system suspend; and a
//! *wake alarm*, obtained from [`OsCallouts`], which does. Exactly one of
//! {process timer armed, wake alarm armed} is live at a time, chosen by
//! comparing the time remaining against [`SchedulerConfig::wakelock_threshold_ms`].

use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::signal::ExpirationSignal;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Identifier used when acquiring/releasing the scheduler's single wake
/// lock — there is exactly one, process-wide, for the lifetime of the
/// scheduler.
pub const WAKE_LOCK_ID: &str = "alarm_scheduler";

/// Host OS callout surface. The core depends on, but never implements,
/// the platform mechanism for a suspend-surviving timer or a suspend
/// blocker; this trait is the seam an embedding application plugs its real
/// platform integration into.
pub trait OsCallouts: Send + Sync {
    /// Schedules a single-shot wake alarm `delta_ms` from now that must fire
    /// even across system suspend. `on_fire` must be invoked from whatever
    /// thread the platform delivers the notification on. Returns `false` if
    /// the platform rejected the request.
    fn set_wake_alarm(&self, delta_ms: u64, on_fire: Arc<dyn Fn() + Send + Sync>) -> bool;

    /// Acquires a reference-counted suspend blocker identified by `id`.
    fn acquire_wake_lock(&self, id: &str) -> bool;

    /// Releases a previously acquired suspend blocker.
    fn release_wake_lock(&self, id: &str) -> bool;
}

/// Fallback callouts for running this crate outside a host environment that
/// supplies real platform wake alarms/locks: the "wake alarm" is emulated
/// with a detached sleeper thread, and wake locks are tracked but never
/// actually prevent suspend (there is no suspend to prevent in a plain
/// process). Sufficient for tests and for embedding in processes that don't
/// need to survive system suspend.
#[derive(Debug, Default)]
pub struct DefaultOsCallouts;

impl OsCallouts for DefaultOsCallouts {
    fn set_wake_alarm(&self, delta_ms: u64, on_fire: Arc<dyn Fn() + Send + Sync>) -> bool {
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(delta_ms));
            on_fire();
        });
        true
    }

    fn acquire_wake_lock(&self, id: &str) -> bool {
        tracing::debug!(wake_lock = id, "acquired (no-op fallback)");
        true
    }

    fn release_wake_lock(&self, id: &str) -> bool {
        tracing::debug!(wake_lock = id, "released (no-op fallback)");
        true
    }
}

/// Shared state the background process-timer thread waits on.
struct TimerShared {
    target_ms: Mutex<Option<u64>>,
    condvar: Condvar,
    shutdown: AtomicBool,
}

pub struct ExpirationTimer {
    clock: Arc<dyn Clock>,
    signal: Arc<ExpirationSignal>,
    callouts: Arc<dyn OsCallouts>,
    threshold_ms: u64,
    wake_lock_held: Mutex<bool>,
    shared: Arc<TimerShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ExpirationTimer {
    pub fn new(
        clock: Arc<dyn Clock>,
        signal: Arc<ExpirationSignal>,
        callouts: Arc<dyn OsCallouts>,
        config: &SchedulerConfig,
    ) -> Self {
        let shared = Arc::new(TimerShared {
            target_ms: Mutex::new(None),
            condvar: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });

        let worker = {
            let shared = shared.clone();
            let clock = clock.clone();
            let signal = signal.clone();
            std::thread::Builder::new()
                .name("alarm-process-timer".into())
                .spawn(move || process_timer_loop(shared, clock, signal))
                .expect("failed to spawn process timer thread")
        };

        Self {
            clock,
            signal,
            callouts,
            threshold_ms: config.wakelock_threshold_ms,
            wake_lock_held: Mutex::new(false),
            shared,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Arms whichever physical timer is appropriate for `deadline_ms`,
    /// releasing/acquiring the wake lock as the threshold policy dictates.
    pub fn arm_absolute(&self, deadline_ms: u64) {
        let now = self.clock.now_ms();
        let delta = deadline_ms.saturating_sub(now);

        if delta < self.threshold_ms {
            let mut held = self.wake_lock_held.lock();
            if !*held {
                if self.callouts.acquire_wake_lock(WAKE_LOCK_ID) {
                    *held = true;
                } else {
                    tracing::error!(id = WAKE_LOCK_ID, "unable to acquire wake lock");
                    // WakeLockFailure: abandon this arming cycle; the alarm
                    // stays in the deadline set and is retried next wakeup.
                    return;
                }
            }
            drop(held);

            self.set_process_timer_target(Some(deadline_ms));

            // Arm-time race mitigation: the deadline may already have
            // elapsed while we were programming the timer.
            if self.clock.now_ms() >= deadline_ms {
                self.signal.post();
            }
        } else {
            self.release_wake_lock_if_held();
            self.set_process_timer_target(None);

            let signal = self.signal.clone();
            let ok = self
                .callouts
                .set_wake_alarm(delta, Arc::new(move || signal.post()));
            if !ok {
                tracing::error!(delta_ms = delta, "unable to set wake alarm");
            }
        }
    }

    /// Disarms whichever timer is live and releases the wake lock if held.
    pub fn disarm(&self) {
        self.release_wake_lock_if_held();
        self.set_process_timer_target(None);
    }

    fn release_wake_lock_if_held(&self) {
        let mut held = self.wake_lock_held.lock();
        if *held {
            self.callouts.release_wake_lock(WAKE_LOCK_ID);
            *held = false;
        }
    }

    fn set_process_timer_target(&self, target: Option<u64>) {
        let mut guard = self.shared.target_ms.lock();
        *guard = target;
        self.shared.condvar.notify_all();
    }

    /// Stops the background process-timer thread. Idempotent.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        {
            let mut guard = self.shared.target_ms.lock();
            *guard = None;
        }
        self.shared.condvar.notify_all();
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }
}

fn process_timer_loop(shared: Arc<TimerShared>, clock: Arc<dyn Clock>, signal: Arc<ExpirationSignal>) {
    loop {
        let mut guard = shared.target_ms.lock();
        if shared.shutdown.load(Ordering::SeqCst) {
            return;
        }

        match *guard {
            None => {
                shared.condvar.wait(&mut guard);
            }
            Some(deadline_ms) => {
                let now = clock.now_ms();
                if deadline_ms <= now {
                    *guard = None;
                    drop(guard);
                    signal.post();
                    continue;
                }

                let wait_ms = deadline_ms - now;
                let timeout = shared
                    .condvar
                    .wait_for(&mut guard, Duration::from_millis(wait_ms));
                if timeout.timed_out() && *guard == Some(deadline_ms) {
                    *guard = None;
                    drop(guard);
                    signal.post();
                }
                // Otherwise: notified early because the target changed
                // (rearmed) or shutdown was requested; loop re-evaluates.
            }
        }
    }
}
