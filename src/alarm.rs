//! Alarm data model, cancel barrier, and the public alarm handle (C7).
//!
//! The mutable scheduling state of every alarm (deadline, period, callback,
//! queue, stats — everything the monitor lock protects) lives in an
//! [`AlarmRecord`] owned by the scheduler's single monitor, not inside the
//! handle the client holds. The client-facing [`Alarm`] is a cheap,
//! cloneable reference (id + name + the alarm's own cancel barrier) that
//! always goes through the scheduler to read or mutate that state, taking
//! the monitor lock before touching any shared field.

use crate::scheduler::Scheduler;
use crate::stats::AlarmStats;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

static NEXT_ALARM_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of an alarm, stable for its lifetime: a cheap,
/// comparable key into the monitor's record table and the ordered deadline
/// set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AlarmId(u64);

impl AlarmId {
    pub(crate) fn next() -> Self {
        AlarmId(NEXT_ALARM_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Opaque per-alarm payload, handed back to the callback untouched: any
/// caller-owned value, cheaply cloned when the ready handler snapshots it
/// before releasing the monitor.
pub type AlarmData = Arc<dyn std::any::Any + Send + Sync>;

/// User callback: invoked with the alarm's opaque payload, never with the
/// alarm itself.
pub type AlarmCallback = Arc<dyn Fn(AlarmData) + Send + Sync>;

/// Mutable scheduling state for one alarm, owned by the scheduler's
/// monitor. `callback.is_some()` iff the alarm is in the ordered deadline
/// set.
pub(crate) struct AlarmRecord {
    pub name: Arc<str>,
    pub is_periodic: bool,
    pub creation_time_ms: u64,
    pub period_ms: u64,
    pub deadline_ms: u64,
    pub prev_deadline_ms: u64,
    pub callback: Option<AlarmCallback>,
    pub data: Option<AlarmData>,
    pub queue: Option<String>,
    pub stats: AlarmStats,
    pub callback_guard: Arc<CallbackGuard>,
    /// True while a `Ready(id)` message for this alarm sits in its
    /// processing queue's channel. Guards against a second message piling
    /// up behind it: since a channel has no mid-queue removal, the
    /// at-most-once-in-queue guarantee is reached by preventing the
    /// duplicate enqueue rather than purging it after the fact.
    pub pending_in_queue: bool,
}

impl AlarmRecord {
    pub fn new(name: Arc<str>, is_periodic: bool) -> Self {
        Self {
            name,
            is_periodic,
            creation_time_ms: 0,
            period_ms: 0,
            deadline_ms: 0,
            prev_deadline_ms: 0,
            callback: None,
            data: None,
            queue: None,
            stats: AlarmStats::default(),
            callback_guard: Arc::new(CallbackGuard::new()),
            pending_in_queue: false,
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.callback.is_some()
    }
}

/// The cancel barrier: the guarantee that `cancel` returns only after any
/// in-flight callback for the same alarm has completed.
///
/// Rather than a recursive mutex, this is an explicit in-progress flag plus
/// a condition variable, with a `ThreadId` comparison so a callback can
/// safely call `cancel` on its own alarm without deadlocking.
pub(crate) struct CallbackGuard {
    state: Mutex<GuardState>,
    condvar: Condvar,
}

#[derive(Default)]
struct GuardState {
    in_progress: bool,
    owner: Option<ThreadId>,
}

impl CallbackGuard {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GuardState::default()),
            condvar: Condvar::new(),
        }
    }

    /// Entered by the queue-ready handler immediately before invoking the
    /// user callback, after the monitor lock has been released. The
    /// returned token releases the guard and wakes any barrier waiters
    /// when dropped.
    pub fn enter(self: &Arc<Self>) -> CallbackGuardToken {
        let mut state = self.state.lock();
        debug_assert!(
            !state.in_progress,
            "callback_guard entered while already in progress — two callbacks for the same alarm running concurrently"
        );
        state.in_progress = true;
        state.owner = Some(thread::current().id());
        drop(state);
        CallbackGuardToken {
            guard: Arc::clone(self),
        }
    }

    /// The cancel barrier itself: blocks until no callback is in progress.
    /// Degenerates to a no-op when called from the thread already running
    /// the callback for this alarm — the re-entrant case where a callback
    /// cancels its own alarm.
    pub fn barrier(&self) {
        let mut state = self.state.lock();
        if state.in_progress && state.owner == Some(thread::current().id()) {
            return;
        }
        while state.in_progress {
            self.condvar.wait(&mut state);
        }
    }
}

pub(crate) struct CallbackGuardToken {
    guard: Arc<CallbackGuard>,
}

impl Drop for CallbackGuardToken {
    fn drop(&mut self) {
        let mut state = self.guard.state.lock();
        state.in_progress = false;
        state.owner = None;
        self.guard.condvar.notify_all();
    }
}

/// Client-facing alarm handle.
///
/// Cheap to clone; every method delegates to the owning [`Scheduler`]'s
/// monitor. Dropping the last clone cancels the alarm and releases its
/// record — callers do not need to remember to call an explicit `free`.
#[derive(Clone)]
pub struct Alarm {
    pub(crate) id: AlarmId,
    pub(crate) name: Arc<str>,
    pub(crate) is_periodic: bool,
    pub(crate) scheduler: Scheduler,
    pub(crate) inner: Arc<AlarmGuardHandle>,
}

/// Owns the one reference-counted "free on last drop" behavior for an
/// alarm; kept separate from [`Alarm`] so cloning the handle is cheap while
/// the teardown action runs exactly once.
pub(crate) struct AlarmGuardHandle {
    pub id: AlarmId,
    pub scheduler: Scheduler,
}

impl Drop for AlarmGuardHandle {
    fn drop(&mut self) {
        self.scheduler.free_alarm(self.id);
    }
}

impl fmt::Debug for Alarm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Alarm")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("is_periodic", &self.is_periodic)
            .finish()
    }
}

impl Alarm {
    /// Creates a new one-shot alarm, unscheduled until [`Alarm::set`] is
    /// called.
    pub fn new(scheduler: &Scheduler, name: impl Into<String>) -> Alarm {
        scheduler.new_alarm(name.into(), false)
    }

    /// Creates a new periodic alarm, unscheduled until [`Alarm::set`] is
    /// called.
    pub fn new_periodic(scheduler: &Scheduler, name: impl Into<String>) -> Alarm {
        scheduler.new_alarm(name.into(), true)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_periodic(&self) -> bool {
        self.is_periodic
    }

    /// Schedules the alarm to fire after `interval_ms` on the default
    /// processing queue.
    pub fn set<F>(&self, interval_ms: u64, data: AlarmData, callback: F)
    where
        F: Fn(AlarmData) + Send + Sync + 'static,
    {
        let queue = self.scheduler.default_queue_name().to_string();
        self.set_on_queue(interval_ms, data, callback, &queue);
    }

    /// Schedules the alarm to fire after `interval_ms` on a caller-chosen
    /// processing queue.
    pub fn set_on_queue<F>(&self, interval_ms: u64, data: AlarmData, callback: F, queue: &str)
    where
        F: Fn(AlarmData) + Send + Sync + 'static,
    {
        self.scheduler
            .set_alarm(self.id, interval_ms, Arc::new(callback), data, queue);
    }

    /// Cancels the alarm. Synchronous with respect to any in-flight
    /// callback for this alarm: returns only after that callback, if any,
    /// has completed.
    pub fn cancel(&self) {
        self.scheduler.cancel_alarm(self.id);
    }

    /// True iff the alarm currently has a callback registered and will
    /// fire at its deadline.
    pub fn is_scheduled(&self) -> bool {
        self.scheduler.is_alarm_scheduled(self.id)
    }

    /// Milliseconds remaining until the alarm's next scheduled deadline.
    pub fn remaining_ms(&self) -> u64 {
        self.scheduler.alarm_remaining_ms(self.id)
    }

    /// Snapshot of this alarm's lifetime counters (C8).
    pub fn stats(&self) -> AlarmStats {
        self.scheduler.alarm_stats(self.id)
    }
}
