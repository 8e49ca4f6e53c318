//! Initialization, teardown, and the monitor (C9).
//!
//! [`Scheduler`] is a single owned value: one [`SchedulerInner`],
//! reference-counted, holding the deadline set, every alarm record, the
//! processing-queue registry, and the expiration timer, all behind one
//! `parking_lot::Mutex` — the single coarse-grained monitor lock that
//! serializes every mutation of scheduling state. [`Scheduler::global`]
//! additionally exposes a lazily-initialized process-wide singleton, for
//! callers that want that convenience instead of threading a `Scheduler`
//! value through their own code.

use crate::alarm::{Alarm, AlarmCallback, AlarmData, AlarmGuardHandle, AlarmId, AlarmRecord};
use crate::config::SchedulerConfig;
use crate::deadline_set::DeadlineSet;
use crate::dispatcher;
use crate::clock::{Clock, MonotonicClock};
use crate::error::{AlarmError, Result};
use crate::queue::ProcessingQueue;
use crate::signal::ExpirationSignal;
use crate::stats::AlarmStats;
use crate::timer::{DefaultOsCallouts, ExpirationTimer, OsCallouts};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;

pub(crate) const DEFAULT_QUEUE_NAME: &str = "default";

/// Everything the monitor lock protects: the ordered deadline set (C2),
/// every alarm's mutable state, and the processing-queue registry (C6).
pub(crate) struct Monitor {
    pub records: HashMap<AlarmId, AlarmRecord>,
    pub deadline_set: DeadlineSet,
    pub queues: HashMap<String, ProcessingQueue>,
}

impl Monitor {
    fn new() -> Self {
        Self {
            records: HashMap::new(),
            deadline_set: DeadlineSet::new(),
            queues: HashMap::new(),
        }
    }

    /// Recomputes `id`'s next deadline, anchored to its creation time so
    /// periodic callbacks never drift from callback execution time, and
    /// reinserts it into the deadline set. Returns whether the caller
    /// should rearm the timer from the new front (true if `id` was the
    /// front before or after this call).
    pub fn schedule_next_instance(&mut self, id: AlarmId, now_ms: u64) -> bool {
        let was_front = self.deadline_set.is_front(id);
        self.deadline_set.remove(id);

        let record = self
            .records
            .get_mut(&id)
            .expect("schedule_next_instance called for unknown alarm id");

        let ms_into_period = if record.is_periodic && record.period_ms != 0 {
            now_ms.saturating_sub(record.creation_time_ms) % record.period_ms
        } else {
            0
        };
        let deadline_ms = now_ms + record.period_ms.saturating_sub(ms_into_period);
        record.deadline_ms = deadline_ms;
        self.deadline_set.insert(deadline_ms, id);

        was_front || self.deadline_set.is_front(id)
    }
}

pub(crate) struct SchedulerInner {
    pub clock: Arc<dyn Clock>,
    pub signal: Arc<ExpirationSignal>,
    pub timer: ExpirationTimer,
    pub monitor: Mutex<Monitor>,
    pub shutting_down: AtomicBool,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    default_queue_name: String,
}

/// The scheduling engine's single owned handle. Cheap to clone (an `Arc`
/// underneath); every clone refers to the same monitor, deadline set, and
/// dispatcher/worker threads.
#[derive(Clone)]
pub struct Scheduler(pub(crate) Arc<SchedulerInner>);

static GLOBAL: OnceLock<Scheduler> = OnceLock::new();

impl Scheduler {
    /// Builds a scheduler using [`DefaultOsCallouts`] — suitable for tests
    /// and for hosts that don't need the wake alarm to survive system
    /// suspend.
    pub fn new(config: SchedulerConfig) -> Result<Scheduler> {
        Self::with_os_callouts(config, Arc::new(DefaultOsCallouts))
    }

    /// Builds a scheduler with a caller-supplied [`OsCallouts`] — the seam
    /// for embedding this crate in a host that has a real suspend-surviving
    /// wake alarm and wake lock.
    pub fn with_os_callouts(config: SchedulerConfig, callouts: Arc<dyn OsCallouts>) -> Result<Scheduler> {
        let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
        let signal = Arc::new(ExpirationSignal::new());
        let timer = ExpirationTimer::new(clock.clone(), signal.clone(), callouts, &config);

        let inner = Arc::new(SchedulerInner {
            clock,
            signal,
            timer,
            monitor: Mutex::new(Monitor::new()),
            shutting_down: AtomicBool::new(false),
            dispatcher: Mutex::new(None),
            default_queue_name: DEFAULT_QUEUE_NAME.to_string(),
        });

        let scheduler = Scheduler(inner);
        scheduler.register_processing_queue(DEFAULT_QUEUE_NAME)?;

        let dispatcher_scheduler = scheduler.clone();
        let handle = std::thread::Builder::new()
            .name("alarm-dispatcher".into())
            .spawn(move || dispatcher::run(dispatcher_scheduler))
            .map_err(|e| AlarmError::Init {
                reason: format!("unable to start dispatcher thread: {e}"),
            })?;
        *scheduler.0.dispatcher.lock() = Some(handle);

        Ok(scheduler)
    }

    /// The process-wide singleton, lazily initialized with default
    /// configuration on first access.
    pub fn global() -> &'static Scheduler {
        GLOBAL.get_or_init(|| {
            Scheduler::new(SchedulerConfig::default())
                .expect("failed to lazily initialize the global alarm scheduler")
        })
    }

    pub fn default_queue_name(&self) -> &str {
        &self.0.default_queue_name
    }

    /// Registers a new named processing queue with its own dedicated
    /// worker thread.
    pub fn register_processing_queue(&self, name: &str) -> Result<()> {
        let mut monitor = self.0.monitor.lock();
        if monitor.queues.contains_key(name) {
            return Err(AlarmError::Misuse {
                reason: format!("processing queue '{name}' is already registered"),
            });
        }
        let scheduler = self.clone();
        let queue = ProcessingQueue::register(name, move |id| dispatcher::queue_ready(&scheduler, id));
        monitor.queues.insert(name.to_string(), queue);
        Ok(())
    }

    /// Unregisters a processing queue, cancelling every alarm still bound
    /// to `name` before the queue stops being served.
    pub fn unregister_processing_queue(&self, name: &str) -> Result<()> {
        let bound_ids: Vec<AlarmId> = {
            let monitor = self.0.monitor.lock();
            monitor
                .records
                .iter()
                .filter(|(_, record)| record.queue.as_deref() == Some(name))
                .map(|(id, _)| *id)
                .collect()
        };
        for id in bound_ids {
            self.cancel_alarm(id);
        }

        let queue = {
            let mut monitor = self.0.monitor.lock();
            monitor.queues.remove(name).ok_or_else(|| AlarmError::Misuse {
                reason: format!("processing queue '{name}' is not registered"),
            })?
        };
        queue.stop();
        Ok(())
    }

    /// Shuts the scheduler down: stops the dispatcher, disarms the timer,
    /// and stops every processing queue worker. Idempotent: a second call
    /// is a no-op.
    pub fn cleanup(&self) {
        if self.0.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }

        self.0.signal.post();
        if let Some(handle) = self.0.dispatcher.lock().take() {
            let _ = handle.join();
        }
        self.0.timer.shutdown();

        let queues: Vec<ProcessingQueue> = {
            let mut monitor = self.0.monitor.lock();
            monitor.queues.drain().map(|(_, q)| q).collect()
        };
        for queue in queues {
            queue.stop();
        }
    }

    pub(crate) fn new_alarm(&self, name: String, is_periodic: bool) -> Alarm {
        let id = AlarmId::next();
        let name: Arc<str> = Arc::from(name);
        let record = AlarmRecord::new(name.clone(), is_periodic);

        self.0.monitor.lock().records.insert(id, record);

        Alarm {
            id,
            name,
            is_periodic,
            scheduler: self.clone(),
            inner: Arc::new(AlarmGuardHandle {
                id,
                scheduler: self.clone(),
            }),
        }
    }

    pub(crate) fn set_alarm(
        &self,
        id: AlarmId,
        interval_ms: u64,
        callback: AlarmCallback,
        data: AlarmData,
        queue: &str,
    ) {
        let now = self.0.clock.now_ms();
        let mut monitor = self.0.monitor.lock();

        if !monitor.queues.contains_key(queue) {
            debug_assert!(
                false,
                "alarm_set_on_queue: processing queue '{queue}' is not registered"
            );
            tracing::error!(queue, "alarm_set_on_queue: queue not registered, ignoring set");
            return;
        }

        {
            let record = monitor
                .records
                .get_mut(&id)
                .expect("set_alarm called for unknown alarm id");
            record.creation_time_ms = now;
            record.period_ms = interval_ms;
            record.queue = Some(queue.to_string());
            record.callback = Some(callback);
            record.data = Some(data);
            record.stats.scheduled_count += 1;
        }

        let needs_rearm = monitor.schedule_next_instance(id, now);
        if needs_rearm {
            self.rearm_from_front(&monitor);
        }
    }

    pub(crate) fn cancel_alarm(&self, id: AlarmId) {
        let guard = {
            let mut monitor = self.0.monitor.lock();
            let was_front = monitor.deadline_set.is_front(id);
            monitor.deadline_set.remove(id);

            let guard = monitor.records.get_mut(&id).map(|record| {
                record.deadline_ms = 0;
                record.prev_deadline_ms = 0;
                record.callback = None;
                record.data = None;
                record.queue = None;
                record.stats.canceled_count += 1;
                record.callback_guard.clone()
            });

            if was_front {
                self.rearm_from_front(&monitor);
            }
            guard
        };

        // Outside the monitor lock: the cancel barrier. Blocks until any
        // in-flight callback for this alarm has completed.
        if let Some(guard) = guard {
            guard.barrier();
        }
    }

    pub(crate) fn free_alarm(&self, id: AlarmId) {
        self.cancel_alarm(id);
        self.0.monitor.lock().records.remove(&id);
    }

    pub(crate) fn is_alarm_scheduled(&self, id: AlarmId) -> bool {
        self.0
            .monitor
            .lock()
            .records
            .get(&id)
            .map(AlarmRecord::is_scheduled)
            .unwrap_or(false)
    }

    pub(crate) fn alarm_remaining_ms(&self, id: AlarmId) -> u64 {
        let now = self.0.clock.now_ms();
        self.0
            .monitor
            .lock()
            .records
            .get(&id)
            .map(|record| record.deadline_ms.saturating_sub(now))
            .unwrap_or(0)
    }

    pub(crate) fn alarm_stats(&self, id: AlarmId) -> AlarmStats {
        self.0
            .monitor
            .lock()
            .records
            .get(&id)
            .map(|record| record.stats)
            .unwrap_or_default()
    }

    /// Rearms the OS timer from the current front of the deadline set,
    /// or disarms it when the set is empty. Called with the monitor
    /// already locked.
    pub(crate) fn rearm_from_front(&self, monitor: &Monitor) {
        match monitor.deadline_set.peek_front() {
            Some((deadline_ms, _)) => self.0.timer.arm_absolute(deadline_ms),
            None => self.0.timer.disarm(),
        }
    }
}
