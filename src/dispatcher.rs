//! Dispatcher worker (C5) and the queue-ready handler.
//!
//! Two distinct loops live here. [`run`] is the single dispatcher thread
//! every [`crate::scheduler::Scheduler`] spawns at construction: it wakes on
//! the expiration signal (C4), pops whatever is due from the deadline set
//! under the monitor, and hands each due alarm to its processing queue.
//! [`queue_ready`] is not a loop — it's the callback every
//! [`crate::queue::ProcessingQueue`] worker thread runs for each id it
//! dequeues, invoking the user's callback outside the monitor lock.

use crate::alarm::AlarmId;
use crate::scheduler::Scheduler;
use std::sync::atomic::Ordering;

/// The dispatcher loop. Runs on its own thread for the lifetime of
/// the scheduler; exits once `cleanup` posts the signal with
/// `shutting_down` set.
pub(crate) fn run(scheduler: Scheduler) {
    loop {
        scheduler.0.signal.wait();
        if scheduler.0.shutting_down.load(Ordering::SeqCst) {
            return;
        }

        let mut monitor = scheduler.0.monitor.lock();
        let now = scheduler.0.clock.now_ms();

        let ready = match monitor.deadline_set.peek_front() {
            Some((deadline_ms, _)) => deadline_ms <= now,
            None => false,
        };

        if !ready {
            // Spurious wakeup, or the front moved out from under us (e.g. a
            // concurrent cancel already rearmed); just make sure the timer
            // reflects the current front and go back to waiting.
            scheduler.rearm_from_front(&monitor);
            continue;
        }

        let (_, id) = monitor
            .deadline_set
            .pop_front()
            .expect("front checked ready immediately above");

        let is_periodic = monitor
            .records
            .get(&id)
            .map(|record| record.is_periodic)
            .unwrap_or(false);

        if is_periodic {
            if let Some(record) = monitor.records.get_mut(&id) {
                record.prev_deadline_ms = record.deadline_ms;
            }
            monitor.schedule_next_instance(id, now);
            if let Some(record) = monitor.records.get_mut(&id) {
                record.stats.rescheduled_count += 1;
            }
        }

        // Rearm before releasing the monitor: the OS timer's armed state
        // is monitor-protected, same as the deadline set it mirrors.
        scheduler.rearm_from_front(&monitor);

        let queue_name = monitor.records.get(&id).and_then(|r| r.queue.clone());
        if let Some(queue_name) = queue_name {
            let already_pending = monitor
                .records
                .get(&id)
                .map(|r| r.pending_in_queue)
                .unwrap_or(true);
            if !already_pending {
                if let Some(queue) = monitor.queues.get(&queue_name) {
                    if let Some(record) = monitor.records.get_mut(&id) {
                        record.pending_in_queue = true;
                    }
                    queue.enqueue(id);
                }
            } else {
                tracing::trace!(?id, "alarm already pending in its queue, skipping duplicate enqueue");
            }
        }
    }
}

/// The queue-ready handler: runs on a processing-queue worker
/// thread, outside the dispatcher thread and outside the monitor lock
/// during the callback invocation itself.
pub(crate) fn queue_ready(scheduler: &Scheduler, id: AlarmId) {
    let snapshot = {
        let mut monitor = scheduler.0.monitor.lock();
        let record = match monitor.records.get_mut(&id) {
            Some(record) => record,
            // Freed between enqueue and now; nothing left to do.
            None => return,
        };
        record.pending_in_queue = false;

        let callback = match record.callback.clone() {
            Some(callback) => callback,
            // Cancelled between enqueue and now.
            None => return,
        };
        let data = record
            .data
            .clone()
            .expect("callback is set so its paired data must be too");

        let effective_deadline_ms = if record.is_periodic {
            record.prev_deadline_ms
        } else {
            let deadline_ms = record.deadline_ms;
            record.deadline_ms = 0;
            record.callback = None;
            record.data = None;
            record.queue = None;
            deadline_ms
        };

        let guard = record.callback_guard.clone();
        (callback, data, effective_deadline_ms, guard)
    };

    let (callback, data, effective_deadline_ms, guard) = snapshot;

    let token = guard.enter();
    let t0 = scheduler.0.clock.now_ms();
    callback(data);
    let t1 = scheduler.0.clock.now_ms();
    drop(token);

    let mut monitor = scheduler.0.monitor.lock();
    if let Some(record) = monitor.records.get_mut(&id) {
        record.stats.record_dispatch(effective_deadline_ms, t0, t0, t1);
    }
}
