//! Processing queues (C6): per-queue FIFO delivery bound to exactly one
//! worker thread.
//!
//! A [`ProcessingQueue`] is a thin handle around a `crossbeam_channel`
//! sender; the receiver lives on a dedicated worker thread spawned at
//! registration time, running the queue-ready handler for every alarm id
//! the dispatcher enqueues. `unregister` stops that thread after the
//! scheduler has cancelled every alarm still bound to the queue (enforced
//! by the caller in `scheduler.rs`).

use crate::alarm::AlarmId;
use crossbeam_channel::{unbounded, Sender};
use std::thread::JoinHandle;

pub(crate) enum QueueMessage {
    Ready(AlarmId),
    Shutdown,
}

pub(crate) struct ProcessingQueue {
    name: String,
    sender: Sender<QueueMessage>,
    worker: Option<JoinHandle<()>>,
}

impl ProcessingQueue {
    /// Spawns the worker thread and wires it to invoke `on_ready` for every
    /// alarm id enqueued, in arrival order. `on_ready` is the queue-ready
    /// handler, provided by the scheduler so this module stays ignorant of
    /// alarm internals.
    pub fn register<F>(name: impl Into<String>, on_ready: F) -> Self
    where
        F: Fn(AlarmId) + Send + 'static,
    {
        let name = name.into();
        let (sender, receiver) = unbounded::<QueueMessage>();
        let thread_name = format!("alarm-queue-{name}");
        let worker = std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                for msg in receiver {
                    match msg {
                        QueueMessage::Ready(id) => on_ready(id),
                        QueueMessage::Shutdown => break,
                    }
                }
            })
            .expect("failed to spawn processing queue worker");

        Self {
            name,
            sender,
            worker: Some(worker),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueues `id` for processing by this queue's worker; the worker is
    /// signaled as soon as the item arrives.
    pub fn enqueue(&self, id: AlarmId) {
        // The worker only ever exits on Shutdown, which is only sent from
        // `stop`, which consumes this queue — so the channel is never
        // disconnected while a caller can still reach `enqueue`.
        let _ = self.sender.send(QueueMessage::Ready(id));
    }

    /// Stops the worker thread and joins it. Called once every alarm bound
    /// to this queue has been cancelled.
    pub fn stop(mut self) {
        let _ = self.sender.send(QueueMessage::Shutdown);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ProcessingQueue {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.take() {
            let _ = self.sender.send(QueueMessage::Shutdown);
            let _ = handle.join();
        }
    }
}
