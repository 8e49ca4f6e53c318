//! Deadline-driven alarm scheduler.
//!
//! A single background dispatcher maintains one ordered deadline set and
//! arms exactly one OS-level expiration source for the earliest deadline in
//! it; every due alarm is handed off to a caller-chosen processing queue so
//! the dispatcher itself is never blocked by user callback code.
//! Start here: [`Scheduler`] owns the monitor and the background threads,
//! [`Alarm`] is the handle you schedule and cancel.
//!
//! ```no_run
//! use alarm_scheduler::{Alarm, Scheduler};
//! use std::sync::Arc;
//!
//! let scheduler = Scheduler::new(Default::default()).expect("init");
//! let alarm = Alarm::new(&scheduler, "retry-timer");
//! alarm.set(500, Arc::new(()), |_data| {
//!     println!("fired");
//! });
//! ```

mod alarm;
mod clock;
mod config;
mod deadline_set;
mod dispatcher;
mod error;
mod queue;
mod scheduler;
mod signal;
mod stats;
mod timer;

pub use alarm::{Alarm, AlarmCallback, AlarmData, AlarmId};
pub use clock::{Clock, MonotonicClock};
pub use config::{SchedulerConfig, DEFAULT_WAKELOCK_THRESHOLD_MS};
pub use error::{AlarmError, Result};
pub use scheduler::Scheduler;
pub use stats::{AlarmStats, DurationStat};
pub use timer::{OsCallouts, WAKE_LOCK_ID};
