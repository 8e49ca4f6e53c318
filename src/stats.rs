//! Per-alarm statistics (C8).
//!
//! All fields here are written only from the queue-ready handler running on
//! the alarm's own processing-queue worker; readers take the scheduler's
//! monitor lock, same as every other alarm field. There is no separate lock
//! for stats — they live inside the alarm record under the same
//! `parking_lot::Mutex`.

/// Running count/total/max over a duration-valued series, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DurationStat {
    pub count: u64,
    pub total_ms: u64,
    pub max_ms: u64,
}

impl DurationStat {
    pub fn record(&mut self, delta_ms: u64) {
        self.count += 1;
        self.total_ms += delta_ms;
        if delta_ms > self.max_ms {
            self.max_ms = delta_ms;
        }
    }

    pub fn mean_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_ms as f64 / self.count as f64
        }
    }
}

/// Snapshot of an alarm's lifetime counters, returned by
/// [`crate::alarm::Alarm::stats`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AlarmStats {
    pub scheduled_count: u64,
    pub canceled_count: u64,
    pub rescheduled_count: u64,
    pub total_updates: u64,
    pub callback_execution: DurationStat,
    pub overdue_scheduling: DurationStat,
    pub premature_scheduling: DurationStat,
}

impl AlarmStats {
    /// Called from the queue-ready handler once a callback returns: `t0`/`t1`
    /// bracket the callback invocation, `deadline_ms` is the effective
    /// deadline snapshotted before the callback ran.
    pub fn record_dispatch(&mut self, deadline_ms: u64, dispatch_ms: u64, t0_ms: u64, t1_ms: u64) {
        self.total_updates += 1;
        let exec = t1_ms.saturating_sub(t0_ms);
        self.callback_execution.record(exec);

        if dispatch_ms > deadline_ms {
            self.overdue_scheduling.record(dispatch_ms - deadline_ms);
        } else if deadline_ms > dispatch_ms {
            self.premature_scheduling.record(deadline_ms - dispatch_ms);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_stat_tracks_count_total_and_max() {
        let mut s = DurationStat::default();
        s.record(10);
        s.record(30);
        s.record(5);
        assert_eq!(s.count, 3);
        assert_eq!(s.total_ms, 45);
        assert_eq!(s.max_ms, 30);
        assert!((s.mean_ms() - 15.0).abs() < f64::EPSILON);
    }

    #[test]
    fn record_dispatch_classifies_overdue_vs_premature() {
        let mut stats = AlarmStats::default();
        // dispatched 20ms after deadline: overdue
        stats.record_dispatch(/* deadline */ 1000, /* dispatch */ 1020, 1020, 1025);
        assert_eq!(stats.overdue_scheduling.count, 1);
        assert_eq!(stats.overdue_scheduling.total_ms, 20);
        assert_eq!(stats.premature_scheduling.count, 0);

        // dispatched 5ms before deadline: premature
        stats.record_dispatch(2000, 1995, 1995, 1996);
        assert_eq!(stats.premature_scheduling.count, 1);
        assert_eq!(stats.premature_scheduling.total_ms, 5);

        assert_eq!(stats.callback_execution.count, 2);
    }
}
