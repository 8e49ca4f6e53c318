//! Ordered deadline set (C2).
//!
//! Alarms sorted ascending by `deadline_ms`, earliest first. Expected
//! populations are small (tens), so a sorted `Vec` with O(n) insert is
//! sufficient — upgrading to a binary heap plus a back-pointer for O(log n)
//! cancel is left as a documented path, not implemented here. Always
//! accessed under the scheduler's monitor lock; this type itself holds no
//! lock.

use crate::alarm::AlarmId;

#[derive(Default)]
pub(crate) struct DeadlineSet {
    /// Sorted ascending by `.0` (deadline_ms). Ties broken by insertion
    /// order, which is arbitrary and acceptable since stable ordering
    /// across equal deadlines is not required.
    entries: Vec<(u64, AlarmId)>,
}

impl DeadlineSet {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Earliest-deadline alarm, if any.
    pub fn peek_front(&self) -> Option<(u64, AlarmId)> {
        self.entries.first().copied()
    }

    /// Inserts `id` at `deadline_ms`, keeping the set sorted. `id` must not
    /// already be present (callers remove-then-insert to reschedule).
    pub fn insert(&mut self, deadline_ms: u64, id: AlarmId) {
        let pos = self
            .entries
            .partition_point(|(deadline, _)| *deadline <= deadline_ms);
        self.entries.insert(pos, (deadline_ms, id));
    }

    /// Removes `id` by identity, wherever it sits in the ordering. No-op if
    /// absent (idempotent, matching `alarm_cancel`'s tolerance for an
    /// already-unscheduled alarm).
    pub fn remove(&mut self, id: AlarmId) -> bool {
        if let Some(pos) = self.entries.iter().position(|(_, entry_id)| *entry_id == id) {
            self.entries.remove(pos);
            true
        } else {
            false
        }
    }

    /// True iff `id` sits at the front of the set — used to decide whether
    /// a mutation requires rearming the OS timer.
    pub fn is_front(&self, id: AlarmId) -> bool {
        matches!(self.entries.first(), Some((_, front_id)) if *front_id == id)
    }

    /// Removes and returns the front entry, if any.
    pub fn pop_front(&mut self) -> Option<(u64, AlarmId)> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.entries.remove(0))
        }
    }
}
