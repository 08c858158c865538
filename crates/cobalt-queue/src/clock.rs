//! # Task Clock
//!
//! Per-queue logical clock. The task level orders enqueued work; the task
//! count tracks the receiver's submission and completion values.
//!
//! ```text
//! staged enqueue        level = max(queue, waits) + 1, count = submission
//! no-op / zero-copy     level = max(queue, waits)
//! blocking wait         count = max(count, completed), level untouched
//! ```
//!
//! The level never decreases. These two operations are the only mutators.

/// Logical clock state of one queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskClock {
    task_level: u32,
    task_count: u32,
}

impl TaskClock {
    /// Clock of a fresh queue
    pub const fn new() -> Self {
        Self {
            task_level: 0,
            task_count: 0,
        }
    }

    /// Current task level
    #[inline]
    pub fn task_level(&self) -> u32 {
        self.task_level
    }

    /// Last submission or completion value observed
    #[inline]
    pub fn task_count(&self) -> u32 {
        self.task_count
    }

    /// Merge the wait list and stamp an enqueue
    ///
    /// `submission` is the task count of the batch this enqueue submitted,
    /// or `None` when nothing was submitted. Returns the level the
    /// enqueue's event carries.
    pub fn advance_on_enqueue(&mut self, wait_level: Option<u32>, submission: Option<u32>) -> u32 {
        let merged = wait_level.map_or(self.task_level, |level| level.max(self.task_level));
        match submission {
            Some(task_count) => {
                self.task_level = merged + 1;
                self.task_count = task_count;
            }
            None => self.task_level = merged,
        }
        self.task_level
    }

    /// Record the receiver's completed count after a wait
    pub fn sync_on_wait(&mut self, completed: u32) {
        self.task_count = self.task_count.max(completed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staged_increments_over_merge() {
        let mut clock = TaskClock::new();
        assert_eq!(clock.advance_on_enqueue(None, Some(1)), 1);
        assert_eq!(clock.advance_on_enqueue(None, Some(2)), 2);
        assert_eq!(clock.task_count(), 2);
    }

    #[test]
    fn test_wait_list_merge() {
        let mut clock = TaskClock::new();
        clock.advance_on_enqueue(Some(17), None);
        assert_eq!(clock.task_level(), 17);

        let mut staged = clock;
        assert_eq!(staged.advance_on_enqueue(Some(19), Some(4)), 20);
        assert_eq!(staged.task_level(), 20);

        let mut zero_copy = clock;
        assert_eq!(zero_copy.advance_on_enqueue(Some(19), None), 19);
        assert_eq!(zero_copy.task_count(), 0);
    }

    #[test]
    fn test_lower_waits_do_not_regress() {
        let mut clock = TaskClock::new();
        clock.advance_on_enqueue(Some(10), None);
        assert_eq!(clock.advance_on_enqueue(Some(3), None), 10);
        assert_eq!(clock.advance_on_enqueue(Some(3), Some(1)), 11);
    }

    #[test]
    fn test_sync_on_wait() {
        let mut clock = TaskClock::new();
        clock.advance_on_enqueue(None, Some(5));
        clock.sync_on_wait(3);
        assert_eq!(clock.task_count(), 5);
        clock.sync_on_wait(9);
        assert_eq!(clock.task_count(), 9);
        assert_eq!(clock.task_level(), 1);
    }
}
