use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashMap},
};

use crate::types::Tick;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(u32);

#[derive(Debug)]
struct Entry<T> {
    task: T,
    /// `None` while parked: fired and not yet re-armed.
    due: Option<Tick>,
    seq: u64,
}

/// Single-threaded timer queue.
///
/// Tasks come out in non-decreasing due order, FIFO among equal ticks. A task
/// that fires stays registered but parked; it fires again only after
/// `reschedule`, and `unregister` drops it for good. Heap slots made stale by
/// reschedule/unregister are skipped lazily.
#[derive(Debug)]
pub struct Scheduler<T> {
    queue: BinaryHeap<Reverse<(Tick, u64, TaskHandle)>>,
    entries: HashMap<TaskHandle, Entry<T>>,
    next_handle: u32,
    next_seq: u64,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self {
            queue: BinaryHeap::new(),
            entries: HashMap::new(),
            next_handle: 1,
            next_seq: 0,
        }
    }
}

impl<T: Clone> Scheduler<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, task: T, delay_ms: u64, now: Tick) -> TaskHandle {
        let handle = TaskHandle(self.next_handle);
        self.next_handle = self.next_handle.wrapping_add(1).max(1);

        self.entries.insert(
            handle,
            Entry {
                task,
                due: None,
                seq: 0,
            },
        );
        self.arm(handle, now.saturating_add(delay_ms));
        handle
    }

    pub fn unregister(&mut self, handle: TaskHandle) -> bool {
        self.entries.remove(&handle).is_some()
    }

    /// Re-arms a registered task (pending or parked) relative to `now`.
    pub fn reschedule(&mut self, handle: TaskHandle, delay_ms: u64, now: Tick) -> bool {
        if !self.entries.contains_key(&handle) {
            return false;
        }
        self.arm(handle, now.saturating_add(delay_ms));
        true
    }

    #[cfg(test)]
    fn is_registered(&self, handle: TaskHandle) -> bool {
        self.entries.contains_key(&handle)
    }

    #[cfg(test)]
    fn due_at(&self, handle: TaskHandle) -> Option<Tick> {
        self.entries.get(&handle).and_then(|entry| entry.due)
    }

    pub fn next_due(&mut self) -> Option<Tick> {
        self.drop_stale();
        self.queue.peek().map(|Reverse((due, _, _))| *due)
    }

    /// Takes the earliest task due at or before `now` and parks it.
    pub fn pop_due(&mut self, now: Tick) -> Option<(TaskHandle, T)> {
        self.drop_stale();

        let Reverse((due, _, handle)) = *self.queue.peek()?;
        if due > now {
            return None;
        }
        self.queue.pop();

        let entry = self.entries.get_mut(&handle)?;
        entry.due = None;
        Some((handle, entry.task.clone()))
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn arm(&mut self, handle: TaskHandle, due: Tick) {
        let seq = self.next_seq;
        self.next_seq += 1;

        if let Some(entry) = self.entries.get_mut(&handle) {
            entry.due = Some(due);
            entry.seq = seq;
            self.queue.push(Reverse((due, seq, handle)));
        }
    }

    fn drop_stale(&mut self) {
        while let Some(Reverse((due, seq, handle))) = self.queue.peek().copied() {
            let live = self
                .entries
                .get(&handle)
                .map(|entry| entry.due == Some(due) && entry.seq == seq)
                .unwrap_or(false);
            if live {
                break;
            }
            self.queue.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn drain(scheduler: &mut Scheduler<&'static str>, now: Tick) -> Vec<&'static str> {
        let mut fired = Vec::new();
        while let Some((_, task)) = scheduler.pop_due(now) {
            fired.push(task);
        }
        fired
    }

    #[test]
    fn fires_in_due_order_then_fifo() {
        let mut scheduler = Scheduler::new();
        scheduler.register("late", 300, 0);
        scheduler.register("first", 100, 0);
        scheduler.register("second", 100, 0);

        assert_eq!(scheduler.next_due(), Some(100));
        assert!(drain(&mut scheduler, 99).is_empty());
        assert_eq!(drain(&mut scheduler, 100), vec!["first", "second"]);
        assert_eq!(drain(&mut scheduler, 1_000), vec!["late"]);
    }

    #[test]
    fn fired_task_is_parked_until_rescheduled() {
        let mut scheduler = Scheduler::new();
        let handle = scheduler.register("step", 50, 0);

        assert_eq!(drain(&mut scheduler, 50), vec!["step"]);
        assert!(scheduler.is_registered(handle));
        assert_eq!(scheduler.next_due(), None);

        assert!(scheduler.reschedule(handle, 60, 50));
        assert!(drain(&mut scheduler, 109).is_empty());
        assert_eq!(drain(&mut scheduler, 110), vec!["step"]);
    }

    #[test]
    fn unregister_cancels_pending_and_parked_tasks() {
        let mut scheduler = Scheduler::new();
        let pending = scheduler.register("pending", 100, 0);
        let parked = scheduler.register("parked", 0, 0);
        assert_eq!(drain(&mut scheduler, 0), vec!["parked"]);

        assert!(scheduler.unregister(pending));
        assert!(scheduler.unregister(parked));
        assert!(!scheduler.reschedule(parked, 10, 0));
        assert!(!scheduler.unregister(parked));

        assert!(drain(&mut scheduler, 10_000).is_empty());
        assert!(scheduler.is_empty());
    }

    #[test]
    fn reschedule_replaces_previous_due_time() {
        let mut scheduler = Scheduler::new();
        let handle = scheduler.register("sample", 1_000, 0);

        scheduler.reschedule(handle, 5_000, 500);

        assert_eq!(scheduler.due_at(handle), Some(5_500));
        assert!(drain(&mut scheduler, 1_000).is_empty());
        assert_eq!(drain(&mut scheduler, 5_500), vec!["sample"]);
        assert!(drain(&mut scheduler, 20_000).is_empty());
    }
}
