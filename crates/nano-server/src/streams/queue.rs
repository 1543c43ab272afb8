//! Byte-accounted FIFO queue shared by the readable and writable cores.
//!
//! Every entry carries the size computed for it when it was queued, and the
//! queue keeps a running total so that `byte_size()` is always the sum of the
//! sizes of the entries currently held. Entries leave only through
//! [`SizedQueue::pop_front`] or [`SizedQueue::drain`], both of which keep the
//! total exact.

use boa_gc::{Finalize, Trace};
use std::collections::VecDeque;

#[derive(Debug, Trace, Finalize)]
#[boa_gc(unsafe_no_drop)]
struct QueueEntry<T: Trace + 'static> {
    value: T,
    size: usize,
}

#[derive(Debug, Trace, Finalize)]
pub(crate) struct SizedQueue<T: Trace + 'static> {
    entries: VecDeque<QueueEntry<T>>,
    byte_size: usize,
}

impl<T: Trace + 'static> SizedQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            byte_size: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of the sizes of all queued entries.
    pub(crate) fn byte_size(&self) -> usize {
        self.byte_size
    }

    /// Whether queueing `size` more bytes would push the total past `max`.
    pub(crate) fn would_exceed(&self, size: usize, max: usize) -> bool {
        self.byte_size.checked_add(size).is_none_or(|total| total > max)
    }

    pub(crate) fn push(&mut self, value: T, size: usize) {
        self.byte_size += size;
        self.entries.push_back(QueueEntry { value, size });
    }

    pub(crate) fn front(&self) -> Option<&T> {
        self.entries.front().map(|entry| &entry.value)
    }

    pub(crate) fn pop_front(&mut self) -> Option<T> {
        let entry = self.entries.pop_front()?;
        self.byte_size -= entry.size;
        Some(entry.value)
    }

    /// Removes every entry, leaving the queue empty with a zero byte size.
    pub(crate) fn drain(&mut self) -> Vec<T> {
        self.byte_size = 0;
        self.entries.drain(..).map(|entry| entry.value).collect()
    }

    /// Recomputes the total from the entries. Used by invariant checks.
    #[cfg(test)]
    pub(crate) fn recomputed_byte_size(&self) -> usize {
        self.entries.iter().map(|entry| entry.size).sum()
    }
}

impl<T: Trace + 'static> Default for SizedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_accounting<T: Trace + 'static>(queue: &SizedQueue<T>) {
        assert_eq!(queue.byte_size(), queue.recomputed_byte_size());
    }

    #[test]
    fn test_new_queue_is_empty() {
        let queue: SizedQueue<String> = SizedQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.byte_size(), 0);
        assert!(queue.front().is_none());
    }

    #[test]
    fn test_push_and_pop_preserve_order() {
        let mut queue = SizedQueue::new();
        queue.push("a".to_string(), 1);
        queue.push("bb".to_string(), 2);
        queue.push("ccc".to_string(), 3);
        assert_accounting(&queue);
        assert_eq!(queue.byte_size(), 6);
        assert_eq!(queue.front().map(String::as_str), Some("a"));

        assert_eq!(queue.pop_front().as_deref(), Some("a"));
        assert_accounting(&queue);
        assert_eq!(queue.byte_size(), 5);

        assert_eq!(queue.pop_front().as_deref(), Some("bb"));
        assert_eq!(queue.pop_front().as_deref(), Some("ccc"));
        assert_eq!(queue.pop_front(), None);
        assert_eq!(queue.byte_size(), 0);
    }

    #[test]
    fn test_would_exceed_is_strictly_greater() {
        let mut queue = SizedQueue::new();
        queue.push(0u8, 6);
        assert!(!queue.would_exceed(4, 10));
        assert!(queue.would_exceed(5, 10));
    }

    #[test]
    fn test_would_exceed_does_not_overflow() {
        let mut queue = SizedQueue::new();
        queue.push(0u8, usize::MAX - 1);
        assert!(queue.would_exceed(usize::MAX, usize::MAX));
    }

    #[test]
    fn test_drain_resets_accounting() {
        let mut queue = SizedQueue::new();
        for i in 0..5u32 {
            queue.push(i, i as usize * 10);
        }
        let drained = queue.drain();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
        assert_eq!(queue.byte_size(), 0);
        assert_accounting(&queue);
    }

    #[test]
    fn test_zero_sized_entries_still_count_as_items() {
        let mut queue = SizedQueue::new();
        queue.push((), 0);
        queue.push((), 0);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.byte_size(), 0);
    }
}
