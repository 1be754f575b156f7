//! Pending-request queue: highest priority first, FIFO within a priority.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Priority of a queued request. Higher is served first.
pub type Priority = u8;

/// Priority used by plain sends.
pub const DEFAULT_PRIORITY: Priority = 1;

/// A request waiting for dispatch.
///
/// `seq` is assigned by the queue on insertion and breaks ties between equal priorities.
#[derive(Debug)]
pub struct QueuedRequest<A> {
    pub seq: u64,
    pub priority: Priority,
    pub target: String,
    pub enqueued_at_ms: u64,
    pub action: A,
}

impl<A> PartialEq for QueuedRequest<A> {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl<A> Eq for QueuedRequest<A> {}

impl<A> PartialOrd for QueuedRequest<A> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<A> Ord for QueuedRequest<A> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first
        match self.priority.cmp(&other.priority) {
            // FIFO within same priority: lower seq wins (reversed for max-heap)
            Ordering::Equal => other.seq.cmp(&self.seq),
            other => other,
        }
    }
}

/// Binary-heap priority queue with O(log n) push and pop.
#[derive(Debug)]
pub struct PriorityQueue<A> {
    next_seq: u64,
    heap: BinaryHeap<QueuedRequest<A>>,
}

impl<A> Default for PriorityQueue<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> PriorityQueue<A> {
    pub fn new() -> Self {
        Self { next_seq: 0, heap: BinaryHeap::new() }
    }

    /// Insert a request, returning its sequence number.
    pub fn push(
        &mut self,
        action: A,
        target: impl Into<String>,
        priority: Priority,
        enqueued_at_ms: u64,
    ) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(QueuedRequest { seq, priority, target: target.into(), enqueued_at_ms, action });
        seq
    }

    pub fn pop(&mut self) -> Option<QueuedRequest<A>> {
        self.heap.pop()
    }

    pub fn peek(&self) -> Option<&QueuedRequest<A>> {
        self.heap.peek()
    }

    /// Remove every pending request, in no particular order.
    pub fn drain(&mut self) -> Vec<QueuedRequest<A>> {
        self.heap.drain().collect()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(q: &mut PriorityQueue<&'static str>) -> Vec<&'static str> {
        std::iter::from_fn(|| q.pop().map(|r| r.action)).collect()
    }

    #[test]
    fn higher_priority_first_then_fifo() {
        let mut q = PriorityQueue::new();
        q.push("p1", "chat", 5, 0);
        q.push("p2", "chat", 1, 0);
        q.push("p3", "chat", 5, 0);

        assert_eq!(order(&mut q), vec!["p1", "p3", "p2"]);
    }

    #[test]
    fn fifo_within_priority_survives_interleaving() {
        let mut q = PriorityQueue::new();
        for name in ["a", "b", "c", "d"] {
            q.push(name, "chat", 1, 0);
        }
        assert_eq!(q.pop().map(|r| r.action), Some("a"));
        q.push("e", "chat", 1, 0);
        q.push("urgent", "chat", 9, 0);
        assert_eq!(order(&mut q), vec!["urgent", "b", "c", "d", "e"]);
    }

    #[test]
    fn sequence_numbers_are_monotonic() {
        let mut q = PriorityQueue::new();
        let a = q.push((), "x", 0, 0);
        let b = q.push((), "y", 9, 0);
        assert!(b > a);
        assert_eq!(q.peek().map(|r| r.target.as_str()), Some("y"));
    }

    #[test]
    fn drain_empties_queue() {
        let mut q = PriorityQueue::new();
        q.push(1, "x", 0, 0);
        q.push(2, "x", 0, 0);
        assert_eq!(q.drain().len(), 2);
        assert!(q.is_empty());
        assert_eq!(q.len(), 0);
    }
}
