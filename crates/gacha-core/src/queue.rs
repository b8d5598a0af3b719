//! FIFO buffer of gacha events awaiting playback.
//!
//! [`EventQueue`] is the classic two-stack queue: pushes land on an input
//! stack, pops come off an output stack, and the input stack is reversed into
//! the output stack only when the output runs dry. Every element moves
//! between stacks at most once, so each operation is amortized O(1).
//!
//! The queue itself is not synchronized. [`SharedQueue`] wraps it behind a
//! lock for the producer (selection) / consumer (display scheduler) split.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

/// Two-buffer FIFO queue.
#[derive(Debug, Clone)]
pub struct EventQueue<T> {
    input: Vec<T>,
    output: Vec<T>,
}

impl<T> Default for EventQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventQueue<T> {
    /// Create an empty queue.
    pub const fn new() -> Self {
        Self {
            input: Vec::new(),
            output: Vec::new(),
        }
    }

    /// Append an item to the back of the queue.
    pub fn enqueue(&mut self, item: T) {
        self.input.push(item);
    }

    /// Remove the item at the front of the queue.
    ///
    /// When the output buffer is empty, the whole input buffer is first
    /// moved into it in reverse order.
    pub fn dequeue(&mut self) -> Option<T> {
        if self.output.is_empty() {
            while let Some(item) = self.input.pop() {
                self.output.push(item);
            }
        }
        self.output.pop()
    }

    /// True iff both buffers are empty.
    pub fn is_empty(&self) -> bool {
        self.input.is_empty() && self.output.is_empty()
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.input.len().saturating_add(self.output.len())
    }
}

/// A cloneable, lock-guarded [`EventQueue`] shared by one producer flow and
/// one consumer flow.
///
/// [`push`](Self::push) never waits. [`pop`](Self::pop) waits until an item
/// is available.
#[derive(Debug)]
pub struct SharedQueue<T> {
    inner: Arc<SharedInner<T>>,
}

#[derive(Debug)]
struct SharedInner<T> {
    queue: Mutex<EventQueue<T>>,
    available: Notify,
}

impl<T> Clone for SharedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for SharedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SharedQueue<T> {
    /// Create an empty shared queue.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SharedInner {
                queue: Mutex::new(EventQueue::new()),
                available: Notify::new(),
            }),
        }
    }

    /// Enqueue an item and wake a waiting consumer.
    pub fn push(&self, item: T) {
        self.lock().enqueue(item);
        self.inner.available.notify_one();
    }

    /// Dequeue an item without waiting.
    pub fn try_pop(&self) -> Option<T> {
        self.lock().dequeue()
    }

    /// Dequeue an item, waiting until one is pushed if the queue is empty.
    pub async fn pop(&self) -> T {
        loop {
            if let Some(item) = self.try_pop() {
                return item;
            }
            self.inner.available.notified().await;
        }
    }

    /// True iff nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    // The queue holds no invariants a panicking holder could break mid-way.
    fn lock(&self) -> MutexGuard<'_, EventQueue<T>> {
        self.inner
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn dequeue_follows_enqueue_order() {
        let mut queue = EventQueue::new();
        for i in 0..5 {
            queue.enqueue(i);
        }
        let drained: Vec<i32> = std::iter::from_fn(|| queue.dequeue()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn interleaved_operations_stay_fifo() {
        // Pushes that land while the output buffer is non-empty must wait
        // behind everything already moved across.
        let mut queue = EventQueue::new();
        let mut expected = std::collections::VecDeque::new();
        let mut next = 0_u32;
        let pattern = [3_u32, 1, 0, 2, 4, 1, 0, 0, 5];

        for (step, &pushes) in pattern.iter().enumerate() {
            for _ in 0..pushes {
                queue.enqueue(next);
                expected.push_back(next);
                next = next.saturating_add(1);
            }
            let pops = step % 3;
            for _ in 0..pops {
                assert_eq!(queue.dequeue(), expected.pop_front());
            }
            assert_eq!(queue.len(), expected.len());
            assert_eq!(queue.is_empty(), expected.is_empty());
        }

        while let Some(item) = queue.dequeue() {
            assert_eq!(Some(item), expected.pop_front());
        }
        assert!(expected.is_empty());
    }

    #[test]
    fn empty_only_when_all_enqueued_items_dequeued() {
        let mut queue = EventQueue::new();
        assert!(queue.is_empty());
        queue.enqueue('a');
        queue.enqueue('b');
        assert!(!queue.is_empty());
        assert_eq!(queue.dequeue(), Some('a'));
        assert!(!queue.is_empty());
        queue.enqueue('c');
        assert_eq!(queue.dequeue(), Some('b'));
        assert_eq!(queue.dequeue(), Some('c'));
        assert!(queue.is_empty());
        assert_eq!(queue.dequeue(), None);
    }

    #[tokio::test]
    async fn shared_pop_waits_for_push() {
        let queue = SharedQueue::new();
        let consumer = queue.clone();
        let handle = tokio::spawn(async move { consumer.pop().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!handle.is_finished());

        queue.push("event");
        let popped = handle.await.unwrap();
        assert_eq!(popped, "event");
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn shared_queue_preserves_order_across_handles() {
        let producer = SharedQueue::new();
        let consumer = producer.clone();
        for i in 0..10 {
            producer.push(i);
        }
        assert_eq!(consumer.len(), 10);
        for i in 0..10 {
            assert_eq!(consumer.pop().await, i);
        }
        assert_eq!(consumer.try_pop(), None);
    }
}
