//! Bounded flush queue between the chunk builder and the I/O workers
//!
//! A thin layer over a bounded `crossbeam_channel`. The producing side owns
//! the only `Sender`; shutting the queue down drops it, which lets every
//! consumer drain what is left and then observe the queue as closed.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Default capacity of the flush queue
pub const QUEUE_BACKLOG_DEFAULT: usize = 20;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("flush queue has been shut down")]
    Closed,
    #[error("flush queue has no consumers left")]
    Disconnected,
}

#[derive(Debug, Default)]
struct QueueCounters {
    pushed: AtomicUsize,
    popped: AtomicUsize,
}

/// Producer half of the flush queue
///
/// `push` takes `&self` and `shutdown` takes `&mut self`, so a push can never
/// be in flight while the queue is being shut down.
#[derive(Debug)]
pub struct FlushQueue<T> {
    sender: Option<Sender<T>>,
    capacity: usize,
    counters: Arc<QueueCounters>,
}

/// Consumer half of the flush queue; clone one per worker
#[derive(Debug)]
pub struct QueueReceiver<T> {
    receiver: Receiver<T>,
    capacity: usize,
    counters: Arc<QueueCounters>,
}

impl<T> Clone for QueueReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            receiver: self.receiver.clone(),
            capacity: self.capacity,
            counters: Arc::clone(&self.counters),
        }
    }
}

impl<T> FlushQueue<T> {
    /// Create a queue holding at most `capacity` items (minimum 1)
    pub fn new(capacity: usize) -> (Self, QueueReceiver<T>) {
        let capacity = capacity.max(1);
        let (sender, receiver) = bounded(capacity);
        let counters = Arc::new(QueueCounters::default());

        (
            Self {
                sender: Some(sender),
                capacity,
                counters: Arc::clone(&counters),
            },
            QueueReceiver {
                receiver,
                capacity,
                counters,
            },
        )
    }

    /// Append an item, blocking while the queue is full
    pub fn push(&self, item: T) -> Result<(), QueueError> {
        let sender = self.sender.as_ref().ok_or(QueueError::Closed)?;
        sender.send(item).map_err(|_| QueueError::Disconnected)?;
        self.counters.pushed.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Close the queue. Items already queued stay available to consumers.
    pub fn shutdown(&mut self) {
        self.sender.take();
    }

    pub fn is_shut_down(&self) -> bool {
        self.sender.is_none()
    }

    /// Number of items currently waiting
    pub fn len(&self) -> usize {
        match &self.sender {
            Some(sender) => sender.len(),
            None => self.pushed().saturating_sub(self.popped()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn pushed(&self) -> usize {
        self.counters.pushed.load(Ordering::Acquire)
    }

    pub fn popped(&self) -> usize {
        self.counters.popped.load(Ordering::Acquire)
    }
}

impl<T> QueueReceiver<T> {
    /// Remove the oldest item, blocking while the queue is empty and open.
    /// Returns `None` once the queue is shut down and drained.
    pub fn pop(&self) -> Option<T> {
        let item = self.receiver.recv().ok()?;
        self.counters.popped.fetch_add(1, Ordering::AcqRel);
        Some(item)
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_fifo_order() {
        let (mut queue, rx) = FlushQueue::new(4);
        for i in 0..4 {
            queue.push(i).unwrap();
        }
        queue.shutdown();

        let drained: Vec<i32> = std::iter::from_fn(|| rx.pop()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let (queue, _rx) = FlushQueue::<u8>::new(0);
        assert_eq!(queue.capacity(), 1);
    }

    #[test]
    fn test_push_after_shutdown_fails() {
        let (mut queue, _rx) = FlushQueue::new(2);
        queue.shutdown();
        queue.shutdown();
        assert!(queue.is_shut_down());
        assert_eq!(queue.push(1), Err(QueueError::Closed));
    }

    #[test]
    fn test_push_without_consumers_fails() {
        let (queue, rx) = FlushQueue::new(2);
        drop(rx);
        assert_eq!(queue.push(1), Err(QueueError::Disconnected));
    }

    #[test]
    fn test_shutdown_drains_before_closing() {
        let (mut queue, rx) = FlushQueue::new(3);
        queue.push("a").unwrap();
        queue.push("b").unwrap();
        queue.shutdown();

        assert_eq!(rx.pop(), Some("a"));
        assert_eq!(rx.pop(), Some("b"));
        assert_eq!(rx.pop(), None);
        assert_eq!(rx.pop(), None);
        assert_eq!(queue.pushed(), 2);
        assert_eq!(queue.popped(), 2);
    }

    #[test]
    fn test_shutdown_wakes_blocked_consumers() {
        let (mut queue, rx) = FlushQueue::<u32>::new(2);
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let rx = rx.clone();
                thread::spawn(move || rx.pop())
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        queue.shutdown();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), None);
        }
    }

    #[test]
    fn test_push_blocks_while_full() {
        let (mut queue, rx) = FlushQueue::new(2);
        let consumer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            let mut seen = Vec::new();
            while let Some(item) = rx.pop() {
                assert!(rx.len() <= rx.capacity());
                seen.push(item);
            }
            seen
        });

        for i in 0..10 {
            queue.push(i).unwrap();
            assert!(queue.len() <= queue.capacity());
        }
        queue.shutdown();

        assert_eq!(consumer.join().unwrap(), (0..10).collect::<Vec<_>>());
        assert_eq!(queue.pushed(), 10);
        assert_eq!(queue.popped(), 10);
    }

    #[test]
    fn test_each_item_delivered_once() {
        let (mut queue, rx) = FlushQueue::new(5);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let rx = rx.clone();
                thread::spawn(move || std::iter::from_fn(|| rx.pop()).collect::<Vec<u32>>())
            })
            .collect();
        drop(rx);

        for i in 0..500 {
            queue.push(i).unwrap();
        }
        queue.shutdown();

        let mut seen = HashSet::new();
        let mut total = 0;
        for handle in handles {
            for item in handle.join().unwrap() {
                assert!(seen.insert(item), "item {} delivered twice", item);
                total += 1;
            }
        }
        assert_eq!(total, 500);
        assert_eq!(queue.pushed(), queue.popped());
    }
}
