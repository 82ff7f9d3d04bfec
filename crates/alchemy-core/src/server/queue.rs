//! Blocking FIFO of control messages
//!
//! Many producers (one listener thread per client), one consumer (the
//! control loop). `pop_front` blocks while the queue is empty. Disabling
//! the queue drops whatever is pending and turns push and pop into no-ops,
//! so a consumer can never stay blocked through shutdown.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use crate::sync::lock;

struct QueueState<T> {
    items: VecDeque<T>,
    waiters: usize,
    enabled: bool,
    /// Pending wake-ups without a message
    interrupts: usize,
}

/// Thread-safe blocking queue
pub struct ControlQueue<T> {
    state: Mutex<QueueState<T>>,
    available: Condvar,
}

impl<T> ControlQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                waiters: 0,
                enabled: true,
                interrupts: 0,
            }),
            available: Condvar::new(),
        }
    }

    /// Append `item`, waking one blocked consumer
    ///
    /// Returns `false` (and drops the item) if the queue is disabled.
    pub fn push_back(&self, item: T) -> bool {
        let mut state = lock(&self.state);
        if !state.enabled {
            return false;
        }
        state.items.push_back(item);
        if state.waiters > 0 {
            self.available.notify_one();
        } else {
            log::trace!("[QUEUE] Pushed with no waiting consumer ({} queued)", state.items.len());
        }
        true
    }

    /// Take the front item, blocking while the queue is empty
    ///
    /// Returns `None` if the queue is disabled or was interrupted.
    pub fn pop_front(&self) -> Option<T> {
        let mut state = lock(&self.state);
        loop {
            if !state.enabled {
                return None;
            }
            if state.interrupts > 0 {
                state.interrupts -= 1;
                return None;
            }
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            state.waiters += 1;
            state = self
                .available
                .wait(state)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            state.waiters -= 1;
        }
    }

    /// Make one `pop_front` return `None` without consuming a message
    pub fn interrupt(&self) {
        let mut state = lock(&self.state);
        state.interrupts += 1;
        self.available.notify_all();
    }

    /// Forget wake-ups that no consumer collected
    pub fn clear_interrupts(&self) {
        lock(&self.state).interrupts = 0;
    }

    pub fn len(&self) -> usize {
        lock(&self.state).items.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.state).items.is_empty()
    }

    pub fn is_enabled(&self) -> bool {
        lock(&self.state).enabled
    }

    /// Drop pending items and refuse further pushes; wakes every consumer
    pub fn disable(&self) {
        let mut state = lock(&self.state);
        if !state.enabled {
            return;
        }
        let dropped = state.items.len();
        state.items.clear();
        state.enabled = false;
        self.available.notify_all();
        if dropped > 0 {
            log::debug!("[QUEUE] Disabled, dropped {} pending message(s)", dropped);
        }
    }
}

impl<T> Default for ControlQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for ControlQueue<T> {
    fn drop(&mut self) {
        self.disable();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_fifo_order() {
        let queue = ControlQueue::new();
        for i in 1..=3 {
            assert!(queue.push_back(i));
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop_front(), Some(1));
        assert_eq!(queue.pop_front(), Some(2));
        assert_eq!(queue.pop_front(), Some(3));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_pop_blocks_until_push() {
        let queue = Arc::new(ControlQueue::new());
        let (tx, rx) = channel::bounded(1);
        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || tx.send(queue.pop_front()).unwrap())
        };

        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        queue.push_back("m1");
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), Some("m1"));
        consumer.join().unwrap();
    }

    #[test]
    fn test_many_producers_one_consumer() {
        const PRODUCERS: usize = 8;
        const PER_PRODUCER: usize = 500;

        let queue = Arc::new(ControlQueue::new());
        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let queue = queue.clone();
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        queue.push_back((p, i));
                    }
                })
            })
            .collect();

        let (tx, rx) = channel::bounded(1);
        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || {
                let mut next = vec![0; PRODUCERS];
                for _ in 0..PRODUCERS * PER_PRODUCER {
                    let (p, i) = queue.pop_front().unwrap();
                    // Per-producer order is preserved
                    assert_eq!(next[p], i);
                    next[p] += 1;
                }
                tx.send(next).unwrap();
            })
        };

        for producer in producers {
            producer.join().unwrap();
        }
        let counts = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert!(counts.iter().all(|c| *c == PER_PRODUCER));
        consumer.join().unwrap();
    }

    #[test]
    fn test_disable_releases_consumer() {
        let queue = Arc::new(ControlQueue::<u32>::new());
        queue.push_back(1);
        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || {
                while queue.pop_front().is_some() {}
            })
        };
        thread::sleep(Duration::from_millis(20));
        queue.disable();
        consumer.join().unwrap();

        assert!(!queue.push_back(2));
        assert!(queue.is_empty());
        assert_eq!(queue.pop_front(), None);
    }

    #[test]
    fn test_interrupt_wakes_once() {
        let queue = Arc::new(ControlQueue::<u32>::new());
        let (tx, rx) = channel::bounded(1);
        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || tx.send(queue.pop_front()).unwrap())
        };
        thread::sleep(Duration::from_millis(20));
        queue.interrupt();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), None);
        consumer.join().unwrap();

        queue.push_back(7);
        assert_eq!(queue.pop_front(), Some(7));
    }

    #[test]
    fn test_cleared_interrupts_are_not_delivered() {
        let queue = ControlQueue::new();
        queue.interrupt();
        queue.interrupt();
        queue.clear_interrupts();
        queue.push_back(3);
        assert_eq!(queue.pop_front(), Some(3));
    }
}
