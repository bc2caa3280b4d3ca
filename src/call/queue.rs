//! Holding area for signaling events that arrive before local media is ready

use std::collections::VecDeque;

/// FIFO of early events. Drained exactly once, in arrival order, when media
/// becomes ready; bypassed for the rest of the session afterwards.
#[derive(Debug)]
pub struct PendingQueue<T> {
    ready: bool,
    pending: VecDeque<T>,
}

impl<T> Default for PendingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PendingQueue<T> {
    pub fn new() -> Self {
        Self { ready: false, pending: VecDeque::new() }
    }

    /// Returns the event back when it should be dispatched now, or keeps it
    /// when media is not ready yet.
    pub fn enqueue_or_dispatch(&mut self, event: T) -> Option<T> {
        if self.ready {
            Some(event)
        } else {
            self.pending.push_back(event);
            None
        }
    }

    /// Flip to ready and hand back everything held so far, oldest first.
    /// A second call yields nothing.
    pub fn drain(&mut self) -> Vec<T> {
        self.ready = true;
        self.pending.drain(..).collect()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_queues_until_ready_then_bypasses() {
        let mut queue = PendingQueue::new();
        assert_eq!(queue.enqueue_or_dispatch(1), None);
        assert_eq!(queue.enqueue_or_dispatch(2), None);
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.drain(), vec![1, 2]);
        assert!(queue.is_ready());
        assert_eq!(queue.enqueue_or_dispatch(3), Some(3));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_second_drain_is_empty() {
        let mut queue = PendingQueue::new();
        queue.enqueue_or_dispatch("offer");
        assert_eq!(queue.drain(), vec!["offer"]);
        assert!(queue.drain().is_empty());
    }

    proptest! {
        #[test]
        fn drained_in_arrival_order_exactly_once(early in proptest::collection::vec(any::<u32>(), 0..64),
                                                 late in proptest::collection::vec(any::<u32>(), 0..16)) {
            let mut queue = PendingQueue::new();
            let mut dispatched = Vec::new();
            for event in early.iter().copied() {
                dispatched.extend(queue.enqueue_or_dispatch(event));
            }
            prop_assert!(dispatched.is_empty());

            dispatched.extend(queue.drain());
            for event in late.iter().copied() {
                dispatched.extend(queue.enqueue_or_dispatch(event));
            }
            dispatched.extend(queue.drain());

            let expected: Vec<u32> = early.iter().chain(late.iter()).copied().collect();
            prop_assert_eq!(dispatched, expected);
        }
    }
}
