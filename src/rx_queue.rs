use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::Deque;
use portable_atomic::{AtomicU32, Ordering};

/// Receive queue shared between a module's interrupt handler and the scheduler loop.
///
/// The interrupt side only pushes, the loop side only pops. Both index updates happen
/// inside a critical section, so a push can never observe a half-finished pop.
/// When the queue is full the arriving byte is dropped and counted.
pub struct RxQueue<const N: usize> {
    bytes: Mutex<CriticalSectionRawMutex, RefCell<Deque<u8, N>>>,
    overruns: AtomicU32,
}

impl<const N: usize> RxQueue<N> {
    pub const fn new() -> Self {
        Self {
            bytes: Mutex::new(RefCell::new(Deque::new())),
            overruns: AtomicU32::new(0),
        }
    }

    /// Interrupt side. Returns `false` if the byte was dropped.
    pub fn push(&self, byte: u8) -> bool {
        let stored = self
            .bytes
            .lock(|q| q.borrow_mut().push_back(byte).is_ok());
        if !stored {
            self.overruns.fetch_add(1, Ordering::Relaxed);
        }
        stored
    }

    pub fn pop(&self) -> Option<u8> {
        self.bytes.lock(|q| q.borrow_mut().pop_front())
    }

    pub fn len(&self) -> usize {
        self.bytes.lock(|q| q.borrow().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Bytes dropped because the queue was full
    pub fn overruns(&self) -> u32 {
        self.overruns.load(Ordering::Relaxed)
    }
}

impl<const N: usize> Default for RxQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order() {
        let q: RxQueue<8> = RxQueue::new();
        for b in b"abc" {
            assert!(q.push(*b));
        }
        assert_eq!(q.len(), 3);
        assert_eq!(q.pop(), Some(b'a'));
        assert_eq!(q.pop(), Some(b'b'));
        assert_eq!(q.pop(), Some(b'c'));
        assert_eq!(q.pop(), None);
        assert!(q.is_empty());
    }

    #[test]
    fn full_queue_drops_newest() {
        let q: RxQueue<4> = RxQueue::new();
        for b in 1..=6u8 {
            q.push(b);
        }
        assert_eq!(q.len(), 4);
        assert_eq!(q.overruns(), 2);

        let drained: std::vec::Vec<u8> = core::iter::from_fn(|| q.pop()).collect();
        assert_eq!(drained, [1, 2, 3, 4]);
    }

    #[test]
    fn wraps_around_after_partial_drain() {
        let q: RxQueue<4> = RxQueue::new();
        for b in 1..=4u8 {
            q.push(b);
        }
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert!(q.push(5));
        assert!(q.push(6));
        assert_eq!(q.overruns(), 0);

        let drained: std::vec::Vec<u8> = core::iter::from_fn(|| q.pop()).collect();
        assert_eq!(drained, [3, 4, 5, 6]);
    }
}
