//! Bounded event queue.
//!
//! Fixed-capacity ring buffer between exactly one producer thread and one
//! consumer thread. A mutex protects head/tail/count; two condition
//! variables signal the "became non-empty" and "became non-full"
//! transitions.
//!
//! # Contract
//!
//! - [`BoundedQueue::push`] never waits for space. A full queue rejects the
//!   item with [`Full`], handing it back; the caller decides to drop it.
//! - [`BoundedQueue::pop_blocking`] suspends until an item arrives or the
//!   timeout elapses. Items come out in push order.
//! - Blocking from interrupt context halts the device.
//!
//! ```text
//! count == 0        → empty
//! count == capacity → full
//! 0 <= count <= capacity, always
//! ```

use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicU32, Ordering};
use core::time::Duration;

use crate::error::{ContextViolation, Full, Timeout};
use crate::fault;
use crate::sys::{self, Condvar, Deadline, Mutex};

/// Scan queue depth: worst-case simultaneous transitions in one scan tick
/// across a 3x5 half plus forwarded events from the other half.
pub const SCAN_QUEUE_DEPTH: usize = 32;

/// Report queue depth: about two maximal strokes typed out as
/// press/release reports.
pub const REPORT_QUEUE_DEPTH: usize = 64;

struct Ring<T, const N: usize> {
    slots: [MaybeUninit<T>; N],
    head: usize,
    tail: usize,
    count: usize,
}

impl<T, const N: usize> Ring<T, N> {
    const fn new() -> Self {
        Self {
            // SAFETY: an array of MaybeUninit needs no initialization.
            slots: unsafe { MaybeUninit::uninit().assume_init() },
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    fn is_full(&self) -> bool {
        self.count == N
    }

    fn put(&mut self, item: T) {
        self.slots[self.tail].write(item);
        self.tail = (self.tail + 1) % N;
        self.count += 1;
    }

    fn take(&mut self) -> Option<T> {
        if self.count == 0 {
            return None;
        }
        // SAFETY: slots in [head, head + count) are initialized.
        let item = unsafe { self.slots[self.head].assume_init_read() };
        self.head = (self.head + 1) % N;
        self.count -= 1;
        Some(item)
    }
}

impl<T, const N: usize> Drop for Ring<T, N> {
    fn drop(&mut self) {
        while self.take().is_some() {}
    }
}

/// Single-producer single-consumer bounded queue.
pub struct BoundedQueue<T, const N: usize> {
    ring: Mutex<Ring<T, N>>,
    not_empty: Condvar,
    not_full: Condvar,
    rejected: AtomicU32,
}

impl<T: Send, const N: usize> BoundedQueue<T, N> {
    /// Create an empty queue. Allocates kernel objects on the device, so it
    /// runs during startup, not in a `static` initializer.
    pub fn new() -> Self {
        assert!(N > 0, "queue capacity must be non-zero");
        Self {
            ring: Mutex::new(Ring::new()),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            rejected: AtomicU32::new(0),
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Enqueue without waiting for space.
    ///
    /// Only waits for the internal lock. Returns the item inside [`Full`]
    /// when the queue is at capacity; nothing is retried.
    pub fn push(&self, item: T) -> Result<(), Full<T>> {
        let mut ring = self.ring.lock();
        if ring.is_full() {
            drop(ring);
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(Full(item));
        }
        ring.put(item);
        drop(ring);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Enqueue, waiting up to `timeout` for space.
    ///
    /// The firmware's producers do not use this; it exists for stages that
    /// prefer backpressure over loss.
    pub fn push_blocking(&self, item: T, timeout: Duration) -> Result<(), Full<T>> {
        if sys::in_isr() {
            fault::halt(ContextViolation::BlockingInIsr);
        }

        let deadline = Deadline::after(timeout);
        let mut ring = self.ring.lock();
        while ring.is_full() {
            let Some(left) = deadline.remaining() else {
                drop(ring);
                self.rejected.fetch_add(1, Ordering::Relaxed);
                return Err(Full(item));
            };
            ring = self.not_full.wait_timeout(ring, left);
        }
        ring.put(item);
        drop(ring);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Dequeue, waiting up to `timeout` for an item.
    ///
    /// `Duration::ZERO` polls, `Duration::MAX` waits forever. [`Timeout`] is
    /// the normal "nothing arrived" outcome, workers use it for housekeeping.
    pub fn pop_blocking(&self, timeout: Duration) -> Result<T, Timeout> {
        if sys::in_isr() {
            fault::halt(ContextViolation::BlockingInIsr);
        }

        let deadline = Deadline::after(timeout);
        let mut ring = self.ring.lock();
        loop {
            if let Some(item) = ring.take() {
                drop(ring);
                self.not_full.notify_one();
                return Ok(item);
            }
            let Some(left) = deadline.remaining() else {
                return Err(Timeout);
            };
            ring = self.not_empty.wait_timeout(ring, left);
        }
    }

    /// Dequeue only if an item is already waiting.
    pub fn try_pop(&self) -> Option<T> {
        let item = self.ring.lock().take();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    pub fn len(&self) -> usize {
        self.ring.lock().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total pushes rejected with [`Full`] since creation.
    pub fn rejected(&self) -> u32 {
        self.rejected.load(Ordering::Relaxed)
    }
}

impl<T: Send, const N: usize> Default for BoundedQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let q: BoundedQueue<u32, 4> = BoundedQueue::new();
        q.push(1).unwrap();
        q.push(2).unwrap();
        q.push(3).unwrap();
        assert_eq!(q.len(), 3);

        assert_eq!(q.pop_blocking(Duration::ZERO), Ok(1));
        assert_eq!(q.pop_blocking(Duration::ZERO), Ok(2));
        q.push(4).unwrap();
        assert_eq!(q.pop_blocking(Duration::ZERO), Ok(3));
        assert_eq!(q.pop_blocking(Duration::ZERO), Ok(4));
        assert!(q.is_empty());
    }

    #[test]
    fn test_full_hands_item_back() {
        let q: BoundedQueue<u8, 2> = BoundedQueue::new();
        q.push(1).unwrap();
        q.push(2).unwrap();
        assert_eq!(q.push(3), Err(Full(3)));
        assert_eq!(q.rejected(), 1);
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn test_wraparound() {
        let q: BoundedQueue<usize, 3> = BoundedQueue::new();
        for round in 0..10 {
            q.push(round).unwrap();
            q.push(round + 100).unwrap();
            assert_eq!(q.try_pop(), Some(round));
            assert_eq!(q.try_pop(), Some(round + 100));
        }
        assert_eq!(q.try_pop(), None);
    }

    #[test]
    fn test_pop_times_out_when_empty() {
        let q: BoundedQueue<u8, 2> = BoundedQueue::new();
        assert_eq!(q.pop_blocking(Duration::from_millis(5)), Err(Timeout));
    }

    #[test]
    fn test_push_blocking_waits_for_space() {
        use std::sync::Arc;

        let q: Arc<BoundedQueue<u8, 1>> = Arc::new(BoundedQueue::new());
        q.push(1).unwrap();

        let consumer = {
            let q = Arc::clone(&q);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(10));
                q.pop_blocking(Duration::MAX)
            })
        };

        assert_eq!(q.push_blocking(2, Duration::from_secs(5)), Ok(()));
        assert_eq!(consumer.join().unwrap(), Ok(1));
        assert_eq!(q.try_pop(), Some(2));
    }

    #[test]
    fn test_push_blocking_gives_up() {
        let q: BoundedQueue<u8, 1> = BoundedQueue::new();
        q.push(1).unwrap();
        assert_eq!(q.push_blocking(2, Duration::from_millis(5)), Err(Full(2)));
    }

    #[test]
    fn test_drop_releases_queued_items() {
        use std::rc::Rc;

        let tracker = Rc::new(());
        {
            let q: BoundedQueue<Rc<()>, 4> = BoundedQueue {
                ring: Mutex::new(Ring::new()),
                not_empty: Condvar::new(),
                not_full: Condvar::new(),
                rejected: AtomicU32::new(0),
            };
            let mut ring = q.ring.lock();
            ring.put(Rc::clone(&tracker));
            ring.put(Rc::clone(&tracker));
            drop(ring);
            assert_eq!(Rc::strong_count(&tracker), 3);
        }
        assert_eq!(Rc::strong_count(&tracker), 1);
    }

    #[test]
    #[should_panic(expected = "C01")]
    fn test_pop_from_isr_halts() {
        let q: BoundedQueue<u8, 2> = BoundedQueue::new();
        sys::simulate_isr(|| {
            let _ = q.pop_blocking(Duration::ZERO);
        });
    }
}
