// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Lock-free queue with a logical capacity adjustable at runtime.
//!
//! Physical storage is fixed at `MAX` slots. Lowering the capacity withdraws
//! slot indices into `unused_indices`, so they are in neither the free nor
//! the used queue and no push can reach them. Raising it hands them back to
//! the free queue. Only one resize runs at a time, guarded by
//! `resize_in_progress`; push and pop never look at that flag.
//!
//! A process that dies while owning the resize flag blocks every later
//! resize of the same queue. Push and pop keep working.

use std::fmt;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tracing::{debug, warn};

use super::index_queue::IndexQueue;
use super::lockfree_queue::LockFreeQueue;
use crate::error::QueueError;
use crate::shm::ShmSafe;

/// Releases the resize flag when dropped, including on unwind out of a
/// remove handler.
struct ResizeGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ResizeGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for ResizeGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// [`LockFreeQueue`] whose usable capacity can change between 0 and `MAX`.
#[repr(C)]
pub struct ResizeableLockFreeQueue<T, const MAX: usize> {
    queue: LockFreeQueue<T, MAX>,
    capacity: AtomicU64,
    resize_in_progress: AtomicBool,
    /// Indices withheld by a capacity decrease. Only the resize owner
    /// touches this queue.
    unused_indices: IndexQueue<MAX>,
}

impl<T, const MAX: usize> ResizeableLockFreeQueue<T, MAX> {
    /// Create an empty queue with capacity `MAX`.
    pub fn new() -> Self {
        let mut slot = MaybeUninit::<Self>::uninit();
        // SAFETY: construct_at initializes every field.
        unsafe {
            Self::construct_at(slot.as_mut_ptr());
            slot.assume_init()
        }
    }

    /// Create an empty queue with logical capacity `initial`.
    pub fn with_capacity(initial: usize) -> Result<Self, QueueError> {
        if initial > MAX {
            return Err(QueueError::CapacityExceedsMaximum {
                requested: initial as u64,
                max: MAX as u64,
            });
        }
        let queue = Self::new();
        // Fresh queue: nobody can hold the resize flag.
        queue.set_capacity(initial);
        Ok(queue)
    }

    /// # Safety
    /// `slot` must be valid for writes and aligned for `Self`. No other
    /// thread may access it until this returns.
    unsafe fn construct_at(slot: *mut Self) {
        LockFreeQueue::construct_at(ptr::addr_of_mut!((*slot).queue));
        ptr::addr_of_mut!((*slot).capacity).write(AtomicU64::new(MAX as u64));
        ptr::addr_of_mut!((*slot).resize_in_progress).write(AtomicBool::new(false));
        IndexQueue::construct_at(ptr::addr_of_mut!((*slot).unused_indices), false);
    }

    pub const fn max_capacity(&self) -> usize {
        MAX
    }

    /// Current logical capacity.
    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Acquire) as usize
    }

    /// Change the logical capacity, dropping any element evicted on the way.
    ///
    /// See [`ResizeableLockFreeQueue::set_capacity_with`].
    pub fn set_capacity(&self, new_capacity: usize) -> bool {
        self.set_capacity_with(new_capacity, drop)
    }

    /// Change the logical capacity to `new_capacity`.
    ///
    /// Returns `false` without side effects if `new_capacity > MAX` or if
    /// another caller is resizing right now. A decrease first withdraws free
    /// slots and then evicts the oldest elements, handing each evicted value
    /// to `remove_handler`.
    pub fn set_capacity_with<F>(&self, new_capacity: usize, mut remove_handler: F) -> bool
    where
        F: FnMut(T),
    {
        if new_capacity > MAX {
            warn!(
                requested = new_capacity,
                max = MAX,
                "refusing resize beyond maximum capacity"
            );
            return false;
        }

        let Some(_guard) = ResizeGuard::acquire(&self.resize_in_progress) else {
            return false;
        };

        let target = new_capacity as u64;
        let previous = self.capacity.load(Ordering::Acquire);
        let mut capacity = previous;
        while capacity != target {
            if capacity < target {
                if self.increase_capacity(target - capacity) == 0 {
                    // Withheld pool ran dry; keep what we reached.
                    break;
                }
            } else {
                self.decrease_capacity(capacity - target, &mut remove_handler);
            }
            capacity = self.capacity.load(Ordering::Acquire);
        }

        if capacity != previous {
            debug!(
                previous,
                capacity,
                requested = target,
                max = MAX,
                "queue capacity changed"
            );
        }
        true
    }

    /// Resize owner only.
    fn increase_capacity(&self, amount: u64) -> u64 {
        let mut increased = 0;
        while increased < amount {
            let Some(index) = self.unused_indices.pop() else {
                return increased;
            };
            increased += 1;
            self.capacity.fetch_add(1, Ordering::AcqRel);
            self.queue.free_indices().push(index);
        }
        increased
    }

    /// Resize owner only.
    fn decrease_capacity<F>(&self, amount: u64, remove_handler: &mut F) -> u64
    where
        F: FnMut(T),
    {
        let mut decreased = 0;
        while decreased < amount {
            while decreased < amount {
                let Some(index) = self.queue.free_indices().pop() else {
                    break;
                };
                self.unused_indices.push(index);
                decreased += 1;
                if self.capacity.fetch_sub(1, Ordering::AcqRel) == 1 {
                    return decreased;
                }
            }

            // No free slot left: take occupied ones, oldest first. A plain
            // pop would let a concurrent push grab the slot before we do.
            while decreased < amount {
                let Some(index) = self.try_get_used_index() else {
                    break;
                };
                // SAFETY: popped from the used queue, we own the occupied slot.
                let value = unsafe { self.queue.read_buffer_at(index) };
                remove_handler(value);
                self.unused_indices.push(index);
                decreased += 1;
                if self.capacity.fetch_sub(1, Ordering::AcqRel) == 1 {
                    return decreased;
                }
            }
        }
        decreased
    }

    fn try_get_used_index(&self) -> Option<u64> {
        let capacity = self.capacity.load(Ordering::Acquire);
        if capacity == 0 {
            return None;
        }
        self.queue.used_indices().pop_if_size_is_at_least(capacity)
    }

    /// Insert `value` unless the queue holds `capacity()` elements.
    pub fn try_push(&self, value: T) -> Result<(), T> {
        // Withheld slots never reach the free queue, so the base check
        // already honors the logical capacity.
        self.queue.try_push(value)
    }

    /// Insert `value`, evicting the oldest element once `capacity()` is
    /// reached. At capacity zero nothing can be stored and `value` itself
    /// comes back.
    pub fn push(&self, value: T) -> Option<T> {
        let mut evicted = None;

        let index = loop {
            if let Some(index) = self.queue.free_indices().pop() {
                break index;
            }
            if self.capacity.load(Ordering::Acquire) == 0 {
                return Some(value);
            }
            if let Some(index) = self.try_get_used_index() {
                // SAFETY: popped from the used queue, we own the occupied slot.
                evicted = Some(unsafe { self.queue.read_buffer_at(index) });
                break index;
            }
            std::hint::spin_loop();
        };

        // SAFETY: we own `index` and its slot is empty.
        unsafe { self.queue.write_buffer_at(index, value) };
        self.queue.used_indices().push(index);
        evicted
    }

    pub fn pop(&self) -> Option<T> {
        self.queue.pop()
    }

    pub fn size(&self) -> usize {
        self.queue.size()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl<T, const MAX: usize> Default for ResizeableLockFreeQueue<T, MAX> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const MAX: usize> fmt::Debug for ResizeableLockFreeQueue<T, MAX> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResizeableLockFreeQueue")
            .field("size", &self.size())
            .field("capacity", &self.capacity())
            .field("max_capacity", &MAX)
            .finish()
    }
}

// SAFETY: atomics, index queues and `Copy` payload slots only.
unsafe impl<T: Copy + Send, const MAX: usize> ShmSafe for ResizeableLockFreeQueue<T, MAX> {
    unsafe fn init_in_place(slot: *mut Self) {
        ResizeableLockFreeQueue::construct_at(slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_grow_after_fill() {
        let queue = ResizeableLockFreeQueue::<u32, 10>::with_capacity(4).unwrap();
        for value in 0..4 {
            assert!(queue.try_push(value).is_ok());
        }
        assert_eq!(queue.try_push(4), Err(4));

        assert!(queue.set_capacity(10));
        assert_eq!(queue.capacity(), 10);
        for value in 4..10 {
            assert!(queue.try_push(value).is_ok());
        }

        for expected in 0..10 {
            assert_eq!(queue.pop(), Some(expected));
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_new_uses_max_capacity() {
        let queue = ResizeableLockFreeQueue::<u8, 6>::new();
        assert_eq!(queue.capacity(), 6);
        assert_eq!(queue.max_capacity(), 6);
    }

    #[test]
    fn test_with_capacity_beyond_max() {
        let err = ResizeableLockFreeQueue::<u8, 4>::with_capacity(5).unwrap_err();
        assert_eq!(
            err,
            QueueError::CapacityExceedsMaximum {
                requested: 5,
                max: 4
            }
        );
    }

    #[test]
    fn test_set_capacity_beyond_max_has_no_effect() {
        let queue = ResizeableLockFreeQueue::<u8, 4>::with_capacity(2).unwrap();
        queue.try_push(1).unwrap();

        assert!(!queue.set_capacity(5));
        assert_eq!(queue.capacity(), 2);
        assert_eq!(queue.size(), 1);
    }

    #[test]
    fn test_decrease_evicts_oldest() {
        let queue = ResizeableLockFreeQueue::<u32, 8>::new();
        for value in 1..=6 {
            queue.try_push(value).unwrap();
        }

        let mut evicted = Vec::new();
        assert!(queue.set_capacity_with(3, |value| evicted.push(value)));

        assert_eq!(evicted, vec![1, 2, 3]);
        assert_eq!(queue.capacity(), 3);
        assert_eq!(queue.size(), 3);
        for expected in 4..=6 {
            assert_eq!(queue.pop(), Some(expected));
        }
    }

    #[test]
    fn test_push_evicts_at_logical_capacity() {
        let queue = ResizeableLockFreeQueue::<u32, 8>::with_capacity(3).unwrap();
        for value in 0..3 {
            assert_eq!(queue.push(value), None);
        }
        assert_eq!(queue.push(3), Some(0));
        assert_eq!(queue.push(4), Some(1));
        assert_eq!(queue.size(), 3);
    }

    #[test]
    fn test_zero_capacity() {
        let queue = ResizeableLockFreeQueue::<u32, 4>::new();
        queue.try_push(1).unwrap();

        let mut evicted = Vec::new();
        assert!(queue.set_capacity_with(0, |value| evicted.push(value)));
        assert_eq!(evicted, vec![1]);
        assert_eq!(queue.capacity(), 0);

        assert_eq!(queue.try_push(2), Err(2));
        assert_eq!(queue.push(3), Some(3));
        assert!(queue.is_empty());

        assert!(queue.set_capacity(2));
        assert_eq!(queue.push(4), None);
        assert_eq!(queue.pop(), Some(4));
    }

    #[test]
    fn test_lost_resize_race_returns_false() {
        let queue = ResizeableLockFreeQueue::<u32, 4>::new();
        queue.resize_in_progress.store(true, Ordering::SeqCst);

        assert!(!queue.set_capacity(2));
        assert_eq!(queue.capacity(), 4);

        queue.resize_in_progress.store(false, Ordering::SeqCst);
        assert!(queue.set_capacity(2));
    }

    #[test]
    fn test_panicking_handler_releases_resize_flag() {
        let queue = ResizeableLockFreeQueue::<u32, 4>::new();
        for value in 0..4 {
            queue.try_push(value).unwrap();
        }

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            queue.set_capacity_with(1, |_| panic!("handler failed"));
        }));
        assert!(result.is_err());
        assert!(!queue.resize_in_progress.load(Ordering::SeqCst));
        assert!(queue.set_capacity(4));
    }

    #[test]
    fn test_concurrent_push_pop_during_resize() {
        const PER_PRODUCER: usize = 20_000;
        let queue = Arc::new(ResizeableLockFreeQueue::<u64, 64>::with_capacity(16).unwrap());
        let evicted = Arc::new(AtomicUsize::new(0));
        let popped = Arc::new(AtomicUsize::new(0));

        let producers: Vec<_> = (0..2)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let evicted = Arc::clone(&evicted);
                thread::spawn(move || {
                    for value in 0..PER_PRODUCER as u64 {
                        if queue.push(value).is_some() {
                            evicted.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                })
            })
            .collect();

        let consumer = {
            let queue = Arc::clone(&queue);
            let popped = Arc::clone(&popped);
            thread::spawn(move || {
                for _ in 0..PER_PRODUCER {
                    if queue.pop().is_some() {
                        popped.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        };

        for round in 0..200 {
            let capacity = if round % 2 == 0 { 4 } else { 64 };
            let evicted = Arc::clone(&evicted);
            queue.set_capacity_with(capacity, move |_| {
                evicted.fetch_add(1, Ordering::Relaxed);
            });
        }

        for handle in producers {
            handle.join().unwrap();
        }
        consumer.join().unwrap();

        let mut remaining = 0;
        while queue.pop().is_some() {
            remaining += 1;
        }

        let total = evicted.load(Ordering::Relaxed) + popped.load(Ordering::Relaxed) + remaining;
        assert_eq!(total, 2 * PER_PRODUCER);
        assert_eq!(queue.capacity(), 64);
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<parking_lot::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn take(&self) -> String {
            String::from_utf8(std::mem::take(&mut *self.0.lock())).unwrap()
        }
    }

    #[test]
    fn test_resize_logged_only_when_capacity_moves() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let queue = ResizeableLockFreeQueue::<u32, 8>::with_capacity(4).unwrap();
            logs.take();

            assert!(queue.set_capacity(4));
            assert!(!logs.take().contains("queue capacity changed"));

            assert!(queue.set_capacity(6));
            let output = logs.take();
            assert!(output.contains("queue capacity changed"), "{}", output);
            assert!(output.contains("previous=4"), "{}", output);
            assert!(output.contains("requested=6"), "{}", output);
        });
    }
}
