// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Bounded lock-free MPMC queue.
//!
//! Values live in a fixed array of `N` slots. Two [`IndexQueue`]s partition
//! the slot indices: `free_indices` holds slots without a live value,
//! `used_indices` holds occupied slots in push order. A push moves an index
//! from free to used, a pop moves it back. Only integer indices cross
//! between threads, never pointers, so the queue can live in shared memory.
//!
//! No operation blocks or allocates.

use std::cell::UnsafeCell;
use std::fmt;
use std::mem::{self, MaybeUninit};
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};

use super::index_queue::IndexQueue;
use crate::shm::ShmSafe;

/// Fixed storage for `N` values, addressed by index.
#[repr(C)]
struct Buffer<T, const N: usize> {
    slots: [UnsafeCell<MaybeUninit<T>>; N],
}

impl<T, const N: usize> Buffer<T, N> {
    /// # Safety
    /// The caller must own slot `index` (hold it outside both index queues)
    /// and the slot must be empty.
    #[inline]
    unsafe fn write(&self, index: u64, value: T) {
        (*self.slots[index as usize].get()).write(value);
    }

    /// # Safety
    /// The caller must own slot `index` and the slot must hold a value.
    #[inline]
    unsafe fn take(&self, index: u64) -> T {
        (*self.slots[index as usize].get()).assume_init_read()
    }
}

/// Lock-free bounded FIFO of `T` with capacity `N`.
#[repr(C)]
pub struct LockFreeQueue<T, const N: usize> {
    free_indices: IndexQueue<N>,
    used_indices: IndexQueue<N>,
    buffer: Buffer<T, N>,
    size: AtomicU64,
}

// SAFETY: a slot is only ever accessed by the thread that currently owns its
// index, and index hand-over goes through acquire/release atomics.
unsafe impl<T: Send, const N: usize> Sync for LockFreeQueue<T, N> {}

impl<T, const N: usize> LockFreeQueue<T, N> {
    /// Create an empty queue.
    pub fn new() -> Self {
        let mut slot = MaybeUninit::<Self>::uninit();
        // SAFETY: construct_at initializes every field except the slot
        // buffer, which is `MaybeUninit` storage.
        unsafe {
            Self::construct_at(slot.as_mut_ptr());
            slot.assume_init()
        }
    }

    /// Construct an empty queue directly at `slot`.
    ///
    /// # Safety
    /// `slot` must be valid for writes and aligned for `Self`. No other
    /// thread may access it until this returns.
    pub(crate) unsafe fn construct_at(slot: *mut Self) {
        IndexQueue::construct_at(ptr::addr_of_mut!((*slot).free_indices), true);
        IndexQueue::construct_at(ptr::addr_of_mut!((*slot).used_indices), false);
        ptr::addr_of_mut!((*slot).size).write(AtomicU64::new(0));
    }

    /// Insert `value` unless the queue is full.
    ///
    /// On a full queue the value is handed back untouched in `Err`.
    pub fn try_push(&self, value: T) -> Result<(), T> {
        let Some(index) = self.free_indices.pop() else {
            return Err(value);
        };

        // SAFETY: the index came out of the free queue, so we own the empty slot.
        unsafe { self.write_buffer_at(index, value) };
        self.used_indices.push(index);
        Ok(())
    }

    /// Insert `value`, evicting the oldest element if the queue is full.
    ///
    /// Always succeeds. Returns the evicted element, if any.
    pub fn push(&self, value: T) -> Option<T> {
        let mut evicted = None;

        let index = loop {
            if let Some(index) = self.free_indices.pop() {
                break index;
            }
            if let Some(index) = self.used_indices.pop_if_full() {
                // SAFETY: popped from the used queue, we own the occupied slot.
                evicted = Some(unsafe { self.read_buffer_at(index) });
                break index;
            }
            // A concurrent pop is between queues; its index shows up shortly.
            std::hint::spin_loop();
        };

        // SAFETY: we own `index` and its slot is empty.
        unsafe { self.write_buffer_at(index, value) };
        self.used_indices.push(index);
        evicted
    }

    /// Remove and return the oldest element.
    pub fn pop(&self) -> Option<T> {
        let index = self.used_indices.pop()?;
        // SAFETY: popped from the used queue, we own the occupied slot.
        let value = unsafe { self.read_buffer_at(index) };
        self.free_indices.push(index);
        Some(value)
    }

    /// Number of stored elements. Approximate under concurrent access, but
    /// never above `capacity()`.
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Acquire) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.used_indices.is_empty()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub(crate) fn free_indices(&self) -> &IndexQueue<N> {
        &self.free_indices
    }

    pub(crate) fn used_indices(&self) -> &IndexQueue<N> {
        &self.used_indices
    }

    /// # Safety
    /// The caller must own `index` and its slot must be empty.
    pub(crate) unsafe fn write_buffer_at(&self, index: u64, value: T) {
        self.buffer.write(index, value);
        self.size.fetch_add(1, Ordering::Release);
    }

    /// # Safety
    /// The caller must own `index` and its slot must hold a value.
    pub(crate) unsafe fn read_buffer_at(&self, index: u64) -> T {
        let value = self.buffer.take(index);
        self.size.fetch_sub(1, Ordering::Release);
        value
    }
}

impl<T, const N: usize> Default for LockFreeQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> Drop for LockFreeQueue<T, N> {
    fn drop(&mut self) {
        if mem::needs_drop::<T>() {
            while self.pop().is_some() {}
        }
    }
}

impl<T, const N: usize> fmt::Debug for LockFreeQueue<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockFreeQueue")
            .field("size", &self.size())
            .field("capacity", &N)
            .finish()
    }
}

// SAFETY: all state is atomics plus `Copy` payload slots; no pointers.
unsafe impl<T: Copy + Send, const N: usize> ShmSafe for LockFreeQueue<T, N> {
    unsafe fn init_in_place(slot: *mut Self) {
        LockFreeQueue::construct_at(slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::VecDeque;
    use std::sync::Arc;

    #[test]
    fn test_try_push_until_full() {
        let queue = LockFreeQueue::<u32, 4>::new();
        for value in 0..4 {
            assert_eq!(queue.try_push(value), Ok(()));
        }
        assert_eq!(queue.try_push(4), Err(4));
        assert_eq!(queue.size(), 4);

        assert_eq!(queue.pop(), Some(0));
        assert_eq!(queue.try_push(4), Ok(()));
    }

    #[test]
    fn test_push_overwrites_oldest() {
        let queue = LockFreeQueue::<u32, 4>::new();
        for value in 0..4 {
            assert_eq!(queue.push(value), None);
        }

        assert_eq!(queue.push(4), Some(0));
        assert_eq!(queue.size(), 4);

        for expected in 1..=4 {
            assert_eq!(queue.pop(), Some(expected));
        }
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_overflow_returns_element_pushed_capacity_ago() {
        let queue = LockFreeQueue::<u64, 3>::new();
        for value in 0..3 {
            queue.push(value);
        }
        for value in 3..50 {
            assert_eq!(queue.push(value), Some(value - 3));
            assert_eq!(queue.size(), 3);
        }
    }

    #[test]
    fn test_round_trip() {
        let queue = LockFreeQueue::<String, 2>::new();
        assert!(queue.try_push("payload".to_string()).is_ok());
        assert_eq!(queue.pop().as_deref(), Some("payload"));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_empty_and_size() {
        let queue = LockFreeQueue::<u8, 8>::new();
        assert!(queue.is_empty());
        assert_eq!(queue.size(), 0);
        assert_eq!(queue.capacity(), 8);

        queue.try_push(1).unwrap();
        queue.try_push(2).unwrap();
        assert!(!queue.is_empty());
        assert_eq!(queue.size(), 2);

        queue.pop();
        queue.pop();
        assert!(queue.is_empty());
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_drop_releases_remaining_elements() {
        let tracker = Arc::new(());
        {
            let queue = LockFreeQueue::<Arc<()>, 4>::new();
            for _ in 0..3 {
                queue.try_push(Arc::clone(&tracker)).unwrap();
            }
            assert_eq!(Arc::strong_count(&tracker), 4);
        }
        assert_eq!(Arc::strong_count(&tracker), 1);
    }

    #[test]
    fn test_evicted_value_is_owned_by_caller() {
        let tracker = Arc::new(());
        let queue = LockFreeQueue::<Arc<()>, 1>::new();
        queue.push(Arc::clone(&tracker));
        let evicted = queue.push(Arc::clone(&tracker));
        assert!(evicted.is_some());
        assert_eq!(Arc::strong_count(&tracker), 3);
        drop(evicted);
        assert_eq!(Arc::strong_count(&tracker), 2);
    }

    #[derive(Debug, Clone)]
    enum Op {
        TryPush(u32),
        Push(u32),
        Pop,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            any::<u32>().prop_map(Op::TryPush),
            any::<u32>().prop_map(Op::Push),
            Just(Op::Pop),
        ]
    }

    proptest! {
        #[test]
        fn test_matches_vecdeque_model(ops in proptest::collection::vec(op_strategy(), 0..300)) {
            const CAPACITY: usize = 5;
            let queue = LockFreeQueue::<u32, CAPACITY>::new();
            let mut model = VecDeque::new();

            for op in ops {
                match op {
                    Op::TryPush(value) => {
                        let result = queue.try_push(value);
                        if model.len() < CAPACITY {
                            model.push_back(value);
                            prop_assert_eq!(result, Ok(()));
                        } else {
                            prop_assert_eq!(result, Err(value));
                        }
                    }
                    Op::Push(value) => {
                        let expected = if model.len() == CAPACITY {
                            model.pop_front()
                        } else {
                            None
                        };
                        model.push_back(value);
                        prop_assert_eq!(queue.push(value), expected);
                    }
                    Op::Pop => {
                        prop_assert_eq!(queue.pop(), model.pop_front());
                    }
                }
                prop_assert_eq!(queue.size(), model.len());
                prop_assert_eq!(queue.is_empty(), model.is_empty());
            }
        }
    }
}
