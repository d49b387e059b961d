// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Bounded lock-free MPMC FIFO of buffer indices.
//!
//! The queue stores indices in `[0, N)` only and is sized so that all of them
//! fit at once. Push can therefore never fail; pop fails only when empty.
//!
//! Cells and positions are [`CyclicIndex`] values. A cell is free for the
//! write position when it is exactly one cycle behind it, and holds a live
//! index for the read position when both are in the same cycle. Everything
//! is plain integers: no pointers, safe to place in shared memory.

use std::fmt;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::CachePadded;

use super::cyclic_index::CyclicIndex;
use crate::contract;
use crate::error::ContractViolation;
use crate::shm::ShmSafe;

/// Lock-free FIFO of indices in `[0, N)`.
#[repr(C)]
pub struct IndexQueue<const N: usize> {
    cells: [AtomicU64; N],
    read_position: CachePadded<AtomicU64>,
    write_position: CachePadded<AtomicU64>,
}

impl<const N: usize> IndexQueue<N> {
    /// Create a queue containing no indices.
    pub fn empty() -> Self {
        let mut slot = MaybeUninit::<Self>::uninit();
        // SAFETY: construct_at writes every field.
        unsafe {
            Self::construct_at(slot.as_mut_ptr(), false);
            slot.assume_init()
        }
    }

    /// Create a queue holding every index `0..N`, in ascending order.
    pub fn full() -> Self {
        let mut slot = MaybeUninit::<Self>::uninit();
        // SAFETY: construct_at writes every field.
        unsafe {
            Self::construct_at(slot.as_mut_ptr(), true);
            slot.assume_init()
        }
    }

    /// Construct the queue directly at `slot`.
    ///
    /// # Safety
    /// `slot` must be valid for writes and aligned for `Self`. No other
    /// thread may access it until this returns.
    pub unsafe fn construct_at(slot: *mut Self, full: bool) {
        let cells = ptr::addr_of_mut!((*slot).cells) as *mut AtomicU64;
        for i in 0..N {
            let value = if full {
                CyclicIndex::<N>::new(i as u64, 0)
            } else {
                CyclicIndex::<N>::new(0, 0)
            };
            cells.add(i).write(AtomicU64::new(value.raw()));
        }

        let read = if full {
            CyclicIndex::<N>::new(0, 0)
        } else {
            CyclicIndex::<N>::new(0, 1)
        };
        let write = CyclicIndex::<N>::new(0, 1);
        ptr::addr_of_mut!((*slot).read_position)
            .write(CachePadded::new(AtomicU64::new(read.raw())));
        ptr::addr_of_mut!((*slot).write_position)
            .write(CachePadded::new(AtomicU64::new(write.raw())));
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    #[inline]
    fn load_cell(&self, position: CyclicIndex<N>) -> CyclicIndex<N> {
        CyclicIndex::from_raw(self.cells[position.index() as usize].load(Ordering::Acquire))
    }

    #[inline]
    fn load_read_position(&self) -> CyclicIndex<N> {
        CyclicIndex::from_raw(self.read_position.load(Ordering::Acquire))
    }

    #[inline]
    fn load_write_position(&self) -> CyclicIndex<N> {
        CyclicIndex::from_raw(self.write_position.load(Ordering::Acquire))
    }

    /// Append `index`.
    ///
    /// Never fails: the queue has room for every distinct index. Pushing an
    /// index that is already queued breaks that guarantee and is a bug in the
    /// caller. An index outside `[0, N)` would alias a later cycle and leave
    /// readers spinning, so it is a fatal contract violation.
    pub fn push(&self, index: u64) {
        if index >= N as u64 {
            contract::fatal(ContractViolation::IndexOutOfRange {
                index,
                capacity: N,
            });
        }

        let mut write_position = self.load_write_position();
        let mut old_value = self.load_cell(write_position);
        loop {
            if old_value.is_one_cycle_behind(write_position) {
                // Cell is free in this cycle: try to publish.
                let new_value = CyclicIndex::<N>::new(index, write_position.cycle());
                match self.cells[write_position.index() as usize].compare_exchange_weak(
                    old_value.raw(),
                    new_value.raw(),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => break,
                    Err(actual) => old_value = CyclicIndex::from_raw(actual),
                }
            }

            if old_value.cycle() == write_position.cycle() {
                // Another push published here but has not advanced the write
                // position yet. Help it along.
                write_position = match self.write_position.compare_exchange(
                    write_position.raw(),
                    write_position.next().raw(),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => write_position.next(),
                    Err(actual) => CyclicIndex::from_raw(actual),
                };
            } else {
                // Stale write position.
                write_position = self.load_write_position();
            }
            old_value = self.load_cell(write_position);
        }

        // Failure only means someone helped already.
        let _ = self.write_position.compare_exchange(
            write_position.raw(),
            write_position.next().raw(),
            Ordering::AcqRel,
            Ordering::Relaxed,
        );
    }

    /// Remove the oldest index, or `None` if the queue is empty.
    pub fn pop(&self) -> Option<u64> {
        let mut read_position = self.load_read_position();
        loop {
            let value = self.load_cell(read_position);

            if value.cycle() == read_position.cycle() {
                match self.read_position.compare_exchange_weak(
                    read_position.raw(),
                    read_position.next().raw(),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => return Some(value.index()),
                    Err(actual) => read_position = CyclicIndex::from_raw(actual),
                }
            } else if value.is_one_cycle_behind(read_position) {
                return None;
            } else {
                read_position = self.load_read_position();
            }
        }
    }

    /// Remove the oldest index only if the queue holds all `N` indices.
    ///
    /// No retry: if a concurrent pop makes the queue non-full this returns
    /// `None` and the caller decides whether to try again.
    pub fn pop_if_full(&self) -> Option<u64> {
        let write_position = self.load_write_position();
        let read_position = self.load_read_position();
        let value = self.load_cell(read_position);

        let is_full = write_position.index() == read_position.index()
            && read_position.is_one_cycle_behind(write_position);

        if is_full && value.cycle() == read_position.cycle() {
            let claimed = self
                .read_position
                .compare_exchange(
                    read_position.raw(),
                    read_position.next().raw(),
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                )
                .is_ok();
            if claimed {
                return Some(value.index());
            }
        }
        None
    }

    /// Remove the oldest index only if at least `min_size` indices are queued.
    pub fn pop_if_size_is_at_least(&self, min_size: u64) -> Option<u64> {
        if min_size == 0 {
            return self.pop();
        }

        let write_position = self.load_write_position();
        let read_position = self.load_read_position();

        // Positions are loaded separately, so a negative distance is possible
        // and tells us nothing.
        let delta = read_position.distance_to(write_position);
        if delta < 0 || (delta as u64) < min_size {
            return None;
        }

        let value = self.load_cell(read_position);
        if value.cycle() != read_position.cycle() {
            return None;
        }

        self.read_position
            .compare_exchange(
                read_position.raw(),
                read_position.next().raw(),
                Ordering::AcqRel,
                Ordering::Relaxed,
            )
            .ok()
            .map(|_| value.index())
    }

    /// Snapshot emptiness check; may be stale by the time it returns.
    pub fn is_empty(&self) -> bool {
        let read_position = self.load_read_position();
        self.load_cell(read_position)
            .is_one_cycle_behind(read_position)
    }
}

impl<const N: usize> fmt::Debug for IndexQueue<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexQueue")
            .field("capacity", &N)
            .field("is_empty", &self.is_empty())
            .finish()
    }
}

// SAFETY: plain atomics, no pointers. Placement yields an empty queue.
unsafe impl<const N: usize> ShmSafe for IndexQueue<N> {
    unsafe fn init_in_place(slot: *mut Self) {
        IndexQueue::construct_at(slot, false);
    }
}
