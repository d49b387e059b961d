// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Pools of free buffer indices.
//!
//! Both pools keep their links in caller-provided index memory of
//! `size + 1` slots: slot `i` holds the index following `i` in the free list,
//! or the invalid marker `size + 1` while `i` is checked out. The marker is
//! what rejects a second return of the same index.
//!
//! The memory is referenced through a [`RelocatablePtr`], so a pool and its
//! index memory may be placed together into a shared segment. Because of
//! that, a pool must not move once initialized; `init` takes `Pin<&mut Self>`.

use std::marker::PhantomPinned;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crossbeam_utils::CachePadded;
use parking_lot::Mutex;

use crate::contract;
use crate::error::ContractViolation;
use crate::memory::RelocatablePtr;
use crate::types::BufferIndex;

/// Largest pool size: `size + 1` must still be a distinct invalid marker.
pub const MAX_FREE_LIST_SIZE: usize = (u32::MAX - 2) as usize;

/// Common contract of the lock-free and the mutex-guarded pool.
pub trait FreeIndexPool {
    /// Take an index out of the pool, `None` when it is exhausted.
    fn pop(&self) -> Option<BufferIndex>;

    /// Return a checked-out index.
    ///
    /// `false` when `index` is out of range or is not currently checked out.
    fn push(&self, index: BufferIndex) -> bool;

    /// Number of indices managed by the pool.
    fn size(&self) -> u32;
}

/// Number of `AtomicU32` slots a pool of `size` indices needs.
pub const fn required_index_memory_size(size: usize) -> usize {
    size + 1
}

fn validate_index_memory(memory: &[AtomicU32], size: usize) -> Result<(), ContractViolation> {
    if memory.is_empty() {
        return Err(ContractViolation::NullMemory);
    }
    if size == 0 {
        return Err(ContractViolation::ZeroSize);
    }
    if size > MAX_FREE_LIST_SIZE {
        return Err(ContractViolation::SizeOutOfRange {
            size,
            max: MAX_FREE_LIST_SIZE,
        });
    }
    let required = required_index_memory_size(size);
    if memory.len() < required {
        return Err(ContractViolation::MemoryTooSmall {
            provided: memory.len(),
            required,
        });
    }
    Ok(())
}

/// Link every index to its successor: `0 -> 1 -> ... -> size`.
fn link_all(memory: &[AtomicU32], size: usize) {
    for (i, slot) in memory.iter().take(size + 1).enumerate() {
        slot.store(i as u32 + 1, Ordering::Relaxed);
    }
}

#[inline]
const fn pack_head(index: u32, aba_counter: u32) -> u64 {
    ((aba_counter as u64) << 32) | index as u64
}

#[inline]
const fn unpack_head(head: u64) -> (u32, u32) {
    (head as u32, (head >> 32) as u32)
}

/// Lock-free free list.
///
/// The head packs the top index with a modification counter in a single
/// `AtomicU64`; every successful update bumps the counter, so a stale head
/// cannot be installed after the list changed underneath it.
#[repr(C)]
pub struct IndexFreeList {
    head: CachePadded<AtomicU64>,
    next_free_index: RelocatablePtr<AtomicU32>,
    size: u32,
    invalid_index: u32,
    _pinned: PhantomPinned,
}

impl IndexFreeList {
    /// An uninitialized list: `pop` yields `None`, `push` yields `false`.
    pub const fn new() -> Self {
        Self {
            head: CachePadded::new(AtomicU64::new(0)),
            next_free_index: RelocatablePtr::null(),
            size: 0,
            invalid_index: 1,
            _pinned: PhantomPinned,
        }
    }

    pub const fn required_index_memory_size(size: usize) -> usize {
        required_index_memory_size(size)
    }

    /// Initialize with every index in `[0, size)` free.
    ///
    /// A violated precondition is fatal; see [`IndexFreeList::try_init`].
    ///
    /// # Safety
    /// `memory` must outlive the list and keep its distance to it (both
    /// pinned, or both inside the same mapped segment).
    pub unsafe fn init(self: Pin<&mut Self>, memory: &[AtomicU32], size: usize) {
        if let Err(violation) = self.try_init(memory, size) {
            contract::fatal(violation);
        }
    }

    /// Checked initialization, reporting the violated precondition.
    ///
    /// # Safety
    /// Same as [`IndexFreeList::init`].
    pub unsafe fn try_init(
        self: Pin<&mut Self>,
        memory: &[AtomicU32],
        size: usize,
    ) -> Result<(), ContractViolation> {
        validate_index_memory(memory, size)?;
        link_all(memory, size);

        // SAFETY: no field is moved out of the pinned list.
        let this = self.get_unchecked_mut();
        this.size = size as u32;
        this.invalid_index = size as u32 + 1;
        this.next_free_index.set(memory.as_ptr());
        this.head.store(pack_head(0, 1), Ordering::Release);
        Ok(())
    }

    #[inline]
    fn next_free(&self, index: u32) -> &AtomicU32 {
        // SAFETY: callers check `index <= size`, and init guarantees
        // `size + 1` slots behind the pointer.
        unsafe { &*self.next_free_index.get().add(index as usize) }
    }
}

impl Default for IndexFreeList {
    fn default() -> Self {
        Self::new()
    }
}

impl FreeIndexPool for IndexFreeList {
    fn pop(&self) -> Option<BufferIndex> {
        let mut old_head = self.head.load(Ordering::Acquire);
        loop {
            let (index, aba_counter) = unpack_head(old_head);
            if index >= self.size {
                return None;
            }

            let next = self.next_free(index).load(Ordering::Relaxed);
            let new_head = pack_head(next, aba_counter.wrapping_add(1));

            match self.head.compare_exchange_weak(
                old_head,
                new_head,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.next_free(index)
                        .store(self.invalid_index, Ordering::Release);
                    return Some(index);
                }
                Err(actual) => old_head = actual,
            }
        }
    }

    fn push(&self, index: BufferIndex) -> bool {
        if index >= self.size {
            return false;
        }

        let mut old_head = self.head.load(Ordering::Acquire);

        // Claim the slot: only a checked-out index carries the invalid marker,
        // and only one returner can swap it away.
        let (head_index, _) = unpack_head(old_head);
        if self
            .next_free(index)
            .compare_exchange(
                self.invalid_index,
                head_index,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return false;
        }

        loop {
            let (head_index, aba_counter) = unpack_head(old_head);
            self.next_free(index).store(head_index, Ordering::Relaxed);
            let new_head = pack_head(index, aba_counter.wrapping_add(1));

            match self.head.compare_exchange_weak(
                old_head,
                new_head,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => old_head = actual,
            }
        }
    }

    fn size(&self) -> u32 {
        self.size
    }
}

/// Mutex-guarded free list with the same contract as [`IndexFreeList`].
///
/// The lock is process-local; use it where lock-freedom is unnecessary and
/// all users share one address space.
#[repr(C)]
pub struct LockedIndexFreeList {
    head: Mutex<u32>,
    next_free_index: RelocatablePtr<AtomicU32>,
    size: u32,
    invalid_index: u32,
    _pinned: PhantomPinned,
}

impl LockedIndexFreeList {
    pub fn new() -> Self {
        Self {
            head: Mutex::new(0),
            next_free_index: RelocatablePtr::null(),
            size: 0,
            invalid_index: 1,
            _pinned: PhantomPinned,
        }
    }

    /// See [`IndexFreeList::init`].
    ///
    /// # Safety
    /// Same as [`IndexFreeList::init`].
    pub unsafe fn init(self: Pin<&mut Self>, memory: &[AtomicU32], size: usize) {
        if let Err(violation) = self.try_init(memory, size) {
            contract::fatal(violation);
        }
    }

    /// # Safety
    /// Same as [`IndexFreeList::init`].
    pub unsafe fn try_init(
        self: Pin<&mut Self>,
        memory: &[AtomicU32],
        size: usize,
    ) -> Result<(), ContractViolation> {
        validate_index_memory(memory, size)?;
        link_all(memory, size);

        let this = self.get_unchecked_mut();
        this.size = size as u32;
        this.invalid_index = size as u32 + 1;
        this.next_free_index.set(memory.as_ptr());
        *this.head.get_mut() = 0;
        Ok(())
    }

    #[inline]
    fn next_free(&self, index: u32) -> &AtomicU32 {
        // SAFETY: see IndexFreeList::next_free.
        unsafe { &*self.next_free_index.get().add(index as usize) }
    }
}

impl Default for LockedIndexFreeList {
    fn default() -> Self {
        Self::new()
    }
}

impl FreeIndexPool for LockedIndexFreeList {
    fn pop(&self) -> Option<BufferIndex> {
        let mut head = self.head.lock();
        let index = *head;
        if index >= self.size {
            return None;
        }
        *head = self.next_free(index).load(Ordering::Relaxed);
        self.next_free(index)
            .store(self.invalid_index, Ordering::Relaxed);
        Some(index)
    }

    fn push(&self, index: BufferIndex) -> bool {
        if index >= self.size {
            return false;
        }
        let mut head = self.head.lock();
        if self.next_free(index).load(Ordering::Relaxed) != self.invalid_index {
            return false;
        }
        self.next_free(index).store(*head, Ordering::Relaxed);
        *head = index;
        true
    }

    fn size(&self) -> u32 {
        self.size
    }
}
