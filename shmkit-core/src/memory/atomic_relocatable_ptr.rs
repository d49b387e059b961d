// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Atomic flavour of [`RelocatablePtr`](super::RelocatablePtr).
//!
//! The offset lives in an `AtomicIsize`. There is no copy or move API: an
//! atomic in shared memory is only ever addressed in place.

use std::fmt;
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicIsize, Ordering};

use super::relocatable_ptr::NULL_OFFSET;

/// Relocatable pointer with atomic load, store and compare-exchange.
#[repr(transparent)]
pub struct AtomicRelocatablePtr<T> {
    offset: AtomicIsize,
    _marker: PhantomData<*const T>,
}

// SAFETY: all state is a single atomic; pointee access rules are the same as
// for `&T`.
unsafe impl<T: Sync> Send for AtomicRelocatablePtr<T> {}
// SAFETY: see above.
unsafe impl<T: Sync> Sync for AtomicRelocatablePtr<T> {}

impl<T> AtomicRelocatablePtr<T> {
    pub const fn null() -> Self {
        Self {
            offset: AtomicIsize::new(NULL_OFFSET),
            _marker: PhantomData,
        }
    }

    #[inline]
    fn self_addr(&self) -> isize {
        self as *const Self as isize
    }

    #[inline]
    fn to_offset(&self, target: *const T) -> isize {
        if target.is_null() {
            NULL_OFFSET
        } else {
            (target as isize).wrapping_sub(self.self_addr())
        }
    }

    #[inline]
    fn from_offset(&self, offset: isize) -> *const T {
        if offset == NULL_OFFSET {
            ptr::null()
        } else {
            self.self_addr().wrapping_add(offset) as *const T
        }
    }

    /// Load the current pointee address.
    #[inline]
    pub fn load(&self, order: Ordering) -> *const T {
        self.from_offset(self.offset.load(order))
    }

    /// Store a new pointee address (null allowed).
    #[inline]
    pub fn store(&self, target: *const T, order: Ordering) {
        self.offset.store(self.to_offset(target), order);
    }

    /// Replace `current` with `new` if the pointer still resolves to `current`.
    ///
    /// On failure returns the address actually stored.
    pub fn compare_exchange(
        &self,
        current: *const T,
        new: *const T,
        success: Ordering,
        failure: Ordering,
    ) -> Result<*const T, *const T> {
        self.offset
            .compare_exchange(
                self.to_offset(current),
                self.to_offset(new),
                success,
                failure,
            )
            .map(|offset| self.from_offset(offset))
            .map_err(|offset| self.from_offset(offset))
    }

    pub fn is_null(&self, order: Ordering) -> bool {
        self.offset.load(order) == NULL_OFFSET
    }
}

impl<T> Default for AtomicRelocatablePtr<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> fmt::Debug for AtomicRelocatablePtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtomicRelocatablePtr")
            .field(&self.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    struct Slots {
        values: [u64; 4],
        current: AtomicRelocatablePtr<u64>,
    }

    #[test]
    fn test_null_by_default() {
        let p: AtomicRelocatablePtr<u64> = AtomicRelocatablePtr::default();
        assert!(p.is_null(Ordering::Acquire));
        assert!(p.load(Ordering::Acquire).is_null());
    }

    #[test]
    fn test_store_and_load() {
        let value = 5u64;
        let p = AtomicRelocatablePtr::null();
        p.store(&value, Ordering::Release);
        assert_eq!(p.load(Ordering::Acquire), &value as *const u64);

        p.store(ptr::null(), Ordering::Release);
        assert!(p.is_null(Ordering::Acquire));
    }

    #[test]
    fn test_compare_exchange() {
        let a = 1u64;
        let b = 2u64;
        let p = AtomicRelocatablePtr::null();

        assert_eq!(
            p.compare_exchange(ptr::null(), &a, Ordering::AcqRel, Ordering::Acquire),
            Ok(ptr::null())
        );
        // Stale expectation fails and reports the stored pointer.
        assert_eq!(
            p.compare_exchange(&b, &b, Ordering::AcqRel, Ordering::Acquire),
            Err(&a as *const u64)
        );
        assert_eq!(
            p.compare_exchange(&a, &b, Ordering::AcqRel, Ordering::Acquire),
            Ok(&a as *const u64)
        );
        assert_eq!(p.load(Ordering::Acquire), &b as *const u64);
    }

    #[test]
    fn test_concurrent_stores_resolve_to_valid_slot() {
        let slots = Arc::new(Slots {
            values: [10, 20, 30, 40],
            current: AtomicRelocatablePtr::null(),
        });

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let slots = Arc::clone(&slots);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        slots.current.store(&slots.values[i], Ordering::Release);
                        let seen = slots.current.load(Ordering::Acquire);
                        let seen = unsafe { *seen };
                        assert!(slots.values.contains(&seen));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let last = unsafe { *slots.current.load(Ordering::Acquire) };
        assert!(slots.values.contains(&last));
    }
}
