// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Index with a cycle counter, packed into one `u64`.
//!
//! A value `v` encodes `index = v % N` and `cycle = v / N`. Incrementing past
//! the last index of a cycle moves to index 0 of the next cycle; the largest
//! representable cycle wraps back to cycle 0.

/// Cycle-tagged index into a ring of `N` cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CyclicIndex<const N: usize> {
    value: u64,
}

impl<const N: usize> CyclicIndex<N> {
    const CAPACITY: u64 = {
        assert!(N > 0, "ring capacity must be positive");
        N as u64
    };

    /// Largest cycle such that every index of it is representable.
    pub(crate) const MAX_CYCLE: u64 = u64::MAX / Self::CAPACITY - 1;

    /// Largest encoded value; incrementing it wraps to zero.
    pub(crate) const MAX_VALUE: u64 = (Self::MAX_CYCLE + 1) * Self::CAPACITY - 1;

    pub(crate) const fn new(index: u64, cycle: u64) -> Self {
        Self {
            value: cycle * Self::CAPACITY + index,
        }
    }

    pub(crate) const fn from_raw(value: u64) -> Self {
        Self { value }
    }

    pub(crate) const fn raw(self) -> u64 {
        self.value
    }

    pub(crate) const fn index(self) -> u64 {
        self.value % Self::CAPACITY
    }

    pub(crate) const fn cycle(self) -> u64 {
        self.value / Self::CAPACITY
    }

    /// The following position (next index, possibly next cycle).
    pub(crate) const fn next(self) -> Self {
        if self.value == Self::MAX_VALUE {
            Self { value: 0 }
        } else {
            Self {
                value: self.value + 1,
            }
        }
    }

    /// True if `self` is in the cycle directly preceding `other`'s.
    pub(crate) const fn is_one_cycle_behind(self, other: Self) -> bool {
        let cycle = self.cycle();
        let next_cycle = if cycle == Self::MAX_CYCLE { 0 } else { cycle + 1 };
        next_cycle == other.cycle()
    }

    /// Signed number of increments from `self` to `later`.
    ///
    /// Wrap-aware: a distance beyond half the value range is read as negative.
    pub(crate) fn distance_to(self, later: Self) -> i64 {
        let modulus = Self::MAX_VALUE as u128 + 1;
        let forward = (later.value as u128 + modulus - self.value as u128) % modulus;
        if forward > modulus / 2 {
            let backward = modulus - forward;
            -(backward.min(i64::MAX as u128) as i64)
        } else {
            forward.min(i64::MAX as u128) as i64
        }
    }
}
