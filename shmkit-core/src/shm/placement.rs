// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Placement of shared structures inside a [`SharedMemoryRegion`].
//!
//! Queue types are too large for the stack and must not be moved once other
//! processes can see them, so they are built directly in the mapping and
//! only ever handed out by reference.

use std::mem::{align_of, size_of};

use super::SharedMemoryRegion;
use crate::error::SharedMemoryError;

/// A type that may live in memory shared between processes.
///
/// # Safety
/// Implementors must hold no pointers to process-local memory, must be
/// usable at any mapping address, and must synchronize all shared access
/// through atomics.
pub unsafe trait ShmSafe: Sync + Sized {
    /// Construct a fresh instance at `slot`.
    ///
    /// # Safety
    /// `slot` must be valid for writes of `size_of::<Self>()` bytes and
    /// aligned for `Self`. No other thread or process may access it until
    /// this returns.
    unsafe fn init_in_place(slot: *mut Self);
}

impl SharedMemoryRegion {
    fn slot<S>(&self, offset: usize) -> Result<*mut S, SharedMemoryError> {
        let size = size_of::<S>();
        let end = offset.checked_add(size);
        if end.map_or(true, |end| end > self.size()) {
            return Err(SharedMemoryError::OutOfBounds {
                offset,
                size,
                region_size: self.size(),
            });
        }

        // The mapping is page aligned, so the offset decides alignment.
        let align = align_of::<S>();
        if offset % align != 0 {
            return Err(SharedMemoryError::Misaligned { offset, align });
        }

        // SAFETY: offset + size is within the mapping.
        Ok(unsafe { self.as_ptr().add(offset) } as *mut S)
    }

    /// Construct `S` at `offset` and return a reference to it.
    ///
    /// # Safety
    /// Nobody else may use the bytes at `offset..offset + size_of::<S>()`
    /// while this runs, and no reference to a previous object there may be
    /// alive.
    pub unsafe fn construct<S: ShmSafe>(&self, offset: usize) -> Result<&S, SharedMemoryError> {
        let slot = self.slot::<S>(offset)?;
        S::init_in_place(slot);
        tracing::debug!(
            offset = offset,
            size = size_of::<S>(),
            "Constructed shared structure"
        );
        Ok(&*slot)
    }

    /// Reference an `S` that another participant already constructed at
    /// `offset`.
    ///
    /// # Safety
    /// The bytes at `offset` must hold an `S` built by
    /// [`SharedMemoryRegion::construct`] (in any mapping of this segment)
    /// whose construction happened before this call.
    pub unsafe fn attach<S: ShmSafe>(&self, offset: usize) -> Result<&S, SharedMemoryError> {
        let slot = self.slot::<S>(offset)?;
        Ok(&*slot)
    }
}

/// Smallest offset at or after `offset` that is aligned for `S`.
pub const fn align_offset<S>(offset: usize) -> usize {
    let align = align_of::<S>();
    (offset + align - 1) / align * align
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrent::{IndexQueue, LockFreeQueue};

    #[test]
    fn test_construct_and_attach() {
        let region = SharedMemoryRegion::anonymous(64 * 1024).unwrap();

        let queue = unsafe { region.construct::<LockFreeQueue<u64, 16>>(0) }.unwrap();
        queue.try_push(7).unwrap();

        let attached = unsafe { region.attach::<LockFreeQueue<u64, 16>>(0) }.unwrap();
        assert_eq!(attached.size(), 1);
        assert_eq!(attached.pop(), Some(7));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_two_structures_side_by_side() {
        let region = SharedMemoryRegion::anonymous(64 * 1024).unwrap();

        let first = unsafe { region.construct::<IndexQueue<8>>(0) }.unwrap();
        let second_offset = align_offset::<IndexQueue<8>>(size_of::<IndexQueue<8>>());
        let second = unsafe { region.construct::<IndexQueue<8>>(second_offset) }.unwrap();

        first.push(1);
        second.push(2);
        assert_eq!(first.pop(), Some(1));
        assert_eq!(second.pop(), Some(2));
    }

    #[test]
    fn test_out_of_bounds() {
        let region = SharedMemoryRegion::anonymous(4096).unwrap();
        let err = unsafe { region.construct::<LockFreeQueue<u64, 1024>>(0) }.unwrap_err();
        assert!(matches!(err, SharedMemoryError::OutOfBounds { .. }));

        let err = unsafe { region.attach::<IndexQueue<4>>(usize::MAX) }.unwrap_err();
        assert!(matches!(err, SharedMemoryError::OutOfBounds { .. }));
    }

    #[test]
    fn test_misaligned() {
        let region = SharedMemoryRegion::anonymous(4096).unwrap();
        let err = unsafe { region.construct::<IndexQueue<4>>(1) }.unwrap_err();
        assert!(matches!(err, SharedMemoryError::Misaligned { offset: 1, .. }));
    }

    #[test]
    fn test_align_offset() {
        assert_eq!(align_offset::<u64>(0), 0);
        assert_eq!(align_offset::<u64>(1), 8);
        assert_eq!(align_offset::<u64>(16), 16);
        assert_eq!(align_offset::<u8>(3), 3);
    }
}
