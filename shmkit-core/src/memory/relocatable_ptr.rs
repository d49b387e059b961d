// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Offset-based pointer for structures living in shared memory.
//!
//! The pointer stores `address(pointee) - address(self)`. As long as the
//! pointer and its pointee keep the same distance (same segment, same layout)
//! it resolves correctly no matter where the segment is mapped or copied to.
//!
//! A Rust move of a `RelocatablePtr` is a bitwise copy of its storage, i.e. a
//! raw relocation. That is only valid when the pointee moves along with it,
//! which is why the type is not `Clone`: use [`RelocatablePtr::assign_from`]
//! and [`RelocatablePtr::take_from`] to copy or move between locations.

use std::fmt;
use std::marker::PhantomData;
use std::ptr;

/// Offset value reserved for the null pointer.
///
/// Two addresses in one mapping are never `isize::MIN` bytes apart.
pub const NULL_OFFSET: isize = isize::MIN;

/// Pointer that remains valid under relocation of its enclosing memory.
#[repr(transparent)]
pub struct RelocatablePtr<T> {
    offset: isize,
    _marker: PhantomData<*const T>,
}

// SAFETY: the pointer only hands out shared access unless the caller uses the
// unsafe accessors, which carry their own contract. Same rules as `&T`.
unsafe impl<T: Sync> Send for RelocatablePtr<T> {}
// SAFETY: see above.
unsafe impl<T: Sync> Sync for RelocatablePtr<T> {}

impl<T> RelocatablePtr<T> {
    /// Create a null pointer.
    pub const fn null() -> Self {
        Self {
            offset: NULL_OFFSET,
            _marker: PhantomData,
        }
    }

    #[inline]
    fn self_addr(&self) -> isize {
        self as *const Self as isize
    }

    #[inline]
    fn offset_to(&self, target: *const T) -> isize {
        if target.is_null() {
            NULL_OFFSET
        } else {
            (target as isize).wrapping_sub(self.self_addr())
        }
    }

    /// Point at `target`, measured from where this pointer is stored right now.
    pub fn set(&mut self, target: *const T) {
        self.offset = self.offset_to(target);
    }

    /// Reset to null.
    pub fn set_null(&mut self) {
        self.offset = NULL_OFFSET;
    }

    /// Resolve the pointee address for the current location of this pointer.
    #[inline]
    pub fn get(&self) -> *const T {
        if self.offset == NULL_OFFSET {
            ptr::null()
        } else {
            self.self_addr().wrapping_add(self.offset) as *const T
        }
    }

    /// Mutable variant of [`RelocatablePtr::get`].
    #[inline]
    pub fn get_mut(&self) -> *mut T {
        self.get() as *mut T
    }

    pub fn is_null(&self) -> bool {
        self.offset == NULL_OFFSET
    }

    /// Raw stored offset. Identical in every mapping of the same segment.
    pub fn offset(&self) -> isize {
        self.offset
    }

    /// Copy semantics: make `self` point where `other` points.
    pub fn assign_from(&mut self, other: &RelocatablePtr<T>) {
        self.set(other.get());
    }

    /// Move semantics: take over `other`'s pointee and null `other`.
    pub fn take_from(&mut self, other: &mut RelocatablePtr<T>) {
        let target = other.get();
        other.set_null();
        self.set(target);
    }

    /// Borrow the pointee.
    ///
    /// # Safety
    /// The pointee must be a live, properly aligned `T` for `'a`, and no
    /// mutable access to it may exist for that duration.
    pub unsafe fn as_ref<'a>(&self) -> Option<&'a T> {
        self.get().as_ref()
    }

    /// Mutably borrow the pointee.
    ///
    /// # Safety
    /// The pointee must be a live, properly aligned `T` for `'a`, and the
    /// caller must guarantee exclusive access to it for that duration.
    pub unsafe fn as_mut<'a>(&self) -> Option<&'a mut T> {
        self.get_mut().as_mut()
    }
}

impl<T> Default for RelocatablePtr<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> PartialEq for RelocatablePtr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.get() == other.get()
    }
}

impl<T> Eq for RelocatablePtr<T> {}

impl<T> PartialEq<*const T> for RelocatablePtr<T> {
    fn eq(&self, other: &*const T) -> bool {
        self.get() == *other
    }
}

impl<T> fmt::Debug for RelocatablePtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return f.write_str("RelocatablePtr(null)");
        }
        f.debug_struct("RelocatablePtr")
            .field("offset", &self.offset)
            .field("target", &self.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C)]
    struct Node {
        data: u32,
        ptr: RelocatablePtr<u32>,
    }

    #[test]
    fn test_default_is_null() {
        let rp: RelocatablePtr<u32> = RelocatablePtr::default();
        assert!(rp.is_null());
        assert!(rp.get().is_null());
        assert_eq!(rp.offset(), NULL_OFFSET);
    }

    #[test]
    fn test_set_and_get() {
        let value = 42u32;
        let mut rp = RelocatablePtr::null();
        rp.set(&value);

        assert!(!rp.is_null());
        assert_eq!(rp.get(), &value as *const u32);
        assert_eq!(unsafe { rp.as_ref() }, Some(&42));
    }

    #[test]
    fn test_set_null_pointer_gives_null() {
        let value = 1u32;
        let mut rp = RelocatablePtr::null();
        rp.set(&value);
        rp.set(ptr::null());
        assert!(rp.is_null());
    }

    #[test]
    fn test_assign_from_recomputes_offset() {
        let value = 7u32;
        let mut first = RelocatablePtr::null();
        first.set(&value);

        let mut second = RelocatablePtr::null();
        second.assign_from(&first);

        assert_eq!(first.get(), second.get());
        assert_ne!(first.offset(), second.offset());
    }

    #[test]
    fn test_take_from_nulls_source() {
        let value = 7u32;
        let mut source = RelocatablePtr::null();
        source.set(&value);

        let mut dest = RelocatablePtr::null();
        dest.take_from(&mut source);

        assert!(source.is_null());
        assert_eq!(dest.get(), &value as *const u32);
    }

    #[test]
    fn test_take_from_null_source() {
        let value = 3u32;
        let mut source: RelocatablePtr<u32> = RelocatablePtr::null();
        let mut dest = RelocatablePtr::null();
        dest.set(&value);

        dest.take_from(&mut source);
        assert!(dest.is_null());
        assert!(source.is_null());
    }

    #[test]
    fn test_equality() {
        let a = 1u32;
        let b = 2u32;
        let mut pa = RelocatablePtr::null();
        let mut pa2 = RelocatablePtr::null();
        let mut pb = RelocatablePtr::null();
        pa.set(&a);
        pa2.set(&a);
        pb.set(&b);

        assert_eq!(pa, pa2);
        assert_ne!(pa, pb);
        assert!(pa == (&a as *const u32));
        assert_eq!(RelocatablePtr::<u32>::null(), RelocatablePtr::null());
        assert_ne!(pa, RelocatablePtr::null());
    }

    #[test]
    fn test_mutation_through_pointer() {
        let mut value = 10u32;
        let mut rp = RelocatablePtr::null();
        rp.set(ptr::addr_of_mut!(value));

        unsafe {
            if let Some(v) = rp.as_mut() {
                *v = 11;
            }
        }
        assert_eq!(value, 11);
        value += 1;
        assert_eq!(value, 12);
    }

    #[test]
    fn test_relocation_by_bitwise_copy() {
        let mut source = Box::new(Node {
            data: 37,
            ptr: RelocatablePtr::null(),
        });
        let target: *const u32 = &source.data;
        source.ptr.set(target);
        assert_eq!(unsafe { source.ptr.as_ref() }, Some(&37));

        // Bitwise copy of the whole node into a different allocation.
        let mut dest: Box<Node> = Box::new(unsafe { ptr::read(&*source) });
        source.data = 0;

        assert_eq!(dest.ptr.offset(), source.ptr.offset());
        assert_eq!(dest.ptr.get(), &dest.data as *const u32);
        assert_eq!(unsafe { dest.ptr.as_ref() }, Some(&37));

        dest.data = 73;
        assert_eq!(unsafe { dest.ptr.as_ref() }, Some(&73));
        assert_eq!(source.data, 0);
    }

    #[test]
    fn test_debug_output() {
        let rp: RelocatablePtr<u8> = RelocatablePtr::null();
        assert_eq!(format!("{:?}", rp), "RelocatablePtr(null)");
    }
}
