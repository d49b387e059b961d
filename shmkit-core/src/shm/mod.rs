// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Shared Memory module.
//!
//! POSIX shared memory mappings and in-place construction of the lock-free
//! structures inside them.

mod placement;
mod region;

pub use placement::{align_offset, ShmSafe};
pub use region::SharedMemoryRegion;
