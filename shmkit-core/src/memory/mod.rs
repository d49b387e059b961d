// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Relocatable addressing for shared memory.
//!
//! Pointer-bearing structures in a shared segment store offsets, not
//! addresses, so every process resolves them against its own mapping.

mod atomic_relocatable_ptr;
mod relocatable_ptr;

pub use atomic_relocatable_ptr::AtomicRelocatablePtr;
pub use relocatable_ptr::{RelocatablePtr, NULL_OFFSET};
