// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Lock-free data structures built on integer indices.
//!
//! Nothing in here stores a raw pointer to shared state, so every structure
//! can be placed in a shared memory segment mapped at different addresses.

mod cyclic_index;
mod free_list;
mod index_queue;
mod lockfree_queue;
mod resizeable_queue;

pub use free_list::{
    required_index_memory_size, FreeIndexPool, IndexFreeList, LockedIndexFreeList,
    MAX_FREE_LIST_SIZE,
};
pub use index_queue::IndexQueue;
pub use lockfree_queue::LockFreeQueue;
pub use resizeable_queue::ResizeableLockFreeQueue;
