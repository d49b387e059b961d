// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `shmkit layout` command - Print the binary layout of shared structures.
//!
//! Every process attaching to a segment must agree on these numbers.

use std::mem::{align_of, size_of};
use std::sync::atomic::AtomicU32;

use shmkit_core::concurrent::required_index_memory_size;
use shmkit_core::{
    AtomicRelocatablePtr, IndexFreeList, IndexQueue, LockFreeQueue, LockedIndexFreeList,
    RelocatablePtr,
};

use crate::message::Message;
use crate::stress::{StressQueue, QUEUE_CAPACITY};

struct Row {
    name: String,
    size: usize,
    align: usize,
}

fn row<T>(name: impl Into<String>) -> Row {
    Row {
        name: name.into(),
        size: size_of::<T>(),
        align: align_of::<T>(),
    }
}

fn rows() -> Vec<Row> {
    let n = QUEUE_CAPACITY;
    vec![
        row::<Message>("Message"),
        row::<IndexQueue<QUEUE_CAPACITY>>(format!("IndexQueue<{}>", n)),
        row::<LockFreeQueue<Message, QUEUE_CAPACITY>>(format!("LockFreeQueue<Message, {}>", n)),
        row::<StressQueue>(format!("ResizeableLockFreeQueue<Message, {}>", n)),
        row::<IndexFreeList>("IndexFreeList"),
        row::<LockedIndexFreeList>("LockedIndexFreeList"),
        Row {
            name: format!("IndexFreeList memory ({} indices)", n),
            size: required_index_memory_size(n) * size_of::<AtomicU32>(),
            align: align_of::<AtomicU32>(),
        },
        row::<RelocatablePtr<u8>>("RelocatablePtr<T>"),
        row::<AtomicRelocatablePtr<u8>>("AtomicRelocatablePtr<T>"),
    ]
}

pub fn execute() -> Result<(), Box<dyn std::error::Error>> {
    let rows = rows();
    let width = rows.iter().map(|r| r.name.len()).max().unwrap_or(0);

    println!("{:<width$}  {:>10}  {:>6}", "Structure", "Size", "Align", width = width);
    for r in &rows {
        println!(
            "{:<width$}  {:>10}  {:>6}",
            r.name,
            r.size,
            r.align,
            width = width
        );
    }
    Ok(())
}
