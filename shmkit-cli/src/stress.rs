// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Multi-threaded stress run against a resizeable queue in shared memory.
//!
//! Producers send checksummed, sequenced messages; consumers verify them.
//! At the end every message must be accounted for exactly once, either
//! popped by a consumer or evicted (by an overwriting push or by a capacity
//! decrease).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use shmkit_core::{
    Config, OverflowPolicy, ResizeableLockFreeQueue, SharedMemoryError, SharedMemoryRegion,
};
use thiserror::Error;

use crate::message::Message;

/// Physical capacity of the stress queue.
pub const QUEUE_CAPACITY: usize = 1024;

pub type StressQueue = ResizeableLockFreeQueue<Message, QUEUE_CAPACITY>;

#[derive(Debug, Error)]
pub enum StressError {
    #[error("Shared memory error: {0}")]
    SharedMemory(#[from] SharedMemoryError),

    #[error("Queue capacity 0 with overflow policy 'reject' can never accept a message")]
    UnsatisfiableCapacity,

    #[error("{count} messages failed checksum verification")]
    Corrupted { count: u64 },

    #[error("{count} messages arrived out of order")]
    Reordered { count: u64 },

    #[error("Messages lost or duplicated: pushed {pushed}, popped {popped}, evicted {evicted}")]
    Unbalanced { pushed: u64, popped: u64, evicted: u64 },
}

/// Outcome of a stress run.
#[derive(Debug, Clone, Default)]
pub struct StressReport {
    pub pushed: u64,
    pub popped: u64,
    pub evicted: u64,
    /// `try_push` attempts that found the queue full.
    pub rejected: u64,
    pub resizes: u64,
    pub corrupted: u64,
    pub reordered: u64,
    pub elapsed: Duration,
}

impl StressReport {
    /// Check integrity, ordering and conservation.
    pub fn verify(&self) -> Result<(), StressError> {
        if self.corrupted > 0 {
            return Err(StressError::Corrupted {
                count: self.corrupted,
            });
        }
        if self.reordered > 0 {
            return Err(StressError::Reordered {
                count: self.reordered,
            });
        }
        if self.pushed != self.popped + self.evicted {
            return Err(StressError::Unbalanced {
                pushed: self.pushed,
                popped: self.popped,
                evicted: self.evicted,
            });
        }
        Ok(())
    }

    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.popped as f64 / secs
        } else {
            0.0
        }
    }
}

#[derive(Default)]
struct Counters {
    pushed: AtomicU64,
    popped: AtomicU64,
    evicted: AtomicU64,
    rejected: AtomicU64,
    resizes: AtomicU64,
    corrupted: AtomicU64,
    reordered: AtomicU64,
}

impl Counters {
    fn record_evicted(&self, message: &Message) {
        if !message.is_intact() {
            self.corrupted.fetch_add(1, Ordering::Relaxed);
        }
        self.evicted.fetch_add(1, Ordering::Relaxed);
    }

    fn report(&self, elapsed: Duration) -> StressReport {
        StressReport {
            pushed: self.pushed.load(Ordering::Acquire),
            popped: self.popped.load(Ordering::Acquire),
            evicted: self.evicted.load(Ordering::Acquire),
            rejected: self.rejected.load(Ordering::Acquire),
            resizes: self.resizes.load(Ordering::Acquire),
            corrupted: self.corrupted.load(Ordering::Acquire),
            reordered: self.reordered.load(Ordering::Acquire),
            elapsed,
        }
    }
}

/// Map the segment: anonymous by default, or the configured named segment.
fn map_segment(config: &Config, named: bool) -> Result<SharedMemoryRegion, StressError> {
    let size = config.segment.size_bytes;
    let region = if named {
        SharedMemoryRegion::create(config.segment.name.as_str(), size)?
    } else {
        SharedMemoryRegion::anonymous(size)?
    };
    Ok(region)
}

/// Run the workload described by `config` to completion.
pub fn run(config: &Config, named: bool) -> Result<StressReport, StressError> {
    let initial_capacity = config.queue.initial_capacity as usize;
    if initial_capacity == 0 && config.queue.overflow == OverflowPolicy::Reject {
        return Err(StressError::UnsatisfiableCapacity);
    }

    let region = map_segment(config, named)?;
    // SAFETY: freshly mapped segment, nobody else has seen it yet.
    let queue: &StressQueue = unsafe { region.construct(0)? };
    queue.set_capacity(initial_capacity);

    tracing::info!(
        producers = config.workload.producers,
        consumers = config.workload.consumers,
        messages_per_producer = config.workload.messages_per_producer,
        capacity = initial_capacity,
        overflow = %config.queue.overflow,
        "Starting stress run"
    );

    let counters = Counters::default();
    let producers_done = AtomicUsize::new(0);
    let start = Instant::now();

    thread::scope(|scope| {
        for producer in 0..config.workload.producers {
            let counters = &counters;
            let producers_done = &producers_done;
            scope.spawn(move || {
                produce(queue, config, producer as u32, counters);
                producers_done.fetch_add(1, Ordering::AcqRel);
            });
        }

        for _ in 0..config.workload.consumers {
            let counters = &counters;
            let producers_done = &producers_done;
            scope.spawn(move || consume(queue, config, counters, producers_done));
        }
    });

    let report = counters.report(start.elapsed());
    tracing::info!(
        pushed = report.pushed,
        popped = report.popped,
        evicted = report.evicted,
        resizes = report.resizes,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "Stress run finished"
    );
    Ok(report)
}

fn produce(queue: &StressQueue, config: &Config, producer: u32, counters: &Counters) {
    for sequence in 0..config.workload.messages_per_producer {
        let message = Message::new(producer, sequence);
        match config.queue.overflow {
            OverflowPolicy::Evict => {
                if let Some(evicted) = queue.push(message) {
                    counters.record_evicted(&evicted);
                }
            }
            OverflowPolicy::Reject => {
                let mut message = message;
                while let Err(rejected) = queue.try_push(message) {
                    counters.rejected.fetch_add(1, Ordering::Relaxed);
                    message = rejected;
                    thread::yield_now();
                }
            }
        }
        counters.pushed.fetch_add(1, Ordering::Relaxed);
    }
}

fn consume(
    queue: &StressQueue,
    config: &Config,
    counters: &Counters,
    producers_done: &AtomicUsize,
) {
    let initial_capacity = config.queue.initial_capacity as usize;
    let shrunk_capacity = (initial_capacity / 2).max(1);
    let resize_every = config.workload.resize_every;
    let mut last_seen: HashMap<u32, u64> = HashMap::new();

    loop {
        let Some(message) = queue.pop() else {
            if producers_done.load(Ordering::Acquire) == config.workload.producers
                && queue.is_empty()
            {
                break;
            }
            thread::yield_now();
            continue;
        };

        if !message.is_intact() {
            counters.corrupted.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(previous) = last_seen.insert(message.producer(), message.sequence()) {
            if message.sequence() <= previous {
                counters.reordered.fetch_add(1, Ordering::Relaxed);
            }
        }

        let popped = counters.popped.fetch_add(1, Ordering::AcqRel) + 1;
        if resize_every > 0 && popped % resize_every == 0 {
            let target = if queue.capacity() == initial_capacity {
                shrunk_capacity
            } else {
                initial_capacity
            };
            // Losing the race to another consumer is fine.
            if queue.set_capacity_with(target, |evicted| counters.record_evicted(&evicted)) {
                counters.resizes.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
