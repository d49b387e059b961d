// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Benchmark harness for running and timing operations.
//!
//! Single-threaded latency sampling plus a multi-threaded producer/consumer
//! driver that works with any [`ConcurrentQueue`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use shmkit_core::{LockFreeQueue, ResizeableLockFreeQueue};

/// A benchmark harness for measuring operation latency.
pub struct BenchmarkHarness {
    /// Number of warmup iterations before measurement
    warmup_iterations: u64,
    /// Number of measurement iterations
    measurement_iterations: u64,
}

impl BenchmarkHarness {
    /// Create a new benchmark harness with default settings.
    pub fn new() -> Self {
        Self {
            warmup_iterations: 10,
            measurement_iterations: 100,
        }
    }

    /// Set the number of warmup iterations.
    pub fn warmup(mut self, iterations: u64) -> Self {
        self.warmup_iterations = iterations;
        self
    }

    /// Set the number of measurement iterations.
    pub fn iterations(mut self, iterations: u64) -> Self {
        self.measurement_iterations = iterations;
        self
    }

    /// Run a benchmark and collect latency samples.
    ///
    /// The closure should perform a single iteration of the operation being measured.
    /// Returns a vector of latency samples in nanoseconds.
    pub fn run<F>(&self, mut operation: F) -> Vec<u64>
    where
        F: FnMut(),
    {
        // Warmup phase
        for _ in 0..self.warmup_iterations {
            operation();
        }

        // Measurement phase
        let mut samples = Vec::with_capacity(self.measurement_iterations as usize);
        for _ in 0..self.measurement_iterations {
            let start = Instant::now();
            operation();
            samples.push(start.elapsed().as_nanos() as u64);
        }

        samples
    }

    /// Run a throughput benchmark for a fixed duration.
    ///
    /// Returns (total_operations, total_duration_ns).
    pub fn run_throughput<F>(&self, duration: Duration, mut operation: F) -> (u64, u64)
    where
        F: FnMut(),
    {
        for _ in 0..self.warmup_iterations {
            operation();
        }

        let start = Instant::now();
        let mut operations = 0u64;
        while start.elapsed() < duration {
            operation();
            operations += 1;
        }

        (operations, start.elapsed().as_nanos() as u64)
    }
}

impl Default for BenchmarkHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Bounded MPMC queue of `u64` as seen by the benchmarks.
pub trait ConcurrentQueue: Sync {
    /// Enqueue unless full.
    fn try_enqueue(&self, value: u64) -> bool;

    fn dequeue(&self) -> Option<u64>;
}

impl<const N: usize> ConcurrentQueue for LockFreeQueue<u64, N> {
    fn try_enqueue(&self, value: u64) -> bool {
        self.try_push(value).is_ok()
    }

    fn dequeue(&self) -> Option<u64> {
        self.pop()
    }
}

impl<const N: usize> ConcurrentQueue for ResizeableLockFreeQueue<u64, N> {
    fn try_enqueue(&self, value: u64) -> bool {
        self.try_push(value).is_ok()
    }

    fn dequeue(&self) -> Option<u64> {
        self.pop()
    }
}

/// Baseline: a `VecDeque` behind a mutex.
pub struct MutexQueue {
    inner: Mutex<VecDeque<u64>>,
    capacity: usize,
}

impl MutexQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }
}

impl ConcurrentQueue for MutexQueue {
    fn try_enqueue(&self, value: u64) -> bool {
        let mut inner = self.inner.lock();
        if inner.len() >= self.capacity {
            return false;
        }
        inner.push_back(value);
        true
    }

    fn dequeue(&self) -> Option<u64> {
        self.inner.lock().pop_front()
    }
}

/// One multi-producer/multi-consumer transfer.
#[derive(Debug, Clone, Copy)]
pub struct MpmcRun {
    pub producers: usize,
    pub consumers: usize,
    pub messages_per_producer: u64,
}

impl MpmcRun {
    pub fn total_messages(&self) -> u64 {
        self.producers as u64 * self.messages_per_producer
    }

    /// Push every message through `queue` and wait until all are consumed.
    ///
    /// Returns the sum of received values (for checking and to keep the
    /// work observable) and the wall time.
    pub fn execute<Q: ConcurrentQueue>(&self, queue: &Q) -> (u64, Duration) {
        let total = self.total_messages();
        let received = AtomicU64::new(0);
        let checksum = AtomicU64::new(0);
        let start = Instant::now();

        thread::scope(|scope| {
            for _ in 0..self.producers {
                scope.spawn(|| {
                    for value in 0..self.messages_per_producer {
                        while !queue.try_enqueue(value) {
                            std::hint::spin_loop();
                        }
                    }
                });
            }

            for _ in 0..self.consumers {
                scope.spawn(|| {
                    let mut local_sum = 0u64;
                    while received.load(Ordering::Relaxed) < total {
                        match queue.dequeue() {
                            Some(value) => {
                                local_sum = local_sum.wrapping_add(value);
                                received.fetch_add(1, Ordering::Relaxed);
                            }
                            None => std::hint::spin_loop(),
                        }
                    }
                    checksum.fetch_add(local_sum, Ordering::Relaxed);
                });
            }
        });

        (checksum.load(Ordering::Relaxed), start.elapsed())
    }

    /// Sum `execute` must return for a lossless transfer.
    pub fn expected_checksum(&self) -> u64 {
        let n = self.messages_per_producer;
        let per_producer = n.saturating_sub(1) * n / 2;
        per_producer * self.producers as u64
    }
}

/// Measure the execution time of a closure.
pub fn measure<F, T>(f: F) -> (T, Duration)
where
    F: FnOnce() -> T,
{
    let start = Instant::now();
    let result = f();
    let elapsed = start.elapsed();
    (result, elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_harness_basic() {
        let harness = BenchmarkHarness::new().warmup(5).iterations(20);

        let samples = harness.run(|| {
            thread::sleep(Duration::from_micros(100));
        });

        assert_eq!(samples.len(), 20);
        for sample in &samples {
            assert!(*sample >= 100_000, "Sample {} < 100μs", sample);
        }
    }

    #[test]
    fn test_measure() {
        let (result, duration) = measure(|| {
            thread::sleep(Duration::from_millis(5));
            42
        });

        assert_eq!(result, 42);
        assert!(duration >= Duration::from_millis(5));
    }

    #[test]
    fn test_mpmc_run_is_lossless() {
        let run = MpmcRun {
            producers: 3,
            consumers: 2,
            messages_per_producer: 2_000,
        };

        let lockfree = LockFreeQueue::<u64, 64>::new();
        assert_eq!(run.execute(&lockfree).0, run.expected_checksum());

        let resizeable = ResizeableLockFreeQueue::<u64, 64>::with_capacity(8).unwrap();
        assert_eq!(run.execute(&resizeable).0, run.expected_checksum());

        let baseline = MutexQueue::new(64);
        assert_eq!(run.execute(&baseline).0, run.expected_checksum());
    }

    #[test]
    fn test_mutex_queue_capacity() {
        let queue = MutexQueue::new(2);
        assert!(queue.try_enqueue(1));
        assert!(queue.try_enqueue(2));
        assert!(!queue.try_enqueue(3));
        assert_eq!(queue.dequeue(), Some(1));
    }
}
