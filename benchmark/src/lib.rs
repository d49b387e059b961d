// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! shmkit Benchmarking Framework
//!
//! Timing helpers shared by the criterion benches.
//!
//! # Benchmark Categories
//!
//! - **Queues**: single-threaded push/pop and multi-threaded MPMC throughput
//!   of the lock-free queues against a mutex-guarded baseline
//! - **Primitives**: index free lists and relocatable pointer dereference

pub mod harness;
pub mod metrics;

pub use harness::{BenchmarkHarness, ConcurrentQueue, MpmcRun, MutexQueue};
pub use metrics::{LatencyMetrics, ThroughputMetrics};
