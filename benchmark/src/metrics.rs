// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Summary statistics for latency samples and transfer throughput.

use std::fmt;
use std::time::Duration;

/// Latency metrics with percentile distribution.
#[derive(Debug, Clone, Default)]
pub struct LatencyMetrics {
    /// Minimum observed latency in nanoseconds
    pub min_ns: u64,
    /// Maximum observed latency in nanoseconds
    pub max_ns: u64,
    /// Arithmetic mean latency in nanoseconds
    pub mean_ns: f64,
    /// Median (p50) latency in nanoseconds
    pub median_ns: u64,
    /// 99th percentile latency in nanoseconds
    pub p99_ns: u64,
    /// 99.9th percentile latency in nanoseconds
    pub p999_ns: u64,
    /// Standard deviation in nanoseconds
    pub std_dev_ns: f64,
}

impl LatencyMetrics {
    /// Calculate metrics from a vector of latency samples (in nanoseconds).
    pub fn from_samples(mut samples: Vec<u64>) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        samples.sort_unstable();
        let len = samples.len();
        let percentile = |p: f64| samples[((len as f64 * p) as usize).min(len - 1)];

        let sum: u64 = samples.iter().sum();
        let mean_ns = sum as f64 / len as f64;
        let variance: f64 = samples
            .iter()
            .map(|&x| {
                let diff = x as f64 - mean_ns;
                diff * diff
            })
            .sum::<f64>()
            / len as f64;

        Self {
            min_ns: samples[0],
            max_ns: samples[len - 1],
            mean_ns,
            median_ns: percentile(0.5),
            p99_ns: percentile(0.99),
            p999_ns: percentile(0.999),
            std_dev_ns: variance.sqrt(),
        }
    }

    /// Format latency in human-readable form (auto-selects ns/μs/ms).
    pub fn format_latency(ns: u64) -> String {
        if ns < 1_000 {
            format!("{}ns", ns)
        } else if ns < 1_000_000 {
            format!("{:.2}μs", ns as f64 / 1_000.0)
        } else if ns < 1_000_000_000 {
            format!("{:.2}ms", ns as f64 / 1_000_000.0)
        } else {
            format!("{:.2}s", ns as f64 / 1_000_000_000.0)
        }
    }
}

impl fmt::Display for LatencyMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "p50 {} / p99 {} / p99.9 {} / max {}",
            Self::format_latency(self.median_ns),
            Self::format_latency(self.p99_ns),
            Self::format_latency(self.p999_ns),
            Self::format_latency(self.max_ns)
        )
    }
}

/// Throughput of a message transfer.
#[derive(Debug, Clone)]
pub struct ThroughputMetrics {
    /// Messages processed per second
    pub messages_per_sec: f64,
    /// Total messages processed
    pub total_messages: u64,
    /// Duration of the transfer in nanoseconds
    pub duration_ns: u64,
}

impl ThroughputMetrics {
    pub fn calculate(messages: u64, duration: Duration) -> Self {
        let secs = duration.as_secs_f64();
        Self {
            messages_per_sec: if secs > 0.0 {
                messages as f64 / secs
            } else {
                0.0
            },
            total_messages: messages,
            duration_ns: duration.as_nanos() as u64,
        }
    }
}

impl fmt::Display for ThroughputMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rate = self.messages_per_sec;
        if rate >= 1_000_000.0 {
            write!(f, "{:.2} M msg/s", rate / 1_000_000.0)
        } else if rate >= 1_000.0 {
            write!(f, "{:.2} K msg/s", rate / 1_000.0)
        } else {
            write!(f, "{:.2} msg/s", rate)
        }
    }
}
