//! Custom error types for shmkit.
//!
//! Every failure that can be recovered from is a typed enum variant. Running
//! out of capacity and losing a resize race are ordinary return values and
//! never show up here.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for shmkit.
#[derive(Debug, Error)]
pub enum ShmkitError {
    // =========================================================================
    // Configuration Errors - Fail-Fast on Invalid Config
    // =========================================================================
    #[error("Hard validation error: {0}")]
    HardValidation(#[from] HardValidationError),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String },

    // =========================================================================
    // Queue Errors
    // =========================================================================
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    // =========================================================================
    // Shared Memory Errors
    // =========================================================================
    #[error("Shared memory error: {0}")]
    SharedMemory(#[from] SharedMemoryError),

    // =========================================================================
    // System Errors
    // =========================================================================
    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Configuration that cannot be used to start a workload.
#[derive(Debug, Error)]
pub enum HardValidationError {
    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Capacity out of bounds: {capacity} (max: {max})")]
    CapacityOutOfBounds { capacity: u64, max: u64 },

    #[error("Segment size out of bounds: {size} bytes (min: {min}, max: {max})")]
    SegmentSizeOutOfBounds { size: usize, min: usize, max: usize },
}

/// Errors raised when building a queue.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Requested capacity {requested} exceeds maximum capacity {max}")]
    CapacityExceedsMaximum { requested: u64, max: u64 },
}

/// Shared memory errors.
#[derive(Debug, Error)]
pub enum SharedMemoryError {
    #[error("Failed to create shared memory region: {name} - {reason}")]
    CreateFailed { name: String, reason: String },

    #[error("Failed to map shared memory: {reason}")]
    MapFailed { reason: String },

    #[error("Object of {size} bytes at offset {offset} does not fit into region of {region_size} bytes")]
    OutOfBounds {
        offset: usize,
        size: usize,
        region_size: usize,
    },

    #[error("Offset {offset} is not aligned to {align} bytes")]
    Misaligned { offset: usize, align: usize },
}

/// Programmer errors that leave a shared structure unusable.
///
/// These are fatal: see [`crate::contract::fatal`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContractViolation {
    #[error("Index memory is null")]
    NullMemory,

    #[error("Free list size must not be zero")]
    ZeroSize,

    #[error("Free list size {size} exceeds the representable maximum {max}")]
    SizeOutOfRange { size: usize, max: usize },

    #[error("Index memory holds {provided} slots but {required} are required")]
    MemoryTooSmall { provided: usize, required: usize },

    #[error("Index {index} is outside the queue range [0, {capacity})")]
    IndexOutOfRange { index: u64, capacity: usize },
}

/// Result type alias using ShmkitError.
pub type ShmkitResult<T> = Result<T, ShmkitError>;
