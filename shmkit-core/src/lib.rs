//! shmkit Core Library
//!
//! Lock-free building blocks for inter-process communication over shared
//! memory: index free lists, bounded MPMC queues with fixed or resizeable
//! capacity, and pointers that survive being mapped at different addresses.
//! Also provides the shared memory mapping they are placed into and the
//! configuration used by the `shmkit` tool.

pub mod concurrent;
pub mod config;
pub mod contract;
pub mod error;
pub mod memory;
pub mod shm;
pub mod types;

// Re-export commonly used types
pub use concurrent::{
    FreeIndexPool, IndexFreeList, IndexQueue, LockFreeQueue, LockedIndexFreeList,
    ResizeableLockFreeQueue,
};
pub use config::{Config, ConfigLoader, QueueConfig, SegmentConfig, WorkloadConfig};
pub use error::{
    ContractViolation, HardValidationError, QueueError, SharedMemoryError, ShmkitError,
    ShmkitResult,
};
pub use memory::{AtomicRelocatablePtr, RelocatablePtr};
pub use shm::{SharedMemoryRegion, ShmSafe};
pub use types::{BufferIndex, OverflowPolicy, SegmentName};
