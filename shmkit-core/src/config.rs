// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! YAML configuration parser with strict schema validation.
//!
//! Describes a shared segment, the queue placed in it and the workload that
//! drives the queue. Any invalid field results in a HardValidationError.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HardValidationError, ShmkitError, ShmkitResult};
use crate::shm::SharedMemoryRegion;
use crate::types::{OverflowPolicy, SegmentName};

/// Upper bound for producer and consumer thread counts.
pub const MAX_WORKERS: usize = 64;

/// Raw segment section as parsed from YAML (before validation).
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSegmentConfig {
    #[serde(default = "default_segment_name")]
    name: String,
    #[serde(default = "default_segment_size")]
    size_bytes: usize,
}

fn default_segment_name() -> String {
    "shmkit".to_string()
}

fn default_segment_size() -> usize {
    4 * 1024 * 1024 // 4MB
}

impl Default for RawSegmentConfig {
    fn default() -> Self {
        Self {
            name: default_segment_name(),
            size_bytes: default_segment_size(),
        }
    }
}

/// Raw queue section.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawQueueConfig {
    /// Defaults to the queue's maximum capacity.
    #[serde(default)]
    initial_capacity: Option<u64>,
    #[serde(default)]
    overflow: OverflowPolicy,
}

/// Raw workload section.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawWorkloadConfig {
    #[serde(default = "default_workers")]
    producers: usize,
    #[serde(default = "default_workers")]
    consumers: usize,
    #[serde(default = "default_messages_per_producer")]
    messages_per_producer: u64,
    #[serde(default)]
    resize_every: u64,
}

fn default_workers() -> usize {
    4
}

fn default_messages_per_producer() -> u64 {
    100_000
}

impl Default for RawWorkloadConfig {
    fn default() -> Self {
        Self {
            producers: default_workers(),
            consumers: default_workers(),
            messages_per_producer: default_messages_per_producer(),
            resize_every: 0,
        }
    }
}

/// Raw root configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    segment: RawSegmentConfig,
    #[serde(default)]
    queue: RawQueueConfig,
    #[serde(default)]
    workload: RawWorkloadConfig,
}

/// Validated segment configuration.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentConfig {
    pub name: SegmentName,
    pub size_bytes: usize,
}

/// Validated queue configuration.
#[derive(Debug, Clone, Serialize)]
pub struct QueueConfig {
    pub initial_capacity: u64,
    pub overflow: OverflowPolicy,
}

/// Validated workload configuration.
#[derive(Debug, Clone, Serialize)]
pub struct WorkloadConfig {
    pub producers: usize,
    pub consumers: usize,
    pub messages_per_producer: u64,
    /// Toggle the queue capacity every this many pops; 0 disables resizing.
    pub resize_every: u64,
}

/// Complete validated configuration.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub segment: SegmentConfig,
    pub queue: QueueConfig,
    pub workload: WorkloadConfig,
}

/// Configuration loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from a YAML file.
    ///
    /// `max_capacity` is the physical capacity of the queue the config will
    /// drive; `queue.initial_capacity` may not exceed it.
    pub fn load_file(path: impl AsRef<Path>, max_capacity: u64) -> ShmkitResult<Config> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ShmkitError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| ShmkitError::Io {
            context: "reading config file",
            source: e,
        })?;

        Self::load_string(&content, max_capacity)
    }

    /// Load and validate configuration from a YAML string.
    pub fn load_string(content: &str, max_capacity: u64) -> ShmkitResult<Config> {
        // An empty document means "all defaults".
        let raw: RawConfig = if content.trim().is_empty() {
            RawConfig::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| ShmkitError::ConfigParse {
                message: format!("YAML parse error: {}", e),
            })?
        };

        Self::validate(raw, max_capacity)
    }

    /// Defaults for every field.
    pub fn defaults(max_capacity: u64) -> ShmkitResult<Config> {
        Self::validate(RawConfig::default(), max_capacity)
    }

    fn validate(raw: RawConfig, max_capacity: u64) -> ShmkitResult<Config> {
        let segment = Self::validate_segment(raw.segment)?;
        let queue = Self::validate_queue(raw.queue, max_capacity)?;
        let workload = Self::validate_workload(raw.workload)?;

        Ok(Config {
            segment,
            queue,
            workload,
        })
    }

    fn validate_segment(raw: RawSegmentConfig) -> ShmkitResult<SegmentConfig> {
        let name = SegmentName::new(raw.name)?;

        let (min, max) = (SharedMemoryRegion::MIN_SIZE, SharedMemoryRegion::MAX_SIZE);
        if !(min..=max).contains(&raw.size_bytes) {
            return Err(HardValidationError::SegmentSizeOutOfBounds {
                size: raw.size_bytes,
                min,
                max,
            }
            .into());
        }

        Ok(SegmentConfig {
            name,
            size_bytes: raw.size_bytes,
        })
    }

    fn validate_queue(raw: RawQueueConfig, max_capacity: u64) -> ShmkitResult<QueueConfig> {
        let initial_capacity = raw.initial_capacity.unwrap_or(max_capacity);
        if initial_capacity > max_capacity {
            return Err(HardValidationError::CapacityOutOfBounds {
                capacity: initial_capacity,
                max: max_capacity,
            }
            .into());
        }

        Ok(QueueConfig {
            initial_capacity,
            overflow: raw.overflow,
        })
    }

    fn validate_workload(raw: RawWorkloadConfig) -> ShmkitResult<WorkloadConfig> {
        for (field, value) in [("producers", raw.producers), ("consumers", raw.consumers)] {
            if value == 0 || value > MAX_WORKERS {
                return Err(HardValidationError::InvalidFieldValue {
                    field,
                    value: value.to_string(),
                    reason: format!("Must be between 1 and {}", MAX_WORKERS),
                }
                .into());
            }
        }

        if raw.messages_per_producer == 0 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "messages_per_producer",
                value: "0".to_string(),
                reason: "Each producer must send at least one message".to_string(),
            }
            .into());
        }

        Ok(WorkloadConfig {
            producers: raw.producers,
            consumers: raw.consumers,
            messages_per_producer: raw.messages_per_producer,
            resize_every: raw.resize_every,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_CONFIG: &str = r#"
segment:
  name: shmkit-stress
  size_bytes: 4194304

queue:
  initial_capacity: 256
  overflow: reject

workload:
  producers: 2
  consumers: 3
  messages_per_producer: 1000
  resize_every: 50
"#;

    #[test]
    fn test_valid_config() {
        let config = ConfigLoader::load_string(VALID_CONFIG, 1024).unwrap();
        assert_eq!(config.segment.name.as_str(), "shmkit-stress");
        assert_eq!(config.queue.initial_capacity, 256);
        assert_eq!(config.queue.overflow, OverflowPolicy::Reject);
        assert_eq!(config.workload.producers, 2);
        assert_eq!(config.workload.consumers, 3);
        assert_eq!(config.workload.resize_every, 50);
    }

    #[test]
    fn test_defaults_applied() {
        let config = ConfigLoader::load_string("", 512).unwrap();
        assert_eq!(config.segment.size_bytes, 4 * 1024 * 1024);
        assert_eq!(config.queue.initial_capacity, 512);
        assert_eq!(config.queue.overflow, OverflowPolicy::Evict);
        assert_eq!(config.workload.producers, 4);
        assert_eq!(config.workload.messages_per_producer, 100_000);
        assert_eq!(config.workload.resize_every, 0);
    }

    #[test]
    fn test_capacity_beyond_max() {
        let yaml = r#"
queue:
  initial_capacity: 2048
"#;
        let err = ConfigLoader::load_string(yaml, 1024).unwrap_err();
        assert!(matches!(
            err,
            ShmkitError::HardValidation(HardValidationError::CapacityOutOfBounds {
                capacity: 2048,
                max: 1024
            })
        ));
    }

    #[test]
    fn test_zero_capacity_allowed() {
        let yaml = r#"
queue:
  initial_capacity: 0
"#;
        let config = ConfigLoader::load_string(yaml, 1024).unwrap();
        assert_eq!(config.queue.initial_capacity, 0);
    }

    #[test]
    fn test_invalid_segment_name() {
        let yaml = r#"
segment:
  name: "bad/name"
"#;
        assert!(ConfigLoader::load_string(yaml, 1024).is_err());
    }

    #[test]
    fn test_segment_size_out_of_bounds() {
        let yaml = r#"
segment:
  size_bytes: 1024
"#;
        let err = ConfigLoader::load_string(yaml, 1024).unwrap_err();
        assert!(matches!(
            err,
            ShmkitError::HardValidation(HardValidationError::SegmentSizeOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_invalid_worker_counts() {
        for yaml in [
            "workload:\n  producers: 0\n",
            "workload:\n  consumers: 65\n",
            "workload:\n  messages_per_producer: 0\n",
        ] {
            assert!(ConfigLoader::load_string(yaml, 1024).is_err(), "{}", yaml);
        }
    }

    #[test]
    fn test_unknown_overflow_policy() {
        let yaml = r#"
queue:
  overflow: block
"#;
        let err = ConfigLoader::load_string(yaml, 1024).unwrap_err();
        assert!(matches!(err, ShmkitError::ConfigParse { .. }));
    }

    #[test]
    fn test_unknown_section() {
        let err = ConfigLoader::load_string("functions: []\n", 1024).unwrap_err();
        assert!(matches!(err, ShmkitError::ConfigParse { .. }));
    }

    #[test]
    fn test_unknown_field_in_section() {
        for yaml in [
            "segment:\n  size: 65536\n",
            "queue:\n  initial_capcity: 5\n",
            "workload:\n  producer: 2\n",
        ] {
            let err = ConfigLoader::load_string(yaml, 1024).unwrap_err();
            assert!(matches!(err, ShmkitError::ConfigParse { .. }), "{}", yaml);
        }
    }

    #[test]
    fn test_missing_file() {
        let err = ConfigLoader::load_file("/nonexistent/shmkit.yaml", 16).unwrap_err();
        assert!(matches!(err, ShmkitError::ConfigNotFound { .. }));
    }
}
