// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Newtype wrappers for validated inputs.
//!
//! Values are checked once, when they are created, and carried around in
//! validated form afterwards.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::HardValidationError;

/// Position of a slot in a fixed buffer. Index free lists hand these out.
pub type BufferIndex = u32;

/// Maximum length of a segment name, excluding the leading `/`.
const MAX_SEGMENT_NAME_LEN: usize = 64;

/// Validated shared memory segment name.
/// Must be non-empty, alphanumeric with hyphens/underscores, max 64 chars.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SegmentName(String);

impl SegmentName {
    /// Create a new SegmentName with validation.
    pub fn new(name: impl Into<String>) -> Result<Self, HardValidationError> {
        let name = name.into();

        if name.is_empty() {
            return Err(HardValidationError::InvalidFieldValue {
                field: "segment.name",
                value: name,
                reason: "Segment name cannot be empty".to_string(),
            });
        }

        if name.len() > MAX_SEGMENT_NAME_LEN {
            return Err(HardValidationError::InvalidFieldValue {
                field: "segment.name",
                value: name.clone(),
                reason: format!(
                    "Segment name too long: {} chars (max {})",
                    name.len(),
                    MAX_SEGMENT_NAME_LEN
                ),
            });
        }

        // `/` would make shm_open treat the name as a path.
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(HardValidationError::InvalidFieldValue {
                field: "segment.name",
                value: name,
                reason: "Segment name must contain only ASCII alphanumeric characters, hyphens, and underscores".to_string(),
            });
        }

        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SegmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for SegmentName {
    type Error = HardValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SegmentName> for String {
    fn from(name: SegmentName) -> Self {
        name.0
    }
}

/// What a producer does when the queue is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Overwrite the oldest element (`push`).
    #[default]
    Evict,
    /// Hand the new element back to the producer (`try_push`), which
    /// retries later.
    Reject,
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverflowPolicy::Evict => write!(f, "evict"),
            OverflowPolicy::Reject => write!(f, "reject"),
        }
    }
}
