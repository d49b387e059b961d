// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Fixed-size stress test message with an integrity checksum.

/// Plain `Copy` message, safe to store in a shared queue.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    producer: u32,
    checksum: u32,
    sequence: u64,
    payload: [u8; 16],
}

impl Message {
    pub fn new(producer: u32, sequence: u64) -> Self {
        let mut payload = [0u8; 16];
        payload[..8].copy_from_slice(&sequence.to_le_bytes());
        payload[8..12].copy_from_slice(&producer.to_le_bytes());
        payload[12..].copy_from_slice(&(sequence as u32 ^ producer).to_be_bytes());

        let mut message = Self {
            producer,
            checksum: 0,
            sequence,
            payload,
        };
        message.checksum = message.compute_checksum();
        message
    }

    fn compute_checksum(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&self.producer.to_le_bytes());
        hasher.update(&self.sequence.to_le_bytes());
        hasher.update(&self.payload);
        hasher.finalize()
    }

    /// True if the stored checksum matches the contents.
    pub fn is_intact(&self) -> bool {
        self.checksum == self.compute_checksum()
    }

    pub fn producer(&self) -> u32 {
        self.producer
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}
