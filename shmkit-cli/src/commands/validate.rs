// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `shmkit validate` command - Validate configuration file.

use shmkit_core::ConfigLoader;

use crate::stress::QUEUE_CAPACITY;

pub fn execute(file: &str) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(file = %file, "Validating configuration");

    match ConfigLoader::load_file(file, QUEUE_CAPACITY as u64) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Segment:");
            println!("  Name:                  {}", config.segment.name);
            println!("  Size:                  {} bytes", config.segment.size_bytes);
            println!();
            println!("Queue:");
            println!(
                "  Initial Capacity:      {} (max {})",
                config.queue.initial_capacity, QUEUE_CAPACITY
            );
            println!("  Overflow:              {}", config.queue.overflow);
            println!();
            println!("Workload:");
            println!("  Producers:             {}", config.workload.producers);
            println!("  Consumers:             {}", config.workload.consumers);
            println!(
                "  Messages per Producer: {}",
                config.workload.messages_per_producer
            );
            if config.workload.resize_every > 0 {
                println!(
                    "  Resize Every:          {} pops",
                    config.workload.resize_every
                );
            } else {
                println!("  Resize Every:          never");
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed:");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}
