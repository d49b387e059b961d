// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `shmkit stress` command - Run producers and consumers against a shared queue.

use shmkit_core::{Config, ConfigLoader};

use crate::stress::{self, QUEUE_CAPACITY};

pub fn execute(config_path: Option<&str>, named: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config: Config = match config_path {
        Some(path) => {
            tracing::info!(file = %path, "Loading configuration");
            ConfigLoader::load_file(path, QUEUE_CAPACITY as u64)?
        }
        None => ConfigLoader::defaults(QUEUE_CAPACITY as u64)?,
    };

    let report = stress::run(&config, named)?;

    println!("Stress run ({} overflow)", config.queue.overflow);
    println!(
        "  Producers / Consumers: {} / {}",
        config.workload.producers, config.workload.consumers
    );
    println!("  Pushed:     {}", report.pushed);
    println!("  Popped:     {}", report.popped);
    println!("  Evicted:    {}", report.evicted);
    println!("  Rejected:   {} attempts", report.rejected);
    println!("  Resizes:    {}", report.resizes);
    println!("  Elapsed:    {:.3}s", report.elapsed.as_secs_f64());
    println!("  Throughput: {:.0} msg/s", report.throughput());

    match report.verify() {
        Ok(()) => {
            println!("✓ All messages accounted for");
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Stress run failed verification:");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}
