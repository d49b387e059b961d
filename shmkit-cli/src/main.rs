// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! shmkit CLI
//!
//! Command-line interface for stress testing and inspecting shmkit queues.

use clap::{Parser, Subcommand};

mod commands;
mod message;
mod stress;

/// shmkit - Lock-free shared memory queues
#[derive(Parser)]
#[command(name = "shmkit")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (defaults are used when omitted)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run producers and consumers against a queue in shared memory
    Stress {
        /// Use the configured named segment instead of an anonymous mapping
        #[arg(long)]
        named: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        file: String,
    },

    /// Print size and alignment of the shared structures
    Layout,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    // Dispatch to command handlers
    match cli.command {
        Commands::Stress { named } => commands::stress::execute(cli.config.as_deref(), named),
        Commands::Validate { file } => commands::validate::execute(&file),
        Commands::Layout => commands::layout::execute(),
    }
}
