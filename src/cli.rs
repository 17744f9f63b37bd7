// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "freja",
    about = "A long-running personal AI agent with durable, category-typed memory",
    version
)]
pub struct Cli {
    /// Explicit config file (highest-priority layer)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Workspace directory override
    #[arg(short, long, global = true)]
    pub workspace: Option<PathBuf>,

    /// Write tracing output to stderr (RUST_LOG controls the filter)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Process a single message and exit instead of starting the chat loop
    #[arg(short, long)]
    pub message: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the merged configuration and exit
    ShowConfig,
    /// Print today's journal entry and exit
    Journal,
    /// Search memory and print matching items
    Memory {
        /// Keyword to search for
        query: String,
        /// Maximum number of results
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
}
