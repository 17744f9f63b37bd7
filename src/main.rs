// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::io::Write;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands};
use freja_bus::{InMemoryBus, InboundMessage, MessageBus};
use freja_core::AgentLoop;
use freja_memory::{JournalStore, MemoryStore};
use freja_model::{ModelProvider, OpenAiCompatProvider};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    init_logging(args.verbose);

    let mut config = freja_config::load(args.config.as_deref())?;
    if let Some(workspace) = &args.workspace {
        config.workspace = Some(workspace.clone());
    }
    let workspace = config.workspace_path();
    std::fs::create_dir_all(&workspace)?;

    if let Some(cmd) = &args.command {
        match cmd {
            Commands::ShowConfig => {
                println!("{}", serde_yaml::to_string(&config).unwrap_or_default());
                return Ok(());
            }
            Commands::Journal => {
                let journal = JournalStore::new(&workspace)?;
                match journal.read_entry(None) {
                    Some(entry) => println!("{entry}"),
                    None => println!("(no journal entry for today)"),
                }
                return Ok(());
            }
            Commands::Memory { query, limit } => {
                let memory = MemoryStore::new(&workspace)?;
                let items = memory.search(query, None, Some(*limit));
                if items.is_empty() {
                    println!("(no matches)");
                }
                for item in items {
                    println!("[{}] {} — {}", item.category(), item.id, item.title);
                }
                return Ok(());
            }
        }
    }

    let provider: Arc<dyn ModelProvider> =
        Arc::new(OpenAiCompatProvider::from_config(&config.model));
    let bus = Arc::new(InMemoryBus::new());
    let mut agent = AgentLoop::new(bus.clone(), provider, workspace, &config)?;

    // One-shot mode: a single turn, then a clean exit.  Progress hints are
    // suppressed (nothing drains the outbound queue besides us).
    if let Some(message) = args.message {
        let msg = InboundMessage::new("cli", "user", "direct", message);
        match agent.process_message(msg).await {
            Ok(Some(out)) => println!("{}", out.content),
            Ok(None) => {}
            Err(e) => eprintln!("error: {e}"),
        }
        agent.drain_background().await;
        return Ok(());
    }

    let stop = agent.stop_handle();

    // Printer task: drain outbound messages to the terminal.  Progress
    // hints go to stderr so piped output stays clean.
    let printer_bus = bus.clone();
    let printer = tokio::spawn(async move {
        loop {
            match printer_bus.consume_outbound(Duration::from_secs(1)).await {
                Ok(Some(msg)) if msg.is_progress() => {
                    eprintln!("  · {}", msg.content);
                }
                Ok(Some(msg)) => {
                    println!("{}", msg.content);
                    print_prompt();
                }
                Ok(None) => continue,
                Err(_) => break,
            }
        }
    });

    // Stdin reader thread: lines become inbound messages on the bus.
    let reader_bus = bus.clone();
    let reader_stop = stop.clone();
    let handle = tokio::runtime::Handle::current();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.read_line(&mut line) {
                Ok(0) | Err(_) => {
                    reader_stop.store(true, Ordering::SeqCst);
                    break;
                }
                Ok(_) => {
                    let content = line.trim().to_string();
                    if content.is_empty() {
                        continue;
                    }
                    let msg = InboundMessage::new("cli", "user", "local", content);
                    if handle.block_on(reader_bus.publish_inbound(msg)).is_err() {
                        break;
                    }
                }
            }
        }
    });

    print_prompt();
    agent.run().await;
    agent.shutdown().await;
    printer.abort();
    Ok(())
}

fn print_prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("info")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
