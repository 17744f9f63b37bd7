// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
/// Integration tests for the assembled agent: bus in, cognition core,
/// bus out — using the mock model providers, no network.
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use freja_bus::{InMemoryBus, InboundMessage, MessageBus};
use freja_config::Config;
use freja_core::AgentLoop;
use freja_memory::MemoryStore;
use freja_model::{MockProvider, ScriptedMockProvider};

fn test_config() -> Config {
    let mut cfg = Config::default();
    cfg.model.name = "test-model".into();
    cfg
}

#[tokio::test]
async fn full_bus_round_trip_with_mock_provider() {
    let dir = tempfile::tempdir().unwrap();
    let bus = Arc::new(InMemoryBus::new());
    let mut agent = AgentLoop::new(
        bus.clone(),
        Arc::new(MockProvider),
        dir.path().to_path_buf(),
        &test_config(),
    )
    .unwrap();
    let stop = agent.stop_handle();

    let runner = tokio::spawn(async move { agent.run().await });

    bus.publish_inbound(InboundMessage::new("cli", "user", "c1", "hello"))
        .await
        .unwrap();

    let reply = bus
        .consume_outbound(Duration::from_secs(5))
        .await
        .unwrap()
        .expect("a reply should arrive");
    assert_eq!(reply.channel, "cli");
    assert_eq!(reply.chat_id, "c1");
    assert!(reply.content.contains("MOCK: hello"));

    stop.store(true, Ordering::SeqCst);
    let _ = tokio::time::timeout(Duration::from_secs(3), runner).await;
}

#[tokio::test]
async fn stored_memory_reaches_the_system_prompt() {
    let dir = tempfile::tempdir().unwrap();

    // Seed memory before the agent starts.
    let memory = MemoryStore::new(dir.path()).unwrap();
    memory
        .write_fact("Editor", "User writes everything in Helix", vec![], None, None)
        .unwrap();

    let provider = Arc::new(ScriptedMockProvider::always_text("ok"));
    let bus = Arc::new(InMemoryBus::new());
    let mut agent = AgentLoop::new(
        bus,
        provider.clone(),
        dir.path().to_path_buf(),
        &test_config(),
    )
    .unwrap();

    agent
        .process_message(InboundMessage::new("cli", "user", "c1", "which editor do I use?"))
        .await
        .unwrap();

    let requests = provider.requests.lock().unwrap();
    let system = &requests[0].messages[0];
    assert!(system.content.contains("User writes everything in Helix"));
}

#[tokio::test]
async fn sessions_survive_loop_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config();

    {
        let provider = Arc::new(ScriptedMockProvider::always_text("first answer"));
        let bus = Arc::new(InMemoryBus::new());
        let mut agent = AgentLoop::new(bus, provider, dir.path().to_path_buf(), &cfg).unwrap();
        agent
            .process_message(InboundMessage::new("cli", "user", "c1", "first question"))
            .await
            .unwrap();
    }

    // A fresh loop over the same workspace sees the earlier turns and
    // feeds them back as history.
    let provider = Arc::new(ScriptedMockProvider::always_text("second answer"));
    let bus = Arc::new(InMemoryBus::new());
    let mut agent = AgentLoop::new(bus, provider.clone(), dir.path().to_path_buf(), &cfg).unwrap();
    agent
        .process_message(InboundMessage::new("cli", "user", "c1", "second question"))
        .await
        .unwrap();

    let requests = provider.requests.lock().unwrap();
    let contents: Vec<&str> = requests[0]
        .messages
        .iter()
        .map(|m| m.content.as_str())
        .collect();
    assert!(contents.contains(&"first question"));
    assert!(contents.contains(&"first answer"));
    assert!(contents.contains(&"second question"));
}
