// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::{InboundMessage, MessageBus, OutboundMessage};

/// Default queue depth per direction.  Deep enough that a slow channel
/// adapter does not stall the loop, shallow enough to surface a stuck
/// consumer as backpressure rather than unbounded memory growth.
const DEFAULT_CAPACITY: usize = 256;

/// In-process bus over bounded tokio mpsc channels.
///
/// One producer/consumer pair per direction; receivers live behind a
/// `tokio::sync::Mutex` so the bus object itself can be shared by `Arc`.
pub struct InMemoryBus {
    inbound_tx: mpsc::Sender<InboundMessage>,
    inbound_rx: Mutex<mpsc::Receiver<InboundMessage>>,
    outbound_tx: mpsc::Sender<OutboundMessage>,
    outbound_rx: Mutex<mpsc::Receiver<OutboundMessage>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        Self {
            inbound_tx,
            inbound_rx: Mutex::new(inbound_rx),
            outbound_tx,
            outbound_rx: Mutex::new(outbound_rx),
        }
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish_inbound(&self, msg: InboundMessage) -> anyhow::Result<()> {
        self.inbound_tx
            .send(msg)
            .await
            .map_err(|_| anyhow::anyhow!("inbound bus closed"))
    }

    async fn consume_inbound(&self, timeout: Duration) -> anyhow::Result<Option<InboundMessage>> {
        let mut rx = self.inbound_rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(msg)) => Ok(Some(msg)),
            Ok(None) => anyhow::bail!("inbound bus closed"),
            Err(_) => Ok(None),
        }
    }

    async fn publish_outbound(&self, msg: OutboundMessage) -> anyhow::Result<()> {
        self.outbound_tx
            .send(msg)
            .await
            .map_err(|_| anyhow::anyhow!("outbound bus closed"))
    }

    async fn consume_outbound(&self, timeout: Duration) -> anyhow::Result<Option<OutboundMessage>> {
        let mut rx = self.outbound_rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(msg)) => Ok(Some(msg)),
            Ok(None) => anyhow::bail!("outbound bus closed"),
            Err(_) => Ok(None),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inbound_fifo_order_preserved() {
        let bus = InMemoryBus::new();
        for i in 0..3 {
            bus.publish_inbound(InboundMessage::new("cli", "u", "c", format!("m{i}")))
                .await
                .unwrap();
        }
        for i in 0..3 {
            let msg = bus
                .consume_inbound(Duration::from_millis(100))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(msg.content, format!("m{i}"));
        }
    }

    #[tokio::test]
    async fn consume_times_out_on_empty_queue() {
        let bus = InMemoryBus::new();
        let got = bus.consume_inbound(Duration::from_millis(20)).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn outbound_round_trip() {
        let bus = InMemoryBus::new();
        bus.publish_outbound(OutboundMessage::new("cli", "c1", "hello"))
            .await
            .unwrap();
        let msg = bus
            .consume_outbound(Duration::from_millis(100))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg.content, "hello");
        assert_eq!(msg.chat_id, "c1");
    }

    #[tokio::test]
    async fn directions_are_independent() {
        let bus = InMemoryBus::new();
        bus.publish_inbound(InboundMessage::new("cli", "u", "c", "in"))
            .await
            .unwrap();
        // Outbound stays empty even though inbound has a message queued.
        let out = bus.consume_outbound(Duration::from_millis(20)).await.unwrap();
        assert!(out.is_none());
    }
}
