// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Message bus decoupling channel adapters from the cognition core.
//!
//! Channels push [`InboundMessage`]s and drain [`OutboundMessage`]s; the
//! agent loop does the reverse.  Delivery is FIFO per direction; nothing is
//! guaranteed across channels.
mod memory_bus;
mod messages;

pub use memory_bus::InMemoryBus;
pub use messages::{InboundMessage, OutboundMessage};

use std::time::Duration;

use async_trait::async_trait;

/// Abstract bus the core depends on.
///
/// `consume_*` blocks until a message arrives or `timeout` elapses;
/// `Ok(None)` means the timeout fired (callers use this to poll a shutdown
/// flag between attempts).  `Err` means the bus is closed.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish_inbound(&self, msg: InboundMessage) -> anyhow::Result<()>;
    async fn consume_inbound(&self, timeout: Duration) -> anyhow::Result<Option<InboundMessage>>;
    async fn publish_outbound(&self, msg: OutboundMessage) -> anyhow::Result<()>;
    async fn consume_outbound(&self, timeout: Duration) -> anyhow::Result<Option<OutboundMessage>>;
}
