// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The cognition core: a phased message loop over a bus, with durable
//! category-typed memory curation in the background.
//!
//! Every inbound message traverses five phases:
//!
//! - **A** intake: session resolution, timers, slash commands (deterministic)
//! - **B** interactive response: bounded model ↔ tool iteration
//! - **C** persist: append the new turns, save the session (deterministic)
//! - **D** end-of-session detection: explicit `/new` or inactivity timeout
//! - **E** background cognition: journal, distillation, reflection —
//!   fire-and-forget on immutable snapshots, never blocking the foreground
mod agent_loop;
mod context;
mod distill;
mod jobs;
mod message_tool;
mod promote;
mod reflect;
mod session;
mod spawn_tool;
mod util;

pub use agent_loop::{AgentLoop, EndReason};
pub use context::ContextBuilder;
pub use distill::{AtomicCandidate, CandidateKind};
pub use jobs::{JobClass, ModelRouter};
pub use message_tool::MessageTool;
pub use promote::{
    canonical_section, default_targets_for, BootstrapEditProposal, PromotionNotifier,
    ReflectionPromoter,
};
pub use reflect::{analyze_session, Impact, ReflectionCandidate, ReflectionKind};
pub use session::{Session, SessionSnapshot, SessionStore, TurnRecord};
pub use spawn_tool::SpawnTool;
