// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use freja_bus::{InboundMessage, MessageBus, OutboundMessage};
use freja_config::{AgentConfig, Config, ReflectionConfig};
use freja_memory::{tools::register_memory_tools, JournalStore, MemoryStore};
use freja_model::{ChatMessage, ChatRequest, ModelProvider, Role, ToolCallRecord};
use freja_tools::{ShellTool, ToolCall, ToolRegistry};

use crate::{
    context::ContextBuilder,
    distill::distill_session,
    jobs::{JobClass, ModelRouter},
    message_tool::MessageTool,
    promote::{PromotionNotifier, ReflectionPromoter},
    reflect::reflect_on_session,
    session::{Session, SessionSnapshot, SessionStore, TurnRecord},
    spawn_tool::SpawnTool,
    util::{strip_think, tool_hint, truncate_chars},
};

/// Persisted tool outputs are capped to keep session files bounded.
const TOOL_RESULT_MAX_CHARS: usize = 500;

const HELP_TEXT: &str = "freja commands:\n/new — Start a new conversation\n/help — Show available commands";

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The user issued `/new`
    Explicit,
    /// The inactivity timeout elapsed
    Timeout,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::Explicit => "explicit",
            EndReason::Timeout => "timeout",
        }
    }
}

/// Publishes self-improvement notifications back into the conversation
/// the reflections came from.
struct BusNotifier {
    bus: Arc<dyn MessageBus>,
}

#[async_trait]
impl PromotionNotifier for BusNotifier {
    async fn notify(&self, session_key: &str, message: String) {
        let (channel, chat_id) = session_key.split_once(':').unwrap_or(("cli", session_key));
        info!(session = session_key, "self-improvement notification");
        if let Err(e) = self
            .bus
            .publish_outbound(OutboundMessage::new(channel, chat_id, message))
            .await
        {
            warn!(error = %e, "failed to send bootstrap update notification");
        }
    }
}

/// The core processing engine.
///
/// Consumes inbound messages from the bus and drives each through five
/// phases: deterministic intake (A), the model ↔ tool iteration (B),
/// deterministic persistence (C), end-of-session detection (D), and
/// fire-and-forget background cognition (E).
pub struct AgentLoop {
    bus: Arc<dyn MessageBus>,
    provider: Arc<dyn ModelProvider>,
    agent_cfg: AgentConfig,
    reflection_cfg: ReflectionConfig,
    router: ModelRouter,
    pub(crate) memory: Arc<MemoryStore>,
    pub(crate) journal: Arc<JournalStore>,
    pub(crate) sessions: SessionStore,
    tools: Arc<ToolRegistry>,
    context: ContextBuilder,
    promoter: Arc<ReflectionPromoter>,
    message_tool: Arc<MessageTool>,
    spawn_tool: Arc<SpawnTool>,
    stop_flag: Arc<AtomicBool>,
    /// Last-activity timestamp per session key; one writer (this loop).
    pub(crate) session_timers: HashMap<String, DateTime<Utc>>,
    /// Fire-and-forget cognition tasks, reaped every tick and aborted on shutdown.
    pub(crate) background: JoinSet<()>,
}

impl AgentLoop {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        provider: Arc<dyn ModelProvider>,
        workspace: PathBuf,
        config: &Config,
    ) -> anyhow::Result<Self> {
        let memory = Arc::new(MemoryStore::new(&workspace)?);
        let journal = Arc::new(JournalStore::new(&workspace)?);
        let sessions = SessionStore::new(&workspace)?;
        let router = ModelRouter::new(config.model.name.clone(), config.jobs.clone());
        let context = ContextBuilder::new(workspace.clone(), Arc::clone(&memory));

        let message_tool = Arc::new(MessageTool::new(Arc::clone(&bus)));
        let spawn_tool = Arc::new(SpawnTool::new(
            Arc::clone(&provider),
            Arc::clone(&bus),
            router.primary(),
            config.agent.temperature,
            config.agent.max_tokens,
        ));

        let mut registry = ToolRegistry::new();
        registry.register(ShellTool::new(workspace.clone(), &config.tools.exec));
        register_memory_tools(&mut registry, Arc::clone(&memory));
        registry.register_arc(message_tool.clone() as Arc<dyn freja_tools::Tool>);
        registry.register_arc(spawn_tool.clone() as Arc<dyn freja_tools::Tool>);

        let promotion_model = router
            .model_for(JobClass::Reflection)
            .unwrap_or_else(|| router.primary().to_string());
        let mut promoter = ReflectionPromoter::new(
            workspace,
            Arc::clone(&provider),
            promotion_model,
            config.reflection.target_files.clone(),
            config.reflection.max_file_lines,
            config.reflection.smart_insert,
        );
        if config.reflection.notify_user {
            promoter = promoter.with_notifier(Arc::new(BusNotifier {
                bus: Arc::clone(&bus),
            }));
        }

        Ok(Self {
            bus,
            provider,
            agent_cfg: config.agent.clone(),
            reflection_cfg: config.reflection.clone(),
            router,
            memory,
            journal,
            sessions,
            tools: Arc::new(registry),
            context,
            promoter: Arc::new(promoter),
            message_tool,
            spawn_tool,
            stop_flag: Arc::new(AtomicBool::new(false)),
            session_timers: HashMap::new(),
            background: JoinSet::new(),
        })
    }

    /// Handle for requesting shutdown from another task (e.g. a signal
    /// handler).  The loop checks the flag between inbound polls.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_flag)
    }

    /// Consume inbound messages until the stop flag is raised or the bus
    /// closes.  Per-message failures are answered with an apology and
    /// never abort the loop.
    pub async fn run(&mut self) {
        info!("agent loop started");
        while !self.stop_flag.load(Ordering::SeqCst) {
            let msg = match self.bus.consume_inbound(Duration::from_secs(1)).await {
                Ok(Some(msg)) => msg,
                Ok(None) => {
                    self.reap_background();
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "inbound bus closed; stopping");
                    break;
                }
            };

            let (channel, chat_id) = (msg.channel.clone(), msg.chat_id.clone());
            match self.process_message(msg).await {
                Ok(Some(out)) => {
                    if let Err(e) = self.bus.publish_outbound(out).await {
                        warn!(error = %e, "failed to publish response");
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    error!(error = %e, "error processing message");
                    let apology = OutboundMessage::new(
                        &channel,
                        &chat_id,
                        format!("Sorry, I encountered an error: {e}"),
                    );
                    let _ = self.bus.publish_outbound(apology).await;
                }
            }
            self.reap_background();
        }
        info!("agent loop stopping");
    }

    /// Raise the stop flag and abort outstanding background tasks.
    /// Task bodies must not leave partial memory commits behind; commits
    /// happen as single store calls at the end of each body.
    pub async fn shutdown(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        self.background.shutdown().await;
    }

    /// Await every outstanding background task (tests, graceful exit).
    pub async fn drain_background(&mut self) {
        while self.background.join_next().await.is_some() {}
    }

    fn reap_background(&mut self) {
        while let Some(result) = self.background.try_join_next() {
            if let Err(e) = result {
                if e.is_panic() {
                    warn!("background task panicked");
                }
            }
        }
    }

    /// Process one inbound message through the five phases.  Returns the
    /// response to publish, or `None` when the model already delivered
    /// its answer through the message tool.
    pub async fn process_message(
        &mut self,
        msg: InboundMessage,
    ) -> anyhow::Result<Option<OutboundMessage>> {
        // ── Phase A: intake (deterministic) ─────────────────────────────
        let preview = truncate_chars(&msg.content, 80);
        info!(channel = %msg.channel, sender = %msg.sender_id, content = %preview, "processing message");

        let key = msg.session_key();
        let mut session = self.sessions.get_or_create(&key);
        self.update_timer(&key);

        let command = msg.content.trim().to_lowercase();
        if command == "/new" {
            // Snapshot before clearing: background cognition must see the
            // conversation as it was, not the emptied session.
            let snapshot = session.snapshot();
            self.end_session(snapshot, EndReason::Explicit);
            session.clear();
            self.sessions.save(&session)?;
            self.sessions.invalidate(&key);
            return Ok(Some(OutboundMessage::new(
                &msg.channel,
                &msg.chat_id,
                "New session started.",
            )));
        }
        if command == "/help" {
            return Ok(Some(OutboundMessage::new(&msg.channel, &msg.chat_id, HELP_TEXT)));
        }

        self.message_tool.set_context(
            &msg.channel,
            &msg.chat_id,
            msg.metadata.get("message_id").cloned(),
        );
        self.message_tool.start_turn();
        self.spawn_tool.set_context(&msg.channel, &msg.chat_id);

        let history = session.get_history(self.agent_cfg.memory_window);
        let history_len = history.len();
        let initial =
            self.context
                .build_messages(history, &msg.content, &msg.channel, &msg.chat_id);

        // ── Phase B: interactive response (model allowed) ───────────────
        let (final_content, tools_used, all_messages) = self.run_tool_loop(initial, &msg).await?;
        let final_content = final_content
            .unwrap_or_else(|| "I've completed processing but have no response to give.".into());

        debug!(tools = ?tools_used, response = %truncate_chars(&final_content, 120), "turn complete");

        // ── Phase C: persist (deterministic) ────────────────────────────
        self.save_turn(&mut session, &all_messages, 1 + history_len);
        self.sessions.save(&session)?;

        // ── Phase D: end-of-session detection ───────────────────────────
        let now = Utc::now();
        let timed_out: Vec<String> = self
            .session_timers
            .iter()
            .filter(|(_, last)| self.is_timed_out(**last, now))
            .map(|(k, _)| k.clone())
            .collect();
        for ended_key in timed_out {
            let ended = self.sessions.get_or_create(&ended_key);
            let snapshot = ended.snapshot();
            self.end_session(snapshot, EndReason::Timeout);
        }

        // ── Phase E happened inside end_session: fire-and-forget ────────

        if self.message_tool.has_sent_in_turn() {
            // The model already answered through the message tool.
            return Ok(None);
        }
        let mut out = OutboundMessage::new(&msg.channel, &msg.chat_id, final_content);
        out.metadata = msg.metadata;
        Ok(Some(out))
    }

    /// Inactivity strictly greater than the configured window; exactly at
    /// the threshold is not a timeout.
    pub(crate) fn is_timed_out(&self, last_activity: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let timeout = chrono::Duration::seconds(self.agent_cfg.inactivity_timeout_seconds as i64);
        now > last_activity + timeout
    }

    fn update_timer(&mut self, key: &str) {
        self.session_timers.insert(key.to_string(), Utc::now());
    }

    /// The bounded tool-iteration loop.
    /// Returns (final content, tools used, the full message list).
    async fn run_tool_loop(
        &self,
        mut messages: Vec<ChatMessage>,
        msg: &InboundMessage,
    ) -> anyhow::Result<(Option<String>, Vec<String>, Vec<ChatMessage>)> {
        let Some(model) = self.router.model_for(JobClass::InteractiveResponse) else {
            return Ok((None, Vec::new(), Vec::new()));
        };
        let tool_schemas: Vec<freja_model::ToolSchema> = self
            .tools
            .schemas()
            .into_iter()
            .map(|s| freja_model::ToolSchema {
                name: s.name,
                description: s.description,
                parameters: s.parameters,
            })
            .collect();

        let mut iteration = 0u32;
        let mut final_content: Option<String> = None;
        let mut tools_used: Vec<String> = Vec::new();

        while iteration < self.agent_cfg.max_iterations {
            iteration += 1;

            let response = self
                .provider
                .chat(ChatRequest {
                    messages: messages.clone(),
                    tools: tool_schemas.clone(),
                    model: model.clone(),
                    temperature: self.agent_cfg.temperature,
                    max_tokens: self.agent_cfg.max_tokens,
                })
                .await?;

            if !response.has_tool_calls() {
                final_content = strip_think(&response.content);
                break;
            }

            // Progress hints for channels that render them.
            if self.agent_cfg.send_progress {
                if let Some(clean) = strip_think(&response.content) {
                    self.publish_progress(msg, clean, false).await;
                }
            }
            if self.agent_cfg.send_tool_hints {
                self.publish_progress(msg, tool_hint(&response.tool_calls), true)
                    .await;
            }

            let records: Vec<ToolCallRecord> = response
                .tool_calls
                .iter()
                .map(|tc| ToolCallRecord::function(&tc.id, &tc.name, &tc.arguments))
                .collect();
            messages.push(ChatMessage::assistant_with_tool_calls(
                &response.content,
                records,
            ));

            for tc in &response.tool_calls {
                tools_used.push(tc.name.clone());
                info!(
                    tool = %tc.name,
                    args = %truncate_chars(&tc.arguments.to_string(), 200),
                    "tool call"
                );
                let output = self
                    .tools
                    .execute(&ToolCall {
                        id: tc.id.clone(),
                        name: tc.name.clone(),
                        args: tc.arguments.clone(),
                    })
                    .await;
                messages.push(ChatMessage::tool_result(&tc.id, &tc.name, &output.content));
            }
        }

        if final_content.is_none() && iteration >= self.agent_cfg.max_iterations {
            warn!(max_iterations = self.agent_cfg.max_iterations, "tool budget exhausted");
            final_content = Some(format!(
                "I reached the maximum number of tool call iterations ({}) without completing \
                 the task. You can try breaking the task into smaller steps.",
                self.agent_cfg.max_iterations
            ));
        }

        // The final answer is a turn too: persist it with the rest.
        if let Some(content) = &final_content {
            messages.push(ChatMessage::assistant(content));
        }

        Ok((final_content, tools_used, messages))
    }

    async fn publish_progress(&self, msg: &InboundMessage, content: String, is_tool_hint: bool) {
        if content.is_empty() {
            return;
        }
        let mut out = OutboundMessage::new(&msg.channel, &msg.chat_id, content);
        out.metadata = msg.metadata.clone();
        out.metadata.insert("_progress".into(), "true".into());
        out.metadata
            .insert("_tool_hint".into(), is_tool_hint.to_string());
        if let Err(e) = self.bus.publish_outbound(out).await {
            warn!(error = %e, "failed to publish progress hint");
        }
    }

    /// Append only the new turns to the session, truncating oversized
    /// tool outputs, and reset the activity timer.
    fn save_turn(&mut self, session: &mut Session, messages: &[ChatMessage], skip: usize) {
        for message in &messages[skip.min(messages.len())..] {
            let mut message = message.clone();
            if message.role == Role::Tool && message.content.chars().count() > TOOL_RESULT_MAX_CHARS
            {
                message.content = format!(
                    "{}\n... (truncated)",
                    truncate_chars(&message.content, TOOL_RESULT_MAX_CHARS)
                );
            }
            session.messages.push(TurnRecord::new(message));
        }
        session.updated_at = Utc::now();
        self.update_timer(&session.key);
    }

    /// Phase E fan-out for one ended session: remove the timer, schedule
    /// journal synthesis, optional distillation, optional reflection.
    /// All tasks run on the immutable snapshot.
    pub(crate) fn end_session(&mut self, snapshot: SessionSnapshot, reason: EndReason) {
        info!(reason = reason.as_str(), session = %snapshot.key, "session ended");
        self.session_timers.remove(&snapshot.key);

        let journal_model = self.router.model_for(JobClass::JournalSynthesis);
        self.spawn_background(
            format!("journal:{}", snapshot.key),
            synthesize_journal(
                Arc::clone(&self.provider),
                journal_model,
                Arc::clone(&self.journal),
                snapshot.clone(),
            ),
        );

        match self.router.model_for(JobClass::Distillation) {
            Some(model) => {
                self.spawn_background(
                    format!("distill:{}", snapshot.key),
                    distill_session(
                        Arc::clone(&self.provider),
                        model,
                        Arc::clone(&self.memory),
                        snapshot.clone(),
                    ),
                );
            }
            None => debug!(session = %snapshot.key, "distillation skipped (no local model)"),
        }

        if self.router.model_for(JobClass::Reflection).is_some() {
            self.spawn_background(
                format!("reflect:{}", snapshot.key),
                reflect_on_session(
                    Arc::clone(&self.memory),
                    Arc::clone(&self.promoter),
                    self.reflection_cfg.auto_promote,
                    snapshot,
                ),
            );
        }
    }

    /// Fire-and-forget with a logging envelope: background cognition
    /// failures never reach the foreground.
    fn spawn_background<F>(&mut self, name: String, fut: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.background.spawn(async move {
            if let Err(e) = fut.await {
                warn!(task = %name, error = %e, "background task failed (non-fatal)");
            }
        });
    }
}

/// Journal synthesis for one ended session.
///
/// The journal is narrative, lossy, and non-authoritative.  A model
/// failure falls back to a deterministic summary so the day always gets
/// its entry.
pub(crate) async fn synthesize_journal(
    provider: Arc<dyn ModelProvider>,
    model: Option<String>,
    journal: Arc<JournalStore>,
    snapshot: SessionSnapshot,
) -> anyhow::Result<()> {
    if snapshot.messages.is_empty() {
        return Ok(());
    }

    let mut tool_names: BTreeSet<String> = BTreeSet::new();
    let mut user_count = 0usize;
    let mut assistant_count = 0usize;
    for m in &snapshot.messages {
        match m.role {
            Role::User => user_count += 1,
            Role::Assistant => assistant_count += 1,
            Role::Tool => {
                tool_names.insert(m.name.clone().unwrap_or_else(|| "unknown".into()));
            }
            Role::System => {}
        }
    }
    let tools_line = if tool_names.is_empty() {
        "none".to_string()
    } else {
        tool_names.iter().cloned().collect::<Vec<_>>().join(", ")
    };

    if let Some(model) = model {
        let prompt = format!(
            "Summarize this agent session as a brief narrative.\n\
             User messages: {user_count}\n\
             Assistant responses: {assistant_count}\n\
             Tools used: {tools_line}\n\n\
             Write 2-3 sentences about what was accomplished."
        );
        match provider
            .chat(ChatRequest {
                messages: vec![ChatMessage::user(prompt)],
                model,
                temperature: 0.05,
                max_tokens: 256,
                ..Default::default()
            })
            .await
        {
            Ok(response) => {
                if let Some(content) = strip_think(&response.content) {
                    journal.write_entry(
                        &content,
                        &[snapshot.key.clone()],
                        &["session".into(), "synthesis".into()],
                        None,
                    )?;
                    info!(session = %snapshot.key, "journal synthesized");
                    return Ok(());
                }
            }
            Err(e) => warn!(error = %e, "journal model call failed, using fallback"),
        }
    }

    let fallback = format!(
        "## Session: {}\n\nUser sent {user_count} message(s). Agent responded \
         {assistant_count} time(s). Tools: {tools_line}.",
        snapshot.key
    );
    journal.write_entry(
        &fallback,
        &[snapshot.key.clone()],
        &["session".into(), "fallback".into()],
        None,
    )?;
    info!(session = %snapshot.key, "journal written (fallback)");
    Ok(())
}
