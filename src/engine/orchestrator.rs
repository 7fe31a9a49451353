// Praxis Engine — Agent Orchestrator
//
// Per-turn state machine for one chat exchange. Single logical sequence:
//
//   start → tag-parse(user) → log touches → simulate → build prompt
//         → stream LLM → chunk emit* → tag-parse(assistant)
//         → log touches/discoveries → decide → complete trajectory
//         → persist assistant message → emit complete
//
// Between start and complete the orchestrator yields typed stream events
// over an mpsc channel with strictly increasing ids. A caller-supplied
// stop signal is observed between every yielded event; once triggered the
// walk is abandoned open — no partial completion.
//
// A provider failure mid-turn becomes exactly one terminal `error` event;
// chunks already emitted were advisory and are not rolled back.

use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::simulation::{EntityInput, SimulationResult};
use crate::atoms::stream::{
    ChatOutcome, ChunkPayload, CompletePayload, ErrorPayload, StreamEvent, StreamPayload,
    TrajectoryEventPayload,
};
use crate::atoms::types::{input_hash, EventType, Role, StoredMessage, TagMention};
use crate::engine::config::EngineConfig;
use crate::engine::prompt;
use crate::engine::providers::AnyProvider;
use crate::engine::reasoner::GraphReasoner;
use crate::engine::store::{now_ms, GraphStore};
use crate::engine::tags;
use crate::engine::trajectory::{EventInput, TrajectoryEngine};

/// Buffered events between the turn task and the transport.
const EVENT_CHANNEL_CAPACITY: usize = 64;

pub struct AgentOrchestrator {
    store: Arc<GraphStore>,
    engine: Arc<TrajectoryEngine>,
    reasoner: Arc<GraphReasoner>,
    /// None means no language model is configured: streams terminate with
    /// an error event, while the unary path falls back to the mock.
    provider: Option<Arc<AnyProvider>>,
    fallback: Arc<AnyProvider>,
}

impl AgentOrchestrator {
    pub fn new(store: Arc<GraphStore>, provider: Option<AnyProvider>) -> Self {
        Self {
            engine: Arc::new(TrajectoryEngine::new(store.clone())),
            reasoner: Arc::new(GraphReasoner::new(store.clone())),
            provider: provider.map(Arc::new),
            fallback: Arc::new(AnyProvider::mock()),
            store,
        }
    }

    /// Open the store and wire the provider from config.
    pub fn from_config(config: &EngineConfig) -> EngineResult<Self> {
        let store = match &config.db_path {
            Some(path) => GraphStore::open(path)?,
            None => GraphStore::open_default()?,
        };
        let provider = config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .map(|_| AnyProvider::from_config(config));
        Ok(Self::new(Arc::new(store), provider))
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    pub fn engine(&self) -> &Arc<TrajectoryEngine> {
        &self.engine
    }

    pub fn reasoner(&self) -> &Arc<GraphReasoner> {
        &self.reasoner
    }

    /// Streamed chat turn. Validation failures (bad account, foreign
    /// conversation) surface as typed errors before any event is emitted;
    /// everything after that arrives on the returned channel.
    pub async fn chat_stream(
        &self,
        account_id: &str,
        message: &str,
        conversation_id: Option<&str>,
        stop: Arc<AtomicBool>,
    ) -> EngineResult<mpsc::Receiver<StreamEvent>> {
        self.stream_internal(account_id, message, conversation_id, stop, self.provider.clone())
            .await
    }

    /// Unary chat turn: drives the same pipeline, draining events into a
    /// single outcome. With no provider configured it serves the
    /// deterministic mock response instead of failing.
    pub async fn chat(
        &self,
        account_id: &str,
        message: &str,
        conversation_id: Option<&str>,
    ) -> EngineResult<ChatOutcome> {
        let provider = Some(self.provider.clone().unwrap_or_else(|| self.fallback.clone()));
        let stop = Arc::new(AtomicBool::new(false));
        let mut rx = self
            .stream_internal(account_id, message, conversation_id, stop, provider)
            .await?;

        let mut content = String::new();
        let mut complete: Option<CompletePayload> = None;
        while let Some(event) = rx.recv().await {
            match event.payload {
                StreamPayload::Chunk(chunk) => content = chunk.full_content,
                StreamPayload::Complete(payload) => complete = Some(payload),
                StreamPayload::Error(err) => {
                    return Err(EngineError::Unavailable(err.message));
                }
                StreamPayload::TrajectoryEvent(_) => {}
            }
        }

        let payload = complete.ok_or_else(|| {
            EngineError::Unavailable("chat stream ended without completion".into())
        })?;
        Ok(ChatOutcome {
            conversation_id: payload.conversation_id,
            message: content.trim_end().to_string(),
            trajectory_id: payload.trajectory_id,
            trajectory: payload.trajectory,
        })
    }

    async fn stream_internal(
        &self,
        account_id: &str,
        message: &str,
        conversation_id: Option<&str>,
        stop: Arc<AtomicBool>,
        provider: Option<Arc<AnyProvider>>,
    ) -> EngineResult<mpsc::Receiver<StreamEvent>> {
        if account_id.trim().is_empty() {
            return Err(EngineError::Unauthorized("account id is required".into()));
        }

        // Resolve-or-create the conversation before any event is emitted.
        let conversation = match conversation_id {
            Some(id) => {
                let conversation = self
                    .store
                    .get_conversation(id)?
                    .ok_or_else(|| EngineError::not_found("Conversation", id))?;
                if conversation.account_id != account_id {
                    // Do not leak existence of other accounts' containers.
                    return Err(EngineError::not_found("Conversation", id));
                }
                conversation
            }
            None => self.store.create_conversation(account_id, Some(message))?,
        };

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let turn = Turn {
            store: self.store.clone(),
            engine: self.engine.clone(),
            reasoner: self.reasoner.clone(),
            provider,
            account_id: account_id.to_string(),
            message: message.to_string(),
            conversation_id: conversation.id,
            emitter: Emitter { tx, stop, next_id: 0 },
        };
        tokio::spawn(turn.run());

        Ok(rx)
    }
}

// ── Emitter ────────────────────────────────────────────────────────────────

struct Emitter {
    tx: mpsc::Sender<StreamEvent>,
    stop: Arc<AtomicBool>,
    next_id: u64,
}

impl Emitter {
    /// Yield one event. Returns false when the turn should cease: the stop
    /// signal fired or the receiver went away.
    async fn send(&mut self, payload: StreamPayload) -> bool {
        if self.stop.load(Ordering::Relaxed) {
            return false;
        }
        self.next_id += 1;
        let event = StreamEvent { id: self.next_id.to_string(), payload };
        self.tx.send(event).await.is_ok()
    }

    async fn trajectory_event(&mut self, payload: TrajectoryEventPayload) -> bool {
        self.send(StreamPayload::TrajectoryEvent(payload)).await
    }

    async fn error(&mut self, message: &str, detail: Option<String>) {
        let _ = self
            .send(StreamPayload::Error(ErrorPayload {
                message: message.to_string(),
                error: detail,
            }))
            .await;
    }
}

// ── The turn task ──────────────────────────────────────────────────────────

struct Turn {
    store: Arc<GraphStore>,
    engine: Arc<TrajectoryEngine>,
    reasoner: Arc<GraphReasoner>,
    provider: Option<Arc<AnyProvider>>,
    account_id: String,
    message: String,
    conversation_id: String,
    emitter: Emitter,
}

impl Turn {
    async fn run(mut self) {
        // History is loaded before this turn's user message is persisted.
        let history = match self.store.messages_for_conversation(&self.conversation_id) {
            Ok(messages) => messages,
            Err(e) => {
                self.emitter
                    .error("Failed to load conversation history", Some(e.to_string()))
                    .await;
                return;
            }
        };

        // S0: open the walk.
        let trajectory_id = match self.engine.start_trajectory(
            &self.account_id,
            &self.message,
            Some(&self.conversation_id),
        ) {
            Ok(id) => id,
            Err(e) => {
                self.emitter.error("Failed to start trajectory", Some(e.to_string())).await;
                return;
            }
        };

        let user_created_at = now_ms();
        let user_message = StoredMessage {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: self.conversation_id.clone(),
            role: Role::User,
            content: self.message.clone(),
            trajectory_id: Some(trajectory_id.clone()),
            created_at: user_created_at,
        };
        if let Err(e) = self.store.insert_message(&user_message) {
            self.emitter.error("Failed to persist message", Some(e.to_string())).await;
            return;
        }

        if !self
            .emitter
            .trajectory_event(TrajectoryEventPayload {
                event_type: "trajectory_start".into(),
                trajectory_id: Some(trajectory_id.clone()),
                ..Default::default()
            })
            .await
        {
            return;
        }

        // S1–S2: user tags become touch events.
        let user_tags = tags::extract_tags(&self.message);
        let context = tags::extract_decision_context(&self.message);
        let mut user_tag_names: Vec<String> = Vec::new();
        let mut new_entities = 0usize;

        for tag in &user_tags {
            let touched = match self.engine.touch_entity(
                &self.account_id,
                &trajectory_id,
                &tag.name,
                Some(&tag.entity_type),
                None,
                EventType::Touch,
                "user_message",
                None,
            ) {
                Ok(touched) => touched,
                Err(e) => {
                    self.emitter
                        .error("Failed to record entity touch", Some(e.to_string()))
                        .await;
                    return;
                }
            };
            if touched.created_entity {
                new_entities += 1;
            }
            user_tag_names.push(tag.name.clone());

            if !self
                .emitter
                .trajectory_event(TrajectoryEventPayload {
                    event_type: "touch".into(),
                    entity_id: Some(touched.entity_id),
                    name: Some(tag.name.clone()),
                    entity_type: Some(tag.entity_type.clone()),
                    source: Some("user_message".into()),
                    ..Default::default()
                })
                .await
            {
                return;
            }
        }

        // S3: simulate when the user referenced anything.
        let simulation = if user_tags.is_empty() {
            None
        } else {
            match self.simulate_for_tags(&trajectory_id, &user_tags).await {
                Ok(simulation) => simulation,
                Err(()) => return,
            }
        };

        // S4: prompt assembly.
        let system_prompt = prompt::build_system_prompt(simulation.as_ref());
        let turns = prompt::build_turns(&history, &self.message);

        if self
            .engine
            .log_event(
                &trajectory_id,
                EventInput {
                    event_type: EventType::Reason,
                    data: Some(serde_json::json!({"action": "generating_response"})),
                    ..Default::default()
                },
            )
            .is_err()
        {
            self.emitter.error("Failed to log reasoning event", None).await;
            return;
        }
        if !self
            .emitter
            .trajectory_event(TrajectoryEventPayload {
                event_type: "reason".into(),
                action: Some("generating_response".into()),
                ..Default::default()
            })
            .await
        {
            return;
        }

        // S5: open the model stream.
        let Some(provider) = self.provider.clone() else {
            warn!("[orchestrator] No language model configured — terminating stream");
            self.emitter
                .error("No language model configured", Some("missing API key".into()))
                .await;
            return;
        };
        let mut chunk_rx = match provider.chat_stream(&system_prompt, &turns).await {
            Ok(rx) => rx,
            Err(e) => {
                self.emitter
                    .error("Language model request failed", Some(e.to_string()))
                    .await;
                return;
            }
        };

        // S6: relay chunks, watching for cancellation between each.
        let mut full_content = String::new();
        while let Some(item) = chunk_rx.recv().await {
            match item {
                Ok(text) => {
                    full_content.push_str(&text);
                    if !self
                        .emitter
                        .send(StreamPayload::Chunk(ChunkPayload {
                            content: text,
                            full_content: full_content.clone(),
                        }))
                        .await
                    {
                        // Cancelled: drop the provider stream, leave the
                        // walk open, no completion.
                        return;
                    }
                }
                Err(e) => {
                    self.emitter
                        .error("Language model stream failed", Some(e.to_string()))
                        .await;
                    return;
                }
            }
        }

        // S7–S8: assistant tags become touches (already seen this walk) or
        // discoveries (new to the walk).
        let assistant_tags = tags::extract_tags(&full_content);
        for tag in &assistant_tags {
            let event_type = if user_tag_names.contains(&tag.name) {
                EventType::Touch
            } else {
                EventType::Discover
            };
            let touched = match self.engine.touch_entity(
                &self.account_id,
                &trajectory_id,
                &tag.name,
                Some(&tag.entity_type),
                None,
                event_type,
                "assistant_response",
                None,
            ) {
                Ok(touched) => touched,
                Err(e) => {
                    self.emitter
                        .error("Failed to record entity touch", Some(e.to_string()))
                        .await;
                    return;
                }
            };
            if touched.created_entity {
                new_entities += 1;
            }

            if !self
                .emitter
                .trajectory_event(TrajectoryEventPayload {
                    event_type: event_type.as_str().into(),
                    entity_id: Some(touched.entity_id),
                    name: Some(tag.name.clone()),
                    entity_type: Some(tag.entity_type.clone()),
                    source: Some("assistant_response".into()),
                    ..Default::default()
                })
                .await
            {
                return;
            }
        }

        // S9: decision record, carrying the extracted context.
        let entities_referenced = user_tags.len() + assistant_tags.len();
        let simulation_used = simulation.is_some();
        if self
            .engine
            .log_event(
                &trajectory_id,
                EventInput {
                    event_type: EventType::Decide,
                    data: Some(serde_json::json!({
                        "action": "respond",
                        "entities_referenced": entities_referenced,
                        "new_entities": new_entities,
                        "simulation_used": simulation_used,
                    })),
                    context: (!context.is_empty()).then(|| context.clone()),
                    ..Default::default()
                },
            )
            .is_err()
        {
            self.emitter.error("Failed to log decision event", None).await;
            return;
        }
        if !self
            .emitter
            .trajectory_event(TrajectoryEventPayload {
                event_type: "decide".into(),
                action: Some("respond".into()),
                entities_referenced: Some(entities_referenced),
                new_entities: Some(new_entities),
                simulation_used: Some(simulation_used),
                ..Default::default()
            })
            .await
        {
            return;
        }

        // S10: fold the walk into the graph. The input-hash lookup is
        // advisory: it only annotates the summary with how often this
        // starting point has been seen before.
        let similar_starts = self
            .store
            .count_similar_starts(input_hash(&self.message), &trajectory_id)
            .unwrap_or(0);
        let mut summary_text = summarize_turn(&self.message);
        if similar_starts > 0 {
            summary_text.push_str(&format!(" ({} similar walks recorded)", similar_starts));
        }
        let summary = match self.engine.complete_trajectory(
            &trajectory_id,
            &self.account_id,
            Some(&summary_text),
        ) {
            Ok(summary) => summary,
            Err(e) => {
                self.emitter
                    .error("Failed to complete trajectory", Some(e.to_string()))
                    .await;
                return;
            }
        };

        // S11: persist the assistant message.
        let assistant_message = StoredMessage {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: self.conversation_id.clone(),
            role: Role::Assistant,
            content: full_content.trim_end().to_string(),
            trajectory_id: Some(trajectory_id.clone()),
            created_at: now_ms().max(user_created_at + 1),
        };
        if let Err(e) = self.store.insert_message(&assistant_message) {
            self.emitter.error("Failed to persist message", Some(e.to_string())).await;
            return;
        }
        self.store.touch_conversation(&self.conversation_id).ok();

        // S12: terminal completion record.
        info!(
            "[orchestrator] Turn complete — trajectory {} ({} events emitted)",
            trajectory_id, self.emitter.next_id
        );
        self.emitter
            .send(StreamPayload::Complete(CompletePayload {
                conversation_id: self.conversation_id.clone(),
                message_id: assistant_message.id.clone(),
                trajectory_id,
                trajectory: summary,
            }))
            .await;
    }

    /// S3 helper: run the simulation, log it, emit its event. `Err(())`
    /// means the turn already emitted a terminal error or was cancelled.
    async fn simulate_for_tags(
        &mut self,
        trajectory_id: &str,
        user_tags: &[TagMention],
    ) -> Result<Option<SimulationResult>, ()> {
        let inputs: Vec<EntityInput> = user_tags
            .iter()
            .map(|tag| EntityInput::typed(&tag.name, &tag.entity_type))
            .collect();

        let simulation = match self.reasoner.simulate(&inputs) {
            Ok(simulation) => simulation,
            Err(e) => {
                self.emitter.error("Simulation failed", Some(e.to_string())).await;
                return Err(());
            }
        };

        if self
            .engine
            .log_event(
                trajectory_id,
                EventInput {
                    event_type: EventType::Simulate,
                    data: Some(serde_json::json!({
                        "resolved_count": simulation.resolved.len(),
                        "unresolved_count": simulation.unresolved.len(),
                        "outcome_count": simulation.outcomes.len(),
                        "differentiator_count": simulation.differentiators.len(),
                        "has_patterns": simulation.evidence.has_patterns,
                    })),
                    ..Default::default()
                },
            )
            .is_err()
        {
            self.emitter.error("Failed to log simulation event", None).await;
            return Err(());
        }

        if !self
            .emitter
            .trajectory_event(TrajectoryEventPayload {
                event_type: "simulate".into(),
                resolved_count: Some(simulation.resolved.len()),
                unresolved_count: Some(simulation.unresolved.len()),
                outcome_count: Some(simulation.outcomes.len()),
                differentiator_count: Some(simulation.differentiators.len()),
                has_patterns: Some(simulation.evidence.has_patterns),
                ..Default::default()
            })
            .await
        {
            return Err(());
        }

        Ok(Some(simulation))
    }
}

/// Short walk summary persisted on completion.
fn summarize_turn(message: &str) -> String {
    let trimmed = message.trim();
    if trimmed.chars().count() <= 120 {
        format!("Turn: {}", trimmed)
    } else {
        let cut: String = trimmed.chars().take(120).collect();
        format!("Turn: {}…", cut.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orchestrator_with_mock() -> AgentOrchestrator {
        let store = Arc::new(GraphStore::open_in_memory().unwrap());
        AgentOrchestrator::new(store, Some(AnyProvider::mock()))
    }

    fn orchestrator_without_llm() -> AgentOrchestrator {
        let store = Arc::new(GraphStore::open_in_memory().unwrap());
        AgentOrchestrator::new(store, None)
    }

    async fn drain(mut rx: mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }
        events
    }

    fn kind(event: &StreamEvent) -> &'static str {
        match &event.payload {
            StreamPayload::Chunk(_) => "chunk",
            StreamPayload::Complete(_) => "complete",
            StreamPayload::Error(_) => "error",
            StreamPayload::TrajectoryEvent(t) => match t.event_type.as_str() {
                "trajectory_start" => "trajectory_start",
                "touch" => "touch",
                "discover" => "discover",
                "simulate" => "simulate",
                "reason" => "reason",
                "decide" => "decide",
                other => panic!("unexpected trajectory event {}", other),
            },
        }
    }

    #[tokio::test]
    async fn test_stream_event_order_contract() {
        let orchestrator = orchestrator_with_mock();
        let rx = orchestrator
            .chat_stream(
                "alice",
                "Teaching [[topic:fractions]] with [[strategy:visual models]]",
                None,
                Arc::new(AtomicBool::new(false)),
            )
            .await
            .unwrap();
        let events = drain(rx).await;
        let kinds: Vec<&str> = events.iter().map(kind).collect();

        // Exactly one start, first.
        assert_eq!(kinds[0], "trajectory_start");
        assert_eq!(kinds.iter().filter(|k| **k == "trajectory_start").count(), 1);

        // Two user touches, then simulate, then reason, then chunks.
        let simulate_at = kinds.iter().position(|k| *k == "simulate").unwrap();
        let reason_at = kinds.iter().position(|k| *k == "reason").unwrap();
        let first_chunk = kinds.iter().position(|k| *k == "chunk").unwrap();
        assert!(kinds[1..simulate_at].iter().all(|k| *k == "touch"));
        assert!(simulate_at < reason_at && reason_at < first_chunk);
        assert!(kinds.iter().filter(|k| **k == "chunk").count() >= 1);

        // Mock response re-mentions user tags (touch) and proposes new
        // entities (discover) after the chunks.
        let decide_at = kinds.iter().position(|k| *k == "decide").unwrap();
        assert!(kinds[first_chunk..decide_at]
            .iter()
            .all(|k| matches!(*k, "chunk" | "touch" | "discover")));
        assert!(kinds[first_chunk..decide_at].contains(&"discover"));

        // Terminal complete, last.
        assert_eq!(*kinds.last().unwrap(), "complete");
        assert_eq!(kinds.iter().filter(|k| **k == "decide").count(), 1);

        // Event ids strictly increase.
        let ids: Vec<u64> = events.iter().map(|e| e.id.parse().unwrap()).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_stream_without_tags_skips_simulate() {
        let orchestrator = orchestrator_with_mock();
        let rx = orchestrator
            .chat_stream("alice", "hello there", None, Arc::new(AtomicBool::new(false)))
            .await
            .unwrap();
        let events = drain(rx).await;
        let kinds: Vec<&str> = events.iter().map(kind).collect();
        assert!(!kinds.contains(&"simulate"));
        assert_eq!(*kinds.last().unwrap(), "complete");
    }

    #[tokio::test]
    async fn test_stream_without_llm_emits_error_and_leaves_walk_open() {
        let orchestrator = orchestrator_without_llm();
        let rx = orchestrator
            .chat_stream("alice", "[[topic:fractions]]", None, Arc::new(AtomicBool::new(false)))
            .await
            .unwrap();
        let events = drain(rx).await;

        let kinds: Vec<&str> = events.iter().map(kind).collect();
        assert_eq!(*kinds.last().unwrap(), "error");
        assert_eq!(kinds.iter().filter(|k| **k == "error").count(), 1);
        assert!(!kinds.contains(&"chunk"));
        assert!(!kinds.contains(&"complete"));

        // The walk stays open (aborted, still queryable).
        let trajectories = orchestrator.store().trajectories_for_account("alice", 10).unwrap();
        assert_eq!(trajectories.len(), 1);
        assert!(trajectories[0].completed_at.is_none());
    }

    #[tokio::test]
    async fn test_cancellation_skips_completion() {
        // The stop signal is checked before every yield; tripping it before
        // the first one means the walk opens but nothing is emitted and
        // nothing completes.
        let orchestrator = orchestrator_with_mock();
        let stop = Arc::new(AtomicBool::new(true));
        let rx = orchestrator
            .chat_stream("alice", "[[topic:fractions]]", None, stop)
            .await
            .unwrap();

        let events = drain(rx).await;
        assert!(events.is_empty());

        let trajectories = orchestrator.store().trajectories_for_account("alice", 10).unwrap();
        assert_eq!(trajectories.len(), 1);
        assert!(trajectories[0].completed_at.is_none());
    }

    #[tokio::test]
    async fn test_unary_chat_with_mock_fallback() {
        // No provider configured: the unary path still serves the
        // deterministic mock response and completes the walk.
        let orchestrator = orchestrator_without_llm();
        let outcome = orchestrator
            .chat("alice", "Teaching [[topic:fractions]] with [[strategy:visual models]]", None)
            .await
            .unwrap();

        assert!(!outcome.message.is_empty());
        assert!(outcome.message.contains("[[strategy:think-pair-share]]"));
        assert_eq!(outcome.trajectory.entities_touched.len(), 2);
        assert!(!outcome.trajectory.entities_discovered.is_empty());

        let trajectory = orchestrator
            .store()
            .get_trajectory(&outcome.trajectory_id)
            .unwrap()
            .unwrap();
        assert!(trajectory.completed_at.is_some());

        // Both turn messages persisted, in order.
        let messages = orchestrator
            .store()
            .messages_for_conversation(&outcome.conversation_id)
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(
            messages[1].trajectory_id.as_deref(),
            Some(outcome.trajectory_id.as_str())
        );
    }

    #[tokio::test]
    async fn test_unary_chat_is_deterministic_for_same_input() {
        let orchestrator = orchestrator_without_llm();
        let first = orchestrator.chat("alice", "[[topic:fractions]]", None).await.unwrap();
        let second = orchestrator.chat("alice", "[[topic:fractions]]", None).await.unwrap();
        assert_eq!(first.message, second.message);
    }

    #[tokio::test]
    async fn test_continuing_a_conversation() {
        let orchestrator = orchestrator_without_llm();
        let first = orchestrator.chat("alice", "[[topic:fractions]]", None).await.unwrap();
        let second = orchestrator
            .chat("alice", "more on this", Some(&first.conversation_id))
            .await
            .unwrap();
        assert_eq!(first.conversation_id, second.conversation_id);

        let messages = orchestrator
            .store()
            .messages_for_conversation(&first.conversation_id)
            .unwrap();
        assert_eq!(messages.len(), 4);
    }

    #[tokio::test]
    async fn test_foreign_conversation_is_not_found() {
        let orchestrator = orchestrator_without_llm();
        let alice = orchestrator.chat("alice", "hello", None).await.unwrap();

        let result = orchestrator
            .chat_stream(
                "bob",
                "hi",
                Some(&alice.conversation_id),
                Arc::new(AtomicBool::new(false)),
            )
            .await;
        assert!(matches!(result, Err(EngineError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_empty_account_is_unauthorized() {
        let orchestrator = orchestrator_with_mock();
        let result = orchestrator
            .chat_stream("", "hello", None, Arc::new(AtomicBool::new(false)))
            .await;
        assert!(matches!(result, Err(EngineError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_turn_graph_effects_match_walk_contract() {
        // One mock turn: user tags touched, assistant discoveries folded
        // in, strategy→outcome linkage present.
        let orchestrator = orchestrator_with_mock();
        let outcome = orchestrator
            .chat("alice", "Trying [[strategy:visual models]] for [[topic:fractions]]", None)
            .await
            .unwrap();

        let store = orchestrator.store();
        let strategy = store.find_entity_by_normalized_name("visual models").unwrap().unwrap();
        let understanding = store
            .find_entity_by_normalized_name("improved understanding")
            .unwrap()
            .unwrap();
        assert_eq!(understanding.entity_type.as_deref(), Some("outcome"));

        // Discovered outcome gets a leads_to edge from the touched strategy.
        let edge = store.get_edge(&strategy.id, &understanding.id).unwrap().unwrap();
        assert_eq!(edge.relationship_type.as_deref(), Some("leads_to"));

        assert!(outcome
            .trajectory
            .entities_discovered
            .contains(&understanding.id));
    }
}
