// Praxis Engine — Trajectory Engine
//
// Lifecycle of one walk: start → log events → complete. Owns the
// per-trajectory sequence counters (single writer: the orchestrator holds
// the walk), entity find-or-create with contributor tracking, and the
// end-of-walk graph mutation: trajectory counts, co-occurrences, adjacency
// edges, and strategy→outcome edges.
//
// Completion is idempotent: re-completing a finished walk recomputes the
// summary from the persisted event log and performs zero counter writes.

use log::{info, warn};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::atoms::constants::LEADS_TO;
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::stream::TrajectorySummary;
use crate::atoms::types::{
    input_hash, DecisionContext, EventType, Trajectory, TrajectoryEvent,
};
use crate::engine::store::GraphStore;

/// Everything a caller can attach to one logged event.
#[derive(Debug, Clone, Default)]
pub struct EventInput {
    pub event_type: EventType,
    pub entity_id: Option<String>,
    pub data: Option<serde_json::Value>,
    pub context: Option<DecisionContext>,
}

/// Result of resolving-and-touching one tag mention.
#[derive(Debug, Clone)]
pub struct TouchedEntity {
    pub entity_id: String,
    pub created_entity: bool,
    pub new_contribution: bool,
}

pub struct TrajectoryEngine {
    store: Arc<GraphStore>,
    /// Next sequence number per open trajectory. Seeded lazily from the
    /// store when an open walk outlives the engine instance; discarded on
    /// completion.
    sequences: Mutex<HashMap<String, i64>>,
}

impl TrajectoryEngine {
    pub fn new(store: Arc<GraphStore>) -> Self {
        Self { store, sequences: Mutex::new(HashMap::new()) }
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    /// Open a new walk for one chat turn.
    pub fn start_trajectory(
        &self,
        account_id: &str,
        input_text: &str,
        conversation_id: Option<&str>,
    ) -> EngineResult<String> {
        if account_id.trim().is_empty() {
            return Err(EngineError::Unauthorized("account id is required".into()));
        }

        let trajectory = Trajectory {
            id: Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            conversation_id: conversation_id.map(|s| s.to_string()),
            input_text: input_text.to_string(),
            input_hash: input_hash(input_text),
            summary: None,
            started_at: chrono::Utc::now().timestamp_millis(),
            completed_at: None,
        };
        self.store.insert_trajectory(&trajectory)?;
        self.sequences.lock().insert(trajectory.id.clone(), 0);

        info!("[trajectory] Started walk {}", trajectory.id);
        Ok(trajectory.id)
    }

    /// Append one event with the next sequence number. A `touch` event that
    /// carries an entity id also bumps the entity's touch_count/last_seen.
    pub fn log_event(&self, trajectory_id: &str, input: EventInput) -> EngineResult<String> {
        let event_id = self.append_event(trajectory_id, &input)?;

        if input.event_type == EventType::Touch {
            if let Some(entity_id) = &input.entity_id {
                self.store.bump_entity_touch(entity_id)?;
            }
        }
        Ok(event_id)
    }

    /// Resolve a name to its global entity (creating it if new, tracking
    /// the contributing account) and append a touch/discover event for it.
    /// The touch is counted exactly once — inside find-or-create — so the
    /// appended event skips the counter bump of the raw `log_event` path.
    pub fn touch_entity(
        &self,
        account_id: &str,
        trajectory_id: &str,
        name: &str,
        entity_type: Option<&str>,
        description: Option<&str>,
        event_type: EventType,
        source: &str,
        context: Option<DecisionContext>,
    ) -> EngineResult<TouchedEntity> {
        if !matches!(event_type, EventType::Touch | EventType::Discover) {
            return Err(EngineError::Invariant(format!(
                "touch_entity cannot log {} events",
                event_type.as_str()
            )));
        }

        let outcome =
            self.store
                .find_or_create_entity(account_id, trajectory_id, name, entity_type, description)?;

        let mut data = serde_json::json!({
            "_source": source,
            "_created": outcome.created_entity,
            "_new_contribution": outcome.new_contribution,
        });
        if let Some(ctx) = &context {
            if !ctx.is_empty() {
                data["_context"] = serde_json::to_value(ctx)?;
            }
        }

        self.append_event(
            trajectory_id,
            &EventInput {
                event_type,
                entity_id: Some(outcome.entity_id.clone()),
                data: Some(data),
                context: None,
            },
        )?;

        Ok(TouchedEntity {
            entity_id: outcome.entity_id,
            created_entity: outcome.created_entity,
            new_contribution: outcome.new_contribution,
        })
    }

    /// Thin passthrough for callers that only need the identity.
    pub fn find_or_create_entity(
        &self,
        account_id: &str,
        trajectory_id: &str,
        name: &str,
        entity_type: Option<&str>,
        description: Option<&str>,
    ) -> EngineResult<String> {
        if account_id.trim().is_empty() {
            return Err(EngineError::Unauthorized("account id is required".into()));
        }
        let outcome = self
            .store
            .find_or_create_entity(account_id, trajectory_id, name, entity_type, description)?;
        Ok(outcome.entity_id)
    }

    /// Close the walk and fold it into the graph. Runs, in order: mark
    /// complete → replay events → trajectory-count bumps → co-occurrence
    /// pairs → adjacency edges → strategy×outcome edges → drop the counter.
    pub fn complete_trajectory(
        &self,
        trajectory_id: &str,
        account_id: &str,
        summary: Option<&str>,
    ) -> EngineResult<TrajectorySummary> {
        let trajectory = self
            .store
            .get_trajectory(trajectory_id)?
            .ok_or_else(|| EngineError::not_found("Trajectory", trajectory_id))?;
        if trajectory.account_id != account_id {
            return Err(EngineError::Forbidden(format!(
                "trajectory {} belongs to another account",
                trajectory_id
            )));
        }

        let events = self.store.events_for_trajectory(trajectory_id)?;
        let walk = WalkSets::from_events(&events);

        // Replay of an already-completed walk: same summary, zero writes.
        if trajectory.completed_at.is_some() {
            info!("[trajectory] Walk {} already complete — replaying summary", trajectory_id);
            self.sequences.lock().remove(trajectory_id);
            return Ok(walk.into_summary());
        }

        self.store.set_trajectory_completed(
            trajectory_id,
            summary,
            chrono::Utc::now().timestamp_millis(),
        )?;

        // Trajectory counts. Rows whose initial counters already count this
        // walk (created here, or first contribution here) are skipped.
        for entity_id in &walk.all {
            let flags = walk.provenance.get(entity_id).copied().unwrap_or_default();
            self.store.bump_trajectory_counts(
                entity_id,
                account_id,
                !flags.created,
                !flags.new_contribution,
            )?;
        }

        // Co-occurrence: every unordered pair that shared this walk.
        for i in 0..walk.all.len() {
            for j in (i + 1)..walk.all.len() {
                self.store.upsert_cooccurrence(&walk.all[i], &walk.all[j])?;
            }
        }

        // Edge strengthening along the touch order.
        let mut traversed: Vec<(String, String)> = Vec::new();
        for pair in walk.touched.windows(2) {
            let (source, target) = (&pair[0], &pair[1]);
            if source == target {
                continue;
            }
            self.store.upsert_edge(source, target, None, true)?;
            traversed.push((source.clone(), target.clone()));
        }

        // Strategy→outcome edges, independent of adjacency. A pair already
        // strengthened above only adopts the relationship type, so one walk
        // counts one traversal.
        let entities = self.store.entities_by_ids(&walk.all)?;
        let strategies: Vec<&String> = entities
            .iter()
            .filter(|e| e.entity_type.as_deref() == Some("strategy"))
            .map(|e| &e.id)
            .collect();
        let outcomes: Vec<&String> = entities
            .iter()
            .filter(|e| e.entity_type.as_deref() == Some("outcome"))
            .map(|e| &e.id)
            .collect();
        for s in &strategies {
            for o in &outcomes {
                if s == o {
                    continue;
                }
                let already = traversed.iter().any(|(a, b)| a == *s && b == *o);
                self.store.upsert_edge(s, o, Some(LEADS_TO), !already)?;
            }
        }

        self.sequences.lock().remove(trajectory_id);

        let summary = walk.into_summary();
        info!(
            "[trajectory] Completed walk {} — {} touched, {} discovered, {} edges",
            trajectory_id,
            summary.entities_touched.len(),
            summary.entities_discovered.len(),
            summary.edges_traversed.len()
        );
        Ok(summary)
    }

    // ── Internals ──────────────────────────────────────────────────────

    /// Append with the next sequence number, verifying the walk is open.
    fn append_event(&self, trajectory_id: &str, input: &EventInput) -> EngineResult<String> {
        let sequence_num = self.next_sequence(trajectory_id)?;

        let mut data = input.data.clone();
        if let Some(ctx) = &input.context {
            if !ctx.is_empty() {
                let blob = data.get_or_insert_with(|| serde_json::json!({}));
                blob["_context"] = serde_json::to_value(ctx)?;
            }
        }

        let event = TrajectoryEvent {
            id: Uuid::new_v4().to_string(),
            trajectory_id: trajectory_id.to_string(),
            sequence_num,
            timestamp: chrono::Utc::now().timestamp_millis(),
            event_type: input.event_type,
            entity_id: input.entity_id.clone(),
            data,
        };
        self.store.insert_event(&event)?;
        Ok(event.id)
    }

    fn next_sequence(&self, trajectory_id: &str) -> EngineResult<i64> {
        let mut sequences = self.sequences.lock();
        if let Some(next) = sequences.get_mut(trajectory_id) {
            let seq = *next;
            *next += 1;
            return Ok(seq);
        }

        // Not in memory: the walk either never existed, finished, or
        // predates this engine instance. Re-seed from the store.
        let trajectory = self
            .store
            .get_trajectory(trajectory_id)?
            .ok_or_else(|| EngineError::not_found("Trajectory", trajectory_id))?;
        if trajectory.completed_at.is_some() {
            warn!("[trajectory] Append rejected: walk {} already complete", trajectory_id);
            return Err(EngineError::Invariant(format!(
                "cannot append event to completed trajectory {}",
                trajectory_id
            )));
        }

        let next = self.store.max_sequence_num(trajectory_id)?.map_or(0, |m| m + 1);
        sequences.insert(trajectory_id.to_string(), next + 1);
        Ok(next)
    }
}

/// Per-entity provenance flags recorded on the first event touching it.
#[derive(Debug, Clone, Copy, Default)]
struct ProvenanceFlags {
    created: bool,
    new_contribution: bool,
}

/// The touched/discovered/all sets replayed from one walk's event log.
struct WalkSets {
    /// Unique touch-event entity ids, first-occurrence order.
    touched: Vec<String>,
    /// Unique discover-event ids not already touched, first-occurrence order.
    discovered: Vec<String>,
    /// touched ∪ discovered.
    all: Vec<String>,
    provenance: HashMap<String, ProvenanceFlags>,
}

impl WalkSets {
    fn from_events(events: &[TrajectoryEvent]) -> Self {
        let mut touched: Vec<String> = Vec::new();
        let mut discovered: Vec<String> = Vec::new();
        let mut seen_touch: HashSet<&str> = HashSet::new();
        let mut provenance: HashMap<String, ProvenanceFlags> = HashMap::new();

        for ev in events {
            let Some(entity_id) = &ev.entity_id else { continue };

            if let Some(data) = &ev.data {
                provenance.entry(entity_id.clone()).or_insert(ProvenanceFlags {
                    created: data["_created"].as_bool().unwrap_or(false),
                    new_contribution: data["_new_contribution"].as_bool().unwrap_or(false),
                });
            } else {
                provenance.entry(entity_id.clone()).or_default();
            }

            match ev.event_type {
                EventType::Touch => {
                    if seen_touch.insert(entity_id) {
                        touched.push(entity_id.clone());
                    }
                }
                EventType::Discover => {
                    if !discovered.contains(entity_id) {
                        discovered.push(entity_id.clone());
                    }
                }
                _ => {}
            }
        }

        // Discoveries that were also plainly touched collapse into touched.
        discovered.retain(|id| !seen_touch.contains(id.as_str()));

        let mut all = touched.clone();
        all.extend(discovered.iter().cloned());

        WalkSets { touched, discovered, all, provenance }
    }

    fn into_summary(self) -> TrajectorySummary {
        let edges_traversed = self
            .touched
            .windows(2)
            .filter(|pair| pair[0] != pair[1])
            .map(|pair| format!("{}:{}", pair[0], pair[1]))
            .collect();
        TrajectorySummary {
            entities_touched: self.touched,
            entities_discovered: self.discovered,
            edges_traversed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tags::extract_tags;

    fn engine() -> TrajectoryEngine {
        TrajectoryEngine::new(Arc::new(GraphStore::open_in_memory().unwrap()))
    }

    /// Run one full turn the way the orchestrator does: tag-parse, touch
    /// every mention, complete.
    fn run_turn(engine: &TrajectoryEngine, account: &str, text: &str) -> TrajectorySummary {
        let tid = engine.start_trajectory(account, text, None).unwrap();
        for tag in extract_tags(text) {
            engine
                .touch_entity(
                    account,
                    &tid,
                    &tag.name,
                    Some(&tag.entity_type),
                    None,
                    EventType::Touch,
                    "user_message",
                    None,
                )
                .unwrap();
        }
        engine.complete_trajectory(&tid, account, None).unwrap()
    }

    #[test]
    fn test_sequence_numbers_gapless() {
        let e = engine();
        let tid = e.start_trajectory("acct", "hello", None).unwrap();
        for _ in 0..4 {
            e.log_event(&tid, EventInput { event_type: EventType::Reason, ..Default::default() })
                .unwrap();
        }
        let events = e.store().events_for_trajectory(&tid).unwrap();
        let seqs: Vec<i64> = events.iter().map(|ev| ev.sequence_num).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_fresh_walk_single_message() {
        // One typed message on a fresh store: two entities, one edge, one
        // co-occurrence, all counters at 1.
        let e = engine();
        let summary = run_turn(&e, "alice", "Teaching [[topic:fractions]] with [[strategy:visual models]]");

        assert_eq!(summary.entities_touched.len(), 2);
        assert!(summary.entities_discovered.is_empty());
        assert_eq!(summary.edges_traversed.len(), 1);

        let store = e.store();
        let fractions = store.find_entity_by_normalized_name("fractions").unwrap().unwrap();
        let models = store.find_entity_by_normalized_name("visual models").unwrap().unwrap();
        for entity in [&fractions, &models] {
            assert_eq!(entity.touch_count, 1);
            assert_eq!(entity.trajectory_count, 1);
            assert_eq!(entity.contributor_count, 1);
        }

        let edge = store.get_edge(&fractions.id, &models.id).unwrap().unwrap();
        assert_eq!(edge.weight, 1);
        assert_eq!(edge.trajectory_count, 1);

        let cooc = store.get_cooccurrence(&fractions.id, &models.id).unwrap().unwrap();
        assert_eq!(cooc.count, 1);
    }

    #[test]
    fn test_same_user_same_message_twice() {
        let e = engine();
        let text = "Teaching [[topic:fractions]] with [[strategy:visual models]]";
        run_turn(&e, "alice", text);
        run_turn(&e, "alice", text);

        let store = e.store();
        let fractions = store.find_entity_by_normalized_name("fractions").unwrap().unwrap();
        let models = store.find_entity_by_normalized_name("visual models").unwrap().unwrap();
        for entity in [&fractions, &models] {
            assert_eq!(entity.touch_count, 2);
            assert_eq!(entity.trajectory_count, 2);
            assert_eq!(entity.contributor_count, 1);
        }

        let edge = store.get_edge(&fractions.id, &models.id).unwrap().unwrap();
        assert_eq!(edge.weight, 2);
        let cooc = store.get_cooccurrence(&fractions.id, &models.id).unwrap().unwrap();
        assert_eq!(cooc.count, 2);
    }

    #[test]
    fn test_second_user_same_message() {
        let e = engine();
        let text = "Teaching [[topic:fractions]] with [[strategy:visual models]]";
        run_turn(&e, "alice", text);
        run_turn(&e, "alice", text);
        run_turn(&e, "bob", text);

        let store = e.store();
        let fractions = store.find_entity_by_normalized_name("fractions").unwrap().unwrap();
        assert_eq!(fractions.contributor_count, 2);
        assert_eq!(store.contribution_count(&fractions.id).unwrap(), 2);

        let models = store.find_entity_by_normalized_name("visual models").unwrap().unwrap();
        let edge = store.get_edge(&fractions.id, &models.id).unwrap().unwrap();
        assert_eq!(edge.weight, 3);
    }

    #[test]
    fn test_strategy_outcome_linkage() {
        // The leads_to edge exists regardless of adjacency in touch order.
        let e = engine();
        run_turn(
            &e,
            "alice",
            "Tried [[strategy:exit tickets]] on [[topic:fractions]] and saw [[outcome:improved recall]]",
        );

        let store = e.store();
        let strategy = store.find_entity_by_normalized_name("exit tickets").unwrap().unwrap();
        let outcome = store.find_entity_by_normalized_name("improved recall").unwrap().unwrap();
        let edge = store.get_edge(&strategy.id, &outcome.id).unwrap().unwrap();
        assert_eq!(edge.relationship_type.as_deref(), Some("leads_to"));
        assert_eq!(edge.weight, 1);
    }

    #[test]
    fn test_adjacent_strategy_outcome_counts_once() {
        let e = engine();
        run_turn(&e, "alice", "[[strategy:exit tickets]] [[outcome:improved recall]]");

        let store = e.store();
        let strategy = store.find_entity_by_normalized_name("exit tickets").unwrap().unwrap();
        let outcome = store.find_entity_by_normalized_name("improved recall").unwrap().unwrap();
        let edge = store.get_edge(&strategy.id, &outcome.id).unwrap().unwrap();
        // Adjacency already traversed the pair; leads_to only marks it.
        assert_eq!(edge.weight, 1);
        assert_eq!(edge.relationship_type.as_deref(), Some("leads_to"));
    }

    #[test]
    fn test_complete_is_idempotent() {
        let e = engine();
        let text = "[[topic:fractions]] [[strategy:games]]";
        let tid = e.start_trajectory("alice", text, None).unwrap();
        for tag in extract_tags(text) {
            e.touch_entity(
                "alice",
                &tid,
                &tag.name,
                Some(&tag.entity_type),
                None,
                EventType::Touch,
                "user_message",
                None,
            )
            .unwrap();
        }
        let first = e.complete_trajectory(&tid, "alice", Some("walk one")).unwrap();
        let second = e.complete_trajectory(&tid, "alice", Some("ignored")).unwrap();
        assert_eq!(first, second);

        let store = e.store();
        let fractions = store.find_entity_by_normalized_name("fractions").unwrap().unwrap();
        assert_eq!(fractions.trajectory_count, 1);
        assert_eq!(fractions.touch_count, 1);

        let games = store.find_entity_by_normalized_name("games").unwrap().unwrap();
        let edge = store.get_edge(&fractions.id, &games.id).unwrap().unwrap();
        assert_eq!(edge.weight, 1);

        let trajectory = store.get_trajectory(&tid).unwrap().unwrap();
        assert_eq!(trajectory.summary.as_deref(), Some("walk one"));
    }

    #[test]
    fn test_append_after_complete_is_invariant_error() {
        let e = engine();
        let tid = e.start_trajectory("alice", "[[topic:fractions]]", None).unwrap();
        e.complete_trajectory(&tid, "alice", None).unwrap();

        let result = e.log_event(
            &tid,
            EventInput { event_type: EventType::Reason, ..Default::default() },
        );
        assert!(matches!(result, Err(EngineError::Invariant(_))));
    }

    #[test]
    fn test_discover_joins_all_but_not_edges() {
        let e = engine();
        let tid = e.start_trajectory("alice", "text", None).unwrap();
        e.touch_entity("alice", &tid, "fractions", Some("topic"), None, EventType::Touch, "user_message", None)
            .unwrap();
        e.touch_entity("alice", &tid, "number lines", Some("strategy"), None, EventType::Discover, "assistant_response", None)
            .unwrap();
        let summary = e.complete_trajectory(&tid, "alice", None).unwrap();

        assert_eq!(summary.entities_touched.len(), 1);
        assert_eq!(summary.entities_discovered.len(), 1);
        assert!(summary.edges_traversed.is_empty());

        // Discovered entities still co-occur with the touched set.
        let store = e.store();
        let fractions = store.find_entity_by_normalized_name("fractions").unwrap().unwrap();
        let lines = store.find_entity_by_normalized_name("number lines").unwrap().unwrap();
        assert!(store.get_cooccurrence(&fractions.id, &lines.id).unwrap().is_some());
    }

    #[test]
    fn test_discover_of_touched_entity_collapses() {
        let e = engine();
        let tid = e.start_trajectory("alice", "text", None).unwrap();
        e.touch_entity("alice", &tid, "fractions", None, None, EventType::Touch, "user_message", None)
            .unwrap();
        e.touch_entity("alice", &tid, "fractions", None, None, EventType::Discover, "assistant_response", None)
            .unwrap();
        let summary = e.complete_trajectory(&tid, "alice", None).unwrap();
        assert_eq!(summary.entities_touched.len(), 1);
        assert!(summary.entities_discovered.is_empty());
    }

    #[test]
    fn test_raw_touch_event_bumps_entity() {
        let e = engine();
        let tid = e.start_trajectory("alice", "text", None).unwrap();
        let entity_id = e
            .find_or_create_entity("alice", &tid, "fractions", None, None)
            .unwrap();
        // Raw path: caller already has the id, log_event does the bump.
        e.log_event(
            &tid,
            EventInput {
                event_type: EventType::Touch,
                entity_id: Some(entity_id.clone()),
                ..Default::default()
            },
        )
        .unwrap();

        let entity = e.store().find_entity_by_id(&entity_id).unwrap().unwrap();
        assert_eq!(entity.touch_count, 2);
    }

    #[test]
    fn test_decision_context_serialized_under_data() {
        let e = engine();
        let tid = e.start_trajectory("alice", "text", None).unwrap();
        let ctx = DecisionContext {
            constraints: vec!["we only have 20 minutes".into()],
            ..Default::default()
        };
        e.log_event(
            &tid,
            EventInput {
                event_type: EventType::Decide,
                context: Some(ctx),
                data: Some(serde_json::json!({"action": "respond"})),
                ..Default::default()
            },
        )
        .unwrap();

        let events = e.store().events_for_trajectory(&tid).unwrap();
        let data = events[0].data.as_ref().unwrap();
        assert_eq!(data["action"], "respond");
        assert_eq!(data["_context"]["constraints"][0], "we only have 20 minutes");
    }

    #[test]
    fn test_complete_requires_owner() {
        let e = engine();
        let tid = e.start_trajectory("alice", "text", None).unwrap();
        let result = e.complete_trajectory(&tid, "mallory", None);
        assert!(matches!(result, Err(EngineError::Forbidden(_))));
    }

    #[test]
    fn test_empty_account_rejected() {
        let e = engine();
        let result = e.start_trajectory("  ", "text", None);
        assert!(matches!(result, Err(EngineError::Unauthorized(_))));
    }
}
