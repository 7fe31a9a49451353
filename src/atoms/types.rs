// ── Praxis Atoms: Graph & Trajectory Types ─────────────────────────────────
//
// Pure data types for the shared pedagogical knowledge graph and the
// per-turn trajectory log. No logic, no DB access, no I/O.
//
// Entities, edges and co-occurrences are GLOBAL (shared across accounts).
// Trajectories, contributions, conversations and messages are per-account.

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════
// SECTION 1: Entities & Provenance
// ═══════════════════════════════════════════════════════════════════════════

/// A node in the knowledge graph — topic, misconception, strategy, context,
/// constraint, outcome, concept, or any type a typed tag introduced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    /// Display name as first written.
    pub name: String,
    /// Lower-cased, trimmed lookup key. At most one entity per value.
    pub normalized_name: String,
    /// Sticky: adopted on first typed mention, never overwritten.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    /// First writer wins.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub touch_count: i64,
    pub trajectory_count: i64,
    pub contributor_count: i64,
    /// Epoch milliseconds.
    pub first_seen: i64,
    pub last_seen: i64,
}

/// Per-account provenance on a global entity. Exactly one row per
/// `(entity_id, account_id)` pair; creating it is the sole trigger for
/// bumping the parent entity's `contributor_count`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityContribution {
    pub entity_id: String,
    pub account_id: String,
    pub first_trajectory_id: String,
    pub touch_count: i64,
    pub trajectory_count: i64,
    pub first_seen: i64,
    pub last_seen: i64,
}

// ═══════════════════════════════════════════════════════════════════════════
// SECTION 2: Edges & Co-occurrence
// ═══════════════════════════════════════════════════════════════════════════

/// Directed weighted relation between two entities, accumulated from
/// adjacency in touch order or from strategy→outcome co-presence.
/// Keyed by the `(source_id, target_id)` pair; self-loops never exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    /// Cumulative traversal count; `weight >= trajectory_count >= 1`.
    pub weight: i64,
    pub trajectory_count: i64,
    pub contributor_count: i64,
    /// `"leads_to"` on strategy→outcome edges, else None.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationship_type: Option<String>,
    // Valence counters are reserved extension points: the engine reads them
    // during inference but never increments them.
    pub positive_outcomes: i64,
    pub negative_outcomes: i64,
    pub mixed_outcomes: i64,
    pub first_seen: i64,
    pub last_seen: i64,
}

impl Edge {
    /// Directed edge key, `source:target`. No canonicalisation.
    pub fn key(&self) -> String {
        format!("{}:{}", self.source_id, self.target_id)
    }
}

/// Undirected pair count. The key is canonical: `entity_a` is always the
/// lexicographically smaller id, so (a,b) and (b,a) share one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cooccurrence {
    pub entity_a: String,
    pub entity_b: String,
    pub count: i64,
    pub window_count: i64,
    pub trajectory_count: i64,
    pub contributor_count: i64,
    pub last_updated: i64,
}

/// Canonical orientation for a co-occurrence key: sort lexicographically.
pub fn cooccurrence_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SECTION 3: Trajectories & Events
// ═══════════════════════════════════════════════════════════════════════════

/// One ordered walk of events produced by a single chat turn.
/// Open until completed; thereafter immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub id: String,
    pub account_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub input_text: String,
    /// Cheap 32-bit rolling hash of `input_text`. Advisory: used only for
    /// similar-starting-point lookups; collisions are tolerated.
    pub input_hash: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub started_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
}

/// What a trajectory event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Touch,
    Discover,
    Reason,
    Decide,
    Simulate,
}

impl Default for EventType {
    fn default() -> Self {
        EventType::Reason
    }
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Touch => "touch",
            EventType::Discover => "discover",
            EventType::Reason => "reason",
            EventType::Decide => "decide",
            EventType::Simulate => "simulate",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "touch" => Some(EventType::Touch),
            "discover" => Some(EventType::Discover),
            "reason" => Some(EventType::Reason),
            "decide" => Some(EventType::Decide),
            "simulate" => Some(EventType::Simulate),
            _ => None,
        }
    }
}

/// Append-only event row. `sequence_num` is zero-based and gapless within
/// its trajectory; insertion order matches ascending sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryEvent {
    pub id: String,
    pub trajectory_id: String,
    pub sequence_num: i64,
    pub timestamp: i64,
    pub event_type: EventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    /// Opaque UI-advisory payload. The engine embeds `_context` (decision
    /// context) and the bookkeeping flags `_created` / `_new_contribution`;
    /// the set is otherwise open-ended and never modeled as a union.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Weak decision-context cues extracted from free prose. Advisory only:
/// serialized under `data._context`, never written to the graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub observations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_outcome: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prior_experience: Option<String>,
}

impl DecisionContext {
    pub fn is_empty(&self) -> bool {
        self.trigger.is_none()
            && self.observations.is_empty()
            && self.constraints.is_empty()
            && self.expected_outcome.is_none()
            && self.rationale.is_none()
            && self.prior_experience.is_none()
    }
}

/// A typed entity mention extracted from `[[type:name]]` / `[[name]]` markup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagMention {
    /// Lower-cased tag type; `"topic"` for untyped tags.
    pub entity_type: String,
    /// Trimmed, lower-cased name.
    pub name: String,
}

// ═══════════════════════════════════════════════════════════════════════════
// SECTION 4: Conversations & Messages
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub account_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "system" => Some(Role::System),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trajectory_id: Option<String>,
    pub created_at: i64,
}

// ═══════════════════════════════════════════════════════════════════════════
// SECTION 5: Input hash
// ═══════════════════════════════════════════════════════════════════════════

/// Cheap non-cryptographic 32-bit rolling hash (djb2 over UTF-8 bytes).
/// Stability across runs is not required for correctness; the hash is only
/// an advisory fingerprint for similar-starting-point lookups.
pub fn input_hash(text: &str) -> i64 {
    let mut h: u32 = 5381;
    for b in text.bytes() {
        h = h.wrapping_mul(33).wrapping_add(b as u32);
    }
    h as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cooccurrence_key_canonical() {
        assert_eq!(
            cooccurrence_key("b", "a"),
            ("a".to_string(), "b".to_string())
        );
        assert_eq!(
            cooccurrence_key("a", "b"),
            ("a".to_string(), "b".to_string())
        );
    }

    #[test]
    fn test_input_hash_stable_within_run() {
        let a = input_hash("Teaching [[topic:fractions]]");
        let b = input_hash("Teaching [[topic:fractions]]");
        assert_eq!(a, b);
        assert_ne!(a, input_hash("something else"));
    }

    #[test]
    fn test_input_hash_fits_u32() {
        let h = input_hash("any input at all");
        assert!(h >= 0 && h <= u32::MAX as i64);
    }

    #[test]
    fn test_event_type_round_trip() {
        for et in [
            EventType::Touch,
            EventType::Discover,
            EventType::Reason,
            EventType::Decide,
            EventType::Simulate,
        ] {
            assert_eq!(EventType::parse(et.as_str()), Some(et));
        }
        assert_eq!(EventType::parse("trajectory_start"), None);
    }

    #[test]
    fn test_decision_context_empty() {
        assert!(DecisionContext::default().is_empty());
        let ctx = DecisionContext {
            observations: vec!["students were stuck".into()],
            ..Default::default()
        };
        assert!(!ctx.is_empty());
    }
}
