// ── Praxis Atoms: Stream Event Types ───────────────────────────────────────
//
// Typed records the orchestrator yields during a streamed chat turn. The
// transport frames these as SSE; the engine only guarantees the record
// shapes and the per-stream strictly-increasing `id` used for resume.

use serde::{Deserialize, Serialize};

/// One framed stream record. `id` is a strictly increasing decimal string
/// per stream so clients can resume from a last-seen id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub id: String,
    #[serde(flatten)]
    pub payload: StreamPayload,
}

/// The four wire event types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamPayload {
    Chunk(ChunkPayload),
    TrajectoryEvent(TrajectoryEventPayload),
    Complete(CompletePayload),
    Error(ErrorPayload),
}

/// Incremental assistant text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub content: String,
    pub full_content: String,
}

/// A trajectory-side event mirrored onto the stream. Which optional fields
/// are present depends on `event_type`; absent fields are omitted from JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryEventPayload {
    /// trajectory_start | touch | discover | reason | decide | simulate
    pub event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trajectory_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    /// Where the mention came from: user_message | assistant_response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub differentiator_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unresolved_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_patterns: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entities_referenced: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_entities: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulation_used: Option<bool>,
}

/// What one completed walk touched, discovered, and traversed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySummary {
    /// Entity ids, first-occurrence order.
    pub entities_touched: Vec<String>,
    /// Entity ids discovered and never plainly touched, first-occurrence order.
    pub entities_discovered: Vec<String>,
    /// Directed `source:target` edge keys, traversal order.
    pub edges_traversed: Vec<String>,
}

/// Terminal success record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletePayload {
    pub conversation_id: String,
    pub message_id: String,
    pub trajectory_id: String,
    pub trajectory: TrajectorySummary,
}

/// Terminal failure record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of the unary (non-streaming) chat path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatOutcome {
    pub conversation_id: String,
    pub message: String,
    pub trajectory_id: String,
    pub trajectory: TrajectorySummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_event_wire_shape() {
        let ev = StreamEvent {
            id: "3".into(),
            payload: StreamPayload::Chunk(ChunkPayload {
                content: "Hi".into(),
                full_content: "Hi".into(),
            }),
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["id"], "3");
        assert_eq!(json["type"], "chunk");
        assert_eq!(json["data"]["content"], "Hi");
    }

    #[test]
    fn test_trajectory_event_omits_absent_fields() {
        let ev = StreamEvent {
            id: "1".into(),
            payload: StreamPayload::TrajectoryEvent(TrajectoryEventPayload {
                event_type: "trajectory_start".into(),
                trajectory_id: Some("t1".into()),
                ..Default::default()
            }),
        };
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains("trajectory_start"));
        assert!(!json.contains("entity_id"));
        assert!(!json.contains("has_patterns"));
    }
}
