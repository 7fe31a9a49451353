// Praxis — pedagogical knowledge-graph chat engine.
//
// A chat turn flows: user text → tag parser → trajectory engine (touches)
// → graph reasoner (simulate) → prompt assembly → provider stream →
// assistant tags (touch/discover) → trajectory completion → complete event.
//
// The crate is transport-agnostic: account identity is an opaque string,
// and streamed turns arrive as typed records a host frames as SSE. The
// orchestrator is the front door; the engine, reasoner and query types are
// exposed for hosts that need direct access.

pub mod atoms;
pub mod engine;

pub use atoms::error::{EngineError, EngineResult};
pub use atoms::simulation::{
    CounterfactualComparison, CounterfactualResult, Differentiator, Effect, EntityChange,
    EntityInput, EvidenceSummary, NetEffect, OutcomeProjection, OutcomeShift, SimulationResult,
};
pub use atoms::stream::{
    ChatOutcome, ChunkPayload, CompletePayload, ErrorPayload, StreamEvent, StreamPayload,
    TrajectoryEventPayload, TrajectorySummary,
};
pub use atoms::traits::{ChatTurn, LlmProvider, ProviderError, TextStream};
pub use atoms::types::{
    Conversation, Cooccurrence, DecisionContext, Edge, Entity, EntityContribution, EventType,
    Role, StoredMessage, TagMention, Trajectory, TrajectoryEvent,
};

pub use engine::config::EngineConfig;
pub use engine::orchestrator::AgentOrchestrator;
pub use engine::providers::{AnthropicProvider, AnyProvider, MockProvider, ProviderKind};
pub use engine::query::{EntityDetail, GraphOptions, GraphQuery, GraphView, NeighborEntity};
pub use engine::reasoner::{GraphReasoner, Resolution};
pub use engine::store::GraphStore;
pub use engine::tags::{extract_decision_context, extract_tags};
pub use engine::trajectory::{EventInput, TouchedEntity, TrajectoryEngine};
