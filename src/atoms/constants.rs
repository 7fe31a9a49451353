// ── Praxis Atoms: Engine Constants ─────────────────────────────────────────
// Tuning knobs for the tag grammar and the graph reasoner.
// Values here are behavioral contract, not style — change with care.

/// Entity types the tag grammar documents. Unknown types found in typed
/// tags are retained verbatim and become the entity's type on creation.
pub const KNOWN_ENTITY_TYPES: &[&str] = &[
    "topic",
    "misconception",
    "strategy",
    "context",
    "constraint",
    "outcome",
    "concept",
];

/// Entity type assigned to untyped `[[name]]` tags.
pub const DEFAULT_TAG_TYPE: &str = "topic";

/// Relationship type written on strategy→outcome edges.
pub const LEADS_TO: &str = "leads_to";

// ── Reasoner knobs ─────────────────────────────────────────────────────────

/// Baseline positive rate used when an entity has no outcome-edge votes.
/// A hard-coded placeholder rather than a computed marginal.
pub const BASELINE_POSITIVE_RATE: f64 = 0.5;

/// Positive rate above which a differentiator is classified `improves`.
pub const IMPROVES_THRESHOLD: f64 = 0.6;

/// Positive rate below which a differentiator is classified `reduces`.
pub const REDUCES_THRESHOLD: f64 = 0.4;

/// Candidates with `|rate - baseline|` at or below this are dropped.
pub const MIN_DIFFERENTIATOR_MAGNITUDE: f64 = 0.1;

/// How many co-occurring candidates to examine for differentiators.
pub const DIFFERENTIATOR_CANDIDATES: usize = 20;

/// How many differentiators to return.
pub const MAX_DIFFERENTIATORS: usize = 5;

/// Entity types eligible as differentiators.
pub const DIFFERENTIATOR_ROLES: &[&str] = &["context", "constraint", "strategy"];

/// Below this many total observations a counterfactual is `uncertain`.
pub const MIN_OBSERVATIONS: i64 = 5;

/// Net-effect deltas within ±this band are `neutral`.
pub const NET_EFFECT_BAND: f64 = 0.05;

/// Case-insensitive substrings that mark an outcome name as positive
/// for counterfactual net-effect classification.
pub const POSITIVE_OUTCOME_MARKERS: &[&str] =
    &["improved", "success", "understanding", "mastery", "effective"];

// ── Query knobs ────────────────────────────────────────────────────────────

/// Default BFS depth for centered graph queries.
pub const DEFAULT_GRAPH_DEPTH: u32 = 2;

/// Recent trajectories returned by the entity detail view.
pub const ENTITY_RECENT_TRAJECTORIES: usize = 5;

/// Conversation titles are seeded from the first user message, trimmed here.
pub const CONVERSATION_TITLE_MAX_CHARS: usize = 80;
