// ── Praxis Atoms: Simulation & Counterfactual Types ────────────────────────
//
// Result shapes produced by the graph reasoner. Pure data; the inference
// itself lives in engine/reasoner.rs.

use serde::{Deserialize, Serialize};

use super::types::Entity;

/// A caller-supplied entity reference: name plus optional type constraint.
/// Wire shape is `{name, type?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityInput {
    pub name: String,
    #[serde(
        default,
        rename = "type",
        alias = "entity_type",
        skip_serializing_if = "Option::is_none"
    )]
    pub entity_type: Option<String>,
}

impl EntityInput {
    pub fn named(name: &str) -> Self {
        Self { name: name.to_string(), entity_type: None }
    }

    pub fn typed(name: &str, entity_type: &str) -> Self {
        Self { name: name.to_string(), entity_type: Some(entity_type.to_string()) }
    }
}

/// One projected outcome with its share of the merged edge weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeProjection {
    pub entity_id: String,
    pub name: String,
    /// Merged across forward and reverse outcome edges.
    pub weight: i64,
    /// `weight / total_weight`, 0.0 when nothing was observed.
    pub probability: f64,
    pub positive_count: i64,
    pub negative_count: i64,
    pub mixed_count: i64,
    pub contributor_count: i64,
}

/// Direction of a differentiator's pull on outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Improves,
    Reduces,
    Mixed,
}

impl Effect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Effect::Improves => "improves",
            Effect::Reduces => "reduces",
            Effect::Mixed => "mixed",
        }
    }
}

/// A context/constraint/strategy entity whose outcome-edge profile deviates
/// from baseline and co-occurs strongly with the query set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Differentiator {
    pub entity: Entity,
    /// The entity's type, echoed as its role in the situation.
    pub role: String,
    pub effect: Effect,
    /// `|positive_rate - baseline|`, always > 0.1 for returned rows.
    pub magnitude: f64,
    /// Co-occurrence count with the resolved set.
    pub cooccurrence_strength: i64,
}

/// How much observed data backs a simulation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSummary {
    /// Sum of merged outcome-edge weights.
    pub total_observations: i64,
    pub outcome_count: usize,
    pub has_patterns: bool,
}

/// Projection of likely outcomes for a set of situation entities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub resolved: Vec<Entity>,
    /// Names that matched nothing in the graph.
    pub unresolved: Vec<String>,
    /// Sorted by probability descending.
    pub outcomes: Vec<OutcomeProjection>,
    /// Sorted by magnitude descending, at most five.
    pub differentiators: Vec<Differentiator>,
    pub evidence: EvidenceSummary,
}

impl Default for Effect {
    fn default() -> Self {
        Effect::Mixed
    }
}

// ── Counterfactual ─────────────────────────────────────────────────────────

/// The swap a counterfactual applies to the base situation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityChange {
    pub from: EntityInput,
    pub to: EntityInput,
}

/// Probability movement of one outcome between base and alternative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeShift {
    pub name: String,
    pub base_probability: f64,
    pub alt_probability: f64,
    pub delta: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetEffect {
    Positive,
    Negative,
    Neutral,
    Uncertain,
}

impl NetEffect {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetEffect::Positive => "positive",
            NetEffect::Negative => "negative",
            NetEffect::Neutral => "neutral",
            NetEffect::Uncertain => "uncertain",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterfactualComparison {
    /// Every outcome appearing in either simulation, sorted by |delta| desc.
    pub outcome_shifts: Vec<OutcomeShift>,
    pub net_effect: NetEffect,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterfactualResult {
    pub original: SimulationResult,
    pub alternative: SimulationResult,
    pub change: EntityChange,
    pub comparison: CounterfactualComparison,
}
