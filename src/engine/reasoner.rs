// Praxis Engine — Graph Reasoner
//
// Pure-read inference over the current graph state: project likely outcomes
// for a set of situation entities, surface the structural differentiators
// around them, and compare a counterfactual swap. Never reads trajectory
// events — edges and co-occurrences are the whole world model here.
//
// Outcome-edge lookup is bidirectional: historic rows may be oriented
// strategy→outcome or outcome→strategy, and both merge into one projection.

use log::info;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::atoms::constants::{
    BASELINE_POSITIVE_RATE, DIFFERENTIATOR_CANDIDATES, DIFFERENTIATOR_ROLES, IMPROVES_THRESHOLD,
    MAX_DIFFERENTIATORS, MIN_DIFFERENTIATOR_MAGNITUDE, MIN_OBSERVATIONS, NET_EFFECT_BAND,
    POSITIVE_OUTCOME_MARKERS, REDUCES_THRESHOLD,
};
use crate::atoms::error::EngineResult;
use crate::atoms::simulation::{
    CounterfactualComparison, CounterfactualResult, Differentiator, Effect, EntityChange,
    EntityInput, EvidenceSummary, NetEffect, OutcomeProjection, OutcomeShift, SimulationResult,
};
use crate::atoms::types::Entity;
use crate::engine::store::GraphStore;

/// Split of caller inputs into graph entities and unmatched names.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub resolved: Vec<Entity>,
    pub unresolved: Vec<String>,
}

pub struct GraphReasoner {
    store: Arc<GraphStore>,
}

impl GraphReasoner {
    pub fn new(store: Arc<GraphStore>) -> Self {
        Self { store }
    }

    /// Resolve inputs to entities: exact normalized-name (and type, when
    /// constrained) first, then best-touched substring match.
    pub fn resolve(&self, inputs: &[EntityInput]) -> EngineResult<Resolution> {
        let mut resolution = Resolution::default();
        let mut seen: HashSet<String> = HashSet::new();

        for input in inputs {
            let normalized = input.name.trim().to_lowercase();
            if normalized.is_empty() {
                continue;
            }
            let etype = input.entity_type.as_deref().map(|t| t.trim().to_lowercase());

            let hit = match self.store.resolve_exact(&normalized, etype.as_deref())? {
                Some(entity) => Some(entity),
                None => self.store.resolve_partial(&normalized)?,
            };

            match hit {
                Some(entity) => {
                    if seen.insert(entity.id.clone()) {
                        resolution.resolved.push(entity);
                    }
                }
                None => resolution.unresolved.push(input.name.clone()),
            }
        }
        Ok(resolution)
    }

    /// Project an outcome distribution and its differentiating factors for
    /// a proposed teaching situation.
    pub fn simulate(&self, inputs: &[EntityInput]) -> EngineResult<SimulationResult> {
        let Resolution { resolved, unresolved } = self.resolve(inputs)?;

        if resolved.is_empty() {
            return Ok(SimulationResult { unresolved, ..Default::default() });
        }

        let resolved_ids: Vec<String> = resolved.iter().map(|e| e.id.clone()).collect();
        let outcomes = self.project_outcomes_from_edges(&resolved_ids)?;
        let differentiators = self.find_differentiators_from_structure(&resolved_ids)?;

        let total_observations = outcomes.iter().map(|o| o.weight).sum();
        let evidence = EvidenceSummary {
            total_observations,
            outcome_count: outcomes.len(),
            has_patterns: !outcomes.is_empty() || !differentiators.is_empty(),
        };

        info!(
            "[reasoner] Simulated {} entities — {} outcomes, {} differentiators, {} observations",
            resolved.len(),
            outcomes.len(),
            differentiators.len(),
            total_observations
        );

        Ok(SimulationResult { resolved, unresolved, outcomes, differentiators, evidence })
    }

    /// Merge outcome edges in both orientations into one distribution.
    fn project_outcomes_from_edges(
        &self,
        resolved_ids: &[String],
    ) -> EngineResult<Vec<OutcomeProjection>> {
        let forward = self.store.edges_from(resolved_ids)?;
        let reverse = self.store.edges_to(resolved_ids)?;

        // Candidate outcome ids from both orientations.
        let mut candidate_ids: Vec<String> = Vec::new();
        for edge in forward.iter() {
            candidate_ids.push(edge.target_id.clone());
        }
        for edge in reverse.iter() {
            candidate_ids.push(edge.source_id.clone());
        }
        candidate_ids.sort();
        candidate_ids.dedup();

        let outcome_entities: HashMap<String, Entity> = self
            .store
            .entities_by_ids(&candidate_ids)?
            .into_iter()
            .filter(|e| e.entity_type.as_deref() == Some("outcome"))
            .map(|e| (e.id.clone(), e))
            .collect();

        let mut merged: HashMap<String, OutcomeProjection> = HashMap::new();
        let mut fold = |outcome_id: &str, weight: i64, pos: i64, neg: i64, mixed: i64, contrib: i64| {
            let Some(entity) = outcome_entities.get(outcome_id) else { return };
            let entry = merged
                .entry(outcome_id.to_string())
                .or_insert_with(|| OutcomeProjection {
                    entity_id: entity.id.clone(),
                    name: entity.name.clone(),
                    weight: 0,
                    probability: 0.0,
                    positive_count: 0,
                    negative_count: 0,
                    mixed_count: 0,
                    contributor_count: 0,
                });
            entry.weight += weight;
            entry.positive_count += pos;
            entry.negative_count += neg;
            entry.mixed_count += mixed;
            entry.contributor_count = entry.contributor_count.max(contrib);
        };

        for edge in &forward {
            fold(
                &edge.target_id,
                edge.weight,
                edge.positive_outcomes,
                edge.negative_outcomes,
                edge.mixed_outcomes,
                edge.contributor_count,
            );
        }
        for edge in &reverse {
            fold(
                &edge.source_id,
                edge.weight,
                edge.positive_outcomes,
                edge.negative_outcomes,
                edge.mixed_outcomes,
                edge.contributor_count,
            );
        }

        let total_weight: i64 = merged.values().map(|o| o.weight).sum();
        let mut outcomes: Vec<OutcomeProjection> = merged.into_values().collect();
        for outcome in outcomes.iter_mut() {
            outcome.probability = if total_weight > 0 {
                outcome.weight as f64 / total_weight as f64
            } else {
                0.0
            };
        }
        outcomes.sort_by(|a, b| {
            b.probability
                .partial_cmp(&a.probability)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(outcomes)
    }

    /// Context/constraint/strategy entities that co-occur strongly with the
    /// resolved set and whose outcome-edge profile deviates from baseline.
    fn find_differentiators_from_structure(
        &self,
        resolved_ids: &[String],
    ) -> EngineResult<Vec<Differentiator>> {
        let resolved_set: HashSet<&str> = resolved_ids.iter().map(|s| s.as_str()).collect();
        let rows = self.store.cooccurrences_involving(resolved_ids)?;

        // Other endpoint per row, strongest first (rows arrive count-desc).
        let mut candidate_strength: Vec<(String, i64)> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for row in &rows {
            let other = if resolved_set.contains(row.entity_a.as_str()) {
                if resolved_set.contains(row.entity_b.as_str()) {
                    continue;
                }
                &row.entity_b
            } else {
                &row.entity_a
            };
            if seen.insert(other.clone()) {
                candidate_strength.push((other.clone(), row.count));
            }
        }

        let candidate_ids: Vec<String> =
            candidate_strength.iter().map(|(id, _)| id.clone()).collect();
        let entities: HashMap<String, Entity> = self
            .store
            .entities_by_ids(&candidate_ids)?
            .into_iter()
            .filter(|e| {
                e.entity_type
                    .as_deref()
                    .map(|t| DIFFERENTIATOR_ROLES.contains(&t))
                    .unwrap_or(false)
            })
            .map(|e| (e.id.clone(), e))
            .collect();

        let mut differentiators: Vec<Differentiator> = Vec::new();
        for (candidate_id, strength) in candidate_strength
            .into_iter()
            .filter(|(id, _)| entities.contains_key(id))
            .take(DIFFERENTIATOR_CANDIDATES)
        {
            let Some(entity) = entities.get(&candidate_id).cloned() else { continue };

            // Forward outcome edges only; the valence counters they carry
            // are the (reserved) signal.
            let edges = self.store.edges_from(std::slice::from_ref(&candidate_id))?;
            let target_ids: Vec<String> = edges.iter().map(|e| e.target_id.clone()).collect();
            let outcome_targets: HashSet<String> = self
                .store
                .entities_by_ids(&target_ids)?
                .into_iter()
                .filter(|e| e.entity_type.as_deref() == Some("outcome"))
                .map(|e| e.id)
                .collect();

            let mut positive = 0i64;
            let mut negative = 0i64;
            for edge in edges.iter().filter(|e| outcome_targets.contains(&e.target_id)) {
                positive += edge.positive_outcomes;
                negative += edge.negative_outcomes;
            }

            let positive_rate = if positive + negative > 0 {
                positive as f64 / (positive + negative) as f64
            } else {
                BASELINE_POSITIVE_RATE
            };
            let magnitude = (positive_rate - BASELINE_POSITIVE_RATE).abs();
            if magnitude <= MIN_DIFFERENTIATOR_MAGNITUDE {
                continue;
            }

            let effect = if positive_rate > IMPROVES_THRESHOLD {
                Effect::Improves
            } else if positive_rate < REDUCES_THRESHOLD {
                Effect::Reduces
            } else {
                Effect::Mixed
            };

            let role = entity.entity_type.clone().unwrap_or_default();
            differentiators.push(Differentiator {
                entity,
                role,
                effect,
                magnitude,
                cooccurrence_strength: strength,
            });
        }

        differentiators.sort_by(|a, b| {
            b.magnitude
                .partial_cmp(&a.magnitude)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.entity.name.cmp(&b.entity.name))
        });
        differentiators.truncate(MAX_DIFFERENTIATORS);
        Ok(differentiators)
    }

    /// Compare the base situation against one with `change` applied.
    pub fn counterfactual(
        &self,
        base: &[EntityInput],
        change: &EntityChange,
    ) -> EngineResult<CounterfactualResult> {
        let original = self.simulate(base)?;

        let mut swapped = false;
        let mut alt: Vec<EntityInput> = base
            .iter()
            .map(|input| {
                if input_matches(input, &change.from) {
                    swapped = true;
                    change.to.clone()
                } else {
                    input.clone()
                }
            })
            .collect();
        if !swapped {
            alt.retain(|input| !input_matches(input, &change.from));
            alt.push(change.to.clone());
        }

        let alternative = self.simulate(&alt)?;
        let comparison = compare(&original, &alternative);

        Ok(CounterfactualResult {
            original,
            alternative,
            change: change.clone(),
            comparison,
        })
    }

    /// Render a simulation as the deterministic text block the model sees.
    /// Same input → byte-identical output.
    pub fn format_for_ai(result: &SimulationResult) -> String {
        let mut out = String::new();

        if result.resolved.is_empty() {
            out.push_str("No known entities matched this situation; no historical patterns are available.\n");
            return out;
        }

        out.push_str("Situation involves: ");
        let involved: Vec<String> = result
            .resolved
            .iter()
            .map(|e| match &e.entity_type {
                Some(t) => format!("{} ({})", e.name, t),
                None => e.name.clone(),
            })
            .collect();
        out.push_str(&involved.join(", "));
        out.push('\n');

        if !result.unresolved.is_empty() {
            out.push_str("Unrecognized: ");
            out.push_str(&result.unresolved.join(", "));
            out.push('\n');
        }

        if result.outcomes.is_empty() {
            out.push_str("Observed outcomes from similar situations: none recorded yet.\n");
        } else {
            out.push_str("Observed outcomes from similar situations:\n");
            for outcome in &result.outcomes {
                out.push_str(&format!(
                    "- {}: {}% likelihood ({} observations)\n",
                    outcome.name,
                    (outcome.probability * 100.0).round() as i64,
                    outcome.weight
                ));
            }
        }

        if !result.differentiators.is_empty() {
            out.push_str("Factors that may influence outcomes:\n");
            for diff in &result.differentiators {
                out.push_str(&format!(
                    "- {} ({}): {} outcomes (seen together {} times)\n",
                    diff.entity.name,
                    diff.role,
                    diff.effect.as_str(),
                    diff.cooccurrence_strength
                ));
            }
        }

        if result.evidence.total_observations < MIN_OBSERVATIONS {
            out.push_str(&format!(
                "Note: limited data — only {} total observations; treat these projections as weak signals.\n",
                result.evidence.total_observations
            ));
        }

        out
    }
}

/// Case-insensitive name match; type must also match when the pattern
/// constrains it.
fn input_matches(input: &EntityInput, pattern: &EntityInput) -> bool {
    if !input.name.trim().eq_ignore_ascii_case(pattern.name.trim()) {
        return false;
    }
    match &pattern.entity_type {
        Some(ptype) => input
            .entity_type
            .as_deref()
            .map(|t| t.eq_ignore_ascii_case(ptype))
            .unwrap_or(false),
        None => true,
    }
}

fn compare(original: &SimulationResult, alternative: &SimulationResult) -> CounterfactualComparison {
    // Every outcome appearing in either simulation.
    let mut names: Vec<String> = Vec::new();
    let mut base_probs: HashMap<&str, f64> = HashMap::new();
    let mut alt_probs: HashMap<&str, f64> = HashMap::new();
    for outcome in &original.outcomes {
        base_probs.insert(outcome.name.as_str(), outcome.probability);
        if !names.contains(&outcome.name) {
            names.push(outcome.name.clone());
        }
    }
    for outcome in &alternative.outcomes {
        alt_probs.insert(outcome.name.as_str(), outcome.probability);
        if !names.contains(&outcome.name) {
            names.push(outcome.name.clone());
        }
    }

    let mut outcome_shifts: Vec<OutcomeShift> = names
        .into_iter()
        .map(|name| {
            let base = base_probs.get(name.as_str()).copied().unwrap_or(0.0);
            let alt = alt_probs.get(name.as_str()).copied().unwrap_or(0.0);
            OutcomeShift { base_probability: base, alt_probability: alt, delta: alt - base, name }
        })
        .collect();
    outcome_shifts.sort_by(|a, b| {
        b.delta
            .abs()
            .partial_cmp(&a.delta.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });

    let positive_delta: f64 = outcome_shifts
        .iter()
        .filter(|shift| {
            let lower = shift.name.to_lowercase();
            POSITIVE_OUTCOME_MARKERS.iter().any(|marker| lower.contains(marker))
        })
        .map(|shift| shift.delta)
        .sum();

    let weakest_evidence = original
        .evidence
        .total_observations
        .min(alternative.evidence.total_observations);

    let net_effect = if weakest_evidence < MIN_OBSERVATIONS {
        NetEffect::Uncertain
    } else if positive_delta > NET_EFFECT_BAND {
        NetEffect::Positive
    } else if positive_delta < -NET_EFFECT_BAND {
        NetEffect::Negative
    } else {
        NetEffect::Neutral
    };

    let recommendation = match net_effect {
        NetEffect::Positive => {
            "The change shifts observed patterns toward positive outcomes; worth trying.".to_string()
        }
        NetEffect::Negative => {
            "The change shifts observed patterns away from positive outcomes; consider keeping the original approach.".to_string()
        }
        NetEffect::Neutral => {
            "The change shows no meaningful shift in observed outcomes.".to_string()
        }
        NetEffect::Uncertain => {
            "Not enough observations to judge this change; treat any difference as anecdotal.".to_string()
        }
    };

    CounterfactualComparison { outcome_shifts, net_effect, recommendation }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::EventType;
    use crate::engine::tags::extract_tags;
    use crate::engine::trajectory::TrajectoryEngine;

    fn fixture() -> (Arc<GraphStore>, TrajectoryEngine, GraphReasoner) {
        let store = Arc::new(GraphStore::open_in_memory().unwrap());
        let engine = TrajectoryEngine::new(store.clone());
        let reasoner = GraphReasoner::new(store.clone());
        (store, engine, reasoner)
    }

    fn run_turn(engine: &TrajectoryEngine, account: &str, text: &str) {
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
        engine.complete_trajectory(&tid, account, None).unwrap();
    }

    #[test]
    fn test_simulate_empty_input() {
        let (_, _, reasoner) = fixture();
        let result = reasoner.simulate(&[]).unwrap();
        assert!(!result.evidence.has_patterns);
        assert!(result.unresolved.is_empty());
        assert!(result.outcomes.is_empty());
    }

    #[test]
    fn test_simulate_only_unresolved() {
        let (_, _, reasoner) = fixture();
        let result = reasoner.simulate(&[EntityInput::named("never seen")]).unwrap();
        assert!(!result.evidence.has_patterns);
        assert_eq!(result.unresolved, vec!["never seen".to_string()]);
    }

    #[test]
    fn test_simulate_probabilities_sum_to_one() {
        let (_, engine, reasoner) = fixture();
        run_turn(&engine, "alice", "[[strategy:exit tickets]] [[outcome:improved recall]]");
        run_turn(&engine, "alice", "[[strategy:exit tickets]] [[outcome:higher engagement]]");
        run_turn(&engine, "alice", "[[strategy:exit tickets]] [[outcome:improved recall]]");

        let result = reasoner
            .simulate(&[EntityInput::typed("exit tickets", "strategy")])
            .unwrap();
        assert!(result.evidence.has_patterns);
        assert_eq!(result.outcomes.len(), 2);

        let total: f64 = result.outcomes.iter().map(|o| o.probability).sum();
        assert!((total - 1.0).abs() < 1e-9);
        // Sorted descending.
        assert!(result.outcomes[0].probability >= result.outcomes[1].probability);
        assert_eq!(result.outcomes[0].name, "improved recall");
    }

    #[test]
    fn test_outcome_merge_is_bidirectional() {
        let (store, engine, reasoner) = fixture();
        run_turn(&engine, "alice", "[[strategy:games]] [[outcome:mastery]]");

        // Historic reverse orientation: outcome→strategy.
        let games = store.find_entity_by_normalized_name("games").unwrap().unwrap();
        let mastery = store.find_entity_by_normalized_name("mastery").unwrap().unwrap();
        store.upsert_edge(&mastery.id, &games.id, None, true).unwrap();

        let result = reasoner.simulate(&[EntityInput::named("games")]).unwrap();
        assert_eq!(result.outcomes.len(), 1);
        assert_eq!(result.outcomes[0].weight, 2);
    }

    #[test]
    fn test_resolve_partial_fallback() {
        let (_, engine, reasoner) = fixture();
        run_turn(&engine, "alice", "[[topic:equivalent fractions]]");

        let resolution = reasoner.resolve(&[EntityInput::named("fractions")]).unwrap();
        assert_eq!(resolution.resolved.len(), 1);
        assert_eq!(resolution.resolved[0].normalized_name, "equivalent fractions");
    }

    #[test]
    fn test_counterfactual_swap_replaces_entity() {
        let (_, engine, reasoner) = fixture();
        run_turn(&engine, "alice", "[[strategy:lecture]] [[outcome:improved recall]]");
        run_turn(&engine, "alice", "[[strategy:games]] [[outcome:mastery]]");

        let result = reasoner
            .counterfactual(
                &[EntityInput::named("lecture")],
                &EntityChange {
                    from: EntityInput::named("Lecture"),
                    to: EntityInput::named("games"),
                },
            )
            .unwrap();

        let alt_names: Vec<&str> = result
            .alternative
            .resolved
            .iter()
            .map(|e| e.normalized_name.as_str())
            .collect();
        assert!(alt_names.contains(&"games"));
        assert!(!alt_names.contains(&"lecture"));
    }

    #[test]
    fn test_counterfactual_no_match_appends() {
        let (_, engine, reasoner) = fixture();
        run_turn(&engine, "alice", "[[topic:fractions]]");
        run_turn(&engine, "alice", "[[strategy:games]]");

        let result = reasoner
            .counterfactual(
                &[EntityInput::named("fractions")],
                &EntityChange {
                    from: EntityInput::named("lecture"),
                    to: EntityInput::named("games"),
                },
            )
            .unwrap();

        let alt_names: Vec<&str> = result
            .alternative
            .resolved
            .iter()
            .map(|e| e.normalized_name.as_str())
            .collect();
        assert!(alt_names.contains(&"fractions"));
        assert!(alt_names.contains(&"games"));
    }

    #[test]
    fn test_counterfactual_sparse_data_is_uncertain() {
        let (_, engine, reasoner) = fixture();
        run_turn(&engine, "alice", "[[strategy:lecture]] [[outcome:improved recall]]");

        let result = reasoner
            .counterfactual(
                &[EntityInput::named("lecture")],
                &EntityChange {
                    from: EntityInput::named("lecture"),
                    to: EntityInput::named("improved recall")
                },
            )
            .unwrap();

        // Fewer than five observations on either side forces uncertainty.
        assert_eq!(result.comparison.net_effect, NetEffect::Uncertain);
    }

    #[test]
    fn test_format_for_ai_is_deterministic() {
        let (_, engine, reasoner) = fixture();
        run_turn(&engine, "alice", "[[strategy:exit tickets]] [[outcome:improved recall]]");
        run_turn(&engine, "alice", "[[strategy:exit tickets]] [[outcome:higher engagement]]");

        let result = reasoner
            .simulate(&[EntityInput::typed("exit tickets", "strategy")])
            .unwrap();
        let first = GraphReasoner::format_for_ai(&result);
        let second = GraphReasoner::format_for_ai(&result);
        assert_eq!(first, second);
        assert!(first.contains("Situation involves: exit tickets (strategy)"));
        assert!(first.contains("Observed outcomes from similar situations:"));
        assert!(first.contains("limited data"));
    }

    #[test]
    fn test_format_for_ai_empty_resolution() {
        let (_, _, reasoner) = fixture();
        let result = reasoner.simulate(&[EntityInput::named("ghost")]).unwrap();
        let text = GraphReasoner::format_for_ai(&result);
        assert!(text.contains("No known entities matched"));
    }
}
