// Praxis Engine — Prompt Assembly
//
// Composes the system prompt for one chat turn: the assistant's standing
// instructions (including the tag grammar it must emit), plus the
// simulation context block when the graph had something to say.
//
// Sections are assembled in a fixed order so the prompt is deterministic
// for a given simulation result and history.

use crate::atoms::simulation::SimulationResult;
use crate::atoms::traits::ChatTurn;
use crate::atoms::types::{Role, StoredMessage};
use crate::engine::reasoner::GraphReasoner;

/// Standing instructions. The tag grammar here is load-bearing: assistant
/// responses are re-parsed for `[[type:name]]` mentions, and `topic` vs
/// `concept` is distinguished so untyped tags stay coarse-grained.
const SYSTEM_PREAMBLE: &str = "\
You are a pedagogical content knowledge assistant. You help teachers reason \
about teaching situations: topics, common misconceptions, instructional \
strategies, classroom contexts, constraints, and likely outcomes.

When you mention a pedagogical entity, mark it inline with typed tags:
[[topic:fractions]], [[misconception:bigger denominator means bigger]],
[[strategy:visual models]], [[context:small groups]], [[constraint:20 minute
periods]], [[outcome:improved recall]]. Use [[concept:...]] for abstract
ideas that are not themselves teachable topics. Untyped [[name]] tags are
treated as topics.

Ground advice in the observed patterns below when they are present, and say
so when they are absent. Be concrete and brief.";

/// Header printed above the simulation block.
const SIMULATION_HEADER: &str = "Observed patterns from the shared knowledge graph:";

/// Assemble the system prompt for one turn.
pub fn build_system_prompt(simulation: Option<&SimulationResult>) -> String {
    let mut prompt = String::from(SYSTEM_PREAMBLE);

    if let Some(result) = simulation {
        if result.evidence.has_patterns || !result.resolved.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(SIMULATION_HEADER);
            prompt.push('\n');
            prompt.push_str(&GraphReasoner::format_for_ai(result));
        }
    }

    prompt
}

/// Convert persisted conversation history into provider turns, appending
/// the current user message last. System rows are dropped — the system
/// prompt is rebuilt fresh each turn.
pub fn build_turns(history: &[StoredMessage], user_message: &str) -> Vec<ChatTurn> {
    let mut turns: Vec<ChatTurn> = history
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| ChatTurn { role: m.role, content: m.content.clone() })
        .collect();
    turns.push(ChatTurn::user(user_message));
    turns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::simulation::{EvidenceSummary, SimulationResult};

    #[test]
    fn test_prompt_without_simulation() {
        let prompt = build_system_prompt(None);
        assert!(prompt.contains("[[topic:fractions]]"));
        assert!(!prompt.contains(SIMULATION_HEADER));
    }

    #[test]
    fn test_prompt_with_patterns() {
        let result = SimulationResult {
            evidence: EvidenceSummary { total_observations: 3, outcome_count: 1, has_patterns: true },
            ..Default::default()
        };
        let prompt = build_system_prompt(Some(&result));
        assert!(prompt.contains(SIMULATION_HEADER));
    }

    #[test]
    fn test_turns_append_user_message_last() {
        let history = vec![
            StoredMessage {
                id: "m1".into(),
                conversation_id: "c".into(),
                role: Role::User,
                content: "earlier".into(),
                trajectory_id: None,
                created_at: 1,
            },
            StoredMessage {
                id: "m2".into(),
                conversation_id: "c".into(),
                role: Role::Assistant,
                content: "reply".into(),
                trajectory_id: None,
                created_at: 2,
            },
        ];
        let turns = build_turns(&history, "now");
        assert_eq!(turns.len(), 3);
        assert_eq!(turns.last().unwrap().content, "now");
        assert_eq!(turns.last().unwrap().role, Role::User);
    }
}
