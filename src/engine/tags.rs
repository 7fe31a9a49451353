// Praxis Engine — Tag Parser
//
// Extracts `[[type:name]]` / `[[name]]` entity mentions from free text, and
// weak decision-context cues from the surrounding prose. Matching is
// lexical — there is no semantic resolution here; identity is decided later
// by the store's normalized-name lookup.
//
// One anchored alternation per bracket span:
//   typed    — [[word:content]] where word is an ASCII identifier
//   untyped  — any other [[content]], defaulting the type to "topic"
// Ordered alternation means the untyped branch claims exactly the spans the
// typed branch rejected — including content with a colon past the head,
// like [[3:2 ratio]] — so no span is double-counted and none is dropped.

use regex::Regex;
use std::sync::LazyLock;

use crate::atoms::constants::DEFAULT_TAG_TYPE;
use crate::atoms::types::{DecisionContext, TagMention};

static TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\[(?:([A-Za-z_][A-Za-z0-9_]*):([^\]]+)|([^\]]+))\]\]").expect("tag pattern")
});

/// Extract deduplicated entity mentions, preserving first-occurrence order.
/// Unknown tag types are retained verbatim — they become the entity's type
/// on creation.
pub fn extract_tags(text: &str) -> Vec<TagMention> {
    let mut mentions: Vec<TagMention> = Vec::new();

    for cap in TAG.captures_iter(text) {
        let mention = match (cap.get(1), cap.get(2), cap.get(3)) {
            (Some(kind), Some(name), _) => TagMention {
                entity_type: kind.as_str().to_lowercase(),
                name: name.as_str().trim().to_lowercase(),
            },
            (_, _, Some(name)) => TagMention {
                entity_type: DEFAULT_TAG_TYPE.to_string(),
                name: name.as_str().trim().to_lowercase(),
            },
            _ => continue,
        };
        push_unique(&mut mentions, mention);
    }

    mentions.retain(|m| !m.name.is_empty());
    mentions
}

fn push_unique(mentions: &mut Vec<TagMention>, mention: TagMention) {
    if !mentions.contains(&mention) {
        mentions.push(mention);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Decision-context cues
// ═══════════════════════════════════════════════════════════════════════════
// Sentence-scoped lexical patterns. These are advisory: they populate the
// event `data._context` blob and never touch the graph.

static TRIGGER_CUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(because|since|triggered by|prompted by|after seeing)\b")
        .expect("trigger cue pattern")
});

static OBSERVATION_CUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(i noticed|i observed|i saw|students (?:were|are|seemed|struggled|kept)|the class)\b")
        .expect("observation cue pattern")
});

static CONSTRAINT_CUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(i can'?t|i cannot|we only have|limited|no access to|constraint|short on time|only \d+ minutes)\b")
        .expect("constraint cue pattern")
});

static EXPECTED_OUTCOME_CUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(i hope|i expect|hoping|i want them to|so that|should (?:result|lead|help))\b")
        .expect("expected outcome cue pattern")
});

static RATIONALE_CUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(my reasoning|the idea is|i think (?:this|because)|my thinking is)\b")
        .expect("rationale cue pattern")
});

static PRIOR_EXPERIENCE_CUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(last time|previously|in the past|before this|last year|worked before)\b")
        .expect("prior experience cue pattern")
});

/// Extract weak decision-context cues from prose. Each family captures the
/// sentence its cue fires in; single-valued families keep the first hit.
pub fn extract_decision_context(text: &str) -> DecisionContext {
    let mut ctx = DecisionContext::default();

    for sentence in split_sentences(text) {
        if ctx.trigger.is_none() && TRIGGER_CUE.is_match(sentence) {
            ctx.trigger = Some(sentence.to_string());
        }
        if OBSERVATION_CUE.is_match(sentence) && !ctx.observations.iter().any(|s| s == sentence) {
            ctx.observations.push(sentence.to_string());
        }
        if CONSTRAINT_CUE.is_match(sentence) && !ctx.constraints.iter().any(|s| s == sentence) {
            ctx.constraints.push(sentence.to_string());
        }
        if ctx.expected_outcome.is_none() && EXPECTED_OUTCOME_CUE.is_match(sentence) {
            ctx.expected_outcome = Some(sentence.to_string());
        }
        if ctx.rationale.is_none() && RATIONALE_CUE.is_match(sentence) {
            ctx.rationale = Some(sentence.to_string());
        }
        if ctx.prior_experience.is_none() && PRIOR_EXPERIENCE_CUE.is_match(sentence) {
            ctx.prior_experience = Some(sentence.to_string());
        }
    }

    ctx
}

fn split_sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c| matches!(c, '.' | '!' | '?' | '\n'))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
