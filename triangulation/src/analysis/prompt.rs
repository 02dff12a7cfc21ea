//! Prompt construction and response parsing.
//!
//! Providers are asked for a single JSON object:
//!
//! ```json
//! {"stance": "...", "cited_chunk_ids": ["src#0"], "confidence": 0.8}
//! ```
//!
//! The object may be wrapped in a fenced code block or surrounded by prose.
//! `confidence` is optional. Citations that do not name a chunk from the
//! supplied context are discarded.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use super::provider::{AnalysisPrompt, ProviderError, ProviderResult};
use super::types::StanceClaim;
use crate::corpus::RetrievedContext;

/// Fenced code block holding a JSON object, with or without a `json` tag.
static FENCED_JSON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```")
        .expect("FENCED_JSON_RE regex should compile")
});

const SYSTEM_INSTRUCTIONS: &str = "\
You are a nonpartisan analyst summarizing an electoral candidate's position on one issue. \
Use only the evidence excerpts provided. Each excerpt starts with its id in square brackets. \
Reply with a single JSON object and nothing else: \
{\"stance\": \"<one or two neutral sentences>\", \
\"cited_chunk_ids\": [\"<ids of excerpts supporting the stance>\"], \
\"confidence\": <number between 0 and 1>}. \
If the evidence does not reveal a position, say so in \"stance\" and cite nothing.";

const NO_EVIDENCE: &str = "(no evidence excerpts were retrieved for this issue)";

/// Build the prompt shared by every provider in a batch.
pub fn build_prompt(candidate: &str, issue: &str, context: &RetrievedContext) -> AnalysisPrompt {
    let evidence = if context.context.is_empty() {
        NO_EVIDENCE
    } else {
        context.context.as_str()
    };
    AnalysisPrompt {
        system: SYSTEM_INSTRUCTIONS.to_string(),
        user: format!("Candidate: {candidate}\nIssue: {issue}\n\nEvidence:\n{evidence}\n"),
    }
}

#[derive(Debug, Deserialize)]
struct StancePayload {
    stance: String,
    #[serde(default)]
    cited_chunk_ids: Vec<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Parse a raw provider response into a claim.
///
/// `known_chunk_ids` is the set of ids present in the context; other
/// citations are dropped. Duplicate citations keep their first position.
pub fn parse_stance_response(
    provider_id: &str,
    candidate: &str,
    issue: &str,
    raw: &str,
    known_chunk_ids: &BTreeSet<String>,
) -> ProviderResult<StanceClaim> {
    let json = extract_json_object(raw)
        .ok_or_else(|| ProviderError::Parse("no JSON object in response".to_string()))?;
    let payload: StancePayload =
        serde_json::from_str(json).map_err(|e| ProviderError::Parse(e.to_string()))?;

    let stance = payload.stance.split_whitespace().collect::<Vec<_>>().join(" ");
    if stance.is_empty() {
        return Err(ProviderError::Parse("empty stance".to_string()));
    }

    let mut seen = BTreeSet::new();
    let citations: Vec<String> = payload
        .cited_chunk_ids
        .into_iter()
        .map(|id| id.trim().trim_start_matches('[').trim_end_matches(']').to_string())
        .filter(|id| known_chunk_ids.contains(id) && seen.insert(id.clone()))
        .collect();

    let mut claim =
        StanceClaim::new(provider_id, candidate, issue, stance).with_citations(citations);
    if let Some(confidence) = payload.confidence.filter(|c| c.is_finite()) {
        claim = claim.with_confidence(confidence);
    }
    Ok(claim)
}

fn extract_json_object(raw: &str) -> Option<&str> {
    if let Some(caps) = FENCED_JSON_RE.captures(raw) {
        return caps.get(1).map(|m| m.as_str());
    }
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}
