//! Consensus arbitration over stance claims.
//!
//! Pure and deterministic: the same claims, order, scorer and threshold
//! always give the same `IssueStance`. Never fails; zero claims yield an
//! `unknown` stance.
//!
//! | Responding | Majority / responding | Confidence |
//! |------------|-----------------------|------------|
//! | 0          | n/a                   | unknown    |
//! | 1          | n/a                   | low        |
//! | ≥ 2        | 1.0                   | high       |
//! | ≥ 2        | ≥ 0.5                 | medium     |
//! | ≥ 2        | < 0.5                 | low        |

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::agreement::AgreementScorer;
use super::clustering::{agreement_groups, PairScore};
use super::types::{ConfidenceLevel, IssueStance};
use crate::analysis::StanceClaim;
use crate::config::ArbitrationConfig;

/// Default pairwise score at which two claims agree.
pub const DEFAULT_AGREEMENT_THRESHOLD: f64 = 0.75;

/// Arbitration result with the intermediate grouping, for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitrationDetail {
    pub stance: IssueStance,
    /// Agreement groups as provider ids, each in provider order.
    pub groups: Vec<Vec<String>>,
    /// Index into `groups` of the majority, if any claims were given.
    pub majority_group: Option<usize>,
    pub pair_scores: Vec<PairScore>,
    pub scorer: String,
}

/// Reconciles provider claims into one stance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsensusArbiter {
    agreement_threshold: f64,
}

impl Default for ConsensusArbiter {
    fn default() -> Self {
        Self::new(DEFAULT_AGREEMENT_THRESHOLD)
    }
}

impl ConsensusArbiter {
    pub fn new(agreement_threshold: f64) -> Self {
        Self {
            agreement_threshold,
        }
    }

    pub fn from_config(config: &ArbitrationConfig) -> Self {
        Self::new(config.agreement_threshold)
    }

    pub fn agreement_threshold(&self) -> f64 {
        self.agreement_threshold
    }

    /// Arbitrate claims given in provider configuration order.
    pub fn arbitrate(
        &self,
        candidate: &str,
        issue: &str,
        claims: &[StanceClaim],
        scorer: &dyn AgreementScorer,
    ) -> IssueStance {
        self.arbitrate_detailed(candidate, issue, claims, scorer).stance
    }

    /// Arbitrate after putting claims into `provider_order`.
    ///
    /// Claims from providers not named in `provider_order` keep their
    /// relative order after the named ones.
    pub fn arbitrate_ordered(
        &self,
        candidate: &str,
        issue: &str,
        claims: &[StanceClaim],
        provider_order: &[String],
        scorer: &dyn AgreementScorer,
    ) -> IssueStance {
        let mut ordered: Vec<StanceClaim> = claims.to_vec();
        ordered.sort_by_key(|c| {
            provider_order
                .iter()
                .position(|p| p == &c.provider_id)
                .unwrap_or(usize::MAX)
        });
        self.arbitrate(candidate, issue, &ordered, scorer)
    }

    /// Arbitrate and keep the grouping and pair scores.
    pub fn arbitrate_detailed(
        &self,
        candidate: &str,
        issue: &str,
        claims: &[StanceClaim],
        scorer: &dyn AgreementScorer,
    ) -> ArbitrationDetail {
        if claims.is_empty() {
            return ArbitrationDetail {
                stance: IssueStance::unknown(candidate, issue),
                groups: Vec::new(),
                majority_group: None,
                pair_scores: Vec::new(),
                scorer: scorer.name().to_string(),
            };
        }

        let texts: Vec<&str> = claims.iter().map(|c| c.stance_text.as_str()).collect();
        let (groups, pair_scores) = agreement_groups(&texts, scorer, self.agreement_threshold);

        let majority_idx = select_majority(&groups, claims);
        let majority = &groups[majority_idx];
        let in_majority: BTreeSet<usize> = majority.iter().copied().collect();

        let responding = claims.len();
        let agreeing = majority.len();
        let confidence = confidence_level(agreeing, responding);

        let representative = select_representative(majority, claims);

        let mut seen = BTreeSet::new();
        let sources: Vec<String> = majority
            .iter()
            .flat_map(|&i| claims[i].cited_chunk_ids.iter())
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect();

        let minority_views: Vec<StanceClaim> = claims
            .iter()
            .enumerate()
            .filter(|(i, _)| !in_majority.contains(i))
            .map(|(_, c)| c.clone())
            .collect();

        let stance = IssueStance {
            issue: issue.to_string(),
            candidate: candidate.to_string(),
            stance_text: claims[representative].stance_text.clone(),
            confidence,
            sources,
            minority_views,
            providers_responding: responding,
            providers_agreeing: agreeing,
            representative_provider: Some(claims[representative].provider_id.clone()),
        };

        ArbitrationDetail {
            stance,
            groups: groups
                .iter()
                .map(|g| g.iter().map(|&i| claims[i].provider_id.clone()).collect())
                .collect(),
            majority_group: Some(majority_idx),
            pair_scores,
            scorer: scorer.name().to_string(),
        }
    }
}

/// Confidence from majority size and responding count.
pub fn confidence_level(agreeing: usize, responding: usize) -> ConfidenceLevel {
    match responding {
        0 => ConfidenceLevel::Unknown,
        1 => ConfidenceLevel::Low,
        _ if agreeing == responding => ConfidenceLevel::High,
        _ if 2 * agreeing >= responding => ConfidenceLevel::Medium,
        _ => ConfidenceLevel::Low,
    }
}

/// Largest group; ties by higher mean self-reported confidence (missing
/// counts as 0.0), then by the lexically smallest provider id in the group.
fn select_majority(groups: &[Vec<usize>], claims: &[StanceClaim]) -> usize {
    let mut best = 0;
    for (idx, group) in groups.iter().enumerate().skip(1) {
        let current = &groups[best];
        let better = group
            .len()
            .cmp(&current.len())
            .then_with(|| {
                mean_confidence(group, claims).total_cmp(&mean_confidence(current, claims))
            })
            .then_with(|| min_provider(current, claims).cmp(min_provider(group, claims)))
            .is_gt();
        if better {
            best = idx;
        }
    }
    best
}

fn mean_confidence(group: &[usize], claims: &[StanceClaim]) -> f64 {
    group
        .iter()
        .map(|&i| claims[i].confidence_or_zero())
        .sum::<f64>()
        / group.len() as f64
}

fn min_provider<'a>(group: &[usize], claims: &'a [StanceClaim]) -> &'a str {
    group
        .iter()
        .map(|&i| claims[i].provider_id.as_str())
        .min()
        .unwrap_or_default()
}

/// Most citations, then longest text, then lexically smallest provider id.
fn select_representative(group: &[usize], claims: &[StanceClaim]) -> usize {
    let mut best = group[0];
    for &i in &group[1..] {
        let (c, b) = (&claims[i], &claims[best]);
        let better = c
            .cited_chunk_ids
            .len()
            .cmp(&b.cited_chunk_ids.len())
            .then_with(|| c.stance_text.chars().count().cmp(&b.stance_text.chars().count()))
            .then_with(|| b.provider_id.cmp(&c.provider_id))
            .is_gt();
        if better {
            best = i;
        }
    }
    best
}
