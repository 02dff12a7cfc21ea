//! Per candidate × issue pipeline: retrieve → analyze → arbitrate.
//!
//! Every issue yields exactly one `IssueStance`, in input order. Retrieval
//! failures and empty evidence become `unknown` stances with a diagnostic;
//! they never abort the remaining issues.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::analysis::{AnalysisReport, AnalysisRunner, SharedProvider, StanceClaim};
use crate::config::TriangulationConfig;
use crate::consensus::{
    AgreementScorer, ConsensusArbiter, IssueStance, LexicalAgreement, VectorAgreement,
};
use crate::corpus::{
    RetrievalAssembler, RetrievalQuery, RetrievedContext, SharedCorpusStore, SharedEmbedder,
};

/// What to do when retrieval finds no evidence for an issue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsufficientEvidencePolicy {
    /// Emit an `unknown` stance without calling providers.
    #[default]
    Skip,
    /// Ask providers anyway, with an empty evidence block.
    AnalyzeWithoutContext,
}

impl std::fmt::Display for InsufficientEvidencePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Skip => write!(f, "skip"),
            Self::AnalyzeWithoutContext => write!(f, "analyze_without_context"),
        }
    }
}

/// How claims are compared during arbitration.
#[derive(Clone)]
pub enum ScorerSource {
    /// Word-set overlap.
    Lexical,
    /// A caller-supplied scorer.
    Fixed(Arc<dyn AgreementScorer>),
    /// Embed each claim's text, then cosine; lexical if embedding fails.
    Embedded(SharedEmbedder),
}

/// A provider that produced no claim, flattened for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDrop {
    pub provider_id: String,
    pub reason: String,
}

/// Result of one candidate × issue run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueRun {
    pub stance: IssueStance,
    /// Chunks included in the evidence block.
    pub evidence_chunks: usize,
    pub evidence_words: usize,
    /// Providers were not called because evidence was insufficient.
    pub skipped: bool,
    pub dropped: Vec<ProviderDrop>,
    pub cancelled: bool,
    pub diagnostics: Vec<String>,
}

/// All issue stances for one candidate from one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateReport {
    pub run_id: Uuid,
    pub race_id: String,
    pub candidate: String,
    pub generated_at: DateTime<Utc>,
    pub issues: Vec<IssueRun>,
}

impl CandidateReport {
    pub fn stances(&self) -> impl Iterator<Item = &IssueStance> {
        self.issues.iter().map(|r| &r.stance)
    }
}

/// Composes retrieval, analysis and arbitration.
pub struct StancePipeline {
    assembler: RetrievalAssembler,
    runner: AnalysisRunner,
    arbiter: ConsensusArbiter,
    providers: Vec<SharedProvider>,
    scorer: ScorerSource,
    policy: InsufficientEvidencePolicy,
    /// Issue name → tags evidence for that issue must carry.
    issue_tags: BTreeMap<String, BTreeSet<String>>,
}

impl StancePipeline {
    pub fn new(
        assembler: RetrievalAssembler,
        runner: AnalysisRunner,
        arbiter: ConsensusArbiter,
        providers: Vec<SharedProvider>,
    ) -> Self {
        Self {
            assembler,
            runner,
            arbiter,
            providers,
            scorer: ScorerSource::Lexical,
            policy: InsufficientEvidencePolicy::default(),
            issue_tags: BTreeMap::new(),
        }
    }

    /// Wire every stage from one configuration.
    pub fn from_config(
        config: &TriangulationConfig,
        embedder: SharedEmbedder,
        store: SharedCorpusStore,
        providers: Vec<SharedProvider>,
    ) -> Self {
        Self::new(
            RetrievalAssembler::new(embedder, store, config.retrieval.clone()),
            AnalysisRunner::from_config(&config.analysis),
            ConsensusArbiter::from_config(&config.arbitration),
            providers,
        )
    }

    pub fn with_scorer(mut self, scorer: ScorerSource) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_policy(mut self, policy: InsufficientEvidencePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Restrict each listed issue's evidence to chunks sharing one of its
    /// tags. Issues without an entry, or with an empty tag set, are unfiltered.
    pub fn with_issue_tags(mut self, issue_tags: BTreeMap<String, BTreeSet<String>>) -> Self {
        self.issue_tags = issue_tags;
        self
    }

    /// The retrieval query `run_candidate` issues for one issue.
    pub fn query_for(
        &self,
        race_id: &str,
        candidate: &str,
        candidate_ref: Option<&str>,
        issue: &str,
    ) -> RetrievalQuery {
        let mut query = RetrievalQuery::new(race_id, candidate, issue);
        if let Some(candidate_ref) = candidate_ref {
            query = query.with_candidate_ref(candidate_ref);
        }
        match self.issue_tags.get(issue) {
            Some(tags) if !tags.is_empty() => query.with_issue_tags(tags.iter().cloned()),
            _ => query,
        }
    }

    pub fn providers(&self) -> &[SharedProvider] {
        &self.providers
    }

    pub async fn run_issue(&self, query: &RetrievalQuery) -> IssueRun {
        self.run_issue_with_cancel(query, &CancellationToken::new())
            .await
    }

    /// One issue; cancellation stops provider calls and arbitrates whatever
    /// claims already completed.
    pub async fn run_issue_with_cancel(
        &self,
        query: &RetrievalQuery,
        cancel: &CancellationToken,
    ) -> IssueRun {
        let mut diagnostics = Vec::new();

        let context = match self.assembler.assemble(query).await {
            Ok(context) => context,
            Err(e) => {
                warn!(
                    race_id = %query.race_id,
                    candidate = %query.candidate,
                    issue = %query.issue,
                    error = %e,
                    "Retrieval failed"
                );
                diagnostics.push(format!("retrieval failed: {e}"));
                return IssueRun {
                    stance: IssueStance::unknown(&query.candidate, &query.issue),
                    evidence_chunks: 0,
                    evidence_words: 0,
                    skipped: true,
                    dropped: Vec::new(),
                    cancelled: false,
                    diagnostics,
                };
            }
        };

        if context.is_insufficient() {
            diagnostics.push("insufficient evidence".to_string());
            if self.policy == InsufficientEvidencePolicy::Skip {
                info!(
                    race_id = %query.race_id,
                    candidate = %query.candidate,
                    issue = %query.issue,
                    "No evidence cleared the threshold; skipping providers"
                );
                return IssueRun {
                    stance: IssueStance::unknown(&query.candidate, &query.issue),
                    evidence_chunks: 0,
                    evidence_words: 0,
                    skipped: true,
                    dropped: Vec::new(),
                    cancelled: false,
                    diagnostics,
                };
            }
        }

        let report = self
            .runner
            .analyze_with_cancel(&query.candidate, &query.issue, &context, &self.providers, cancel)
            .await;

        let stance = self.arbitrate(query, &report.claims, &mut diagnostics).await;
        issue_run(stance, &context, &report, diagnostics)
    }

    /// Every issue for one candidate, in input order.
    pub async fn run_candidate(
        &self,
        race_id: &str,
        candidate: &str,
        candidate_ref: Option<&str>,
        issues: &[String],
    ) -> CandidateReport {
        self.run_candidate_with_cancel(race_id, candidate, candidate_ref, issues, &CancellationToken::new())
            .await
    }

    pub async fn run_candidate_with_cancel(
        &self,
        race_id: &str,
        candidate: &str,
        candidate_ref: Option<&str>,
        issues: &[String],
        cancel: &CancellationToken,
    ) -> CandidateReport {
        let run_id = Uuid::new_v4();
        info!(%run_id, race_id, candidate, issues = issues.len(), "Starting candidate run");

        let mut runs = Vec::with_capacity(issues.len());
        for issue in issues {
            let query = self.query_for(race_id, candidate, candidate_ref, issue);
            runs.push(self.run_issue_with_cancel(&query, cancel).await);
        }

        let unknown = runs.iter().filter(|r| r.stance.is_unknown()).count();
        info!(%run_id, race_id, candidate, unknown, "Candidate run complete");

        CandidateReport {
            run_id,
            race_id: race_id.to_string(),
            candidate: candidate.to_string(),
            generated_at: Utc::now(),
            issues: runs,
        }
    }

    async fn arbitrate(
        &self,
        query: &RetrievalQuery,
        claims: &[StanceClaim],
        diagnostics: &mut Vec<String>,
    ) -> IssueStance {
        match &self.scorer {
            ScorerSource::Lexical => {
                self.arbiter
                    .arbitrate(&query.candidate, &query.issue, claims, &LexicalAgreement)
            }
            ScorerSource::Fixed(scorer) => {
                self.arbiter
                    .arbitrate(&query.candidate, &query.issue, claims, scorer.as_ref())
            }
            ScorerSource::Embedded(embedder) => {
                let texts = claims.iter().map(|c| c.stance_text.as_str());
                match VectorAgreement::build(embedder, texts).await {
                    Ok(scorer) => {
                        self.arbiter
                            .arbitrate(&query.candidate, &query.issue, claims, &scorer)
                    }
                    Err(e) => {
                        warn!(issue = %query.issue, error = %e, "Stance embedding failed; using lexical agreement");
                        diagnostics.push(format!("agreement embedding failed: {e}"));
                        self.arbiter
                            .arbitrate(&query.candidate, &query.issue, claims, &LexicalAgreement)
                    }
                }
            }
        }
    }
}

fn issue_run(
    stance: IssueStance,
    context: &RetrievedContext,
    report: &AnalysisReport,
    diagnostics: Vec<String>,
) -> IssueRun {
    IssueRun {
        stance,
        evidence_chunks: context.results.len(),
        evidence_words: context.word_count,
        skipped: false,
        dropped: report
            .dropped
            .iter()
            .map(|d| ProviderDrop {
                provider_id: d.provider_id.clone(),
                reason: d.reason.to_string(),
            })
            .collect(),
        cancelled: report.cancelled,
        diagnostics,
    }
}
