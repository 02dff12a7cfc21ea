//! Pipeline integration tests: retrieve → analyze → arbitrate.
//!
//! Uses in-process scripted providers (no network) against a corpus built
//! with the hashing embedder. Time-sensitive cases run with a paused tokio
//! clock.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use triangulation::analysis::{AnalysisPrompt, ProviderClient, ProviderError, ProviderResult, SharedProvider};
use triangulation::config::TriangulationConfig;
use triangulation::consensus::{ConfidenceLevel, PairwiseTable};
use triangulation::corpus::{
    Chunker, CorpusBuilder, CorpusStore, EmbeddingProvider, ExtractedContent, HashingEmbedder,
    RetrievalQuery, SharedCorpusStore, SharedEmbedder,
};
use triangulation::pipeline::{InsufficientEvidencePolicy, ScorerSource, StancePipeline};

const RACE: &str = "2026-senate-xx";

/// Replies with a fixed stance after a delay, citing the first chunk id
/// found in the prompt's evidence block.
struct ScriptedProvider {
    id: String,
    delay: Duration,
    stance: Option<String>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedProvider {
    fn new(id: &str, delay_ms: u64, stance: &str) -> Self {
        Self {
            id: id.to_string(),
            delay: Duration::from_millis(delay_ms),
            stance: Some(stance.to_string()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn failing(id: &str) -> Self {
        Self {
            id: id.to_string(),
            delay: Duration::from_millis(1),
            stance: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn shared(self) -> SharedProvider {
        Arc::new(self)
    }
}

fn first_cited_id(user_prompt: &str) -> Option<&str> {
    let start = user_prompt.find('[')? + 1;
    let end = start + user_prompt[start..].find(']')?;
    Some(&user_prompt[start..end])
}

#[async_trait]
impl ProviderClient for ScriptedProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn call(&self, prompt: &AnalysisPrompt) -> ProviderResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let Some(stance) = &self.stance else {
            return Err(ProviderError::Status {
                status: 503,
                body: "overloaded".to_string(),
            });
        };
        let cites: Vec<&str> = first_cited_id(&prompt.user).into_iter().collect();
        Ok(serde_json::json!({
            "stance": stance,
            "cited_chunk_ids": cites,
            "confidence": 0.8,
        })
        .to_string())
    }
}

async fn corpus() -> (SharedEmbedder, SharedCorpusStore) {
    let embedder = HashingEmbedder::new(256).shared();
    let store = CorpusStore::new(embedder.version()).shared();
    let builder =
        CorpusBuilder::new(Chunker::new(40, 8).unwrap(), embedder.clone(), store.clone()).unwrap();
    builder
        .ingest(
            &ExtractedContent::new(
                "campaign-site",
                RACE,
                "Jane Doe position on Healthcare: she supports expanded Medicaid coverage for \
                 working families and wants to cap insulin prices.",
            )
            .with_candidate("jane-doe"),
        )
        .await
        .unwrap();
    (embedder, store)
}

fn config() -> TriangulationConfig {
    let mut config = TriangulationConfig::default();
    config.retrieval.min_score = 0.2;
    config
}

fn medicaid_providers(c_delay_ms: u64) -> Vec<SharedProvider> {
    vec![
        ScriptedProvider::new("A", 100, "supports expanded Medicaid").shared(),
        ScriptedProvider::new("B", 200, "supports expanded Medicaid coverage").shared(),
        ScriptedProvider::new("C", c_delay_ms, "opposes Medicaid expansion").shared(),
    ]
}

// ── End to end ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_medicaid_scenario_end_to_end() {
    let (embedder, store) = corpus().await;
    let pipeline = StancePipeline::from_config(&config(), embedder, store, medicaid_providers(300));

    let query = RetrievalQuery::new(RACE, "Jane Doe", "Healthcare").with_candidate_ref("jane-doe");
    let run = pipeline.run_issue(&query).await;

    assert!(run.evidence_chunks >= 1);
    assert!(!run.skipped);
    assert_eq!(run.stance.confidence, ConfidenceLevel::Medium);
    assert_eq!(run.stance.minority_views.len(), 1);
    assert_eq!(run.stance.minority_views[0].provider_id, "C");
    assert_eq!(run.stance.sources, vec!["campaign-site#0"]);
    assert_eq!(run.stance.stance_text, "supports expanded Medicaid coverage");
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_after_two_of_three_still_arbitrates() {
    let (embedder, store) = corpus().await;
    let pipeline =
        StancePipeline::from_config(&config(), embedder, store, medicaid_providers(60_000));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        trigger.cancel();
    });

    let query = RetrievalQuery::new(RACE, "Jane Doe", "Healthcare");
    let run = pipeline.run_issue_with_cancel(&query, &cancel).await;

    assert!(run.cancelled);
    assert_eq!(run.stance.providers_responding, 2);
    assert_ne!(run.stance.confidence, ConfidenceLevel::Unknown);
    assert_eq!(run.stance.confidence, ConfidenceLevel::High);
    assert_eq!(run.dropped.len(), 1);
    assert_eq!(run.dropped[0].provider_id, "C");
    assert_eq!(run.dropped[0].reason, "cancelled");
}

#[tokio::test(start_paused = true)]
async fn test_timeouts_and_failures_degrade_confidence() {
    let (embedder, store) = corpus().await;
    let mut config = config();
    config.analysis.provider_timeout_secs = 1;
    let providers = vec![
        ScriptedProvider::new("A", 100, "supports expanded Medicaid").shared(),
        ScriptedProvider::failing("B").shared(),
        ScriptedProvider::new("C", 5_000, "supports expanded Medicaid coverage").shared(),
    ];
    let pipeline = StancePipeline::from_config(&config, embedder, store, providers);

    let run = pipeline
        .run_issue(&RetrievalQuery::new(RACE, "Jane Doe", "Healthcare"))
        .await;
    assert_eq!(run.stance.confidence, ConfidenceLevel::Low);
    assert_eq!(run.stance.providers_responding, 1);
    let dropped: Vec<&str> = run.dropped.iter().map(|d| d.provider_id.as_str()).collect();
    assert_eq!(dropped, vec!["B", "C"]);
    assert!(run.dropped[1].reason.contains("timed out"));
}

#[tokio::test(start_paused = true)]
async fn test_all_providers_fail_gives_unknown() {
    let (embedder, store) = corpus().await;
    let providers = vec![
        ScriptedProvider::failing("A").shared(),
        ScriptedProvider::failing("B").shared(),
    ];
    let pipeline = StancePipeline::from_config(&config(), embedder, store, providers);
    let run = pipeline
        .run_issue(&RetrievalQuery::new(RACE, "Jane Doe", "Healthcare"))
        .await;
    assert!(run.stance.is_unknown());
    assert_eq!(run.dropped.len(), 2);
}

// ── Insufficient evidence policy ────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_skip_policy_never_calls_providers() {
    let (embedder, store) = corpus().await;
    let provider = ScriptedProvider::new("A", 10, "supports expanded Medicaid");
    let calls = Arc::clone(&provider.calls);
    let pipeline = StancePipeline::from_config(&config(), embedder, store, vec![provider.shared()])
        .with_policy(InsufficientEvidencePolicy::Skip);

    let run = pipeline
        .run_issue(&RetrievalQuery::new("other-race", "Jane Doe", "Healthcare"))
        .await;
    assert!(run.skipped);
    assert!(run.stance.is_unknown());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_analyze_without_context_policy() {
    let (embedder, store) = corpus().await;
    let provider = ScriptedProvider::new("A", 10, "no documented position");
    let calls = Arc::clone(&provider.calls);
    let pipeline = StancePipeline::from_config(&config(), embedder, store, vec![provider.shared()])
        .with_policy(InsufficientEvidencePolicy::AnalyzeWithoutContext);

    let run = pipeline
        .run_issue(&RetrievalQuery::new("other-race", "Jane Doe", "Healthcare"))
        .await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(run.stance.confidence, ConfidenceLevel::Low);
    assert!(run.stance.sources.is_empty());
    assert!(run.diagnostics.iter().any(|d| d.contains("insufficient")));
}

// ── Candidate runs ──────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_run_candidate_one_stance_per_issue_in_order() {
    let (embedder, store) = corpus().await;
    let pipeline = StancePipeline::from_config(&config(), embedder, store, medicaid_providers(300));

    let issues = vec![
        "Healthcare".to_string(),
        "Zoning variance appeals".to_string(),
        "Healthcare costs".to_string(),
    ];
    let report = pipeline
        .run_candidate(RACE, "Jane Doe", Some("jane-doe"), &issues)
        .await;

    let got: Vec<&str> = report.stances().map(|s| s.issue.as_str()).collect();
    assert_eq!(got, vec!["Healthcare", "Zoning variance appeals", "Healthcare costs"]);
    assert!(report.stances().all(|s| s.candidate == "Jane Doe"));
    assert_eq!(report.race_id, RACE);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["issues"].as_array().unwrap().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_fixed_scorer_is_used() {
    let (embedder, store) = corpus().await;
    // Every pair disagrees under this table.
    let pipeline = StancePipeline::from_config(&config(), embedder, store, medicaid_providers(300))
        .with_scorer(ScorerSource::Fixed(Arc::new(PairwiseTable::new())));

    let run = pipeline
        .run_issue(&RetrievalQuery::new(RACE, "Jane Doe", "Healthcare"))
        .await;
    assert_eq!(run.stance.confidence, ConfidenceLevel::Low);
    assert_eq!(run.stance.minority_views.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_embedded_scorer_groups_identical_claims() {
    let (embedder, store) = corpus().await;
    let providers = vec![
        ScriptedProvider::new("A", 10, "supports expanded Medicaid").shared(),
        ScriptedProvider::new("B", 20, "supports expanded Medicaid").shared(),
    ];
    let pipeline = StancePipeline::from_config(&config(), embedder.clone(), store, providers)
        .with_scorer(ScorerSource::Embedded(embedder));

    let run = pipeline
        .run_issue(&RetrievalQuery::new(RACE, "Jane Doe", "Healthcare"))
        .await;
    assert_eq!(run.stance.confidence, ConfidenceLevel::High);
}

// ── Issue tags ──────────────────────────────────────────────────────

fn tags(issue: &str, tags: &[&str]) -> BTreeMap<String, BTreeSet<String>> {
    BTreeMap::from([(
        issue.to_string(),
        tags.iter().map(|t| t.to_string()).collect(),
    )])
}

#[tokio::test(start_paused = true)]
async fn test_issue_tags_restrict_candidate_evidence() {
    let (embedder, store) = corpus().await;
    let builder =
        CorpusBuilder::new(Chunker::new(40, 8).unwrap(), embedder.clone(), store.clone()).unwrap();
    builder
        .ingest(
            &ExtractedContent::new(
                "voter-guide",
                RACE,
                "Jane Doe position on Healthcare: the voter guide lists her support for \
                 expanded Medicaid coverage.",
            )
            .with_candidate("jane-doe")
            .with_issue_tags(["healthcare"]),
        )
        .await
        .unwrap();

    let pipeline = StancePipeline::from_config(&config(), embedder, store, medicaid_providers(300))
        .with_issue_tags(tags("Healthcare", &["healthcare"]));
    let report = pipeline
        .run_candidate(RACE, "Jane Doe", Some("jane-doe"), &["Healthcare".to_string()])
        .await;

    let run = &report.issues[0];
    assert_eq!(run.evidence_chunks, 1);
    assert!(!run.skipped);
    assert!(run.stance.sources.iter().all(|s| s.starts_with("voter-guide#")));
}

#[tokio::test(start_paused = true)]
async fn test_issue_tags_without_matching_chunks_skip_providers() {
    let (embedder, store) = corpus().await;
    let providers = medicaid_providers(300);
    let pipeline = StancePipeline::from_config(&config(), embedder, store, providers)
        .with_issue_tags(tags("Healthcare", &["immigration"]));

    let report = pipeline
        .run_candidate(RACE, "Jane Doe", None, &["Healthcare".to_string()])
        .await;
    assert!(report.issues[0].skipped);
    assert!(report.issues[0].stance.is_unknown());
}

#[tokio::test]
async fn test_query_for_applies_tags_per_issue() {
    let (embedder, store) = corpus().await;
    let mut issue_tags = tags("Healthcare", &["healthcare", "medicaid"]);
    issue_tags.insert("Taxes".to_string(), BTreeSet::new());
    let pipeline = StancePipeline::from_config(&config(), embedder, store, Vec::new())
        .with_issue_tags(issue_tags);

    let tagged = pipeline.query_for(RACE, "Jane Doe", Some("jane-doe"), "Healthcare");
    assert_eq!(tagged.candidate_ref.as_deref(), Some("jane-doe"));
    assert_eq!(tagged.issue_tags.map(|t| t.len()), Some(2));
    assert_eq!(pipeline.query_for(RACE, "Jane Doe", None, "Taxes").issue_tags, None);
    assert_eq!(pipeline.query_for(RACE, "Jane Doe", None, "Guns").issue_tags, None);
}
