//! Wiring tests: config file → embedder + providers → corpus → pipeline.
//!
//! No inference endpoint is contacted. Configured HTTP providers are only
//! constructed; analysis runs against an in-process provider.

use std::sync::Arc;

use async_trait::async_trait;
use triangulation::analysis::{AnalysisPrompt, ProviderClient, ProviderResult, SharedProvider};
use triangulation::consensus::ConfidenceLevel;
use triangulation::corpus::{
    load_corpus, save_corpus, Chunker, CorpusBuilder, CorpusStore, EmbeddingProvider,
};
use triangulation::pipeline::StancePipeline;

use stance_agents::config::{AgentsConfig, EmbeddingKind, ProviderKind};
use stance_agents::embedding::build_embedder;
use stance_agents::inputs::read_extracted_file;
use stance_agents::providers::{build_provider, http_client};

const CONFIG: &str = r#"
[triangulation.chunking]
chunk_size_words = 60
overlap_words = 10

[triangulation.retrieval]
min_score = 0.2

[embedding]
kind = "hashing"
dimensions = 128

[[providers]]
id = "local-qwen"
kind = "openai_compatible"
base_url = "http://127.0.0.1:9/v1"
model = "Qwen3-32B"

[[providers]]
id = "claude"
kind = "anthropic"
model = "claude-sonnet-4-5"
api_key_env = "WIRING_TEST_CLAUDE_KEY"

[issue_tags]
Taxes = ["taxes"]
"#;

const EXTRACTED: &str = r#"{"source_id":"campaign-site","race_id":"race-1","candidate_ref":"jane-doe","text":"Jane Doe position on Healthcare: she supports expanded Medicaid coverage and lower insulin prices.","fetched_at":"2026-01-05T12:00:00Z"}
{"source_id":"debate","race_id":"race-1","candidate_ref":"jane-doe","text":"At the debate Jane Doe said she opposes new property taxes on family farms.","fetched_at":"2026-01-09T20:00:00Z"}
"#;

struct Canned(&'static str, &'static str);

#[async_trait]
impl ProviderClient for Canned {
    fn id(&self) -> &str {
        self.0
    }

    async fn call(&self, _prompt: &AnalysisPrompt) -> ProviderResult<String> {
        Ok(format!(
            "```json\n{{\"stance\": \"{}\", \"cited_chunk_ids\": [\"campaign-site#0\"]}}\n```",
            self.1
        ))
    }
}

fn load_config(dir: &tempfile::TempDir) -> AgentsConfig {
    let path = dir.path().join("stance.toml");
    std::fs::write(&path, CONFIG).unwrap();
    AgentsConfig::load(Some(&path)).unwrap()
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_file_loads() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_config(&dir);
    assert_eq!(config.triangulation.chunking.chunk_size_words, 60);
    assert_eq!(config.embedding.kind, EmbeddingKind::Hashing);
    assert_eq!(config.providers.len(), 2);
    assert_eq!(config.providers[1].kind, ProviderKind::Anthropic);
}

#[test]
fn test_providers_build_in_config_order() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_config(&dir);
    let http = http_client().unwrap();
    let providers: Vec<SharedProvider> = config
        .providers
        .iter()
        .map(|p| {
            build_provider(p, http.clone(), |var| {
                (var == "WIRING_TEST_CLAUDE_KEY").then(|| "sk-test".to_string())
            })
            .unwrap()
        })
        .collect();
    let ids: Vec<&str> = providers.iter().map(|p| p.id()).collect();
    assert_eq!(ids, vec!["local-qwen", "claude"]);
}

// ── Corpus + pipeline ───────────────────────────────────────────────

#[tokio::test]
async fn test_ingest_save_reload_and_analyze() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_config(&dir);
    let input = dir.path().join("extracted.jsonl");
    std::fs::write(&input, EXTRACTED).unwrap();

    let embedder = build_embedder(&config.embedding).unwrap();
    let store = CorpusStore::new(embedder.version()).shared();
    let builder = CorpusBuilder::new(
        Chunker::from_config(&config.triangulation.chunking).unwrap(),
        embedder.clone(),
        store.clone(),
    )
    .unwrap();
    let contents = read_extracted_file(&input).unwrap();
    let batch = builder.ingest_all(&contents).await;
    assert!(batch.failed.is_empty());
    assert_eq!(batch.chunks_written(), 2);

    let corpus_path = dir.path().join("corpus.json");
    save_corpus(&store, &corpus_path).unwrap();
    let reloaded = load_corpus(&corpus_path, &embedder.version(), 0.97)
        .unwrap()
        .expect("snapshot should exist");
    assert_eq!(reloaded.len().unwrap(), 2);

    let providers: Vec<SharedProvider> = vec![
        Arc::new(Canned("a", "supports expanded Medicaid")),
        Arc::new(Canned("b", "supports expanded Medicaid coverage")),
    ];
    let pipeline =
        StancePipeline::from_config(&config.triangulation, embedder, reloaded.shared(), providers);
    let report = pipeline
        .run_candidate("race-1", "Jane Doe", Some("jane-doe"), &["Healthcare".to_string()])
        .await;

    let stance = &report.issues[0].stance;
    assert_eq!(stance.confidence, ConfidenceLevel::High);
    assert_eq!(stance.sources, vec!["campaign-site#0"]);
}

#[tokio::test]
async fn test_configured_issue_tags_filter_evidence() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_config(&dir);
    let embedder = build_embedder(&config.embedding).unwrap();
    let store = CorpusStore::new(embedder.version()).shared();
    let builder = CorpusBuilder::new(
        Chunker::from_config(&config.triangulation.chunking).unwrap(),
        embedder.clone(),
        store.clone(),
    )
    .unwrap();
    let input = dir.path().join("extracted.jsonl");
    std::fs::write(&input, EXTRACTED).unwrap();
    builder.ingest_all(&read_extracted_file(&input).unwrap()).await;

    let pipeline = StancePipeline::from_config(
        &config.triangulation,
        embedder,
        store,
        vec![Arc::new(Canned("a", "opposes new property taxes"))],
    )
    .with_issue_tags(config.issue_tags.clone());
    let report = pipeline
        .run_candidate("race-1", "Jane Doe", Some("jane-doe"), &["Taxes".to_string()])
        .await;

    // Neither source is tagged "taxes", so no evidence survives the filter.
    assert!(report.issues[0].skipped);
    assert!(report.issues[0].stance.is_unknown());
}
