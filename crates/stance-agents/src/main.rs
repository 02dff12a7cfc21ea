//! `stance-agents`: build a retrieval corpus and triangulate candidate stances.
//!
//! # Usage
//!
//! ```bash
//! # Chunk, embed and store extracted source text
//! stance-agents --config stance.toml --corpus corpus.json ingest --input extracted.jsonl
//!
//! # Produce one stance per issue for a candidate
//! stance-agents --config stance.toml analyze --race 2026-senate-xx \
//!     --candidate "Jane Doe" --candidate-ref jane-doe --issue Healthcare --issue Taxes \
//!     --output-dir reports/
//!
//! # Corpus coverage for a race
//! stance-agents stats --race 2026-senate-xx
//! ```
//!
//! Log level follows `RUST_LOG` (default `info`). Ctrl-C during `analyze`
//! cancels outstanding provider calls; claims already returned are still
//! arbitrated.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use triangulation::corpus::{
    load_or_create_corpus, save_corpus, Chunker, CorpusBuilder, CorpusStore, EmbeddingProvider,
    SharedEmbedder,
};
use triangulation::pipeline::{ScorerSource, StancePipeline};

use stance_agents::config::{AgentsConfig, AgreementMode};
use stance_agents::embedding::build_embedder;
use stance_agents::inputs::{parse_issue_list, read_extracted_file};
use stance_agents::providers::build_providers;
use stance_agents::report::report_path;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Agents TOML config; defaults plus environment overrides when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Corpus snapshot file, created on first ingest.
    #[arg(long, global = true, default_value = "corpus.json")]
    corpus: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Chunk, embed and store extracted content (JSON Lines or a .json array).
    Ingest {
        #[arg(long)]
        input: PathBuf,

        /// Replace earlier chunks of each source instead of adding to them.
        #[arg(long, default_value_t = false)]
        replace: bool,
    },

    /// Triangulate one candidate's stance on each issue.
    Analyze {
        #[arg(long)]
        race: String,

        /// Candidate display name.
        #[arg(long)]
        candidate: String,

        /// Restrict evidence to chunks attributed to this candidate reference.
        #[arg(long)]
        candidate_ref: Option<String>,

        /// Issue to analyze; repeatable.
        #[arg(long = "issue")]
        issues: Vec<String>,

        /// File with one issue per line.
        #[arg(long)]
        issues_file: Option<PathBuf>,

        /// Write the JSON report here instead of stdout.
        #[arg(long, conflicts_with = "output_dir")]
        output: Option<PathBuf>,

        /// Write the JSON report into this directory under a timestamped name.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Print corpus statistics for a race.
    Stats {
        #[arg(long)]
        race: String,
    },

    /// Remove every chunk of one source.
    Remove {
        #[arg(long)]
        race: String,

        #[arg(long)]
        source: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let config = AgentsConfig::load(args.config.as_deref()).context("Failed to load config")?;
    let embedder = build_embedder(&config.embedding).context("Failed to build embedder")?;
    let store = load_or_create_corpus(
        &args.corpus,
        &embedder.version(),
        config.triangulation.retrieval.dedup_similarity,
    )
    .with_context(|| format!("Failed to open corpus {}", args.corpus.display()))?;

    match args.command {
        Command::Ingest { input, replace } => {
            ingest(&config, embedder, store, &args.corpus, &input, replace).await
        }
        Command::Analyze {
            race,
            candidate,
            candidate_ref,
            mut issues,
            issues_file,
            output,
            output_dir,
        } => {
            if let Some(path) = issues_file {
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                issues.extend(parse_issue_list(&text));
            }
            if issues.is_empty() {
                bail!("No issues given; use --issue or --issues-file");
            }
            let request = AnalyzeRequest {
                race,
                candidate,
                candidate_ref,
                issues,
            };
            let destination = match (output, output_dir) {
                (Some(path), _) => ReportDestination::File(path),
                (None, Some(dir)) => ReportDestination::Dir(dir),
                (None, None) => ReportDestination::Stdout,
            };
            analyze(&config, embedder, store, &request, destination).await
        }
        Command::Stats { race } => {
            let stats = store.stats(&race)?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        Command::Remove { race, source } => {
            let removed = store.delete_source(&race, &source)?;
            save_corpus(&store, &args.corpus)?;
            info!(race_id = %race, source_id = %source, removed, "Source removed");
            Ok(())
        }
    }
}

async fn ingest(
    config: &AgentsConfig,
    embedder: SharedEmbedder,
    store: CorpusStore,
    corpus_path: &Path,
    input: &Path,
    replace: bool,
) -> Result<()> {
    let contents = read_extracted_file(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let chunker = Chunker::from_config(&config.triangulation.chunking)?;
    let builder = CorpusBuilder::new(chunker, embedder, store.shared())?;

    let (mut written, mut failed) = (0usize, 0usize);
    if replace {
        for content in &contents {
            match builder.replace(content).await {
                Ok(report) => written += report.chunks_written,
                Err(e) => {
                    failed += 1;
                    warn!(source_id = %content.source_id, error = %e, "Source replace failed");
                }
            }
        }
    } else {
        let batch = builder.ingest_all(&contents).await;
        written = batch.chunks_written();
        failed = batch.failed.len();
    }

    save_corpus(builder.store(), corpus_path)
        .with_context(|| format!("Failed to save corpus {}", corpus_path.display()))?;
    info!(
        sources = contents.len(),
        failed,
        written,
        corpus = %corpus_path.display(),
        "Ingest complete"
    );
    if failed == contents.len() && !contents.is_empty() {
        bail!("Every source failed to ingest");
    }
    Ok(())
}

enum ReportDestination {
    Stdout,
    File(PathBuf),
    Dir(PathBuf),
}

struct AnalyzeRequest {
    race: String,
    candidate: String,
    candidate_ref: Option<String>,
    issues: Vec<String>,
}

async fn analyze(
    config: &AgentsConfig,
    embedder: SharedEmbedder,
    store: CorpusStore,
    request: &AnalyzeRequest,
    destination: ReportDestination,
) -> Result<()> {
    let providers = build_providers(&config.providers).context("Failed to build providers")?;
    if providers.is_empty() {
        bail!("No providers configured; add [[providers]] entries to the config");
    }

    let scorer = match config.agreement {
        AgreementMode::Lexical => ScorerSource::Lexical,
        AgreementMode::Embedding => ScorerSource::Embedded(embedder.clone()),
    };
    let pipeline = StancePipeline::from_config(&config.triangulation, embedder, store.shared(), providers)
        .with_policy(config.insufficient_evidence)
        .with_scorer(scorer)
        .with_issue_tags(config.issue_tags.clone());

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; arbitrating claims already received");
            on_interrupt.cancel();
        }
    });

    let report = pipeline
        .run_candidate_with_cancel(
            &request.race,
            &request.candidate,
            request.candidate_ref.as_deref(),
            &request.issues,
            &cancel,
        )
        .await;

    let json = serde_json::to_string_pretty(&report)?;
    let path = match destination {
        ReportDestination::Stdout => {
            println!("{json}");
            return Ok(());
        }
        ReportDestination::File(path) => path,
        ReportDestination::Dir(dir) => {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            report_path(&dir, &request.race, &request.candidate, report.generated_at)
        }
    };
    std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    info!(run_id = %report.run_id, path = %path.display(), "Report written");
    Ok(())
}
