//! Parallel provider fan-out with per-call timeout, batch deadline and
//! cancellation.
//!
//! ```text
//! JoinSet::spawn(timeout(provider_i.call(prompt))) × N
//!   ├─ join_next  → claim or drop, tagged with configured index i
//!   ├─ cancelled  → stop, harvest finished tasks, abort the rest
//!   └─ deadline   → same as cancelled
//! ```
//!
//! Provider failures never escape `analyze`: they are logged and reported in
//! `AnalysisReport::dropped`. Claims come back in configuration order
//! whatever order the calls finish in.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::prompt::{build_prompt, parse_stance_response};
use super::provider::{ProviderError, ProviderResult, SharedProvider};
use super::types::StanceClaim;
use crate::config::AnalysisConfig;
use crate::corpus::RetrievedContext;

/// Why a provider contributed no claim.
#[derive(Debug, Clone, PartialEq)]
pub enum DropReason {
    /// The call failed, timed out, or returned an unparsable response.
    Provider(ProviderError),
    /// The provider task panicked.
    Panicked,
    /// Still running when the batch deadline passed.
    DeadlineExceeded,
    /// Still running when the batch was cancelled.
    Cancelled,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Provider(e) => write!(f, "{e}"),
            Self::Panicked => write!(f, "panicked"),
            Self::DeadlineExceeded => write!(f, "deadline_exceeded"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A provider that produced no claim in this batch.
#[derive(Debug, Clone, PartialEq)]
pub struct DroppedProvider {
    /// Position in the configured provider list.
    pub index: usize,
    pub provider_id: String,
    pub reason: DropReason,
}

/// Outcome of one analysis batch.
#[derive(Debug, Clone, Default)]
pub struct AnalysisReport {
    /// Usable claims in provider configuration order.
    pub claims: Vec<StanceClaim>,
    /// Providers without a claim, in configuration order.
    pub dropped: Vec<DroppedProvider>,
    /// Number of providers the batch was started with.
    pub providers_configured: usize,
    /// The batch was cut short by cancellation.
    pub cancelled: bool,
    /// The batch was cut short by the deadline.
    pub deadline_exceeded: bool,
    pub elapsed: Duration,
}

impl AnalysisReport {
    /// Configured provider ids, in configuration order.
    pub fn provider_order(providers: &[SharedProvider]) -> Vec<String> {
        providers.iter().map(|p| p.id().to_string()).collect()
    }
}

type TaskOutput = (usize, ProviderResult<StanceClaim>);

/// Runs one prompt against every configured provider concurrently.
#[derive(Debug, Clone)]
pub struct AnalysisRunner {
    provider_timeout: Duration,
    batch_deadline: Duration,
}

impl AnalysisRunner {
    pub fn new(provider_timeout: Duration, batch_deadline: Duration) -> Self {
        Self {
            provider_timeout,
            batch_deadline,
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.provider_timeout(), config.batch_deadline())
    }

    pub fn provider_timeout(&self) -> Duration {
        self.provider_timeout
    }

    pub fn batch_deadline(&self) -> Duration {
        self.batch_deadline
    }

    /// Query every provider and collect the claims that come back in time.
    pub async fn analyze(
        &self,
        candidate: &str,
        issue: &str,
        context: &RetrievedContext,
        providers: &[SharedProvider],
    ) -> AnalysisReport {
        self.analyze_with_cancel(candidate, issue, context, providers, &CancellationToken::new())
            .await
    }

    /// As [`analyze`](Self::analyze), stopping early when `cancel` fires.
    ///
    /// On cancellation or deadline every in-flight call is aborted and the
    /// claims that had already completed are returned.
    pub async fn analyze_with_cancel(
        &self,
        candidate: &str,
        issue: &str,
        context: &RetrievedContext,
        providers: &[SharedProvider],
        cancel: &CancellationToken,
    ) -> AnalysisReport {
        let start = Instant::now();
        let prompt = Arc::new(build_prompt(candidate, issue, context));
        let known_ids = Arc::new(context.chunk_ids());

        let mut pending: BTreeMap<usize, String> = BTreeMap::new();
        let mut set: JoinSet<TaskOutput> = JoinSet::new();

        for (index, provider) in providers.iter().enumerate() {
            pending.insert(index, provider.id().to_string());

            let provider = Arc::clone(provider);
            let prompt = Arc::clone(&prompt);
            let known_ids = Arc::clone(&known_ids);
            let candidate = candidate.to_string();
            let issue = issue.to_string();
            let timeout = self.provider_timeout;

            set.spawn(async move {
                let outcome = match tokio::time::timeout(timeout, provider.call(&prompt)).await {
                    Ok(Ok(raw)) => {
                        parse_stance_response(provider.id(), &candidate, &issue, &raw, &known_ids)
                    }
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(ProviderError::Timeout(timeout)),
                };
                (index, outcome)
            });
        }

        let mut report = AnalysisReport {
            providers_configured: providers.len(),
            ..AnalysisReport::default()
        };
        let mut claims: Vec<(usize, StanceClaim)> = Vec::new();

        let deadline = tokio::time::sleep(self.batch_deadline);
        tokio::pin!(deadline);

        let mut stop_reason: Option<DropReason> = None;
        while !set.is_empty() {
            tokio::select! {
                biased;
                joined = set.join_next() => match joined {
                    Some(result) => record(result, &mut pending, &mut claims, &mut report),
                    None => break,
                },
                _ = cancel.cancelled() => {
                    stop_reason = Some(DropReason::Cancelled);
                    break;
                }
                _ = &mut deadline => {
                    stop_reason = Some(DropReason::DeadlineExceeded);
                    break;
                }
            }
        }

        if stop_reason.is_some() {
            // Keep anything that finished before the stop was observed.
            while let Some(result) = set.try_join_next() {
                record(result, &mut pending, &mut claims, &mut report);
            }
            set.shutdown().await;
        }

        report.cancelled = stop_reason == Some(DropReason::Cancelled);
        report.deadline_exceeded = stop_reason == Some(DropReason::DeadlineExceeded);

        // Whatever is still pending was aborted, or panicked before reporting.
        let leftover_reason = stop_reason.unwrap_or(DropReason::Panicked);
        for (index, provider_id) in pending {
            warn!(
                provider = %provider_id,
                index,
                reason = %leftover_reason,
                "Provider dropped from batch"
            );
            report.dropped.push(DroppedProvider {
                index,
                provider_id,
                reason: leftover_reason.clone(),
            });
        }

        claims.sort_by_key(|(index, _)| *index);
        report.claims = claims.into_iter().map(|(_, claim)| claim).collect();
        report.dropped.sort_by_key(|d| d.index);
        report.elapsed = start.elapsed();

        info!(
            candidate,
            issue,
            configured = report.providers_configured,
            responded = report.claims.len(),
            dropped = report.dropped.len(),
            cancelled = report.cancelled,
            deadline_exceeded = report.deadline_exceeded,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Analysis batch complete"
        );
        report
    }
}

fn record(
    result: Result<TaskOutput, JoinError>,
    pending: &mut BTreeMap<usize, String>,
    claims: &mut Vec<(usize, StanceClaim)>,
    report: &mut AnalysisReport,
) {
    match result {
        Ok((index, Ok(claim))) => {
            pending.remove(&index);
            debug!(provider = %claim.provider_id, index, "Provider returned claim");
            claims.push((index, claim));
        }
        Ok((index, Err(e))) => {
            let provider_id = pending.remove(&index).unwrap_or_default();
            warn!(
                provider = %provider_id,
                index,
                timeout = e.is_timeout(),
                error = %e,
                "Provider produced no claim"
            );
            report.dropped.push(DroppedProvider {
                index,
                provider_id,
                reason: DropReason::Provider(e),
            });
        }
        Err(e) => {
            // The index is unknown here; the entry stays pending and is
            // reported once the batch ends.
            warn!(error = %e, "Provider task failed to join");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::provider::{AnalysisPrompt, ProviderClient};
    use async_trait::async_trait;

    struct Scripted {
        id: String,
        delay: Duration,
        reply: Result<String, ProviderError>,
    }

    impl Scripted {
        fn ok(id: &str, delay_ms: u64, stance: &str) -> SharedProvider {
            Arc::new(Self {
                id: id.to_string(),
                delay: Duration::from_millis(delay_ms),
                reply: Ok(format!(r#"{{"stance": "{stance}", "cited_chunk_ids": []}}"#)),
            })
        }

        fn err(id: &str, delay_ms: u64, e: ProviderError) -> SharedProvider {
            Arc::new(Self {
                id: id.to_string(),
                delay: Duration::from_millis(delay_ms),
                reply: Err(e),
            })
        }
    }

    #[async_trait]
    impl ProviderClient for Scripted {
        fn id(&self) -> &str {
            &self.id
        }

        async fn call(&self, _prompt: &AnalysisPrompt) -> ProviderResult<String> {
            tokio::time::sleep(self.delay).await;
            self.reply.clone()
        }
    }

    struct Panics;

    #[async_trait]
    impl ProviderClient for Panics {
        fn id(&self) -> &str {
            "panics"
        }

        async fn call(&self, _prompt: &AnalysisPrompt) -> ProviderResult<String> {
            panic!("provider blew up");
        }
    }

    fn runner() -> AnalysisRunner {
        AnalysisRunner::new(Duration::from_secs(30), Duration::from_secs(90))
    }

    #[tokio::test(start_paused = true)]
    async fn test_claims_return_in_configuration_order() {
        let providers = vec![
            Scripted::ok("a", 300, "first"),
            Scripted::ok("b", 100, "second"),
            Scripted::ok("c", 200, "third"),
        ];
        let report = runner()
            .analyze("Jane", "Healthcare", &RetrievedContext::empty(), &providers)
            .await;
        let ids: Vec<&str> = report.claims.iter().map(|c| c.provider_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(report.dropped.is_empty());
        assert_eq!(report.providers_configured, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_and_timeouts_are_dropped() {
        let providers = vec![
            Scripted::ok("a", 10, "ok"),
            Scripted::err("b", 10, ProviderError::Request("connection reset".into())),
            Scripted::ok("slow", 60_000, "too late"),
            Arc::new(Scripted {
                id: "garbled".into(),
                delay: Duration::from_millis(5),
                reply: Ok("not json at all".into()),
            }) as SharedProvider,
        ];
        let report = runner()
            .analyze("Jane", "Healthcare", &RetrievedContext::empty(), &providers)
            .await;

        assert_eq!(report.claims.len(), 1);
        assert_eq!(report.claims[0].provider_id, "a");
        let dropped: Vec<(&str, bool)> = report
            .dropped
            .iter()
            .map(|d| {
                (
                    d.provider_id.as_str(),
                    matches!(&d.reason, DropReason::Provider(e) if e.is_timeout()),
                )
            })
            .collect();
        assert_eq!(dropped, vec![("b", false), ("slow", true), ("garbled", false)]);
        assert!(!report.cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_returns_completed_subset() {
        let runner = AnalysisRunner::new(Duration::from_secs(30), Duration::from_secs(5));
        let providers = vec![
            Scripted::ok("a", 1_000, "fast"),
            Scripted::ok("b", 20_000, "slow"),
        ];
        let report = runner
            .analyze("Jane", "Healthcare", &RetrievedContext::empty(), &providers)
            .await;
        assert!(report.deadline_exceeded);
        assert_eq!(report.claims.len(), 1);
        assert_eq!(report.dropped[0].reason, DropReason::DeadlineExceeded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_keeps_finished_claims() {
        let providers = vec![
            Scripted::ok("a", 100, "done"),
            Scripted::ok("b", 200, "done too"),
            Scripted::ok("c", 10_000, "never"),
        ];
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            trigger.cancel();
        });

        let report = runner()
            .analyze_with_cancel("Jane", "Healthcare", &RetrievedContext::empty(), &providers, &cancel)
            .await;
        assert!(report.cancelled);
        let ids: Vec<&str> = report.claims.iter().map(|c| c.provider_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(report.dropped.len(), 1);
        assert_eq!(report.dropped[0].provider_id, "c");
        assert_eq!(report.dropped[0].reason, DropReason::Cancelled);
        assert!(report.elapsed < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_panicking_provider_is_dropped() {
        let providers: Vec<SharedProvider> = vec![Scripted::ok("a", 0, "fine"), Arc::new(Panics)];
        let report = runner()
            .analyze("Jane", "Healthcare", &RetrievedContext::empty(), &providers)
            .await;
        assert_eq!(report.claims.len(), 1);
        assert_eq!(report.dropped[0].provider_id, "panics");
        assert_eq!(report.dropped[0].reason, DropReason::Panicked);
    }

    #[tokio::test]
    async fn test_no_providers_empty_report() {
        let report = runner()
            .analyze("Jane", "Healthcare", &RetrievedContext::empty(), &[])
            .await;
        assert!(report.claims.is_empty());
        assert!(report.dropped.is_empty());
    }
}
