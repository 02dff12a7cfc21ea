//! Concrete `ProviderClient` implementations.
//!
//! | Kind                | Endpoint                           | Auth                  |
//! |---------------------|------------------------------------|-----------------------|
//! | `openai_compatible` | `POST {base_url}/chat/completions` | optional bearer token |
//! | `anthropic`         | `POST {base_url}/messages`         | `x-api-key` header    |
//!
//! Per-call timeouts are enforced by the analysis runner; the HTTP client
//! only carries a generous backstop.

pub mod anthropic;
pub mod openai;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use triangulation::analysis::{ProviderError, ProviderResult, SharedProvider};

use crate::config::{AgentsError, AgentsResult, ProviderConfig, ProviderKind};

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiCompatibleProvider;

/// Backstop for a single HTTP exchange.
const HTTP_TIMEOUT: Duration = Duration::from_secs(300);

/// Shared HTTP client for every provider built from one config.
pub fn http_client() -> AgentsResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| AgentsError::Client(e.to_string()))
}

/// Build one provider, resolving its API key through `lookup`.
pub fn build_provider<F>(
    config: &ProviderConfig,
    http: reqwest::Client,
    lookup: F,
) -> AgentsResult<SharedProvider>
where
    F: Fn(&str) -> Option<String>,
{
    let api_key = config.api_key_from(lookup)?;
    let provider: SharedProvider = match config.kind {
        ProviderKind::OpenAiCompatible => {
            Arc::new(OpenAiCompatibleProvider::new(config, api_key, http))
        }
        ProviderKind::Anthropic => {
            // api_key_from always yields a key for Anthropic
            let key = api_key.ok_or_else(|| AgentsError::MissingApiKey {
                provider: config.id.clone(),
                var: config
                    .api_key_env
                    .clone()
                    .unwrap_or_else(|| "ANTHROPIC_API_KEY".to_string()),
            })?;
            Arc::new(AnthropicProvider::new(config, key, http))
        }
    };
    info!(
        provider = %config.id,
        kind = %config.kind,
        model = %config.model,
        base_url = %config.base_url(),
        "Provider configured"
    );
    Ok(provider)
}

/// Build every configured provider, in configuration order.
pub fn build_providers(configs: &[ProviderConfig]) -> AgentsResult<Vec<SharedProvider>> {
    let http = http_client()?;
    configs
        .iter()
        .map(|config| build_provider(config, http.clone(), |key| std::env::var(key).ok()))
        .collect()
}

/// Map a transport failure onto the runner's error taxonomy.
pub(crate) fn request_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(HTTP_TIMEOUT)
    } else {
        ProviderError::Request(e.to_string())
    }
}

/// Read a successful response body, or turn a non-2xx status into an error.
pub(crate) async fn response_text(response: reqwest::Response) -> ProviderResult<String> {
    let status = response.status();
    let body = response.text().await.map_err(request_error)?;
    if !status.is_success() {
        return Err(ProviderError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}
