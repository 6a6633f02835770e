//! OpenAI-compatible chat completions client (OpenRouter by default).

use std::time::{Duration, Instant};

use recast_shared::{AppConfig, RecastError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::{Oracle, OracleRequest};

/// User-Agent string for oracle requests.
const USER_AGENT: &str = concat!("Recast/", env!("CARGO_PKG_VERSION"));

/// How much of an error body to keep in the error message.
const ERROR_BODY_LIMIT: usize = 500;

/// Connection settings for [`OpenRouterOracle`].
#[derive(Debug, Clone)]
pub struct OpenRouterOptions {
    pub base_url: Url,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
    pub temperature: f32,
}

impl OpenRouterOptions {
    /// Build options from the `[oracle]` config section and an API key.
    pub fn from_config(config: &AppConfig, api_key: String) -> Result<Self> {
        let oracle = &config.oracle;
        let base_url = Url::parse(&oracle.base_url).map_err(|e| {
            RecastError::config(format!("invalid oracle base_url '{}': {e}", oracle.base_url))
        })?;
        Ok(Self {
            base_url,
            api_key,
            model: oracle.model.clone(),
            timeout: Duration::from_secs(oracle.timeout_secs),
            temperature: oracle.temperature,
        })
    }
}

/// Oracle backed by a `chat/completions` HTTP endpoint.
pub struct OpenRouterOracle {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenRouterOracle {
    pub fn new(options: OpenRouterOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(options.timeout)
            .build()
            .map_err(|e| RecastError::Oracle(format!("client build: {e}")))?;

        let endpoint = format!(
            "{}/chat/completions",
            options.base_url.as_str().trim_end_matches('/')
        );

        Ok(Self {
            client,
            endpoint,
            api_key: options.api_key,
            model: options.model,
            temperature: options.temperature,
        })
    }
}

impl Oracle for OpenRouterOracle {
    #[instrument(skip_all, fields(model = %self.model, max_tokens = request.max_output_units))]
    async fn generate(&self, request: &OracleRequest) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            max_tokens: request.max_output_units,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
        };

        let start = Instant::now();
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.trim())
            .json(&body)
            .send()
            .await
            .map_err(|e| RecastError::Oracle(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(RecastError::Oracle(format!(
                "HTTP {status}: {}",
                truncate(&text, ERROR_BODY_LIMIT)
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| RecastError::Oracle(format!("invalid completion body: {e}")))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| RecastError::Oracle("completion had no choices".into()))?;

        if choice.finish_reason.as_deref() == Some("length") {
            warn!("oracle output was cut off at max_tokens");
        }

        let text = choice.message.content.unwrap_or_default();
        if text.trim().is_empty() {
            return Err(RecastError::Oracle("completion was empty".into()));
        }

        debug!(
            latency_ms = start.elapsed().as_millis() as u64,
            chars = text.len(),
            "oracle call complete"
        );
        Ok(text)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}
