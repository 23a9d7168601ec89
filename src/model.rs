//! The upstream language model, seen as an opaque text-completion service.
//!
//! [`ModelClient`] is the seam the router calls through. Two HTTP clients
//! implement it: [`GeminiClient`] (Google `generateContent`) and
//! [`OllamaClient`] (`/api/generate`).
//!
//! # Fault classification
//!
//! Every failure is reduced to a [`FaultCategory`] so the router can show a
//! register-appropriate message. Classification uses structured signals
//! first (HTTP status, reqwest's timeout/connect flags, the vendor's error
//! `status` field) and falls back to matching the error text only when
//! nothing structured is available. The text fallback is coupled to vendor
//! wording; a reworded message degrades to [`FaultCategory::Upstream`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::ModelConfig;

/// One completion request.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub prompt: String,
    pub timeout: Duration,
}

/// User-facing failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultCategory {
    Quota,
    Timeout,
    Transport,
    Configuration,
    Upstream,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelError {
    #[error("quota exceeded: {0}")]
    Quota(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("network error: {0}")]
    Transport(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("upstream error (HTTP {status:?}): {message}")]
    Upstream { status: Option<u16>, message: String },
}

impl ModelError {
    pub fn category(&self) -> FaultCategory {
        match self {
            ModelError::Quota(_) => FaultCategory::Quota,
            ModelError::Timeout(_) => FaultCategory::Timeout,
            ModelError::Transport(_) => FaultCategory::Transport,
            ModelError::Configuration(_) => FaultCategory::Configuration,
            ModelError::Upstream { .. } => FaultCategory::Upstream,
        }
    }

    /// Build the error for a non-success HTTP response.
    pub fn from_status(status: u16, message: impl Into<String>, timeout: Duration) -> Self {
        let message = message.into();
        match classify_fault(Some(status), &message) {
            FaultCategory::Quota => ModelError::Quota(message),
            FaultCategory::Timeout => ModelError::Timeout(timeout),
            FaultCategory::Transport => ModelError::Transport(message),
            FaultCategory::Configuration => ModelError::Configuration(message),
            FaultCategory::Upstream => ModelError::Upstream {
                status: Some(status),
                message,
            },
        }
    }

    /// Build the error for a failed send.
    pub fn from_reqwest(err: &reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            return ModelError::Timeout(timeout);
        }
        if err.is_connect() {
            return ModelError::Transport(err.to_string());
        }
        match err.status() {
            Some(status) => Self::from_status(status.as_u16(), err.to_string(), timeout),
            None => match classify_fault(None, &err.to_string()) {
                FaultCategory::Timeout => ModelError::Timeout(timeout),
                FaultCategory::Quota => ModelError::Quota(err.to_string()),
                FaultCategory::Configuration => ModelError::Configuration(err.to_string()),
                FaultCategory::Upstream | FaultCategory::Transport => {
                    ModelError::Transport(err.to_string())
                }
            },
        }
    }
}

const QUOTA_HINTS: &[&str] = &["quota", "429", "rate limit", "resource_exhausted", "resource exhausted", "too many requests"];
const TIMEOUT_HINTS: &[&str] = &["timeout", "timed out", "deadline"];
const CREDENTIAL_HINTS: &[&str] = &[
    "api key",
    "api_key",
    "invalid credential",
    "unauthenticated",
    "permission denied",
    "permission_denied",
];
const TRANSPORT_HINTS: &[&str] = &["connection", "network", "dns", "unreachable", "reset by peer"];

/// Map a model fault to a category. `status` wins when present; the
/// message is only inspected when the status is absent or uninformative.
pub fn classify_fault(status: Option<u16>, message: &str) -> FaultCategory {
    match status {
        Some(429) => return FaultCategory::Quota,
        Some(401) | Some(403) => return FaultCategory::Configuration,
        Some(408) | Some(504) => return FaultCategory::Timeout,
        _ => {}
    }

    let lower = message.to_lowercase();
    let has = |hints: &[&str]| hints.iter().any(|h| lower.contains(h));
    if has(QUOTA_HINTS) {
        FaultCategory::Quota
    } else if has(TIMEOUT_HINTS) {
        FaultCategory::Timeout
    } else if has(CREDENTIAL_HINTS) {
        FaultCategory::Configuration
    } else if has(TRANSPORT_HINTS) {
        FaultCategory::Transport
    } else {
        FaultCategory::Upstream
    }
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Short identifier for logs (e.g. `"gemini-2.5-flash"`).
    fn name(&self) -> &str;

    async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError>;
}

/// Build the configured model client.
///
/// Fails with [`ModelError::Configuration`] when the provider is unknown or
/// its credential is missing.
pub fn create_client(config: &ModelConfig) -> Result<Box<dyn ModelClient>, ModelError> {
    match config.provider.as_str() {
        "gemini" => Ok(Box::new(GeminiClient::new(config)?)),
        "ollama" => Ok(Box::new(OllamaClient::new(config)?)),
        other => Err(ModelError::Configuration(format!(
            "Unknown model provider: {}",
            other
        ))),
    }
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client, ModelError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ModelError::Configuration(format!("Failed to create HTTP client: {}", e)))
}

// ============ Gemini ============

pub struct GeminiClient {
    model: String,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct GeminiErrorBody {
    error: GeminiErrorDetail,
}

#[derive(Deserialize)]
struct GeminiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

impl GeminiClient {
    pub fn new(config: &ModelConfig) -> Result<Self, ModelError> {
        let api_key = match std::env::var(&config.api_key_env) {
            Ok(key) if !key.trim().is_empty() => key,
            Ok(_) => {
                return Err(ModelError::Configuration(format!(
                    "API key env var {} is empty",
                    config.api_key_env
                )))
            }
            Err(_) => {
                return Err(ModelError::Configuration(format!(
                    "API key env var {} not found",
                    config.api_key_env
                )))
            }
        };
        Self::with_key(config, api_key)
    }

    /// Construct with an explicit key instead of the environment.
    pub fn with_key(config: &ModelConfig, api_key: impl Into<String>) -> Result<Self, ModelError> {
        Ok(Self {
            model: config.model.clone(),
            api_key: api_key.into(),
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string())
                .trim_end_matches('/')
                .to_string(),
            client: http_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": request.prompt }] }],
        });

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", self.api_key.as_str())
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::from_reqwest(&e, request.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            // Prefer the vendor's structured status (e.g. RESOURCE_EXHAUSTED).
            let message = match serde_json::from_str::<GeminiErrorBody>(&text) {
                Ok(parsed) => format!("{} {}", parsed.error.status, parsed.error.message),
                Err(_) => text,
            };
            return Err(ModelError::from_status(
                status.as_u16(),
                message.trim(),
                request.timeout,
            ));
        }

        let parsed: GeminiResponse = response.json().await.map_err(|e| ModelError::Upstream {
            status: None,
            message: format!("Failed to parse response: {}", e),
        })?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ModelError::Upstream {
                status: None,
                message: "model returned an empty response".to_string(),
            });
        }
        debug!(model = self.model.as_str(), chars = text.len(), "completion received");
        Ok(text)
    }
}

// ============ Ollama ============

pub struct OllamaClient {
    model: String,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct OllamaGenerateResponse {
    #[serde(default)]
    response: String,
    error: Option<String>,
}

impl OllamaClient {
    pub fn new(config: &ModelConfig) -> Result<Self, ModelError> {
        Ok(Self {
            model: config.model.clone(),
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string())
                .trim_end_matches('/')
                .to_string(),
            client: http_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl ModelClient for OllamaClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "prompt": request.prompt,
            "stream": false,
        });

        let response = self
            .client
            .post(&url)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::from_reqwest(&e, request.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ModelError::from_status(status.as_u16(), text, request.timeout));
        }

        let parsed: OllamaGenerateResponse =
            response.json().await.map_err(|e| ModelError::Upstream {
                status: None,
                message: format!("Failed to parse response: {}", e),
            })?;
        if let Some(error) = parsed.error {
            return Err(ModelError::Upstream {
                status: None,
                message: error,
            });
        }
        if parsed.response.trim().is_empty() {
            return Err(ModelError::Upstream {
                status: None,
                message: "model returned an empty response".to_string(),
            });
        }
        Ok(parsed.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_takes_precedence_over_text() {
        assert_eq!(classify_fault(Some(429), "whatever"), FaultCategory::Quota);
        assert_eq!(classify_fault(Some(403), "quota"), FaultCategory::Configuration);
        assert_eq!(classify_fault(Some(504), ""), FaultCategory::Timeout);
    }

    #[test]
    fn test_text_fallback() {
        assert_eq!(
            classify_fault(None, "RESOURCE_EXHAUSTED: Quota exceeded for metric"),
            FaultCategory::Quota
        );
        assert_eq!(
            classify_fault(Some(400), "INVALID_ARGUMENT API key not valid. Please pass a valid API key."),
            FaultCategory::Configuration
        );
        assert_eq!(classify_fault(None, "Deadline Exceeded"), FaultCategory::Timeout);
        assert_eq!(classify_fault(None, "connection refused"), FaultCategory::Transport);
        assert_eq!(classify_fault(Some(500), "internal"), FaultCategory::Upstream);
    }

    #[test]
    fn test_from_status_builds_matching_variant() {
        let err = ModelError::from_status(429, "slow down", Duration::from_secs(30));
        assert_eq!(err.category(), FaultCategory::Quota);
        let err = ModelError::from_status(502, "bad gateway", Duration::from_secs(30));
        assert!(matches!(err, ModelError::Upstream { status: Some(502), .. }));
        assert!(err.to_string().contains("502"));
    }

    #[test]
    fn test_missing_api_key_is_configuration_fault() {
        let config = ModelConfig {
            api_key_env: "KANCHA_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..ModelConfig::default()
        };
        let err = create_client(&config).err().unwrap();
        assert_eq!(err.category(), FaultCategory::Configuration);
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let config = ModelConfig {
            provider: "bard".to_string(),
            ..ModelConfig::default()
        };
        assert!(matches!(
            create_client(&config),
            Err(ModelError::Configuration(_))
        ));
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let config = ModelConfig {
            provider: "ollama".to_string(),
            model: "llama3.2:3b".to_string(),
            ..ModelConfig::default()
        };
        let client = create_client(&config).unwrap();
        assert_eq!(client.name(), "llama3.2:3b");
    }
}
