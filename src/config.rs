use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::models::ScriptTag;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub governor: GovernorConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub faq: FaqConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub sanitizer: SanitizerConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Defaults for commands that can run without a config file.
    pub fn minimal() -> Self {
        Self::default()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GovernorConfig {
    #[serde(default = "default_calls_per_minute")]
    pub calls_per_minute: i64,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_safety_margin_ms")]
    pub safety_margin_ms: u64,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            calls_per_minute: default_calls_per_minute(),
            window_secs: default_window_secs(),
            safety_margin_ms: default_safety_margin_ms(),
        }
    }
}

fn default_calls_per_minute() -> i64 {
    15
}
fn default_window_secs() -> u64 {
    60
}
fn default_safety_margin_ms() -> u64 {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    #[serde(default = "default_native_ratio")]
    pub native_ratio: f64,
    #[serde(default = "default_min_lexicon_hits")]
    pub min_lexicon_hits: usize,
    #[serde(default = "default_lexicon_ratio")]
    pub lexicon_ratio: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            native_ratio: default_native_ratio(),
            min_lexicon_hits: default_min_lexicon_hits(),
            lexicon_ratio: default_lexicon_ratio(),
        }
    }
}

fn default_native_ratio() -> f64 {
    0.40
}
fn default_min_lexicon_hits() -> usize {
    3
}
fn default_lexicon_ratio() -> f64 {
    0.25
}

#[derive(Debug, Deserialize, Clone)]
pub struct FaqConfig {
    /// Persisted corpus built by `kancha faq build`. No corpus, no FAQ stage.
    #[serde(default)]
    pub corpus: Option<PathBuf>,
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_register")]
    pub default_register: ScriptTag,
}

impl Default for FaqConfig {
    fn default() -> Self {
        Self {
            corpus: None,
            threshold: default_threshold(),
            default_register: default_register(),
        }
    }
}

fn default_threshold() -> f32 {
    0.68
}
fn default_register() -> ScriptTag {
    ScriptTag::Latin
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default = "default_country_native")]
    pub country_native: String,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default = "default_accept_language")]
    pub accept_language: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_general_providers")]
    pub general_providers: Vec<String>,
    #[serde(default = "default_volatile_providers")]
    pub volatile_providers: Vec<String>,
    #[serde(default = "default_news_sites")]
    pub news_sites: Vec<String>,
    #[serde(default = "default_regional_domains")]
    pub regional_domains: Vec<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_results: default_max_results(),
            timeout_secs: default_provider_timeout(),
            country: default_country(),
            country_native: default_country_native(),
            locale: default_locale(),
            accept_language: default_accept_language(),
            user_agent: default_user_agent(),
            general_providers: default_general_providers(),
            volatile_providers: default_volatile_providers(),
            news_sites: default_news_sites(),
            regional_domains: default_regional_domains(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_max_results() -> usize {
    3
}
fn default_provider_timeout() -> u64 {
    12
}
fn default_country() -> String {
    "Nepal".to_string()
}
fn default_country_native() -> String {
    "नेपाल".to_string()
}
fn default_locale() -> String {
    "np-np".to_string()
}
fn default_accept_language() -> String {
    "en-US,en;q=0.7,ne;q=0.5".to_string()
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}
fn default_general_providers() -> Vec<String> {
    vec!["duckduckgo".to_string(), "google".to_string()]
}
fn default_volatile_providers() -> Vec<String> {
    vec!["duckduckgo".to_string()]
}
fn default_news_sites() -> Vec<String> {
    vec![
        "onlinekhabar".to_string(),
        "ekantipur".to_string(),
        "setopati".to_string(),
    ]
}
fn default_regional_domains() -> Vec<String> {
    vec![".np".to_string(), ".com.np".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_model_provider")]
    pub provider: String,
    #[serde(default = "default_model_name")]
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_model_provider(),
            model: default_model_name(),
            api_key_env: default_api_key_env(),
            url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_model_provider() -> String {
    "gemini".to_string()
}
fn default_model_name() -> String {
    "gemini-2.5-flash".to_string()
}
fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SanitizerConfig {
    #[serde(default)]
    pub extra_rules: Vec<ExtraRule>,
}

/// A user-supplied pattern → replacement rule.
#[derive(Debug, Deserialize, Clone)]
pub struct ExtraRule {
    pub pattern: String,
    #[serde(default)]
    pub replacement: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

const SEARCH_PROVIDERS: [&str; 2] = ["duckduckgo", "google"];
const NEWS_SITES: [&str; 3] = ["onlinekhabar", "ekantipur", "setopati"];

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Governor
    if config.governor.calls_per_minute <= 0 {
        anyhow::bail!("governor.calls_per_minute must be > 0");
    }
    if config.governor.window_secs == 0 {
        anyhow::bail!("governor.window_secs must be > 0");
    }

    // Classifier
    if !(0.0..=1.0).contains(&config.classifier.native_ratio) {
        anyhow::bail!("classifier.native_ratio must be in [0.0, 1.0]");
    }
    if !(0.0..=1.0).contains(&config.classifier.lexicon_ratio) {
        anyhow::bail!("classifier.lexicon_ratio must be in [0.0, 1.0]");
    }

    // FAQ
    if !(-1.0..=1.0).contains(&config.faq.threshold) {
        anyhow::bail!("faq.threshold must be in [-1.0, 1.0]");
    }
    if config.faq.corpus.is_some() && !config.embedding.is_enabled() {
        anyhow::bail!("faq.corpus requires an [embedding] provider");
    }

    // Embedding
    match config.embedding.provider.as_str() {
        "disabled" | "hash" | "openai" | "ollama" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, hash, openai, ollama, or local.",
            other
        ),
    }
    if matches!(config.embedding.provider.as_str(), "openai" | "ollama") {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    if config.embedding.dims == Some(0) {
        anyhow::bail!("embedding.dims must be > 0");
    }

    // Retrieval
    if config.retrieval.max_results < 1 {
        anyhow::bail!("retrieval.max_results must be >= 1");
    }
    for name in config
        .retrieval
        .general_providers
        .iter()
        .chain(config.retrieval.volatile_providers.iter())
    {
        if !SEARCH_PROVIDERS.contains(&name.as_str()) {
            anyhow::bail!(
                "Unknown search provider: '{}'. Must be one of: {}",
                name,
                SEARCH_PROVIDERS.join(", ")
            );
        }
    }
    for name in &config.retrieval.news_sites {
        if !NEWS_SITES.contains(&name.as_str()) {
            anyhow::bail!(
                "Unknown news site: '{}'. Must be one of: {}",
                name,
                NEWS_SITES.join(", ")
            );
        }
    }

    // Model
    match config.model.provider.as_str() {
        "gemini" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown model provider: '{}'. Must be gemini or ollama.",
            other
        ),
    }
    if config.model.timeout_secs == 0 {
        anyhow::bail!("model.timeout_secs must be > 0");
    }

    // Sanitizer
    for rule in &config.sanitizer.extra_rules {
        Regex::new(&rule.pattern)
            .with_context(|| format!("Invalid sanitizer pattern: {}", rule.pattern))?;
    }

    Ok(())
}
