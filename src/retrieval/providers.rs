//! Search providers: the [`SearchProvider`] seam and the HTTP scrapers
//! behind it.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use super::parsers;
use crate::config::RetrievalConfig;
use crate::models::SearchResult;

/// Why a provider produced nothing. Every variant is absorbed by the
/// gateway cascade; none reaches the router.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Transport(String),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// A web search source queried by the retrieval cascade.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Stable identifier used in configuration (e.g. `"duckduckgo"`).
    fn name(&self) -> &str;

    /// Run `query` and return up to `limit` raw results.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, ProviderError>;
}

/// The scraped sites this crate knows how to query and parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Site {
    DuckDuckGo,
    Google,
    OnlineKhabar,
    Ekantipur,
    Setopati,
}

impl Site {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "duckduckgo" => Some(Site::DuckDuckGo),
            "google" => Some(Site::Google),
            "onlinekhabar" => Some(Site::OnlineKhabar),
            "ekantipur" => Some(Site::Ekantipur),
            "setopati" => Some(Site::Setopati),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Site::DuckDuckGo => "duckduckgo",
            Site::Google => "google",
            Site::OnlineKhabar => "onlinekhabar",
            Site::Ekantipur => "ekantipur",
            Site::Setopati => "setopati",
        }
    }

    pub fn default_endpoint(self) -> &'static str {
        match self {
            Site::DuckDuckGo => "https://html.duckduckgo.com/html/",
            Site::Google => "https://www.google.com/search",
            Site::OnlineKhabar => "https://www.onlinekhabar.com/search",
            Site::Ekantipur => "https://ekantipur.com/search",
            Site::Setopati => "https://www.setopati.com/search",
        }
    }

    fn params(self, query: &str, locale: &str) -> Vec<(&'static str, String)> {
        match self {
            Site::DuckDuckGo => vec![("q", query.to_string()), ("kl", locale.to_string())],
            Site::Google => {
                let region = locale.split('-').next().unwrap_or(locale);
                vec![("q", query.to_string()), ("gl", region.to_string())]
            }
            Site::OnlineKhabar | Site::Ekantipur | Site::Setopati => {
                vec![("q", query.to_string())]
            }
        }
    }

    fn parse(self, html: &str, limit: usize, query: &str) -> Vec<SearchResult> {
        match self {
            Site::DuckDuckGo => parsers::parse_duckduckgo(html, limit),
            Site::Google => parsers::parse_google(html, limit),
            Site::OnlineKhabar => parsers::parse_onlinekhabar(html, limit, query),
            Site::Ekantipur => parsers::parse_ekantipur(html, limit, query),
            Site::Setopati => parsers::parse_setopati(html, limit, query),
        }
    }
}

/// Plain HTTP GET + HTML scrape against one [`Site`].
pub struct HttpSearchProvider {
    site: Site,
    endpoint: String,
    locale: String,
    accept_language: String,
    timeout: Duration,
    http: reqwest::Client,
}

impl HttpSearchProvider {
    pub fn new(site: Site, config: &RetrievalConfig) -> anyhow::Result<Self> {
        Self::with_endpoint(site, site.default_endpoint(), config)
    }

    /// Point the provider at a different base URL (mirrors, tests).
    pub fn with_endpoint(
        site: Site,
        endpoint: impl Into<String>,
        config: &RetrievalConfig,
    ) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            site,
            endpoint: endpoint.into(),
            locale: config.locale.clone(),
            accept_language: config.accept_language.clone(),
            timeout,
            http,
        })
    }
}

#[async_trait]
impl SearchProvider for HttpSearchProvider {
    fn name(&self) -> &str {
        self.site.name()
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, ProviderError> {
        let mut request = self
            .http
            .get(&self.endpoint)
            .query(&self.site.params(query, &self.locale))
            .header(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header("Accept-Language", self.accept_language.as_str());
        if self.site == Site::DuckDuckGo {
            request = request.header("Referer", "https://duckduckgo.com/");
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(self.timeout)
            } else {
                ProviderError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status(status.as_u16()));
        }

        let html = response
            .text()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let results = self.site.parse(&html, limit, query);
        debug!(
            provider = self.site.name(),
            bytes = html.len(),
            results = results.len(),
            "parsed provider response"
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_names_round_trip() {
        for site in [
            Site::DuckDuckGo,
            Site::Google,
            Site::OnlineKhabar,
            Site::Ekantipur,
            Site::Setopati,
        ] {
            assert_eq!(Site::from_name(site.name()), Some(site));
        }
        assert_eq!(Site::from_name("bing"), None);
    }

    #[test]
    fn test_params_carry_locale() {
        let ddg = Site::DuckDuckGo.params("pm", "np-np");
        assert!(ddg.contains(&("kl", "np-np".to_string())));
        let google = Site::Google.params("pm", "np-np");
        assert!(google.contains(&("gl", "np".to_string())));
    }
}
