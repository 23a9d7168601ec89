//! Cascading multi-source web retrieval.
//!
//! [`RetrievalGateway::search`] turns a user question into one or more
//! provider queries ([`query::QueryPlanner`]) and walks providers in a fixed
//! priority order, stopping at the first provider that yields a usable
//! result after cleaning, relevance filtering, and deduplication.
//!
//! ```text
//!  question ──▶ plan ──┬─ general ──▶ duckduckgo ─▶ google ─────────────▶ []
//!                      │
//!                      └─ volatile ─▶ rewrite₁..₃ × volatile providers
//!                                        └─▶ regional news sites ───────▶ []
//! ```
//!
//! Provider failures (network, HTTP status, malformed markup, timeout) are
//! logged and skipped. An empty list is a normal outcome meaning "no
//! current information available".

pub mod parsers;
pub mod providers;
pub mod query;

use anyhow::Result;
use chrono::{DateTime, TimeZone};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::RetrievalConfig;
use crate::models::SearchResult;
use parsers::{clean_text, truncate_chars, SNIPPET_MAX_CHARS, TITLE_MAX_CHARS};
use providers::{HttpSearchProvider, ProviderError, SearchProvider, Site};
use query::QueryPlanner;

/// Encyclopedia mirrors, shopping pages, bare PDFs, and ads.
static IRRELEVANT: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)wikipedia\.org",
        r"(?i)\bwiki(?:pedia)?\s+mirror\b",
        r"(?i)book.*?price",
        r"(?i)buy.*?online",
        r"(?i)add to cart",
        r"(?i)shop now",
        r"(?i)\.pdf\s*$",
        r"(?i)^\s*\[pdf\]",
        r"(?i)advertisement",
        r"(?i)\bsponsored\b",
        r"यसबारे थप",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// True when a result matches a known-irrelevant pattern.
pub fn is_irrelevant(result: &SearchResult) -> bool {
    let combined = format!("{} {}", result.title, result.snippet);
    IRRELEVANT.iter().any(|re| re.is_match(&combined))
}

/// Per-site caps when aggregating the regional news fallback: the first
/// site contributes up to two headlines, the rest one each.
const NEWS_CAPS: [usize; 2] = [2, 1];

pub struct RetrievalGateway {
    general: Vec<Arc<dyn SearchProvider>>,
    volatile: Vec<Arc<dyn SearchProvider>>,
    news: Vec<Arc<dyn SearchProvider>>,
    planner: QueryPlanner,
    provider_timeout: Duration,
}

impl RetrievalGateway {
    pub fn new(
        general: Vec<Arc<dyn SearchProvider>>,
        volatile: Vec<Arc<dyn SearchProvider>>,
        news: Vec<Arc<dyn SearchProvider>>,
        planner: QueryPlanner,
    ) -> Self {
        Self {
            general,
            volatile,
            news,
            planner,
            provider_timeout: Duration::from_secs(15),
        }
    }

    /// Upper bound on a single provider call, on top of the HTTP timeout.
    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    /// Build the HTTP provider chains named in `[retrieval]`.
    pub fn from_config(config: &RetrievalConfig) -> Result<Self> {
        let build = |names: &[String]| -> Result<Vec<Arc<dyn SearchProvider>>> {
            names
                .iter()
                .map(|name| {
                    let site = Site::from_name(name)
                        .ok_or_else(|| anyhow::anyhow!("Unknown search provider: {}", name))?;
                    let provider: Arc<dyn SearchProvider> =
                        Arc::new(HttpSearchProvider::new(site, config)?);
                    Ok(provider)
                })
                .collect()
        };

        Ok(Self::new(
            build(&config.general_providers)?,
            build(&config.volatile_providers)?,
            build(&config.news_sites)?,
            QueryPlanner::from_config(config),
        )
        // Slightly above the HTTP timeout so reqwest reports first.
        .with_provider_timeout(Duration::from_secs(config.timeout_secs + 3)))
    }

    /// Does `query` ask for information that changes over time?
    pub fn needs_retrieval(&self, query: &str) -> bool {
        self.planner.needs_retrieval(query)
    }

    /// Search the web for `query`, returning at most `max_results` results.
    /// Never fails; total failure is an empty list.
    pub async fn search(&self, query: &str, max_results: usize) -> Vec<SearchResult> {
        if query.trim().is_empty() || max_results == 0 {
            return Vec::new();
        }

        let plan = self.planner.plan(query);
        let chain = if plan.volatile {
            &self.volatile
        } else {
            &self.general
        };
        info!(
            volatile = plan.volatile,
            candidates = plan.queries.len(),
            "web search: {}",
            query
        );

        for candidate in &plan.queries {
            if let Some(results) = self.cascade(chain, candidate, max_results).await {
                return results;
            }
        }

        if plan.volatile {
            let results = self.regional_news(query.trim(), max_results).await;
            if !results.is_empty() {
                info!(results = results.len(), "regional news fallback answered");
            }
            return results;
        }

        info!("no provider returned usable results");
        Vec::new()
    }

    /// Try providers in order; first non-empty refined result set wins.
    async fn cascade(
        &self,
        chain: &[Arc<dyn SearchProvider>],
        query: &str,
        max_results: usize,
    ) -> Option<Vec<SearchResult>> {
        for provider in chain {
            match self.call(provider.as_ref(), query, max_results).await {
                Ok(raw) => {
                    let results = refine(raw, max_results);
                    if !results.is_empty() {
                        info!(
                            provider = provider.name(),
                            results = results.len(),
                            "search answered by '{}'",
                            query
                        );
                        return Some(results);
                    }
                    debug!(provider = provider.name(), "no usable results");
                }
                Err(e) => {
                    warn!(provider = provider.name(), "search provider failed: {}", e);
                }
            }
        }
        None
    }

    async fn regional_news(&self, query: &str, max_results: usize) -> Vec<SearchResult> {
        let mut collected: Vec<SearchResult> = Vec::new();
        for (i, site) in self.news.iter().enumerate() {
            if collected.len() >= max_results {
                break;
            }
            let cap = if i == 0 { NEWS_CAPS[0] } else { NEWS_CAPS[1] };
            match self.call(site.as_ref(), query, cap).await {
                Ok(raw) => {
                    collected.extend(refine(raw, cap));
                    collected = dedup(collected);
                }
                Err(e) => warn!(provider = site.name(), "news site failed: {}", e),
            }
        }
        collected.truncate(max_results);
        collected
    }

    async fn call(
        &self,
        provider: &dyn SearchProvider,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>, ProviderError> {
        debug!(provider = provider.name(), "querying: {}", query);
        match tokio::time::timeout(self.provider_timeout, provider.search(query, limit)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(self.provider_timeout)),
        }
    }
}

/// Clean, filter, deduplicate, and truncate one provider's results.
pub fn refine(raw: Vec<SearchResult>, max_results: usize) -> Vec<SearchResult> {
    let cleaned: Vec<SearchResult> = raw
        .into_iter()
        .map(|r| SearchResult {
            title: truncate_chars(&clean_text(&r.title), TITLE_MAX_CHARS),
            snippet: truncate_chars(&clean_text(&r.snippet), SNIPPET_MAX_CHARS),
            source: r.source,
            date_hint: r.date_hint,
        })
        .filter(|r| !r.title.is_empty() && !is_irrelevant(r))
        .collect();

    let mut results = dedup(cleaned);
    results.truncate(max_results);
    results
}

/// Drop later results whose normalised title was already seen.
fn dedup(results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut seen: HashSet<String> = HashSet::new();
    results
        .into_iter()
        .filter(|r| seen.insert(r.title.to_lowercase()))
        .collect()
}

/// Render search results as model context.
///
/// An empty result list still produces a block, telling the model that no
/// current information was found so it does not fall back on stale facts.
pub fn format_context<Tz: TimeZone>(query: &str, results: &[SearchResult], now: DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let mut out = String::new();
    out.push_str("CURRENT WEB SEARCH RESULTS\n");
    out.push_str(&format!("Search query: \"{}\"\n", query.trim()));
    out.push_str(&format!("Search time: {}\n", now.format("%B %d, %Y %H:%M")));

    if results.is_empty() {
        out.push_str("Results found: 0\n\n");
        out.push_str(
            "No current information is available from web search. Say that the search did not \
             return current information; do not guess or rely on outdated knowledge.\n",
        );
        return out;
    }

    out.push_str(&format!("Results found: {}\n\n", results.len()));
    for (i, result) in results.iter().enumerate() {
        out.push_str(&format!("RESULT #{}: {}\n", i + 1, result.title));
        if !result.snippet.is_empty() {
            out.push_str(&result.snippet);
            out.push('\n');
        }
        out.push_str(&format!(
            "Source: {} | Date: {}\n\n",
            result.source,
            result.date_hint.as_deref().unwrap_or("Recent")
        ));
    }
    out.push_str(
        "Use only the information in these results, cite result numbers (#1, #2, ...), and say \
         so if they do not answer the question.\n",
    );
    out
}
