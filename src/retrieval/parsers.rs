//! Provider-specific HTML extraction.
//!
//! Every parser takes raw HTML and returns at most `limit` results. Markup
//! drift degrades to fewer (or zero) results; parsers never fail.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::models::SearchResult;

pub const TITLE_MAX_CHARS: usize = 120;
pub const SNIPPET_MAX_CHARS: usize = 300;

/// Search-engine snippets shorter than this are navigation chrome.
const MIN_SNIPPET_CHARS: usize = 20;
/// News headlines shorter than this are section labels.
const MIN_HEADLINE_CHARS: usize = 10;

static DATE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(\d{1,2}\s+(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?,?\s+\d{4}|(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+\d{1,2},\s+\d{4})\b",
    )
    .ok()
});

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

pub(crate) fn text_content(elem: ElementRef<'_>) -> String {
    elem.text().collect::<Vec<_>>().join(" ")
}

pub(crate) fn compact_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip tags, decode entities, and collapse whitespace.
pub fn clean_text(raw: &str) -> String {
    if !raw.contains('<') && !raw.contains('&') {
        return compact_ws(raw);
    }
    let fragment = Html::parse_fragment(raw);
    compact_ws(&text_content(fragment.root_element()))
}

/// Cut to `max` characters, marking the cut with `...`.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{}...", cut.trim_end())
}

/// First `D Mon YYYY` or `Mon D, YYYY` date in `text`.
pub fn extract_date(text: &str) -> Option<String> {
    DATE.as_ref()?
        .captures(text)
        .map(|cap| compact_ws(&cap[1]))
}

fn first_text(container: ElementRef<'_>, sel: &Option<Selector>) -> Option<String> {
    let sel = sel.as_ref()?;
    container
        .select(sel)
        .next()
        .map(|e| compact_ws(&text_content(e)))
        .filter(|t| !t.is_empty())
}

fn result(title: &str, snippet: &str, source: &str) -> SearchResult {
    SearchResult {
        title: truncate_chars(title, TITLE_MAX_CHARS),
        date_hint: extract_date(snippet),
        snippet: truncate_chars(snippet, SNIPPET_MAX_CHARS),
        source: source.to_string(),
    }
}

fn query_label(query: &str) -> String {
    truncate_chars(query.trim(), 30)
}

/// DuckDuckGo HTML endpoint (`html.duckduckgo.com/html/`).
pub fn parse_duckduckgo(html: &str, limit: usize) -> Vec<SearchResult> {
    let document = Html::parse_document(html);
    let Some(container_sel) = selector("div.result, div.web-result") else {
        return Vec::new();
    };
    let title_sel = selector("a.result__a, .result__title a, h2 a");
    let snippet_sel = selector(".result__snippet");

    let mut out = Vec::new();
    for container in document.select(&container_sel) {
        if out.len() >= limit {
            break;
        }
        // Ads reuse the result markup.
        if container.value().classes().any(|c| c == "result--ad") {
            continue;
        }
        let Some(title) = first_text(container, &title_sel) else {
            continue;
        };
        let snippet = first_text(container, &snippet_sel).unwrap_or_default();
        if snippet.chars().count() <= MIN_SNIPPET_CHARS {
            continue;
        }
        out.push(result(&title, &snippet, "DuckDuckGo"));
    }
    out
}

/// Google web results.
pub fn parse_google(html: &str, limit: usize) -> Vec<SearchResult> {
    let document = Html::parse_document(html);
    let title_sel = selector("h3");
    let snippet_sel = selector("div.VwiC3b, span.aCOpRe, div[data-sncf], div[data-content-feature]");

    let mut out = Vec::new();
    for container_css in ["div.g", "div.MjjYud"] {
        let Some(container_sel) = selector(container_css) else {
            continue;
        };
        for container in document.select(&container_sel) {
            if out.len() >= limit {
                break;
            }
            let Some(title) = first_text(container, &title_sel) else {
                continue;
            };
            let Some(snippet) = first_text(container, &snippet_sel) else {
                continue;
            };
            out.push(result(&title, &snippet, "Google Search"));
        }
        if !out.is_empty() {
            break;
        }
    }
    out
}

/// OnlineKhabar search page: headline links only.
pub fn parse_onlinekhabar(html: &str, limit: usize, query: &str) -> Vec<SearchResult> {
    headlines(html, "h2 a", limit, "OnlineKhabar", query)
}

/// Setopati search page: headline links only.
pub fn parse_setopati(html: &str, limit: usize, query: &str) -> Vec<SearchResult> {
    headlines(html, "h3 a", limit, "Setopati", query)
}

fn headlines(html: &str, css: &str, limit: usize, source: &str, query: &str) -> Vec<SearchResult> {
    let document = Html::parse_document(html);
    let Some(sel) = selector(css) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for anchor in document.select(&sel) {
        if out.len() >= limit {
            break;
        }
        let title = compact_ws(&text_content(anchor));
        if title.chars().count() <= MIN_HEADLINE_CHARS {
            continue;
        }
        let snippet = format!("Latest from {} about {}", source, query_label(query));
        out.push(result(&title, &snippet, source));
    }
    out
}

/// Ekantipur search page: `<article>` cards with a heading and an excerpt.
pub fn parse_ekantipur(html: &str, limit: usize, query: &str) -> Vec<SearchResult> {
    let document = Html::parse_document(html);
    let Some(article_sel) = selector("article") else {
        return Vec::new();
    };
    let title_sel = selector("h2, h3");
    let excerpt_sel = selector("p");

    let mut out = Vec::new();
    for article in document.select(&article_sel) {
        if out.len() >= limit {
            break;
        }
        let Some(title) = first_text(article, &title_sel) else {
            continue;
        };
        let excerpt = first_text(article, &excerpt_sel)
            .unwrap_or_else(|| format!("News from Ekantipur about {}", query_label(query)));
        out.push(result(&title, &excerpt, "Ekantipur"));
    }
    out
}
