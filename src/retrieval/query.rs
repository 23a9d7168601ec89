//! Query analysis for retrieval: the need-for-retrieval predicate,
//! volatile-fact detection, and query rewriting.

use chrono::Datelike;
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

use crate::config::RetrievalConfig;

/// English and Romanized cues that the answer depends on current events.
static RECENCY_CUES: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:current|currently|latest|recent|recently|now|today|tonight|this year|as of now|breaking news|just announced|elections?|election results?|ahile|aaja|halko|taja)\b",
    )
    .ok()
});

/// Offices whose holders change: asking about them needs fresh data.
static VOLATILE_OFFICES: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:prime minister|president|pm|government|ministers?|cabinet|head of state|head of government|speaker|chief justice|pradhanmantri|pradhan mantri|rastrapati|sarkar|mantri)\b",
    )
    .ok()
});

static PRIME_MINISTER: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:prime minister|pm|pradhanmantri|pradhan mantri)\b").ok());

static PRESIDENT: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:president|rastrapati)\b").ok());

/// Clock times such as "5 pm" or "7:30pm", which are not the office.
static CLOCK_TIME: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)\b\d{1,2}(?:[:.]\d{2})?[ \t]*[ap]\.?m\b\.?").ok());

static YEAR: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\b((?:19|20)\d{2})\b").ok());

const NATIVE_RECENCY_CUES: &[&str] = &["वर्तमान", "हालको", "ताजा", "आज", "भर्खर", "अहिले", "निर्वाचन"];

const NATIVE_OFFICES: &[&str] = &["प्रधानमन्त्री", "राष्ट्रपति", "सरकार", "मन्त्री", "सभामुख"];

fn matches(re: &Lazy<Option<Regex>>, text: &str) -> bool {
    re.as_ref().map(|r| r.is_match(text)).unwrap_or(false)
}

fn without_clock_times(query: &str) -> Cow<'_, str> {
    match CLOCK_TIME.as_ref() {
        Some(re) => re.replace_all(query, " "),
        None => Cow::Borrowed(query),
    }
}

/// True when `query` asks about a transient office holder.
pub fn is_volatile_query(query: &str) -> bool {
    let query = without_clock_times(query);
    matches(&VOLATILE_OFFICES, &query) || NATIVE_OFFICES.iter().any(|k| query.contains(k))
}

/// Which office a volatile query is about, for targeted rewriting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Office {
    PrimeMinister,
    President,
    Other,
}

pub fn detect_office(query: &str) -> Office {
    let query = without_clock_times(query);
    if matches(&PRIME_MINISTER, &query) || query.contains("प्रधानमन्त्री") {
        Office::PrimeMinister
    } else if matches(&PRESIDENT, &query) || query.contains("राष्ट्रपति") {
        Office::President
    } else {
        Office::Other
    }
}

/// Render an integer with Devanagari digits (`2026` → `२०२६`).
pub fn to_devanagari_digits(n: i32) -> String {
    n.to_string()
        .chars()
        .map(|c| match c.to_digit(10) {
            Some(d) => char::from_u32(0x0966 + d).unwrap_or(c),
            None => c,
        })
        .collect()
}

/// The queries to send for one user question.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPlan {
    /// Volatile-office path: specialized providers, then regional news.
    pub volatile: bool,
    /// Candidate search strings, tried in order.
    pub queries: Vec<String>,
}

/// Rewrites user questions into provider queries biased toward recency
/// and the configured region.
#[derive(Debug, Clone)]
pub struct QueryPlanner {
    country: String,
    country_native: String,
    regional_domains: Vec<String>,
    year: i32,
}

impl QueryPlanner {
    pub fn new(
        country: impl Into<String>,
        country_native: impl Into<String>,
        regional_domains: Vec<String>,
        year: i32,
    ) -> Self {
        Self {
            country: country.into(),
            country_native: country_native.into(),
            regional_domains,
            year,
        }
    }

    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self::new(
            config.country.clone(),
            config.country_native.clone(),
            config.regional_domains.clone(),
            chrono::Local::now().year(),
        )
    }

    /// Conservative keyword test: does answering `query` need current data?
    pub fn needs_retrieval(&self, query: &str) -> bool {
        if matches(&RECENCY_CUES, query) || is_volatile_query(query) {
            return true;
        }
        if NATIVE_RECENCY_CUES.iter().any(|k| query.contains(k)) {
            return true;
        }
        // An explicit recent year is a recency cue; historical years are not.
        YEAR.as_ref()
            .map(|re| {
                re.captures_iter(query).any(|cap| {
                    cap[1]
                        .parse::<i32>()
                        .map(|y| y >= self.year - 1)
                        .unwrap_or(false)
                })
            })
            .unwrap_or(false)
    }

    pub fn plan(&self, query: &str) -> SearchPlan {
        let query = query.trim();
        if is_volatile_query(query) {
            SearchPlan {
                volatile: true,
                queries: self.volatile_queries(query),
            }
        } else {
            SearchPlan {
                volatile: false,
                queries: vec![self.general_query(query)],
            }
        }
    }

    /// Raw query plus a year and region hint.
    pub fn general_query(&self, query: &str) -> String {
        if query.to_lowercase().contains(&self.country.to_lowercase()) {
            format!("{} {}", query, self.year)
        } else {
            format!("{} {} {}", query, self.year, self.country)
        }
    }

    fn volatile_queries(&self, query: &str) -> Vec<String> {
        let (country, native, year, prev) = (
            &self.country,
            &self.country_native,
            self.year,
            self.year - 1,
        );
        let year_native = to_devanagari_digits(year);

        let phrasings = match detect_office(query) {
            Office::PrimeMinister => vec![
                format!("{} current Prime Minister {} {} latest", country, prev, year),
                format!("Who is Prime Minister of {} now", country),
                format!("नयाँ प्रधानमन्त्री {} {}", native, year_native),
            ],
            Office::President => vec![
                format!("{} President {} {} current", country, prev, year),
                format!("Who is President of {} now", country),
                format!("{}को राष्ट्रपति {}", native, year_native),
            ],
            Office::Other => vec![format!("{} {} latest {} {}", query, country, prev, year)],
        };

        let site_hint = self.site_hint();
        phrasings
            .into_iter()
            .map(|q| match &site_hint {
                Some(hint) => format!("{} {}", q, hint),
                None => q,
            })
            .collect()
    }

    fn site_hint(&self) -> Option<String> {
        if self.regional_domains.is_empty() {
            return None;
        }
        Some(
            self.regional_domains
                .iter()
                .map(|d| format!("site:{}", d))
                .collect::<Vec<_>>()
                .join(" OR "),
        )
    }
}
