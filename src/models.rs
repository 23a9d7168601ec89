//! Core data models used throughout the pipeline.
//!
//! These types represent the register tags, FAQ entries, search results,
//! and sanitization rules that flow between the routing stages.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The linguistic register a query is written in, and therefore the one
/// the answer must be given in.
///
/// Serialized with the short codes used by the persisted FAQ corpus:
/// `en` (Latin/English), `ne` (Devanagari Nepali), `np` (Romanized Nepali).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScriptTag {
    #[serde(rename = "ne")]
    Native,
    #[serde(rename = "np")]
    Romanized,
    #[serde(rename = "en")]
    Latin,
}

impl ScriptTag {
    pub const ALL: [ScriptTag; 3] = [ScriptTag::Native, ScriptTag::Romanized, ScriptTag::Latin];

    /// Short register code (`ne`, `np`, `en`).
    pub fn code(self) -> &'static str {
        match self {
            ScriptTag::Native => "ne",
            ScriptTag::Romanized => "np",
            ScriptTag::Latin => "en",
        }
    }
}

impl fmt::Display for ScriptTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for ScriptTag {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ne" | "native" | "devanagari" => Ok(ScriptTag::Native),
            "np" | "romanized" | "nepglish" => Ok(ScriptTag::Romanized),
            "en" | "latin" | "english" => Ok(ScriptTag::Latin),
            other => anyhow::bail!("Unknown register: '{}'. Use en, ne, or np.", other),
        }
    }
}

/// A question/answer pair of the FAQ corpus with its precomputed embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaqEntry {
    pub question: String,
    pub embedding: Vec<f32>,
    pub answers: BTreeMap<ScriptTag, String>,
}

/// A single web search hit, produced per request and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub title: String,
    pub snippet: String,
    /// Display name of the provider or news site that produced the hit.
    pub source: String,
    /// Publication date found in the snippet, if any.
    pub date_hint: Option<String>,
}

/// How a [`SanitizationRule`] rewrites a match.
#[derive(Debug, Clone)]
pub enum Replacement {
    /// Regex replacement template (`$1` etc. are expanded).
    Template(String),
    /// A search instruction in the caller's register replaces the whole match.
    Notice(NoticeKind),
    /// Capture group 1 (a link label) followed by the register's instruction.
    LabelledNotice(NoticeKind),
}

/// Which search instruction replaces a removed link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Video,
    Link,
}

/// A compiled pattern and its replacement, applied to every model response.
#[derive(Debug, Clone)]
pub struct SanitizationRule {
    pub name: String,
    pub pattern: Regex,
    pub replacement: Replacement,
}
