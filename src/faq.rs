//! Semantic FAQ matcher.
//!
//! A small, read-only corpus of canonical questions with precomputed
//! embeddings and per-register answers. A query is embedded with the same
//! provider that built the corpus and compared against every entry by
//! cosine similarity; the best entry answers only if its score reaches the
//! configured threshold.
//!
//! # Corpus format
//!
//! ```json
//! {
//!   "model": "feature-hash-256",
//!   "dims": 256,
//!   "entries": [
//!     { "question": "what is kancha ai",
//!       "embedding": [0.01, ...],
//!       "answers": { "en": "...", "ne": "...", "np": "..." } }
//!   ]
//! }
//! ```
//!
//! The corpus is produced offline by [`build_corpus`] (`kancha faq build`)
//! from a seed file holding only questions and answers.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::FaqConfig;
use crate::embedding::{cosine_similarity, embed_query, EmbeddingProvider};
use crate::models::{FaqEntry, ScriptTag};

/// Persisted corpus: entries plus the embedding model that produced them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaqCorpus {
    pub model: String,
    pub dims: usize,
    pub entries: Vec<FaqEntry>,
}

/// A seed entry: question and answers, no embedding yet.
#[derive(Debug, Clone, Deserialize)]
pub struct FaqSeed {
    pub question: String,
    pub answers: BTreeMap<ScriptTag, String>,
}

/// A successful lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaqMatch {
    pub question: String,
    pub answer: String,
    pub score: f32,
}

pub struct FaqIndex {
    entries: Vec<FaqEntry>,
    threshold: f32,
    default_register: ScriptTag,
}

impl FaqIndex {
    pub fn new(entries: Vec<FaqEntry>, threshold: f32, default_register: ScriptTag) -> Self {
        Self {
            entries,
            threshold,
            default_register,
        }
    }

    /// An index that never matches.
    pub fn empty() -> Self {
        Self::new(Vec::new(), 1.0, ScriptTag::Latin)
    }

    /// Load a persisted corpus and check it was built by `provider`.
    pub fn load(path: &Path, provider: &dyn EmbeddingProvider, config: &FaqConfig) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read FAQ corpus: {}", path.display()))?;
        let corpus: FaqCorpus = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse FAQ corpus: {}", path.display()))?;
        let index = Self::from_corpus(corpus, provider, config)?;
        info!(entries = index.len(), path = %path.display(), "FAQ corpus loaded");
        Ok(index)
    }

    /// Validate a corpus against the query-time provider.
    ///
    /// The model name and dimensionality must match exactly; a corpus built
    /// with a different embedder would produce meaningless similarities.
    pub fn from_corpus(
        corpus: FaqCorpus,
        provider: &dyn EmbeddingProvider,
        config: &FaqConfig,
    ) -> Result<Self> {
        if corpus.model != provider.model_name() {
            bail!(
                "FAQ corpus was built with embedding model '{}' but the configured model is '{}'. \
                 Rebuild it with `kancha faq build`.",
                corpus.model,
                provider.model_name()
            );
        }
        if corpus.dims != provider.dims() {
            bail!(
                "FAQ corpus has {} dims but the embedding provider produces {}",
                corpus.dims,
                provider.dims()
            );
        }
        for entry in &corpus.entries {
            if entry.embedding.len() != corpus.dims {
                bail!(
                    "FAQ entry '{}' has {} dims, corpus declares {}",
                    entry.question,
                    entry.embedding.len(),
                    corpus.dims
                );
            }
        }

        Ok(Self::new(
            corpus.entries,
            config.threshold,
            config.default_register,
        ))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Highest-scoring entry regardless of threshold. Ties keep the first
    /// entry in corpus order.
    pub fn best_match(&self, query: &[f32]) -> Option<(&FaqEntry, f32)> {
        let mut best: Option<(&FaqEntry, f32)> = None;
        for entry in &self.entries {
            let score = cosine_similarity(query, &entry.embedding);
            match best {
                Some((_, top)) if score <= top => {}
                _ => best = Some((entry, score)),
            }
        }
        best
    }

    /// Answer for an already-embedded query, if the best score clears the threshold.
    pub fn match_vector(&self, query: &[f32], register: ScriptTag) -> Option<FaqMatch> {
        let (entry, score) = self.best_match(query)?;
        if score < self.threshold {
            debug!(score, threshold = self.threshold, question = %entry.question, "FAQ miss");
            return None;
        }
        let answer = self.answer_for(entry, register)?;
        Some(FaqMatch {
            question: entry.question.clone(),
            answer: answer.to_string(),
            score,
        })
    }

    /// Embed `query` and look it up. Embedding failures count as a miss.
    pub async fn lookup(
        &self,
        provider: &dyn EmbeddingProvider,
        query: &str,
        register: ScriptTag,
    ) -> Option<FaqMatch> {
        if self.entries.is_empty() {
            return None;
        }
        match embed_query(provider, query).await {
            Ok(vector) => self.match_vector(&vector, register),
            Err(e) => {
                warn!("FAQ lookup skipped, query embedding failed: {:#}", e);
                None
            }
        }
    }

    fn answer_for<'a>(&self, entry: &'a FaqEntry, register: ScriptTag) -> Option<&'a str> {
        entry
            .answers
            .get(&register)
            .or_else(|| entry.answers.get(&self.default_register))
            .or_else(|| entry.answers.values().next())
            .map(String::as_str)
    }
}

/// Read a seed file: a JSON array of `{question, answers}`.
pub fn load_seed(path: &Path) -> Result<Vec<FaqSeed>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read FAQ seed: {}", path.display()))?;
    let seeds: Vec<FaqSeed> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse FAQ seed: {}", path.display()))?;
    Ok(seeds)
}

/// Embed every seed question and assemble a corpus.
pub async fn build_corpus(seeds: Vec<FaqSeed>, provider: &dyn EmbeddingProvider) -> Result<FaqCorpus> {
    let questions: Vec<String> = seeds.iter().map(|s| s.question.clone()).collect();
    let vectors = if questions.is_empty() {
        Vec::new()
    } else {
        provider.embed(&questions).await?
    };
    if vectors.len() != seeds.len() {
        bail!(
            "Embedding provider returned {} vectors for {} questions",
            vectors.len(),
            seeds.len()
        );
    }

    let mut entries = Vec::with_capacity(seeds.len());
    for (seed, embedding) in seeds.into_iter().zip(vectors) {
        if embedding.len() != provider.dims() {
            bail!(
                "Embedding for '{}' has {} dims, expected {}",
                seed.question,
                embedding.len(),
                provider.dims()
            );
        }
        if seed.answers.is_empty() {
            bail!("FAQ '{}' has no answers", seed.question);
        }
        entries.push(FaqEntry {
            question: seed.question,
            embedding,
            answers: seed.answers,
        });
    }

    Ok(FaqCorpus {
        model: provider.model_name().to_string(),
        dims: provider.dims(),
        entries,
    })
}

pub fn save_corpus(path: &Path, corpus: &FaqCorpus) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }
    let json = serde_json::to_string_pretty(corpus)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write FAQ corpus: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashProvider;

    fn answers(en: &str, ne: Option<&str>) -> BTreeMap<ScriptTag, String> {
        let mut map = BTreeMap::new();
        map.insert(ScriptTag::Latin, en.to_string());
        if let Some(ne) = ne {
            map.insert(ScriptTag::Native, ne.to_string());
        }
        map
    }

    fn entry(question: &str, embedding: Vec<f32>) -> FaqEntry {
        FaqEntry {
            question: question.to_string(),
            embedding,
            answers: answers(&format!("answer to {}", question), None),
        }
    }

    fn faq_config(threshold: f32) -> FaqConfig {
        FaqConfig {
            corpus: None,
            threshold,
            default_register: ScriptTag::Latin,
        }
    }

    #[test]
    fn test_empty_index_never_matches() {
        let index = FaqIndex::new(Vec::new(), 0.0, ScriptTag::Latin);
        assert!(index.match_vector(&[1.0, 0.0], ScriptTag::Latin).is_none());
        assert!(FaqIndex::empty().is_empty());
    }

    #[test]
    fn test_below_threshold_returns_none() {
        let index = FaqIndex::new(vec![entry("a", vec![1.0, 0.0])], 0.7, ScriptTag::Latin);
        // cos = 0.6
        assert!(index.match_vector(&[0.6, 0.8], ScriptTag::Latin).is_none());
        let hit = index.match_vector(&[0.8, 0.6], ScriptTag::Latin).unwrap();
        assert!((hit.score - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_ties_return_first_entry() {
        let index = FaqIndex::new(
            vec![entry("first", vec![1.0, 0.0]), entry("second", vec![1.0, 0.0])],
            0.5,
            ScriptTag::Latin,
        );
        let hit = index.match_vector(&[1.0, 0.0], ScriptTag::Latin).unwrap();
        assert_eq!(hit.question, "first");
    }

    #[test]
    fn test_register_falls_back_to_default() {
        let index = FaqIndex::new(
            vec![FaqEntry {
                question: "q".to_string(),
                embedding: vec![1.0, 0.0],
                answers: answers("english", Some("नेपाली")),
            }],
            0.5,
            ScriptTag::Latin,
        );
        let native = index.match_vector(&[1.0, 0.0], ScriptTag::Native).unwrap();
        assert_eq!(native.answer, "नेपाली");
        let romanized = index.match_vector(&[1.0, 0.0], ScriptTag::Romanized).unwrap();
        assert_eq!(romanized.answer, "english");
    }

    #[test]
    fn test_raising_threshold_never_adds_hits() {
        let entries = vec![
            entry("x", vec![1.0, 0.0, 0.0]),
            entry("y", vec![0.0, 1.0, 0.0]),
            entry("z", vec![0.5, 0.5, 0.7]),
        ];
        let queries: Vec<Vec<f32>> = vec![
            vec![1.0, 0.1, 0.0],
            vec![0.3, 0.3, 0.3],
            vec![0.0, 0.9, 0.4],
            vec![0.2, -1.0, 0.1],
            vec![0.6, 0.5, 0.6],
        ];
        let thresholds = [-1.0, 0.0, 0.3, 0.5, 0.65, 0.7, 0.9, 0.99, 1.0];

        let mut previous: Option<Vec<bool>> = None;
        for t in thresholds {
            let index = FaqIndex::new(entries.clone(), t, ScriptTag::Latin);
            let hits: Vec<bool> = queries
                .iter()
                .map(|q| index.match_vector(q, ScriptTag::Latin).is_some())
                .collect();
            if let Some(prev) = &previous {
                for (before, after) in prev.iter().zip(&hits) {
                    assert!(!after || *before, "threshold {} added a hit", t);
                }
            }
            previous = Some(hits);
        }
    }

    #[tokio::test]
    async fn test_build_then_lookup_verbatim_question() {
        let provider = HashProvider::new(128);
        let seeds = vec![
            FaqSeed {
                question: "what is kancha ai".to_string(),
                answers: answers("Kancha AI is a bilingual assistant.", None),
            },
            FaqSeed {
                question: "dashain".to_string(),
                answers: answers("Dashain is Nepal's biggest festival.", None),
            },
        ];
        let corpus = build_corpus(seeds, &provider).await.unwrap();
        assert_eq!(corpus.dims, 128);
        let index = FaqIndex::from_corpus(corpus, &provider, &faq_config(0.68)).unwrap();

        let hit = index
            .lookup(&provider, "What is Kancha AI?", ScriptTag::Latin)
            .await
            .unwrap();
        assert_eq!(hit.answer, "Kancha AI is a bilingual assistant.");
        assert!(index
            .lookup(&provider, "how do I renew a passport", ScriptTag::Latin)
            .await
            .is_none());
    }

    #[test]
    fn test_corpus_from_other_model_is_rejected() {
        let corpus = FaqCorpus {
            model: "all-minilm-l6-v2".to_string(),
            dims: 384,
            entries: Vec::new(),
        };
        let err = FaqIndex::from_corpus(corpus, &HashProvider::new(384), &faq_config(0.7))
            .err()
            .unwrap();
        assert!(err.to_string().contains("all-minilm-l6-v2"));
    }

    #[test]
    fn test_corpus_with_short_vector_is_rejected() {
        let provider = HashProvider::new(4);
        let corpus = FaqCorpus {
            model: provider.model_name().to_string(),
            dims: 4,
            entries: vec![entry("short", vec![1.0, 0.0])],
        };
        assert!(FaqIndex::from_corpus(corpus, &provider, &faq_config(0.7)).is_err());
    }

    #[tokio::test]
    async fn test_save_and_load_corpus() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("faq").join("corpus.json");
        let provider = HashProvider::new(32);
        let corpus = build_corpus(
            vec![FaqSeed {
                question: "who made you".to_string(),
                answers: answers("A community project.", None),
            }],
            &provider,
        )
        .await
        .unwrap();
        save_corpus(&path, &corpus).unwrap();

        let index = FaqIndex::load(&path, &provider, &faq_config(0.7)).unwrap();
        assert_eq!(index.len(), 1);
    }
}
