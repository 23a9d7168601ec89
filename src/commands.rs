//! Implementations behind the `kancha` subcommands.
//!
//! Each `run_*` function loads what it needs from [`Config`], does its work,
//! and prints a human-readable report to stdout.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

use crate::classifier::ScriptClassifier;
use crate::config::Config;
use crate::embedding::{create_provider, embed_query};
use crate::faq::{build_corpus, load_seed, save_corpus, FaqIndex};
use crate::models::ScriptTag;
use crate::retrieval::RetrievalGateway;
use crate::router::{AnswerSource, QueryRouter};
use crate::sanitizer::ResponseSanitizer;

/// `kancha ask`: route one query through the full pipeline.
pub async fn run_ask(config: &Config, query: &str, json: bool) -> Result<()> {
    if query.trim().is_empty() {
        bail!("query must not be empty");
    }
    let router = QueryRouter::from_config(config)?;
    let outcome = router.answer(query).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    println!("{}", outcome.text);
    let source = match &outcome.source {
        AnswerSource::Faq { question, score } => format!("faq \"{}\" ({:.3})", question, score),
        AnswerSource::Model => "model".to_string(),
        AnswerSource::Fault { category } => format!("fault ({:?})", category),
    };
    eprintln!(
        "\n[register: {} | source: {} | web results: {}]",
        outcome.register,
        source,
        outcome
            .retrieval
            .as_ref()
            .map(|r| r.len().to_string())
            .unwrap_or_else(|| "skipped".to_string())
    );
    Ok(())
}

/// `kancha classify`: print the register code for `text`.
pub fn run_classify(config: &Config, text: &str) -> Result<()> {
    let classifier = ScriptClassifier::new(&config.classifier);
    println!("{}", classifier.classify(text));
    Ok(())
}

/// `kancha search`: run the retrieval cascade and list what it found.
pub async fn run_search(config: &Config, query: &str, limit: Option<usize>) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }
    let limit = limit.unwrap_or(config.retrieval.max_results);
    if limit == 0 {
        bail!("--limit must be at least 1");
    }

    let gateway = RetrievalGateway::from_config(&config.retrieval)?;
    let needs = gateway.needs_retrieval(query);
    let results = gateway.search(query, limit).await;

    println!("needs retrieval: {}", needs);
    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (i, result) in results.iter().enumerate() {
        println!("{}. {}", i + 1, result.title);
        println!(
            "    source: {}  date: {}",
            result.source,
            result.date_hint.as_deref().unwrap_or("-")
        );
        if !result.snippet.is_empty() {
            println!("    {}", result.snippet);
        }
    }
    Ok(())
}

/// `kancha sanitize`: apply the response rules to `text`.
///
/// Without `register`, the text's own register picks the notice language.
pub fn run_sanitize(config: &Config, text: &str, register: Option<ScriptTag>) -> Result<()> {
    let sanitizer = ResponseSanitizer::new(&config.sanitizer)?;
    let register =
        register.unwrap_or_else(|| ScriptClassifier::new(&config.classifier).classify(text));
    println!("{}", sanitizer.sanitize(text, register));
    Ok(())
}

/// `kancha faq build`: embed a seed file into a corpus.
pub async fn run_faq_build(config: &Config, seed: &Path, out: Option<PathBuf>) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Building a FAQ corpus requires embeddings. Set [embedding] provider in config.");
    }
    let out = match out.or_else(|| config.faq.corpus.clone()) {
        Some(path) => path,
        None => bail!("No output path: pass --out or set [faq] corpus in config."),
    };

    let provider = create_provider(&config.embedding)?;
    let seeds = load_seed(seed)?;
    let corpus = build_corpus(seeds, provider.as_ref()).await?;
    save_corpus(&out, &corpus)?;

    println!("faq build");
    println!("  entries: {}", corpus.entries.len());
    println!("  model: {} ({} dims)", corpus.model, corpus.dims);
    println!("  written: {}", out.display());
    Ok(())
}

/// `kancha faq lookup`: show the best FAQ match and whether it clears the threshold.
pub async fn run_faq_lookup(config: &Config, query: &str) -> Result<()> {
    let Some(corpus) = &config.faq.corpus else {
        bail!("No FAQ corpus configured. Set [faq] corpus in config.");
    };
    let provider = create_provider(&config.embedding)?;
    let index = FaqIndex::load(corpus, provider.as_ref(), &config.faq)?;
    let register = ScriptClassifier::new(&config.classifier).classify(query);

    let vector = embed_query(provider.as_ref(), query)
        .await
        .context("Failed to embed query")?;

    match index.best_match(&vector) {
        None => println!("FAQ corpus is empty."),
        Some((entry, score)) => {
            let hit = score >= index.threshold();
            println!("best: {}", entry.question);
            println!(
                "  score: {:.4}  threshold: {:.2}  {}",
                score,
                index.threshold(),
                if hit { "HIT" } else { "miss" }
            );
            if let Some(answer) = index.match_vector(&vector, register).map(|m| m.answer) {
                println!("  answer ({}): {}", register, answer);
            }
        }
    }
    Ok(())
}
