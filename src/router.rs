//! Request orchestration.
//!
//! ```text
//! RECEIVED ─▶ CLASSIFIED ─┬─▶ FAQ hit ─────────────────────────────────────────▶ DONE
//!                         └─▶ FAQ miss ─▶ retrieval check ─┬─▶ search ─┐
//!                                                          └─▶ skip ───┴─▶ admit ─▶ model ─▶ sanitize ─▶ DONE
//! ```
//!
//! The FAQ stage never touches the [`RateGovernor`]. Model faults become a
//! message in the register the classifier assigned; [`QueryRouter::answer`]
//! always returns something displayable. A configuration fault (missing or
//! rejected credential) halts the router: later requests get the same
//! message without a model call.

use anyhow::Result;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::classifier::ScriptClassifier;
use crate::config::Config;
use crate::embedding::{create_provider, DisabledProvider, EmbeddingProvider};
use crate::faq::FaqIndex;
use crate::governor::RateGovernor;
use crate::model::{create_client, FaultCategory, ModelClient, ModelError, ModelRequest};
use crate::models::{ScriptTag, SearchResult};
use crate::retrieval::{format_context, RetrievalGateway};
use crate::sanitizer::ResponseSanitizer;

/// Where an answer came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnswerSource {
    Faq { question: String, score: f32 },
    Model,
    Fault { category: FaultCategory },
}

/// The result of routing one query.
#[derive(Debug, Clone, Serialize)]
pub struct RouteOutcome {
    pub text: String,
    pub register: ScriptTag,
    pub source: AnswerSource,
    /// `None` when retrieval was skipped; `Some(vec![])` when it ran and
    /// found nothing.
    pub retrieval: Option<Vec<SearchResult>>,
}

pub struct QueryRouter {
    classifier: ScriptClassifier,
    faq: FaqIndex,
    embedder: Arc<dyn EmbeddingProvider>,
    gateway: Option<RetrievalGateway>,
    max_results: usize,
    governor: Arc<RateGovernor>,
    model: Arc<dyn ModelClient>,
    model_timeout: Duration,
    sanitizer: ResponseSanitizer,
    halted: AtomicBool,
}

impl QueryRouter {
    pub fn new(
        classifier: ScriptClassifier,
        governor: Arc<RateGovernor>,
        model: Arc<dyn ModelClient>,
        sanitizer: ResponseSanitizer,
    ) -> Self {
        Self {
            classifier,
            faq: FaqIndex::empty(),
            embedder: Arc::new(DisabledProvider),
            gateway: None,
            max_results: 3,
            governor,
            model,
            model_timeout: Duration::from_secs(30),
            sanitizer,
            halted: AtomicBool::new(false),
        }
    }

    pub fn with_faq(mut self, faq: FaqIndex, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.faq = faq;
        self.embedder = embedder;
        self
    }

    pub fn with_retrieval(mut self, gateway: RetrievalGateway, max_results: usize) -> Self {
        self.gateway = Some(gateway);
        self.max_results = max_results;
        self
    }

    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    /// Assemble the full pipeline from configuration.
    ///
    /// A model client that cannot be built for lack of credentials does not
    /// fail startup; the router starts halted so FAQ answers still work.
    pub fn from_config(config: &Config) -> Result<Self> {
        let embedder: Arc<dyn EmbeddingProvider> = Arc::from(create_provider(&config.embedding)?);
        let faq = match &config.faq.corpus {
            Some(path) => FaqIndex::load(path, embedder.as_ref(), &config.faq)?,
            None => FaqIndex::empty(),
        };
        let governor = Arc::new(RateGovernor::from_config(&config.governor)?);
        let sanitizer = ResponseSanitizer::new(&config.sanitizer)?;

        let (model, halted): (Arc<dyn ModelClient>, bool) = match create_client(&config.model) {
            Ok(client) => (Arc::from(client), false),
            Err(e) => {
                warn!("Model unavailable, only FAQ answers will be served: {}", e);
                (Arc::new(UnconfiguredModel(e.to_string())), true)
            }
        };

        let mut router = Self::new(
            ScriptClassifier::new(&config.classifier),
            governor,
            model,
            sanitizer,
        )
        .with_faq(faq, embedder)
        .with_model_timeout(Duration::from_secs(config.model.timeout_secs));

        if config.retrieval.enabled {
            router = router.with_retrieval(
                RetrievalGateway::from_config(&config.retrieval)?,
                config.retrieval.max_results,
            );
        }
        router.halted = AtomicBool::new(halted);
        Ok(router)
    }

    pub fn governor(&self) -> &RateGovernor {
        &self.governor
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Route one query to an answer.
    pub async fn answer(&self, query: &str) -> RouteOutcome {
        let register = self.classifier.classify(query);
        debug!(register = %register, "query classified");

        if let Some(hit) = self.faq.lookup(self.embedder.as_ref(), query, register).await {
            info!(score = hit.score, question = %hit.question, "answered from FAQ");
            return RouteOutcome {
                text: hit.answer,
                register,
                source: AnswerSource::Faq {
                    question: hit.question,
                    score: hit.score,
                },
                retrieval: None,
            };
        }

        if self.is_halted() {
            return fault_outcome(FaultCategory::Configuration, register, None);
        }

        let retrieval = match &self.gateway {
            Some(gateway) if gateway.needs_retrieval(query) => {
                Some(gateway.search(query, self.max_results).await)
            }
            _ => None,
        };

        let prompt = compose_prompt(query, register, retrieval.as_deref());

        self.governor.admit().await;
        let request = ModelRequest {
            prompt,
            timeout: self.model_timeout,
        };
        let result = match tokio::time::timeout(self.model_timeout, self.model.complete(&request)).await {
            Ok(result) => result,
            Err(_) => Err(ModelError::Timeout(self.model_timeout)),
        };

        match result {
            Ok(raw) => RouteOutcome {
                text: self.sanitizer.sanitize(&raw, register),
                register,
                source: AnswerSource::Model,
                retrieval,
            },
            Err(e) => {
                let category = e.category();
                if category == FaultCategory::Configuration {
                    self.halted.store(true, Ordering::SeqCst);
                }
                warn!(model = self.model.name(), category = ?category, "model call failed: {}", e);
                fault_outcome(category, register, retrieval)
            }
        }
    }
}

fn fault_outcome(
    category: FaultCategory,
    register: ScriptTag,
    retrieval: Option<Vec<SearchResult>>,
) -> RouteOutcome {
    RouteOutcome {
        text: fault_message(category, register).to_string(),
        register,
        source: AnswerSource::Fault { category },
        retrieval,
    }
}

/// Stand-in used when no model client could be built.
struct UnconfiguredModel(String);

#[async_trait::async_trait]
impl ModelClient for UnconfiguredModel {
    fn name(&self) -> &str {
        "unconfigured"
    }

    async fn complete(&self, _request: &ModelRequest) -> Result<String, ModelError> {
        Err(ModelError::Configuration(self.0.clone()))
    }
}

/// Language instruction prepended to every model prompt.
pub fn register_instruction(register: ScriptTag) -> &'static str {
    match register {
        ScriptTag::Native => {
            "The user wrote in Nepali (Devanagari script). Reply only in Nepali using Devanagari script."
        }
        ScriptTag::Romanized => {
            "The user wrote in Romanized Nepali (Nepali with English letters). Reply in Romanized Nepali in the same casual style; do not switch to Devanagari or English."
        }
        ScriptTag::Latin => "The user wrote in English. Reply in English.",
    }
}

/// Build the prompt sent to the model.
pub fn compose_prompt(query: &str, register: ScriptTag, retrieval: Option<&[SearchResult]>) -> String {
    let mut prompt = String::new();
    prompt.push_str("You are Kancha AI, a helpful assistant for people in Nepal.\n");
    prompt.push_str(register_instruction(register));
    prompt.push_str("\nNever include URLs or links in your answer.\n\n");
    if let Some(results) = retrieval {
        prompt.push_str(&format_context(query, results, chrono::Local::now()));
        prompt.push('\n');
    }
    prompt.push_str("User: ");
    prompt.push_str(query.trim());
    prompt.push('\n');
    prompt
}

/// The message shown for a failed model call.
pub fn fault_message(category: FaultCategory, register: ScriptTag) -> &'static str {
    use FaultCategory::*;
    use ScriptTag::*;
    match (category, register) {
        (Quota, Latin) => "Too many requests right now. Please wait a minute and try again.",
        (Quota, Native) => "अहिले धेरै अनुरोधहरू आएका छन्। कृपया एक मिनेट पर्खेर फेरि प्रयास गर्नुहोस्।",
        (Quota, Romanized) => "Ahile dherai request aayo. Ek minute parkhera feri try garnus.",
        (Timeout, Latin) => "The answer took too long. Please try a shorter message.",
        (Timeout, Native) => "जवाफ आउन धेरै समय लाग्यो। कृपया छोटो सन्देश पठाउनुहोस्।",
        (Timeout, Romanized) => "Jawaf aauna dherai time lagyo. Ali chhoto message pathaunus.",
        (Transport, Latin) => "Could not reach the assistant. Please check your connection and try again.",
        (Transport, Native) => "सहायकसँग जडान हुन सकेन। कृपया इन्टरनेट जाँच गरेर फेरि प्रयास गर्नुहोस्।",
        (Transport, Romanized) => "Assistant sanga connect huna sakena. Internet check garera feri try garnus.",
        (Configuration, Latin) => "The assistant is not configured correctly. Please contact the administrator.",
        (Configuration, Native) => "सहायक सही रूपमा सेटअप गरिएको छैन। कृपया प्रशासकलाई सम्पर्क गर्नुहोस्।",
        (Configuration, Romanized) => "Assistant thik sanga setup gariyeko chaina. Admin lai contact garnus.",
        (Upstream, Latin) => "Something went wrong while answering. Please try again.",
        (Upstream, Native) => "जवाफ दिँदा समस्या आयो। कृपया फेरि प्रयास गर्नुहोस्।",
        (Upstream, Romanized) => "Jawaf dina samasya aayo. Feri try garnus.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SanitizerConfig;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    struct ScriptedModel {
        replies: Mutex<Vec<Result<String, ModelError>>>,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<Result<String, ModelError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ModelClient for ScriptedModel {
        fn name(&self) -> &str {
            "scripted"
        }
        async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(request.prompt.clone());
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                Ok("ok".to_string())
            } else {
                replies.remove(0)
            }
        }
    }

    fn router(model: Arc<ScriptedModel>) -> QueryRouter {
        QueryRouter::new(
            ScriptClassifier::default(),
            Arc::new(RateGovernor::new(5).unwrap()),
            model,
            ResponseSanitizer::new(&SanitizerConfig::default()).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_model_answer_is_sanitized_in_register() {
        let model = ScriptedModel::new(vec![Ok("Hera https://youtu.be/x".to_string())]);
        let r = router(model.clone());
        let out = r.answer("timro naam k ho?").await;
        assert_eq!(out.register, ScriptTag::Romanized);
        assert_eq!(out.source, AnswerSource::Model);
        assert_eq!(out.text, "Hera (yo video YouTube ma khojnuhos)");
        assert_eq!(r.governor().in_window(), 1);
        assert!(model.prompts.lock().unwrap()[0].contains("Romanized Nepali"));
    }

    #[tokio::test]
    async fn test_quota_fault_maps_to_register_message() {
        let model = ScriptedModel::new(vec![Err(ModelError::Quota("429".to_string()))]);
        let r = router(model);
        let out = r.answer("नमस्ते, तपाईं को हुनुहुन्छ?").await;
        assert_eq!(out.register, ScriptTag::Native);
        assert_eq!(
            out.source,
            AnswerSource::Fault {
                category: FaultCategory::Quota
            }
        );
        assert_eq!(out.text, fault_message(FaultCategory::Quota, ScriptTag::Native));
        assert!(!r.is_halted());
    }

    #[tokio::test]
    async fn test_configuration_fault_halts_router() {
        let model = ScriptedModel::new(vec![Err(ModelError::Configuration("bad key".to_string()))]);
        let r = router(model.clone());
        let first = r.answer("hello").await;
        assert_eq!(
            first.source,
            AnswerSource::Fault {
                category: FaultCategory::Configuration
            }
        );
        assert!(r.is_halted());

        let second = r.answer("hello again").await;
        assert_eq!(second.source, first.source);
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
        assert_eq!(r.governor().in_window(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_model_timeout_is_recoverable() {
        struct Stuck;
        #[async_trait]
        impl ModelClient for Stuck {
            fn name(&self) -> &str {
                "stuck"
            }
            async fn complete(&self, _request: &ModelRequest) -> Result<String, ModelError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(String::new())
            }
        }
        let r = QueryRouter::new(
            ScriptClassifier::default(),
            Arc::new(RateGovernor::new(5).unwrap()),
            Arc::new(Stuck),
            ResponseSanitizer::new(&SanitizerConfig::default()).unwrap(),
        )
        .with_model_timeout(Duration::from_secs(30));
        let out = r.answer("explain photosynthesis").await;
        assert_eq!(
            out.source,
            AnswerSource::Fault {
                category: FaultCategory::Timeout
            }
        );
        assert!(!r.is_halted());
    }

    #[test]
    fn test_prompt_carries_register_and_context() {
        let results = vec![SearchResult {
            title: "PM sworn in".to_string(),
            snippet: "Oath at Sheetal Niwas".to_string(),
            source: "DuckDuckGo".to_string(),
            date_hint: None,
        }];
        let prompt = compose_prompt("who is pm", ScriptTag::Latin, Some(&results));
        assert!(prompt.contains("Reply in English"));
        assert!(prompt.contains("RESULT #1: PM sworn in"));
        assert!(prompt.ends_with("User: who is pm\n"));

        let bare = compose_prompt("hi", ScriptTag::Native, None);
        assert!(!bare.contains("CURRENT WEB SEARCH RESULTS"));
        assert!(bare.contains("Devanagari"));
    }

    #[test]
    fn test_fault_messages_contain_no_links() {
        for category in [
            FaultCategory::Quota,
            FaultCategory::Timeout,
            FaultCategory::Transport,
            FaultCategory::Configuration,
            FaultCategory::Upstream,
        ] {
            for register in ScriptTag::ALL {
                let msg = fault_message(category, register);
                assert!(!msg.is_empty());
                assert!(!msg.contains("http"));
            }
        }
    }

    #[test]
    fn test_outcome_serializes_with_tagged_source() {
        let outcome = fault_outcome(FaultCategory::Timeout, ScriptTag::Latin, None);
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["register"], "en");
        assert_eq!(json["source"]["kind"], "fault");
        assert_eq!(json["source"]["category"], "timeout");
        assert!(json["retrieval"].is_null());
    }
}
