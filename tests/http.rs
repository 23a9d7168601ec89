//! HTTP-level tests: scraping against an in-process mock site, and the
//! JSON API served by `kancha::server::app`.

use async_trait::async_trait;
use axum::{
    extract::Query,
    http::StatusCode,
    response::Html,
    routing::get,
    Router,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use kancha::classifier::ScriptClassifier;
use kancha::config::{FaqConfig, RetrievalConfig, SanitizerConfig};
use kancha::embedding::{EmbeddingProvider, HashProvider};
use kancha::faq::{build_corpus, FaqSeed};
use kancha::faq::FaqIndex;
use kancha::governor::RateGovernor;
use kancha::model::{ModelClient, ModelError, ModelRequest};
use kancha::models::ScriptTag;
use kancha::retrieval::providers::{HttpSearchProvider, SearchProvider, Site};
use kancha::retrieval::query::QueryPlanner;
use kancha::retrieval::RetrievalGateway;
use kancha::router::QueryRouter;
use kancha::sanitizer::ResponseSanitizer;

const DDG_PAGE: &str = r#"<!DOCTYPE html>
<html><body>
<div class="result results_links web-result">
  <h2 class="result__title"><a class="result__a" href="x">Best momo in Kathmandu &ndash; 2026 guide</a></h2>
  <a class="result__snippet" href="x">Updated 3 Jan 2026. Jhol momo, C-momo and kothey momo spots ranked by locals.</a>
</div>
<div class="result results_links web-result">
  <h2 class="result__title"><a class="result__a" href="x">Momo - Wikipedia</a></h2>
  <a class="result__snippet" href="x">From Wikipedia, the free encyclopedia: en.wikipedia.org/wiki/Momo_(food)</a>
</div>
</body></html>"#;

async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// A fake search site: `/ddg` serves results, `/broken` fails, `/empty` has none.
async fn spawn_search_site(seen: Arc<Mutex<Vec<HashMap<String, String>>>>) -> SocketAddr {
    let app = Router::new()
        .route(
            "/ddg",
            get(move |Query(params): Query<HashMap<String, String>>| {
                let seen = seen.clone();
                async move {
                    seen.lock().unwrap().push(params);
                    Html(DDG_PAGE)
                }
            }),
        )
        .route(
            "/broken",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded") }),
        )
        .route("/empty", get(|| async { Html("<html><body>No results.</body></html>") }));
    spawn(app).await
}

fn provider(site: Site, addr: SocketAddr, path: &str) -> Arc<dyn SearchProvider> {
    let config = RetrievalConfig::default();
    Arc::new(HttpSearchProvider::with_endpoint(site, format!("http://{}{}", addr, path), &config).unwrap())
}

#[tokio::test]
async fn test_cascade_skips_failing_and_empty_sites() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let addr = spawn_search_site(seen.clone()).await;

    let gateway = RetrievalGateway::new(
        vec![
            provider(Site::Google, addr, "/broken"),
            provider(Site::Google, addr, "/empty"),
            provider(Site::DuckDuckGo, addr, "/ddg"),
        ],
        Vec::new(),
        Vec::new(),
        QueryPlanner::new("Nepal", "नेपाल", vec![".np".to_string()], 2026),
    );

    let results = gateway.search("best momo", 3).await;
    assert_eq!(results.len(), 1, "wikipedia result must be filtered: {:?}", results);
    assert_eq!(results[0].title, "Best momo in Kathmandu – 2026 guide");
    assert_eq!(results[0].date_hint.as_deref(), Some("3 Jan 2026"));
    assert_eq!(results[0].source, "DuckDuckGo");

    let params = seen.lock().unwrap();
    assert_eq!(params.len(), 1);
    assert_eq!(params[0].get("q").map(String::as_str), Some("best momo 2026 Nepal"));
    assert_eq!(params[0].get("kl").map(String::as_str), Some("np-np"));
}

#[tokio::test]
async fn test_unreachable_provider_degrades_to_empty() {
    // Bind then drop to get a port nothing listens on.
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let gateway = RetrievalGateway::new(
        vec![provider(Site::DuckDuckGo, addr, "/ddg")],
        vec![provider(Site::DuckDuckGo, addr, "/ddg")],
        vec![provider(Site::OnlineKhabar, addr, "/search")],
        QueryPlanner::new("Nepal", "नेपाल", Vec::new(), 2026),
    );
    assert!(gateway.search("best momo", 3).await.is_empty());
    assert!(gateway.search("who is the president", 3).await.is_empty());
}

struct EchoModel;

#[async_trait]
impl ModelClient for EchoModel {
    fn name(&self) -> &str {
        "echo"
    }
    async fn complete(&self, _request: &ModelRequest) -> Result<String, ModelError> {
        Ok("See https://example.com for details.".to_string())
    }
}

async fn spawn_api() -> SocketAddr {
    let embedder = Arc::new(HashProvider::new(64));
    let mut answers = std::collections::BTreeMap::new();
    answers.insert(ScriptTag::Latin, "Kancha AI is a bilingual assistant.".to_string());
    let seeds = vec![FaqSeed {
        question: "what is kancha ai".to_string(),
        answers,
    }];
    let corpus = build_corpus(seeds, embedder.as_ref()).await.unwrap();
    let faq = FaqIndex::from_corpus(corpus, embedder.as_ref(), &FaqConfig::default()).unwrap();

    let router = QueryRouter::new(
        ScriptClassifier::default(),
        Arc::new(RateGovernor::new(3).unwrap()),
        Arc::new(EchoModel),
        ResponseSanitizer::new(&SanitizerConfig::default()).unwrap(),
    )
    .with_faq(faq, embedder as Arc<dyn EmbeddingProvider>);

    spawn(kancha::server::app(Arc::new(router))).await
}

#[tokio::test]
async fn test_api_ask_routes_and_reports_governor() {
    let addr = spawn_api().await;
    let client = reqwest::Client::new();

    let faq: serde_json::Value = client
        .post(format!("http://{}/ask", addr))
        .json(&serde_json::json!({ "query": "What is Kancha AI?" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(faq["source"]["kind"], "faq");
    assert_eq!(faq["register"], "en");

    let model: serde_json::Value = client
        .post(format!("http://{}/ask", addr))
        .json(&serde_json::json!({ "query": "tell me a joke" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(model["source"]["kind"], "model");
    assert_eq!(model["text"], "See (search online for this) for details.");

    let governor: serde_json::Value = client
        .get(format!("http://{}/governor", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(governor["calls_per_minute"], 3);
    assert_eq!(governor["in_window"], 1);
    assert_eq!(governor["remaining"], 2);
}

#[tokio::test]
async fn test_api_rejects_empty_query() {
    let addr = spawn_api().await;
    let resp = reqwest::Client::new()
        .post(format!("http://{}/ask", addr))
        .json(&serde_json::json!({ "query": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_api_health() {
    let addr = spawn_api().await;
    let body: serde_json::Value = reqwest::get(format!("http://{}/health", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["halted"], false);
}
