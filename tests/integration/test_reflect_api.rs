//! End-to-end tests for the reflection HTTP API.
//!
//! Each test starts the real router on an ephemeral port and talks to it
//! with `reqwest`. The text generator is scripted, so no network access or
//! API key is needed.

use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reflect_orchestrator::{
    create_router, AppState, CompletionRequest, Config, LlmErrorKind, ReflectError,
    ReflectionOrchestrator, ReflectionRun, Result, Step, TextGenerator,
};
use reflect_report::{ConsoleSummary, IterationEntry, ReportStatus, RunReport};
use serde_json::{json, Value};

/// Finds an available port by binding to port 0.
fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to port")
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

/// Generator that answers every critique with the same text.
struct FixedCritique {
    critique: &'static str,
    calls: AtomicUsize,
    fail_with: Option<LlmErrorKind>,
}

impl FixedCritique {
    fn new(critique: &'static str) -> Self {
        Self {
            critique,
            calls: AtomicUsize::new(0),
            fail_with: None,
        }
    }

    fn failing(kind: LlmErrorKind) -> Self {
        Self {
            fail_with: Some(kind),
            ..Self::new("")
        }
    }
}

#[async_trait]
impl TextGenerator for FixedCritique {
    async fn generate(&self, request: &CompletionRequest) -> Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(kind) = self.fail_with {
            return Err(ReflectError::llm_api_error(kind, "collaborator unavailable"));
        }
        Ok(match request.step {
            Step::Generate | Step::Refine => format!("Phrase from call {n}"),
            Step::Critique => self.critique.to_string(),
        })
    }

    fn model(&self) -> &str {
        "fixed"
    }
}

/// Spawns the router and returns its base URL.
async fn spawn_test_server(
    generator: Arc<FixedCritique>,
    config: Config,
) -> (String, tokio::task::JoinHandle<()>) {
    let port = find_available_port();
    let addr = format!("127.0.0.1:{port}");

    let orchestrator =
        ReflectionOrchestrator::from_config(generator, &config).expect("orchestrator");
    let router = create_router(AppState::new(orchestrator, config));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    // Give the server a moment to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    (format!("http://{addr}"), handle)
}

fn test_config() -> Config {
    Config {
        max_retries: 0,
        ..Config::default()
    }
}

#[tokio::test]
async fn test_reflect_runs_full_budget_for_low_scores() {
    let generator = Arc::new(FixedCritique::new("Vague and generic."));
    let (base, handle) = spawn_test_server(Arc::clone(&generator), test_config()).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/reflect"))
        .json(&json!({ "theme": "perseverance" }))
        .send()
        .await
        .expect("request failed");

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let run: ReflectionRun = response.json().await.expect("invalid body");

    assert_eq!(run.total_iterations, 3);
    assert!(!run.stopped_early);
    assert_eq!(run.iterations.len(), 3);
    assert_eq!(run.final_response, run.iterations[2].response);
    assert!(run.iterations.iter().all(|i| i.quality_score < 0.8));
    // generate + critique, then (refine + critique) twice
    assert_eq!(generator.calls.load(Ordering::SeqCst), 6);

    handle.abort();
}

#[tokio::test]
async fn test_reflect_stops_early_for_high_score() {
    let generator = Arc::new(FixedCritique::new(
        "Strengths: inspiring, uplifting and memorable.",
    ));
    let (base, handle) = spawn_test_server(Arc::clone(&generator), test_config()).await;

    let body: Value = reqwest::Client::new()
        .post(format!("{base}/api/reflect"))
        .json(&json!({ "theme": "courage" }))
        .send()
        .await
        .expect("request failed")
        .json()
        .await
        .expect("invalid body");

    assert_eq!(body["totalIterations"], 1);
    assert_eq!(body["stoppedEarly"], true);
    assert_eq!(body["finalResponse"], "Phrase from call 1");
    assert_eq!(body["iterations"][0]["qualityScore"], 1.0);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 2);

    handle.abort();
}

#[tokio::test]
async fn test_reflect_without_theme_is_rejected() {
    let generator = Arc::new(FixedCritique::new("Good."));
    let (base, handle) = spawn_test_server(Arc::clone(&generator), test_config()).await;
    let client = reqwest::Client::new();

    for body in [json!({}), json!({ "theme": "" }), json!({ "theme": "  " })] {
        let response = client
            .post(format!("{base}/api/reflect"))
            .json(&body)
            .send()
            .await
            .expect("request failed");

        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let error: Value = response.json().await.expect("invalid body");
        assert_eq!(error, json!({ "error": "Theme is required" }));
    }
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);

    handle.abort();
}

#[tokio::test]
async fn test_reflect_failure_returns_server_error() {
    let generator = Arc::new(FixedCritique::failing(LlmErrorKind::Authentication));
    let (base, handle) = spawn_test_server(Arc::clone(&generator), test_config()).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/reflect"))
        .json(&json!({ "theme": "hope" }))
        .send()
        .await
        .expect("request failed");

    assert_eq!(
        response.status(),
        reqwest::StatusCode::INTERNAL_SERVER_ERROR
    );
    let error: Value = response.json().await.expect("invalid body");
    assert!(error["error"]
        .as_str()
        .is_some_and(|m| m.contains("collaborator unavailable")));
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);

    handle.abort();
}

#[tokio::test]
async fn test_concurrent_requests_are_independent() {
    let generator = Arc::new(FixedCritique::new("Vague."));
    let config = Config {
        max_iterations: 2,
        ..test_config()
    };
    let (base, handle) = spawn_test_server(Arc::clone(&generator), config).await;
    let client = reqwest::Client::new();

    let requests = ["focus", "growth", "kindness", "patience"].map(|theme| {
        let client = client.clone();
        let url = format!("{base}/api/reflect");
        tokio::spawn(async move {
            client
                .post(url)
                .json(&json!({ "theme": theme }))
                .send()
                .await
                .expect("request failed")
                .json::<ReflectionRun>()
                .await
                .expect("invalid body")
        })
    });

    for request in requests {
        let run = request.await.expect("task panicked");
        assert_eq!(run.total_iterations, 2);
        assert_eq!(run.iterations[0].iteration, 1);
        assert_eq!(run.iterations[1].iteration, 2);
    }
    assert_eq!(generator.calls.load(Ordering::SeqCst), 16);

    handle.abort();
}

#[tokio::test]
async fn test_health_and_static_files() {
    let static_dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(static_dir.path().join("index.html"), "<title>Reflection</title>")
        .expect("write index");
    std::fs::write(static_dir.path().join("app.js"), "console.log('hi');").expect("write js");

    let mut config = test_config();
    config.server.static_dir = static_dir.path().display().to_string();
    config.quality_threshold = 0.75;

    let generator = Arc::new(FixedCritique::new("Good."));
    let (base, handle) = spawn_test_server(generator, config).await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{base}/api/health"))
        .send()
        .await
        .expect("request failed")
        .json()
        .await
        .expect("invalid body");
    assert_eq!(
        health,
        json!({ "status": "ok", "model": "fixed", "maxIterations": 3, "qualityThreshold": 0.75 })
    );

    let index = client
        .get(format!("{base}/"))
        .send()
        .await
        .expect("request failed");
    assert_eq!(index.status(), reqwest::StatusCode::OK);
    assert_eq!(index.text().await.expect("body"), "<title>Reflection</title>");

    let script = client
        .get(format!("{base}/app.js"))
        .send()
        .await
        .expect("request failed");
    assert_eq!(script.status(), reqwest::StatusCode::OK);

    let missing = client
        .get(format!("{base}/nope.css"))
        .send()
        .await
        .expect("request failed");
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);
    assert_eq!(missing.text().await.expect("body"), "Not Found");

    handle.abort();
}

#[tokio::test]
async fn test_api_result_feeds_report() {
    let generator = Arc::new(FixedCritique::new("Clear but generic."));
    let (base, handle) = spawn_test_server(generator, test_config()).await;

    let run: ReflectionRun = reqwest::Client::new()
        .post(format!("{base}/api/reflect"))
        .json(&json!({ "theme": "dreams and goals" }))
        .send()
        .await
        .expect("request failed")
        .json()
        .await
        .expect("invalid body");

    let report = RunReport::builder()
        .theme("dreams and goals")
        .model("fixed")
        .settings(3, 0.8)
        .iterations(
            run.iterations
                .iter()
                .map(|i| IterationEntry::new(i.iteration, &i.response, &i.feedback, i.quality_score))
                .collect(),
        )
        .status(ReportStatus::from_stopped_early(run.stopped_early))
        .build()
        .expect("valid report");

    let summary = ConsoleSummary::new(&report).render();
    assert!(summary.contains("Total iterations: 3"));
    assert!(summary.contains("Stopped early: No"));
    // "clear" +0.1, "generic" -0.1
    assert!(summary.contains("Iteration 3: Quality Score = 0.50"));

    handle.abort();
}
