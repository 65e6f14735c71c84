//! Tests for the OpenAI-compatible client against a local mock endpoint.
//!
//! The mock implements just enough of `/v1/chat/completions` to drive a full
//! reflection run: it answers critique prompts with a canned critique and
//! every other prompt with a numbered phrase.

use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{extract::State, http::HeaderMap, http::StatusCode, routing::post, Json, Router};
use reflect_orchestrator::{
    CompletionRequest, Config, LlmErrorKind, OpenAiClient, ReflectError, ReflectionOrchestrator,
    Step, TextGenerator,
};
use serde_json::{json, Value};

fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to port")
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

#[derive(Default)]
struct MockState {
    critique: String,
    /// Status returned for the first `failures` requests.
    failure_status: Option<StatusCode>,
    failures: usize,
    requests: AtomicUsize,
    bodies: Mutex<Vec<Value>>,
}

async fn handle_completion(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let n = state.requests.fetch_add(1, Ordering::SeqCst) + 1;
    if let Ok(mut bodies) = state.bodies.lock() {
        bodies.push(body.clone());
    }

    if headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        != Some("Bearer test-key")
    {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": { "message": "invalid api key" } })),
        );
    }

    if let Some(status) = state.failure_status {
        if n <= state.failures {
            return (status, Json(json!({ "error": { "message": "try later" } })));
        }
    }

    let prompt = body["messages"][0]["content"].as_str().unwrap_or_default();
    let content = if prompt.starts_with("Critically analyze") {
        state.critique.clone()
    } else {
        format!("Mock phrase {n}")
    };

    (
        StatusCode::OK,
        Json(json!({
            "id": format!("chatcmpl-{n}"),
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": content },
                "finish_reason": "stop"
            }]
        })),
    )
}

/// Starts the mock endpoint and returns a config pointing at it.
async fn spawn_mock(state: Arc<MockState>) -> (Config, tokio::task::JoinHandle<()>) {
    let port = find_available_port();
    let addr = format!("127.0.0.1:{port}");

    let router = Router::new()
        .route("/v1/chat/completions", post(handle_completion))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let config = Config {
        api_base: format!("http://{addr}/v1"),
        api_key: Some("test-key".to_string()),
        request_timeout_secs: 5,
        ..Config::default()
    };
    (config, handle)
}

fn request(step: Step) -> CompletionRequest {
    CompletionRequest {
        step,
        prompt: "Write a phrase".to_string(),
        temperature: 0.7,
        max_tokens: 2000,
        top_p: 1.0,
    }
}

#[tokio::test]
async fn test_client_sends_chat_completion() {
    let state = Arc::new(MockState::default());
    let (config, handle) = spawn_mock(Arc::clone(&state)).await;

    let client = OpenAiClient::from_config(&config).expect("client");
    let text = client
        .generate(&request(Step::Generate))
        .await
        .expect("completion");
    assert_eq!(text, "Mock phrase 1");

    let bodies = state.bodies.lock().expect("lock").clone();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["model"], "gpt-4o-mini");
    assert_eq!(bodies[0]["messages"][0]["role"], "user");
    assert_eq!(bodies[0]["messages"][0]["content"], "Write a phrase");
    assert_eq!(bodies[0]["max_tokens"], 2000);

    handle.abort();
}

#[tokio::test]
async fn test_client_classifies_unauthorized() {
    let state = Arc::new(MockState::default());
    let (mut config, handle) = spawn_mock(state).await;
    config.api_key = Some("wrong-key".to_string());

    let client = OpenAiClient::from_config(&config).expect("client");
    let err = client
        .generate(&request(Step::Critique))
        .await
        .expect_err("should fail");

    assert!(matches!(
        err,
        ReflectError::LlmApiError {
            kind: LlmErrorKind::Authentication,
            ..
        }
    ));
    assert!(err.is_fatal());

    handle.abort();
}

#[tokio::test]
async fn test_client_classifies_rate_limit_as_transient() {
    let state = Arc::new(MockState {
        failure_status: Some(StatusCode::TOO_MANY_REQUESTS),
        failures: 1,
        ..MockState::default()
    });
    let (config, handle) = spawn_mock(state).await;

    let client = OpenAiClient::from_config(&config).expect("client");
    let err = client
        .generate(&request(Step::Refine))
        .await
        .expect_err("should fail");
    assert!(err.is_transient());

    handle.abort();
}

#[tokio::test]
async fn test_full_run_through_mock_endpoint() {
    let state = Arc::new(MockState {
        critique: "Strengths: good, clear. Weakness: a bit generic.".to_string(),
        ..MockState::default()
    });
    let (config, handle) = spawn_mock(Arc::clone(&state)).await;

    let client = Arc::new(OpenAiClient::from_config(&config).expect("client"));
    let orchestrator =
        ReflectionOrchestrator::from_config(client, &config).expect("orchestrator");
    let run = orchestrator.reflect("self-confidence").await.expect("run");

    // good, clear vs generic, weak(ness): 0.5 + 0.2 - 0.2 + 0.1 structure bonus
    assert_eq!(run.total_iterations, 3);
    assert!(!run.stopped_early);
    assert_eq!(run.final_response, "Mock phrase 5");
    assert!(run
        .iterations
        .iter()
        .all(|i| (i.quality_score - 0.6).abs() < 1e-9));
    assert_eq!(state.requests.load(Ordering::SeqCst), 6);

    let bodies = state.bodies.lock().expect("lock").clone();
    let temperatures: Vec<f64> = bodies
        .iter()
        .filter_map(|b| b["temperature"].as_f64())
        .collect();
    assert_eq!(temperatures.len(), 6);
    assert!((temperatures[0] - 0.7).abs() < 1e-6);
    assert!((temperatures[1] - 0.3).abs() < 1e-6);
    assert!((temperatures[2] - 0.5).abs() < 1e-6);

    handle.abort();
}

#[tokio::test]
async fn test_run_retries_transient_server_errors() {
    let state = Arc::new(MockState {
        critique: "Excellent, inspiring and memorable.".to_string(),
        failure_status: Some(StatusCode::SERVICE_UNAVAILABLE),
        failures: 2,
        ..MockState::default()
    });
    let (config, handle) = spawn_mock(Arc::clone(&state)).await;

    let client = Arc::new(OpenAiClient::from_config(&config).expect("client"));
    let orchestrator =
        ReflectionOrchestrator::from_config(client, &config).expect("orchestrator");
    let run = orchestrator.reflect("dreams").await.expect("run");

    assert!(run.stopped_early);
    assert_eq!(run.total_iterations, 1);
    // two failed generate attempts, then generate and critique
    assert_eq!(state.requests.load(Ordering::SeqCst), 4);
    assert_eq!(run.final_response, "Mock phrase 3");

    handle.abort();
}

#[tokio::test]
async fn test_run_fails_when_retries_exhausted() {
    let state = Arc::new(MockState {
        failure_status: Some(StatusCode::BAD_GATEWAY),
        failures: usize::MAX,
        ..MockState::default()
    });
    let (mut config, handle) = spawn_mock(Arc::clone(&state)).await;
    config.max_retries = 1;

    let client = Arc::new(OpenAiClient::from_config(&config).expect("client"));
    let orchestrator =
        ReflectionOrchestrator::from_config(client, &config).expect("orchestrator");
    let err = orchestrator.reflect("dreams").await.expect_err("should fail");

    assert!(matches!(
        err,
        ReflectError::LlmRetriesExhausted { attempts: 2, .. }
    ));
    assert_eq!(state.requests.load(Ordering::SeqCst), 2);

    handle.abort();
}
