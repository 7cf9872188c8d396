//! Chat-completion client tests against a local mock endpoint

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use profile_voicebot::config::CompletionConfig;
use profile_voicebot::{
    ChatCompletionClient, CompletionClient, CompletionError, ConversationTurn,
    NO_RESPONSE_FALLBACK,
};
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio_test::{assert_err, assert_ok};

const SYSTEM_PROMPT: &str = "You are a voice assistant representing a candidate.";

/// Requests seen by the mock: authorization header and JSON body
type Seen = Arc<Mutex<Vec<(Option<String>, Value)>>>;

/// Serve a fixed response on an ephemeral port; returns the endpoint URL
async fn mock_endpoint(status: StatusCode, body: String, delay: Duration) -> (String, Seen) {
    let seen: Seen = Arc::default();
    let recorder = Arc::clone(&seen);

    let router = Router::new().route(
        "/v1/chat/completions",
        post(move |headers: HeaderMap, body_bytes: String| {
            let recorder = Arc::clone(&recorder);
            let body = body.clone();
            async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .map(ToString::to_string);
                let request: Value = serde_json::from_str(&body_bytes).unwrap_or(Value::Null);
                recorder.lock().unwrap().push((auth, request));
                tokio::time::sleep(delay).await;
                (status, body)
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (format!("http://{addr}/v1/chat/completions"), seen)
}

fn config(url: String) -> CompletionConfig {
    CompletionConfig {
        url,
        model: "test-model".to_string(),
        max_tokens: 500,
        timeout: Some(Duration::from_secs(5)),
        history_limit: None,
        api_key: Some(SecretString::from("test-key".to_string())),
    }
}

fn reply_body(content: &str) -> String {
    json!({
        "id": "chatcmpl-1",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    })
    .to_string()
}

#[tokio::test]
async fn test_request_shape_and_reply() {
    let (url, seen) = mock_endpoint(
        StatusCode::OK,
        reply_body("Rapid adaptability."),
        Duration::ZERO,
    )
    .await;
    let client = ChatCompletionClient::new(&config(url), SYSTEM_PROMPT).unwrap();

    let history = vec![
        ConversationTurn::user("Hi"),
        ConversationTurn::assistant("Hello! Ask me anything."),
    ];
    let reply = assert_ok!(client.complete(&history, "What's your superpower?").await);
    assert_eq!(reply, "Rapid adaptability.");

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let (auth, body) = &seen[0];

    assert_eq!(auth.as_deref(), Some("Bearer test-key"));
    assert_eq!(body["model"], "test-model");
    assert_eq!(body["max_tokens"], 500);
    assert_eq!(body["temperature"].as_f64(), Some(0.0));

    let messages = body["messages"].as_array().unwrap();
    let pairs: Vec<(&str, &str)> = messages
        .iter()
        .map(|m| (m["role"].as_str().unwrap(), m["content"].as_str().unwrap()))
        .collect();
    assert_eq!(
        pairs,
        vec![
            ("system", SYSTEM_PROMPT),
            ("user", "Hi"),
            ("assistant", "Hello! Ask me anything."),
            ("user", "What's your superpower?"),
        ]
    );
}

#[tokio::test]
async fn test_error_status_uses_body_message() {
    let body = json!({ "error": { "message": "Invalid API Key", "type": "invalid_request_error" } });
    let (url, _) = mock_endpoint(StatusCode::UNAUTHORIZED, body.to_string(), Duration::ZERO).await;
    let client = ChatCompletionClient::new(&config(url), SYSTEM_PROMPT).unwrap();

    let err = client.complete(&[], "Hi").await.unwrap_err();
    assert_eq!(
        err,
        CompletionError::Status {
            status: 401,
            message: "Invalid API Key".to_string(),
        }
    );
    assert_eq!(err.to_string(), "API Error 401: Invalid API Key");
}

#[tokio::test]
async fn test_error_status_without_body_uses_reason() {
    let (url, _) = mock_endpoint(
        StatusCode::INTERNAL_SERVER_ERROR,
        String::new(),
        Duration::ZERO,
    )
    .await;
    let client = ChatCompletionClient::new(&config(url), SYSTEM_PROMPT).unwrap();

    let err = client.complete(&[], "Hi").await.unwrap_err();
    assert_eq!(err.to_string(), "API Error 500: Internal Server Error");
}

#[tokio::test]
async fn test_malformed_body() {
    let (url, _) = mock_endpoint(StatusCode::OK, "<html>oops</html>".to_string(), Duration::ZERO).await;
    let client = ChatCompletionClient::new(&config(url), SYSTEM_PROMPT).unwrap();

    let err = assert_err!(client.complete(&[], "Hi").await);
    assert!(matches!(err, CompletionError::Malformed(_)));
}

#[tokio::test]
async fn test_empty_choices_fall_back() {
    let body = json!({ "choices": [] }).to_string();
    let (url, _) = mock_endpoint(StatusCode::OK, body, Duration::ZERO).await;
    let client = ChatCompletionClient::new(&config(url), SYSTEM_PROMPT).unwrap();

    let reply = assert_ok!(client.complete(&[], "Hi").await);
    assert_eq!(reply, NO_RESPONSE_FALLBACK);
}

#[tokio::test]
async fn test_timeout() {
    let (url, _) = mock_endpoint(StatusCode::OK, reply_body("late"), Duration::from_secs(3)).await;
    let mut config = config(url);
    config.timeout = Some(Duration::from_secs(1));
    let client = ChatCompletionClient::new(&config, SYSTEM_PROMPT).unwrap();

    let err = client.complete(&[], "Hi").await.unwrap_err();
    assert_eq!(err, CompletionError::Timeout(1));
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let url = format!("http://{addr}/v1/chat/completions");
    let client = ChatCompletionClient::new(&config(url), SYSTEM_PROMPT).unwrap();

    let err = client.complete(&[], "Hi").await.unwrap_err();
    assert!(matches!(err, CompletionError::Network(_)));
}

#[tokio::test]
async fn test_missing_key_never_sends() {
    let (url, seen) = mock_endpoint(StatusCode::OK, reply_body("hi"), Duration::ZERO).await;
    let mut config = config(url);
    config.api_key = None;
    let client = ChatCompletionClient::new(&config, SYSTEM_PROMPT).unwrap();

    let err = client.complete(&[], "Hi").await.unwrap_err();
    assert_eq!(err, CompletionError::MissingCredential);
    assert!(seen.lock().unwrap().is_empty());
}
