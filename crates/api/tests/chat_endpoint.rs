use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use http_body_util::BodyExt;
use mockito::Matcher;
use serde_json::{json, Value};
use tower::ServiceExt;

use tavern_clients::LlmClient;
use tavern_runtime::{CompletionGateway, MemoryChatStore};
use tavern_service_api::{app, GlobalState};

fn state(provider_url: &str, api_key: Option<&str>) -> GlobalState {
    GlobalState::from_parts(
        CompletionGateway::new(LlmClient::from_parts(provider_url, api_key, "openpipe:Samantha-70b")),
        Arc::new(MemoryChatStore::new()),
        None,
        None,
    )
}

fn chat_body(extra: Value) -> String {
    let mut body = json!({
        "messages": [{"role": "user", "content": "Hello!"}],
        "character": {"name": "Samantha", "personality": "Warm and curious."},
    });
    if let (Value::Object(body), Value::Object(extra)) = (&mut body, extra) {
        body.extend(extra);
    }
    body.to_string()
}

async fn post_chat(
    state: GlobalState, body: String, accept: Option<&str>,
) -> (StatusCode, HeaderMap, String) {
    let mut request = Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(accept) = accept {
        request = request.header(header::ACCEPT, accept);
    }

    let response = app(state)
        .oneshot(request.body(Body::from(body)).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn test_missing_character_is_404_without_provider_call() {
    let mut server = mockito::Server::new_async().await;
    let mock = server.mock("POST", "/chat/completions").expect(0).create_async().await;

    let body = json!({"messages": [{"role": "user", "content": "Hi"}]}).to_string();
    let (status, _, text) = post_chat(state(&server.url(), Some("key")), body, None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(text, "Character not found in request");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_missing_credential_is_500_without_provider_call() {
    let mut server = mockito::Server::new_async().await;
    let mock = server.mock("POST", "/chat/completions").expect(0).create_async().await;

    let (status, _, text) = post_chat(state(&server.url(), None), chat_body(json!({})), None).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(text.contains("not configured"), "{text}");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_malformed_body_is_400() {
    let server = mockito::Server::new_async().await;
    let (status, _, text) = post_chat(state(&server.url(), Some("key")), "{oops".into(), None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(text.starts_with("Invalid request body format"), "{text}");
}

#[tokio::test]
async fn test_messages_must_be_an_array() {
    let server = mockito::Server::new_async().await;
    let body = json!({"messages": "Hello", "character": {"name": "Samantha", "personality": "Warm."}}).to_string();
    let (status, _, text) = post_chat(state(&server.url(), Some("key")), body, None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(text, "Messages must be an array");
}

#[tokio::test]
async fn test_reply_hides_thinking_by_default() {
    let mut server = mockito::Server::new_async().await;
    let mock = server.mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer key")
        .match_body(Matcher::PartialJson(json!({"temperature": 0.0, "max_tokens": 500, "stream": false})))
        .with_status(200)
        .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"<think>plan A</think>Hello there."}}]}"#)
        .create_async()
        .await;

    let (status, _, text) = post_chat(state(&server.url(), Some("key")), chat_body(json!({})), None).await;
    mock.assert_async().await;

    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(body, json!({"message": "Hello there."}));
}

#[tokio::test]
async fn test_loosely_shaped_character_reaches_provider() {
    let mut server = mockito::Server::new_async().await;
    let mock = server.mock("POST", "/chat/completions")
        .match_body(Matcher::Regex("You are Samantha. Warm and curious.".to_string()))
        .with_status(200)
        .with_body(r#"{"choices":[{"message":{"content":"Hi!"}}]}"#)
        .expect(3)
        .create_async()
        .await;

    for character in [
        json!({"name": "Samantha", "personality": "Warm and curious.", "avatar_url": null}),
        json!({"name": "Samantha", "personality": "Warm and curious.", "description": null, "greeting": null}),
        json!({"id": "greeting-char", "name": "Samantha", "personality": "Warm and curious.", "created_at": "now"}),
    ] {
        let body = json!({
            "messages": [{"role": "user", "content": "Hello!"}],
            "character": character,
        }).to_string();
        let (status, _, text) = post_chat(state(&server.url(), Some("key")), body, None).await;
        assert_eq!(status, StatusCode::OK, "{character}: {text}");
        assert_eq!(serde_json::from_str::<Value>(&text).unwrap(), json!({"message": "Hi!"}));
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn test_character_without_personality_is_400() {
    let mut server = mockito::Server::new_async().await;
    let mock = server.mock("POST", "/chat/completions").expect(0).create_async().await;

    let body = json!({
        "messages": [],
        "character": {"name": "Samantha", "personality": null},
    }).to_string();
    let (status, _, text) = post_chat(state(&server.url(), Some("key")), body, None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(text, "Character personality is required");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_include_thinking_exposes_segment() {
    let mut server = mockito::Server::new_async().await;
    server.mock("POST", "/chat/completions")
        .with_status(200)
        .with_body(r#"{"choices":[{"message":{"content":"<think1>a</think1>mid<think2>b</think2>tail"}}]}"#)
        .create_async()
        .await;

    let (status, _, text) = post_chat(
        state(&server.url(), Some("key")),
        chat_body(json!({"include_thinking": true})),
        None,
    ).await;

    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(body, json!({"message": "midtail", "thinking": "a\nb"}));
}

#[tokio::test]
async fn test_provider_status_is_propagated() {
    let mut server = mockito::Server::new_async().await;
    server.mock("POST", "/chat/completions")
        .with_status(429)
        .with_body("rate limited")
        .create_async()
        .await;

    let (status, _, text) = post_chat(state(&server.url(), Some("key")), chat_body(json!({})), None).await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(text.contains("rate limited"), "{text}");
}

#[tokio::test]
async fn test_unusable_provider_payload_is_500() {
    let mut server = mockito::Server::new_async().await;
    server.mock("POST", "/chat/completions")
        .with_status(200)
        .with_body(r#"{"choices":[{"message":{"role":"assistant"}}]}"#)
        .create_async()
        .await;

    let (status, _, _) = post_chat(state(&server.url(), Some("key")), chat_body(json!({})), None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

const STREAM_BODY: &str = concat!(
    "data: {\"choices\":[{\"delta\":{\"content\":\"<think>\"}}]}\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\"secret\"}}]}\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\"</think>Hi\"}}]}\n\n",
    "data: not-json\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\n\n",
    "data: [DONE]\n\n",
);

#[tokio::test]
async fn test_streaming_forwards_visible_fragments() {
    let mut server = mockito::Server::new_async().await;
    let mock = server.mock("POST", "/chat/completions")
        .match_body(Matcher::PartialJson(json!({"stream": true})))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(STREAM_BODY)
        .create_async()
        .await;

    let (status, headers, text) = post_chat(
        state(&server.url(), Some("key")),
        chat_body(json!({"stream": true})),
        None,
    ).await;
    mock.assert_async().await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "text/event-stream");
    assert_eq!(headers[header::CACHE_CONTROL], "no-cache");
    assert_eq!(text, "Hi there");
}

#[tokio::test]
async fn test_accept_header_selects_streaming() {
    let mut server = mockito::Server::new_async().await;
    server.mock("POST", "/chat/completions")
        .match_body(Matcher::PartialJson(json!({"stream": true})))
        .with_status(200)
        .with_body(STREAM_BODY)
        .create_async()
        .await;

    let (status, headers, text) = post_chat(
        state(&server.url(), Some("key")),
        chat_body(json!({})),
        Some("text/event-stream"),
    ).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "text/event-stream");
    assert_eq!(text, "Hi there");
}

#[tokio::test]
async fn test_streaming_provider_rejection_is_reported_before_stream() {
    let mut server = mockito::Server::new_async().await;
    server.mock("POST", "/chat/completions")
        .with_status(401)
        .with_body(r#"{"error":"invalid api key"}"#)
        .create_async()
        .await;

    let (status, headers, text) = post_chat(
        state(&server.url(), Some("wrong")),
        chat_body(json!({"stream": true})),
        None,
    ).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_ne!(headers.get(header::CONTENT_TYPE).unwrap(), "text/event-stream");
    assert!(text.contains("invalid api key"), "{text}");
}
