use std::convert::Infallible;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures::StreamExt;
use serde_json::{json, Map, Value};
use tavern_runtime::{build_prompt, normalize_reply, visible_fragments, Character, ChatError, Prompt};

use crate::response::ChatFailure;
use crate::GlobalState;

pub fn chat_routes() -> Router<GlobalState> {
    Router::new()
        .route("/api/chat", post(chat))
}

/// A validated body of `POST /api/chat`.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub character: Character,
    pub messages: Vec<Prompt>,
    pub stream: bool,
    pub include_thinking: bool,
}

fn flag(fields: &Map<String, Value>, key: &str) -> bool {
    fields.get(key).and_then(Value::as_bool).unwrap_or(false)
}

impl ChatRequest {
    /// Checks run in a fixed order: body shape, then character presence,
    /// then the message list.
    pub fn parse(body: &[u8]) -> Result<Self, ChatError> {
        let request: Value = serde_json::from_slice(body)
            .map_err(|e| ChatError::MalformedRequest(e.to_string()))?;
        let Value::Object(mut fields) = request else {
            return Err(ChatError::MalformedRequest("expected a JSON object".to_string()));
        };

        let character = match fields.remove("character") {
            None | Some(Value::Null) => return Err(ChatError::MissingCharacter),
            Some(character) => character,
        };
        let messages = match fields.remove("messages") {
            Some(messages @ Value::Array(_)) => messages,
            _ => return Err(ChatError::InvalidMessages("Messages must be an array".to_string())),
        };

        let character: Character = serde_json::from_value(character)
            .map_err(|e| ChatError::MalformedRequest(format!("character: {e}")))?;
        let messages: Vec<Prompt> = serde_json::from_value(messages)
            .map_err(|e| ChatError::InvalidMessages(format!("Invalid message: {e}")))?;

        Ok(Self {
            character,
            messages,
            stream: flag(&fields, "stream"),
            include_thinking: flag(&fields, "include_thinking"),
        })
    }
}

fn accepts_event_stream(headers: &HeaderMap) -> bool {
    headers.get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("text/event-stream"))
}

async fn chat(
    State(state): State<GlobalState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ChatFailure> {
    let request = ChatRequest::parse(&body)?;
    let envelope = build_prompt(Some(&request.character), &request.messages)
        .map_err(ChatError::from)?;

    tracing::info!(
        "[/api/chat] {} with {} messages",
        request.character.name, request.messages.len()
    );

    if request.stream || accepts_event_stream(&headers) {
        let fragments = state.gateway.stream(&envelope).await?;
        let body = Body::from_stream(visible_fragments(fragments).map(Ok::<_, Infallible>));
        return Ok((
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            body,
        ).into_response());
    }

    let content = state.gateway.complete(&envelope).await?.into_content()?;
    let normalized = normalize_reply(&content);

    let mut response = json!({ "message": normalized.reply });
    if request.include_thinking {
        response["thinking"] = Value::String(normalized.thinking);
    }
    Ok(Json(response).into_response())
}
