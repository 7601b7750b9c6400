use anyhow::anyhow;
use axum::{
    extract::{Path, State}, http::StatusCode, middleware, routing::{get, post}, Extension, Json, Router
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tavern_runtime::{
    build_prompt, normalize_reply, Character, ChatError, Message, MessageRole, NewMessage, Prompt,
};
use uuid::Uuid;

use crate::middleware::authenticate;
use crate::response::{AppError, AppSuccess, ChatFailure};
use crate::GlobalState;

pub fn message_routes(state: &GlobalState) -> Router<GlobalState> {
    Router::new()
        .route("/messages/{character_id}", get(list_messages).post(append_message))
        .route("/conversation/{character_id}", post(send_message))
        .route_layer(middleware::from_fn_with_state(state.clone(), authenticate))
}

async fn find_character(state: &GlobalState, id: &Uuid) -> Result<Character, AppError> {
    state.store.get_character(id).await
        .map_err(AppError::internal)?
        .ok_or(AppError::new(StatusCode::NOT_FOUND, anyhow!("Character not found")))
}

/// The caller's history with a character, oldest first. An empty history
/// is replaced by the character's greeting when it has one.
async fn list_messages(
    State(state): State<GlobalState>,
    Extension(user_id): Extension<Uuid>,
    Path(character_id): Path<Uuid>,
) -> Result<AppSuccess, AppError> {
    let character = find_character(&state, &character_id).await?;
    let mut messages = state.store.list_messages(&user_id, &character_id).await
        .map_err(AppError::internal)?;

    if messages.is_empty() {
        messages.extend(Message::greeting(&character, &user_id));
    }

    Ok(AppSuccess::new(StatusCode::OK, "Messages fetched successfully", json!({
        "messages": messages,
    })))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AppendMessageRequest {
    pub role: MessageRole,
    pub content: String,
}

async fn append_message(
    State(state): State<GlobalState>,
    Extension(user_id): Extension<Uuid>,
    Path(character_id): Path<Uuid>,
    Json(payload): Json<AppendMessageRequest>,
) -> Result<AppSuccess, AppError> {
    if payload.role == MessageRole::System {
        return Err(AppError::new(StatusCode::BAD_REQUEST, anyhow!("System messages cannot be stored")));
    }
    if payload.content.trim().is_empty() {
        return Err(AppError::new(StatusCode::BAD_REQUEST, anyhow!("Message content is required")));
    }
    find_character(&state, &character_id).await?;

    let message = state.store.append_message(NewMessage {
        character_id,
        user_id,
        role: payload.role,
        content: payload.content,
    }).await
        .map_err(AppError::internal)?;

    Ok(AppSuccess::new(StatusCode::CREATED, "Message saved successfully", json!(message)))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

/// Stores the user's message, asks the character for a reply over the stored
/// history and stores the visible part of that reply.
async fn send_message(
    State(state): State<GlobalState>,
    Extension(user_id): Extension<Uuid>,
    Path(character_id): Path<Uuid>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<Json<Value>, ChatFailure> {
    let content = payload.content.trim();
    if content.is_empty() {
        return Err(ChatError::InvalidMessages("Message content is required".to_string()).into());
    }

    let character = state.store.get_character(&character_id).await?
        .ok_or(ChatError::MissingCharacter)?;

    let history = state.store.list_messages(&user_id, &character_id).await?;
    let mut prompts: Vec<Prompt> = Vec::with_capacity(history.len() + 2);
    if history.is_empty() {
        prompts.extend(Message::greeting(&character, &user_id).as_ref().map(Prompt::from));
    }
    prompts.extend(history.iter().map(Prompt::from));
    prompts.push(Prompt::new_user(content));

    let user_message = state.store
        .append_message(NewMessage::user(&character_id, &user_id, content))
        .await?;

    let envelope = build_prompt(Some(&character), &prompts)
        .map_err(ChatError::from)?;
    let raw = state.gateway.complete(&envelope).await?.into_content()?;
    let normalized = normalize_reply(&raw);

    let assistant_message = state.store
        .append_message(NewMessage::assistant(&character_id, &user_id, &normalized.reply))
        .await?;

    tracing::info!(
        "[/conversation] user {} with {}: {} prior messages",
        user_id, character.name, history.len()
    );

    Ok(Json(json!({
        "user_message": user_message,
        "assistant_message": assistant_message,
    })))
}
