use anyhow::anyhow;
use axum::{
    extract::{Path, Query, State}, http::StatusCode, middleware, routing::{get, post}, Extension, Json, Router
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tavern_clients::ImageUpload;
use tavern_runtime::{CharacterQuery, NewCharacter};
use uuid::Uuid;

use crate::middleware::authenticate;
use crate::response::{AppError, AppSuccess};
use crate::GlobalState;

pub fn character_routes(state: &GlobalState) -> Router<GlobalState> {
    Router::new()
        .route("/characters", get(list_characters))
        .route("/character/{id}", get(get_character))

        .route("/character", post(create_character)
            .route_layer(middleware::from_fn_with_state(state.clone(), authenticate))
        )
        .route("/character/avatar", post(upload_avatar)
            .route_layer(middleware::from_fn_with_state(state.clone(), authenticate))
        )
}

async fn list_characters(
    State(state): State<GlobalState>,
    Query(query): Query<CharacterQuery>,
) -> Result<AppSuccess, AppError> {
    let characters = state.store.list_characters(&query).await
        .map_err(AppError::internal)?;

    Ok(AppSuccess::new(StatusCode::OK, "Characters fetched successfully", json!({
        "characters": characters,
        "limit": query.limit(),
        "offset": query.offset(),
    })))
}

async fn get_character(
    State(state): State<GlobalState>,
    Path(id): Path<Uuid>,
) -> Result<AppSuccess, AppError> {
    let character = state.store.get_character(&id).await
        .map_err(AppError::internal)?
        .ok_or(AppError::new(StatusCode::NOT_FOUND, anyhow!("Character not found")))?;

    Ok(AppSuccess::new(StatusCode::OK, "Character fetched successfully", json!(character)))
}

async fn create_character(
    State(state): State<GlobalState>,
    Extension(user_id): Extension<Uuid>,
    Json(payload): Json<NewCharacter>,
) -> Result<AppSuccess, AppError> {
    let character = payload.into_character(&user_id)?;
    let character = state.store.create_character(character).await
        .map_err(AppError::internal)?;

    tracing::info!("[/character] user {} created character {} ({})", user_id, character.name, character.id);
    Ok(AppSuccess::new(StatusCode::CREATED, "Character created successfully", json!(character)))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AvatarUploadRequest {
    /// `data:image/<ext>;base64,<payload>`
    pub image: String,
}

async fn upload_avatar(
    State(state): State<GlobalState>,
    Extension(user_id): Extension<Uuid>,
    Json(payload): Json<AvatarUploadRequest>,
) -> Result<AppSuccess, AppError> {
    let r2_client = state.r2_client.as_ref().ok_or(AppError::new(
        StatusCode::SERVICE_UNAVAILABLE,
        anyhow!("Object storage is not configured"),
    ))?;

    let upload = ImageUpload::from_base64(&payload.image)?;
    let url = r2_client.upload(upload).await
        .map_err(AppError::internal)?;
    tracing::info!("[/character/avatar] user {} uploaded {}", user_id, url);

    Ok(AppSuccess::new(StatusCode::OK, "Avatar uploaded successfully", json!({ "url": url })))
}
