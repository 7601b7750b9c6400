use anyhow::anyhow;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;

use crate::response::AppError;
use crate::utils::extract_bearer_token;
use crate::GlobalState;

/// Resolves the bearer token with the identity provider and stores the
/// caller's `Uuid` as a request extension.
pub async fn authenticate(
    State(state): State<GlobalState>, mut req: Request, next: Next,
) -> Result<Response<Body>, AppError> {
    let identity = state.identity_client.as_ref().ok_or(AppError::new(
        StatusCode::SERVICE_UNAVAILABLE,
        anyhow!("identity provider is not configured"),
    ))?;

    let token = extract_bearer_token(&req)?;
    let user_id = identity.verify(&token).await
        .map_err(|e| AppError::new(StatusCode::BAD_GATEWAY, e))?
        .ok_or(AppError::new(StatusCode::UNAUTHORIZED, anyhow!("invalid or expired session")))?;

    tracing::debug!("[authenticate] request from user {}", user_id);
    req.extensions_mut().insert(user_id);
    Ok(next.run(req).await)
}
