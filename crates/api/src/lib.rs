mod env;
mod global_state;
mod middleware;
mod response;
mod utils;
mod routes;

pub use routes::{
    chat_routes,
    ChatRequest,
    character_routes,
    message_routes,
    misc_routes,
};

pub use env::ApiServerEnv;
pub use global_state::GlobalState;
pub use utils::{extract_bearer_token, setup_tracing};
pub use middleware::authenticate;
pub use response::{AppError, AppSuccess, ChatFailure};

use axum::Router;

/// Every route of the service, bound to `state`.
pub fn app(state: GlobalState) -> Router {
    Router::new()
        .merge(misc_routes())
        .merge(chat_routes())
        .merge(character_routes(&state))
        .merge(message_routes(&state))
        .with_state(state)
}
