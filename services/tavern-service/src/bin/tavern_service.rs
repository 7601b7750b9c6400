use anyhow::Result;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use tavern_common::EnvVars;
use tavern_service_api::{app, setup_tracing, ApiServerEnv, GlobalState};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    setup_tracing();

    let cors = CorsLayer::very_permissive();
    let trace = TraceLayer::new_for_http();

    let global_state = GlobalState::new().await?;

    let app = app(global_state)
        .layer(TimeoutLayer::new(std::time::Duration::from_secs(3600)))
        .layer(cors)
        .layer(trace);

    let port = ApiServerEnv::load().port;
    let listener = tokio::net::TcpListener::bind(format!("[::]:{port}")).await?;

    tracing::info!("LISTENING ON {port}");
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
