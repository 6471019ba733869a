mod app;
mod calories;
mod config;
mod dates;
mod db;
mod dishes;
mod error;
mod history;
mod meals;
mod state;
mod storage;

use crate::config::AppConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "babymeal=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env()?;
    let addr = config.addr()?;
    tracing::info!(backend = ?config.store_backend, max_range_days = config.max_range_days, "starting");

    let state = AppState::init(config).await?;
    app::serve(app::build_app(state), addr).await
}
