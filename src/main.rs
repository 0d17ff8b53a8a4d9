mod app;
mod auth;
mod chat;
mod config;
mod db;
mod error;
mod extract;
mod images;
mod mail;
mod moderation;
mod recipes;
mod refs;
mod response;
mod state;
mod storage;
mod sync;
mod users;

#[cfg(test)]
mod testing;

use crate::config::AppConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "cookmate=debug,axum=info,tower_http=info".to_string());
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
    tracing::info!(
        mail_transport = ?config.mail.transport,
        bucket = %config.storage.bucket,
        "configuration loaded"
    );

    let state = AppState::init(config).await?;
    app::serve(app::build_app(state)).await
}
