use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router, debug_handler,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::get,
};
use palaver::{
    AppResult, AppState,
    config::Config,
    persist::{self, telegram::TelegramBackup, local::LocalStore, writer::BackupWriter},
    rooms,
    state::ChatState,
};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("palaver=info")),
        )
        .init();

    let config = Config::from_env();
    let local = LocalStore::new(&config.snapshot_path);
    let remote = config
        .backup
        .as_ref()
        .map(|b| TelegramBackup::new(b.bot_token.clone(), b.chat_id.clone()));
    if remote.is_none() {
        info!("no backup credentials, remote backup disabled");
    }

    let snapshot = persist::recover(&local, remote.as_ref()).await;
    let chat = ChatState::from_snapshot(snapshot);

    let backup = match remote {
        Some(remote) => BackupWriter::spawn(remote),
        None => BackupWriter::disabled(),
    };
    let state = AppState { chat: Arc::new(Mutex::new(chat)), local, backup };

    {
        let chat = state.chat.lock().await;
        state.backup.push(chat.snapshot().condensed(), Some("server started".to_owned()));
    }

    let app = Router::new()
        .route("/", get(status))
        .merge(rooms::router())
        .with_state(state)
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "palaver listening");
    axum::serve(listener, app).await?;
    Ok(())
}

#[debug_handler]
async fn status(State(app): State<AppState>) -> AppResult<Response> {
    let chat = app.chat.lock().await;
    let body = serde_json::to_string(&serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "users": chat.user_count(),
        "online": chat.online_count(),
    }))?;
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}
