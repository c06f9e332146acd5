pub mod config;
pub mod db;
pub mod events;
pub mod persist;
pub mod rooms;
pub mod state;

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tokio::sync::Mutex;

use crate::persist::{local::LocalStore, writer::BackupWriter};
use crate::state::ChatState;

#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<Mutex<ChatState>>,
    pub local: LocalStore,
    pub backup: BackupWriter,
}

pub type AppResult<T> = Result<T, AppError>;
pub struct AppError(pub anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("{}\n\n{}", self.0, self.0.backtrace()),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
