pub mod config;
pub mod meetings;
pub mod rooms;

use axum::{extract::FromRef, http::StatusCode, response::{IntoResponse, Response}, routing::get, Router};
use tower_http::cors::CorsLayer;
use tracing::error;

use meetings::Metered;
use rooms::RoomRegistry;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub registry: RoomRegistry,
    pub metered: Metered,
}

pub fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(index))

        .merge(meetings::router())
        .merge(rooms::router())

        .with_state(app_state)
        .layer(CorsLayer::permissive())
}

async fn index() -> &'static str {
    "Backend"
}

pub type AppResult<T> = Result<T, AppError>;
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!(error = %self.0, backtrace = %self.0.backtrace(), "request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            self.0.to_string(),
        )
            .into_response()
    }
}

impl From<String> for AppError {
    fn from(err: String) -> Self {
        Self(anyhow::Error::msg(err))
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        Self(anyhow::Error::msg(err.to_owned()))
    }
}

macro_rules! apperr_impl {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self(anyhow::Error::from(err))
            }
        }
    };
}

apperr_impl!(serde_json::Error);
apperr_impl!(axum::Error);
apperr_impl!(reqwest::Error);
apperr_impl!(std::io::Error);
apperr_impl!(std::net::AddrParseError);
