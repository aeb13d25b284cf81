mod client;

use axum::{debug_handler, extract::{Query, State}, routing::{get, post}, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::{AppResult, AppState};

pub use client::Metered;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/create/room", post(create_room))
        .route("/api/validate-meeting", get(validate_meeting))
        .route("/api/metered-domain", get(metered_domain))
}

#[debug_handler(state = AppState)]
pub(crate) async fn create_room(
    State(metered): State<Metered>,
) -> AppResult<Json<Value>> {
    let room = metered.create_room().await?;
    let room_name = room.get("roomName").cloned().unwrap_or_default();
    info!(room = %room_name, "provider room created");
    Ok(Json(room))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ValidateQuery {
    pub(crate) room_name: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn validate_meeting(
    Query(ValidateQuery { room_name }): Query<ValidateQuery>,
    State(metered): State<Metered>,
) -> AppResult<Json<Value>> {
    let Some(room_name) = room_name.filter(|name| !name.is_empty()) else {
        return Ok(Json(json!({
            "success": false,
            "message": "Please specify roomName",
        })));
    };

    let found = metered.room_exists(&room_name).await?;
    Ok(Json(json!({ "roomFound": found })))
}

#[debug_handler(state = AppState)]
pub(crate) async fn metered_domain(
    State(metered): State<Metered>,
) -> Json<Value> {
    Json(json!({ "METERED_DOMAIN": metered.domain() }))
}
