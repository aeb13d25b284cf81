mod connection;
mod error;
mod msg;
mod registry;
mod room;
mod session;
mod ws;

use axum::{routing::get, Router};

use crate::AppState;

pub use connection::{Inbox, Outbox};
pub use error::SignalError;
pub use msg::{ClientMessage, JoinRequest, PeerInfo, RelayKind, ServerMessage};
pub use registry::RoomRegistry;
pub use room::{Participant, Room, RoomSnapshot};
pub use session::SignalingSession;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws/signaling/{room_name}", get(ws::signaling_ws))
}
