use std::time::Duration;

use axum::{debug_handler, extract::{Path, State, WebSocketUpgrade}, response::IntoResponse};
use futures_util::StreamExt;
use tracing::debug;

use super::{
    RoomRegistry, SignalingSession,
    connection::{self, Outbox, WsInbox},
};

/// How long queued messages get to reach a peer after its session ends.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[debug_handler(state = crate::AppState)]
pub async fn signaling_ws(
    Path(room_name): Path<String>,
    State(registry): State<RoomRegistry>,

    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(async move |stream| {
        let (sink, stream) = stream.split();
        let (outbox, rx) = Outbox::channel();

        let mut writer = tokio::spawn(connection::pump(rx, sink));
        SignalingSession::new(registry, room_name, WsInbox(stream), outbox)
            .run()
            .await;

        // lets queued messages drain once the session has let go of its outbox
        if tokio::time::timeout(DRAIN_TIMEOUT, &mut writer).await.is_err() {
            debug!("writer did not drain in time, dropping connection");
            writer.abort();
        }
    })
}
