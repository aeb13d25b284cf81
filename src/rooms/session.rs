use std::ops::ControlFlow;

use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use super::{ClientMessage, Inbox, Outbox, PeerInfo, RoomRegistry, ServerMessage, SignalError};

#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionState {
    AwaitingJoin,
    Active(PeerInfo),
    Terminated,
}

/// Drives one connection through `AwaitingJoin -> Active -> Terminated`.
pub struct SignalingSession<I> {
    id: Uuid,
    room: String,
    registry: RoomRegistry,
    inbox: I,
    outbox: Outbox,
    state: SessionState,
}

impl<I: Inbox> SignalingSession<I> {
    pub fn new(registry: RoomRegistry, room: String, inbox: I, outbox: Outbox) -> Self {
        Self {
            id: Uuid::now_v7(),
            room,
            registry,
            inbox,
            outbox,
            state: SessionState::AwaitingJoin,
        }
    }

    /// Reads until the peer leaves, disconnects or sends something
    /// undecodable, then removes it from the room.
    pub async fn run(mut self) {
        let span = info_span!("signaling", room = %self.room, session = %self.id);
        async move {
            debug!("session started");
            match self.read_loop().await {
                Ok(()) => debug!("session ended"),
                Err(SignalError::ConnectionClosed) if self.outbox.is_stalled() => {
                    warn!("peer stopped reading, leaving")
                }
                Err(SignalError::ConnectionClosed) => debug!("connection closed"),
                Err(e) => warn!(error = %e, "session aborted"),
            }
            self.terminate().await;
        }
        .instrument(span)
        .await
    }

    async fn read_loop(&mut self) -> Result<(), SignalError> {
        loop {
            let raw = tokio::select! {
                raw = self.inbox.receive() => raw?,
                _ = self.outbox.stalled() => return Err(SignalError::ConnectionClosed),
            };
            let msg = ClientMessage::decode(raw)?;
            if self.dispatch(msg).await?.is_break() {
                return Ok(());
            }
        }
    }

    async fn dispatch(&mut self, msg: ClientMessage) -> Result<ControlFlow<()>, SignalError> {
        match msg {
            ClientMessage::Join(request) => {
                if let SessionState::Active(me) = &self.state {
                    warn!(participant = %me.id, "already joined, ignoring join");
                    return Ok(ControlFlow::Continue(()));
                }

                match self
                    .registry
                    .join(&self.room, request, self.id, self.outbox.clone())
                    .await
                {
                    Ok(me) => self.state = SessionState::Active(me),
                    Err(SignalError::DuplicateParticipant { room, id }) => {
                        info!(participant = %id, "participant id taken");
                        let reply = ServerMessage::Error {
                            code: "duplicate_participant".to_owned(),
                            message: format!("participant {id} is already in room {room}"),
                        };
                        self.outbox.send(reply.encode()?)?;
                    }
                    Err(e) => return Err(e),
                }
            }
            ClientMessage::Relay { kind, to, raw } => {
                let SessionState::Active(me) = &self.state else {
                    debug!(kind = kind.as_str(), "not joined, ignoring");
                    return Ok(ControlFlow::Continue(()));
                };
                let Some(to) = to else {
                    debug!(participant = %me.id, kind = kind.as_str(), "no target, dropping");
                    return Ok(ControlFlow::Continue(()));
                };

                match self.registry.forward(&self.room, &to, &raw).await {
                    Ok(()) => debug!(participant = %me.id, target = %to, kind = kind.as_str(), "forwarded"),
                    Err(e @ SignalError::TargetNotFound { .. }) => {
                        debug!(participant = %me.id, kind = kind.as_str(), error = %e, "dropping")
                    }
                    Err(e) => warn!(
                        participant = %me.id,
                        target = %to,
                        kind = kind.as_str(),
                        error = %e,
                        "failed to forward"
                    ),
                }
            }
            ClientMessage::Leave => {
                if !matches!(self.state, SessionState::Active(_)) {
                    debug!("not joined, ignoring leave");
                    return Ok(ControlFlow::Continue(()));
                }
                self.terminate().await;
                return Ok(ControlFlow::Break(()));
            }
            ClientMessage::Other(kind) => {
                debug!(kind, "ignoring unknown message type");
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    /// Runs at most once per session no matter how it ended.
    async fn terminate(&mut self) {
        let state = std::mem::replace(&mut self.state, SessionState::Terminated);
        if let SessionState::Active(me) = state {
            self.registry.leave(&self.room, &me.id, self.id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::{Value, json};
    use tokio::{
        sync::mpsc::{self, Receiver, UnboundedSender},
        task::JoinHandle,
        time::timeout,
    };

    use super::*;

    struct Peer {
        tx: UnboundedSender<String>,
        rx: Receiver<String>,
        task: JoinHandle<()>,
    }

    impl Peer {
        fn connect(registry: &RoomRegistry, room: &str) -> Peer {
            Peer::connect_with_capacity(registry, room, crate::rooms::connection::OUTBOX_CAPACITY)
        }

        fn connect_with_capacity(registry: &RoomRegistry, room: &str, capacity: usize) -> Peer {
            let (tx, inbox) = mpsc::unbounded_channel();
            let (outbox, rx) = Outbox::with_capacity(capacity);
            let session = SignalingSession::new(registry.clone(), room.to_owned(), inbox, outbox);
            Peer {
                tx,
                rx,
                task: tokio::spawn(session.run()),
            }
        }

        fn send(&self, value: Value) {
            self.tx.send(value.to_string()).unwrap();
        }

        async fn recv_raw(&mut self) -> String {
            timeout(Duration::from_secs(2), self.rx.recv())
                .await
                .expect("timed out waiting for message")
                .expect("connection closed")
        }

        async fn recv(&mut self) -> Value {
            serde_json::from_str(&self.recv_raw().await).unwrap()
        }

        async fn assert_silent(&mut self) {
            let got = timeout(Duration::from_millis(100), self.rx.recv()).await;
            assert!(matches!(got, Err(_) | Ok(None)), "unexpected message: {got:?}");
        }

        async fn close(self) -> Receiver<String> {
            drop(self.tx);
            self.task.await.unwrap();
            self.rx
        }
    }

    async fn joined(registry: &RoomRegistry, room: &str, id: &str) -> Peer {
        let mut peer = Peer::connect(registry, room);
        peer.send(json!({"type": "join", "participantId": id, "username": id.to_uppercase()}));
        assert_eq!(peer.recv().await["type"], "room_joined");
        peer
    }

    #[tokio::test]
    async fn join_assigns_defaults() {
        let registry = RoomRegistry::new();
        let mut a = Peer::connect(&registry, "r");
        a.send(json!({"type": "join"}));
        assert_eq!(a.recv().await, json!({"type": "room_joined", "participants": []}));

        let mut b = Peer::connect(&registry, "r");
        b.send(json!({"type": "join"}));
        assert_eq!(
            b.recv().await,
            json!({"type": "room_joined", "participants": [{"id": "0", "name": "User-0"}]})
        );
        assert_eq!(
            a.recv().await,
            json!({"type": "participant_joined", "participant": {"id": "1", "name": "User-1"}})
        );
    }

    #[tokio::test]
    async fn messages_before_join_are_ignored() {
        let registry = RoomRegistry::new();
        let mut a = Peer::connect(&registry, "r");
        a.send(json!({"type": "offer", "to": "x", "sdp": "s"}));
        a.send(json!({"type": "leave"}));
        a.send(json!({"type": "join", "participantId": "a"}));
        assert_eq!(a.recv().await["type"], "room_joined");
        assert!(registry.lookup("r", "a").await.is_some());
    }

    #[tokio::test]
    async fn offer_is_forwarded_verbatim() {
        let registry = RoomRegistry::new();
        let mut a = joined(&registry, "r", "a").await;
        let mut b = joined(&registry, "r", "b").await;
        a.recv().await;

        let raw = r#"{"type":"offer","to":"b","sdp":"x","extra":{"n":1}}"#;
        a.tx.send(raw.to_owned()).unwrap();
        assert_eq!(b.recv_raw().await, raw);
        a.assert_silent().await;
    }

    #[tokio::test]
    async fn forward_to_absent_target_is_dropped() {
        let registry = RoomRegistry::new();
        let mut a = joined(&registry, "r", "a").await;
        let mut b = joined(&registry, "r", "b").await;
        a.recv().await;

        a.send(json!({"type": "answer", "to": "nobody", "sdp": "x"}));
        a.send(json!({"type": "ice_candidate", "candidate": "c"}));
        a.assert_silent().await;
        b.assert_silent().await;

        // still active afterwards
        a.send(json!({"type": "ice_candidate", "to": "b", "candidate": "c"}));
        assert_eq!(b.recv().await["candidate"], "c");
    }

    #[tokio::test]
    async fn duplicate_id_is_rejected_and_can_retry() {
        let registry = RoomRegistry::new();
        let _a = joined(&registry, "r", "a").await;

        let mut dup = Peer::connect(&registry, "r");
        dup.send(json!({"type": "join", "participantId": "a"}));
        let reply = dup.recv().await;
        assert_eq!(reply["type"], "error");
        assert_eq!(reply["code"], "duplicate_participant");

        dup.send(json!({"type": "join", "participantId": "a2"}));
        assert_eq!(dup.recv().await["type"], "room_joined");
    }

    #[tokio::test]
    async fn disconnect_notifies_peers_and_empties_room() {
        let registry = RoomRegistry::new();
        let a = joined(&registry, "r", "a").await;
        let mut b = joined(&registry, "r", "b").await;

        a.close().await;
        assert_eq!(b.recv().await, json!({"type": "participant_left", "participantId": "a"}));
        assert!(registry.contains_room("r").await);

        b.close().await;
        assert!(!registry.contains_room("r").await);
    }

    #[tokio::test]
    async fn explicit_leave_then_close_notifies_once() {
        let registry = RoomRegistry::new();
        let a = joined(&registry, "r", "a").await;
        let mut b = joined(&registry, "r", "b").await;

        a.send(json!({"type": "leave"}));
        assert_eq!(b.recv().await["type"], "participant_left");
        a.close().await;
        b.assert_silent().await;
    }

    #[tokio::test]
    async fn leave_stops_reading() {
        let registry = RoomRegistry::new();
        let a = joined(&registry, "r", "a").await;
        a.send(json!({"type": "leave"}));
        // the session may already be gone
        let _ = a.tx.send(json!({"type": "join", "participantId": "again"}).to_string());

        let mut rx = a.close().await;
        assert!(rx.recv().await.is_none());
        assert_eq!(registry.room_count().await, 0);
    }

    #[tokio::test]
    async fn malformed_message_before_join_has_no_effect() {
        let registry = RoomRegistry::new();
        let a = Peer::connect(&registry, "r");
        a.tx.send("{not json".to_owned()).unwrap();
        a.task.await.unwrap();
        assert_eq!(registry.room_count().await, 0);
    }

    #[tokio::test]
    async fn malformed_message_after_join_leaves_room() {
        let registry = RoomRegistry::new();
        let a = joined(&registry, "r", "a").await;
        let mut b = joined(&registry, "r", "b").await;

        a.send(json!({"kind": "offer"}));
        assert_eq!(b.recv().await["participantId"], "a");
        a.task.await.unwrap();
        assert!(registry.lookup("r", "a").await.is_none());
    }

    #[tokio::test]
    async fn second_join_is_ignored() {
        let registry = RoomRegistry::new();
        let mut a = joined(&registry, "r", "a").await;
        a.send(json!({"type": "join", "participantId": "z"}));
        a.assert_silent().await;
        assert!(registry.lookup("r", "z").await.is_none());
        assert!(registry.lookup("r", "a").await.is_some());
    }

    #[tokio::test]
    async fn peer_that_stops_reading_is_evicted() {
        let registry = RoomRegistry::new();

        let mut slow = Peer::connect_with_capacity(&registry, "r", 1);
        slow.send(json!({"type": "join", "participantId": "slow"}));
        assert_eq!(slow.recv().await["type"], "room_joined");

        // fills the slow peer's only slot with participant_joined
        let mut fast = joined(&registry, "r", "fast").await;

        let offer = json!({"type": "offer", "to": "slow", "sdp": "x"});
        for _ in 0..crate::rooms::connection::MAX_TOTAL_DROPS {
            fast.send(offer.clone());
        }

        assert_eq!(
            fast.recv().await,
            json!({"type": "participant_left", "participantId": "slow"})
        );
        timeout(Duration::from_secs(2), &mut slow.task).await.unwrap().unwrap();
        assert!(registry.lookup("r", "slow").await.is_none());
        assert!(registry.lookup("r", "fast").await.is_some());

        // only the one queued message ever reached the slow peer
        assert_eq!(slow.recv().await["type"], "participant_joined");
        assert!(slow.rx.recv().await.is_none());
    }
}
