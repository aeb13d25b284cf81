use std::{collections::HashMap, sync::Arc};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    JoinRequest, Outbox, PeerInfo, ServerMessage, SignalError,
    room::{Participant, Room, RoomSnapshot},
};

/// Every live room, keyed by name. One lock, held for each whole operation.
#[derive(Clone, Default)]
pub struct RoomRegistry {
    rooms: Arc<Mutex<HashMap<String, Room>>>,
}

fn get_or_create<'a>(rooms: &'a mut HashMap<String, Room>, name: &str) -> &'a mut Room {
    rooms
        .entry(name.to_owned())
        .or_insert_with(|| Room::new(name.to_owned()))
}

fn encode(msg: &ServerMessage) -> Option<String> {
    match msg.encode() {
        Ok(text) => Some(text),
        Err(e) => {
            warn!(error = %e, "failed to serialize message");
            None
        }
    }
}

impl RoomRegistry {
    pub fn new() -> RoomRegistry {
        RoomRegistry::default()
    }

    pub async fn add_participant(&self, room_name: &str, participant: Participant) -> Result<(), SignalError> {
        let mut rooms = self.rooms.lock().await;
        if rooms.get(room_name).is_some_and(|room| room.contains(&participant.id)) {
            return Err(SignalError::DuplicateParticipant {
                room: room_name.to_owned(),
                id: participant.id,
            });
        }
        get_or_create(&mut rooms, room_name).insert(participant)
    }

    /// Drops the room along with its last participant.
    pub async fn remove_participant(&self, room_name: &str, participant_id: &str) -> Option<Participant> {
        let mut rooms = self.rooms.lock().await;
        Self::remove_locked(&mut rooms, room_name, participant_id)
    }

    fn remove_locked(
        rooms: &mut HashMap<String, Room>,
        room_name: &str,
        participant_id: &str,
    ) -> Option<Participant> {
        let room = rooms.get_mut(room_name)?;
        let removed = room.remove(participant_id);
        if room.is_empty() {
            rooms.remove(room_name);
            debug!(room = room_name, "room closed");
        }
        removed
    }

    pub async fn lookup(&self, room_name: &str, participant_id: &str) -> Option<PeerInfo> {
        let rooms = self.rooms.lock().await;
        rooms
            .get(room_name)?
            .get(participant_id)
            .map(Participant::info)
    }

    pub async fn broadcast(&self, room_name: &str, exclude_id: &str, msg: &ServerMessage) -> usize {
        let Some(text) = encode(msg) else {
            return 0;
        };
        let rooms = self.rooms.lock().await;
        rooms
            .get(room_name)
            .map_or(0, |room| room.broadcast(exclude_id, &text))
    }

    pub async fn join(
        &self,
        room_name: &str,
        request: JoinRequest,
        session: Uuid,
        outbox: Outbox,
    ) -> Result<PeerInfo, SignalError> {
        let mut rooms = self.rooms.lock().await;

        let existing = rooms.get(room_name);
        let id = match request.participant_id {
            Some(id) => id,
            None => existing.map_or_else(|| "0".to_owned(), Room::default_participant_id),
        };
        if existing.is_some_and(|room| room.contains(&id)) {
            return Err(SignalError::DuplicateParticipant {
                room: room_name.to_owned(),
                id,
            });
        }

        let name = request.username.unwrap_or_else(|| format!("User-{id}"));
        let participant = Participant::new(id, name, session, outbox);
        let me = participant.info();

        let others = existing.map(|room| room.peers_except(&me.id)).unwrap_or_default();
        if let Some(text) = encode(&ServerMessage::RoomJoined { participants: others }) {
            participant.send(&text)?;
        }

        let room = get_or_create(&mut rooms, room_name);
        if let Some(text) = encode(&ServerMessage::ParticipantJoined { participant: me.clone() }) {
            room.broadcast(&me.id, &text);
        }
        room.insert(participant)?;

        info!(room = room_name, participant = %me.id, name = %me.name, size = room.len(), "participant joined");
        Ok(me)
    }

    // no-op unless `session` still owns the participant
    pub async fn leave(&self, room_name: &str, participant_id: &str, session: Uuid) -> bool {
        let mut rooms = self.rooms.lock().await;

        let owned = rooms
            .get(room_name)
            .and_then(|room| room.get(participant_id))
            .is_some_and(|p| p.session == session);
        if !owned {
            return false;
        }

        if let Some(room) = rooms.get(room_name) {
            let left = ServerMessage::ParticipantLeft {
                participant_id: participant_id.to_owned(),
            };
            if let Some(text) = encode(&left) {
                room.broadcast(participant_id, &text);
            }
        }
        Self::remove_locked(&mut rooms, room_name, participant_id);

        info!(room = room_name, participant = participant_id, "participant left");
        true
    }

    /// Hands `raw` to the target's connection unchanged.
    pub async fn forward(&self, room_name: &str, to: &str, raw: &str) -> Result<(), SignalError> {
        let rooms = self.rooms.lock().await;
        let target = rooms
            .get(room_name)
            .and_then(|room| room.get(to))
            .ok_or_else(|| SignalError::TargetNotFound {
                room: room_name.to_owned(),
                to: to.to_owned(),
            })?;
        target.send(raw)
    }

    pub async fn snapshot(&self, room_name: &str) -> Option<RoomSnapshot> {
        let rooms = self.rooms.lock().await;
        rooms.get(room_name).map(RoomSnapshot::from)
    }

    pub async fn contains_room(&self, room_name: &str) -> bool {
        self.rooms.lock().await.contains_key(room_name)
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.lock().await.len()
    }
}
