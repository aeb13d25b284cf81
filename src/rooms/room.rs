use std::collections::HashMap;

use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use super::{Outbox, PeerInfo, SignalError};

pub struct Participant {
    pub id: String,
    pub name: String,
    /// Identifies the connection that owns this participant.
    pub session: Uuid,
    pub joined_at: OffsetDateTime,
    outbox: Outbox,
}

impl Participant {
    pub fn new(id: String, name: String, session: Uuid, outbox: Outbox) -> Participant {
        Participant {
            id,
            name,
            session,
            joined_at: OffsetDateTime::now_utc(),
            outbox,
        }
    }

    pub fn info(&self) -> PeerInfo {
        PeerInfo {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }

    pub fn send(&self, text: &str) -> Result<(), SignalError> {
        self.outbox.send(text)
    }
}

pub struct Room {
    pub name: String,
    pub created_at: OffsetDateTime,
    participants: HashMap<String, Participant>,
}

impl Room {
    pub fn new(name: String) -> Room {
        Room {
            name,
            created_at: OffsetDateTime::now_utc(),
            participants: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.participants.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Participant> {
        self.participants.get(id)
    }

    pub fn insert(&mut self, participant: Participant) -> Result<(), SignalError> {
        if self.contains(&participant.id) {
            return Err(SignalError::DuplicateParticipant {
                room: self.name.clone(),
                id: participant.id,
            });
        }
        self.participants.insert(participant.id.clone(), participant);
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Option<Participant> {
        self.participants.remove(id)
    }

    /// The id handed out when a joiner doesn't bring one: the current head
    /// count, unless churn already put someone under that id.
    pub fn default_participant_id(&self) -> String {
        let id = self.len().to_string();
        if self.contains(&id) {
            return Uuid::now_v7().simple().to_string();
        }
        id
    }

    pub fn peers_except(&self, id: &str) -> Vec<PeerInfo> {
        self.participants
            .values()
            .filter(|p| p.id != id)
            .map(Participant::info)
            .collect()
    }

    /// Best-effort fan-out: a failed send is logged and skipped. Returns how
    /// many participants the message was handed to.
    pub fn broadcast(&self, exclude_id: &str, text: &str) -> usize {
        let mut delivered = 0;
        for participant in self.participants.values() {
            if participant.id == exclude_id {
                continue;
            }
            match participant.send(text) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(
                    room = %self.name,
                    participant = %participant.id,
                    error = %e,
                    "failed to send to participant"
                ),
            }
        }
        delivered
    }
}

/// Point-in-time copy of a room, for inspection.
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub name: String,
    pub created_at: OffsetDateTime,
    pub participants: Vec<PeerInfo>,
}

impl From<&Room> for RoomSnapshot {
    fn from(room: &Room) -> Self {
        let mut participants: Vec<PeerInfo> =
            room.participants.values().map(Participant::info).collect();
        participants.sort_by(|a, b| a.id.cmp(&b.id));
        RoomSnapshot {
            name: room.name.clone(),
            created_at: room.created_at,
            participants,
        }
    }
}
