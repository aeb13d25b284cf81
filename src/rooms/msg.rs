use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::SignalError;

/// How a participant is shown to the rest of the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub participant_id: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayKind {
    Offer,
    Answer,
    IceCandidate,
}

impl RelayKind {
    pub fn as_str(&self) -> &'static str {
        use RelayKind::*;
        match self {
            Offer => "offer",
            Answer => "answer",
            IceCandidate => "ice_candidate",
        }
    }
}

/// An inbound message. Relayed messages keep their original text so the
/// payload reaches the target untouched.
#[derive(Debug)]
pub enum ClientMessage {
    Join(JoinRequest),
    Relay {
        kind: RelayKind,
        to: Option<String>,
        raw: String,
    },
    Leave,
    Other(String),
}

impl ClientMessage {
    pub fn decode(raw: String) -> Result<ClientMessage, SignalError> {
        let value: Value = serde_json::from_str(&raw)?;
        let Some(kind) = value.get("type").and_then(Value::as_str) else {
            return Err(SignalError::Decode("expected a string `type` field".to_owned()));
        };

        let relay = |kind: RelayKind| ClientMessage::Relay {
            kind,
            to: value.get("to").and_then(Value::as_str).map(str::to_owned),
            raw: raw.clone(),
        };

        Ok(match kind {
            "join" => ClientMessage::Join(JoinRequest::deserialize(&value)?),
            "offer" => relay(RelayKind::Offer),
            "answer" => relay(RelayKind::Answer),
            "ice_candidate" => relay(RelayKind::IceCandidate),
            "leave" => ClientMessage::Leave,
            other => ClientMessage::Other(other.to_owned()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    RoomJoined {
        participants: Vec<PeerInfo>,
    },
    ParticipantJoined {
        participant: PeerInfo,
    },
    ParticipantLeft {
        #[serde(rename = "participantId")]
        participant_id: String,
    },
    Error {
        code: String,
        message: String,
    },
}

impl ServerMessage {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
