use thiserror::Error;

/// Everything that can go wrong inside a signaling session.
///
/// None of these ever leave the session that produced them: a decode error
/// or a closed connection ends that one session, the rest are logged.
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("malformed message: {0}")]
    Decode(String),

    #[error("participant {id} is already in room {room}")]
    DuplicateParticipant { room: String, id: String },

    #[error("connection closed")]
    ConnectionClosed,

    #[error("peer is not keeping up, message dropped ({drops} so far)")]
    Lagging { drops: u64 },

    #[error("no participant {to} in room {room}")]
    TargetNotFound { room: String, to: String },
}

impl From<serde_json::Error> for SignalError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<std::string::FromUtf8Error> for SignalError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        Self::Decode(err.to_string())
    }
}
