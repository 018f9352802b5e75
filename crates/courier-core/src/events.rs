use serde::{Deserialize, Serialize};

use crate::ids::UserId;
use crate::message::MessageKind;

/// Events pushed to live connections over the WebSocket.
///
/// `time` is the human-readable clock label derived from the persistence
/// timestamp, not a client-supplied value.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "new_message")]
    NewMessage {
        content: String,
        kind: MessageKind,
        sender_id: UserId,
        time: String,
    },
}
