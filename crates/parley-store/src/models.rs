use chrono::{DateTime, Local};

use parley_shared::MessageKind;

/// Delivery status of a stored message. Transitions Unsent → Sent only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    Unsent,
    Sent,
}

impl MessageStatus {
    pub fn code(self) -> u8 {
        match self {
            MessageStatus::Unsent => 0,
            MessageStatus::Sent => 1,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(MessageStatus::Unsent),
            1 => Some(MessageStatus::Sent),
            _ => None,
        }
    }
}

/// A durably recorded chat message.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub uuid: String,
    pub session_id: String,
    pub kind: MessageKind,
    pub content: String,
    pub url: String,
    pub send_id: String,
    pub send_name: String,
    pub send_avatar: String,
    pub receive_id: String,
    pub file_size: String,
    pub file_type: String,
    pub file_name: String,
    pub status: MessageStatus,
    pub created_at: DateTime<Local>,
    pub av_data: String,
}

/// A chat group. Membership is an ordered list of user ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub uuid: String,
    pub name: String,
    pub members: Vec<String>,
    pub created_at: DateTime<Local>,
}
