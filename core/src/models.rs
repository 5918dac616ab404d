/// Shared types for the message store and the API layer
use crate::error::{ChatError, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_SUFFIX_LEN: usize = 9;

/// Closed set of message kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    Document,
    Audio,
    Video,
}

impl FromStr for MessageType {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "document" => Ok(Self::Document),
            "audio" => Ok(Self::Audio),
            "video" => Ok(Self::Video),
            other => Err(ChatError::MalformedPayload(format!(
                "unsupported message type '{}'",
                other
            ))),
        }
    }
}

/// Delivery status of a message; the only mutable part of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Delivered,
    Read,
}

impl FromStr for DeliveryStatus {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sent" => Ok(Self::Sent),
            "delivered" => Ok(Self::Delivered),
            "read" => Ok(Self::Read),
            other => Err(ChatError::MalformedPayload(format!(
                "unsupported status '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
        };
        f.write_str(s)
    }
}

/// One persisted message, keyed by the provider-assigned `id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub from: String,
    pub to: String,
    /// Provider send time, seconds since epoch
    pub timestamp: i64,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub contact_name: String,
    pub wa_id: String,
    pub status: DeliveryStatus,
    #[serde(
        rename = "statusTimestamp",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub status_timestamp: Option<i64>,
    /// Ingestion time, distinct from `timestamp`
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "isIncoming")]
    pub is_incoming: bool,
}

impl MessageRecord {
    /// Build a locally originated text message to `wa_id`.
    ///
    /// Rejects empty `text`, `wa_id` or `contact_name`.
    pub fn outgoing(
        text: &str,
        wa_id: &str,
        contact_name: &str,
        business_number: &str,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        for (field, value) in [("text", text), ("wa_id", wa_id), ("contact_name", contact_name)] {
            if value.trim().is_empty() {
                return Err(ChatError::Validation(format!("missing required field: {}", field)));
            }
        }
        if wa_id.contains('\0') {
            return Err(ChatError::Validation("wa_id must not contain NUL".to_string()));
        }

        Ok(Self {
            id: generate_message_id(now),
            from: business_number.to_string(),
            to: wa_id.to_string(),
            timestamp: now.timestamp(),
            text: text.to_string(),
            kind: MessageType::Text,
            contact_name: contact_name.to_string(),
            wa_id: wa_id.to_string(),
            status: DeliveryStatus::Sent,
            status_timestamp: None,
            created_at: now,
            is_incoming: false,
        })
    }

    /// Unread means incoming and not yet marked read
    pub fn is_unread(&self) -> bool {
        self.is_incoming && self.status != DeliveryStatus::Read
    }
}

/// `msg_<unix-millis>_<9 base36 chars>`
pub fn generate_message_id(now: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("msg_{}_{}", now.timestamp_millis(), suffix)
}

/// Ephemeral patch applied to an existing record; never stored on its own
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_msg_id: Option<String>,
    pub status: DeliveryStatus,
    pub timestamp: i64,
    pub recipient_id: String,
}

/// One conversation in the list view, computed on read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// Counterpart identifier the messages are grouped by
    pub wa_id: String,
    pub contact_name: String,
    #[serde(rename = "lastMessage")]
    pub last_message: MessageRecord,
    #[serde(rename = "unreadCount")]
    pub unread_count: u64,
}

/// Message count per counterpart, for ingestion summaries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationCount {
    pub wa_id: String,
    pub contact_name: String,
    pub message_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outgoing_record_fields() {
        let now = Utc::now();
        let msg = MessageRecord::outgoing("hello", "911234", "Alice", "918329446654", now).unwrap();

        assert!(!msg.is_incoming);
        assert_eq!(msg.status, DeliveryStatus::Sent);
        assert_eq!(msg.text, "hello");
        assert_eq!(msg.wa_id, "911234");
        assert_eq!(msg.to, "911234");
        assert_eq!(msg.from, "918329446654");
        assert_eq!(msg.kind, MessageType::Text);
        assert_eq!(msg.timestamp, now.timestamp());
        assert!(msg.id.starts_with(&format!("msg_{}_", now.timestamp_millis())));
    }

    #[test]
    fn test_outgoing_requires_fields() {
        let now = Utc::now();
        for (text, wa_id, name) in [("", "1", "A"), ("hi", "", "A"), ("hi", "1", "  ")] {
            let err = MessageRecord::outgoing(text, wa_id, name, "0", now).unwrap_err();
            assert!(matches!(err, ChatError::Validation(_)));
        }
    }

    #[test]
    fn test_outgoing_rejects_nul_in_wa_id() {
        let err = MessageRecord::outgoing("hi", "91\0x", "A", "0", Utc::now()).unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));
    }

    #[test]
    fn test_generated_ids_differ() {
        let now = Utc::now();
        let a = generate_message_id(now);
        let b = generate_message_id(now);
        assert_ne!(a, b);
        assert_eq!(a.rsplit('_').next().unwrap().len(), ID_SUFFIX_LEN);
    }

    #[test]
    fn test_record_json_field_names() {
        let msg = MessageRecord::outgoing("hi", "1", "A", "0", Utc::now()).unwrap();
        let v = serde_json::to_value(&msg).unwrap();

        assert_eq!(v["type"], "text");
        assert_eq!(v["status"], "sent");
        assert_eq!(v["isIncoming"], false);
        assert!(v.get("createdAt").is_some());
        assert!(v.get("statusTimestamp").is_none());
    }

    #[test]
    fn test_closed_sets_reject_unknown_values() {
        assert!("sticker".parse::<MessageType>().is_err());
        assert!("failed".parse::<DeliveryStatus>().is_err());
        assert_eq!("read".parse::<DeliveryStatus>().unwrap(), DeliveryStatus::Read);
    }
}
