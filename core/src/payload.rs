/// Webhook payload wire format
///
/// Field names follow the provider's JSON exactly. Numeric fields
/// (`timestamp`) arrive as strings and are parsed by the normalizer, as are
/// `type` and `status`, so that out-of-range values surface as malformed
/// payloads instead of serde noise.
use crate::error::{ChatError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    #[serde(rename = "metaData")]
    pub meta_data: MetaData,
    /// ISO-8601 ingestion time
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaData {
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    pub value: ChangeValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contacts: Option<Vec<WebhookContact>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<WebhookMessage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statuses: Option<Vec<WebhookStatus>>,
    pub metadata: PhoneMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookContact {
    pub profile: Profile,
    pub wa_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookMessage {
    pub from: String,
    pub id: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<TextBody>,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextBody {
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookStatus {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_msg_id: Option<String>,
    pub recipient_id: String,
    pub status: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoneMetadata {
    pub display_phone_number: String,
    pub phone_number_id: String,
}

impl WebhookPayload {
    /// Decode one payload document
    pub fn from_slice(raw: &[u8]) -> Result<Self> {
        serde_json::from_slice(raw)
            .map_err(|e| ChatError::MalformedPayload(format!("invalid payload JSON: {}", e)))
    }

    /// `metaData.entry[0].changes[0].value`, the only change consulted
    pub fn first_change(&self) -> Result<&ChangeValue> {
        let entry = self
            .meta_data
            .entry
            .first()
            .ok_or_else(|| ChatError::MalformedPayload("metaData.entry is empty".to_string()))?;
        let change = entry.changes.first().ok_or_else(|| {
            ChatError::MalformedPayload("metaData.entry[0].changes is empty".to_string())
        })?;
        Ok(&change.value)
    }
}
