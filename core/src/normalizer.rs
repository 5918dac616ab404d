/// Payload normalizer: webhook payload -> message record or status patch
///
/// Pure transformation, no I/O. The payload is classified once, here, by
/// which sub-structure its first change carries; callers match on
/// [`Normalized`] instead of probing the payload themselves.
use crate::error::{ChatError, Result};
use crate::models::{DeliveryStatus, MessageRecord, MessageType, StatusUpdate};
use crate::payload::{ChangeValue, WebhookPayload};
use chrono::{DateTime, NaiveDateTime, Utc};

/// Outcome of normalizing one payload
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Message(MessageRecord),
    Status(StatusUpdate),
    /// Neither branch applies (or a message arrived without a contact entry)
    Unrecognized(String),
}

impl Normalized {
    pub fn kind(&self) -> &'static str {
        match self {
            Normalized::Message(_) => "message",
            Normalized::Status(_) => "status",
            Normalized::Unrecognized(_) => "unrecognized",
        }
    }
}

/// Decode raw bytes and normalize in one step
pub fn normalize_slice(raw: &[u8]) -> Result<Normalized> {
    let payload = WebhookPayload::from_slice(raw)?;
    normalize(&payload)
}

/// Classify and normalize a decoded payload.
///
/// `messages` wins over `statuses` if both are present. Only index 0 of
/// each array is read.
pub fn normalize(payload: &WebhookPayload) -> Result<Normalized> {
    let value = payload.first_change()?;

    if value.messages.is_some() {
        return match extract_message(payload, value)? {
            Some(record) => Ok(Normalized::Message(record)),
            None => Ok(Normalized::Unrecognized(
                "message payload without a contact entry".to_string(),
            )),
        };
    }

    if value.statuses.is_some() {
        return extract_status(value).map(Normalized::Status);
    }

    Ok(Normalized::Unrecognized(
        "payload carries neither messages nor statuses".to_string(),
    ))
}

/// `Ok(None)` when the contact entry is missing
fn extract_message(payload: &WebhookPayload, value: &ChangeValue) -> Result<Option<MessageRecord>> {
    let message = value
        .messages
        .as_deref()
        .and_then(|m| m.first())
        .ok_or_else(|| ChatError::MalformedPayload("messages array is empty".to_string()))?;

    let contact = match value.contacts.as_deref().and_then(|c| c.first()) {
        Some(c) => c,
        None => return Ok(None),
    };
    if contact.wa_id.contains('\0') {
        return Err(ChatError::MalformedPayload(
            "contacts[0].wa_id contains NUL".to_string(),
        ));
    }

    let business_number = &value.metadata.display_phone_number;

    Ok(Some(MessageRecord {
        id: message.id.clone(),
        from: message.from.clone(),
        to: business_number.clone(),
        timestamp: parse_timestamp(&message.timestamp, "messages[0].timestamp")?,
        text: message.text.as_ref().map(|t| t.body.clone()).unwrap_or_default(),
        kind: message.kind.parse::<MessageType>()?,
        contact_name: contact.profile.name.clone(),
        wa_id: contact.wa_id.clone(),
        status: DeliveryStatus::Sent,
        status_timestamp: None,
        created_at: parse_created_at(&payload.created_at)?,
        is_incoming: &message.from != business_number,
    }))
}

fn extract_status(value: &ChangeValue) -> Result<StatusUpdate> {
    let status = value
        .statuses
        .as_deref()
        .and_then(|s| s.first())
        .ok_or_else(|| ChatError::MalformedPayload("statuses array is empty".to_string()))?;

    Ok(StatusUpdate {
        message_id: status.id.clone(),
        meta_msg_id: status.meta_msg_id.clone(),
        status: status.status.parse::<DeliveryStatus>()?,
        timestamp: parse_timestamp(&status.timestamp, "statuses[0].timestamp")?,
        recipient_id: status.recipient_id.clone(),
    })
}

/// Integer seconds; anything else rejects the payload rather than defaulting
fn parse_timestamp(raw: &str, field: &str) -> Result<i64> {
    raw.trim().parse::<i64>().map_err(|_| {
        ChatError::MalformedPayload(format!("{} is not an integer: '{}'", field, raw))
    })
}

/// RFC 3339, or a naive `YYYY-MM-DD[T ]HH:MM:SS[.fff]` taken as UTC
fn parse_created_at(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(naive.and_utc());
        }
    }
    Err(ChatError::MalformedPayload(format!(
        "createdAt is not a valid timestamp: '{}'",
        raw
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BUSINESS: &str = "918329446654";

    fn message_payload(from: &str, timestamp: &str, with_contact: bool) -> serde_json::Value {
        let mut value = json!({
            "messages": [{
                "from": from,
                "id": "wamid.HBgM001",
                "timestamp": timestamp,
                "text": { "body": "Hi, I'd like to know more" },
                "type": "text"
            }],
            "messaging_product": "whatsapp",
            "metadata": { "display_phone_number": BUSINESS, "phone_number_id": "629305560276479" }
        });
        if with_contact {
            value["contacts"] = json!([{ "profile": { "name": "Ravi Kumar" }, "wa_id": "919937320320" }]);
        }
        json!({
            "payload_type": "whatsapp_webhook",
            "metaData": { "entry": [{ "changes": [{ "field": "messages", "value": value }], "id": "30164062719905277" }] },
            "createdAt": "2025-06-30T12:00:00.000Z"
        })
    }

    fn status_payload(status: &str, meta_msg_id: Option<&str>) -> serde_json::Value {
        let mut entry = json!({
            "id": "wamid.HBgM001",
            "recipient_id": "919937320320",
            "status": status,
            "timestamp": "1754400020"
        });
        if let Some(meta) = meta_msg_id {
            entry["meta_msg_id"] = json!(meta);
        }
        json!({
            "metaData": { "entry": [{ "changes": [{ "value": {
                "statuses": [entry],
                "metadata": { "display_phone_number": BUSINESS, "phone_number_id": "629305560276479" }
            } }] }] },
            "createdAt": "2025-06-30 12:05:00"
        })
    }

    fn run(v: serde_json::Value) -> Result<Normalized> {
        normalize_slice(&serde_json::to_vec(&v).unwrap())
    }

    #[test]
    fn test_incoming_message_is_normalized() {
        let out = run(message_payload("919937320320", "1754400000", true)).unwrap();
        let Normalized::Message(msg) = out else { panic!("expected message") };

        assert_eq!(msg.id, "wamid.HBgM001");
        assert_eq!(msg.to, BUSINESS);
        assert_eq!(msg.timestamp, 1754400000);
        assert_eq!(msg.text, "Hi, I'd like to know more");
        assert_eq!(msg.kind, MessageType::Text);
        assert_eq!(msg.contact_name, "Ravi Kumar");
        assert_eq!(msg.wa_id, "919937320320");
        assert_eq!(msg.status, DeliveryStatus::Sent);
        assert!(msg.is_incoming);
        assert_eq!(msg.created_at.to_rfc3339(), "2025-06-30T12:00:00+00:00");
    }

    #[test]
    fn test_message_from_business_is_outgoing() {
        let out = run(message_payload(BUSINESS, "1754400000", true)).unwrap();
        let Normalized::Message(msg) = out else { panic!("expected message") };
        assert!(!msg.is_incoming);
    }

    #[test]
    fn test_missing_text_becomes_empty_string() {
        let mut v = message_payload("919937320320", "1754400000", true);
        let m = &mut v["metaData"]["entry"][0]["changes"][0]["value"]["messages"][0];
        m.as_object_mut().unwrap().remove("text");
        m["type"] = json!("image");

        let Normalized::Message(msg) = run(v).unwrap() else { panic!("expected message") };
        assert_eq!(msg.text, "");
        assert_eq!(msg.kind, MessageType::Image);
    }

    #[test]
    fn test_message_without_contact_is_unrecognized() {
        let out = run(message_payload("919937320320", "1754400000", false)).unwrap();
        assert!(matches!(out, Normalized::Unrecognized(_)));
    }

    #[test]
    fn test_bad_timestamp_is_malformed() {
        let err = run(message_payload("919937320320", "yesterday", true)).unwrap_err();
        assert!(matches!(err, ChatError::MalformedPayload(_)));
    }

    #[test]
    fn test_bad_status_timestamp_is_malformed() {
        let mut v = status_payload("delivered", None);
        v["metaData"]["entry"][0]["changes"][0]["value"]["statuses"][0]["timestamp"] = json!("soon");
        assert!(matches!(run(v).unwrap_err(), ChatError::MalformedPayload(_)));
    }

    #[test]
    fn test_contact_wa_id_with_nul_is_malformed() {
        let mut v = message_payload("919937320320", "1754400000", true);
        v["metaData"]["entry"][0]["changes"][0]["value"]["contacts"][0]["wa_id"] = json!("91\u{0}x");
        assert!(matches!(run(v).unwrap_err(), ChatError::MalformedPayload(_)));
    }

    #[test]
    fn test_unknown_message_type_is_malformed() {
        let mut v = message_payload("919937320320", "1754400000", true);
        v["metaData"]["entry"][0]["changes"][0]["value"]["messages"][0]["type"] = json!("sticker");
        assert!(matches!(run(v).unwrap_err(), ChatError::MalformedPayload(_)));
    }

    #[test]
    fn test_status_is_normalized() {
        let out = run(status_payload("read", Some("wamid.META001"))).unwrap();
        let Normalized::Status(update) = out else { panic!("expected status") };

        assert_eq!(update.message_id, "wamid.HBgM001");
        assert_eq!(update.meta_msg_id.as_deref(), Some("wamid.META001"));
        assert_eq!(update.status, DeliveryStatus::Read);
        assert_eq!(update.timestamp, 1754400020);
        assert_eq!(update.recipient_id, "919937320320");
    }

    #[test]
    fn test_unknown_status_is_malformed() {
        assert!(run(status_payload("failed", None)).is_err());
    }

    #[test]
    fn test_empty_change_is_unrecognized() {
        let v = json!({
            "metaData": { "entry": [{ "changes": [{ "value": {
                "metadata": { "display_phone_number": BUSINESS, "phone_number_id": "1" }
            } }] }] },
            "createdAt": "2025-06-30T12:00:00Z"
        });
        assert!(matches!(run(v).unwrap(), Normalized::Unrecognized(_)));
    }

    #[test]
    fn test_missing_entry_is_malformed() {
        let v = json!({ "metaData": { "entry": [] }, "createdAt": "2025-06-30T12:00:00Z" });
        assert!(matches!(run(v).unwrap_err(), ChatError::MalformedPayload(_)));
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        let err = normalize_slice(b"{ not json").unwrap_err();
        assert!(matches!(err, ChatError::MalformedPayload(_)));
    }

    #[test]
    fn test_created_at_formats() {
        assert!(parse_created_at("2025-06-30T12:00:00+05:30").is_ok());
        assert!(parse_created_at("2025-06-30 12:00:00.123").is_ok());
        assert!(parse_created_at("30/06/2025").is_err());
    }
}
