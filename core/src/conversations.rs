/// Conversation list, derived from stored messages on every call
use crate::error::Result;
use crate::message_store::MessageStore;
use crate::models::{ConversationSummary, MessageRecord};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Group the store's current contents by counterpart
pub fn list_conversations(store: &MessageStore) -> Result<Vec<ConversationSummary>> {
    Ok(aggregate(store.all()?))
}

/// Group messages by `wa_id`, keep the newest message per group and count
/// unread incoming messages. Groups come back newest first.
pub fn aggregate<I>(messages: I) -> Vec<ConversationSummary>
where
    I: IntoIterator<Item = MessageRecord>,
{
    let mut groups: HashMap<String, ConversationSummary> = HashMap::new();

    for msg in messages {
        let unread = u64::from(msg.is_unread());
        match groups.get_mut(&msg.wa_id) {
            Some(conv) => {
                conv.unread_count += unread;
                if newer(&msg, &conv.last_message) == Ordering::Greater {
                    conv.contact_name = msg.contact_name.clone();
                    conv.last_message = msg;
                }
            }
            None => {
                groups.insert(
                    msg.wa_id.clone(),
                    ConversationSummary {
                        wa_id: msg.wa_id.clone(),
                        contact_name: msg.contact_name.clone(),
                        last_message: msg,
                        unread_count: unread,
                    },
                );
            }
        }
    }

    let mut out: Vec<ConversationSummary> = groups.into_values().collect();
    out.sort_by(|a, b| newer(&b.last_message, &a.last_message).then_with(|| a.wa_id.cmp(&b.wa_id)));
    out
}

/// Order by send time; ties fall back to ingestion time, then id
fn newer(a: &MessageRecord, b: &MessageRecord) -> Ordering {
    a.timestamp
        .cmp(&b.timestamp)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}
