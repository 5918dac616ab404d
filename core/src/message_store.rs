/// Message persistence: one record per message in sled
///
/// Two trees: `processed_messages` keyed by message id (the uniqueness
/// constraint), and `by_counterpart` keyed by `wa_id \0 timestamp id` so a
/// conversation can be read back in timestamp order with a prefix scan.
use crate::error::{ChatError, Result};
use crate::models::{ConversationCount, MessageRecord, StatusUpdate};
use chrono::Utc;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

const MESSAGES_TREE: &str = "processed_messages";
const COUNTERPART_TREE: &str = "by_counterpart";

/// Result of an insert-if-absent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A record with this id already exists; nothing was written
    AlreadyPresent,
}

/// Result of applying a status patch
#[derive(Debug, Clone, PartialEq)]
pub enum StatusOutcome {
    Applied(MessageRecord),
    /// Neither `messageId` nor `metaMsgId` matched a stored record
    NotFound,
}

pub struct MessageStore {
    db: sled::Db,
    messages: sled::Tree,
    by_counterpart: sled::Tree,
}

impl MessageStore {
    /// Open (or create) the store under `data_dir`
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db = sled::open(data_dir.join("messages.db"))
            .map_err(|e| ChatError::Storage(format!("Failed to open messages DB: {}", e)))?;
        Self::from_db(db)
    }

    /// In-memory store, discarded on drop
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| ChatError::Storage(format!("Failed to open temporary DB: {}", e)))?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self> {
        let messages = db
            .open_tree(MESSAGES_TREE)
            .map_err(|e| ChatError::Storage(format!("open {}: {}", MESSAGES_TREE, e)))?;
        let by_counterpart = db
            .open_tree(COUNTERPART_TREE)
            .map_err(|e| ChatError::Storage(format!("open {}: {}", COUNTERPART_TREE, e)))?;
        Ok(Self {
            db,
            messages,
            by_counterpart,
        })
    }

    /// Insert `record` unless its id is already stored.
    ///
    /// The existence check and both writes run in one sled transaction, so
    /// concurrent ingestions of the same id leave exactly one record.
    pub fn insert_if_absent(&self, record: &MessageRecord) -> Result<InsertOutcome> {
        let value = serde_json::to_vec(record)?;
        let index_key = counterpart_key(&record.wa_id, record.timestamp, &record.id);
        let id = record.id.as_bytes();

        let outcome = (&self.messages, &self.by_counterpart)
            .transaction(|(messages, by_counterpart)| {
                if messages.get(id)?.is_some() {
                    return Ok(InsertOutcome::AlreadyPresent);
                }
                messages.insert(id, value.as_slice())?;
                by_counterpart.insert(index_key.as_slice(), id)?;
                Ok::<_, ConflictableTransactionError<()>>(InsertOutcome::Inserted)
            })
            .map_err(|e| match e {
                TransactionError::Storage(e) => {
                    ChatError::Storage(format!("insert {}: {}", record.id, e))
                }
                TransactionError::Abort(()) => {
                    ChatError::Storage(format!("insert {} aborted", record.id))
                }
            })?;

        if outcome == InsertOutcome::AlreadyPresent {
            debug!("Message {} already exists, skipping", record.id);
        }
        Ok(outcome)
    }

    /// Set `status` and `statusTimestamp` on the record whose id equals
    /// `messageId`, or failing that `metaMsgId`. Last write wins. Never
    /// creates a record.
    pub fn apply_status(&self, update: &StatusUpdate) -> Result<StatusOutcome> {
        let candidates = std::iter::once(update.message_id.as_str())
            .chain(update.meta_msg_id.as_deref())
            .filter(|id| !id.is_empty());

        for id in candidates {
            if let Some(record) = self.patch_status(id, update)? {
                return Ok(StatusOutcome::Applied(record));
            }
        }
        Ok(StatusOutcome::NotFound)
    }

    /// Compare-and-swap loop so a concurrent patch is never half-applied
    fn patch_status(&self, id: &str, update: &StatusUpdate) -> Result<Option<MessageRecord>> {
        loop {
            let current = match self.messages.get(id.as_bytes()).map_err(storage("get"))? {
                Some(v) => v,
                None => return Ok(None),
            };

            let mut record: MessageRecord = serde_json::from_slice(&current)?;
            record.status = update.status;
            record.status_timestamp = Some(update.timestamp);
            let next = serde_json::to_vec(&record)?;

            let swapped = self
                .messages
                .compare_and_swap(id.as_bytes(), Some(current), Some(next))
                .map_err(storage("compare_and_swap"))?;
            match swapped {
                Ok(()) => return Ok(Some(record)),
                Err(_) => debug!("Concurrent update on {}, retrying", id),
            }
        }
    }

    /// Create and store a locally originated text message.
    ///
    /// No idempotence check: every call is a new message with a fresh id.
    pub fn compose(
        &self,
        text: &str,
        wa_id: &str,
        contact_name: &str,
        business_number: &str,
    ) -> Result<MessageRecord> {
        let record = MessageRecord::outgoing(text, wa_id, contact_name, business_number, Utc::now())?;
        let value = serde_json::to_vec(&record)?;
        let index_key = counterpart_key(&record.wa_id, record.timestamp, &record.id);

        (&self.messages, &self.by_counterpart)
            .transaction(|(messages, by_counterpart)| {
                messages.insert(record.id.as_bytes(), value.as_slice())?;
                by_counterpart.insert(index_key.as_slice(), record.id.as_bytes())?;
                Ok::<_, ConflictableTransactionError<()>>(())
            })
            .map_err(|e| ChatError::Storage(format!("compose {}: {:?}", record.id, e)))?;

        Ok(record)
    }

    /// Look up a single record by id
    pub fn get(&self, id: &str) -> Result<Option<MessageRecord>> {
        match self.messages.get(id.as_bytes()).map_err(storage("get"))? {
            Some(v) => Ok(Some(serde_json::from_slice(&v)?)),
            None => Ok(None),
        }
    }

    /// All messages for one counterpart, ascending by timestamp
    pub fn messages_for(&self, wa_id: &str) -> Result<Vec<MessageRecord>> {
        let mut prefix = wa_id.as_bytes().to_vec();
        prefix.push(0);

        let mut out = Vec::new();
        for entry in self.by_counterpart.scan_prefix(&prefix) {
            let (_, id) = entry.map_err(storage("scan"))?;
            if let Some(v) = self.messages.get(&id).map_err(storage("get"))? {
                let record: MessageRecord = serde_json::from_slice(&v)?;
                // The prefix alone is ambiguous when a wa_id carries a NUL
                if record.wa_id == wa_id {
                    out.push(record);
                }
            }
        }
        Ok(out)
    }

    /// Every stored message, in id order
    pub fn all(&self) -> Result<Vec<MessageRecord>> {
        let mut out = Vec::with_capacity(self.messages.len());
        for entry in self.messages.iter() {
            let (_, v) = entry.map_err(storage("iter"))?;
            out.push(serde_json::from_slice::<MessageRecord>(&v)?);
        }
        Ok(out)
    }

    /// Get message count
    pub fn count(&self) -> usize {
        self.messages.len()
    }

    /// Message count and display name per counterpart, sorted by `wa_id`
    pub fn conversation_counts(&self) -> Result<Vec<ConversationCount>> {
        let mut counts: BTreeMap<String, ConversationCount> = BTreeMap::new();
        for msg in self.all()? {
            let entry = counts
                .entry(msg.wa_id.clone())
                .or_insert_with(|| ConversationCount {
                    wa_id: msg.wa_id.clone(),
                    contact_name: msg.contact_name.clone(),
                    message_count: 0,
                });
            entry.message_count += 1;
        }
        Ok(counts.into_values().collect())
    }

    /// Number of distinct counterparts
    pub fn conversation_count(&self) -> Result<usize> {
        Ok(self.conversation_counts()?.len())
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush().map_err(storage("flush"))?;
        Ok(())
    }
}

impl Clone for MessageStore {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            messages: self.messages.clone(),
            by_counterpart: self.by_counterpart.clone(),
        }
    }
}

fn storage(op: &'static str) -> impl Fn(sled::Error) -> ChatError {
    move |e| ChatError::Storage(format!("{}: {}", op, e))
}

/// `wa_id \0 timestamp id`. The sign bit is flipped so big-endian bytes sort
/// numerically for negative timestamps too.
fn counterpart_key(wa_id: &str, timestamp: i64, id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(wa_id.len() + 1 + 8 + id.len());
    key.extend_from_slice(wa_id.as_bytes());
    key.push(0);
    key.extend_from_slice(&((timestamp as u64) ^ (1 << 63)).to_be_bytes());
    key.extend_from_slice(id.as_bytes());
    key
}
