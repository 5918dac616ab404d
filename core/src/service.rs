/// Read/write boundary used by the API and the binaries
use crate::config::Config;
use crate::conversations;
use crate::error::Result;
use crate::ingest::{self, IngestReport};
use crate::message_store::MessageStore;
use crate::models::{ConversationSummary, MessageRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Body of a send request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SendRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub wa_id: String,
    #[serde(default)]
    pub contact_name: String,
}

/// Store handle plus configuration. Every read goes to the store; nothing is
/// cached between calls.
#[derive(Clone)]
pub struct ChatService {
    store: MessageStore,
    config: Arc<Config>,
}

impl ChatService {
    pub fn new(store: MessageStore, config: Config) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }

    /// Open the on-disk store named by `config.data_dir`
    pub fn open(config: Config) -> Result<Self> {
        let store = MessageStore::new(&config.data_dir)?;
        info!(
            "Opened message store at {} ({} messages)",
            config.data_dir.display(),
            store.count()
        );
        Ok(Self::new(store, config))
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
        conversations::list_conversations(&self.store)
    }

    pub fn list_messages(&self, wa_id: &str) -> Result<Vec<MessageRecord>> {
        self.store.messages_for(wa_id)
    }

    pub fn send_message(&self, req: &SendRequest) -> Result<MessageRecord> {
        let record = self.store.compose(
            &req.text,
            &req.wa_id,
            &req.contact_name,
            &self.config.business_number,
        )?;
        info!("Stored outgoing message {} to {}", record.id, record.wa_id);
        Ok(record)
    }

    /// Ingest the configured payload directory
    pub fn ingest(&self) -> Result<IngestReport> {
        ingest::ingest_dir(&self.store, &self.config.payload_dir)
    }
}
