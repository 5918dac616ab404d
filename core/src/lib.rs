/// WhatsApp-style chat backend
///
/// Ingests webhook payloads (inbound messages and delivery statuses), keeps
/// one record per message in a sled store, and serves conversation views and
/// a compose path over a small JSON API.

pub mod error;
pub mod config;
pub mod models;
pub mod payload;
pub mod normalizer;
pub mod message_store;
pub mod conversations;
pub mod ingest;
pub mod service;
pub mod messenger_api;

pub use error::{ChatError, Result};
pub use config::Config;
pub use message_store::MessageStore;
pub use service::ChatService;
