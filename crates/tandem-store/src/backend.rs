//! Collaborator traits.
//!
//! The client never reaches a backend through globals: a directory store,
//! a message log store and an identity provider are handed to it as
//! `Arc<dyn …>` and can be swapped per test.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, watch};

use tandem_shared::{ConversationKey, ParticipantId};

use crate::document::{Document, SetMode, WriteFields};
use crate::error::{Result, StoreError};
use crate::models::Principal;

/// Full state of a live query at one point in time, in store order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub documents: Vec<Document>,
}

impl Snapshot {
    pub fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

pub type SnapshotResult = std::result::Result<Snapshot, StoreError>;

/// Receiving end of a live query.  The first item is the current state;
/// one more arrives after every change.  Dropping the receiver ends the
/// subscription on the store side.
pub type SnapshotStream = mpsc::UnboundedReceiver<SnapshotResult>;

/// Directory of participant records, keyed by document id.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn get_profile(&self, id: &str) -> Result<Option<Document>>;

    async fn set_profile(&self, id: &str, fields: WriteFields, mode: SetMode) -> Result<()>;

    /// Returns `true` if a record was deleted.
    async fn delete_profile(&self, id: &str) -> Result<bool>;

    /// Every record, ordered by document id.
    async fn list_profiles(&self) -> Result<Vec<Document>>;

    /// Records whose top-level `field` equals `value`.
    async fn find_profiles(&self, field: &str, value: &Value) -> Result<Vec<Document>>;

    /// Live query over the whole directory.
    fn subscribe_profiles(&self) -> Result<SnapshotStream>;
}

/// Append-only message logs partitioned by conversation key, plus the
/// per-conversation summary records.
#[async_trait]
pub trait MessageLogStore: Send + Sync {
    /// Append a message; returns the store-assigned document id.
    async fn append_message(&self, key: &ConversationKey, fields: WriteFields) -> Result<String>;

    /// The log ordered by server timestamp ascending, unresolved last.
    async fn list_messages(&self, key: &ConversationKey) -> Result<Vec<Document>>;

    /// Live query over one log, in the same order as [`Self::list_messages`].
    fn subscribe_messages(&self, key: &ConversationKey) -> Result<SnapshotStream>;

    async fn get_thread(&self, key: &ConversationKey) -> Result<Option<Document>>;

    /// Create or overwrite a summary.
    async fn set_thread(&self, key: &ConversationKey, fields: WriteFields) -> Result<()>;

    /// Merge into an existing summary; [`StoreError::NotFound`] if absent.
    async fn update_thread(&self, key: &ConversationKey, fields: WriteFields) -> Result<()>;

    /// Summaries whose `participants` array contains `participant`.
    async fn list_threads_for(&self, participant: &ParticipantId) -> Result<Vec<Document>>;
}

/// Supplies the signed-in principal.
pub trait IdentityProvider: Send + Sync {
    fn current_principal(&self) -> Option<Principal>;

    /// Changes on sign-in and sign-out.
    fn watch_principal(&self) -> watch::Receiver<Option<Principal>>;
}

/// Push-notification token, attached to directory upserts when available.
#[async_trait]
pub trait PushTokenSource: Send + Sync {
    async fn token(&self) -> Option<String>;
}
