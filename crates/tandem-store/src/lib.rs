//! # tandem-store
//!
//! The backing store seen from the client: collaborator traits for the
//! remote directory, the per-conversation message log and the identity
//! provider, plus the strict record shapes every store read is validated
//! into.
//!
//! Two backends implement the store traits.  [`MemoryBackend`] keeps
//! everything in process and can simulate unresolved server timestamps
//! and remote failures.  [`Database`] persists to SQLite through
//! `rusqlite`.  Both push a full [`Snapshot`] to every live subscriber
//! after each write.

pub mod backend;
pub mod database;
pub mod directory;
pub mod document;
pub mod hub;
pub mod identity;
pub mod memory;
pub mod messages;
pub mod migrations;
pub mod models;

mod error;

pub use backend::{
    DirectoryStore, IdentityProvider, MessageLogStore, PushTokenSource, Snapshot, SnapshotResult,
    SnapshotStream,
};
pub use database::Database;
pub use document::{Document, FieldValue, Fields, ServerClock, SetMode, WriteFields};
pub use error::{Result, StoreError};
pub use identity::{LocalIdentity, NoPushToken, StaticPushToken};
pub use memory::MemoryBackend;
pub use models::*;
