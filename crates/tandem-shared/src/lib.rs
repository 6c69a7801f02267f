//! # tandem-shared
//!
//! Identifiers, conversation addressing and constants shared by the store
//! and client crates.

pub mod addressing;
pub mod constants;
pub mod error;
pub mod types;

pub use addressing::derive_conversation_key;
pub use error::AddressError;
pub use types::{ConversationKey, ParticipantId};
