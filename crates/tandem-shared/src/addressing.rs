//! Conversation addressing.
//!
//! Both participants derive the same thread location locally, so first
//! contact needs no handshake and cannot race on allocating a room.

use crate::error::AddressError;
use crate::types::{ConversationKey, ParticipantId};

/// Derive the shared conversation key for two raw identifiers.
///
/// Commutative: `derive_conversation_key(a, b) == derive_conversation_key(b, a)`.
/// Self-conversations are not rejected here.
pub fn derive_conversation_key(a: &str, b: &str) -> Result<ConversationKey, AddressError> {
    let a = ParticipantId::parse(a)?;
    let b = ParticipantId::parse(b)?;
    Ok(ConversationKey::derive(&a, &b))
}
