use serde::{Deserialize, Serialize};

use crate::constants::{CONVERSATION_KEY_DELIMITER, FALLBACK_DISPLAY_NAME};
use crate::error::AddressError;

/// Stable participant identifier as issued by the identity provider.
///
/// Never empty and never contains [`CONVERSATION_KEY_DELIMITER`], so two
/// ids can always be joined into an unambiguous [`ConversationKey`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        if raw.is_empty() {
            return Err(AddressError::InvalidIdentifier(
                "identifier is empty".to_string(),
            ));
        }
        if raw.contains(CONVERSATION_KEY_DELIMITER) {
            return Err(AddressError::InvalidIdentifier(format!(
                "identifier {raw:?} contains the reserved delimiter {CONVERSATION_KEY_DELIMITER:?}"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for log lines.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ParticipantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ParticipantId {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ParticipantId> for String {
    fn from(id: ParticipantId) -> Self {
        id.0
    }
}

/// Identity of the one-to-one thread between two participants.
///
/// Built from the sorted pair of ids, so either side computes the same key
/// without a lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct ConversationKey(String);

impl ConversationKey {
    pub fn derive(a: &ParticipantId, b: &ParticipantId) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("{low}{CONVERSATION_KEY_DELIMITER}{high}"))
    }

    /// Parse a key read back from storage.
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        let (a, b) = raw
            .split_once(CONVERSATION_KEY_DELIMITER)
            .ok_or_else(|| AddressError::InvalidKey(format!("{raw:?} has no delimiter")))?;
        let a = ParticipantId::parse(a).map_err(|e| AddressError::InvalidKey(e.to_string()))?;
        let b = ParticipantId::parse(b).map_err(|e| AddressError::InvalidKey(e.to_string()))?;
        if a > b {
            return Err(AddressError::InvalidKey(format!("{raw:?} is not sorted")));
        }
        Ok(Self::derive(&a, &b))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The two participants, in key (sorted) order.
    pub fn participants(&self) -> (ParticipantId, ParticipantId) {
        let (a, b) = self
            .0
            .split_once(CONVERSATION_KEY_DELIMITER)
            .unwrap_or((self.0.as_str(), ""));
        (ParticipantId(a.to_string()), ParticipantId(b.to_string()))
    }

    pub fn includes(&self, id: &ParticipantId) -> bool {
        let (a, b) = self.participants();
        a == *id || b == *id
    }

    /// The participant on the other side of the conversation from `me`.
    pub fn counterpart(&self, me: &ParticipantId) -> Option<ParticipantId> {
        let (a, b) = self.participants();
        if a == *me {
            Some(b)
        } else if b == *me {
            Some(a)
        } else {
            None
        }
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ConversationKey {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ConversationKey> for String {
    fn from(key: ConversationKey) -> Self {
        key.0
    }
}

/// Name shown for a participant: the display name, else the local part of
/// the email, else `fallback`.
pub fn display_name_or(display_name: Option<&str>, email: Option<&str>, fallback: &str) -> String {
    if let Some(name) = display_name.filter(|n| !n.is_empty()) {
        return name.to_string();
    }
    if let Some(local) = email
        .and_then(|e| e.split('@').next())
        .filter(|l| !l.is_empty())
    {
        return local.to_string();
    }
    fallback.to_string()
}

/// [`display_name_or`] with the message-snapshot fallback.
pub fn snapshot_name(display_name: Option<&str>, email: Option<&str>) -> String {
    display_name_or(display_name, email, FALLBACK_DISPLAY_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_participant_id_rejects_empty_and_delimiter() {
        assert!(ParticipantId::parse("").is_err());
        assert!(ParticipantId::parse("a_b").is_err());
        assert_eq!(ParticipantId::parse("u1").unwrap().as_str(), "u1");
    }

    #[test]
    fn test_short_is_char_safe() {
        let id = ParticipantId::parse("ééééééééééé").unwrap();
        assert_eq!(id.short().chars().count(), 8);
        assert_eq!(ParticipantId::parse("abc").unwrap().short(), "abc");
    }

    #[test]
    fn test_key_parse_round_trip() {
        let a = ParticipantId::parse("alice").unwrap();
        let b = ParticipantId::parse("bob").unwrap();
        let key = ConversationKey::derive(&b, &a);
        assert_eq!(key.as_str(), "alice_bob");
        assert_eq!(ConversationKey::parse("alice_bob").unwrap(), key);
        assert!(ConversationKey::parse("bob_alice").is_err());
        assert!(ConversationKey::parse("alice").is_err());
        assert!(ConversationKey::parse("_bob").is_err());
    }

    #[test]
    fn test_counterpart() {
        let a = ParticipantId::parse("alice").unwrap();
        let b = ParticipantId::parse("bob").unwrap();
        let c = ParticipantId::parse("carol").unwrap();
        let key = ConversationKey::derive(&a, &b);
        assert_eq!(key.counterpart(&a), Some(b.clone()));
        assert_eq!(key.counterpart(&b), Some(a));
        assert_eq!(key.counterpart(&c), None);
        assert!(!key.includes(&c));
    }

    #[test]
    fn test_display_name_fallbacks() {
        assert_eq!(snapshot_name(Some("Ada"), Some("ada@x.io")), "Ada");
        assert_eq!(snapshot_name(Some(""), Some("ada@x.io")), "ada");
        assert_eq!(snapshot_name(None, None), "Unknown");
        assert_eq!(display_name_or(None, Some("@x.io"), "Unknown User"), "Unknown User");
    }

    #[test]
    fn test_serde_validates_ids() {
        let ok: ParticipantId = serde_json::from_str("\"u1\"").unwrap();
        assert_eq!(ok.as_str(), "u1");
        assert!(serde_json::from_str::<ParticipantId>("\"\"").is_err());
    }
}
