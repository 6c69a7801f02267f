//! Strict record shapes.
//!
//! The store enforces no schema, so every read goes through one of the
//! `from_document` constructors here before it reaches the rest of the
//! client.  Malformed documents are rejected with a [`RecordError`]
//! naming the first problem found.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use tandem_shared::constants::fields;
use tandem_shared::types::snapshot_name;
use tandem_shared::{ConversationKey, ParticipantId};

use crate::document::{parse_timestamp, Document};

/// Why a document was rejected at the read boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("missing or empty field `{0}`")]
    MissingField(&'static str),

    #[error("invalid identifier in `{field}`: {reason}")]
    InvalidIdentifier { field: &'static str, reason: String },

    #[error("invalid conversation key {0:?}")]
    InvalidKey(String),
}

/// Non-empty, non-blank string field.
fn text(doc: &Document, name: &str) -> Option<String> {
    doc.str_field(name)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

fn participant_id(doc: &Document, name: &'static str) -> Result<ParticipantId, RecordError> {
    let raw = doc.str_field(name).unwrap_or_default();
    if raw.is_empty() {
        return Err(RecordError::MissingField(name));
    }
    ParticipantId::parse(raw).map_err(|e| RecordError::InvalidIdentifier {
        field: name,
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

/// A directory record as stored: any field may be missing or blank.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryRecord {
    pub doc_id: String,
    pub uid: Option<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub photo_url: Option<String>,
    pub fcm_token: Option<String>,
    pub phone_verified: bool,
    pub providers: Vec<String>,
}

impl DirectoryRecord {
    /// Lenient read: fields of the wrong type count as missing.
    pub fn from_document(doc: &Document) -> Self {
        let providers = doc
            .get(fields::PROVIDERS)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            doc_id: doc.id.clone(),
            uid: text(doc, fields::UID),
            display_name: text(doc, fields::DISPLAY_NAME),
            email: text(doc, fields::EMAIL),
            phone_number: text(doc, fields::PHONE_NUMBER),
            photo_url: text(doc, fields::PHOTO_URL),
            fcm_token: text(doc, fields::FCM_TOKEN),
            phone_verified: doc.bool_field(fields::PHONE_VERIFIED).unwrap_or(false),
            providers,
        }
    }
}

/// A directory entry that passed admission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: ParticipantId,
    pub display_name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub photo_url: Option<String>,
}

impl TryFrom<DirectoryRecord> for Participant {
    type Error = RecordError;

    /// Admission: a usable uid, a display name, and at least one contact
    /// field (email or phone).
    fn try_from(record: DirectoryRecord) -> Result<Self, Self::Error> {
        let uid = record.uid.ok_or(RecordError::MissingField(fields::UID))?;
        let id = ParticipantId::parse(&uid).map_err(|e| RecordError::InvalidIdentifier {
            field: fields::UID,
            reason: e.to_string(),
        })?;
        let display_name = record
            .display_name
            .ok_or(RecordError::MissingField(fields::DISPLAY_NAME))?;
        if record.email.is_none() && record.phone_number.is_none() {
            return Err(RecordError::MissingField(fields::EMAIL));
        }

        Ok(Self {
            id,
            display_name,
            email: record.email,
            phone_number: record.phone_number,
            photo_url: record.photo_url,
        })
    }
}

/// The signed-in user, as the identity provider reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub uid: ParticipantId,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub photo_url: Option<String>,
    /// Linked credential providers, e.g. `google.com`, `phone`.
    pub providers: Vec<String>,
}

impl Principal {
    pub fn new(uid: ParticipantId) -> Self {
        Self {
            uid,
            display_name: None,
            email: None,
            phone_number: None,
            photo_url: None,
            providers: Vec::new(),
        }
    }

    /// Name to stamp on outgoing messages and summaries.
    pub fn snapshot_name(&self) -> String {
        snapshot_name(self.display_name.as_deref(), self.email.as_deref())
    }

    /// This principal as a conversation participant.
    pub fn as_participant(&self) -> Participant {
        Participant {
            id: self.uid.clone(),
            display_name: self.snapshot_name(),
            email: self.email.clone(),
            phone_number: self.phone_number.clone(),
            photo_url: self.photo_url.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// When a message happened.  A message the server has not stamped yet
/// carries a local placeholder used only for ordering and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "at", rename_all = "camelCase")]
pub enum MessageTime {
    Pending(DateTime<Utc>),
    Resolved(DateTime<Utc>),
}

impl MessageTime {
    pub fn instant(&self) -> DateTime<Utc> {
        match self {
            Self::Pending(t) | Self::Resolved(t) => *t,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }
}

/// One message in a conversation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub text: String,
    pub sender_id: ParticipantId,
    pub sender_name: String,
    pub time: MessageTime,
    pub read: bool,
}

impl Message {
    /// Validate a log document.  An unresolved or unreadable timestamp
    /// becomes `Pending(placeholder)`.
    pub fn from_document(doc: &Document, placeholder: DateTime<Utc>) -> Result<Self, RecordError> {
        let text = doc
            .str_field(fields::TEXT)
            .filter(|t| !t.is_empty())
            .ok_or(RecordError::MissingField(fields::TEXT))?
            .to_string();
        let sender_id = participant_id(doc, fields::SENDER_ID)?;
        let sender_name = doc
            .str_field(fields::SENDER_NAME)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| snapshot_name(None, None));
        let time = match doc.timestamp_field(fields::TIMESTAMP) {
            Some(t) => MessageTime::Resolved(t),
            None => MessageTime::Pending(placeholder),
        };

        Ok(Self {
            id: doc.id.clone(),
            text,
            sender_id,
            sender_name,
            time,
            read: doc.bool_field(fields::READ).unwrap_or(false),
        })
    }
}

// ---------------------------------------------------------------------------
// Thread summary
// ---------------------------------------------------------------------------

/// Preview of the latest message in a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub text: String,
    pub sender_id: ParticipantId,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Denormalised cache describing a conversation, used only for listing.
/// The message log stays authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadSummary {
    pub key: ConversationKey,
    pub participants: Vec<ParticipantId>,
    /// Display-name snapshot per participant id.
    pub participant_names: BTreeMap<String, String>,
    pub last_message: Option<LastMessage>,
    pub updated_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

impl ThreadSummary {
    pub fn from_document(doc: &Document) -> Result<Self, RecordError> {
        let key = ConversationKey::parse(&doc.id).map_err(|_| RecordError::InvalidKey(doc.id.clone()))?;

        let participants: Vec<ParticipantId> = doc
            .get(fields::PARTICIPANTS)
            .and_then(Value::as_array)
            .ok_or(RecordError::MissingField(fields::PARTICIPANTS))?
            .iter()
            .filter_map(Value::as_str)
            .filter_map(|raw| ParticipantId::parse(raw).ok())
            .collect();
        if participants.is_empty() {
            return Err(RecordError::MissingField(fields::PARTICIPANTS));
        }

        let participant_names = doc
            .get(fields::PARTICIPANT_NAMES)
            .and_then(Value::as_object)
            .map(|names| {
                names
                    .iter()
                    .filter_map(|(id, name)| name.as_str().map(|n| (id.clone(), n.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        let last_message = doc
            .get(fields::LAST_MESSAGE)
            .and_then(Value::as_object)
            .and_then(|last| {
                let text = last.get(fields::TEXT)?.as_str()?.to_string();
                let sender_id = ParticipantId::parse(last.get(fields::SENDER_ID)?.as_str()?).ok()?;
                let timestamp = last
                    .get(fields::TIMESTAMP)
                    .and_then(Value::as_str)
                    .and_then(parse_timestamp);
                Some(LastMessage {
                    text,
                    sender_id,
                    timestamp,
                })
            });

        Ok(Self {
            key,
            participants,
            participant_names,
            last_message,
            updated_at: doc.timestamp_field(fields::UPDATED_AT),
            created_at: doc.timestamp_field(fields::CREATED_AT),
        })
    }

    /// Snapshot name recorded for `id`, if any.
    pub fn name_of(&self, id: &ParticipantId) -> Option<&str> {
        self.participant_names.get(id.as_str()).map(String::as_str)
    }
}
