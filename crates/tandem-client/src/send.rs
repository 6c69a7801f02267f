//! Two-step send: append to the log, then upsert the thread summary.
//!
//! The steps are not atomic.  If the summary step fails the message stays
//! in the log, and the next successful send rewrites the summary.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, info, warn};

use tandem_shared::constants::fields;
use tandem_shared::types::display_name_or;
use tandem_shared::ConversationKey;
use tandem_store::{FieldValue, MessageLogStore, Participant, Principal, WriteFields};

use crate::config::ClientConfig;
use crate::error::{ClientError, SendStage};

/// Outcome of a send that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendReceipt {
    /// The body was blank; nothing was written.
    Skipped,
    Sent {
        message_id: String,
        /// Whether this send created the thread summary.
        created_thread: bool,
    },
}

impl SendReceipt {
    pub fn message_id(&self) -> Option<&str> {
        match self {
            Self::Skipped => None,
            Self::Sent { message_id, .. } => Some(message_id),
        }
    }
}

/// Send `body` from `sender` to `recipient` in the conversation `key`.
pub async fn send_message(
    store: &dyn MessageLogStore,
    key: &ConversationKey,
    sender: &Principal,
    recipient: &Participant,
    body: &str,
    config: &ClientConfig,
) -> Result<SendReceipt, ClientError> {
    send_message_then(store, key, sender, recipient, body, config, |_| {}).await
}

/// [`send_message`], calling `on_appended` with the message id as soon as
/// the log append succeeds and before the summary step starts.
pub(crate) async fn send_message_then(
    store: &dyn MessageLogStore,
    key: &ConversationKey,
    sender: &Principal,
    recipient: &Participant,
    body: &str,
    config: &ClientConfig,
    on_appended: impl FnOnce(&str),
) -> Result<SendReceipt, ClientError> {
    let text = body.trim();
    if text.is_empty() {
        debug!(key = %key, "blank message, nothing to send");
        return Ok(SendReceipt::Skipped);
    }

    let len = text.chars().count();
    if len > config.max_message_chars {
        return Err(ClientError::MessageTooLong {
            len,
            max: config.max_message_chars,
        });
    }

    if ConversationKey::derive(&sender.uid, &recipient.id) != *key {
        return Err(ClientError::InvalidRecipient(format!(
            "{} is not a participant of {key}",
            recipient.id
        )));
    }

    let sender_name = display_name_or(
        sender.display_name.as_deref(),
        sender.email.as_deref(),
        &config.fallback_name,
    );
    let recipient_name = display_name_or(
        Some(recipient.display_name.as_str()),
        recipient.email.as_deref(),
        &config.fallback_name,
    );

    let mut message = WriteFields::new();
    message.insert(fields::TEXT.into(), text.into());
    message.insert(fields::SENDER_ID.into(), sender.uid.as_str().into());
    message.insert(fields::SENDER_NAME.into(), sender_name.clone().into());
    message.insert(fields::TIMESTAMP.into(), FieldValue::ServerTimestamp);
    message.insert(fields::READ.into(), false.into());

    let message_id = store
        .append_message(key, message)
        .await
        .map_err(|source| {
            warn!(key = %key, error = %source, "message append failed");
            ClientError::Send {
                stage: SendStage::Append,
                message_id: None,
                source,
            }
        })?;
    on_appended(&message_id);

    let mut names = BTreeMap::new();
    names.insert(sender.uid.to_string(), Value::String(sender_name));
    names.insert(recipient.id.to_string(), Value::String(recipient_name));

    let mut last_message = WriteFields::new();
    last_message.insert(fields::TEXT.into(), text.into());
    last_message.insert(fields::SENDER_ID.into(), sender.uid.as_str().into());
    last_message.insert(fields::TIMESTAMP.into(), FieldValue::ServerTimestamp);

    let mut summary = WriteFields::new();
    summary.insert(
        fields::PARTICIPANTS.into(),
        vec![sender.uid.to_string(), recipient.id.to_string()].into(),
    );
    summary.insert(
        fields::PARTICIPANT_NAMES.into(),
        FieldValue::Value(Value::Object(names.into_iter().collect())),
    );
    summary.insert(fields::LAST_MESSAGE.into(), last_message.into());
    summary.insert(fields::UPDATED_AT.into(), FieldValue::ServerTimestamp);

    let created_thread = upsert_summary(store, key, summary)
        .await
        .map_err(|source| {
            warn!(
                key = %key,
                message_id = %message_id,
                error = %source,
                "thread summary update failed after append"
            );
            ClientError::Send {
                stage: SendStage::Summary,
                message_id: Some(message_id.clone()),
                source,
            }
        })?;

    info!(
        key = %key,
        message_id = %message_id,
        sender = %sender.uid.short(),
        created_thread,
        "message sent"
    );

    Ok(SendReceipt::Sent {
        message_id,
        created_thread,
    })
}

/// Create the summary with `createdAt`, or merge into the existing one.
/// Returns whether it was created.
async fn upsert_summary(
    store: &dyn MessageLogStore,
    key: &ConversationKey,
    mut summary: WriteFields,
) -> tandem_store::Result<bool> {
    if store.get_thread(key).await?.is_some() {
        store.update_thread(key, summary).await?;
        Ok(false)
    } else {
        summary.insert(fields::CREATED_AT.into(), FieldValue::ServerTimestamp);
        store.set_thread(key, summary).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_shared::ParticipantId;
    use tandem_store::MemoryBackend;

    fn principal(uid: &str) -> Principal {
        let mut p = Principal::new(ParticipantId::parse(uid).unwrap());
        p.display_name = Some(uid.to_uppercase());
        p
    }

    fn participant(uid: &str) -> Participant {
        principal(uid).as_participant()
    }

    #[tokio::test]
    async fn test_blank_body_writes_nothing() {
        let store = MemoryBackend::new();
        let key = ConversationKey::derive(&principal("u1").uid, &participant("u2").id);
        let receipt = send_message(
            &store,
            &key,
            &principal("u1"),
            &participant("u2"),
            " \n\t ",
            &ClientConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(receipt, SendReceipt::Skipped);
        assert_eq!(store.message_count(&key), 0);
        assert!(store.get_thread(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_too_long_is_rejected() {
        let store = MemoryBackend::new();
        let config = ClientConfig {
            max_message_chars: 3,
            ..ClientConfig::default()
        };
        let key = ConversationKey::derive(&principal("u1").uid, &participant("u2").id);
        let err = send_message(&store, &key, &principal("u1"), &participant("u2"), "hello", &config)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::MessageTooLong { len: 5, max: 3 }));
        assert_eq!(store.message_count(&key), 0);
    }

    #[tokio::test]
    async fn test_wrong_key_is_rejected() {
        let store = MemoryBackend::new();
        let key = ConversationKey::derive(&principal("u1").uid, &participant("u3").id);
        let err = send_message(
            &store,
            &key,
            &principal("u1"),
            &participant("u2"),
            "hi",
            &ClientConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ClientError::InvalidRecipient(_)));
    }

    #[tokio::test]
    async fn test_summary_failure_reports_message_id() {
        let store = MemoryBackend::new();
        let key = ConversationKey::derive(&principal("u1").uid, &participant("u2").id);
        store.fail_next_thread_write("quota exceeded");

        let err = send_message(
            &store,
            &key,
            &principal("u1"),
            &participant("u2"),
            "hi",
            &ClientConfig::default(),
        )
        .await
        .unwrap_err();
        match err {
            ClientError::Send {
                stage: SendStage::Summary,
                message_id: Some(_),
                ..
            } => {}
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(store.message_count(&key), 1);
    }
}
