//! Conversation list built from thread summaries.
//!
//! Summaries are a cache.  A preview can lag behind the log when a send's
//! summary step failed, and opening the conversation always reads the log.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use tandem_shared::{ConversationKey, ParticipantId};
use tandem_store::{LastMessage, MessageLogStore, ThreadSummary};

use crate::error::ClientError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationPreview {
    pub key: ConversationKey,
    pub counterpart: ParticipantId,
    pub counterpart_name: String,
    pub last_message: Option<LastMessage>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ConversationPreview {
    fn from_summary(summary: ThreadSummary, me: &ParticipantId, fallback_name: &str) -> Option<Self> {
        let counterpart = summary.key.counterpart(me)?;
        let counterpart_name = summary
            .name_of(&counterpart)
            .filter(|n| !n.is_empty())
            .unwrap_or(fallback_name)
            .to_string();
        Some(Self {
            key: summary.key,
            counterpart,
            counterpart_name,
            last_message: summary.last_message,
            updated_at: summary.updated_at,
        })
    }
}

/// Conversations `me` takes part in, most recently updated first.
pub async fn list_conversations(
    store: &dyn MessageLogStore,
    me: &ParticipantId,
    fallback_name: &str,
) -> Result<Vec<ConversationPreview>, ClientError> {
    let documents = store.list_threads_for(me).await?;

    let mut previews: Vec<ConversationPreview> = documents
        .iter()
        .filter_map(|doc| match ThreadSummary::from_document(doc) {
            Ok(summary) => ConversationPreview::from_summary(summary, me, fallback_name),
            Err(reason) => {
                warn!(doc_id = %doc.id, %reason, "dropping malformed thread summary");
                None
            }
        })
        .collect();

    // `None` sorts before `Some`, so reversing puts undated threads last.
    previews.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

    debug!(uid = %me.short(), count = previews.len(), "listed conversations");
    Ok(previews)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tandem_store::{FieldValue, WriteFields};

    fn summary(a: &str, b: &str, names: serde_json::Value, updated: Option<&str>) -> WriteFields {
        let mut f = WriteFields::new();
        f.insert("participants".into(), vec![a.to_string(), b.to_string()].into());
        f.insert("participantNames".into(), FieldValue::Value(names));
        if let Some(at) = updated {
            f.insert("updatedAt".into(), at.into());
        }
        f
    }

    #[tokio::test]
    async fn test_newest_first_with_counterpart_names() {
        let store = tandem_store::MemoryBackend::new();
        let me = ParticipantId::parse("me").unwrap();

        let k1 = tandem_shared::derive_conversation_key("me", "ann").unwrap();
        let k2 = tandem_shared::derive_conversation_key("bob", "me").unwrap();
        let k3 = tandem_shared::derive_conversation_key("cy", "me").unwrap();
        store
            .set_thread(&k1, summary("me", "ann", json!({"ann": "Ann"}), Some("2026-01-01T00:00:00.000000Z")))
            .await
            .unwrap();
        store
            .set_thread(&k2, summary("bob", "me", json!({"bob": "Bob"}), Some("2026-02-01T00:00:00.000000Z")))
            .await
            .unwrap();
        store
            .set_thread(&k3, summary("me", "cy", json!({}), None))
            .await
            .unwrap();

        let previews = list_conversations(&store, &me, "Unknown").await.unwrap();
        let names: Vec<&str> = previews.iter().map(|p| p.counterpart_name.as_str()).collect();
        assert_eq!(names, ["Bob", "Ann", "Unknown"]);
        assert_eq!(previews[0].counterpart.as_str(), "bob");
    }
}
