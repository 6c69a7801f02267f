//! Live, ordered view of one conversation's message log.
//!
//! Every snapshot is rebuilt into a fresh sequence; nothing is patched
//! incrementally, so cost grows with the length of the log.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use tandem_shared::ConversationKey;
use tandem_store::{Document, Message, MessageLogStore, SnapshotResult};

use crate::error::ClientError;
use crate::subscription::Subscription;

/// One delivery from [`watch_thread`].  On a subscription failure
/// `messages` is empty and `error` says why.
#[derive(Debug)]
pub struct ThreadUpdate {
    pub messages: Vec<Message>,
    pub error: Option<ClientError>,
}

/// Validate and order a log snapshot.
///
/// Messages whose server timestamp is still unresolved are placed at
/// `now`.  Order is by effective instant, ties keep snapshot order.
pub fn order_messages(documents: &[Document], now: DateTime<Utc>) -> Vec<Message> {
    let mut messages: Vec<Message> = documents
        .iter()
        .filter_map(|doc| match Message::from_document(doc, now) {
            Ok(message) => Some(message),
            Err(reason) => {
                warn!(doc_id = %doc.id, %reason, "dropping malformed message");
                None
            }
        })
        .collect();
    messages.sort_by_key(|m| m.time.instant());
    messages
}

/// Open a live query over the log for `key`.
///
/// Must be called from within a tokio runtime.
pub fn watch_thread<F>(store: &dyn MessageLogStore, key: &ConversationKey, mut on_update: F) -> Subscription
where
    F: FnMut(ThreadUpdate) + Send + 'static,
{
    let topic = key.clone();
    let handler = move |item: SnapshotResult| match item {
        Ok(snapshot) => {
            let messages = order_messages(&snapshot.documents, Utc::now());
            debug!(
                key = %topic,
                count = messages.len(),
                pending = messages.iter().filter(|m| m.time.is_pending()).count(),
                "thread snapshot"
            );
            on_update(ThreadUpdate {
                messages,
                error: None,
            });
        }
        Err(e) => {
            warn!(key = %topic, error = %e, "thread subscription failed");
            on_update(ThreadUpdate {
                messages: Vec::new(),
                error: Some(ClientError::Subscription(e)),
            });
        }
    };

    match store.subscribe_messages(key) {
        Ok(stream) => Subscription::listen(stream, handler),
        Err(e) => Subscription::failed(e, handler),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::{json, Value};
    use tandem_store::document::format_timestamp;
    use tandem_store::MessageTime;

    fn doc(id: &str, body: Value) -> Document {
        Document::new(id, body.as_object().cloned().unwrap_or_default())
    }

    fn at(base: DateTime<Utc>, secs: i64) -> String {
        format_timestamp(base + Duration::seconds(secs))
    }

    #[test]
    fn test_orders_by_timestamp() {
        let base = Utc::now() - Duration::hours(1);
        let docs = vec![
            doc("m3", json!({"text": "3", "senderId": "u1", "timestamp": at(base, 3)})),
            doc("m1", json!({"text": "1", "senderId": "u1", "timestamp": at(base, 1)})),
            doc("m2", json!({"text": "2", "senderId": "u2", "timestamp": at(base, 2)})),
        ];
        let texts: Vec<String> = order_messages(&docs, Utc::now())
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, ["1", "2", "3"]);
    }

    #[test]
    fn test_ties_keep_snapshot_order() {
        let base = Utc::now();
        let docs = vec![
            doc("b", json!({"text": "b", "senderId": "u1", "timestamp": at(base, 0)})),
            doc("a", json!({"text": "a", "senderId": "u2", "timestamp": at(base, 0)})),
        ];
        let ids: Vec<String> = order_messages(&docs, base).into_iter().map(|m| m.id).collect();
        assert_eq!(ids, ["b", "a"]);
    }

    #[test]
    fn test_pending_uses_placeholder_and_drops_malformed() {
        let now = Utc::now();
        let docs = vec![
            doc("p", json!({"text": "pending", "senderId": "u1", "timestamp": null})),
            doc("old", json!({"text": "old", "senderId": "u2", "timestamp": at(now, -60)})),
            doc("bad", json!({"senderId": "u2"})),
        ];
        let messages = order_messages(&docs, now);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, "old");
        assert_eq!(messages[1].time, MessageTime::Pending(now));
    }
}
