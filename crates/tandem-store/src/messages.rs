//! [`MessageLogStore`] for the SQLite backend.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use tandem_shared::constants::fields;
use tandem_shared::{ConversationKey, ParticipantId};

use crate::backend::{MessageLogStore, Snapshot, SnapshotStream};
use crate::database::{collect_documents, row_to_document, Database};
use crate::document::{apply_write, resolve_fields, Document, SetMode, WriteFields};
use crate::error::{Result, StoreError};

fn load_log(conn: &Connection, key: &ConversationKey) -> Result<Vec<Document>> {
    let mut stmt = conn.prepare(
        "SELECT id, body
         FROM messages
         WHERE conversation_key = ?1
         ORDER BY timestamp IS NULL, timestamp ASC, seq ASC",
    )?;
    let rows = stmt.query_map(params![key.as_str()], row_to_document)?;
    collect_documents(rows)
}

fn load_thread(conn: &Connection, key: &ConversationKey) -> Result<Option<Document>> {
    Ok(conn
        .query_row(
            "SELECT conversation_key, body FROM threads WHERE conversation_key = ?1",
            params![key.as_str()],
            row_to_document,
        )
        .optional()?)
}

fn store_thread(conn: &Connection, key: &ConversationKey, body: &crate::Fields) -> Result<()> {
    conn.execute(
        "INSERT INTO threads (conversation_key, body) VALUES (?1, ?2)
         ON CONFLICT(conversation_key) DO UPDATE SET body = excluded.body",
        params![key.as_str(), serde_json::to_string(body)?],
    )?;
    Ok(())
}

impl Database {
    fn publish_log(&self, conn: &Connection, key: &ConversationKey) {
        if !self.message_hub.has_subscribers(key) {
            return;
        }
        match load_log(conn, key) {
            Ok(documents) => {
                self.message_hub.publish(key, &Snapshot::new(documents));
            }
            Err(e) => {
                warn!(key = %key, error = %e, "failed to re-query message log for subscribers");
                self.message_hub.fail(key, &e.to_string());
            }
        }
    }
}

#[async_trait]
impl MessageLogStore for Database {
    async fn append_message(&self, key: &ConversationKey, write: WriteFields) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let body = resolve_fields(&write, self.clock.now());
        let timestamp = body
            .get(fields::TIMESTAMP)
            .and_then(Value::as_str)
            .map(str::to_string);

        let conn = self.conn();
        conn.execute(
            "INSERT INTO messages (id, conversation_key, timestamp, body)
             VALUES (?1, ?2, ?3, ?4)",
            params![id, key.as_str(), timestamp, serde_json::to_string(&body)?],
        )?;

        debug!(key = %key, msg_id = %id, "message appended");
        self.publish_log(&conn, key);
        Ok(id)
    }

    async fn list_messages(&self, key: &ConversationKey) -> Result<Vec<Document>> {
        load_log(&self.conn(), key)
    }

    fn subscribe_messages(&self, key: &ConversationKey) -> Result<SnapshotStream> {
        let conn = self.conn();
        let initial = load_log(&conn, key)?;
        Ok(self
            .message_hub
            .subscribe(key.clone(), Ok(Snapshot::new(initial))))
    }

    async fn get_thread(&self, key: &ConversationKey) -> Result<Option<Document>> {
        load_thread(&self.conn(), key)
    }

    async fn set_thread(&self, key: &ConversationKey, fields: WriteFields) -> Result<()> {
        let body = resolve_fields(&fields, self.clock.now());
        store_thread(&self.conn(), key, &body)
    }

    async fn update_thread(&self, key: &ConversationKey, fields: WriteFields) -> Result<()> {
        let incoming = resolve_fields(&fields, self.clock.now());

        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        let existing = load_thread(&tx, key)?.ok_or(StoreError::NotFound)?;
        let body = apply_write(Some(existing.fields), incoming, SetMode::Merge);
        store_thread(&tx, key, &body)?;
        tx.commit()?;
        Ok(())
    }

    async fn list_threads_for(&self, participant: &ParticipantId) -> Result<Vec<Document>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT conversation_key, body
             FROM threads
             WHERE EXISTS (
                 SELECT 1 FROM json_each(threads.body, '$.participants')
                 WHERE json_each.value = ?1
             )
             ORDER BY conversation_key ASC",
        )?;
        let rows = stmt.query_map(params![participant.as_str()], row_to_document)?;
        collect_documents(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::FieldValue;
    use serde_json::json;

    fn key() -> ConversationKey {
        tandem_shared::derive_conversation_key("u1", "u2").unwrap()
    }

    fn message(text: &str, timestamp: FieldValue) -> WriteFields {
        let mut f = WriteFields::new();
        f.insert(fields::TEXT.into(), text.into());
        f.insert(fields::SENDER_ID.into(), "u1".into());
        f.insert(fields::TIMESTAMP.into(), timestamp);
        f
    }

    #[tokio::test]
    async fn test_log_is_ordered_by_timestamp_then_insertion() {
        let db = Database::open_in_memory().unwrap();
        let at = |s: &str| FieldValue::Value(json!(s));
        db.append_message(&key(), message("late", at("2026-01-01T00:00:03.000000Z")))
            .await
            .unwrap();
        db.append_message(&key(), message("early", at("2026-01-01T00:00:01.000000Z")))
            .await
            .unwrap();
        db.append_message(&key(), message("tie", at("2026-01-01T00:00:03.000000Z")))
            .await
            .unwrap();
        db.append_message(&key(), message("unstamped", FieldValue::Value(Value::Null)))
            .await
            .unwrap();

        let texts: Vec<String> = db
            .list_messages(&key())
            .await
            .unwrap()
            .iter()
            .map(|d| d.str_field("text").unwrap().to_string())
            .collect();
        assert_eq!(texts, vec!["early", "late", "tie", "unstamped"]);
    }

    #[tokio::test]
    async fn test_server_timestamp_is_resolved_on_append() {
        let db = Database::open_in_memory().unwrap();
        db.append_message(&key(), message("hi", FieldValue::ServerTimestamp))
            .await
            .unwrap();
        let docs = db.list_messages(&key()).await.unwrap();
        assert!(docs[0].timestamp_field("timestamp").is_some());
    }

    #[tokio::test]
    async fn test_subscription_receives_appends() {
        let db = Database::open_in_memory().unwrap();
        let mut rx = db.subscribe_messages(&key()).unwrap();
        assert!(rx.recv().await.unwrap().unwrap().is_empty());

        db.append_message(&key(), message("hi", FieldValue::ServerTimestamp))
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap().unwrap().len(), 1);

        drop(rx);
        db.append_message(&key(), message("again", FieldValue::ServerTimestamp))
            .await
            .unwrap();
        assert_eq!(db.message_hub.subscriber_count(&key()), 0);
    }

    #[tokio::test]
    async fn test_thread_set_update_and_list() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.update_thread(&key(), WriteFields::new()).await,
            Err(StoreError::NotFound)
        ));

        let mut created = WriteFields::new();
        created.insert(
            fields::PARTICIPANTS.into(),
            vec!["u1".to_string(), "u2".to_string()].into(),
        );
        created.insert(fields::CREATED_AT.into(), FieldValue::ServerTimestamp);
        db.set_thread(&key(), created).await.unwrap();

        let mut update = WriteFields::new();
        update.insert(fields::UPDATED_AT.into(), FieldValue::ServerTimestamp);
        db.update_thread(&key(), update).await.unwrap();

        let doc = db.get_thread(&key()).await.unwrap().unwrap();
        assert!(doc.timestamp_field("createdAt").is_some());
        assert!(doc.timestamp_field("updatedAt").is_some());

        let u2 = ParticipantId::parse("u2").unwrap();
        let u9 = ParticipantId::parse("u9").unwrap();
        assert_eq!(db.list_threads_for(&u2).await.unwrap().len(), 1);
        assert!(db.list_threads_for(&u9).await.unwrap().is_empty());
    }
}
