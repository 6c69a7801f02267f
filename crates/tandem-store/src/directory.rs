//! [`DirectoryStore`] for the SQLite backend.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tracing::{debug, warn};

use crate::backend::{DirectoryStore, Snapshot, SnapshotStream};
use crate::database::{collect_documents, row_to_document, Database};
use crate::document::{apply_write, resolve_fields, Document, SetMode, WriteFields};
use crate::error::Result;

fn load_profile(conn: &Connection, id: &str) -> Result<Option<Document>> {
    Ok(conn
        .query_row(
            "SELECT doc_id, body FROM profiles WHERE doc_id = ?1",
            params![id],
            row_to_document,
        )
        .optional()?)
}

fn load_all_profiles(conn: &Connection) -> Result<Vec<Document>> {
    let mut stmt = conn.prepare("SELECT doc_id, body FROM profiles ORDER BY doc_id ASC")?;
    let rows = stmt.query_map([], row_to_document)?;
    collect_documents(rows)
}

impl Database {
    fn publish_directory(&self, conn: &Connection) {
        if !self.directory_hub.has_subscribers(&()) {
            return;
        }
        match load_all_profiles(conn) {
            Ok(documents) => {
                self.directory_hub.publish(&(), &Snapshot::new(documents));
            }
            Err(e) => {
                warn!(error = %e, "failed to re-query directory for subscribers");
                self.directory_hub.fail(&(), &e.to_string());
            }
        }
    }
}

#[async_trait]
impl DirectoryStore for Database {
    async fn get_profile(&self, id: &str) -> Result<Option<Document>> {
        load_profile(&self.conn(), id)
    }

    async fn set_profile(&self, id: &str, fields: WriteFields, mode: SetMode) -> Result<()> {
        let incoming = resolve_fields(&fields, self.clock.now());

        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        let existing = load_profile(&tx, id)?.map(|doc| doc.fields);
        let body = apply_write(existing, incoming, mode);
        tx.execute(
            "INSERT INTO profiles (doc_id, body) VALUES (?1, ?2)
             ON CONFLICT(doc_id) DO UPDATE SET body = excluded.body",
            params![id, serde_json::to_string(&body)?],
        )?;
        tx.commit()?;

        debug!(id, ?mode, "profile written");
        self.publish_directory(&conn);
        Ok(())
    }

    async fn delete_profile(&self, id: &str) -> Result<bool> {
        let conn = self.conn();
        let affected = conn.execute("DELETE FROM profiles WHERE doc_id = ?1", params![id])?;
        if affected > 0 {
            self.publish_directory(&conn);
        }
        Ok(affected > 0)
    }

    async fn list_profiles(&self) -> Result<Vec<Document>> {
        load_all_profiles(&self.conn())
    }

    async fn find_profiles(&self, field: &str, value: &Value) -> Result<Vec<Document>> {
        Ok(load_all_profiles(&self.conn())?
            .into_iter()
            .filter(|doc| doc.get(field) == Some(value))
            .collect())
    }

    fn subscribe_profiles(&self) -> Result<SnapshotStream> {
        let conn = self.conn();
        let initial = load_all_profiles(&conn)?;
        Ok(self.directory_hub.subscribe((), Ok(Snapshot::new(initial))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::FieldValue;
    use serde_json::json;

    fn fields(pairs: &[(&str, FieldValue)]) -> WriteFields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_set_merge_and_get() {
        let db = Database::open_in_memory().unwrap();
        db.set_profile(
            "u1",
            fields(&[("uid", "u1".into()), ("email", "ada@x.io".into())]),
            SetMode::Replace,
        )
        .await
        .unwrap();
        db.set_profile(
            "u1",
            fields(&[("displayName", "Ada".into()), ("lastLogin", FieldValue::ServerTimestamp)]),
            SetMode::Merge,
        )
        .await
        .unwrap();

        let doc = db.get_profile("u1").await.unwrap().unwrap();
        assert_eq!(doc.str_field("email"), Some("ada@x.io"));
        assert_eq!(doc.str_field("displayName"), Some("Ada"));
        assert!(doc.timestamp_field("lastLogin").is_some());
    }

    #[tokio::test]
    async fn test_replace_drops_old_fields() {
        let db = Database::open_in_memory().unwrap();
        db.set_profile("u1", fields(&[("email", "a@x.io".into())]), SetMode::Replace)
            .await
            .unwrap();
        db.set_profile("u1", fields(&[("uid", "u1".into())]), SetMode::Replace)
            .await
            .unwrap();

        let doc = db.get_profile("u1").await.unwrap().unwrap();
        assert!(doc.get("email").is_none());
    }

    #[tokio::test]
    async fn test_subscription_sees_writes_and_deletes() {
        let db = Database::open_in_memory().unwrap();
        let mut rx = db.subscribe_profiles().unwrap();
        assert!(rx.recv().await.unwrap().unwrap().is_empty());

        db.set_profile("u2", fields(&[("uid", "u2".into())]), SetMode::Merge)
            .await
            .unwrap();
        db.set_profile("u1", fields(&[("uid", "u1".into())]), SetMode::Merge)
            .await
            .unwrap();
        let _ = rx.recv().await;
        let snap = rx.recv().await.unwrap().unwrap();
        let ids: Vec<_> = snap.documents.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["u1", "u2"]);

        assert!(db.delete_profile("u1").await.unwrap());
        assert_eq!(rx.recv().await.unwrap().unwrap().len(), 1);
        assert!(!db.delete_profile("u1").await.unwrap());
    }

    #[tokio::test]
    async fn test_find_profiles_by_phone() {
        let db = Database::open_in_memory().unwrap();
        db.set_profile("u1", fields(&[("phoneNumber", "+1555".into())]), SetMode::Merge)
            .await
            .unwrap();
        db.set_profile("u2", fields(&[("phoneNumber", "+1666".into())]), SetMode::Merge)
            .await
            .unwrap();

        let found = db.find_profiles("phoneNumber", &json!("+1555")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "u1");
    }
}
