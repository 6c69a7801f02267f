//! The same behaviour checks run against every backend.

use std::sync::Arc;

use serde_json::json;

use tandem_shared::{derive_conversation_key, ConversationKey, ParticipantId};
use tandem_store::{
    Database, DirectoryStore, FieldValue, MemoryBackend, MessageLogStore, SetMode, StoreError,
    WriteFields,
};

trait Backend: DirectoryStore + MessageLogStore {}
impl<T: DirectoryStore + MessageLogStore> Backend for T {}

fn backends() -> Vec<(&'static str, Arc<dyn Backend>)> {
    let memory: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
    let sqlite: Arc<dyn Backend> = Arc::new(Database::open_in_memory().unwrap());
    vec![("memory", memory), ("sqlite", sqlite)]
}

fn key() -> ConversationKey {
    derive_conversation_key("alice", "bob").unwrap()
}

fn message(text: &str, sender: &str) -> WriteFields {
    let mut f = WriteFields::new();
    f.insert("text".into(), text.into());
    f.insert("senderId".into(), sender.into());
    f.insert("timestamp".into(), FieldValue::ServerTimestamp);
    f
}

#[tokio::test]
async fn messages_come_back_in_append_order_with_timestamps() {
    for (name, backend) in backends() {
        for text in ["one", "two", "three"] {
            backend.append_message(&key(), message(text, "alice")).await.unwrap();
        }
        let docs = backend.list_messages(&key()).await.unwrap();
        let texts: Vec<&str> = docs.iter().filter_map(|d| d.str_field("text")).collect();
        assert_eq!(texts, ["one", "two", "three"], "{name}");
        assert!(docs.iter().all(|d| d.timestamp_field("timestamp").is_some()), "{name}");

        let other = derive_conversation_key("alice", "carol").unwrap();
        assert!(backend.list_messages(&other).await.unwrap().is_empty(), "{name}");
    }
}

#[tokio::test]
async fn subscribers_get_current_state_then_changes() {
    for (name, backend) in backends() {
        backend.append_message(&key(), message("before", "bob")).await.unwrap();
        let mut rx = backend.subscribe_messages(&key()).unwrap();
        assert_eq!(rx.recv().await.unwrap().unwrap().len(), 1, "{name}");

        backend.append_message(&key(), message("after", "alice")).await.unwrap();
        let snap = rx.recv().await.unwrap().unwrap();
        assert_eq!(snap.len(), 2, "{name}");
        assert_eq!(snap.documents[1].str_field("text"), Some("after"), "{name}");

        let mut dir = backend.subscribe_profiles().unwrap();
        assert!(dir.recv().await.unwrap().unwrap().is_empty(), "{name}");
        let mut profile = WriteFields::new();
        profile.insert("uid".into(), "alice".into());
        backend.set_profile("alice", profile, SetMode::Replace).await.unwrap();
        assert_eq!(dir.recv().await.unwrap().unwrap().len(), 1, "{name}");
    }
}

#[tokio::test]
async fn thread_summary_set_update_and_lookup() {
    for (name, backend) in backends() {
        let mut update = WriteFields::new();
        update.insert("updatedAt".into(), FieldValue::ServerTimestamp);
        assert!(
            matches!(backend.update_thread(&key(), update.clone()).await, Err(StoreError::NotFound)),
            "{name}"
        );

        let mut summary = WriteFields::new();
        summary.insert(
            "participants".into(),
            vec!["alice".to_string(), "bob".to_string()].into(),
        );
        summary.insert("createdAt".into(), FieldValue::ServerTimestamp);
        summary.insert("updatedAt".into(), FieldValue::ServerTimestamp);
        backend.set_thread(&key(), summary).await.unwrap();
        let created = backend.get_thread(&key()).await.unwrap().unwrap();

        backend.update_thread(&key(), update).await.unwrap();
        let updated = backend.get_thread(&key()).await.unwrap().unwrap();
        assert_eq!(
            updated.timestamp_field("createdAt"),
            created.timestamp_field("createdAt"),
            "{name}"
        );
        assert!(
            updated.timestamp_field("updatedAt") > created.timestamp_field("updatedAt"),
            "{name}"
        );

        let bob = ParticipantId::parse("bob").unwrap();
        let carol = ParticipantId::parse("carol").unwrap();
        assert_eq!(backend.list_threads_for(&bob).await.unwrap().len(), 1, "{name}");
        assert!(backend.list_threads_for(&carol).await.unwrap().is_empty(), "{name}");
    }
}

#[tokio::test]
async fn profiles_merge_replace_find_and_delete() {
    for (name, backend) in backends() {
        let mut first = WriteFields::new();
        first.insert("uid".into(), "alice".into());
        first.insert("phoneNumber".into(), "+15550100".into());
        backend.set_profile("alice", first, SetMode::Replace).await.unwrap();

        let mut merge = WriteFields::new();
        merge.insert("displayName".into(), "Alice".into());
        backend.set_profile("alice", merge, SetMode::Merge).await.unwrap();

        let found = backend
            .find_profiles("phoneNumber", &json!("+15550100"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1, "{name}");
        assert_eq!(found[0].str_field("displayName"), Some("Alice"), "{name}");

        let mut replace = WriteFields::new();
        replace.insert("uid".into(), "alice".into());
        backend.set_profile("alice", replace, SetMode::Replace).await.unwrap();
        let doc = backend.get_profile("alice").await.unwrap().unwrap();
        assert!(doc.get("phoneNumber").is_none(), "{name}");

        assert!(backend.delete_profile("alice").await.unwrap(), "{name}");
        assert!(!backend.delete_profile("alice").await.unwrap(), "{name}");
        assert!(backend.list_profiles().await.unwrap().is_empty(), "{name}");
    }
}
