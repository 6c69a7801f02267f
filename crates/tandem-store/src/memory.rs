//! In-process backend.
//!
//! Behaves like the remote store closely enough to drive the client in
//! tests and demos: document-id ordered directory, ordered message logs,
//! live snapshots after every write, and a monotonic server clock.  It can
//! also hold server timestamps back (latency compensation) and fail the
//! next write or an open subscription on demand.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use tandem_shared::constants::fields;
use tandem_shared::{ConversationKey, ParticipantId};

use crate::backend::{DirectoryStore, MessageLogStore, Snapshot, SnapshotStream};
use crate::document::{
    apply_write, parse_timestamp, pending_fields, resolve_fields, Document, Fields, ServerClock,
    SetMode, WriteFields,
};
use crate::error::{Result, StoreError};
use crate::hub::{lock, SnapshotHub};

struct StoredMessage {
    id: String,
    seq: u64,
    fields: Fields,
    /// The original write while its server timestamps are still held back.
    unresolved: Option<WriteFields>,
}

#[derive(Default)]
struct State {
    profiles: BTreeMap<String, Fields>,
    logs: HashMap<ConversationKey, Vec<StoredMessage>>,
    threads: BTreeMap<ConversationKey, Fields>,
    next_seq: u64,
}

#[derive(Default)]
struct Faults {
    profile_write: Option<String>,
    append: Option<String>,
    thread_write: Option<String>,
}

/// In-memory implementation of [`DirectoryStore`] and [`MessageLogStore`].
pub struct MemoryBackend {
    state: Mutex<State>,
    faults: Mutex<Faults>,
    clock: ServerClock,
    hold_timestamps: AtomicBool,
    directory_hub: SnapshotHub<()>,
    message_hub: SnapshotHub<ConversationKey>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            faults: Mutex::new(Faults::default()),
            clock: ServerClock::new(),
            hold_timestamps: AtomicBool::new(false),
            directory_hub: SnapshotHub::new(),
            message_hub: SnapshotHub::new(),
        }
    }

    /// A backend that delivers appended messages with unresolved
    /// timestamps until [`Self::resolve_pending`] is called.
    pub fn with_latency_compensation() -> Self {
        let backend = Self::new();
        backend.hold_timestamps.store(true, Ordering::SeqCst);
        backend
    }

    pub fn set_latency_compensation(&self, enabled: bool) {
        self.hold_timestamps.store(enabled, Ordering::SeqCst);
    }

    /// Stamp every held-back message in `key`'s log and publish the new
    /// snapshot.  Returns how many messages were resolved.
    pub fn resolve_pending(&self, key: &ConversationKey) -> usize {
        let mut state = lock(&self.state);
        let mut resolved = 0;
        if let Some(log) = state.logs.get_mut(key) {
            for msg in log.iter_mut() {
                if let Some(write) = msg.unresolved.take() {
                    msg.fields = resolve_fields(&write, self.clock.now());
                    resolved += 1;
                }
            }
        }
        debug!(key = %key, resolved, "resolved pending timestamps");
        self.publish_log(&state, key);
        resolved
    }

    // ------------------------------------------------------------------
    // Fault injection
    // ------------------------------------------------------------------

    pub fn fail_next_profile_write(&self, reason: &str) {
        lock(&self.faults).profile_write = Some(reason.to_string());
    }

    pub fn fail_next_append(&self, reason: &str) {
        lock(&self.faults).append = Some(reason.to_string());
    }

    pub fn fail_next_thread_write(&self, reason: &str) {
        lock(&self.faults).thread_write = Some(reason.to_string());
    }

    /// Push an error to every open directory subscription.
    pub fn inject_directory_error(&self, reason: &str) -> usize {
        warn!(reason, "injecting directory subscription error");
        self.directory_hub.fail(&(), reason)
    }

    /// Push an error to every open subscription on `key`'s log.
    pub fn inject_thread_error(&self, key: &ConversationKey, reason: &str) -> usize {
        warn!(key = %key, reason, "injecting thread subscription error");
        self.message_hub.fail(key, reason)
    }

    fn take_fault(&self, pick: impl FnOnce(&mut Faults) -> &mut Option<String>) -> Result<()> {
        match pick(&mut lock(&self.faults)).take() {
            Some(reason) => Err(StoreError::Backend(reason)),
            None => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Inspection helpers
    // ------------------------------------------------------------------

    /// Write a raw directory body, bypassing validation.  Used to seed
    /// malformed records.
    pub fn seed_profile(&self, id: &str, body: Value) {
        let fields = match body {
            Value::Object(map) => map,
            _ => Fields::new(),
        };
        let mut state = lock(&self.state);
        state.profiles.insert(id.to_string(), fields);
        self.publish_directory(&state);
    }

    pub fn directory_subscribers(&self) -> usize {
        self.directory_hub.subscriber_count(&())
    }

    pub fn thread_subscribers(&self, key: &ConversationKey) -> usize {
        self.message_hub.subscriber_count(key)
    }

    pub fn message_count(&self, key: &ConversationKey) -> usize {
        lock(&self.state).logs.get(key).map(Vec::len).unwrap_or(0)
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    fn directory_snapshot(state: &State) -> Snapshot {
        Snapshot::new(
            state
                .profiles
                .iter()
                .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                .collect(),
        )
    }

    fn log_snapshot(state: &State, key: &ConversationKey) -> Snapshot {
        let Some(log) = state.logs.get(key) else {
            return Snapshot::default();
        };
        let mut ordered: Vec<&StoredMessage> = log.iter().collect();
        ordered.sort_by_key(|msg| {
            let ts = msg
                .fields
                .get(fields::TIMESTAMP)
                .and_then(Value::as_str)
                .and_then(parse_timestamp);
            (ts.is_none(), ts, msg.seq)
        });
        Snapshot::new(
            ordered
                .into_iter()
                .map(|msg| Document::new(msg.id.clone(), msg.fields.clone()))
                .collect(),
        )
    }

    fn publish_directory(&self, state: &State) {
        if self.directory_hub.has_subscribers(&()) {
            self.directory_hub.publish(&(), &Self::directory_snapshot(state));
        }
    }

    fn publish_log(&self, state: &State, key: &ConversationKey) {
        if self.message_hub.has_subscribers(key) {
            self.message_hub.publish(key, &Self::log_snapshot(state, key));
        }
    }
}

#[async_trait]
impl DirectoryStore for MemoryBackend {
    async fn get_profile(&self, id: &str) -> Result<Option<Document>> {
        Ok(lock(&self.state)
            .profiles
            .get(id)
            .map(|fields| Document::new(id, fields.clone())))
    }

    async fn set_profile(&self, id: &str, fields: WriteFields, mode: SetMode) -> Result<()> {
        self.take_fault(|f| &mut f.profile_write)?;
        let incoming = resolve_fields(&fields, self.clock.now());

        let mut state = lock(&self.state);
        let existing = state.profiles.remove(id);
        state
            .profiles
            .insert(id.to_string(), apply_write(existing, incoming, mode));
        debug!(id, ?mode, "profile written");
        self.publish_directory(&state);
        Ok(())
    }

    async fn delete_profile(&self, id: &str) -> Result<bool> {
        self.take_fault(|f| &mut f.profile_write)?;
        let mut state = lock(&self.state);
        let removed = state.profiles.remove(id).is_some();
        if removed {
            self.publish_directory(&state);
        }
        Ok(removed)
    }

    async fn list_profiles(&self) -> Result<Vec<Document>> {
        Ok(Self::directory_snapshot(&lock(&self.state)).documents)
    }

    async fn find_profiles(&self, field: &str, value: &Value) -> Result<Vec<Document>> {
        Ok(lock(&self.state)
            .profiles
            .iter()
            .filter(|(_, fields)| fields.get(field) == Some(value))
            .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
            .collect())
    }

    fn subscribe_profiles(&self) -> Result<SnapshotStream> {
        let state = lock(&self.state);
        Ok(self
            .directory_hub
            .subscribe((), Ok(Self::directory_snapshot(&state))))
    }
}

#[async_trait]
impl MessageLogStore for MemoryBackend {
    async fn append_message(&self, key: &ConversationKey, fields: WriteFields) -> Result<String> {
        self.take_fault(|f| &mut f.append)?;

        let id = Uuid::new_v4().to_string();
        let held = self.hold_timestamps.load(Ordering::SeqCst);
        let (body, unresolved) = if held {
            (pending_fields(&fields), Some(fields))
        } else {
            (resolve_fields(&fields, self.clock.now()), None)
        };

        let mut state = lock(&self.state);
        let seq = state.next_seq;
        state.next_seq += 1;
        state.logs.entry(key.clone()).or_default().push(StoredMessage {
            id: id.clone(),
            seq,
            fields: body,
            unresolved,
        });
        debug!(key = %key, msg_id = %id, pending = held, "message appended");
        self.publish_log(&state, key);
        Ok(id)
    }

    async fn list_messages(&self, key: &ConversationKey) -> Result<Vec<Document>> {
        Ok(Self::log_snapshot(&lock(&self.state), key).documents)
    }

    fn subscribe_messages(&self, key: &ConversationKey) -> Result<SnapshotStream> {
        let state = lock(&self.state);
        Ok(self
            .message_hub
            .subscribe(key.clone(), Ok(Self::log_snapshot(&state, key))))
    }

    async fn get_thread(&self, key: &ConversationKey) -> Result<Option<Document>> {
        Ok(lock(&self.state)
            .threads
            .get(key)
            .map(|fields| Document::new(key.as_str(), fields.clone())))
    }

    async fn set_thread(&self, key: &ConversationKey, fields: WriteFields) -> Result<()> {
        self.take_fault(|f| &mut f.thread_write)?;
        let body = resolve_fields(&fields, self.clock.now());
        lock(&self.state).threads.insert(key.clone(), body);
        Ok(())
    }

    async fn update_thread(&self, key: &ConversationKey, fields: WriteFields) -> Result<()> {
        self.take_fault(|f| &mut f.thread_write)?;
        let body = resolve_fields(&fields, self.clock.now());
        let mut state = lock(&self.state);
        let existing = state.threads.remove(key).ok_or(StoreError::NotFound)?;
        state
            .threads
            .insert(key.clone(), apply_write(Some(existing), body, SetMode::Merge));
        Ok(())
    }

    async fn list_threads_for(&self, participant: &ParticipantId) -> Result<Vec<Document>> {
        let needle = Value::String(participant.to_string());
        Ok(lock(&self.state)
            .threads
            .iter()
            .filter(|(_, fields)| {
                fields
                    .get(fields::PARTICIPANTS)
                    .and_then(Value::as_array)
                    .is_some_and(|ids| ids.contains(&needle))
            })
            .map(|(key, fields)| Document::new(key.as_str(), fields.clone()))
            .collect())
    }
}
