//! SQLite backend.
//!
//! The [`Database`] struct owns a [`rusqlite::Connection`] and guarantees that
//! migrations are run before any other operation.  It implements both store
//! traits (see `directory.rs` and `messages.rs`), stamps server timestamps
//! when a write is applied, and re-queries and publishes a snapshot to live
//! subscribers after every write.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use directories::ProjectDirs;
use rusqlite::Connection;

use tandem_shared::ConversationKey;

use crate::document::{Document, Fields, ServerClock};
use crate::error::{Result, StoreError};
use crate::hub::{lock, SnapshotHub};
use crate::migrations;

/// Wrapper around a [`rusqlite::Connection`].
pub struct Database {
    conn: Mutex<Connection>,
    pub(crate) clock: ServerClock,
    pub(crate) directory_hub: SnapshotHub<()>,
    pub(crate) message_hub: SnapshotHub<ConversationKey>,
}

impl Database {
    /// Open (or create) the default application database.
    ///
    /// The database file is placed in the platform-appropriate data directory:
    /// - Linux:   `~/.local/share/tandem/tandem.db`
    /// - macOS:   `~/Library/Application Support/com.tandem.tandem/tandem.db`
    /// - Windows: `{FOLDERID_RoamingAppData}\tandem\tandem\data\tandem.db`
    pub fn new() -> Result<Self> {
        let project_dirs =
            ProjectDirs::from("com", "tandem", "tandem").ok_or(StoreError::NoDataDir)?;

        let data_dir = project_dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;

        let db_path = data_dir.join("tandem.db");

        tracing::info!(path = %db_path.display(), "opening database");

        Self::open_at(&db_path)
    }

    /// Open (or create) a database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::from_connection(conn)
    }

    /// A private, throwaway in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            clock: ServerClock::new(),
            directory_hub: SnapshotHub::new(),
            message_hub: SnapshotHub::new(),
        })
    }

    /// Lock and return the underlying connection.
    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        lock(&self.conn)
    }

    /// Return the filesystem path of the open database (if any).
    pub fn path(&self) -> Option<PathBuf> {
        self.conn()
            .path()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
    }

    pub fn schema_version(&self) -> Result<u32> {
        migrations::schema_version(&self.conn())
    }
}

/// Map a `(id, body)` row to a [`Document`].
pub(crate) fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
    let id: String = row.get(0)?;
    let body: String = row.get(1)?;

    let fields: Fields = serde_json::from_str(&body).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Document { id, fields })
}

pub(crate) fn collect_documents(
    rows: impl Iterator<Item = rusqlite::Result<Document>>,
) -> Result<Vec<Document>> {
    let mut documents = Vec::new();
    for row in rows {
        documents.push(row?);
    }
    Ok(documents)
}
