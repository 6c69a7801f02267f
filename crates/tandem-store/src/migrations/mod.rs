//! Schema versions of the local document store.
//!
//! The store keeps three tables (`profiles`, `messages`, `threads`) whose
//! bodies are JSON documents.  `PRAGMA user_version` records the last step
//! applied; each step runs in its own transaction together with the version
//! bump, so a crash mid-upgrade leaves the previous version intact.

pub mod v001_initial;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{Result, StoreError};

type Step = fn(&Connection) -> rusqlite::Result<()>;

/// Upgrade steps in order.  Version `n` is reached by applying entry `n - 1`.
const STEPS: &[(&str, Step)] = &[("v001_initial", v001_initial::up)];

/// Version a fully upgraded database reports.
pub fn latest_version() -> u32 {
    STEPS.len() as u32
}

/// Bring `conn` up to [`latest_version`].
///
/// A database written by a newer build is refused rather than opened with
/// a schema this build does not know.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let found = schema_version(conn)?;
    let latest = latest_version();

    if found > latest {
        return Err(StoreError::Migration(format!(
            "database schema v{found} is newer than this build (v{latest})"
        )));
    }
    if found == latest {
        debug!(version = found, "document store schema up to date");
        return Ok(());
    }

    for (index, (name, step)) in STEPS.iter().enumerate().skip(found as usize) {
        let version = index as u32 + 1;
        info!(step = name, version, "upgrading document store schema");

        let tx = conn.unchecked_transaction()?;
        step(&tx).map_err(|e| StoreError::Migration(format!("{name}: {e}")))?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
    }

    Ok(())
}

/// Schema version recorded in the database.
pub fn schema_version(conn: &Connection) -> Result<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}
