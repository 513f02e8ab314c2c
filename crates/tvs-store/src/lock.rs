//! Advisory single-writer lock on an external dataset.
//!
//! The lock is the `locked` flag of the dataset's `ext_db` row. Acquiring it
//! is one conditional `UPDATE`, so two sessions can never both succeed, and a
//! held lock fails fast with [`LockOutcome::Busy`] instead of waiting. There
//! is no lease: a session that dies while holding the lock leaves the row
//! locked until an operator runs [`force_unlock`].

use std::path::Path;

use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info, warn};
use tvs_model::ExtDbKey;

use crate::{Result, StoreError};

/// Result of [`connect_and_lock`]. Only failures to talk to the database are
/// errors; a busy or missing dataset is a normal outcome.
#[derive(Debug)]
pub enum LockOutcome {
    Acquired(ExtDbLock),
    /// Another session holds the lock.
    Busy,
    /// No such dataset, or it was deleted.
    Missing,
}

/// A held lock and the connection it was taken on.
///
/// Dropping the guard releases the lock; [`release`](Self::release) does the
/// same and reports failures.
#[derive(Debug)]
pub struct ExtDbLock {
    conn: Connection,
    key: ExtDbKey,
    held: bool,
}

/// Opens `path` and tries to take the lock on dataset `key`.
pub fn connect_and_lock(path: &Path, key: ExtDbKey) -> Result<LockOutcome> {
    let conn = Connection::open(path).map_err(|source| StoreError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    lock_on(conn, key)
}

/// Like [`connect_and_lock`] on an already open connection.
pub fn lock_on(conn: Connection, key: ExtDbKey) -> Result<LockOutcome> {
    let changed = conn.execute(
        "UPDATE ext_db SET locked = true
         WHERE ext_db_key = ?1 AND NOT locked AND NOT deleted",
        [key.get()],
    )?;
    if changed == 1 {
        info!(ext_db = %key, "acquired station data lock");
        return Ok(LockOutcome::Acquired(ExtDbLock {
            conn,
            key,
            held: true,
        }));
    }
    let locked: Option<bool> = conn
        .query_row(
            "SELECT locked FROM ext_db WHERE ext_db_key = ?1 AND NOT deleted",
            [key.get()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(match locked {
        Some(_) => {
            debug!(ext_db = %key, "station data lock is busy");
            LockOutcome::Busy
        }
        None => LockOutcome::Missing,
    })
}

impl ExtDbLock {
    pub fn key(&self) -> ExtDbKey {
        self.key
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Releases the lock and closes the connection.
    pub fn release(mut self) -> Result<()> {
        self.unlock()
    }

    fn unlock(&mut self) -> Result<()> {
        if self.held {
            self.held = false;
            self.conn.execute(
                "UPDATE ext_db SET locked = false WHERE ext_db_key = ?1",
                [self.key.get()],
            )?;
            info!(ext_db = %self.key, "released station data lock");
        }
        Ok(())
    }
}

impl Drop for ExtDbLock {
    fn drop(&mut self) {
        if let Err(err) = self.unlock() {
            warn!(ext_db = %self.key, error = %err, "failed to release station data lock");
        }
    }
}

/// Clears a lock regardless of holder. Returns whether it was set.
pub fn force_unlock(conn: &Connection, key: ExtDbKey) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE ext_db SET locked = false WHERE ext_db_key = ?1 AND locked",
        [key.get()],
    )?;
    if changed > 0 {
        warn!(ext_db = %key, "cleared station data lock");
    }
    Ok(changed > 0)
}
