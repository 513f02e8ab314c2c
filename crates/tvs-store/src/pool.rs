//! Pooled SQLite connections for station data lookups.
//!
//! Connections are checked with a trivial statement on checkout, so a
//! connection left broken by a failed query is replaced instead of reused.

use std::path::Path;
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use tracing::debug;

use crate::Result;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Open connections kept by default.
pub const DEFAULT_MAX_SIZE: u32 = 4;
/// How long a checkout waits for a free or newly opened connection.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);
const BUSY_TIMEOUT: Duration = Duration::from_secs(2);

/// Pool over the SQLite file at `path` with the default limits.
pub fn sqlite_pool(path: impl AsRef<Path>) -> Result<DbPool> {
    sqlite_pool_with(path, DEFAULT_MAX_SIZE, DEFAULT_CONNECTION_TIMEOUT)
}

/// Pool over the SQLite file at `path`.
///
/// No connection is opened until the first checkout.
pub fn sqlite_pool_with(
    path: impl AsRef<Path>,
    max_size: u32,
    connection_timeout: Duration,
) -> Result<DbPool> {
    let path = path.as_ref();
    debug!(path = %path.display(), max_size, "building connection pool");
    let manager = SqliteConnectionManager::file(path).with_init(|conn| conn.busy_timeout(BUSY_TIMEOUT));
    let pool = Pool::builder()
        .max_size(max_size)
        .min_idle(Some(0))
        .connection_timeout(connection_timeout)
        .build(manager)?;
    Ok(pool)
}
