//! SQLite persistence for interference studies.
//!
//! - [`SqliteStore`] runs the edit model's save statements and serves stored
//!   pattern points back to it.
//! - [`SqliteExtDb`] answers batched record lookups against the external
//!   station datasets, resolving pseudo-keys through an [`ExtDbCatalog`].
//! - [`connect_and_lock`] takes the advisory lock that keeps two sessions
//!   from importing into the same dataset at once.

mod catalog;
mod error;
pub mod ext;
mod ext_db;
mod lock;
mod pool;
mod schema;
mod store;

pub use catalog::{ExtDbCatalog, most_recent_by_type, pseudo_key};
pub use error::{Result, StoreError};
pub use ext_db::SqliteExtDb;
pub use lock::{ExtDbLock, LockOutcome, connect_and_lock, force_unlock, lock_on};
pub use pool::{
    DEFAULT_CONNECTION_TIMEOUT, DEFAULT_MAX_SIZE, DbConn, DbPool, sqlite_pool, sqlite_pool_with,
};
pub use schema::{SCHEMA_VERSION, create_schema};
pub use store::{ScenarioSummary, SqliteStore};
