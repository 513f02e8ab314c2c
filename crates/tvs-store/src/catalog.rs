//! Cached view of the external dataset index.
//!
//! The cache is one table with an explicit [`invalidate`](ExtDbCatalog::invalidate).
//! "Most recent of a type" is computed from the live table on every call, so
//! there is no second map to fall out of step.

use rusqlite::Connection;
use tracing::debug;
use tvs_model::{ExtDbInfo, ExtDbKey, ExtDbType};

use crate::Result;
use crate::ext::load_ext_dbs;

/// Most recent live dataset of `db_type`, ordered by date then key.
pub fn most_recent_by_type<'a>(
    entries: impl IntoIterator<Item = &'a ExtDbInfo>,
    db_type: ExtDbType,
) -> Option<&'a ExtDbInfo> {
    entries
        .into_iter()
        .filter(|info| info.db_type == db_type && !info.is_deleted)
        .max_by_key(|info| (info.date, info.key))
}

/// Pseudo-key standing for the most recent dataset of `db_type`.
pub fn pseudo_key(db_type: ExtDbType) -> ExtDbKey {
    ExtDbKey::new(-db_type.code())
}

#[derive(Debug, Default)]
pub struct ExtDbCatalog {
    entries: Vec<ExtDbInfo>,
    loaded: bool,
    version: u64,
}

impl ExtDbCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Incremented each time the table is reloaded.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Forces the next access to reload from the database.
    pub fn invalidate(&mut self) {
        self.loaded = false;
    }

    fn ensure_loaded(&mut self, conn: &Connection) -> Result<()> {
        if !self.loaded {
            self.entries = load_ext_dbs(conn)?;
            self.loaded = true;
            self.version += 1;
            debug!(datasets = self.entries.len(), version = self.version, "loaded station data index");
        }
        Ok(())
    }

    /// Every row, tombstones included.
    pub fn entries(&mut self, conn: &Connection) -> Result<&[ExtDbInfo]> {
        self.ensure_loaded(conn)?;
        Ok(&self.entries)
    }

    /// Resolves a real or pseudo key to a live dataset.
    ///
    /// Deleted datasets never resolve, whether named directly or as the
    /// most recent of their type.
    pub fn resolve(&mut self, conn: &Connection, key: ExtDbKey) -> Result<Option<ExtDbInfo>> {
        self.ensure_loaded(conn)?;
        if key.is_pseudo() {
            let Some(db_type) = key.get().checked_neg().and_then(ExtDbType::from_code) else {
                return Ok(None);
            };
            return Ok(most_recent_by_type(&self.entries, db_type).cloned());
        }
        Ok(self
            .entries
            .iter()
            .find(|info| info.key == key && !info.is_deleted)
            .cloned())
    }
}
