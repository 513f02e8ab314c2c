//! Record lookup over the external station datasets in a SQLite file.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use tracing::{debug, info_span};
use tvs_core::{ExtDbLookup, LookupError};
use tvs_model::{ExtDbInfo, ExtDbKey, ExtRecord, RecordId};

use crate::catalog::ExtDbCatalog;
use crate::ext::load_ext_records;
use crate::pool::{DbPool, sqlite_pool};
use crate::{Result, StoreError};

pub struct SqliteExtDb {
    pool: DbPool,
    catalog: ExtDbCatalog,
}

impl SqliteExtDb {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::with_pool(sqlite_pool(path)?))
    }

    pub fn with_pool(pool: DbPool) -> Self {
        Self {
            pool,
            catalog: ExtDbCatalog::new(),
        }
    }

    pub fn catalog_mut(&mut self) -> &mut ExtDbCatalog {
        &mut self.catalog
    }

    /// Live datasets, tombstones excluded.
    pub fn list(&mut self) -> Result<Vec<ExtDbInfo>> {
        let conn = self.pool.get()?;
        let entries = self.catalog.entries(&conn)?;
        Ok(entries.iter().filter(|info| !info.is_deleted).cloned().collect())
    }

    /// Resolves a real or pseudo key to a live dataset.
    pub fn resolve(&mut self, key: ExtDbKey) -> Result<ExtDbInfo> {
        let conn = self.pool.get()?;
        self.catalog
            .resolve(&conn, key)?
            .ok_or(StoreError::UnknownExtDb(key))
    }

    fn find(&mut self, key: ExtDbKey, ids: &BTreeSet<RecordId>) -> Result<BTreeMap<RecordId, ExtRecord>> {
        let conn = self.pool.get()?;
        let info = self
            .catalog
            .resolve(&conn, key)?
            .ok_or(StoreError::UnknownExtDb(key))?;
        load_ext_records(&conn, info.key, ids)
    }
}

impl std::fmt::Debug for SqliteExtDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteExtDb")
            .field("pool", &self.pool.state())
            .field("catalog_version", &self.catalog.version())
            .finish_non_exhaustive()
    }
}

impl ExtDbLookup for SqliteExtDb {
    fn find_records(
        &mut self,
        ext_db_key: ExtDbKey,
        record_ids: &BTreeSet<RecordId>,
    ) -> std::result::Result<BTreeMap<RecordId, ExtRecord>, LookupError> {
        let span = info_span!("find_records", ext_db = %ext_db_key, requested = record_ids.len());
        let _guard = span.enter();
        let found = self.find(ext_db_key, record_ids)?;
        debug!(found = found.len(), "station data lookup complete");
        Ok(found)
    }
}
