//! Deferred resolution of by-reference records.
//!
//! Record ids seen inside one scope are collected in a [`PendingLookups`] set
//! owned by that scope. Closing the scope hands the set to
//! [`RecordCache::flush`], which issues one batched query against the primary
//! dataset and one against the alternate for whatever is left.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};
use tvs_core::{EditError, ExtDbLookup, SourceEditData, StudyEditData};
use tvs_model::{ErrorLog, ExtDbKey, ExtRecord, RecordId, SourceKey};

use crate::Result;
use crate::parser::effective_replicate;

/// Record ids awaiting lookup in one scenario or document scope.
#[derive(Debug, Default)]
pub(crate) struct PendingLookups {
    ids: BTreeSet<RecordId>,
}

impl PendingLookups {
    pub(crate) fn request(&mut self, id: RecordId) {
        self.ids.insert(id);
    }
}

/// Sharing caches for one parse.
#[derive(Debug, Default)]
pub(crate) struct RecordCache {
    primary: Option<ExtDbKey>,
    alternate: Option<ExtDbKey>,
    /// Dataset to record id to source key.
    shared: BTreeMap<ExtDbKey, BTreeMap<RecordId, SourceKey>>,
    /// Dataset to `(channel, record id)` to replication key.
    replicas: BTreeMap<ExtDbKey, BTreeMap<(i32, RecordId), SourceKey>>,
    /// Looked-up sources not yet referenced by any scenario.
    detached: BTreeMap<SourceKey, SourceEditData>,
    unresolved: BTreeSet<RecordId>,
    lookup_calls: usize,
}

impl RecordCache {
    /// Seeds the caches with records the study already uses.
    pub(crate) fn new(
        primary: Option<ExtDbKey>,
        alternate: Option<ExtDbKey>,
        study: &StudyEditData,
    ) -> Self {
        let mut cache = Self {
            primary,
            alternate,
            ..Self::default()
        };
        for db in [primary, alternate].into_iter().flatten() {
            let index = study.load_shared_source_index(db);
            cache.shared.entry(db).or_default().extend(index.sources);
            cache.replicas.entry(db).or_default().extend(index.replications);
        }
        cache
    }

    pub(crate) fn lookup_calls(&self) -> usize {
        self.lookup_calls
    }

    fn find(&self, id: &RecordId) -> Option<(ExtDbKey, SourceKey)> {
        [self.primary, self.alternate]
            .into_iter()
            .flatten()
            .find_map(|db| self.shared.get(&db)?.get(id).map(|key| (db, *key)))
    }

    /// Whether `id` needs no further lookup.
    pub(crate) fn is_known(&self, id: &RecordId) -> bool {
        self.find(id).is_some() || self.unresolved.contains(id)
    }

    /// Runs the batched lookups for one closing scope.
    pub(crate) fn flush(
        &mut self,
        pending: PendingLookups,
        lookup: Option<&mut dyn ExtDbLookup>,
        study: &mut StudyEditData,
        log: &mut ErrorLog,
    ) -> Result<()> {
        let mut remaining: BTreeSet<RecordId> = pending
            .ids
            .into_iter()
            .filter(|id| !self.is_known(id))
            .collect();
        if remaining.is_empty() {
            return Ok(());
        }
        let (Some(lookup), Some(primary)) = (lookup, self.primary) else {
            for id in remaining {
                warn!(record_id = %id, "no station data selected for by-reference record");
                log.report_warning(format!(
                    "Record ID {id} not imported, no station data was selected"
                ));
                self.unresolved.insert(id);
            }
            return Ok(());
        };

        for db in [Some(primary), self.alternate].into_iter().flatten() {
            if remaining.is_empty() {
                break;
            }
            let found = lookup.find_records(db, &remaining)?;
            self.lookup_calls += 1;
            debug!(ext_db = %db, requested = remaining.len(), found = found.len(), "batched record lookup");
            for (id, record) in found {
                remaining.remove(&id);
                self.store(study, db, id, &record);
            }
        }

        for id in remaining {
            warn!(record_id = %id, "record not found in station data");
            log.report_warning(format!("Record ID {id} not found in station data"));
            self.unresolved.insert(id);
        }
        Ok(())
    }

    fn store(&mut self, study: &mut StudyEditData, db: ExtDbKey, id: RecordId, record: &ExtRecord) {
        let key = study.new_source_key();
        let source = SourceEditData::from_ext_record(key, record, &mut || study.new_source_key());
        self.detached.insert(key, source);
        self.shared.entry(db).or_default().insert(id, key);
    }

    /// Moves a looked-up source into the study on first use.
    fn attach(&mut self, study: &mut StudyEditData, key: SourceKey) -> Result<()> {
        if let Some(source) = self.detached.remove(&key) {
            study.add_or_replace_source(source)?;
        }
        Ok(())
    }

    /// Resolves a by-reference record to the key a scenario should bind.
    ///
    /// Returns `None` when the record was not found or its effective channel,
    /// the replication target if any, lies outside the study's window.
    pub(crate) fn resolve(
        &mut self,
        study: &mut StudyEditData,
        id: &RecordId,
        replicate: Option<i32>,
        log: &mut ErrorLog,
    ) -> Result<Option<SourceKey>> {
        let Some((db, key)) = self.find(id) else {
            return Ok(None);
        };
        let original = match self.detached.get(&key) {
            Some(source) => source,
            None => study.get_source(key).ok_or(EditError::MissingSource(key))?,
        };
        let replicate = effective_replicate(original, replicate);
        let channel = replicate.unwrap_or_else(|| original.channel());
        if !study.channel_in_range(original.record_type(), channel) {
            warn!(record_id = %id, channel, "record outside study channel range");
            log.report_warning(format!(
                "Record ID {id} on channel {channel} is outside the study channel range, not imported"
            ));
            return Ok(None);
        }
        let replicate = replicate.filter(|channel| original.needs_replication(*channel));

        let Some(channel) = replicate else {
            self.attach(study, key)?;
            return Ok(Some(key));
        };
        let cache_key = (channel, id.clone());
        if let Some(replica) = self.replicas.get(&db).and_then(|map| map.get(&cache_key)) {
            return Ok(Some(*replica));
        }

        self.attach(study, key)?;
        let original = study
            .get_source(key)
            .ok_or(EditError::MissingSource(key))?
            .clone();
        let replica_key = study.new_source_key();
        let replica = original.replicate(replica_key, channel, &mut || study.new_source_key())?;
        study.add_or_replace_source(replica)?;
        self.replicas.entry(db).or_default().insert(cache_key, replica_key);
        debug!(record_id = %id, channel, replica = %replica_key, "replicated by-reference record");
        Ok(Some(replica_key))
    }
}
