//! Canonical key-to-source map of a study.
//!
//! Every other structure holds a [`SourceKey`] handle into the arena. Each
//! entry carries a reference count: one per scenario item binding the key plus
//! one per replication whose original it is. A source is evicted only by an
//! explicit [`SourceArena::remove_source`] once its count is zero, so a list
//! never deallocates a source directly.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;
use tvs_model::{ExtDbKey, Provenance, SourceKey};

use crate::{EditError, Result, SharedSourceIndex, SourceEditData};

#[derive(Debug, Clone)]
struct ArenaEntry {
    source: SourceEditData,
    refs: usize,
}

#[derive(Debug, Clone)]
pub struct SourceArena {
    entries: BTreeMap<SourceKey, ArenaEntry>,
    next_key: u32,
    /// Previously saved keys evicted since the last save.
    evicted: BTreeSet<SourceKey>,
}

impl Default for SourceArena {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceArena {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_key: 1,
            evicted: BTreeSet::new(),
        }
    }

    /// Allocates a key unused by any source in this arena.
    pub fn new_source_key(&mut self) -> SourceKey {
        let key = SourceKey::new(self.next_key);
        self.next_key += 1;
        key
    }

    /// The key [`new_source_key`](Self::new_source_key) would return next.
    pub fn peek_next_key(&self) -> SourceKey {
        SourceKey::new(self.next_key)
    }

    fn note_key(&mut self, key: SourceKey) {
        if key.get() >= self.next_key {
            self.next_key = key.get() + 1;
        }
    }

    pub fn get(&self, key: SourceKey) -> Option<&SourceEditData> {
        self.entries.get(&key).map(|entry| &entry.source)
    }

    pub fn get_mut(&mut self, key: SourceKey) -> Option<&mut SourceEditData> {
        self.entries.get_mut(&key).map(|entry| &mut entry.source)
    }

    pub fn contains(&self, key: SourceKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn ref_count(&self, key: SourceKey) -> usize {
        self.entries.get(&key).map_or(0, |entry| entry.refs)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceEditData> {
        self.entries.values().map(|entry| &entry.source)
    }

    /// Makes `source` the study-wide instance for its key.
    ///
    /// A replacement keeps the existing reference count. A replication holds a
    /// reference on its original, which must already be present.
    pub fn add_or_replace_source(&mut self, source: SourceEditData) -> Result<()> {
        let key = source.key();
        let new_original = source.original_source_key();
        let old_original = self
            .entries
            .get(&key)
            .map(|entry| entry.source.original_source_key());
        if let Some(original) = new_original
            && old_original != Some(Some(original))
        {
            let entry = self
                .entries
                .get_mut(&original)
                .ok_or(EditError::MissingOriginal { key, original })?;
            entry.refs += 1;
        }
        self.note_key(key);
        for site in source.dts_sources() {
            self.note_key(site.key());
        }
        match self.entries.get_mut(&key) {
            Some(entry) => entry.source = source,
            None => {
                self.entries.insert(key, ArenaEntry { source, refs: 0 });
            }
        }
        if let Some(Some(previous)) = old_original
            && new_original != Some(previous)
        {
            self.release(previous);
            self.remove_source(previous);
        }
        Ok(())
    }

    pub fn retain(&mut self, key: SourceKey) -> Result<()> {
        let entry = self
            .entries
            .get_mut(&key)
            .ok_or(EditError::MissingSource(key))?;
        entry.refs += 1;
        Ok(())
    }

    pub fn release(&mut self, key: SourceKey) {
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.refs = entry.refs.saturating_sub(1);
        }
    }

    /// Evicts the source if nothing references it any more.
    ///
    /// Returns true if the source was evicted. Evicting a replication releases
    /// its original, which is evicted in turn when unreferenced.
    pub fn remove_source(&mut self, key: SourceKey) -> bool {
        let Some(entry) = self.entries.get(&key) else {
            return false;
        };
        if entry.refs > 0 {
            return false;
        }
        let Some(entry) = self.entries.remove(&key) else {
            return false;
        };
        if !entry.source.is_new() {
            self.evicted.insert(key);
        }
        debug!(source = %key, "evicted unreferenced source");
        if let Some(original) = entry.source.original_source_key() {
            self.release(original);
            self.remove_source(original);
        }
        true
    }

    /// Keys evicted since the last save that still have stored rows.
    pub fn evicted(&self) -> &BTreeSet<SourceKey> {
        &self.evicted
    }

    /// Locked by-reference sources of `ext_db_key` still referenced somewhere.
    pub fn shared_source_index(&self, ext_db_key: ExtDbKey) -> SharedSourceIndex {
        let mut index = SharedSourceIndex::default();
        for entry in self.entries.values() {
            let source = &entry.source;
            if entry.refs == 0 || !source.is_locked() {
                continue;
            }
            let Provenance::External {
                ext_db_key: source_db,
                record_id,
            } = source.provenance()
            else {
                continue;
            };
            if *source_db != ext_db_key {
                continue;
            }
            match source.original_source_key() {
                None => {
                    index.sources.insert(record_id.clone(), source.key());
                }
                Some(original) => {
                    let original_locked = self.get(original).is_some_and(SourceEditData::is_locked);
                    if original_locked {
                        index
                            .replications
                            .insert((source.channel(), record_id.clone()), source.key());
                    }
                }
            }
        }
        index
    }

    pub fn did_save(&mut self) {
        self.evicted.clear();
        for entry in self.entries.values_mut() {
            entry.source.did_save();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tvs_model::{Country, RecordId, Service, StationData};

    fn source(key: u32, locked: bool) -> SourceEditData {
        let mut station = StationData::new(Service::from_code("DT").unwrap(), Country::Us);
        station.channel = 20;
        SourceEditData::new(SourceKey::new(key), station, locked, Provenance::None)
    }

    #[test]
    fn keys_advance_past_inserted_sources() {
        let mut arena = SourceArena::new();
        arena.add_or_replace_source(source(41, false)).unwrap();
        assert_eq!(arena.new_source_key(), SourceKey::new(42));
    }

    #[test]
    fn referenced_source_is_not_evicted() {
        let mut arena = SourceArena::new();
        arena.add_or_replace_source(source(1, false)).unwrap();
        arena.retain(SourceKey::new(1)).unwrap();
        assert!(!arena.remove_source(SourceKey::new(1)));
        arena.release(SourceKey::new(1));
        assert!(arena.remove_source(SourceKey::new(1)));
        assert!(!arena.contains(SourceKey::new(1)));
    }

    #[test]
    fn replication_keeps_original_alive() {
        let mut arena = SourceArena::new();
        let original = source(1, false);
        let replica = original
            .replicate(SourceKey::new(2), 21, &mut || SourceKey::new(99))
            .unwrap();
        arena.add_or_replace_source(original).unwrap();
        arena.add_or_replace_source(replica).unwrap();
        assert_eq!(arena.ref_count(SourceKey::new(1)), 1);
        assert!(!arena.remove_source(SourceKey::new(1)));
        assert!(arena.remove_source(SourceKey::new(2)));
        assert!(!arena.contains(SourceKey::new(1)));
    }

    #[test]
    fn replication_requires_original() {
        let mut arena = SourceArena::new();
        let replica = source(1, false)
            .replicate(SourceKey::new(2), 21, &mut || SourceKey::new(99))
            .unwrap();
        assert_eq!(
            arena.add_or_replace_source(replica),
            Err(EditError::MissingOriginal {
                key: SourceKey::new(2),
                original: SourceKey::new(1),
            })
        );
    }

    #[test]
    fn eviction_of_saved_source_is_recorded() {
        let mut arena = SourceArena::new();
        arena.add_or_replace_source(source(1, false)).unwrap();
        arena.did_save();
        assert!(arena.remove_source(SourceKey::new(1)));
        assert!(arena.evicted().contains(&SourceKey::new(1)));
        arena.did_save();
        assert!(arena.evicted().is_empty());
    }

    #[test]
    fn shared_index_lists_reachable_locked_records() {
        let mut arena = SourceArena::new();
        let mut station = StationData::new(Service::from_code("DT").unwrap(), Country::Us);
        station.channel = 20;
        let provenance = Provenance::External {
            ext_db_key: ExtDbKey::new(5),
            record_id: RecordId::new("R1").unwrap(),
        };
        let shared = SourceEditData::new(SourceKey::new(1), station, true, provenance);
        let replica = shared
            .replicate(SourceKey::new(2), 22, &mut || SourceKey::new(99))
            .unwrap();
        arena.add_or_replace_source(shared).unwrap();
        arena.add_or_replace_source(replica).unwrap();
        arena.retain(SourceKey::new(2)).unwrap();

        let index = arena.shared_source_index(ExtDbKey::new(5));
        let id = RecordId::new("R1").unwrap();
        assert_eq!(index.sources.get(&id), Some(&SourceKey::new(1)));
        assert_eq!(index.replications.get(&(22, id)), Some(&SourceKey::new(2)));
        assert!(arena.shared_source_index(ExtDbKey::new(6)).sources.is_empty());
    }
}
