//! Per-scenario list of references to shared sources.
//!
//! Each row binds a source key with the scenario-scoped desired, undesired,
//! and permanent flags. Rows carry an `item_key` that survives replacement of
//! the source, so selection can follow a row across edits. The list tracks the
//! net change of its key set since the last save in `added_keys` and
//! `deleted_keys`; content changes are tracked by the sources themselves.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};
use tvs_model::{ErrorLog, Scenario, ScenarioSource, ScenarioType, SourceKey};

use crate::{EditError, Result, SourceArena, SourceEditData};

/// What removing a row does to the study-wide source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceRemovalPolicy {
    /// Evict the source from the study once nothing references it.
    #[default]
    ReleaseUnreferenced,
    /// Keep the source in the study even when unreferenced. Used by scenario
    /// types whose sources are pre-shared rather than owned per scenario.
    RetainShared,
}

impl SourceRemovalPolicy {
    pub fn for_scenario_type(scenario_type: ScenarioType) -> Self {
        match scenario_type {
            ScenarioType::TvixInterference => SourceRemovalPolicy::RetainShared,
            _ => SourceRemovalPolicy::ReleaseUnreferenced,
        }
    }
}

/// One row of a source list. Two items are equal when they bind the same key.
#[derive(Debug, Clone, Copy)]
pub struct SourceItem {
    item_key: u32,
    key: SourceKey,
    is_desired: bool,
    is_undesired: bool,
    is_permanent: bool,
}

impl SourceItem {
    pub fn item_key(&self) -> u32 {
        self.item_key
    }

    pub fn key(&self) -> SourceKey {
        self.key
    }

    pub fn is_desired(&self) -> bool {
        self.is_desired
    }

    pub fn is_undesired(&self) -> bool {
        self.is_undesired
    }

    pub fn is_permanent(&self) -> bool {
        self.is_permanent
    }
}

impl PartialEq for SourceItem {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for SourceItem {}

#[derive(Debug, Clone, Default)]
pub struct SourceListData {
    items: Vec<SourceItem>,
    next_item_key: u32,
    added_keys: BTreeSet<SourceKey>,
    deleted_keys: BTreeSet<SourceKey>,
    removal_policy: SourceRemovalPolicy,
}

impl SourceListData {
    pub fn new(removal_policy: SourceRemovalPolicy) -> Self {
        Self {
            items: Vec::new(),
            next_item_key: 1,
            added_keys: BTreeSet::new(),
            deleted_keys: BTreeSet::new(),
            removal_policy,
        }
    }

    pub fn removal_policy(&self) -> SourceRemovalPolicy {
        self.removal_policy
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item(&self, row: usize) -> Option<&SourceItem> {
        self.items.get(row)
    }

    pub fn items(&self) -> &[SourceItem] {
        &self.items
    }

    pub fn keys(&self) -> impl Iterator<Item = SourceKey> + '_ {
        self.items.iter().map(|item| item.key)
    }

    pub fn index_of_key(&self, key: SourceKey) -> Option<usize> {
        self.items.iter().position(|item| item.key == key)
    }

    pub fn index_of_item_key(&self, item_key: u32) -> Option<usize> {
        self.items.iter().position(|item| item.item_key == item_key)
    }

    pub fn contains_key(&self, key: SourceKey) -> bool {
        self.index_of_key(key).is_some()
    }

    pub fn added_keys(&self) -> &BTreeSet<SourceKey> {
        &self.added_keys
    }

    pub fn deleted_keys(&self) -> &BTreeSet<SourceKey> {
        &self.deleted_keys
    }

    fn note_added(&mut self, key: SourceKey) {
        if !self.deleted_keys.remove(&key) {
            self.added_keys.insert(key);
        }
    }

    fn note_removed(&mut self, key: SourceKey) {
        if !self.added_keys.remove(&key) {
            self.deleted_keys.insert(key);
        }
    }

    /// Adds `source` or updates the row already bound to its key.
    ///
    /// The source always becomes the study-wide instance for its key. An
    /// existing row keeps its `item_key`; its flags are updated unless it is
    /// permanent.
    pub fn add_or_replace(
        &mut self,
        arena: &mut SourceArena,
        source: SourceEditData,
        is_desired: bool,
        is_undesired: bool,
        is_permanent: bool,
    ) -> Result<bool> {
        let key = source.key();
        arena.add_or_replace_source(source)?;
        self.bind(arena, key, is_desired, is_undesired, is_permanent)
    }

    /// Like [`add_or_replace`](Self::add_or_replace) for a source already in
    /// the study, sharing the existing instance.
    pub fn bind(
        &mut self,
        arena: &mut SourceArena,
        key: SourceKey,
        is_desired: bool,
        is_undesired: bool,
        is_permanent: bool,
    ) -> Result<bool> {
        let can_be_desired = arena
            .get(key)
            .ok_or(EditError::MissingSource(key))?
            .record_type()
            .can_be_desired();
        let is_desired = is_desired && can_be_desired;
        if let Some(row) = self.index_of_key(key) {
            let item = &mut self.items[row];
            if !item.is_permanent {
                item.is_desired = is_desired;
                item.is_undesired = is_undesired;
                item.is_permanent = is_permanent;
            }
            return Ok(true);
        }
        arena.retain(key)?;
        let item_key = self.next_item_key;
        self.next_item_key += 1;
        self.items.push(SourceItem {
            item_key,
            key,
            is_desired,
            is_undesired,
            is_permanent,
        });
        self.note_added(key);
        Ok(true)
    }

    fn release_key(&self, arena: &mut SourceArena, key: SourceKey) {
        arena.release(key);
        if self.removal_policy == SourceRemovalPolicy::ReleaseUnreferenced {
            arena.remove_source(key);
        }
    }

    /// Removes a row. Permanent rows are never removed.
    pub fn remove(&mut self, arena: &mut SourceArena, row: usize) -> bool {
        match self.items.get(row) {
            Some(item) if !item.is_permanent => {}
            _ => return false,
        }
        let item = self.items.remove(row);
        self.note_removed(item.key);
        self.release_key(arena, item.key);
        true
    }

    /// Removes several rows, skipping permanent ones. True if any was removed.
    pub fn remove_rows(&mut self, arena: &mut SourceArena, rows: &[usize]) -> bool {
        let mut rows = rows.to_vec();
        rows.sort_unstable_by(|a, b| b.cmp(a));
        rows.dedup();
        let mut removed = false;
        for row in rows {
            removed |= self.remove(arena, row);
        }
        removed
    }

    /// Releases every row, permanent ones included. Used when the owning
    /// scenario itself goes away.
    pub fn release_all(self, arena: &mut SourceArena) {
        for item in &self.items {
            self.release_key(arena, item.key);
        }
    }

    /// Replaces the source bound at `row`.
    ///
    /// The new source is registered before the old one is released, so a
    /// replication of the old source keeps its original alive throughout.
    pub fn set(
        &mut self,
        arena: &mut SourceArena,
        row: usize,
        source: SourceEditData,
    ) -> Result<bool> {
        let Some(item) = self.items.get(row).copied() else {
            return Ok(false);
        };
        let new_key = source.key();
        if new_key == item.key {
            arena.add_or_replace_source(source)?;
            return Ok(true);
        }
        if item.is_permanent || self.contains_key(new_key) {
            return Ok(false);
        }
        let can_be_desired = source.record_type().can_be_desired();
        arena.add_or_replace_source(source)?;
        arena.retain(new_key)?;
        let slot = &mut self.items[row];
        slot.key = new_key;
        slot.is_desired &= can_be_desired;
        self.note_removed(item.key);
        self.note_added(new_key);
        self.release_key(arena, item.key);
        debug!(old = %item.key, new = %new_key, item_key = item.item_key, "replaced source");
        Ok(true)
    }

    pub fn set_is_desired(&mut self, arena: &SourceArena, row: usize, is_desired: bool) -> bool {
        let Some(item) = self.items.get_mut(row) else {
            return false;
        };
        if item.is_permanent {
            return false;
        }
        if is_desired {
            let can_be_desired = arena
                .get(item.key)
                .is_some_and(|source| source.record_type().can_be_desired());
            if !can_be_desired {
                return false;
            }
        }
        item.is_desired = is_desired;
        true
    }

    pub fn set_is_undesired(&mut self, row: usize, is_undesired: bool) -> bool {
        match self.items.get_mut(row) {
            Some(item) if !item.is_permanent => {
                item.is_undesired = is_undesired;
                true
            }
            _ => false,
        }
    }

    /// Deep copy for "save as".
    ///
    /// Unlocked sources get a fresh derived copy. A locked replication of an
    /// unlocked original is re-replicated from a derived copy of the original,
    /// so the duplicate never aliases the editable original. All other locked
    /// sources are shared. Returns `None` with the failure in `errors` if any
    /// derivation fails, in which case the arena is untouched.
    pub fn duplicate(&self, arena: &mut SourceArena, errors: &mut ErrorLog) -> Option<SourceListData> {
        match self.stage_duplicate(arena) {
            Ok((staged, rekeyed)) => self.commit_duplicate(arena, staged, &rekeyed, errors),
            Err(err) => {
                warn!(error = %err, "source list duplicate failed");
                errors.report_error(format!("Could not duplicate station list: {err}"));
                None
            }
        }
    }

    fn stage_duplicate(
        &self,
        arena: &SourceArena,
    ) -> Result<(Vec<SourceEditData>, BTreeMap<SourceKey, SourceKey>)> {
        let mut next = arena.peek_next_key().get();
        let mut allocate = move || {
            let key = SourceKey::new(next);
            next += 1;
            key
        };
        let mut staged = Vec::new();
        let mut rekeyed: BTreeMap<SourceKey, SourceKey> = BTreeMap::new();
        for item in &self.items {
            let source = arena.get(item.key).ok_or(EditError::MissingSource(item.key))?;
            if !source.is_locked() {
                if !rekeyed.contains_key(&item.key) {
                    let key = allocate();
                    let derived = source.derive_source(key, false, &mut allocate)?;
                    rekeyed.insert(item.key, key);
                    staged.push(derived);
                }
                continue;
            }
            let Some(original_key) = source.original_source_key() else {
                continue;
            };
            let original = arena
                .get(original_key)
                .ok_or(EditError::MissingOriginal {
                    key: item.key,
                    original: original_key,
                })?;
            if original.is_locked() {
                continue;
            }
            let derived_key = match rekeyed.get(&original_key) {
                Some(key) => *key,
                None => {
                    let key = allocate();
                    staged.push(original.derive_source(key, false, &mut allocate)?);
                    rekeyed.insert(original_key, key);
                    key
                }
            };
            let Some(derived) = staged.iter().find(|source| source.key() == derived_key) else {
                return Err(EditError::MissingSource(derived_key));
            };
            let replica_key = allocate();
            let replica = derived.replicate(replica_key, source.channel(), &mut allocate)?;
            rekeyed.insert(item.key, replica_key);
            staged.push(replica);
        }
        Ok((staged, rekeyed))
    }

    fn commit_duplicate(
        &self,
        arena: &mut SourceArena,
        staged: Vec<SourceEditData>,
        rekeyed: &BTreeMap<SourceKey, SourceKey>,
        errors: &mut ErrorLog,
    ) -> Option<SourceListData> {
        let mut list = SourceListData::new(self.removal_policy);
        for source in staged {
            if let Err(err) = arena.add_or_replace_source(source) {
                errors.report_error(format!("Could not duplicate station list: {err}"));
                return None;
            }
        }
        for item in &self.items {
            let key = rekeyed.get(&item.key).copied().unwrap_or(item.key);
            if let Err(err) = list.bind(
                arena,
                key,
                item.is_desired,
                item.is_undesired,
                item.is_permanent,
            ) {
                errors.report_error(format!("Could not duplicate station list: {err}"));
                return None;
            }
        }
        Some(list)
    }

    pub fn is_data_valid(&self, errors: &mut ErrorLog) -> bool {
        if self.items.is_empty() {
            errors.report_error("No stations in the scenario");
            return false;
        }
        if !self.items.iter().any(|item| item.is_desired) {
            errors.report_error("No desired station in the scenario");
            return false;
        }
        true
    }

    /// True iff the set of referenced keys changed since the last save.
    pub fn is_data_changed(&self) -> bool {
        !self.added_keys.is_empty() || !self.deleted_keys.is_empty()
    }

    pub fn did_save(&mut self) {
        self.added_keys.clear();
        self.deleted_keys.clear();
    }

    pub fn to_scenario_sources(&self) -> Vec<ScenarioSource> {
        self.items
            .iter()
            .map(|item| ScenarioSource {
                source_key: item.key,
                is_desired: item.is_desired,
                is_undesired: item.is_undesired,
                is_permanent: item.is_permanent,
            })
            .collect()
    }

    /// Whether any row's desired/undesired flags differ from `saved`.
    pub fn flags_differ_from(&self, saved: &Scenario) -> bool {
        self.items.iter().any(|item| match saved.source(item.key) {
            Some(entry) => {
                entry.is_desired != item.is_desired || entry.is_undesired != item.is_undesired
            }
            None => true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tvs_model::{Country, Provenance, Service, StationData};

    fn source(arena: &mut SourceArena, code: &str, locked: bool) -> SourceEditData {
        let mut station = StationData::new(Service::from_code(code).unwrap(), Country::Us);
        station.channel = if code == "FM" { 250 } else { 20 };
        station.peak_erp = 10.0;
        SourceEditData::new(arena.new_source_key(), station, locked, Provenance::None)
    }

    #[test]
    fn add_then_remove_leaves_no_net_change() {
        let mut arena = SourceArena::new();
        let mut list = SourceListData::new(SourceRemovalPolicy::ReleaseUnreferenced);
        let s = source(&mut arena, "DT", false);
        let key = s.key();
        assert!(list.add_or_replace(&mut arena, s, true, false, false).unwrap());
        assert!(list.added_keys().contains(&key));
        assert!(list.remove(&mut arena, 0));
        assert!(!list.is_data_changed());
        assert!(!arena.contains(key));
    }

    #[test]
    fn re_adding_deleted_key_cancels_deletion() {
        let mut arena = SourceArena::new();
        let mut list = SourceListData::new(SourceRemovalPolicy::RetainShared);
        let s = source(&mut arena, "DT", false);
        let key = s.key();
        list.add_or_replace(&mut arena, s, true, false, false).unwrap();
        list.did_save();
        assert!(list.remove(&mut arena, 0));
        assert!(list.deleted_keys().contains(&key));
        assert!(arena.contains(key));
        list.bind(&mut arena, key, true, false, false).unwrap();
        assert!(list.deleted_keys().is_empty());
        assert!(list.added_keys().is_empty());
    }

    #[test]
    fn replace_keeps_item_key_and_updates_flags() {
        let mut arena = SourceArena::new();
        let mut list = SourceListData::new(SourceRemovalPolicy::ReleaseUnreferenced);
        let s = source(&mut arena, "DT", false);
        let copy = s.copy();
        list.add_or_replace(&mut arena, s, true, false, false).unwrap();
        let item_key = list.item(0).unwrap().item_key();
        list.add_or_replace(&mut arena, copy, false, true, false).unwrap();
        assert_eq!(list.len(), 1);
        let item = list.item(0).unwrap();
        assert_eq!(item.item_key(), item_key);
        assert!(!item.is_desired());
        assert!(item.is_undesired());
    }

    #[test]
    fn permanent_rows_resist_change() {
        let mut arena = SourceArena::new();
        let mut list = SourceListData::new(SourceRemovalPolicy::ReleaseUnreferenced);
        let s = source(&mut arena, "DT", false);
        list.add_or_replace(&mut arena, s, true, false, true).unwrap();
        assert!(!list.remove(&mut arena, 0));
        assert!(!list.set_is_desired(&arena, 0, false));
        assert!(!list.set_is_undesired(0, true));
        assert!(list.item(0).unwrap().is_desired());
    }

    #[test]
    fn wireless_cannot_be_desired() {
        let mut arena = SourceArena::new();
        let mut list = SourceListData::new(SourceRemovalPolicy::ReleaseUnreferenced);
        let s = source(&mut arena, "WL", false);
        list.add_or_replace(&mut arena, s, true, true, false).unwrap();
        assert!(!list.item(0).unwrap().is_desired());
        assert!(!list.set_is_desired(&arena, 0, true));
        assert!(list.set_is_desired(&arena, 0, false));
    }

    #[test]
    fn set_registers_replica_before_releasing_original() {
        let mut arena = SourceArena::new();
        let mut list = SourceListData::new(SourceRemovalPolicy::ReleaseUnreferenced);
        let original = source(&mut arena, "DT", false);
        let original_key = original.key();
        list.add_or_replace(&mut arena, original.clone(), true, false, false)
            .unwrap();
        list.did_save();
        let replica_key = arena.new_source_key();
        let replica = original
            .replicate(replica_key, 25, &mut || SourceKey::new(500))
            .unwrap();
        let item_key = list.item(0).unwrap().item_key();
        assert!(list.set(&mut arena, 0, replica).unwrap());
        assert!(arena.contains(original_key));
        assert_eq!(arena.ref_count(original_key), 1);
        assert_eq!(list.item(0).unwrap().item_key(), item_key);
        assert!(list.deleted_keys().contains(&original_key));
        assert!(list.added_keys().contains(&replica_key));
    }

    #[test]
    fn remove_rows_skips_permanent() {
        let mut arena = SourceArena::new();
        let mut list = SourceListData::new(SourceRemovalPolicy::ReleaseUnreferenced);
        for permanent in [true, false, false] {
            let s = source(&mut arena, "DT", false);
            list.add_or_replace(&mut arena, s, true, false, permanent)
                .unwrap();
        }
        assert!(list.remove_rows(&mut arena, &[0, 2, 1]));
        assert_eq!(list.len(), 1);
        assert!(list.item(0).unwrap().is_permanent());
        assert!(!list.remove_rows(&mut arena, &[0]));
    }

    #[test]
    fn validity_requires_a_desired_station() {
        let mut arena = SourceArena::new();
        let mut list = SourceListData::new(SourceRemovalPolicy::ReleaseUnreferenced);
        let mut errors = ErrorLog::new();
        assert!(!list.is_data_valid(&mut errors));
        let s = source(&mut arena, "DT", false);
        list.add_or_replace(&mut arena, s, false, true, false).unwrap();
        let mut errors = ErrorLog::new();
        assert!(!list.is_data_valid(&mut errors));
        assert!(errors.contains("No desired station"));
    }

    #[test]
    fn duplicate_derives_unlocked_and_shares_locked() {
        let mut arena = SourceArena::new();
        let mut list = SourceListData::new(SourceRemovalPolicy::ReleaseUnreferenced);
        let unlocked = source(&mut arena, "DT", false);
        let locked = source(&mut arena, "DT", true);
        let (unlocked_key, locked_key) = (unlocked.key(), locked.key());
        list.add_or_replace(&mut arena, unlocked, true, false, false).unwrap();
        list.add_or_replace(&mut arena, locked, false, true, false).unwrap();

        let mut errors = ErrorLog::new();
        let copy = list.duplicate(&mut arena, &mut errors).unwrap();
        assert!(errors.is_empty());
        let keys: Vec<SourceKey> = copy.keys().collect();
        assert_ne!(keys[0], unlocked_key);
        assert_eq!(keys[1], locked_key);
        assert_eq!(arena.ref_count(locked_key), 2);
        assert!(copy.added_keys().contains(&keys[0]));
    }

    #[test]
    fn duplicate_re_replicates_from_derived_original() {
        let mut arena = SourceArena::new();
        let mut list = SourceListData::new(SourceRemovalPolicy::ReleaseUnreferenced);
        let original = source(&mut arena, "TV", false);
        let original_key = original.key();
        arena.add_or_replace_source(original.clone()).unwrap();
        let replica = original
            .replicate(arena.new_source_key(), 30, &mut || SourceKey::new(900))
            .unwrap();
        let replica_key = replica.key();
        list.add_or_replace(&mut arena, replica, true, false, false).unwrap();

        let mut errors = ErrorLog::new();
        let copy = list.duplicate(&mut arena, &mut errors).unwrap();
        let new_key = copy.item(0).unwrap().key();
        assert_ne!(new_key, replica_key);
        let new_replica = arena.get(new_key).unwrap();
        assert_eq!(new_replica.channel(), 30);
        let new_original = new_replica.original_source_key().unwrap();
        assert_ne!(new_original, original_key);
        assert!(!arena.get(new_original).unwrap().is_locked());
    }

    #[test]
    fn failed_duplicate_leaves_arena_untouched() {
        let mut arena = SourceArena::new();
        let mut list = SourceListData::new(SourceRemovalPolicy::ReleaseUnreferenced);
        let mut station = StationData::new(Service::from_code("DT").unwrap(), Country::Us);
        station.channel = 20;
        station.horizontal_pattern = Some(tvs_model::HorizontalPatternInfo {
            name: "ANT".to_string(),
            orientation: 0.0,
            pattern: None,
        });
        let s = SourceEditData::new(arena.new_source_key(), station, false, Provenance::None);
        list.add_or_replace(&mut arena, s, true, false, false).unwrap();
        let before = arena.len();
        let next = arena.peek_next_key();

        let mut errors = ErrorLog::new();
        assert!(list.duplicate(&mut arena, &mut errors).is_none());
        assert!(errors.has_errors());
        assert_eq!(arena.len(), before);
        assert_eq!(arena.peek_next_key(), next);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add,
        Remove(usize),
        ReAddDeleted(usize),
        Save,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => Just(Op::Add),
            2 => (0usize..8).prop_map(Op::Remove),
            1 => (0usize..8).prop_map(Op::ReAddDeleted),
            1 => Just(Op::Save),
        ]
    }

    proptest! {
        #[test]
        fn key_deltas_are_always_net(ops in proptest::collection::vec(op(), 0..40)) {
            let mut arena = SourceArena::new();
            let mut list = SourceListData::new(SourceRemovalPolicy::RetainShared);
            let mut saved: BTreeSet<SourceKey> = BTreeSet::new();
            for op in ops {
                match op {
                    Op::Add => {
                        let s = source(&mut arena, "DT", false);
                        list.add_or_replace(&mut arena, s, true, false, false).unwrap();
                    }
                    Op::Remove(row) => {
                        if row < list.len() {
                            list.remove(&mut arena, row);
                        }
                    }
                    Op::ReAddDeleted(pick) => {
                        let deleted: Vec<SourceKey> = list.deleted_keys().iter().copied().collect();
                        if !deleted.is_empty() {
                            let key = deleted[pick % deleted.len()];
                            list.bind(&mut arena, key, true, false, false).unwrap();
                        }
                    }
                    Op::Save => {
                        list.did_save();
                        saved = list.keys().collect();
                    }
                }
                let current: BTreeSet<SourceKey> = list.keys().collect();
                let added: BTreeSet<SourceKey> = current.difference(&saved).copied().collect();
                let deleted: BTreeSet<SourceKey> = saved.difference(&current).copied().collect();
                prop_assert_eq!(list.added_keys(), &added);
                prop_assert_eq!(list.deleted_keys(), &deleted);
                prop_assert!(list.added_keys().is_disjoint(list.deleted_keys()));
            }
        }
    }
}
