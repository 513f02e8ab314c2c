//! Mutable edit wrapper around a persisted [`Source`].
//!
//! A `SourceEditData` has the same identity key as the source it wraps. Locked
//! sources mirror an immutable upstream record: their station content cannot
//! change, only their attributes. Per-field dirty flags record what changed
//! since the last save.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;
use tvs_model::{
    ErrorLog, ExtRecord, HorizontalPatternInfo, MatrixPatternInfo, Provenance, RecordType,
    Service, Source, SourceKey, StationData, VerticalPatternInfo,
};

use crate::{EditError, LookupError, PatternStore, Result};

/// Station fields tracked for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceField {
    Service,
    Country,
    FacilityId,
    CallSign,
    Channel,
    Location,
    Height,
    Power,
    HorizontalPattern,
    VerticalPattern,
    MatrixPattern,
    DtsSites,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceEditData {
    key: SourceKey,
    station: StationData,
    is_locked: bool,
    provenance: Provenance,
    original_source_key: Option<SourceKey>,
    attributes: BTreeMap<String, String>,
    transient_attributes: BTreeMap<String, String>,
    dts_sources: Vec<SourceEditData>,
    dirty: BTreeSet<SourceField>,
    attributes_changed: bool,
    saved: Option<Source>,
}

impl SourceEditData {
    /// Creates a new, never-saved source.
    pub fn new(key: SourceKey, station: StationData, is_locked: bool, provenance: Provenance) -> Self {
        Self {
            key,
            station,
            is_locked,
            provenance,
            original_source_key: None,
            attributes: BTreeMap::new(),
            transient_attributes: BTreeMap::new(),
            dts_sources: Vec::new(),
            dirty: BTreeSet::new(),
            attributes_changed: false,
            saved: None,
        }
    }

    /// Wraps a persisted source for editing.
    pub fn from_source(source: &Source) -> Self {
        Self {
            key: source.key,
            station: source.station.clone(),
            is_locked: source.is_locked,
            provenance: source.provenance.clone(),
            original_source_key: source.original_source_key,
            attributes: source.attributes.clone(),
            transient_attributes: BTreeMap::new(),
            dts_sources: source.dts_sources.iter().map(Self::from_source).collect(),
            dirty: BTreeSet::new(),
            attributes_changed: false,
            saved: Some(source.clone()),
        }
    }

    /// Builds a locked source from an external dataset record.
    pub fn from_ext_record(
        key: SourceKey,
        record: &ExtRecord,
        next_key: &mut dyn FnMut() -> SourceKey,
    ) -> Self {
        let provenance = Provenance::External {
            ext_db_key: record.ext_db_key,
            record_id: record.record_id.clone(),
        };
        let mut source = Self::new(key, record.station.clone(), true, provenance.clone());
        source.dts_sources = record
            .dts_sites
            .iter()
            .map(|site| Self::new(next_key(), site.clone(), true, provenance.clone()))
            .collect();
        source
    }

    /// Attaches DTS transmitter sites at construction. Unlike
    /// [`set_dts_sources`](Self::set_dts_sources) this is not an edit, so it
    /// also applies to locked sources.
    pub fn with_dts_sources(mut self, sites: Vec<SourceEditData>) -> Self {
        self.dts_sources = sites;
        self
    }

    pub fn key(&self) -> SourceKey {
        self.key
    }

    pub fn station(&self) -> &StationData {
        &self.station
    }

    pub fn record_type(&self) -> RecordType {
        self.station.record_type()
    }

    pub fn service(&self) -> Service {
        self.station.service
    }

    pub fn channel(&self) -> i32 {
        self.station.channel
    }

    pub fn call_sign(&self) -> &str {
        &self.station.call_sign
    }

    pub fn is_locked(&self) -> bool {
        self.is_locked
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub fn original_source_key(&self) -> Option<SourceKey> {
        self.original_source_key
    }

    pub fn is_replication(&self) -> bool {
        self.original_source_key.is_some()
    }

    pub fn is_dts_parent(&self) -> bool {
        self.station.service.is_dts() && self.station.site_number == 0
    }

    pub fn dts_sources(&self) -> &[SourceEditData] {
        &self.dts_sources
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn transient_attribute(&self, name: &str) -> Option<&str> {
        self.transient_attributes.get(name).map(String::as_str)
    }

    /// Never-saved sources have no snapshot.
    pub fn is_new(&self) -> bool {
        self.saved.is_none()
    }

    pub fn saved(&self) -> Option<&Source> {
        self.saved.as_ref()
    }

    pub fn dirty_fields(&self) -> &BTreeSet<SourceField> {
        &self.dirty
    }

    /// Independent editable copy with the same identity.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    fn edit(&mut self, field: SourceField, apply: impl FnOnce(&mut StationData)) -> Result<()> {
        if self.is_locked {
            return Err(EditError::Locked(self.key));
        }
        apply(&mut self.station);
        self.dirty.insert(field);
        Ok(())
    }

    pub fn set_service(&mut self, service: Service) -> Result<()> {
        if service.record_type() != self.record_type() {
            return Err(EditError::WrongRecordType {
                service: service.code().to_string(),
                expected: self.record_type().to_string(),
            });
        }
        self.edit(SourceField::Service, |station| station.service = service)
    }

    pub fn set_country(&mut self, country: tvs_model::Country) -> Result<()> {
        self.edit(SourceField::Country, |station| station.country = country)
    }

    pub fn set_facility_id(&mut self, facility_id: i32) -> Result<()> {
        self.edit(SourceField::FacilityId, |station| {
            station.facility_id = facility_id;
        })
    }

    pub fn set_call_sign(&mut self, call_sign: impl Into<String>) -> Result<()> {
        let call_sign = call_sign.into();
        self.edit(SourceField::CallSign, |station| station.call_sign = call_sign)
    }

    pub fn set_channel(&mut self, channel: i32) -> Result<()> {
        self.edit(SourceField::Channel, |station| station.channel = channel)
    }

    pub fn set_location(&mut self, latitude: f64, longitude: f64) -> Result<()> {
        self.edit(SourceField::Location, |station| {
            station.latitude = latitude;
            station.longitude = longitude;
        })
    }

    pub fn set_city_state(&mut self, city: impl Into<String>, state: impl Into<String>) -> Result<()> {
        let (city, state) = (city.into(), state.into());
        self.edit(SourceField::Location, |station| {
            station.city = city;
            station.state = state;
        })
    }

    pub fn set_heights(&mut self, height_amsl: f64, overall_haat: f64) -> Result<()> {
        self.edit(SourceField::Height, |station| {
            station.height_amsl = height_amsl;
            station.overall_haat = overall_haat;
        })
    }

    pub fn set_peak_erp(&mut self, peak_erp: f64) -> Result<()> {
        self.edit(SourceField::Power, |station| station.peak_erp = peak_erp)
    }

    pub fn set_horizontal_pattern(&mut self, info: Option<HorizontalPatternInfo>) -> Result<()> {
        self.edit(SourceField::HorizontalPattern, |station| {
            station.horizontal_pattern = info;
        })
    }

    pub fn set_vertical_pattern(&mut self, info: Option<VerticalPatternInfo>) -> Result<()> {
        self.edit(SourceField::VerticalPattern, |station| {
            station.vertical_pattern = info;
        })
    }

    pub fn set_matrix_pattern(&mut self, info: Option<MatrixPatternInfo>) -> Result<()> {
        self.edit(SourceField::MatrixPattern, |station| {
            station.matrix_pattern = info;
        })
    }

    pub fn set_use_generic_vertical_pattern(&mut self, use_generic: bool) -> Result<()> {
        self.edit(SourceField::VerticalPattern, |station| {
            station.use_generic_vertical_pattern = use_generic;
        })
    }

    /// Replaces the DTS transmitter sites of a DTS parent.
    pub fn set_dts_sources(&mut self, sites: Vec<SourceEditData>) -> Result<()> {
        if self.is_locked {
            return Err(EditError::Locked(self.key));
        }
        self.dts_sources = sites;
        self.dirty.insert(SourceField::DtsSites);
        Ok(())
    }

    /// Attributes are editable regardless of lock state.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let (name, value) = (name.into(), value.into());
        if self.attributes.get(&name) != Some(&value) {
            self.attributes.insert(name, value);
            self.attributes_changed = true;
        }
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        let removed = self.attributes.remove(name);
        if removed.is_some() {
            self.attributes_changed = true;
        }
        removed
    }

    /// Transient attributes live only in memory; they are never saved or exported.
    pub fn set_transient_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.transient_attributes.insert(name.into(), value.into());
    }

    /// Whether a replication onto `channel` differs from this source.
    pub fn needs_replication(&self, channel: i32) -> bool {
        channel != self.station.channel || !self.station.service.is_digital()
    }

    /// Copies this source under a new identity, with a new lock state.
    ///
    /// Pattern points must be in memory since stored patterns are keyed by the
    /// old identity.
    pub fn derive_source(
        &self,
        new_key: SourceKey,
        is_locked: bool,
        next_key: &mut dyn FnMut() -> SourceKey,
    ) -> Result<SourceEditData> {
        self.require_patterns()?;
        let mut dts_sources = Vec::with_capacity(self.dts_sources.len());
        for site in &self.dts_sources {
            let site_key = next_key();
            dts_sources.push(site.derive_source(site_key, is_locked, next_key)?);
        }
        debug!(source = %self.key, derived = %new_key, is_locked, "derived source");
        Ok(SourceEditData {
            key: new_key,
            station: self.station.clone(),
            is_locked,
            provenance: self.provenance.clone(),
            original_source_key: self.original_source_key,
            attributes: self.attributes.clone(),
            transient_attributes: self.transient_attributes.clone(),
            dts_sources,
            dirty: BTreeSet::new(),
            attributes_changed: false,
            saved: None,
        })
    }

    /// Produces a new locked source on `channel` derived from this one.
    ///
    /// The replication operates under the digital counterpart of this source's
    /// service and records this source as its original.
    pub fn replicate(
        &self,
        new_key: SourceKey,
        channel: i32,
        next_key: &mut dyn FnMut() -> SourceKey,
    ) -> Result<SourceEditData> {
        if self.record_type() != RecordType::Tv {
            return Err(EditError::NotReplicable {
                key: self.key,
                reason: format!("{} records cannot be replicated", self.record_type()),
            });
        }
        if let Some(range) = self.record_type().channel_range()
            && !range.contains(&channel)
        {
            return Err(EditError::NotReplicable {
                key: self.key,
                reason: format!("channel {channel} is out of range"),
            });
        }
        self.require_patterns()?;
        let service = self.station.service.digital_counterpart();
        let replicate_station = |station: &StationData| {
            let mut station = station.clone();
            station.channel = channel;
            station.service = service;
            station
        };
        let mut dts_sources = Vec::with_capacity(self.dts_sources.len());
        for site in &self.dts_sources {
            let mut replica = SourceEditData::new(
                next_key(),
                replicate_station(&site.station),
                true,
                site.provenance.clone(),
            );
            replica.attributes = site.attributes.clone();
            dts_sources.push(replica);
        }
        debug!(source = %self.key, replica = %new_key, channel, "replicated source");
        Ok(SourceEditData {
            key: new_key,
            station: replicate_station(&self.station),
            is_locked: true,
            provenance: self.provenance.clone(),
            original_source_key: Some(self.key),
            attributes: self.attributes.clone(),
            transient_attributes: BTreeMap::new(),
            dts_sources,
            dirty: BTreeSet::new(),
            attributes_changed: false,
            saved: None,
        })
    }

    fn require_patterns(&self) -> Result<()> {
        let loaded = self.station.patterns_loaded()
            && self.dts_sources.iter().all(|site| site.station.patterns_loaded());
        if loaded {
            Ok(())
        } else {
            Err(EditError::PatternsNotLoaded(self.key))
        }
    }

    /// Loads any declared pattern points not yet in memory. Not an edit.
    pub fn load_patterns(&mut self, store: &mut dyn PatternStore) -> std::result::Result<(), LookupError> {
        let key = self.key;
        if let Some(info) = self.station.horizontal_pattern.as_mut()
            && info.pattern.is_none()
        {
            info.pattern = Some(
                store
                    .horizontal_pattern(key)?
                    .ok_or_else(|| missing_pattern(key, "horizontal"))?,
            );
        }
        if let Some(info) = self.station.vertical_pattern.as_mut()
            && info.pattern.is_none()
        {
            info.pattern = Some(
                store
                    .vertical_pattern(key)?
                    .ok_or_else(|| missing_pattern(key, "vertical"))?,
            );
        }
        if let Some(info) = self.station.matrix_pattern.as_mut()
            && info.pattern.is_none()
        {
            info.pattern = Some(
                store
                    .matrix_pattern(key)?
                    .ok_or_else(|| missing_pattern(key, "matrix"))?,
            );
        }
        for site in &mut self.dts_sources {
            site.load_patterns(store)?;
        }
        Ok(())
    }

    pub fn is_data_valid(&self, errors: &mut ErrorLog) -> bool {
        let mut valid = true;
        for problem in self.station.problems(self.is_dts_parent()) {
            errors.report_error(problem);
            valid = false;
        }
        if self.is_new() && !self.station.patterns_loaded() {
            errors.report_error(format!("Source {}: pattern data is missing", self.key));
            valid = false;
        }
        if self.is_dts_parent() && self.dts_sources.is_empty() {
            errors.report_error(format!(
                "Source {}: a DTS record must have at least one transmitter site",
                self.key
            ));
            valid = false;
        }
        for site in &self.dts_sources {
            valid &= site.is_data_valid(errors);
        }
        valid
    }

    pub fn is_data_changed(&self) -> bool {
        self.saved.is_none()
            || !self.dirty.is_empty()
            || self.attributes_changed
            || self.dts_sources.iter().any(Self::is_data_changed)
    }

    pub fn to_source(&self) -> Source {
        Source {
            key: self.key,
            station: self.station.clone(),
            is_locked: self.is_locked,
            provenance: self.provenance.clone(),
            original_source_key: self.original_source_key,
            attributes: self.attributes.clone(),
            dts_sources: self.dts_sources.iter().map(Self::to_source).collect(),
        }
    }

    /// Clears change tracking and freezes the current state as saved.
    pub fn did_save(&mut self) {
        for site in &mut self.dts_sources {
            site.did_save();
        }
        self.dirty.clear();
        self.attributes_changed = false;
        self.saved = Some(self.to_source());
    }
}

fn missing_pattern(key: SourceKey, kind: &str) -> LookupError {
    LookupError::MissingData(format!("{kind} pattern for source {key}"))
}
