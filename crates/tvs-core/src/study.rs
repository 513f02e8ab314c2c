//! Study-wide edit state: the source arena and the scenario set.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};
use tvs_model::{
    ErrorLog, ExtDbKey, FM_CHANNEL_MAX, FM_CHANNEL_MIN, PatternPoint, Provenance, RecordType,
    ScenarioKey, SourceKey, StudyType, TV_CHANNEL_MAX, TV_CHANNEL_MIN,
};

use crate::save::{BatchInsert, SaveOptions, SqlExecutor, sql_bool, sql_key_list, sql_text};
use crate::scenario::delete_scenario_tree;
use crate::{PersistError, Result, ScenarioEditData, SharedSourceIndex, SourceArena, SourceEditData};

/// Tables holding one row per source, by record type.
pub const SOURCE_TABLES: [&str; 3] = ["source_tv", "source_wl", "source_fm"];

/// Pattern point tables, each keyed by `source_key`.
pub const PATTERN_TABLES: [&str; 3] = [
    "source_horizontal_pattern",
    "source_vertical_pattern",
    "source_matrix_pattern",
];

const SOURCE_COLUMNS: &str = "source_key, parent_source_key, site_number, service, country, \
     facility_id, call_sign, channel, city, state, latitude, longitude, height_amsl, \
     overall_haat, peak_erp, is_locked, user_record_id, ext_db_key, ext_record_id, \
     original_source_key, horizontal_pattern_name, horizontal_pattern_orientation, \
     vertical_pattern_name, vertical_pattern_electrical_tilt, vertical_pattern_mechanical_tilt, \
     vertical_pattern_mechanical_tilt_orientation, matrix_pattern_name, \
     use_generic_vertical_pattern, attributes";

fn source_table(record_type: RecordType) -> &'static str {
    match record_type {
        RecordType::Tv => SOURCE_TABLES[0],
        RecordType::Wireless => SOURCE_TABLES[1],
        RecordType::Fm => SOURCE_TABLES[2],
    }
}

#[derive(Debug, Clone)]
pub struct StudyEditData {
    name: String,
    study_type: StudyType,
    min_channel: i32,
    max_channel: i32,
    sources: SourceArena,
    scenarios: Vec<ScenarioEditData>,
    next_scenario_key: u32,
    deleted_scenario_keys: BTreeSet<ScenarioKey>,
}

impl StudyEditData {
    pub fn new(name: impl Into<String>, study_type: StudyType) -> Self {
        let (min_channel, max_channel) = match study_type {
            StudyType::Fm => (FM_CHANNEL_MIN, FM_CHANNEL_MAX),
            _ => (TV_CHANNEL_MIN, TV_CHANNEL_MAX),
        };
        Self {
            name: name.into(),
            study_type,
            min_channel,
            max_channel,
            sources: SourceArena::new(),
            scenarios: Vec::new(),
            next_scenario_key: 1,
            deleted_scenario_keys: BTreeSet::new(),
        }
    }

    /// Narrows the channel window records of the study's primary type must fit.
    pub fn with_channel_range(mut self, min_channel: i32, max_channel: i32) -> Self {
        self.min_channel = min_channel;
        self.max_channel = max_channel;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn study_type(&self) -> StudyType {
        self.study_type
    }

    pub fn min_channel(&self) -> i32 {
        self.min_channel
    }

    pub fn max_channel(&self) -> i32 {
        self.max_channel
    }

    /// Whether a record of `record_type` on `channel` may appear in this study.
    pub fn channel_in_range(&self, record_type: RecordType, channel: i32) -> bool {
        let primary = if self.study_type == StudyType::Fm {
            RecordType::Fm
        } else {
            RecordType::Tv
        };
        if record_type == primary {
            return (self.min_channel..=self.max_channel).contains(&channel);
        }
        record_type
            .channel_range()
            .is_none_or(|range| range.contains(&channel))
    }

    pub fn sources(&self) -> &SourceArena {
        &self.sources
    }

    pub fn sources_mut(&mut self) -> &mut SourceArena {
        &mut self.sources
    }

    pub fn get_source(&self, key: SourceKey) -> Option<&SourceEditData> {
        self.sources.get(key)
    }

    pub fn add_or_replace_source(&mut self, source: SourceEditData) -> Result<()> {
        self.sources.add_or_replace_source(source)
    }

    /// Evicts the source if no scenario references it.
    pub fn remove_source(&mut self, key: SourceKey) -> bool {
        self.sources.remove_source(key)
    }

    pub fn new_source_key(&mut self) -> SourceKey {
        self.sources.new_source_key()
    }

    pub fn new_scenario_key(&mut self) -> ScenarioKey {
        let key = ScenarioKey::new(self.next_scenario_key);
        self.next_scenario_key += 1;
        key
    }

    pub fn scenarios(&self) -> &[ScenarioEditData] {
        &self.scenarios
    }

    pub fn scenario(&self, key: ScenarioKey) -> Option<&ScenarioEditData> {
        self.scenarios.iter().find(|scenario| scenario.key() == key)
    }

    /// Split borrow of one scenario and the source arena for editing.
    pub fn edit_scenario(
        &mut self,
        key: ScenarioKey,
    ) -> Option<(&mut ScenarioEditData, &mut SourceArena)> {
        let scenario = self
            .scenarios
            .iter_mut()
            .find(|scenario| scenario.key() == key)?;
        Some((scenario, &mut self.sources))
    }

    pub fn scenario_by_name(&self, name: &str) -> Option<&ScenarioEditData> {
        self.scenarios.iter().find(|scenario| scenario.name() == name)
    }

    /// `base` if unused, otherwise `base (n)` with the smallest free n >= 2.
    pub fn unique_scenario_name(&self, base: &str) -> String {
        if self.scenario_by_name(base).is_none() {
            return base.to_string();
        }
        let mut n = 2;
        loop {
            let candidate = format!("{base} ({n})");
            if self.scenario_by_name(&candidate).is_none() {
                return candidate;
            }
            n += 1;
        }
    }

    pub fn add_scenario(&mut self, scenario: ScenarioEditData) {
        let key = scenario.key().get();
        if key >= self.next_scenario_key {
            self.next_scenario_key = key + 1;
        }
        for child in scenario.child_scenarios() {
            if child.key().get() >= self.next_scenario_key {
                self.next_scenario_key = child.key().get() + 1;
            }
        }
        info!(scenario = %scenario.name(), key, "added scenario");
        self.scenarios.push(scenario);
    }

    /// Removes a scenario and releases its sources. Permanent scenarios stay.
    pub fn remove_scenario(&mut self, key: ScenarioKey) -> bool {
        let Some(index) = self
            .scenarios
            .iter()
            .position(|scenario| scenario.key() == key && !scenario.is_permanent())
        else {
            return false;
        };
        let scenario = self.scenarios.remove(index);
        if scenario.saved().is_some() {
            self.deleted_scenario_keys.insert(key);
        }
        scenario.release(&mut self.sources);
        true
    }

    /// Adds a non-permanent copy of scenario `key` named `name`.
    pub fn duplicate_scenario(
        &mut self,
        key: ScenarioKey,
        name: &str,
        errors: &mut ErrorLog,
    ) -> Option<ScenarioKey> {
        let name = self.unique_scenario_name(name);
        let new_key = ScenarioKey::new(self.next_scenario_key);
        let index = self.scenarios.iter().position(|scenario| scenario.key() == key)?;
        let copy = self.scenarios[index].duplicate(new_key, name, &mut self.sources, errors)?;
        self.next_scenario_key += 1;
        self.add_scenario(copy);
        Some(new_key)
    }

    /// Reachable by-reference sources of one dataset, for import caches.
    pub fn load_shared_source_index(&self, ext_db_key: ExtDbKey) -> SharedSourceIndex {
        self.sources.shared_source_index(ext_db_key)
    }

    pub fn is_data_valid(&self, errors: &mut ErrorLog) -> bool {
        let mut valid = true;
        if self.name.trim().is_empty() {
            errors.report_error("Study name must be provided");
            valid = false;
        }
        for scenario in &self.scenarios {
            valid &= scenario.is_data_valid(errors);
        }
        for source in self.sources.iter() {
            valid &= source.is_data_valid(errors);
        }
        valid
    }

    pub fn is_data_changed(&self) -> bool {
        !self.deleted_scenario_keys.is_empty()
            || !self.sources.evicted().is_empty()
            || self.sources.iter().any(SourceEditData::is_data_changed)
            || self.scenarios.iter().any(ScenarioEditData::is_data_changed)
    }

    /// Validates, writes every pending change, then clears tracking.
    ///
    /// Callers that commit the statements separately use
    /// [`write_changes`](Self::write_changes) and call
    /// [`did_save`](Self::did_save) once the commit succeeds.
    pub fn save(
        &mut self,
        executor: &mut dyn SqlExecutor,
        options: SaveOptions,
    ) -> std::result::Result<(), PersistError> {
        self.write_changes(executor, options)?;
        self.did_save();
        Ok(())
    }

    /// Validates, then writes sources, then scenarios. Tracking is left as is.
    pub fn write_changes(
        &self,
        executor: &mut dyn SqlExecutor,
        options: SaveOptions,
    ) -> std::result::Result<(), PersistError> {
        let mut errors = ErrorLog::new();
        if !self.is_data_valid(&mut errors) {
            let message = errors.last_error().unwrap_or("validation failed").to_string();
            return Err(PersistError::Invalid(message));
        }

        let evicted = self.sources.evicted();
        if !evicted.is_empty() {
            delete_source_rows(executor, evicted, true)?;
        }
        self.save_sources(executor, options)?;

        for key in &self.deleted_scenario_keys {
            delete_scenario_tree(executor, *key)?;
        }
        for scenario in &self.scenarios {
            if scenario.is_data_changed() {
                scenario.save(executor, options)?;
            }
        }
        info!(study = %self.name, scenarios = self.scenarios.len(), sources = self.sources.len(), "wrote study changes");
        Ok(())
    }

    /// Marks the current state as saved.
    pub fn did_save(&mut self) {
        self.sources.did_save();
        for scenario in &mut self.scenarios {
            scenario.did_save();
        }
        self.deleted_scenario_keys.clear();
    }

    fn save_sources(
        &self,
        executor: &mut dyn SqlExecutor,
        options: SaveOptions,
    ) -> std::result::Result<(), PersistError> {
        let changed: Vec<&SourceEditData> = self
            .sources
            .iter()
            .filter(|source| source.is_data_changed())
            .collect();
        if changed.is_empty() {
            return Ok(());
        }

        let with_patterns: BTreeSet<SourceKey> = changed
            .iter()
            .filter(|source| patterns_in_memory(source))
            .map(|source| source.key())
            .collect();
        let without_patterns: BTreeSet<SourceKey> = changed
            .iter()
            .map(|source| source.key())
            .filter(|key| !with_patterns.contains(key))
            .collect();
        if !with_patterns.is_empty() {
            delete_source_rows(executor, &with_patterns, true)?;
        }
        if !without_patterns.is_empty() {
            delete_source_rows(executor, &without_patterns, false)?;
        }

        for table in SOURCE_TABLES {
            let mut batch = BatchInsert::new(executor, table, SOURCE_COLUMNS, options);
            for source in &changed {
                if source_table(source.record_type()) != table {
                    continue;
                }
                batch.push(&source_values(source, None))?;
                for site in source.dts_sources() {
                    batch.push(&source_values(site, Some(source.key())))?;
                }
            }
            batch.finish()?;
        }

        let pattern_sources: Vec<&SourceEditData> = changed
            .iter()
            .copied()
            .filter(|source| with_patterns.contains(&source.key()))
            .flat_map(|source| std::iter::once(source).chain(source.dts_sources()))
            .collect();
        save_pattern_rows(executor, &pattern_sources, options)?;
        debug!(count = changed.len(), "saved sources");
        Ok(())
    }
}

/// All declared pattern points of a source and its DTS sites are loaded.
fn patterns_in_memory(source: &SourceEditData) -> bool {
    source.station().patterns_loaded()
        && source
            .dts_sources()
            .iter()
            .all(|site| site.station().patterns_loaded())
}

fn delete_source_rows(
    executor: &mut dyn SqlExecutor,
    keys: &BTreeSet<SourceKey>,
    include_patterns: bool,
) -> std::result::Result<(), PersistError> {
    let list = sql_key_list(keys.iter().copied());
    if include_patterns {
        for pattern_table in PATTERN_TABLES {
            let children: String = SOURCE_TABLES
                .iter()
                .map(|table| {
                    format!(" OR source_key IN (SELECT source_key FROM {table} WHERE parent_source_key IN ({list}))")
                })
                .collect();
            executor.execute(&format!(
                "DELETE FROM {pattern_table} WHERE source_key IN ({list}){children}"
            ))?;
        }
    }
    for table in SOURCE_TABLES {
        executor.execute(&format!(
            "DELETE FROM {table} WHERE source_key IN ({list}) OR parent_source_key IN ({list})"
        ))?;
    }
    Ok(())
}

fn save_pattern_rows(
    executor: &mut dyn SqlExecutor,
    sources: &[&SourceEditData],
    options: SaveOptions,
) -> std::result::Result<(), PersistError> {
    let points = |key: SourceKey, points: &[PatternPoint]| {
        points
            .iter()
            .map(|point| format!("{key},{},{}", point.angle, point.field))
            .collect::<Vec<_>>()
    };

    let mut horizontal = BatchInsert::new(
        executor,
        PATTERN_TABLES[0],
        "source_key, azimuth, relative_field",
        options,
    );
    for source in sources {
        if let Some(pattern) = source
            .station()
            .horizontal_pattern
            .as_ref()
            .and_then(|info| info.pattern.as_ref())
        {
            for row in points(source.key(), pattern.points()) {
                horizontal.push(&row)?;
            }
        }
    }
    horizontal.finish()?;

    let mut vertical = BatchInsert::new(
        executor,
        PATTERN_TABLES[1],
        "source_key, depression_angle, relative_field",
        options,
    );
    for source in sources {
        if let Some(pattern) = source
            .station()
            .vertical_pattern
            .as_ref()
            .and_then(|info| info.pattern.as_ref())
        {
            for row in points(source.key(), pattern.points()) {
                vertical.push(&row)?;
            }
        }
    }
    vertical.finish()?;

    let mut matrix = BatchInsert::new(
        executor,
        PATTERN_TABLES[2],
        "source_key, azimuth, depression_angle, relative_field",
        options,
    );
    for source in sources {
        let Some(pattern) = source
            .station()
            .matrix_pattern
            .as_ref()
            .and_then(|info| info.pattern.as_ref())
        else {
            continue;
        };
        for slice in pattern.slices() {
            for point in slice.pattern.points() {
                matrix.push(&format!(
                    "{},{},{},{}",
                    source.key(),
                    slice.azimuth,
                    point.angle,
                    point.field
                ))?;
            }
        }
    }
    matrix.finish()
}

fn sql_opt_text(value: Option<&str>) -> String {
    value.map_or_else(|| "NULL".to_string(), sql_text)
}

fn sql_opt<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "NULL".to_string(), |value| value.to_string())
}

/// Persistent attributes as `name=value` lines.
pub fn encode_attributes<'a>(attributes: impl IntoIterator<Item = (&'a String, &'a String)>) -> String {
    attributes
        .into_iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Inverse of [`encode_attributes`]. Lines without `=` are skipped.
pub fn decode_attributes(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .filter_map(|line| line.split_once('='))
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

fn source_values(source: &SourceEditData, parent: Option<SourceKey>) -> String {
    let station = source.station();
    let (user_record_id, ext_db_key, ext_record_id) = match source.provenance() {
        Provenance::None => (None, None, None),
        Provenance::UserRecord { id } => (Some(*id), None, None),
        Provenance::External {
            ext_db_key,
            record_id,
        } => (None, Some(ext_db_key.get()), Some(record_id.as_str())),
    };
    let horizontal = station.horizontal_pattern.as_ref();
    let vertical = station.vertical_pattern.as_ref();
    let matrix = station.matrix_pattern.as_ref();
    [
        source.key().to_string(),
        sql_opt(parent),
        station.site_number.to_string(),
        sql_text(station.service.code()),
        sql_text(station.country.code()),
        station.facility_id.to_string(),
        sql_text(&station.call_sign),
        station.channel.to_string(),
        sql_text(&station.city),
        sql_text(&station.state),
        station.latitude.to_string(),
        station.longitude.to_string(),
        station.height_amsl.to_string(),
        station.overall_haat.to_string(),
        station.peak_erp.to_string(),
        sql_bool(source.is_locked()).to_string(),
        sql_opt(user_record_id),
        sql_opt(ext_db_key),
        sql_opt_text(ext_record_id),
        sql_opt(source.original_source_key()),
        sql_opt_text(horizontal.map(|info| info.name.as_str())),
        sql_opt(horizontal.map(|info| info.orientation)),
        sql_opt_text(vertical.map(|info| info.name.as_str())),
        sql_opt(vertical.map(|info| info.electrical_tilt)),
        sql_opt(vertical.map(|info| info.mechanical_tilt)),
        sql_opt(vertical.map(|info| info.mechanical_tilt_orientation)),
        sql_opt_text(matrix.map(|info| info.name.as_str())),
        sql_bool(station.use_generic_vertical_pattern).to_string(),
        sql_text(&encode_attributes(source.attributes())),
    ]
    .join(",")
}
