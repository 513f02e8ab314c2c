//! Editable scenario: the unit of change detection and save.

use std::collections::BTreeMap;

use tracing::debug;
use tvs_model::{ErrorLog, Parameter, Scenario, ScenarioKey, ScenarioType};

use crate::save::{BatchInsert, SaveOptions, SqlExecutor, sql_bool, sql_text};
use crate::{
    EditError, PersistError, Result, SourceArena, SourceListData, SourceRemovalPolicy,
};

const SCENARIO_COLUMNS: &str =
    "scenario_key, name, description, scenario_type, is_permanent, parent_scenario_key";
const SCENARIO_SOURCE_COLUMNS: &str =
    "scenario_key, source_key, is_desired, is_undesired, is_permanent";
const SCENARIO_PARAMETER_COLUMNS: &str = "scenario_key, parameter_key, value_index, value";

#[derive(Debug, Clone)]
pub struct ScenarioEditData {
    key: ScenarioKey,
    name: String,
    description: String,
    scenario_type: ScenarioType,
    is_permanent: bool,
    parameters: Vec<Parameter>,
    source_list: SourceListData,
    parent_scenario_key: Option<ScenarioKey>,
    child_scenarios: BTreeMap<ScenarioKey, ScenarioEditData>,
    child_scenarios_changed: bool,
    saved: Option<Scenario>,
}

impl ScenarioEditData {
    pub fn new(
        key: ScenarioKey,
        name: impl Into<String>,
        scenario_type: ScenarioType,
        is_permanent: bool,
    ) -> Self {
        Self {
            key,
            name: name.into(),
            description: String::new(),
            scenario_type,
            is_permanent,
            parameters: Vec::new(),
            source_list: SourceListData::new(SourceRemovalPolicy::for_scenario_type(scenario_type)),
            parent_scenario_key: None,
            child_scenarios: BTreeMap::new(),
            child_scenarios_changed: false,
            saved: None,
        }
    }

    pub fn key(&self) -> ScenarioKey {
        self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    pub fn scenario_type(&self) -> ScenarioType {
        self.scenario_type
    }

    pub fn is_permanent(&self) -> bool {
        self.is_permanent
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn parameter(&self, key: i32) -> Option<&Parameter> {
        self.parameters.iter().find(|parameter| parameter.key == key)
    }

    /// Sets one indexed value, creating the parameter on first use.
    pub fn set_parameter_value(&mut self, key: i32, index: usize, value: impl Into<String>) -> Result<()> {
        match self.parameters.iter_mut().find(|parameter| parameter.key == key) {
            Some(parameter) => parameter.set_value(index, value)?,
            None => {
                let mut parameter = Parameter::new(key);
                parameter.set_value(index, value)?;
                self.parameters.push(parameter);
            }
        }
        Ok(())
    }

    pub fn source_list(&self) -> &SourceListData {
        &self.source_list
    }

    pub fn source_list_mut(&mut self) -> &mut SourceListData {
        &mut self.source_list
    }

    pub fn parent_scenario_key(&self) -> Option<ScenarioKey> {
        self.parent_scenario_key
    }

    pub fn is_child(&self) -> bool {
        self.parent_scenario_key.is_some()
    }

    pub fn child_scenarios(&self) -> impl Iterator<Item = &ScenarioEditData> {
        self.child_scenarios.values()
    }

    pub fn child_scenario(&self, key: ScenarioKey) -> Option<&ScenarioEditData> {
        self.child_scenarios.get(&key)
    }

    pub fn saved(&self) -> Option<&Scenario> {
        self.saved.as_ref()
    }

    /// Attaches `child` under this scenario. Nesting is one level deep.
    pub fn add_child_scenario(&mut self, mut child: ScenarioEditData) -> Result<()> {
        if self.is_child() {
            return Err(EditError::NestedChild(self.name.clone()));
        }
        if !child.child_scenarios.is_empty() {
            return Err(EditError::NestedChild(child.name.clone()));
        }
        child.parent_scenario_key = Some(self.key);
        self.child_scenarios.insert(child.key, child);
        self.child_scenarios_changed = true;
        Ok(())
    }

    pub fn remove_all_child_scenarios(&mut self, arena: &mut SourceArena) {
        if self.child_scenarios.is_empty() {
            return;
        }
        for (_, child) in std::mem::take(&mut self.child_scenarios) {
            child.release(arena);
        }
        self.child_scenarios_changed = true;
    }

    /// Releases every source this scenario and its children reference.
    pub fn release(self, arena: &mut SourceArena) {
        for (_, child) in self.child_scenarios {
            child.release(arena);
        }
        self.source_list.release_all(arena);
    }

    pub fn is_data_valid(&self, errors: &mut ErrorLog) -> bool {
        if self.name.trim().is_empty() {
            errors.report_error("Scenario name must be provided");
            return false;
        }
        let mut list_errors = ErrorLog::new();
        if !self.source_list.is_data_valid(&mut list_errors) {
            for entry in list_errors.entries() {
                errors.report_error(format!("Scenario '{}': {}", self.name, entry.message));
            }
            return false;
        }
        self.child_scenarios
            .values()
            .all(|child| child.is_data_valid(errors))
    }

    pub fn is_data_changed(&self) -> bool {
        let Some(saved) = &self.saved else {
            return true;
        };
        self.name != saved.name
            || self.description != saved.description
            || self.parameters != saved.parameters
            || self.source_list.is_data_changed()
            || self.source_list.flags_differ_from(saved)
            || self.child_scenarios_changed
    }

    /// Writes this scenario, and its children when they were rebuilt.
    ///
    /// Existing rows are deleted first and current rows bulk-inserted. There
    /// is no enclosing transaction; a failure leaves earlier statements applied.
    pub fn save(
        &self,
        executor: &mut dyn SqlExecutor,
        options: SaveOptions,
    ) -> std::result::Result<(), PersistError> {
        if self.child_scenarios_changed {
            delete_child_scenario_rows(executor, self.key)?;
        }
        delete_scenario_rows(executor, self.key)?;

        let mut rows: Vec<&ScenarioEditData> = vec![self];
        if self.child_scenarios_changed {
            rows.extend(self.child_scenarios.values());
        }

        let mut scenarios = BatchInsert::new(executor, "scenario", SCENARIO_COLUMNS, options);
        for scenario in &rows {
            scenarios.push(&format!(
                "{},{},{},{},{},{}",
                scenario.key,
                sql_text(&scenario.name),
                sql_text(&scenario.description),
                scenario.scenario_type.code(),
                sql_bool(scenario.is_permanent),
                scenario.parent_scenario_key.map_or(0, ScenarioKey::get),
            ))?;
        }
        scenarios.finish()?;

        let mut sources =
            BatchInsert::new(executor, "scenario_source", SCENARIO_SOURCE_COLUMNS, options);
        for scenario in &rows {
            for item in scenario.source_list.items() {
                sources.push(&format!(
                    "{},{},{},{},{}",
                    scenario.key,
                    item.key(),
                    sql_bool(item.is_desired()),
                    sql_bool(item.is_undesired()),
                    sql_bool(item.is_permanent()),
                ))?;
            }
        }
        sources.finish()?;

        let mut parameters = BatchInsert::new(
            executor,
            "scenario_parameter_data",
            SCENARIO_PARAMETER_COLUMNS,
            options,
        );
        for scenario in &rows {
            for parameter in &scenario.parameters {
                for (index, value) in parameter.values.iter().enumerate() {
                    parameters.push(&format!(
                        "{},{},{},{}",
                        scenario.key,
                        parameter.key,
                        index,
                        sql_text(value)
                    ))?;
                }
            }
        }
        parameters.finish()?;
        debug!(scenario = %self.name, key = %self.key, "saved scenario");
        Ok(())
    }

    /// Clears change tracking and freezes the current state as saved.
    pub fn did_save(&mut self) {
        self.source_list.did_save();
        for child in self.child_scenarios.values_mut() {
            child.did_save();
        }
        self.child_scenarios_changed = false;
        self.saved = Some(self.snapshot());
    }

    pub fn snapshot(&self) -> Scenario {
        Scenario {
            key: self.key,
            name: self.name.clone(),
            description: self.description.clone(),
            scenario_type: self.scenario_type,
            is_permanent: self.is_permanent,
            parameters: self.parameters.clone(),
            sources: self.source_list.to_scenario_sources(),
            parent_scenario_key: self.parent_scenario_key,
            child_scenario_keys: self.child_scenarios.keys().copied().collect(),
        }
    }

    /// Copy for "save as". The copy is never permanent and has no children.
    pub fn duplicate(
        &self,
        new_key: ScenarioKey,
        name: impl Into<String>,
        arena: &mut SourceArena,
        errors: &mut ErrorLog,
    ) -> Option<ScenarioEditData> {
        let source_list = self.source_list.duplicate(arena, errors)?;
        Some(ScenarioEditData {
            key: new_key,
            name: name.into(),
            description: self.description.clone(),
            scenario_type: self.scenario_type,
            is_permanent: false,
            parameters: self.parameters.clone(),
            source_list,
            parent_scenario_key: None,
            child_scenarios: BTreeMap::new(),
            child_scenarios_changed: false,
            saved: None,
        })
    }
}

fn delete_child_scenario_rows(
    executor: &mut dyn SqlExecutor,
    key: ScenarioKey,
) -> std::result::Result<(), PersistError> {
    let children = format!("SELECT scenario_key FROM scenario WHERE parent_scenario_key = {key}");
    executor.execute(&format!(
        "DELETE FROM scenario_source WHERE scenario_key IN ({children})"
    ))?;
    executor.execute(&format!(
        "DELETE FROM scenario_parameter_data WHERE scenario_key IN ({children})"
    ))?;
    executor.execute(&format!(
        "DELETE FROM scenario WHERE parent_scenario_key = {key}"
    ))?;
    Ok(())
}

fn delete_scenario_rows(
    executor: &mut dyn SqlExecutor,
    key: ScenarioKey,
) -> std::result::Result<(), PersistError> {
    executor.execute(&format!("DELETE FROM scenario WHERE scenario_key = {key}"))?;
    executor.execute(&format!(
        "DELETE FROM scenario_source WHERE scenario_key = {key}"
    ))?;
    executor.execute(&format!(
        "DELETE FROM scenario_parameter_data WHERE scenario_key = {key}"
    ))?;
    Ok(())
}

/// Removes all stored rows of a deleted scenario and its children.
pub(crate) fn delete_scenario_tree(
    executor: &mut dyn SqlExecutor,
    key: ScenarioKey,
) -> std::result::Result<(), PersistError> {
    delete_child_scenario_rows(executor, key)?;
    delete_scenario_rows(executor, key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tvs_model::{Country, Provenance, Service, SourceKey, StationData};

    use crate::SourceEditData;

    fn scenario_with_source(arena: &mut SourceArena, key: u32) -> ScenarioEditData {
        let mut scenario =
            ScenarioEditData::new(ScenarioKey::new(key), "Base", ScenarioType::Default, false);
        let mut station = StationData::new(Service::from_code("DT").unwrap(), Country::Us);
        station.channel = 20;
        station.peak_erp = 10.0;
        let source = SourceEditData::new(arena.new_source_key(), station, false, Provenance::None);
        scenario
            .source_list_mut()
            .add_or_replace(arena, source, true, false, false)
            .unwrap();
        scenario
    }

    #[test]
    fn child_cannot_have_children() {
        let mut arena = SourceArena::new();
        let mut parent = scenario_with_source(&mut arena, 1);
        let child = scenario_with_source(&mut arena, 2);
        parent.add_child_scenario(child).unwrap();
        let mut child = parent.child_scenario(ScenarioKey::new(2)).unwrap().clone();
        assert_eq!(child.parent_scenario_key(), Some(ScenarioKey::new(1)));
        let grandchild = scenario_with_source(&mut arena, 3);
        assert!(matches!(
            child.add_child_scenario(grandchild),
            Err(EditError::NestedChild(_))
        ));
    }

    #[test]
    fn change_detection_against_snapshot() {
        let mut arena = SourceArena::new();
        let mut scenario = scenario_with_source(&mut arena, 1);
        assert!(scenario.is_data_changed());
        scenario.did_save();
        assert!(!scenario.is_data_changed());

        scenario.source_list_mut().set_is_undesired(0, true);
        assert!(scenario.is_data_changed());
        scenario.did_save();

        scenario.set_parameter_value(7, 2, "40").unwrap();
        assert_eq!(scenario.parameter(7).unwrap().values, vec!["", "", "40"]);
        assert!(scenario.is_data_changed());
        scenario.did_save();

        scenario.remove_all_child_scenarios(&mut arena);
        assert!(!scenario.is_data_changed());
        let child = scenario_with_source(&mut arena, 2);
        scenario.add_child_scenario(child).unwrap();
        assert!(scenario.is_data_changed());
    }

    #[test]
    fn validity_needs_a_name() {
        let mut arena = SourceArena::new();
        let mut scenario = scenario_with_source(&mut arena, 1);
        scenario.set_name("  ");
        let mut errors = ErrorLog::new();
        assert!(!scenario.is_data_valid(&mut errors));
        assert!(errors.contains("name"));
    }

    #[test]
    fn save_deletes_then_batches_inserts() {
        let mut arena = SourceArena::new();
        let mut scenario = scenario_with_source(&mut arena, 4);
        scenario.set_description("O'Hare");
        scenario.set_parameter_value(10, 0, "1.5").unwrap();
        let mut log: Vec<String> = Vec::new();
        scenario.save(&mut log, SaveOptions::default()).unwrap();
        insta::assert_snapshot!(log.join("\n"), @r"
        DELETE FROM scenario WHERE scenario_key = 4
        DELETE FROM scenario_source WHERE scenario_key = 4
        DELETE FROM scenario_parameter_data WHERE scenario_key = 4
        INSERT INTO scenario (scenario_key, name, description, scenario_type, is_permanent, parent_scenario_key) VALUES (4,'Base','O''Hare',1,false,0)
        INSERT INTO scenario_source (scenario_key, source_key, is_desired, is_undesired, is_permanent) VALUES (4,1,true,false,false)
        INSERT INTO scenario_parameter_data (scenario_key, parameter_key, value_index, value) VALUES (4,10,0,'1.5')
        ");
    }

    #[test]
    fn save_rebuilds_children_when_changed() {
        let mut arena = SourceArena::new();
        let mut parent = scenario_with_source(&mut arena, 1);
        let child = scenario_with_source(&mut arena, 2);
        parent.add_child_scenario(child).unwrap();
        let mut log: Vec<String> = Vec::new();
        parent.save(&mut log, SaveOptions::default()).unwrap();
        assert!(log[0].starts_with("DELETE FROM scenario_source WHERE scenario_key IN (SELECT"));
        assert_eq!(log[2], "DELETE FROM scenario WHERE parent_scenario_key = 1");
        assert!(log[6].ends_with("VALUES (1,'Base','',1,false,0),(2,'Base','',1,false,1)"));
    }

    #[test]
    fn duplicate_is_never_permanent() {
        let mut arena = SourceArena::new();
        let mut scenario =
            ScenarioEditData::new(ScenarioKey::new(1), "Proposal", ScenarioType::Default, true);
        let mut station = StationData::new(Service::from_code("DT").unwrap(), Country::Us);
        station.channel = 30;
        let source = SourceEditData::new(arena.new_source_key(), station, false, Provenance::None);
        scenario
            .source_list_mut()
            .add_or_replace(&mut arena, source, true, false, false)
            .unwrap();
        let mut errors = ErrorLog::new();
        let copy = scenario
            .duplicate(ScenarioKey::new(2), "Proposal (2)", &mut arena, &mut errors)
            .unwrap();
        assert!(!copy.is_permanent());
        assert_ne!(copy.source_list().item(0).unwrap().key(), SourceKey::new(1));
    }
}
