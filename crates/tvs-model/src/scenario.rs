use serde::{Deserialize, Serialize};

use crate::{ModelError, Result, ScenarioKey, ScenarioType, SourceKey};

/// Largest number of values a single parameter can hold.
pub const MAX_PARAMETER_VALUES: usize = 100;

/// A scenario parameter: an indexed list of textual values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub key: i32,
    pub values: Vec<String>,
}

impl Parameter {
    pub fn new(key: i32) -> Self {
        Self {
            key,
            values: Vec::new(),
        }
    }

    /// Sets the value at `index`, growing the list with empty values as needed.
    ///
    /// Fails when `index` is at or past [`MAX_PARAMETER_VALUES`].
    pub fn set_value(&mut self, index: usize, value: impl Into<String>) -> Result<()> {
        let len = index
            .checked_add(1)
            .filter(|len| *len <= MAX_PARAMETER_VALUES)
            .ok_or(ModelError::ParameterIndex {
                key: self.key,
                index,
                max: MAX_PARAMETER_VALUES,
            })?;
        if self.values.len() < len {
            self.values.resize(len, String::new());
        }
        if let Some(slot) = self.values.get_mut(index) {
            *slot = value.into();
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioSource {
    pub source_key: SourceKey,
    pub is_desired: bool,
    pub is_undesired: bool,
    pub is_permanent: bool,
}

/// Immutable snapshot of a scenario as last saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub key: ScenarioKey,
    pub name: String,
    pub description: String,
    pub scenario_type: ScenarioType,
    pub is_permanent: bool,
    pub parameters: Vec<Parameter>,
    pub sources: Vec<ScenarioSource>,
    pub parent_scenario_key: Option<ScenarioKey>,
    pub child_scenario_keys: Vec<ScenarioKey>,
}

impl Scenario {
    pub fn source(&self, key: SourceKey) -> Option<&ScenarioSource> {
        self.sources.iter().find(|entry| entry.source_key == key)
    }
}
