//! Import settings read from `tvstudy.toml`.
//!
//! Every field has a default, and a missing file means all defaults.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use tvs_core::DEFAULT_MAX_STATEMENT_LENGTH;
use tvs_model::{ExtDbKey, StudyType};

pub const CONFIG_FILENAME: &str = "tvstudy.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub study: StudySettings,
    pub lookup: LookupSettings,
    pub persist: PersistSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudySettings {
    pub name: String,
    pub study_type: StudyType,
    pub min_channel: i32,
    pub max_channel: i32,
}

impl Default for StudySettings {
    fn default() -> Self {
        Self {
            name: "Imported".to_string(),
            study_type: StudyType::Tv,
            min_channel: 2,
            max_channel: 69,
        }
    }
}

/// Station data used to resolve by-reference records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupSettings {
    /// SQLite file holding the external datasets.
    pub database: Option<PathBuf>,
    /// Dataset key, or a negative pseudo-key for the newest dataset of a type.
    pub primary: Option<i32>,
    pub alternate: Option<i32>,
}

impl LookupSettings {
    pub fn primary_key(&self) -> Option<ExtDbKey> {
        self.primary.map(ExtDbKey::new)
    }

    pub fn alternate_key(&self) -> Option<ExtDbKey> {
        self.alternate.map(ExtDbKey::new)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistSettings {
    pub max_statement_length: usize,
}

impl Default for PersistSettings {
    fn default() -> Self {
        Self {
            max_statement_length: DEFAULT_MAX_STATEMENT_LENGTH,
        }
    }
}

impl ImportConfig {
    /// Reads `path`, or `tvstudy.toml` in the working directory when `path`
    /// is `None`. An explicit path must exist; the implicit one may not.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(CONFIG_FILENAME), false),
        };
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if !required && err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("read config {}", path.display()));
            }
        };
        let mut config =
            Self::parse(&content).with_context(|| format!("parse config {}", path.display()))?;
        if let Some(parent) = path.parent() {
            config.resolve_paths(parent);
        }
        info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Relative lookup database paths resolve against `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        if let Some(database) = &self.lookup.database
            && database.is_relative()
        {
            self.lookup.database = Some(base.join(database));
        }
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.study.min_channel <= self.study.max_channel,
            "study.min_channel {} is above study.max_channel {}",
            self.study.min_channel,
            self.study.max_channel
        );
        anyhow::ensure!(
            self.persist.max_statement_length > 0,
            "persist.max_statement_length must be positive"
        );
        anyhow::ensure!(
            self.lookup.primary.is_some() || self.lookup.alternate.is_none(),
            "lookup.alternate needs lookup.primary"
        );
        Ok(())
    }
}
