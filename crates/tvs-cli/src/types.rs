use std::path::PathBuf;

use serde::Serialize;
use tvs_model::{ExtDbInfo, LogEntry, Severity};

/// Outcome of `tvstudy import`.
#[derive(Debug, Serialize)]
pub struct ImportReport {
    pub study: String,
    pub study_type: String,
    pub scenarios: Vec<ScenarioRow>,
    /// Distinct sources held by the study.
    pub sources: usize,
    pub lookup_calls: usize,
    pub valid: bool,
    pub saved_to: Option<PathBuf>,
    pub messages: Vec<LogEntry>,
}

impl ImportReport {
    pub fn has_errors(&self) -> bool {
        !self.valid
            || self
                .messages
                .iter()
                .any(|entry| entry.severity == Severity::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|entry| entry.severity == Severity::Warning)
            .count()
    }
}

#[derive(Debug, Serialize)]
pub struct ScenarioRow {
    pub key: u32,
    pub name: String,
    pub sources: usize,
    pub desired: usize,
    pub undesired: usize,
    pub children: usize,
}

/// One source listed by `tvstudy list`.
#[derive(Debug, Serialize)]
pub struct SourceRow {
    pub call_sign: String,
    pub service: String,
    pub country: String,
    pub channel: i32,
    pub city: String,
    pub state: String,
    pub locked: bool,
    pub record_id: Option<String>,
    pub dts_sites: usize,
}

#[derive(Debug, Serialize)]
pub struct ListReport {
    pub sources: Vec<SourceRow>,
    pub messages: Vec<LogEntry>,
}

#[derive(Debug, Serialize)]
pub struct ExtDbRow {
    pub key: i32,
    pub db_type: String,
    pub version: i32,
    pub date: String,
    pub name: String,
    pub locked: bool,
}

impl From<&ExtDbInfo> for ExtDbRow {
    fn from(info: &ExtDbInfo) -> Self {
        Self {
            key: info.key.get(),
            db_type: info.db_type.to_string(),
            version: info.version,
            date: info.date.format("%Y-%m-%d").to_string(),
            name: info.name.clone(),
            locked: info.is_locked,
        }
    }
}
