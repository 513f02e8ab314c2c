use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail, ensure};
use tracing::{info, info_span, warn};
use tvs_core::{SaveOptions, SourceEditData, StudyEditData};
use tvs_model::{ErrorLog, ExtDbKey};
use tvs_store::{ExtDbLock, LockOutcome, SqliteExtDb, SqliteStore, connect_and_lock, force_unlock};
use tvs_xml::{ParseOptions, ParseXml};

use crate::config::{ImportConfig, LookupSettings};
use crate::types::{ExtDbRow, ImportReport, ListReport, ScenarioRow, SourceRow};

/// Imports every scenario in `xml` into a fresh study and optionally saves it.
///
/// The primary lookup dataset stays locked for the whole import.
pub fn run_import(xml: &Path, config: &ImportConfig, save: Option<&Path>) -> Result<ImportReport> {
    let span = info_span!("import", file = %xml.display());
    let _guard = span.enter();
    let text = fs::read_to_string(xml).with_context(|| format!("read {}", xml.display()))?;

    let mut study = StudyEditData::new(config.study.name.as_str(), config.study.study_type)
        .with_channel_range(config.study.min_channel, config.study.max_channel);
    let mut lookup = open_lookup(&config.lookup)?;
    let (options, lock) = match (&mut lookup, &config.lookup.database) {
        (Some(ext), Some(path)) => lookup_options(ext, path, &config.lookup)?,
        _ => (unresolved_options(&config.lookup), None),
    };

    let mut parser = ParseXml::new(options);
    if let Some(ext) = lookup.as_mut() {
        parser = parser.with_lookup(ext);
    }
    let result = parser.import_scenarios(&text, &mut study);
    let mut messages = parser.into_log();
    let summary = result.with_context(|| format!("import {}", xml.display()))?;
    if let Some(lock) = lock {
        lock.release().context("release station data lock")?;
    }

    let mut errors = ErrorLog::new();
    let valid = study.is_data_valid(&mut errors);
    messages.append(errors);

    let saved_to = match save {
        Some(db) if valid => {
            let mut store = SqliteStore::open(db).with_context(|| format!("open {}", db.display()))?;
            let options = SaveOptions::default().with_max_statement_length(config.persist.max_statement_length);
            store
                .save_study(&mut study, options)
                .with_context(|| format!("save study to {}", db.display()))?;
            Some(db.to_path_buf())
        }
        Some(db) => {
            warn!(path = %db.display(), "study has errors, not saving");
            None
        }
        None => None,
    };

    let scenarios = study
        .scenarios()
        .iter()
        .map(|scenario| {
            let items = scenario.source_list().items();
            ScenarioRow {
                key: scenario.key().get(),
                name: scenario.name().to_string(),
                sources: items.len(),
                desired: items.iter().filter(|item| item.is_desired()).count(),
                undesired: items.iter().filter(|item| item.is_undesired()).count(),
                children: scenario.child_scenarios().count(),
            }
        })
        .collect();
    info!(scenarios = summary.scenarios.len(), bound = summary.sources_bound, "import finished");

    Ok(ImportReport {
        study: study.name().to_string(),
        study_type: study.study_type().to_string(),
        scenarios,
        sources: study.sources().len(),
        lookup_calls: summary.lookup_calls,
        valid,
        saved_to,
        messages: messages.entries().to_vec(),
    })
}

/// Lists the unique sources of a collection document.
pub fn run_list(xml: &Path, config: &ImportConfig) -> Result<ListReport> {
    let span = info_span!("list", file = %xml.display());
    let _guard = span.enter();
    let text = fs::read_to_string(xml).with_context(|| format!("read {}", xml.display()))?;

    let mut lookup = open_lookup(&config.lookup)?;
    let options = match &mut lookup {
        Some(ext) => {
            let mut options = ParseOptions::new();
            if let Some(key) = config.lookup.primary_key() {
                options = options.with_lookup_db(resolve(ext, key)?);
            }
            if let Some(key) = config.lookup.alternate_key() {
                options = options.with_alternate(resolve(ext, key)?);
            }
            options
        }
        None => unresolved_options(&config.lookup),
    };
    let mut parser = ParseXml::new(options);
    if let Some(ext) = lookup.as_mut() {
        parser = parser.with_lookup(ext);
    }
    let sources = parser
        .parse_collection(&text)
        .with_context(|| format!("parse {}", xml.display()))?;
    let messages = parser.into_log().entries().to_vec();
    Ok(ListReport {
        sources: sources.iter().map(source_row).collect(),
        messages,
    })
}

/// Live external datasets in `db`.
pub fn run_ext_dbs(db: &Path) -> Result<Vec<ExtDbRow>> {
    ensure!(db.exists(), "database {} does not exist", db.display());
    let mut ext = SqliteExtDb::open(db).with_context(|| format!("open {}", db.display()))?;
    let datasets = ext
        .list()
        .with_context(|| format!("read station data index from {}", db.display()))?;
    Ok(datasets.iter().map(ExtDbRow::from).collect())
}

/// Clears a stuck lock. Returns whether one was set.
pub fn run_unlock(db: &Path, key: i32) -> Result<bool> {
    ensure!(db.exists(), "database {} does not exist", db.display());
    ensure!(key > 0, "unlock needs a real dataset key, got {key}");
    let store = SqliteStore::open(db).with_context(|| format!("open {}", db.display()))?;
    let cleared = force_unlock(store.connection(), ExtDbKey::new(key))?;
    Ok(cleared)
}

fn open_lookup(settings: &LookupSettings) -> Result<Option<SqliteExtDb>> {
    match &settings.database {
        Some(path) => {
            ensure!(path.exists(), "station database {} does not exist", path.display());
            let ext = SqliteExtDb::open(path).with_context(|| format!("open {}", path.display()))?;
            Ok(Some(ext))
        }
        None => {
            if settings.primary.is_some() {
                warn!("lookup.primary is set without lookup.database, by-reference records will be skipped");
            }
            Ok(None)
        }
    }
}

fn resolve(ext: &mut SqliteExtDb, key: ExtDbKey) -> Result<ExtDbKey> {
    let info = ext
        .resolve(key)
        .with_context(|| format!("resolve station data {key}"))?;
    Ok(info.key)
}

/// Resolves the configured keys and locks the primary dataset.
fn lookup_options(
    ext: &mut SqliteExtDb,
    path: &Path,
    settings: &LookupSettings,
) -> Result<(ParseOptions, Option<ExtDbLock>)> {
    let mut options = ParseOptions::new();
    let mut lock = None;
    if let Some(key) = settings.primary_key() {
        let key = resolve(ext, key)?;
        lock = Some(acquire(path, key)?);
        options = options.with_lookup_db(key);
    }
    if let Some(key) = settings.alternate_key() {
        options = options.with_alternate(resolve(ext, key)?);
    }
    Ok((options, lock))
}

fn unresolved_options(settings: &LookupSettings) -> ParseOptions {
    let mut options = ParseOptions::new();
    if let Some(key) = settings.primary_key() {
        options = options.with_lookup_db(key);
    }
    if let Some(key) = settings.alternate_key() {
        options = options.with_alternate(key);
    }
    options
}

fn acquire(path: &Path, key: ExtDbKey) -> Result<ExtDbLock> {
    match connect_and_lock(path, key).with_context(|| format!("lock station data {key}"))? {
        LockOutcome::Acquired(lock) => Ok(lock),
        LockOutcome::Busy => bail!(
            "station data {key} is in use by another session; if that session is gone, run `tvstudy unlock {} {key}`",
            path.display()
        ),
        LockOutcome::Missing => bail!("station data {key} no longer exists"),
    }
}

fn source_row(source: &SourceEditData) -> SourceRow {
    let station = source.station();
    SourceRow {
        call_sign: station.call_sign.clone(),
        service: source.service().to_string(),
        country: station.country.to_string(),
        channel: station.channel,
        city: station.city.clone(),
        state: station.state.clone(),
        locked: source.is_locked(),
        record_id: source.provenance().record_id().map(ToString::to_string),
        dts_sites: source.dts_sources().len(),
    }
}
