//! SQLite database holding study data.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension, Row};
use tracing::{debug, info};
use tvs_core::{
    LookupError, PATTERN_TABLES, PatternStore, PersistError, SOURCE_TABLES, SaveOptions,
    SourceEditData, SqlExecutor, StudyEditData, decode_attributes,
};
use tvs_model::{
    AntPattern, ExtDbKey, MatrixPattern, PatternKind, PatternPoint, Provenance, RecordId,
    ScenarioKey, Source, SourceKey,
};

use crate::ext::{STATION_COLUMNS, conversion_error, read_station};
use crate::{Result, StoreError, create_schema};

/// Row counts for one stored scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioSummary {
    pub key: ScenarioKey,
    pub name: String,
    pub parent: Option<ScenarioKey>,
    pub source_count: usize,
}

#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Opens or creates the database at `path` with the schema in place.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
        create_schema(&conn)?;
        info!(path = %path.display(), "opened study database");
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        create_schema(&conn)?;
        Ok(Self { conn, path: None })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Saves all pending study changes in one transaction.
    ///
    /// On error nothing is written and the study keeps its change tracking.
    pub fn save_study(&mut self, study: &mut StudyEditData, options: SaveOptions) -> Result<()> {
        let tx = self.conn.transaction()?;
        study.write_changes(&mut Statements(&tx), options)?;
        tx.commit()?;
        study.did_save();
        Ok(())
    }

    pub fn scenario_summaries(&self) -> Result<Vec<ScenarioSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.scenario_key, s.name, s.parent_scenario_key,
                    (SELECT COUNT(*) FROM scenario_source ss WHERE ss.scenario_key = s.scenario_key)
             FROM scenario s ORDER BY s.scenario_key",
        )?;
        let rows = stmt.query_map([], |row| {
            let parent: u32 = row.get(2)?;
            let count: i64 = row.get(3)?;
            Ok(ScenarioSummary {
                key: ScenarioKey::new(row.get(0)?),
                name: row.get(1)?,
                parent: (parent != 0).then(|| ScenarioKey::new(parent)),
                source_count: usize::try_from(count).unwrap_or_default(),
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Number of stored sources, DTS sites excluded.
    pub fn source_count(&self) -> Result<usize> {
        let mut total = 0;
        for table in SOURCE_TABLES {
            let count: i64 = self.conn.query_row(
                &format!("SELECT COUNT(*) FROM {table} WHERE parent_source_key IS NULL"),
                [],
                |row| row.get(0),
            )?;
            total += usize::try_from(count).unwrap_or_default();
        }
        Ok(total)
    }

    fn pattern_points(&self, table: &str, angle: &str, key: SourceKey) -> Result<Vec<PatternPoint>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {angle}, relative_field FROM {table} WHERE source_key = ?1 ORDER BY rowid"
        ))?;
        let rows = stmt.query_map([key.get()], |row| Ok(PatternPoint::new(row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    fn antenna_pattern(&self, kind: PatternKind, key: SourceKey) -> Result<Option<AntPattern>> {
        let (table, angle) = match kind {
            PatternKind::Horizontal => (PATTERN_TABLES[0], "azimuth"),
            PatternKind::Vertical => (PATTERN_TABLES[1], "depression_angle"),
        };
        let points = self.pattern_points(table, angle, key)?;
        if points.is_empty() {
            return Ok(None);
        }
        AntPattern::new(kind, points)
            .map(Some)
            .map_err(|source| StoreError::Model { table: "source pattern", source })
    }

    fn matrix(&self, key: SourceKey) -> Result<Option<MatrixPattern>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT azimuth, depression_angle, relative_field FROM {} WHERE source_key = ?1 ORDER BY rowid",
            PATTERN_TABLES[2]
        ))?;
        let rows = stmt.query_map([key.get()], |row| {
            Ok((row.get::<_, f64>(0)?, PatternPoint::new(row.get(1)?, row.get(2)?)))
        })?;
        let mut slices: Vec<(f64, Vec<PatternPoint>)> = Vec::new();
        for row in rows {
            let (azimuth, point) = row?;
            match slices.last_mut() {
                Some((last, points)) if *last == azimuth => points.push(point),
                _ => slices.push((azimuth, vec![point])),
            }
        }
        if slices.is_empty() {
            return Ok(None);
        }
        MatrixPattern::new(slices)
            .map(Some)
            .map_err(|source| StoreError::Model { table: "source pattern", source })
    }

    /// Reads a stored source with its DTS sites and pattern points.
    ///
    /// The result is in its saved state, with no pending changes.
    pub fn load_source(&mut self, key: SourceKey) -> Result<Option<SourceEditData>> {
        for table in SOURCE_TABLES {
            let Some(source) = self.source_row(table, key)? else {
                continue;
            };
            let mut source = SourceEditData::from_source(&source);
            source.load_patterns(self)?;
            debug!(source = %key, table, "loaded stored source");
            return Ok(Some(source));
        }
        Ok(None)
    }

    fn source_row(&self, table: &str, key: SourceKey) -> Result<Option<Source>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT source_key, is_locked, user_record_id, ext_db_key, ext_record_id,
                    original_source_key, attributes, {STATION_COLUMNS}
             FROM {table} WHERE source_key = ?1 OR parent_source_key = ?1
             ORDER BY parent_source_key IS NOT NULL, source_key"
        ))?;
        let mut rows = stmt
            .query_map([key.get()], read_source)?
            .collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter();
        let Some(mut source) = rows.next() else {
            return Ok(None);
        };
        if source.key != key {
            return Err(StoreError::Corrupt {
                table: "source",
                message: format!("DTS sites of source {key} have no parent row"),
            });
        }
        source.dts_sources = rows.collect();
        Ok(Some(source))
    }

    /// Whether a source row with this key is stored.
    pub fn has_source(&self, key: SourceKey) -> Result<bool> {
        for table in SOURCE_TABLES {
            let found: Option<i64> = self
                .conn
                .query_row(
                    &format!("SELECT 1 FROM {table} WHERE source_key = ?1"),
                    [key.get()],
                    |row| row.get(0),
                )
                .optional()?;
            if found.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Runs generated statements on a connection or open transaction.
struct Statements<'a>(&'a Connection);

impl SqlExecutor for Statements<'_> {
    fn execute(&mut self, sql: &str) -> std::result::Result<usize, PersistError> {
        debug!(statement = %truncate(sql), "executing");
        self.0
            .execute(sql, [])
            .map_err(|err| PersistError::Sql(err.to_string()))
    }
}

impl SqlExecutor for SqliteStore {
    fn execute(&mut self, sql: &str) -> std::result::Result<usize, PersistError> {
        Statements(&self.conn).execute(sql)
    }
}

impl PatternStore for SqliteStore {
    fn horizontal_pattern(&mut self, key: SourceKey) -> std::result::Result<Option<AntPattern>, LookupError> {
        Ok(self.antenna_pattern(PatternKind::Horizontal, key)?)
    }

    fn vertical_pattern(&mut self, key: SourceKey) -> std::result::Result<Option<AntPattern>, LookupError> {
        Ok(self.antenna_pattern(PatternKind::Vertical, key)?)
    }

    fn matrix_pattern(&mut self, key: SourceKey) -> std::result::Result<Option<MatrixPattern>, LookupError> {
        Ok(self.matrix(key)?)
    }
}

fn read_source(row: &Row<'_>) -> rusqlite::Result<Source> {
    let user_record_id: Option<u32> = row.get(2)?;
    let ext_db_key: Option<i32> = row.get(3)?;
    let ext_record_id: Option<String> = row.get(4)?;
    let provenance = match (ext_db_key, ext_record_id, user_record_id) {
        (Some(ext_db_key), Some(record_id), _) => Provenance::External {
            ext_db_key: ExtDbKey::new(ext_db_key),
            record_id: RecordId::new(record_id).map_err(|err| conversion_error(4, err))?,
        },
        (_, _, Some(id)) => Provenance::UserRecord { id },
        _ => Provenance::None,
    };
    Ok(Source {
        key: SourceKey::new(row.get(0)?),
        station: read_station(row, 7)?,
        is_locked: row.get(1)?,
        provenance,
        original_source_key: row.get::<_, Option<u32>>(5)?.map(SourceKey::new),
        attributes: decode_attributes(&row.get::<_, String>(6)?),
        dts_sources: Vec::new(),
    })
}

fn truncate(sql: &str) -> &str {
    const MAX: usize = 120;
    if sql.len() <= MAX {
        return sql;
    }
    let mut end = MAX;
    while !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}
