//! Database schema definitions

use rusqlite::Connection;
use tracing::info;
use tvs_core::{PATTERN_TABLES, SOURCE_TABLES};

use crate::Result;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Creates every table if missing. Safe to call on an existing database.
pub fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )?;
    let current: Option<i32> = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;

    match current {
        None => {
            info!(version = SCHEMA_VERSION, "creating database schema");
            conn.execute_batch(EXT_SCHEMA)?;
            conn.execute_batch(SCENARIO_SCHEMA)?;
            for table in SOURCE_TABLES {
                conn.execute_batch(&source_table_sql(table))?;
            }
            conn.execute_batch(&pattern_tables_sql())?;
            conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                [SCHEMA_VERSION],
            )?;
        }
        Some(version) => info!(version, "database schema is up to date"),
    }
    Ok(())
}

const EXT_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS ext_db (
    ext_db_key INTEGER PRIMARY KEY,
    db_type INTEGER NOT NULL,
    version INTEGER NOT NULL DEFAULT 0,
    date TEXT NOT NULL,
    name TEXT NOT NULL DEFAULT '',
    locked BOOLEAN NOT NULL DEFAULT false,
    deleted BOOLEAN NOT NULL DEFAULT false
);

-- site_index 0 is the record itself, 1.. are DTS transmitter sites
CREATE TABLE IF NOT EXISTS ext_source (
    ext_db_key INTEGER NOT NULL,
    record_id TEXT NOT NULL,
    site_index INTEGER NOT NULL DEFAULT 0,
    service TEXT NOT NULL,
    country TEXT NOT NULL,
    facility_id INTEGER NOT NULL DEFAULT 0,
    call_sign TEXT NOT NULL DEFAULT '',
    channel INTEGER NOT NULL,
    city TEXT NOT NULL DEFAULT '',
    state TEXT NOT NULL DEFAULT '',
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    height_amsl REAL NOT NULL DEFAULT 0,
    overall_haat REAL NOT NULL DEFAULT 0,
    peak_erp REAL NOT NULL DEFAULT 0,
    site_number INTEGER NOT NULL DEFAULT 0,
    horizontal_pattern_name TEXT,
    horizontal_pattern_orientation REAL,
    vertical_pattern_name TEXT,
    vertical_pattern_electrical_tilt REAL,
    vertical_pattern_mechanical_tilt REAL,
    vertical_pattern_mechanical_tilt_orientation REAL,
    matrix_pattern_name TEXT,
    use_generic_vertical_pattern BOOLEAN NOT NULL DEFAULT true,
    PRIMARY KEY (ext_db_key, record_id, site_index)
);

-- kind: 1 horizontal, 2 vertical, 3 matrix
CREATE TABLE IF NOT EXISTS ext_source_pattern (
    ext_db_key INTEGER NOT NULL,
    record_id TEXT NOT NULL,
    site_index INTEGER NOT NULL DEFAULT 0,
    kind INTEGER NOT NULL,
    azimuth REAL NOT NULL DEFAULT 0,
    angle REAL NOT NULL,
    relative_field REAL NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_ext_source_pattern
    ON ext_source_pattern(ext_db_key, record_id, site_index);
"#;

const SCENARIO_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS scenario (
    scenario_key INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    scenario_type INTEGER NOT NULL,
    is_permanent BOOLEAN NOT NULL DEFAULT false,
    parent_scenario_key INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS scenario_source (
    scenario_key INTEGER NOT NULL,
    source_key INTEGER NOT NULL,
    is_desired BOOLEAN NOT NULL,
    is_undesired BOOLEAN NOT NULL,
    is_permanent BOOLEAN NOT NULL DEFAULT false,
    PRIMARY KEY (scenario_key, source_key)
);

CREATE TABLE IF NOT EXISTS scenario_parameter_data (
    scenario_key INTEGER NOT NULL,
    parameter_key INTEGER NOT NULL,
    value_index INTEGER NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (scenario_key, parameter_key, value_index)
);
"#;

fn source_table_sql(table: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {table} (
    source_key INTEGER PRIMARY KEY,
    parent_source_key INTEGER,
    site_number INTEGER NOT NULL DEFAULT 0,
    service TEXT NOT NULL,
    country TEXT NOT NULL,
    facility_id INTEGER NOT NULL DEFAULT 0,
    call_sign TEXT NOT NULL DEFAULT '',
    channel INTEGER NOT NULL,
    city TEXT NOT NULL DEFAULT '',
    state TEXT NOT NULL DEFAULT '',
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    height_amsl REAL NOT NULL,
    overall_haat REAL NOT NULL,
    peak_erp REAL NOT NULL,
    is_locked BOOLEAN NOT NULL,
    user_record_id INTEGER,
    ext_db_key INTEGER,
    ext_record_id TEXT,
    original_source_key INTEGER,
    horizontal_pattern_name TEXT,
    horizontal_pattern_orientation REAL,
    vertical_pattern_name TEXT,
    vertical_pattern_electrical_tilt REAL,
    vertical_pattern_mechanical_tilt REAL,
    vertical_pattern_mechanical_tilt_orientation REAL,
    matrix_pattern_name TEXT,
    use_generic_vertical_pattern BOOLEAN NOT NULL DEFAULT true,
    attributes TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_{table}_parent ON {table}(parent_source_key);
"#
    )
}

fn pattern_tables_sql() -> String {
    let [horizontal, vertical, matrix] = PATTERN_TABLES;
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {horizontal} (
    source_key INTEGER NOT NULL,
    azimuth REAL NOT NULL,
    relative_field REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_{horizontal}_key ON {horizontal}(source_key);

CREATE TABLE IF NOT EXISTS {vertical} (
    source_key INTEGER NOT NULL,
    depression_angle REAL NOT NULL,
    relative_field REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_{vertical}_key ON {vertical}(source_key);

CREATE TABLE IF NOT EXISTS {matrix} (
    source_key INTEGER NOT NULL,
    azimuth REAL NOT NULL,
    depression_angle REAL NOT NULL,
    relative_field REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_{matrix}_key ON {matrix}(source_key);
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn creates_every_table_once() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema(&conn).unwrap();
        create_schema(&conn).unwrap();
        let names = tables(&conn);
        for table in SOURCE_TABLES.iter().chain(PATTERN_TABLES.iter()).chain(
            ["ext_db", "ext_source", "scenario", "scenario_source", "scenario_parameter_data"].iter(),
        ) {
            assert!(names.iter().any(|name| name == table), "missing {table}");
        }
        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }
}
