//! External dataset rows: the `ext_db` index and `ext_source` records.
//!
//! Dataset importers write records here; lookups read them back in batches.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::{Connection, Row, params, params_from_iter};
use tracing::debug;
use tvs_model::{
    AntPattern, Country, ExtDbInfo, ExtDbKey, ExtDbType, ExtRecord, HorizontalPatternInfo,
    MatrixPattern, MatrixPatternInfo, PatternKind, PatternPoint, RecordId, Service, StationData,
    VerticalPatternInfo,
};

use crate::{Result, StoreError};

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Record ids per `IN (...)` list, below SQLite's host parameter limit.
const ID_CHUNK: usize = 500;

const KIND_HORIZONTAL: i32 = 1;
const KIND_VERTICAL: i32 = 2;
const KIND_MATRIX: i32 = 3;

pub(crate) const STATION_COLUMNS: &str = "service, country, facility_id, call_sign, channel, city, state, \
     latitude, longitude, height_amsl, overall_haat, peak_erp, site_number, \
     horizontal_pattern_name, horizontal_pattern_orientation, vertical_pattern_name, \
     vertical_pattern_electrical_tilt, vertical_pattern_mechanical_tilt, \
     vertical_pattern_mechanical_tilt_orientation, matrix_pattern_name, \
     use_generic_vertical_pattern";

fn corrupt(table: &'static str, message: impl Into<String>) -> StoreError {
    StoreError::Corrupt {
        table,
        message: message.into(),
    }
}

/// Adds a dataset descriptor to the index.
pub fn insert_ext_db(conn: &Connection, info: &ExtDbInfo) -> Result<()> {
    conn.execute(
        "INSERT INTO ext_db (ext_db_key, db_type, version, date, name, locked, deleted)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            info.key.get(),
            info.db_type.code(),
            info.version,
            info.date.format(DATE_FORMAT).to_string(),
            info.name,
            info.is_locked,
            info.is_deleted,
        ],
    )?;
    debug!(ext_db = %info.key, db_type = %info.db_type, "added station data");
    Ok(())
}

/// Marks a dataset deleted. Its rows stay but it never resolves again.
pub fn delete_ext_db(conn: &Connection, key: ExtDbKey) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE ext_db SET deleted = true WHERE ext_db_key = ?1 AND NOT deleted",
        [key.get()],
    )?;
    Ok(changed > 0)
}

/// Every index row, tombstones included, by key.
pub fn load_ext_dbs(conn: &Connection) -> Result<Vec<ExtDbInfo>> {
    let mut stmt = conn.prepare(
        "SELECT ext_db_key, db_type, version, date, name, locked, deleted
         FROM ext_db ORDER BY ext_db_key",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i32>(0)?,
            row.get::<_, i32>(1)?,
            row.get::<_, i32>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, bool>(5)?,
            row.get::<_, bool>(6)?,
        ))
    })?;

    let mut infos = Vec::new();
    for row in rows {
        let (key, db_type, version, date, name, is_locked, is_deleted) = row?;
        let db_type = ExtDbType::from_code(db_type)
            .ok_or_else(|| corrupt("ext_db", format!("unknown dataset type {db_type}")))?;
        let date = NaiveDateTime::parse_from_str(&date, DATE_FORMAT)
            .map_err(|err| corrupt("ext_db", format!("bad date '{date}': {err}")))?;
        infos.push(ExtDbInfo {
            key: ExtDbKey::new(key),
            db_type,
            version,
            date,
            name,
            is_locked,
            is_deleted,
        });
    }
    Ok(infos)
}

/// Writes one record with its DTS sites and pattern points.
pub fn insert_ext_record(conn: &Connection, record: &ExtRecord) -> Result<()> {
    let sites = std::iter::once(&record.station).chain(record.dts_sites.iter());
    for (site_index, station) in sites.enumerate() {
        insert_station(conn, record, site_index as i32, station)?;
    }
    Ok(())
}

fn insert_station(conn: &Connection, record: &ExtRecord, site_index: i32, station: &StationData) -> Result<()> {
    let key = record.ext_db_key.get();
    let id = record.record_id.as_str();
    let horizontal = station.horizontal_pattern.as_ref();
    let vertical = station.vertical_pattern.as_ref();
    conn.execute(
        &format!(
            "INSERT INTO ext_source (ext_db_key, record_id, site_index, {STATION_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                     ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24)"
        ),
        params![
            key,
            id,
            site_index,
            station.service.code(),
            station.country.code(),
            station.facility_id,
            station.call_sign,
            station.channel,
            station.city,
            station.state,
            station.latitude,
            station.longitude,
            station.height_amsl,
            station.overall_haat,
            station.peak_erp,
            station.site_number,
            horizontal.map(|info| info.name.as_str()),
            horizontal.map(|info| info.orientation),
            vertical.map(|info| info.name.as_str()),
            vertical.map(|info| info.electrical_tilt),
            vertical.map(|info| info.mechanical_tilt),
            vertical.map(|info| info.mechanical_tilt_orientation),
            station.matrix_pattern.as_ref().map(|info| info.name.as_str()),
            station.use_generic_vertical_pattern,
        ],
    )?;

    let mut points = conn.prepare_cached(
        "INSERT INTO ext_source_pattern
             (ext_db_key, record_id, site_index, kind, azimuth, angle, relative_field)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    if let Some(pattern) = horizontal.and_then(|info| info.pattern.as_ref()) {
        for point in pattern.points() {
            points.execute(params![key, id, site_index, KIND_HORIZONTAL, 0.0, point.angle, point.field])?;
        }
    }
    if let Some(pattern) = vertical.and_then(|info| info.pattern.as_ref()) {
        for point in pattern.points() {
            points.execute(params![key, id, site_index, KIND_VERTICAL, 0.0, point.angle, point.field])?;
        }
    }
    if let Some(matrix) = station
        .matrix_pattern
        .as_ref()
        .and_then(|info| info.pattern.as_ref())
    {
        for slice in matrix.slices() {
            for point in slice.pattern.points() {
                points.execute(params![
                    key,
                    id,
                    site_index,
                    KIND_MATRIX,
                    slice.azimuth,
                    point.angle,
                    point.field
                ])?;
            }
        }
    }
    Ok(())
}

pub(crate) fn conversion_error(column: usize, err: tvs_model::ModelError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err))
}

/// Reads [`STATION_COLUMNS`] starting at column `offset`.
pub(crate) fn read_station(row: &Row<'_>, offset: usize) -> rusqlite::Result<StationData> {
    let column = |n: usize| offset + n;
    let service = Service::from_code(&row.get::<_, String>(column(0))?)
        .map_err(|err| conversion_error(column(0), err))?;
    let country: Country = row
        .get::<_, String>(column(1))?
        .parse()
        .map_err(|err| conversion_error(column(1), err))?;

    let mut station = StationData::new(service, country);
    station.facility_id = row.get(column(2))?;
    station.call_sign = row.get(column(3))?;
    station.channel = row.get(column(4))?;
    station.city = row.get(column(5))?;
    station.state = row.get(column(6))?;
    station.latitude = row.get(column(7))?;
    station.longitude = row.get(column(8))?;
    station.height_amsl = row.get(column(9))?;
    station.overall_haat = row.get(column(10))?;
    station.peak_erp = row.get(column(11))?;
    station.site_number = row.get(column(12))?;
    station.horizontal_pattern = match row.get::<_, Option<String>>(column(13))? {
        Some(name) => Some(HorizontalPatternInfo {
            name,
            orientation: row.get::<_, Option<f64>>(column(14))?.unwrap_or(0.0),
            pattern: None,
        }),
        None => None,
    };
    station.vertical_pattern = match row.get::<_, Option<String>>(column(15))? {
        Some(name) => Some(VerticalPatternInfo {
            name,
            electrical_tilt: row.get::<_, Option<f64>>(column(16))?.unwrap_or(0.0),
            mechanical_tilt: row.get::<_, Option<f64>>(column(17))?.unwrap_or(0.0),
            mechanical_tilt_orientation: row.get::<_, Option<f64>>(column(18))?.unwrap_or(0.0),
            pattern: None,
        }),
        None => None,
    };
    station.matrix_pattern = row
        .get::<_, Option<String>>(column(19))?
        .map(|name| MatrixPatternInfo { name, pattern: None });
    station.use_generic_vertical_pattern = row.get(column(20))?;
    Ok(station)
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// Loads the requested records of one dataset, with patterns.
///
/// Ids with no row are absent from the result.
pub fn load_ext_records(
    conn: &Connection,
    ext_db_key: ExtDbKey,
    ids: &BTreeSet<RecordId>,
) -> Result<BTreeMap<RecordId, ExtRecord>> {
    let ids: Vec<&RecordId> = ids.iter().collect();
    let mut records = BTreeMap::new();
    for chunk in ids.chunks(ID_CHUNK) {
        load_chunk(conn, ext_db_key, chunk, &mut records)?;
    }
    debug!(ext_db = %ext_db_key, requested = ids.len(), found = records.len(), "loaded station records");
    Ok(records)
}

fn load_chunk(
    conn: &Connection,
    ext_db_key: ExtDbKey,
    ids: &[&RecordId],
    records: &mut BTreeMap<RecordId, ExtRecord>,
) -> Result<()> {
    let bind = || {
        std::iter::once(ext_db_key.get().to_string())
            .chain(ids.iter().map(|id| id.as_str().to_string()))
    };
    let mut sites: BTreeMap<(String, i32), StationData> = BTreeMap::new();
    let mut stmt = conn.prepare(&format!(
        "SELECT record_id, site_index, {STATION_COLUMNS} FROM ext_source
         WHERE ext_db_key = ? AND record_id IN ({})
         ORDER BY record_id, site_index",
        placeholders(ids.len())
    ))?;
    let rows = stmt.query_map(params_from_iter(bind()), |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i32>(1)?,
            read_station(row, 2)?,
        ))
    })?;
    for row in rows {
        let (id, site_index, station) = row?;
        sites.insert((id, site_index), station);
    }

    let mut points: BTreeMap<(String, i32, i32), Vec<(f64, PatternPoint)>> = BTreeMap::new();
    let mut stmt = conn.prepare(&format!(
        "SELECT record_id, site_index, kind, azimuth, angle, relative_field
         FROM ext_source_pattern
         WHERE ext_db_key = ? AND record_id IN ({})
         ORDER BY record_id, site_index, kind, azimuth, angle",
        placeholders(ids.len())
    ))?;
    let rows = stmt.query_map(params_from_iter(bind()), |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i32>(1)?,
            row.get::<_, i32>(2)?,
            row.get::<_, f64>(3)?,
            PatternPoint::new(row.get(4)?, row.get(5)?),
        ))
    })?;
    for row in rows {
        let (id, site_index, kind, azimuth, point) = row?;
        points
            .entry((id, site_index, kind))
            .or_default()
            .push((azimuth, point));
    }

    for ((id, site_index), mut station) in sites {
        attach_patterns(&mut station, &id, site_index, &mut points)?;
        let record_id = RecordId::new(id.as_str()).map_err(|source| StoreError::Model {
            table: "ext_source",
            source,
        })?;
        if site_index == 0 {
            records.insert(
                record_id.clone(),
                ExtRecord {
                    ext_db_key,
                    record_id,
                    station,
                    dts_sites: Vec::new(),
                },
            );
        } else if let Some(record) = records.get_mut(&record_id) {
            record.dts_sites.push(station);
        } else {
            return Err(corrupt(
                "ext_source",
                format!("DTS site {site_index} of record {id} has no parent row"),
            ));
        }
    }
    Ok(())
}

fn attach_patterns(
    station: &mut StationData,
    id: &str,
    site_index: i32,
    points: &mut BTreeMap<(String, i32, i32), Vec<(f64, PatternPoint)>>,
) -> Result<()> {
    let model = |source| StoreError::Model {
        table: "ext_source_pattern",
        source,
    };
    let mut take = |kind: i32| {
        points
            .remove(&(id.to_string(), site_index, kind))
            .ok_or_else(|| corrupt("ext_source_pattern", format!("no pattern points for record {id}")))
    };
    if let Some(info) = station.horizontal_pattern.as_mut() {
        let rows = take(KIND_HORIZONTAL)?;
        let pattern = AntPattern::new(PatternKind::Horizontal, rows.into_iter().map(|(_, p)| p).collect());
        info.pattern = Some(pattern.map_err(model)?);
    }
    if let Some(info) = station.vertical_pattern.as_mut() {
        let rows = take(KIND_VERTICAL)?;
        let pattern = AntPattern::new(PatternKind::Vertical, rows.into_iter().map(|(_, p)| p).collect());
        info.pattern = Some(pattern.map_err(model)?);
    }
    if let Some(info) = station.matrix_pattern.as_mut() {
        let mut slices: Vec<(f64, Vec<PatternPoint>)> = Vec::new();
        for (azimuth, point) in take(KIND_MATRIX)? {
            match slices.last_mut() {
                Some((last, slice)) if *last == azimuth => slice.push(point),
                _ => slices.push((azimuth, vec![point])),
            }
        }
        info.pattern = Some(MatrixPattern::new(slices).map_err(model)?);
    }
    Ok(())
}
