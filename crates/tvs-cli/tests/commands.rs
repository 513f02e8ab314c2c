//! Command behavior against real files.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tempfile::TempDir;
use tvs_cli::commands::{run_ext_dbs, run_import, run_list, run_unlock};
use tvs_cli::config::ImportConfig;
use tvs_model::{Country, ExtDbInfo, ExtDbKey, ExtDbType, ExtRecord, RecordId, Service, StationData};
use tvs_store::ext::{insert_ext_db, insert_ext_record};
use tvs_store::{LockOutcome, SqliteStore, connect_and_lock};

const INLINE: &str = r#"SERVICE="DT" COUNTRY="US" CALL_SIGN="KINL" CHANNEL="20" CITY="Denver" STATE="CO" LATITUDE="39.75" LONGITUDE="-105" HAMSL="1700" HAAT="250" ERP="10""#;

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

fn document(body: &str) -> String {
    format!(r#"<?xml version="1.0"?><TVSTUDY VERSION="201004">{body}</TVSTUDY>"#)
}

fn dataset(key: i32, db_type: ExtDbType, month: u32, locked: bool) -> ExtDbInfo {
    ExtDbInfo {
        key: ExtDbKey::new(key),
        db_type,
        version: 2,
        date: NaiveDate::from_ymd_opt(2025, month, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap(),
        name: format!("set {key}"),
        is_locked: locked,
        is_deleted: false,
    }
}

/// Station database with one LMS record `R7` on channel 30 in dataset 7.
fn station_db(dir: &TempDir, locked: bool) -> PathBuf {
    let path = dir.path().join("stations.sqlite");
    let store = SqliteStore::open(&path).unwrap();
    insert_ext_db(store.connection(), &dataset(7, ExtDbType::Lms, 3, locked)).unwrap();
    let mut station = StationData::new(Service::from_code("DT").unwrap(), Country::Us);
    station.call_sign = "KEXT".to_string();
    station.channel = 30;
    station.latitude = 40.0;
    station.longitude = -104.5;
    station.height_amsl = 1600.0;
    station.overall_haat = 300.0;
    station.peak_erp = 50.0;
    insert_ext_record(
        store.connection(),
        &ExtRecord {
            ext_db_key: ExtDbKey::new(7),
            record_id: RecordId::new("R7").unwrap(),
            station,
            dts_sites: Vec::new(),
        },
    )
    .unwrap();
    path
}

fn lookup_config(db: &Path) -> ImportConfig {
    let mut config = ImportConfig::default();
    config.lookup.database = Some(db.to_path_buf());
    config.lookup.primary = Some(-ExtDbType::Lms.code());
    config
}

#[test]
fn import_saves_a_valid_study() {
    let dir = TempDir::new().unwrap();
    let xml = write(
        &dir,
        "study.xml",
        &document(&format!(
            r#"<SCENARIO NAME="Base"><SOURCE DESIRED="true" {INLINE}/></SCENARIO>
               <SCENARIO NAME="Empty"></SCENARIO>"#
        )),
    );
    let db = dir.path().join("study.sqlite");
    let report = run_import(&xml, &ImportConfig::default(), Some(&db)).unwrap();

    assert!(report.valid);
    assert!(!report.has_errors());
    assert_eq!(report.saved_to.as_deref(), Some(db.as_path()));
    assert_eq!(report.scenarios.len(), 1);
    assert_eq!(report.scenarios[0].name, "Base");
    assert_eq!(report.scenarios[0].desired, 1);
    assert_eq!(report.warning_count(), 1);

    let store = SqliteStore::open(&db).unwrap();
    assert_eq!(store.scenario_summaries().unwrap().len(), 1);
    assert_eq!(store.source_count().unwrap(), 1);
}

#[test]
fn invalid_study_is_reported_and_not_saved() {
    let dir = TempDir::new().unwrap();
    let xml = write(
        &dir,
        "study.xml",
        &document(&format!(r#"<SCENARIO NAME="NoDesired"><SOURCE {INLINE}/></SCENARIO>"#)),
    );
    let db = dir.path().join("study.sqlite");
    let report = run_import(&xml, &ImportConfig::default(), Some(&db)).unwrap();
    assert!(!report.valid);
    assert!(report.has_errors());
    assert!(report.saved_to.is_none());
    assert!(!db.exists());
}

#[test]
fn by_reference_records_resolve_through_pseudo_key_and_lock_is_released() {
    let dir = TempDir::new().unwrap();
    let db = station_db(&dir, false);
    let xml = write(
        &dir,
        "study.xml",
        &document(&format!(
            r#"<SCENARIO NAME="Ref">
                 <SOURCE LOCKED="true" RECORD_ID="R7" DESIRED="true"/>
                 <SOURCE UNDESIRED="true" {INLINE}/>
               </SCENARIO>"#
        )),
    );
    let report = run_import(&xml, &lookup_config(&db), None).unwrap();
    assert!(report.valid);
    assert_eq!(report.lookup_calls, 1);
    assert_eq!(report.scenarios[0].sources, 2);
    assert_eq!(report.sources, 2);

    assert!(matches!(
        connect_and_lock(&db, ExtDbKey::new(7)).unwrap(),
        LockOutcome::Acquired(_)
    ));
}

#[test]
fn import_refuses_a_locked_dataset() {
    let dir = TempDir::new().unwrap();
    let db = station_db(&dir, true);
    let xml = write(
        &dir,
        "study.xml",
        &document(r#"<SCENARIO NAME="Ref"><SOURCE LOCKED="true" RECORD_ID="R7" DESIRED="true"/></SCENARIO>"#),
    );
    let err = run_import(&xml, &lookup_config(&db), None).unwrap_err();
    assert!(format!("{err:#}").contains("in use by another session"));

    assert!(run_unlock(&db, 7).unwrap());
    assert!(!run_unlock(&db, 7).unwrap());
    assert!(run_import(&xml, &lookup_config(&db), None).unwrap().valid);
}

#[test]
fn missing_config_database_is_an_error() {
    let dir = TempDir::new().unwrap();
    let xml = write(&dir, "study.xml", &document(""));
    let err = run_import(&xml, &lookup_config(&dir.path().join("absent.sqlite")), None).unwrap_err();
    assert!(err.to_string().contains("does not exist"));
}

#[test]
fn list_reports_unique_sources() {
    let dir = TempDir::new().unwrap();
    let db = station_db(&dir, false);
    let xml = write(
        &dir,
        "sources.xml",
        &document(&format!(
            r#"<SOURCE {INLINE}/><SOURCE LOCKED="true" RECORD_ID="R7"/><SOURCE LOCKED="true" RECORD_ID="gone"/>"#
        )),
    );
    let report = run_list(&xml, &lookup_config(&db)).unwrap();
    let calls: Vec<&str> = report.sources.iter().map(|row| row.call_sign.as_str()).collect();
    assert_eq!(calls, vec!["KINL", "KEXT"]);
    assert_eq!(report.sources[1].record_id.as_deref(), Some("R7"));
    assert!(report.sources[1].locked);
    assert!(!report.messages.is_empty());
}

#[test]
fn ext_dbs_lists_live_datasets() {
    let dir = TempDir::new().unwrap();
    let db = station_db(&dir, false);
    let store = SqliteStore::open(&db).unwrap();
    insert_ext_db(store.connection(), &dataset(9, ExtDbType::Cdbs, 5, true)).unwrap();
    let mut deleted = dataset(11, ExtDbType::Lms, 6, false);
    deleted.is_deleted = true;
    insert_ext_db(store.connection(), &deleted).unwrap();

    let rows = run_ext_dbs(&db).unwrap();
    insta::assert_json_snapshot!(rows, @r#"
    [
      {
        "key": 7,
        "db_type": "LMS",
        "version": 2,
        "date": "2025-03-01",
        "name": "set 7",
        "locked": false
      },
      {
        "key": 9,
        "db_type": "CDBS",
        "version": 2,
        "date": "2025-05-01",
        "name": "set 9",
        "locked": true
      }
    ]
    "#);
}

#[test]
fn config_file_is_loaded_relative_to_itself() {
    let dir = TempDir::new().unwrap();
    let db = station_db(&dir, false);
    let config_path = write(
        &dir,
        "tvstudy.toml",
        "[study]\nname = \"From file\"\n[lookup]\ndatabase = \"stations.sqlite\"\nprimary = 7\n",
    );
    let config = ImportConfig::load(Some(&config_path)).unwrap();
    assert_eq!(config.lookup.database.as_deref(), Some(db.as_path()));

    let xml = write(
        &dir,
        "study.xml",
        &document(r#"<SCENARIO NAME="Ref"><SOURCE LOCKED="true" RECORD_ID="R7" DESIRED="true"/></SCENARIO>"#),
    );
    let report = run_import(&xml, &config, None).unwrap();
    assert_eq!(report.study, "From file");
    assert!(report.valid);
}

#[test]
fn explicit_config_path_must_exist() {
    let dir = TempDir::new().unwrap();
    assert!(ImportConfig::load(Some(&dir.path().join("none.toml"))).is_err());
}
