//! Saving studies, dataset lookups and locking against real database files.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use tempfile::TempDir;
use tvs_core::{
    ExtDbLookup, LookupError, PatternStore, PersistError, SaveOptions, ScenarioEditData,
    SourceEditData, StudyEditData,
};
use tvs_model::{
    AntPattern, Country, ExtDbInfo, ExtDbKey, ExtDbType, ExtRecord, HorizontalPatternInfo,
    PatternKind, PatternPoint, Provenance, RecordId, ScenarioType, Service, SourceKey, StationData,
    StudyType,
};
use tvs_store::ext::{delete_ext_db, insert_ext_db, insert_ext_record};
use tvs_store::{
    LockOutcome, SqliteExtDb, SqliteStore, StoreError, connect_and_lock, force_unlock, pseudo_key,
    sqlite_pool,
};

fn station(channel: i32) -> StationData {
    let mut station = StationData::new(Service::from_code("DT").unwrap(), Country::Us);
    station.call_sign = "KSTO".to_string();
    station.channel = channel;
    station.latitude = 45.5;
    station.longitude = -122.75;
    station.height_amsl = 500.0;
    station.overall_haat = 250.0;
    station.peak_erp = 80.0;
    station
}

fn dataset(key: i32, db_type: ExtDbType, day: u32) -> ExtDbInfo {
    ExtDbInfo {
        key: ExtDbKey::new(key),
        db_type,
        version: 1,
        date: NaiveDate::from_ymd_opt(2025, 1, day)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap(),
        name: format!("set {key}"),
        is_locked: false,
        is_deleted: false,
    }
}

fn study_with_pattern() -> StudyEditData {
    let mut study = StudyEditData::new("Saved", StudyType::Tv);
    let scenario_key = study.new_scenario_key();
    let mut scenario = ScenarioEditData::new(scenario_key, "Base", ScenarioType::Default, false);
    let mut data = station(24);
    data.horizontal_pattern = Some(HorizontalPatternInfo {
        name: "DA".to_string(),
        orientation: 0.0,
        pattern: Some(
            AntPattern::new(
                PatternKind::Horizontal,
                vec![
                    PatternPoint::new(0.0, 1.0),
                    PatternPoint::new(120.0, 0.4),
                    PatternPoint::new(240.0, 0.7),
                ],
            )
            .unwrap(),
        ),
    });
    let source_key = study.new_source_key();
    let source = SourceEditData::new(source_key, data, false, Provenance::None);
    scenario
        .source_list_mut()
        .add_or_replace(study.sources_mut(), source, true, false, false)
        .unwrap();
    let other_key = study.new_source_key();
    let other = SourceEditData::new(other_key, station(25), false, Provenance::None);
    scenario
        .source_list_mut()
        .add_or_replace(study.sources_mut(), other, false, true, false)
        .unwrap();
    study.add_scenario(scenario);
    study
}

#[test]
fn saved_study_reads_back_counts_and_patterns() {
    let dir = TempDir::new().unwrap();
    let mut store = SqliteStore::open(dir.path().join("study.sqlite")).unwrap();
    let mut study = study_with_pattern();
    store.save_study(&mut study, SaveOptions::default()).unwrap();
    assert!(!study.is_data_changed());

    let summaries = store.scenario_summaries().unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].name, "Base");
    assert_eq!(summaries[0].source_count, 2);
    assert_eq!(summaries[0].parent, None);
    assert_eq!(store.source_count().unwrap(), 2);

    let key = study.scenarios()[0].source_list().items()[0].key();
    assert!(store.has_source(key).unwrap());
    let pattern = store.horizontal_pattern(key).unwrap().unwrap();
    assert_eq!(pattern.points().len(), 3);
    assert_eq!(pattern.points()[1], PatternPoint::new(120.0, 0.4));
    assert!(store.vertical_pattern(key).unwrap().is_none());
}

#[test]
fn stored_sources_load_back_in_saved_state() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    let mut study = study_with_pattern();
    let key = study.scenarios()[0].source_list().items()[0].key();
    study
        .sources_mut()
        .get_mut(key)
        .unwrap()
        .set_attribute("note", "moved in 2021");
    store.save_study(&mut study, SaveOptions::default()).unwrap();

    let loaded = store.load_source(key).unwrap().unwrap();
    assert_eq!(loaded.key(), key);
    assert!(!loaded.is_data_changed());
    assert_eq!(loaded.station().channel, 24);
    assert_eq!(loaded.attribute("note"), Some("moved in 2021"));
    assert_eq!(loaded.provenance(), &Provenance::None);
    let pattern = loaded
        .station()
        .horizontal_pattern
        .as_ref()
        .and_then(|info| info.pattern.as_ref())
        .unwrap();
    assert_eq!(pattern.points().len(), 3);
    assert!(loaded.station().patterns_loaded());

    assert!(store.load_source(SourceKey::new(999)).unwrap().is_none());
}

#[test]
fn failed_commit_keeps_change_tracking() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    let mut study = study_with_pattern();
    store.connection().commit_hook(Some(|| true));
    let err = store.save_study(&mut study, SaveOptions::default()).unwrap_err();
    assert!(matches!(err, StoreError::Sqlite(_)));
    assert!(study.is_data_changed());
    assert_eq!(store.source_count().unwrap(), 0);
    assert!(store.scenario_summaries().unwrap().is_empty());

    store.connection().commit_hook(None::<fn() -> bool>);
    store.save_study(&mut study, SaveOptions::default()).unwrap();
    assert!(!study.is_data_changed());
    assert_eq!(store.source_count().unwrap(), 2);
    assert_eq!(store.scenario_summaries().unwrap().len(), 1);
}

#[test]
fn saving_again_replaces_rows_instead_of_duplicating() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    let mut study = study_with_pattern();
    store.save_study(&mut study, SaveOptions::default()).unwrap();

    let key = study.scenarios()[0].source_list().items()[1].key();
    study
        .sources_mut()
        .get_mut(key)
        .unwrap()
        .set_call_sign("KNEW")
        .unwrap();
    store
        .save_study(&mut study, SaveOptions::default().with_max_statement_length(200))
        .unwrap();

    assert_eq!(store.source_count().unwrap(), 2);
    let call_sign: String = store
        .connection()
        .query_row(
            "SELECT call_sign FROM source_tv WHERE source_key = ?1",
            [key.get()],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(call_sign, "KNEW");
}

#[test]
fn invalid_study_writes_nothing() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    let mut study = StudyEditData::new("Bad", StudyType::Tv);
    let key = study.new_scenario_key();
    study.add_scenario(ScenarioEditData::new(key, "Empty", ScenarioType::Default, false));
    let err = store.save_study(&mut study, SaveOptions::default()).unwrap_err();
    assert!(matches!(err, StoreError::Persist(PersistError::Invalid(_))));
    assert!(store.scenario_summaries().unwrap().is_empty());
    assert!(study.is_data_changed());
}

#[test]
fn lock_is_exclusive_until_released() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stations.sqlite");
    let store = SqliteStore::open(&path).unwrap();
    insert_ext_db(store.connection(), &dataset(5, ExtDbType::Lms, 3)).unwrap();

    let LockOutcome::Acquired(lock) = connect_and_lock(&path, ExtDbKey::new(5)).unwrap() else {
        panic!("expected to acquire the lock");
    };
    assert_eq!(lock.key(), ExtDbKey::new(5));
    assert!(matches!(
        connect_and_lock(&path, ExtDbKey::new(5)).unwrap(),
        LockOutcome::Busy
    ));
    lock.release().unwrap();

    let LockOutcome::Acquired(lock) = connect_and_lock(&path, ExtDbKey::new(5)).unwrap() else {
        panic!("released lock should be free");
    };
    drop(lock);
    assert!(matches!(
        connect_and_lock(&path, ExtDbKey::new(5)).unwrap(),
        LockOutcome::Acquired(_)
    ));
}

#[test]
fn missing_and_deleted_datasets_cannot_be_locked() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stations.sqlite");
    let store = SqliteStore::open(&path).unwrap();
    insert_ext_db(store.connection(), &dataset(2, ExtDbType::Cdbs, 1)).unwrap();
    delete_ext_db(store.connection(), ExtDbKey::new(2)).unwrap();

    assert!(matches!(
        connect_and_lock(&path, ExtDbKey::new(2)).unwrap(),
        LockOutcome::Missing
    ));
    assert!(matches!(
        connect_and_lock(&path, ExtDbKey::new(99)).unwrap(),
        LockOutcome::Missing
    ));
}

#[test]
fn stuck_lock_is_cleared_out_of_band() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stations.sqlite");
    let store = SqliteStore::open(&path).unwrap();
    let mut stuck = dataset(4, ExtDbType::Lms, 2);
    stuck.is_locked = true;
    insert_ext_db(store.connection(), &stuck).unwrap();

    assert!(matches!(
        connect_and_lock(&path, ExtDbKey::new(4)).unwrap(),
        LockOutcome::Busy
    ));
    assert!(force_unlock(store.connection(), ExtDbKey::new(4)).unwrap());
    assert!(!force_unlock(store.connection(), ExtDbKey::new(4)).unwrap());
    assert!(matches!(
        connect_and_lock(&path, ExtDbKey::new(4)).unwrap(),
        LockOutcome::Acquired(_)
    ));
}

#[test]
fn pseudo_keys_resolve_to_most_recent_live_dataset() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stations.sqlite");
    let store = SqliteStore::open(&path).unwrap();
    let conn = store.connection();
    insert_ext_db(conn, &dataset(10, ExtDbType::Lms, 1)).unwrap();
    insert_ext_db(conn, &dataset(11, ExtDbType::Lms, 8)).unwrap();
    insert_ext_db(conn, &dataset(12, ExtDbType::Lms, 20)).unwrap();
    delete_ext_db(conn, ExtDbKey::new(12)).unwrap();

    let id = RecordId::new("LMS-77").unwrap();
    insert_ext_record(
        conn,
        &ExtRecord {
            ext_db_key: ExtDbKey::new(11),
            record_id: id.clone(),
            station: station(30),
            dts_sites: Vec::new(),
        },
    )
    .unwrap();

    let mut ext = SqliteExtDb::open(&path).unwrap();
    assert_eq!(ext.resolve(pseudo_key(ExtDbType::Lms)).unwrap().key, ExtDbKey::new(11));
    assert_eq!(ext.list().unwrap().len(), 2);

    let ids = BTreeSet::from([id.clone()]);
    let found = ext.find_records(pseudo_key(ExtDbType::Lms), &ids).unwrap();
    assert_eq!(found[&id].station.channel, 30);
    assert_eq!(found[&id].ext_db_key, ExtDbKey::new(11));

    assert!(matches!(
        ext.find_records(ExtDbKey::new(12), &ids),
        Err(LookupError::Unavailable { .. })
    ));
    assert!(matches!(
        ext.resolve(pseudo_key(ExtDbType::Wireless)),
        Err(StoreError::UnknownExtDb(_))
    ));
}

#[test]
fn repeated_lookups_share_one_pooled_connection() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stations.sqlite");
    let store = SqliteStore::open(&path).unwrap();
    insert_ext_db(store.connection(), &dataset(4, ExtDbType::Lms, 2)).unwrap();

    let pool = sqlite_pool(&path).unwrap();
    let mut ext = SqliteExtDb::with_pool(pool.clone());
    let ids = BTreeSet::from([RecordId::new("none").unwrap()]);
    for _ in 0..3 {
        assert!(ext.find_records(ExtDbKey::new(4), &ids).unwrap().is_empty());
    }
    assert_eq!(pool.state().connections, 1);
    assert_eq!(pool.state().idle_connections, 1);
}

#[test]
fn catalog_reloads_after_invalidate() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stations.sqlite");
    let store = SqliteStore::open(&path).unwrap();
    insert_ext_db(store.connection(), &dataset(1, ExtDbType::Cdbs, 1)).unwrap();

    let mut ext = SqliteExtDb::open(&path).unwrap();
    assert_eq!(ext.resolve(pseudo_key(ExtDbType::Cdbs)).unwrap().key, ExtDbKey::new(1));
    insert_ext_db(store.connection(), &dataset(2, ExtDbType::Cdbs, 9)).unwrap();
    assert_eq!(ext.resolve(pseudo_key(ExtDbType::Cdbs)).unwrap().key, ExtDbKey::new(1));

    let before = ext.catalog_mut().version();
    ext.catalog_mut().invalidate();
    assert_eq!(ext.resolve(pseudo_key(ExtDbType::Cdbs)).unwrap().key, ExtDbKey::new(2));
    assert_eq!(ext.catalog_mut().version(), before + 1);
}
