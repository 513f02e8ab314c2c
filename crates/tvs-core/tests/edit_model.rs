//! Scenario-level behaviour of the shared-source edit model.

use tvs_core::{
    SaveOptions, ScenarioEditData, SourceEditData, SourceRemovalPolicy, StudyEditData,
};
use tvs_model::{
    Country, ErrorLog, ExtDbKey, Provenance, RecordId, ScenarioType, Service, SourceKey,
    StationData, StudyType,
};

fn station(code: &str, channel: i32) -> StationData {
    let mut station = StationData::new(Service::from_code(code).unwrap(), Country::Us);
    station.call_sign = "KTST".to_string();
    station.channel = channel;
    station.latitude = 40.0;
    station.longitude = -100.0;
    station.peak_erp = 20.0;
    station
}

fn external(id: &str) -> Provenance {
    Provenance::External {
        ext_db_key: ExtDbKey::new(8),
        record_id: RecordId::new(id).unwrap(),
    }
}

#[test]
fn shared_source_survives_removal_from_one_scenario() {
    let mut study = StudyEditData::new("Shared", StudyType::Tv);
    let first = study.new_scenario_key();
    let second = study.new_scenario_key();
    study.add_scenario(ScenarioEditData::new(first, "A", ScenarioType::Default, false));
    study.add_scenario(ScenarioEditData::new(second, "B", ScenarioType::Default, false));

    let key = study.new_source_key();
    let source = SourceEditData::new(key, station("DT", 22), true, external("R9"));
    {
        let (scenario, arena) = study.edit_scenario(first).unwrap();
        scenario
            .source_list_mut()
            .add_or_replace(arena, source, true, false, false)
            .unwrap();
    }
    {
        let (scenario, arena) = study.edit_scenario(second).unwrap();
        scenario
            .source_list_mut()
            .bind(arena, key, false, true, false)
            .unwrap();
    }
    assert_eq!(study.sources().ref_count(key), 2);

    {
        let (scenario, arena) = study.edit_scenario(first).unwrap();
        assert!(scenario.source_list_mut().remove(arena, 0));
    }
    assert!(study.get_source(key).is_some());
    assert!(!study.remove_source(key));

    {
        let (scenario, arena) = study.edit_scenario(second).unwrap();
        assert!(scenario.source_list_mut().remove(arena, 0));
    }
    assert!(study.get_source(key).is_none());
}

#[test]
fn interference_scenarios_keep_unreferenced_sources() {
    let mut study = StudyEditData::new("Ix", StudyType::TvIx);
    let key = study.new_scenario_key();
    let scenario = ScenarioEditData::new(key, "IX 1", ScenarioType::TvixInterference, false);
    assert_eq!(
        scenario.source_list().removal_policy(),
        SourceRemovalPolicy::RetainShared
    );
    study.add_scenario(scenario);

    let source_key = study.new_source_key();
    let source = SourceEditData::new(source_key, station("DT", 30), false, Provenance::None);
    let (scenario, arena) = study.edit_scenario(key).unwrap();
    scenario
        .source_list_mut()
        .add_or_replace(arena, source, true, false, false)
        .unwrap();
    assert!(scenario.source_list_mut().remove(arena, 0));
    assert!(arena.contains(source_key));
}

#[test]
fn single_undesired_item_is_not_valid() {
    let mut study = StudyEditData::new("V", StudyType::Tv);
    let key = study.new_scenario_key();
    study.add_scenario(ScenarioEditData::new(key, "Only", ScenarioType::Default, false));
    let source_key = study.new_source_key();
    let source = SourceEditData::new(source_key, station("DT", 14), false, Provenance::None);
    let (scenario, arena) = study.edit_scenario(key).unwrap();
    scenario
        .source_list_mut()
        .add_or_replace(arena, source, false, true, false)
        .unwrap();

    let mut errors = ErrorLog::new();
    assert!(!scenario.source_list().is_data_valid(&mut errors));
    assert!(errors.contains("No desired station"));
}

#[test]
fn duplicate_scenario_never_collides_with_existing_keys() {
    let mut study = StudyEditData::new("Dup", StudyType::Tv);
    let key = study.new_scenario_key();
    study.add_scenario(ScenarioEditData::new(key, "Proposal", ScenarioType::Default, true));
    let locked_key = study.new_source_key();
    let unlocked_key = study.new_source_key();
    {
        let (scenario, arena) = study.edit_scenario(key).unwrap();
        let locked = SourceEditData::new(locked_key, station("DT", 9), true, external("L1"));
        let unlocked = SourceEditData::new(unlocked_key, station("DT", 10), false, Provenance::None);
        let list = scenario.source_list_mut();
        list.add_or_replace(arena, locked, false, true, true).unwrap();
        list.add_or_replace(arena, unlocked, true, false, false).unwrap();
    }
    let existing: Vec<SourceKey> = study.sources().iter().map(SourceEditData::key).collect();

    let mut errors = ErrorLog::new();
    let copy_key = study.duplicate_scenario(key, "Proposal", &mut errors).unwrap();
    let copy = study.scenario(copy_key).unwrap();
    assert!(!copy.is_permanent());

    let keys: Vec<SourceKey> = copy.source_list().keys().collect();
    assert_eq!(keys[0], locked_key);
    assert!(!existing.contains(&keys[1]));
    assert_eq!(study.get_source(keys[1]).unwrap().channel(), 10);
}

#[test]
fn removing_saved_scenario_deletes_its_rows() {
    let mut study = StudyEditData::new("Del", StudyType::Tv);
    let key = study.new_scenario_key();
    study.add_scenario(ScenarioEditData::new(key, "Gone", ScenarioType::Default, false));
    let source_key = study.new_source_key();
    {
        let (scenario, arena) = study.edit_scenario(key).unwrap();
        let source = SourceEditData::new(source_key, station("DT", 40), false, Provenance::None);
        scenario
            .source_list_mut()
            .add_or_replace(arena, source, true, false, false)
            .unwrap();
    }
    let mut first: Vec<String> = Vec::new();
    study.save(&mut first, SaveOptions::default()).unwrap();

    assert!(study.remove_scenario(key));
    assert!(study.is_data_changed());
    let mut second: Vec<String> = Vec::new();
    study.save(&mut second, SaveOptions::default()).unwrap();
    assert!(second.contains(&"DELETE FROM scenario WHERE scenario_key = 1".to_string()));
    assert!(second.iter().any(|sql| sql.starts_with("DELETE FROM source_tv")));
    assert!(!second.iter().any(|sql| sql.starts_with("INSERT")));
}
