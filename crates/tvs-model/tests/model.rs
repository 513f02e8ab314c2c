//! Tests for tvs-model types.

use tvs_model::{
    Country, MAX_PARAMETER_VALUES, ModelError, Parameter, PatternKind, PatternPoint, Provenance, RecordId, Scenario, ScenarioKey,
    ScenarioSource, ScenarioType, Service, SourceKey, StationData,
};

#[test]
fn record_id_rejects_blank_and_embedded_space() {
    assert!(RecordId::new("").is_err());
    assert!(RecordId::new("   ").is_err());
    assert!(RecordId::new("12 34").is_err());
    assert_eq!(RecordId::new(" 1234 ").unwrap().as_str(), "1234");
}

#[test]
fn parameter_set_value_grows_list() {
    let mut parameter = Parameter::new(7);
    parameter.set_value(2, "on").unwrap();
    assert_eq!(parameter.values, vec!["", "", "on"]);
    parameter.set_value(0, "off").unwrap();
    assert_eq!(parameter.values[0], "off");
}

#[test]
fn parameter_set_value_rejects_out_of_range_index() {
    let mut parameter = Parameter::new(3);
    parameter.set_value(MAX_PARAMETER_VALUES - 1, "last").unwrap();
    assert_eq!(parameter.values.len(), MAX_PARAMETER_VALUES);
    assert!(matches!(
        parameter.set_value(MAX_PARAMETER_VALUES, "x"),
        Err(ModelError::ParameterIndex { key: 3, .. })
    ));
    assert!(parameter.set_value(usize::MAX, "x").is_err());
    assert_eq!(parameter.values.len(), MAX_PARAMETER_VALUES);
}

#[test]
fn scenario_source_lookup_by_key() {
    let scenario = Scenario {
        key: ScenarioKey::new(1),
        name: "Baseline".to_string(),
        description: String::new(),
        scenario_type: ScenarioType::Default,
        is_permanent: false,
        parameters: vec![],
        sources: vec![ScenarioSource {
            source_key: SourceKey::new(10),
            is_desired: true,
            is_undesired: false,
            is_permanent: false,
        }],
        parent_scenario_key: None,
        child_scenario_keys: vec![],
    };
    assert!(scenario.source(SourceKey::new(10)).unwrap().is_desired);
    assert!(scenario.source(SourceKey::new(11)).is_none());
}

#[test]
fn station_serializes_service_as_code() {
    let station = StationData::new(Service::from_code("LD").unwrap(), Country::Ca);
    let json = serde_json::to_value(&station).expect("serialize station");
    assert_eq!(json["service"], "LD");
    assert_eq!(json["country"], "CA");
}

#[test]
fn default_provenance_is_none() {
    assert_eq!(Provenance::default(), Provenance::None);
    assert_eq!(Provenance::UserRecord { id: 5 }.user_record_id(), Some(5));
}

#[test]
fn pattern_kind_labels() {
    assert_eq!(PatternKind::Horizontal.label(), "horizontal");
    let point = PatternPoint::new(10.0, 0.5);
    assert_eq!(point.angle, 10.0);
}
