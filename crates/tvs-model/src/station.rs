//! Station attributes shared by persisted sources, edit wrappers, and
//! external dataset records.

use serde::{Deserialize, Serialize};

use crate::{AntPattern, Country, MatrixPattern, RecordType, Service};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HorizontalPatternInfo {
    pub name: String,
    pub orientation: f64,
    /// Points, or `None` while not yet loaded from storage.
    pub pattern: Option<AntPattern>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerticalPatternInfo {
    pub name: String,
    pub electrical_tilt: f64,
    pub mechanical_tilt: f64,
    pub mechanical_tilt_orientation: f64,
    pub pattern: Option<AntPattern>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixPatternInfo {
    pub name: String,
    pub pattern: Option<MatrixPattern>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationData {
    pub service: Service,
    pub country: Country,
    pub facility_id: i32,
    pub call_sign: String,
    pub channel: i32,
    pub city: String,
    pub state: String,
    pub latitude: f64,
    pub longitude: f64,
    pub height_amsl: f64,
    pub overall_haat: f64,
    pub peak_erp: f64,
    pub horizontal_pattern: Option<HorizontalPatternInfo>,
    pub vertical_pattern: Option<VerticalPatternInfo>,
    pub matrix_pattern: Option<MatrixPatternInfo>,
    pub use_generic_vertical_pattern: bool,
    /// DTS transmitter site number, zero for everything else.
    pub site_number: i32,
}

impl StationData {
    pub fn new(service: Service, country: Country) -> Self {
        Self {
            service,
            country,
            facility_id: 0,
            call_sign: String::new(),
            channel: 0,
            city: String::new(),
            state: String::new(),
            latitude: 0.0,
            longitude: 0.0,
            height_amsl: 0.0,
            overall_haat: 0.0,
            peak_erp: 0.0,
            horizontal_pattern: None,
            vertical_pattern: None,
            matrix_pattern: None,
            use_generic_vertical_pattern: true,
            site_number: 0,
        }
    }

    pub fn record_type(&self) -> RecordType {
        self.service.record_type()
    }

    /// Whether every declared pattern has its points in memory.
    pub fn patterns_loaded(&self) -> bool {
        self.horizontal_pattern
            .as_ref()
            .is_none_or(|info| info.pattern.is_some())
            && self
                .vertical_pattern
                .as_ref()
                .is_none_or(|info| info.pattern.is_some())
            && self
                .matrix_pattern
                .as_ref()
                .is_none_or(|info| info.pattern.is_some())
    }

    /// Returns human-readable problems with the station values; empty when valid.
    ///
    /// `dts_parent` relaxes the location and power checks, since a DTS
    /// parent's transmitters carry those values.
    pub fn problems(&self, dts_parent: bool) -> Vec<String> {
        let mut problems = Vec::new();
        let label = if self.call_sign.is_empty() {
            format!("{} record", self.record_type())
        } else {
            self.call_sign.clone()
        };
        if let Some(range) = self.record_type().channel_range()
            && !range.contains(&self.channel)
        {
            problems.push(format!(
                "{label}: channel {} is out of range {} to {}",
                self.channel,
                range.start(),
                range.end()
            ));
        }
        if dts_parent {
            return problems;
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            problems.push(format!("{label}: latitude {} is out of range", self.latitude));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            problems.push(format!(
                "{label}: longitude {} is out of range",
                self.longitude
            ));
        }
        if !self.height_amsl.is_finite() || !self.overall_haat.is_finite() {
            problems.push(format!("{label}: antenna height is not a number"));
        }
        if !(self.peak_erp > 0.0) {
            problems.push(format!("{label}: ERP must be greater than zero"));
        }
        if let Some(info) = &self.horizontal_pattern
            && info.name.trim().is_empty()
        {
            problems.push(format!("{label}: horizontal pattern has no name"));
        }
        if let Some(info) = &self.vertical_pattern
            && info.name.trim().is_empty()
        {
            problems.push(format!("{label}: vertical pattern has no name"));
        }
        if let Some(info) = &self.matrix_pattern
            && info.name.trim().is_empty()
        {
            problems.push(format!("{label}: matrix pattern has no name"));
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station() -> StationData {
        let mut data = StationData::new(Service::from_code("DT").unwrap(), Country::Us);
        data.call_sign = "WAAA".to_string();
        data.channel = 20;
        data.latitude = 40.0;
        data.longitude = -75.0;
        data.peak_erp = 100.0;
        data
    }

    #[test]
    fn valid_station_has_no_problems() {
        assert!(station().problems(false).is_empty());
    }

    #[test]
    fn reports_channel_and_power() {
        let mut data = station();
        data.channel = 80;
        data.peak_erp = 0.0;
        let problems = data.problems(false);
        assert_eq!(problems.len(), 2);
        assert!(problems[0].contains("channel 80"));
    }

    #[test]
    fn dts_parent_skips_location_checks() {
        let mut data = station();
        data.latitude = 120.0;
        data.peak_erp = 0.0;
        assert!(data.problems(true).is_empty());
    }

    #[test]
    fn unloaded_pattern_is_reported() {
        let mut data = station();
        assert!(data.patterns_loaded());
        data.horizontal_pattern = Some(HorizontalPatternInfo {
            name: "ANT".to_string(),
            orientation: 0.0,
            pattern: None,
        });
        assert!(!data.patterns_loaded());
    }
}
