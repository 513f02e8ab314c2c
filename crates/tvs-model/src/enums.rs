use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use crate::ModelError;

/// Lowest and highest TV channel accepted anywhere.
pub const TV_CHANNEL_MIN: i32 = 2;
pub const TV_CHANNEL_MAX: i32 = 69;

/// FM channels are numbered 200 (87.9 MHz) through 300 (107.9 MHz).
pub const FM_CHANNEL_MIN: i32 = 200;
pub const FM_CHANNEL_MAX: i32 = 300;

/// Station record type. Each type persists to its own source table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    Tv,
    Wireless,
    Fm,
}

impl RecordType {
    pub fn code(self) -> i32 {
        match self {
            RecordType::Tv => 1,
            RecordType::Wireless => 2,
            RecordType::Fm => 3,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(RecordType::Tv),
            2 => Some(RecordType::Wireless),
            3 => Some(RecordType::Fm),
            _ => None,
        }
    }

    /// Wireless records only ever act as interferers.
    pub fn can_be_desired(self) -> bool {
        !matches!(self, RecordType::Wireless)
    }

    pub fn channel_range(self) -> Option<RangeInclusive<i32>> {
        match self {
            RecordType::Tv => Some(TV_CHANNEL_MIN..=TV_CHANNEL_MAX),
            RecordType::Fm => Some(FM_CHANNEL_MIN..=FM_CHANNEL_MAX),
            RecordType::Wireless => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecordType::Tv => "TV",
            RecordType::Wireless => "Wireless",
            RecordType::Fm => "FM",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Country {
    #[serde(rename = "US")]
    Us,
    #[serde(rename = "CA")]
    Ca,
    #[serde(rename = "MX")]
    Mx,
}

impl Country {
    pub fn code(self) -> &'static str {
        match self {
            Country::Us => "US",
            Country::Ca => "CA",
            Country::Mx => "MX",
        }
    }
}

impl fmt::Display for Country {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Country {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "US" => Ok(Country::Us),
            "CA" => Ok(Country::Ca),
            "MX" => Ok(Country::Mx),
            _ => Err(ModelError::UnknownCountry(s.to_string())),
        }
    }
}

/// Study type. Determines which per-scenario desired-station rules apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudyType {
    #[default]
    General,
    Tv,
    TvIx,
    TvOet74,
    Tv6Fm,
    Fm,
}

impl StudyType {
    /// Channel that the TV desired record must be on, if the study restricts it.
    pub fn tv_desired_channel(self) -> Option<i32> {
        match self {
            StudyType::Tv6Fm => Some(6),
            _ => None,
        }
    }

    /// Whether a scenario may hold at most one desired TV record.
    pub fn single_desired_tv(self) -> bool {
        matches!(self, StudyType::TvIx | StudyType::TvOet74 | StudyType::Tv6Fm)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StudyType::General => "general",
            StudyType::Tv => "tv",
            StudyType::TvIx => "tv_ix",
            StudyType::TvOet74 => "tv_oet74",
            StudyType::Tv6Fm => "tv6_fm",
            StudyType::Fm => "fm",
        }
    }
}

impl fmt::Display for StudyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioType {
    #[default]
    Default,
    TvixProposal,
    /// Auto-built interference scenarios whose sources are shared with the
    /// proposal scenarios and are not owned per scenario.
    TvixInterference,
}

impl ScenarioType {
    pub fn code(self) -> i32 {
        match self {
            ScenarioType::Default => 1,
            ScenarioType::TvixProposal => 2,
            ScenarioType::TvixInterference => 3,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(ScenarioType::Default),
            2 => Some(ScenarioType::TvixProposal),
            3 => Some(ScenarioType::TvixInterference),
            _ => None,
        }
    }
}

/// Format family of an external station dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtDbType {
    Cdbs,
    Lms,
    Wireless,
    CdbsFm,
    LmsLive,
}

impl ExtDbType {
    pub fn code(self) -> i32 {
        match self {
            ExtDbType::Cdbs => 1,
            ExtDbType::Lms => 2,
            ExtDbType::Wireless => 3,
            ExtDbType::CdbsFm => 4,
            ExtDbType::LmsLive => 5,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(ExtDbType::Cdbs),
            2 => Some(ExtDbType::Lms),
            3 => Some(ExtDbType::Wireless),
            4 => Some(ExtDbType::CdbsFm),
            5 => Some(ExtDbType::LmsLive),
            _ => None,
        }
    }

    /// Live datasets are remote and always-on; they have no stored snapshot.
    pub fn is_live(self) -> bool {
        matches!(self, ExtDbType::LmsLive)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExtDbType::Cdbs => "CDBS",
            ExtDbType::Lms => "LMS",
            ExtDbType::Wireless => "Wireless",
            ExtDbType::CdbsFm => "CDBS FM",
            ExtDbType::LmsLive => "LMS live",
        }
    }
}

impl fmt::Display for ExtDbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wireless_cannot_be_desired() {
        assert!(!RecordType::Wireless.can_be_desired());
        assert!(RecordType::Tv.can_be_desired());
        assert!(RecordType::Fm.can_be_desired());
    }

    #[test]
    fn country_parses_case_insensitively() {
        assert_eq!("us".parse::<Country>().unwrap(), Country::Us);
        assert_eq!(" MX ".parse::<Country>().unwrap(), Country::Mx);
        assert!("XX".parse::<Country>().is_err());
    }

    #[test]
    fn tv6_fm_restricts_desired_channel() {
        assert_eq!(StudyType::Tv6Fm.tv_desired_channel(), Some(6));
        assert_eq!(StudyType::Tv.tv_desired_channel(), None);
        assert!(StudyType::TvIx.single_desired_tv());
        assert!(!StudyType::General.single_desired_tv());
    }

    #[test]
    fn codes_round_trip() {
        for kind in [RecordType::Tv, RecordType::Wireless, RecordType::Fm] {
            assert_eq!(RecordType::from_code(kind.code()), Some(kind));
        }
        assert_eq!(ScenarioType::from_code(3), Some(ScenarioType::TvixInterference));
        assert_eq!(ExtDbType::from_code(9), None);
    }
}
