//! Element and attribute names of the study XML format.

/// Oldest document version still accepted.
pub const XML_VERSION_MIN: i64 = 103000;
/// Version written by the exporter and the newest accepted.
pub const XML_VERSION_CURRENT: i64 = 201004;

pub const TAG_STUDY: &str = "TVSTUDY";
pub const TAG_SCENARIO: &str = "SCENARIO";
pub const TAG_DESCRIPTION: &str = "DESCRIPTION";
pub const TAG_PARAMETER: &str = "PARAMETER";
pub const TAG_VALUE: &str = "VALUE";
pub const TAG_SOURCE: &str = "SOURCE";
pub const TAG_DTS_SOURCE: &str = "DTS_SOURCE";
pub const TAG_APAT: &str = "APAT";
pub const TAG_EPAT: &str = "EPAT";
pub const TAG_MPAT: &str = "MPAT";

pub const ATTR_VERSION: &str = "VERSION";
pub const ATTR_NAME: &str = "NAME";
pub const ATTR_KEY: &str = "KEY";
pub const ATTR_INDEX: &str = "INDEX";

pub const ATTR_SERVICE: &str = "SERVICE";
pub const ATTR_COUNTRY: &str = "COUNTRY";
pub const ATTR_LOCKED: &str = "LOCKED";
pub const ATTR_DESIRED: &str = "DESIRED";
/// Legacy spelling of [`ATTR_DESIRED`].
pub const ATTR_STUDY: &str = "STUDY";
pub const ATTR_UNDESIRED: &str = "UNDESIRED";
pub const ATTR_RECORD_ID: &str = "RECORD_ID";
/// Legacy spelling of [`ATTR_RECORD_ID`].
pub const ATTR_CDBS_ID: &str = "CDBS_ID";
pub const ATTR_USER_RECORD_ID: &str = "USER_RECORD_ID";
pub const ATTR_REPLICATE: &str = "REPLICATE";

pub const ATTR_FACILITY_ID: &str = "FACILITY_ID";
pub const ATTR_CALL_SIGN: &str = "CALL_SIGN";
pub const ATTR_CHANNEL: &str = "CHANNEL";
pub const ATTR_CITY: &str = "CITY";
pub const ATTR_STATE: &str = "STATE";
pub const ATTR_LATITUDE: &str = "LATITUDE";
pub const ATTR_LONGITUDE: &str = "LONGITUDE";
pub const ATTR_SITE_NUMBER: &str = "SITE_NUMBER";
pub const ATTR_HAMSL: &str = "HAMSL";
pub const ATTR_HAAT: &str = "HAAT";
pub const ATTR_ERP: &str = "ERP";

pub const ATTR_HAS_APAT: &str = "HAS_APAT";
pub const ATTR_APAT_NAME: &str = "APAT_NAME";
pub const ATTR_APAT_ORIENT: &str = "APAT_ORIENT";
pub const ATTR_HAS_EPAT: &str = "HAS_EPAT";
pub const ATTR_EPAT_NAME: &str = "EPAT_NAME";
pub const ATTR_EPAT_ETILT: &str = "EPAT_ETILT";
pub const ATTR_EPAT_MTILT: &str = "EPAT_MTILT";
pub const ATTR_EPAT_ORIENT: &str = "EPAT_ORIENT";
pub const ATTR_HAS_MPAT: &str = "HAS_MPAT";
pub const ATTR_MPAT_NAME: &str = "MPAT_NAME";
pub const ATTR_USE_GENERIC: &str = "USE_GENERIC";
