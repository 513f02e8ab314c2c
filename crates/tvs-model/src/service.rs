//! Station service codes.

use std::fmt;

use crate::{ModelError, RecordType};

/// A station service (full power digital, class A analog, wireless, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Service {
    code: &'static str,
    name: &'static str,
    record_type: RecordType,
    is_digital: bool,
    is_dts: bool,
    digital_code: Option<&'static str>,
}

const fn service(
    code: &'static str,
    name: &'static str,
    record_type: RecordType,
    is_digital: bool,
    is_dts: bool,
    digital_code: Option<&'static str>,
) -> Service {
    Service {
        code,
        name,
        record_type,
        is_digital,
        is_dts,
        digital_code,
    }
}

static SERVICES: &[Service] = &[
    service("DT", "Digital full-service", RecordType::Tv, true, false, None),
    service("TV", "Analog full-service", RecordType::Tv, false, false, Some("DT")),
    service("DC", "Digital Class A", RecordType::Tv, true, false, None),
    service("CA", "Analog Class A", RecordType::Tv, false, false, Some("DC")),
    service("LD", "Digital low power", RecordType::Tv, true, false, None),
    service("TX", "Analog translator", RecordType::Tv, false, false, Some("LD")),
    service("LP", "Analog low power", RecordType::Tv, false, false, Some("LD")),
    service("DD", "Distributed transmission", RecordType::Tv, true, true, None),
    service("WL", "Wireless base station", RecordType::Wireless, true, false, None),
    service("FM", "FM full-service", RecordType::Fm, false, false, None),
    service("FL", "FM low power", RecordType::Fm, false, false, None),
    service("FX", "FM translator", RecordType::Fm, false, false, None),
];

impl Service {
    pub fn from_code(code: &str) -> Result<Self, ModelError> {
        let code = code.trim();
        SERVICES
            .iter()
            .find(|service| service.code.eq_ignore_ascii_case(code))
            .copied()
            .ok_or_else(|| ModelError::UnknownService(code.to_string()))
    }

    pub fn all() -> &'static [Service] {
        SERVICES
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn record_type(&self) -> RecordType {
        self.record_type
    }

    pub fn is_digital(&self) -> bool {
        self.is_digital
    }

    pub fn is_dts(&self) -> bool {
        self.is_dts
    }

    /// Service a replication of this station operates under.
    pub fn digital_counterpart(&self) -> Service {
        self.digital_code
            .and_then(|code| Service::from_code(code).ok())
            .unwrap_or(*self)
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code)
    }
}

impl serde::Serialize for Service {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code)
    }
}

impl<'de> serde::Deserialize<'de> for Service {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Service::from_code(&s).map_err(serde::de::Error::custom)
    }
}
