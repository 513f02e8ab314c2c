//! External station dataset descriptors and records.

use chrono::NaiveDateTime;

use crate::{ExtDbKey, ExtDbType, RecordId, StationData};

/// One row of the external dataset index.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtDbInfo {
    pub key: ExtDbKey,
    pub db_type: ExtDbType,
    pub version: i32,
    pub date: NaiveDateTime,
    pub name: String,
    /// Advisory single-writer lock; there is no lease or expiry.
    pub is_locked: bool,
    /// Tombstone; deleted datasets never resolve.
    pub is_deleted: bool,
}

impl ExtDbInfo {
    pub fn description(&self) -> String {
        if self.name.is_empty() {
            format!("{} {}", self.db_type, self.date.format("%Y-%m-%d"))
        } else {
            format!("{} {}", self.db_type, self.name)
        }
    }
}

/// A station record as found in an external dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtRecord {
    pub ext_db_key: ExtDbKey,
    pub record_id: RecordId,
    pub station: StationData,
    /// DTS transmitter sites, empty for non-DTS records.
    pub dts_sites: Vec<StationData>,
}
