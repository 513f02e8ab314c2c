//! Persisted source records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{ExtDbKey, RecordId, SourceKey, StationData};

/// Where a source's content came from. Exactly one variant holds.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Provenance {
    /// Entered or imported directly; no upstream record.
    #[default]
    None,
    /// Derived from a stored user record.
    UserRecord { id: u32 },
    /// Derived from an external station dataset record.
    External {
        ext_db_key: ExtDbKey,
        record_id: RecordId,
    },
}

impl Provenance {
    pub fn ext_db_key(&self) -> Option<ExtDbKey> {
        match self {
            Provenance::External { ext_db_key, .. } => Some(*ext_db_key),
            _ => None,
        }
    }

    pub fn record_id(&self) -> Option<&RecordId> {
        match self {
            Provenance::External { record_id, .. } => Some(record_id),
            _ => None,
        }
    }

    pub fn user_record_id(&self) -> Option<u32> {
        match self {
            Provenance::UserRecord { id } => Some(*id),
            _ => None,
        }
    }
}

/// Immutable snapshot of a source as last saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub key: SourceKey,
    pub station: StationData,
    /// Derived from an immutable upstream record; station content may not be edited.
    pub is_locked: bool,
    pub provenance: Provenance,
    /// Key of the source this one was replicated from.
    pub original_source_key: Option<SourceKey>,
    pub attributes: BTreeMap<String, String>,
    /// DTS transmitter sites, owned by their parent.
    pub dts_sources: Vec<Source>,
}

impl Source {
    pub fn is_replication(&self) -> bool {
        self.original_source_key.is_some()
    }
}
