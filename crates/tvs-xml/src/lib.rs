//! XML import and export for interference study scenarios.
//!
//! [`ParseXml`] reads study documents in one of three modes: scenarios into
//! a study, a single record, or a collection of records. Locked records that
//! name an external dataset record are resolved through an
//! [`ExtDbLookup`](tvs_core::ExtDbLookup) in batches, one query per dataset
//! per scenario, and shared across scenarios.
//!
//! [`write_scenarios`] and [`write_sources`] produce documents the parser
//! accepts.

mod attrs;
pub mod error;
pub mod export;
pub mod parser;
mod pattern;
mod resolve;
pub mod tags;

pub use error::{Result, XmlError};
pub use export::{scenarios_to_string, write_scenarios, write_sources};
pub use parser::{ImportSummary, ParseOptions, ParseXml};
pub use tags::{XML_VERSION_CURRENT, XML_VERSION_MIN};
