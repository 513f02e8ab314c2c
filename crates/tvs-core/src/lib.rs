//! Edit model for broadcast interference studies.
//!
//! A [`StudyEditData`] owns the canonical [`SourceArena`] and the study's
//! scenarios. Each [`ScenarioEditData`] holds a [`SourceListData`] whose rows
//! are handles into the arena, so one source may be shared by any number of
//! scenarios. Removal from a list only releases a reference; the arena decides
//! when a source is actually gone.
//!
//! # Saving
//!
//! Saving emits SQL text through the [`SqlExecutor`] seam. Statements are
//! delete-then-insert per changed object, with inserts batched under
//! [`SaveOptions::max_statement_length`].

pub mod arena;
pub mod error;
pub mod lookup;
pub mod save;
pub mod scenario;
pub mod source_edit;
pub mod source_list;
pub mod study;

pub use arena::SourceArena;
pub use error::{EditError, LookupError, PersistError, Result};
pub use lookup::{ExtDbLookup, PatternStore, SharedSourceIndex};
pub use save::{BatchInsert, DEFAULT_MAX_STATEMENT_LENGTH, SaveOptions, SqlExecutor};
pub use scenario::ScenarioEditData;
pub use source_edit::{SourceEditData, SourceField};
pub use source_list::{SourceItem, SourceListData, SourceRemovalPolicy};
pub use study::{PATTERN_TABLES, SOURCE_TABLES, StudyEditData, decode_attributes, encode_attributes};
