//! Pull parser for study XML documents.
//!
//! Elements are tracked on an explicit frame stack; every start tag must be
//! legal for the frame it opens in, and quick-xml rejects mismatched end
//! tags. Scenario mode parses into a clone of the target study and commits
//! only when the whole document succeeds.

use quick_xml::Reader;
use quick_xml::escape::{resolve_predefined_entity, unescape};
use quick_xml::events::{BytesStart, Event};
use tracing::{debug, info, info_span, warn};
use tvs_core::{ExtDbLookup, ScenarioEditData, SourceEditData, StudyEditData};
use tvs_model::{
    Country, ErrorLog, ExtDbKey, HorizontalPatternInfo, MAX_PARAMETER_VALUES, MatrixPatternInfo,
    Parameter, PatternKind, Provenance, RecordId, RecordType, ScenarioKey, ScenarioType, Service,
    SourceKey, StationData, StudyType, VerticalPatternInfo,
};

use crate::attrs::Attrs;
use crate::pattern::{parse_matrix, parse_pattern};
use crate::resolve::{PendingLookups, RecordCache};
use crate::tags;
use crate::{Result, XmlError};

/// Which datasets by-reference records are looked up in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    pub lookup_ext_db: Option<ExtDbKey>,
    pub alternate_ext_db: Option<ExtDbKey>,
}

impl ParseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lookup_db(mut self, ext_db_key: ExtDbKey) -> Self {
        self.lookup_ext_db = Some(ext_db_key);
        self
    }

    pub fn with_alternate(mut self, ext_db_key: ExtDbKey) -> Self {
        self.alternate_ext_db = Some(ext_db_key);
        self
    }
}

/// Outcome of a scenario-mode import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub scenarios: Vec<ScenarioKey>,
    pub sources_bound: usize,
    pub lookup_calls: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Scenario,
    SingleRecord,
    Collection,
}

/// XML import engine.
///
/// Each entry point runs one parse in its mode. Messages about soft-skipped
/// records accumulate in [`log`](Self::log) across calls.
pub struct ParseXml<'a> {
    options: ParseOptions,
    lookup: Option<&'a mut dyn ExtDbLookup>,
    log: ErrorLog,
}

impl<'a> ParseXml<'a> {
    pub fn new(options: ParseOptions) -> Self {
        Self {
            options,
            lookup: None,
            log: ErrorLog::new(),
        }
    }

    pub fn with_lookup(mut self, lookup: &'a mut dyn ExtDbLookup) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn log(&self) -> &ErrorLog {
        &self.log
    }

    pub fn into_log(self) -> ErrorLog {
        self.log
    }

    /// Scenario mode: builds scenarios into `study`.
    ///
    /// Nothing is committed to `study` if the parse fails.
    pub fn import_scenarios(&mut self, xml: &str, study: &mut StudyEditData) -> Result<ImportSummary> {
        let _span = info_span!("xml_import", mode = "scenario", study = %study.name()).entered();
        let mut work = study.clone();
        let output = self.run(Mode::Scenario, xml, &mut work)?;
        *study = work;
        info!(
            scenarios = output.summary.scenarios.len(),
            sources = output.summary.sources_bound,
            lookups = output.summary.lookup_calls,
            "import complete"
        );
        Ok(output.summary)
    }

    /// Single-record mode: parses the first source in the document.
    pub fn parse_single_record(&mut self, xml: &str) -> Result<Option<SourceEditData>> {
        let _span = info_span!("xml_import", mode = "single_record").entered();
        let mut scratch = StudyEditData::new("record", StudyType::General);
        let output = self.run(Mode::SingleRecord, xml, &mut scratch)?;
        Ok(output
            .sources
            .first()
            .and_then(|key| scratch.get_source(*key))
            .cloned())
    }

    /// Collection mode: every unique source in the document, in order.
    pub fn parse_collection(&mut self, xml: &str) -> Result<Vec<SourceEditData>> {
        let _span = info_span!("xml_import", mode = "collection").entered();
        let mut scratch = StudyEditData::new("collection", StudyType::General);
        let output = self.run(Mode::Collection, xml, &mut scratch)?;
        Ok(output
            .sources
            .iter()
            .filter_map(|key| scratch.get_source(*key).cloned())
            .collect())
    }

    fn run(&mut self, mode: Mode, xml: &str, study: &mut StudyEditData) -> Result<RunOutput> {
        let cache = RecordCache::new(self.options.lookup_ext_db, self.options.alternate_ext_db, study);
        let mut session = Session {
            mode,
            options: self.options,
            lookup: reborrow(&mut self.lookup),
            study,
            log: &mut self.log,
            cache,
            stack: Vec::new(),
            document_seen: false,
            document_entries: Vec::new(),
            document_pending: PendingLookups::default(),
            output: RunOutput::default(),
        };
        session.parse(xml)?;
        Ok(session.output)
    }
}

fn reborrow<'x>(lookup: &'x mut Option<&mut dyn ExtDbLookup>) -> Option<&'x mut dyn ExtDbLookup> {
    match lookup {
        Some(lookup) => Some(&mut **lookup),
        None => None,
    }
}

#[derive(Debug, Default)]
struct RunOutput {
    summary: ImportSummary,
    sources: Vec<SourceKey>,
}

/// A source element resolved or awaiting lookup.
#[derive(Debug)]
enum Entry {
    Inline {
        /// Present when `source` is a replication of it.
        original: Option<SourceEditData>,
        source: SourceEditData,
        desired: bool,
        undesired: bool,
    },
    Reference {
        record_id: RecordId,
        replicate: Option<i32>,
        desired: bool,
        undesired: bool,
    },
}

#[derive(Debug)]
struct InlineSource {
    station: StationData,
    is_locked: bool,
    provenance: Provenance,
    dts_sites: Vec<SourceEditData>,
}

#[derive(Debug)]
enum SourceBody {
    Reference(RecordId),
    Inline(InlineSource),
}

#[derive(Debug)]
struct SourceFrame {
    element: &'static str,
    desired: bool,
    undesired: bool,
    replicate: Option<i32>,
    body: SourceBody,
    content: String,
}

#[derive(Debug, Default)]
struct ScenarioFrame {
    name: String,
    description: String,
    parameters: Vec<Parameter>,
    entries: Vec<Entry>,
    pending: PendingLookups,
}

#[derive(Debug)]
enum Frame {
    Document,
    Scenario(ScenarioFrame),
    Description(String),
    Parameter(Parameter),
    Value { index: usize, text: String },
    Source(SourceFrame),
    Pattern { tag: &'static str, text: String },
    Ignored(String),
}

impl Frame {
    fn tag(&self) -> &str {
        match self {
            Frame::Document => tags::TAG_STUDY,
            Frame::Scenario(_) => tags::TAG_SCENARIO,
            Frame::Description(_) => tags::TAG_DESCRIPTION,
            Frame::Parameter(_) => tags::TAG_PARAMETER,
            Frame::Value { .. } => tags::TAG_VALUE,
            Frame::Source(frame) => frame.element,
            Frame::Pattern { tag, .. } => tag,
            Frame::Ignored(name) => name,
        }
    }
}

fn known_tag(name: &str) -> Option<&'static str> {
    [
        tags::TAG_STUDY,
        tags::TAG_SCENARIO,
        tags::TAG_DESCRIPTION,
        tags::TAG_PARAMETER,
        tags::TAG_VALUE,
        tags::TAG_SOURCE,
        tags::TAG_DTS_SOURCE,
        tags::TAG_APAT,
        tags::TAG_EPAT,
        tags::TAG_MPAT,
    ]
    .into_iter()
    .find(|tag| *tag == name)
}

struct Session<'s> {
    mode: Mode,
    options: ParseOptions,
    lookup: Option<&'s mut dyn ExtDbLookup>,
    study: &'s mut StudyEditData,
    log: &'s mut ErrorLog,
    cache: RecordCache,
    stack: Vec<Frame>,
    document_seen: bool,
    document_entries: Vec<Entry>,
    document_pending: PendingLookups,
    output: RunOutput,
}

impl Session<'_> {
    fn parse(&mut self, xml: &str) -> Result<()> {
        let mut reader = Reader::from_str(xml);
        loop {
            let position = reader.buffer_position();
            let event = reader.read_event().map_err(|err| XmlError::Syntax {
                position: position as u64,
                message: err.to_string(),
            })?;
            match event {
                Event::Start(start) => self.start(&start)?,
                Event::Empty(start) => {
                    self.start(&start)?;
                    self.end()?;
                }
                Event::End(_) => self.end()?,
                Event::Text(text) => {
                    let raw = String::from_utf8_lossy(&text).to_string();
                    let value = unescape(&raw).map_err(|err| XmlError::Syntax {
                        position: position as u64,
                        message: err.to_string(),
                    })?;
                    self.text(&value);
                }
                Event::CData(data) => self.text(&String::from_utf8_lossy(&data)),
                Event::GeneralRef(reference) => {
                    let name = String::from_utf8_lossy(&reference).to_string();
                    let resolved = match reference.resolve_char_ref() {
                        Ok(Some(ch)) => ch.to_string(),
                        _ => resolve_predefined_entity(&name)
                            .ok_or_else(|| XmlError::Syntax {
                                position: position as u64,
                                message: format!("unknown entity &{name};"),
                            })?
                            .to_string(),
                    };
                    self.text(&resolved);
                }
                Event::Eof => break,
                _ => {}
            }
            if self.mode == Mode::SingleRecord
                && !self.document_entries.is_empty()
                && !matches!(self.stack.last(), Some(Frame::Source(_)))
            {
                self.close_document_scope()?;
                return Ok(());
            }
        }
        if !self.stack.is_empty() {
            return Err(XmlError::Syntax {
                position: reader.buffer_position() as u64,
                message: format!("unterminated <{}> element", self.stack_top_tag()),
            });
        }
        if !self.document_seen {
            return Err(XmlError::NotStudyDocument(String::new()));
        }
        Ok(())
    }

    fn stack_top_tag(&self) -> String {
        self.stack
            .last()
            .map(|frame| frame.tag().to_string())
            .unwrap_or_default()
    }

    fn unexpected(&self, name: &str) -> XmlError {
        XmlError::UnexpectedElement {
            element: name.to_string(),
            parent: self.stack_top_tag(),
        }
    }

    fn start(&mut self, start: &BytesStart<'_>) -> Result<()> {
        let name = String::from_utf8_lossy(start.name().as_ref()).to_string();
        if self.stack.is_empty() {
            if self.document_seen || name != tags::TAG_STUDY {
                return Err(XmlError::NotStudyDocument(name));
            }
            let attrs = Attrs::from_start(tags::TAG_STUDY, start)?;
            check_version(&attrs)?;
            self.document_seen = true;
            self.stack.push(Frame::Document);
            return Ok(());
        }
        if matches!(self.stack.last(), Some(Frame::Ignored(_))) {
            self.stack.push(Frame::Ignored(name));
            return Ok(());
        }
        let Some(tag) = known_tag(&name) else {
            debug!(element = %name, "ignoring unknown element");
            self.stack.push(Frame::Ignored(name));
            return Ok(());
        };
        let attrs = Attrs::from_start(tag, start)?;
        if tag == tags::TAG_SOURCE && matches!(self.stack.last(), Some(Frame::Document | Frame::Scenario(_))) {
            let frame = self.open_source(&attrs)?;
            self.stack.push(Frame::Source(frame));
            return Ok(());
        }
        let frame = match (self.stack.last(), tag) {
            (Some(Frame::Document), tags::TAG_SCENARIO) => Frame::Scenario(ScenarioFrame {
                name: attrs.required(tags::ATTR_NAME)?.to_string(),
                ..ScenarioFrame::default()
            }),
            (Some(Frame::Scenario(_)), tags::TAG_DESCRIPTION) => Frame::Description(String::new()),
            (Some(Frame::Scenario(_)), tags::TAG_PARAMETER) => {
                Frame::Parameter(Parameter::new(attrs.parse_required(tags::ATTR_KEY)?))
            }
            (Some(Frame::Parameter(_)), tags::TAG_VALUE) => Frame::Value {
                index: attrs.index_below(tags::ATTR_INDEX, MAX_PARAMETER_VALUES)?,
                text: String::new(),
            },
            (Some(Frame::Source(parent)), tags::TAG_DTS_SOURCE) => {
                let SourceBody::Inline(inline) = &parent.body else {
                    return Err(self.unexpected(&name));
                };
                if parent.element != tags::TAG_SOURCE || !inline.station.service.is_dts() {
                    return Err(self.unexpected(&name));
                }
                let defaults = (inline.station.service, inline.station.country);
                let station = inline_station(&attrs, Some(defaults))?;
                Frame::Source(SourceFrame {
                    element: tags::TAG_DTS_SOURCE,
                    desired: false,
                    undesired: false,
                    replicate: None,
                    body: SourceBody::Inline(InlineSource {
                        station,
                        is_locked: inline.is_locked,
                        provenance: inline.provenance.clone(),
                        dts_sites: Vec::new(),
                    }),
                    content: String::new(),
                })
            }
            (Some(Frame::Source(_)), tags::TAG_APAT | tags::TAG_EPAT | tags::TAG_MPAT) => Frame::Pattern {
                tag,
                text: String::new(),
            },
            _ => return Err(self.unexpected(&name)),
        };
        self.stack.push(frame);
        Ok(())
    }

    fn open_source(&mut self, attrs: &Attrs) -> Result<SourceFrame> {
        let desired = attrs.bool_any(&[tags::ATTR_DESIRED, tags::ATTR_STUDY], false)?;
        let undesired = attrs.bool_or(tags::ATTR_UNDESIRED, true)?;
        let is_locked = attrs.bool_or(tags::ATTR_LOCKED, false)?;
        let replicate = attrs.parse_optional(tags::ATTR_REPLICATE)?;
        let record_id = attrs
            .optional_any(&[tags::ATTR_RECORD_ID, tags::ATTR_CDBS_ID])
            .map(|value| {
                RecordId::new(value).map_err(|source| XmlError::Model {
                    element: attrs.element(),
                    source,
                })
            })
            .transpose()?;

        let body = match record_id {
            Some(record_id) if is_locked => {
                if !self.cache.is_known(&record_id) {
                    self.current_pending().request(record_id.clone());
                }
                SourceBody::Reference(record_id)
            }
            record_id => {
                let provenance = match (record_id, self.options.lookup_ext_db) {
                    (Some(record_id), Some(ext_db_key)) => Provenance::External {
                        ext_db_key,
                        record_id,
                    },
                    _ => match attrs.parse_optional::<u32>(tags::ATTR_USER_RECORD_ID)? {
                        Some(id) => Provenance::UserRecord { id },
                        None => Provenance::None,
                    },
                };
                SourceBody::Inline(InlineSource {
                    station: inline_station(attrs, None)?,
                    is_locked,
                    provenance,
                    dts_sites: Vec::new(),
                })
            }
        };
        Ok(SourceFrame {
            element: tags::TAG_SOURCE,
            desired,
            undesired,
            replicate,
            body,
            content: String::new(),
        })
    }

    fn current_pending(&mut self) -> &mut PendingLookups {
        if self.mode == Mode::Scenario {
            for frame in self.stack.iter_mut().rev() {
                if let Frame::Scenario(scenario) = frame {
                    return &mut scenario.pending;
                }
            }
        }
        &mut self.document_pending
    }

    fn text(&mut self, value: &str) {
        let target = match self.stack.last_mut() {
            Some(Frame::Description(text))
            | Some(Frame::Value { text, .. })
            | Some(Frame::Pattern { text, .. }) => text,
            Some(Frame::Source(frame)) => &mut frame.content,
            _ => return,
        };
        target.push_str(value);
    }

    fn end(&mut self) -> Result<()> {
        let Some(frame) = self.stack.pop() else {
            return Err(XmlError::Syntax {
                position: 0,
                message: "end tag without start tag".to_string(),
            });
        };
        match frame {
            Frame::Document => self.close_document_scope(),
            Frame::Scenario(scenario) => self.close_scenario(scenario),
            Frame::Description(text) => {
                if let Some(Frame::Scenario(scenario)) = self.stack.last_mut() {
                    scenario.description = text.trim().to_string();
                }
                Ok(())
            }
            Frame::Parameter(parameter) => {
                if let Some(Frame::Scenario(scenario)) = self.stack.last_mut() {
                    scenario.parameters.push(parameter);
                }
                Ok(())
            }
            Frame::Value { index, text } => {
                if let Some(Frame::Parameter(parameter)) = self.stack.last_mut() {
                    parameter
                        .set_value(index, text.trim())
                        .map_err(|source| XmlError::Model {
                            element: tags::TAG_VALUE,
                            source,
                        })?;
                }
                Ok(())
            }
            Frame::Pattern { tag, text } => self.close_pattern(tag, &text),
            Frame::Source(source) => self.close_source(source),
            Frame::Ignored(_) => Ok(()),
        }
    }

    fn close_pattern(&mut self, tag: &'static str, text: &str) -> Result<()> {
        let Some(Frame::Source(frame)) = self.stack.last_mut() else {
            return Ok(());
        };
        let SourceBody::Inline(inline) = &mut frame.body else {
            return Ok(());
        };
        let station = &mut inline.station;
        match tag {
            tags::TAG_APAT => {
                if let Some(info) = station.horizontal_pattern.as_mut() {
                    info.pattern = Some(parse_pattern(tag, PatternKind::Horizontal, text)?);
                }
            }
            tags::TAG_EPAT => {
                if let Some(info) = station.vertical_pattern.as_mut() {
                    info.pattern = Some(parse_pattern(tag, PatternKind::Vertical, text)?);
                }
            }
            _ => {
                if let Some(info) = station.matrix_pattern.as_mut() {
                    info.pattern = Some(parse_matrix(tag, text)?);
                }
            }
        }
        Ok(())
    }

    fn close_source(&mut self, frame: SourceFrame) -> Result<()> {
        let SourceFrame {
            element,
            desired,
            undesired,
            replicate,
            body,
            content,
        } = frame;
        let inline = match body {
            SourceBody::Reference(record_id) => {
                return self.push_entry(Entry::Reference {
                    record_id,
                    replicate,
                    desired,
                    undesired,
                });
            }
            SourceBody::Inline(inline) => inline,
        };
        require_pattern_elements(element, &inline.station)?;

        let key = self.study.new_source_key();
        let mut source = SourceEditData::new(key, inline.station, inline.is_locked, inline.provenance)
            .with_dts_sources(inline.dts_sites);
        for line in content.lines().map(str::trim).filter(|line| !line.is_empty()) {
            match line.split_once('=') {
                Some((name, value)) => source.set_attribute(name.trim(), value.trim()),
                None => {
                    warn!(source = %key, line, "ignoring malformed attribute line");
                    self.log
                        .report_message(format!("Ignored attribute line '{line}' in {element}"));
                }
            }
        }

        if element == tags::TAG_DTS_SOURCE {
            if let Some(Frame::Source(parent)) = self.stack.last_mut()
                && let SourceBody::Inline(parent) = &mut parent.body
            {
                parent.dts_sites.push(source);
            }
            return Ok(());
        }

        let replicate = effective_replicate(&source, replicate);
        let channel = replicate.unwrap_or_else(|| source.channel());
        if !self.study.channel_in_range(source.record_type(), channel) {
            warn!(call_sign = %source.call_sign(), channel, "source outside study channel range");
            self.log.report_warning(format!(
                "Station {} on channel {channel} is outside the study channel range, not imported",
                source.call_sign()
            ));
            return Ok(());
        }
        let entry = match replicate.filter(|channel| source.needs_replication(*channel)) {
            Some(channel) => {
                let replica_key = self.study.new_source_key();
                let study = &mut *self.study;
                let replica = source.replicate(replica_key, channel, &mut || study.new_source_key())?;
                Entry::Inline {
                    original: Some(source),
                    source: replica,
                    desired,
                    undesired,
                }
            }
            None => Entry::Inline {
                original: None,
                source,
                desired,
                undesired,
            },
        };
        self.push_entry(entry)
    }

    fn push_entry(&mut self, entry: Entry) -> Result<()> {
        if self.mode == Mode::Scenario {
            let scenario = self.stack.iter_mut().rev().find_map(|frame| match frame {
                Frame::Scenario(scenario) => Some(scenario),
                _ => None,
            });
            match scenario {
                Some(scenario) => scenario.entries.push(entry),
                None => {
                    debug!("source outside a scenario ignored");
                    self.log
                        .report_message("Ignored a station outside of any scenario");
                }
            }
            return Ok(());
        }
        self.document_entries.push(entry);
        Ok(())
    }

    /// Attaches an entry's source to the study and returns the key to bind.
    fn attach_entry(&mut self, entry: Entry) -> Result<Option<(SourceKey, bool, bool)>> {
        match entry {
            Entry::Inline {
                original,
                source,
                desired,
                undesired,
            } => {
                if let Some(original) = original {
                    self.study.add_or_replace_source(original)?;
                }
                let key = source.key();
                self.study.add_or_replace_source(source)?;
                Ok(Some((key, desired, undesired)))
            }
            Entry::Reference {
                record_id,
                replicate,
                desired,
                undesired,
            } => Ok(self
                .cache
                .resolve(self.study, &record_id, replicate, self.log)?
                .map(|key| (key, desired, undesired))),
        }
    }

    fn close_scenario(&mut self, frame: ScenarioFrame) -> Result<()> {
        if self.mode != Mode::Scenario {
            return Ok(());
        }
        let ScenarioFrame {
            name,
            description,
            parameters,
            entries,
            pending,
        } = frame;
        let _span = info_span!("scenario", name = %name).entered();
        self.cache
            .flush(pending, reborrow(&mut self.lookup), self.study, self.log)?;
        self.output.summary.lookup_calls = self.cache.lookup_calls();

        let unique = self.study.unique_scenario_name(&name);
        if unique != name {
            self.log.report_message(format!(
                "Scenario '{name}' already exists, imported as '{unique}'"
            ));
        }
        let key = self.study.new_scenario_key();
        let mut scenario = ScenarioEditData::new(key, unique, ScenarioType::Default, false);
        scenario.set_description(description);
        for parameter in parameters {
            for (index, value) in parameter.values.into_iter().enumerate() {
                scenario.set_parameter_value(parameter.key, index, value)?;
            }
        }

        let study_type = self.study.study_type();
        let mut has_desired_tv = false;
        for entry in entries {
            let Some((source_key, mut desired, mut undesired)) = self.attach_entry(entry)? else {
                continue;
            };
            if scenario.source_list().contains_key(source_key) {
                debug!(source = %source_key, "duplicate source in scenario ignored");
                continue;
            }
            let Some(source) = self.study.get_source(source_key) else {
                continue;
            };
            if desired && source.record_type() == RecordType::Tv && study_type.single_desired_tv() {
                let wrong_channel = study_type
                    .tv_desired_channel()
                    .is_some_and(|channel| channel != source.channel());
                if has_desired_tv || wrong_channel {
                    debug!(source = %source_key, "demoting desired TV record");
                    desired = false;
                    undesired = true;
                } else {
                    has_desired_tv = true;
                }
            }
            scenario.source_list_mut().bind(
                self.study.sources_mut(),
                source_key,
                desired,
                undesired,
                false,
            )?;
        }

        if scenario.source_list().is_empty() {
            warn!(scenario = %scenario.name(), "scenario has no stations, not imported");
            self.log.report_warning(format!(
                "Scenario '{}' has no stations and was not imported",
                scenario.name()
            ));
            return Ok(());
        }
        self.output.summary.sources_bound += scenario.source_list().len();
        self.output.summary.scenarios.push(key);
        self.study.add_scenario(scenario);
        Ok(())
    }

    fn close_document_scope(&mut self) -> Result<()> {
        if self.mode == Mode::Scenario {
            return Ok(());
        }
        let pending = std::mem::take(&mut self.document_pending);
        self.cache
            .flush(pending, reborrow(&mut self.lookup), self.study, self.log)?;
        self.output.summary.lookup_calls = self.cache.lookup_calls();
        for entry in std::mem::take(&mut self.document_entries) {
            if let Some((key, _, _)) = self.attach_entry(entry)?
                && !self.output.sources.contains(&key)
            {
                self.output.sources.push(key);
            }
        }
        Ok(())
    }
}

/// Only TV records replicate; the target is ignored for anything else.
pub(crate) fn effective_replicate(source: &SourceEditData, replicate: Option<i32>) -> Option<i32> {
    replicate.filter(|_| source.record_type() == RecordType::Tv)
}

fn check_version(attrs: &Attrs) -> Result<()> {
    let version: i64 = attrs.parse_required(tags::ATTR_VERSION)?;
    if version < tags::XML_VERSION_MIN {
        return Err(XmlError::UnsupportedVersion {
            version,
            reason: "the format is too old",
        });
    }
    if version > tags::XML_VERSION_CURRENT {
        return Err(XmlError::UnsupportedVersion {
            version,
            reason: "the file was written by a newer version",
        });
    }
    Ok(())
}

/// A source flagged as having a pattern must carry the pattern element.
fn require_pattern_elements(element: &'static str, station: &StationData) -> Result<()> {
    let missing = [
        (station.horizontal_pattern.as_ref().map(|info| info.pattern.is_none()), tags::TAG_APAT),
        (station.vertical_pattern.as_ref().map(|info| info.pattern.is_none()), tags::TAG_EPAT),
        (station.matrix_pattern.as_ref().map(|info| info.pattern.is_none()), tags::TAG_MPAT),
    ]
    .into_iter()
    .find_map(|(missing, child)| (missing == Some(true)).then_some(child));
    match missing {
        Some(child) => Err(XmlError::MissingElement { element, child }),
        None => Ok(()),
    }
}

/// Station content of an inline source or DTS site.
fn inline_station(attrs: &Attrs, defaults: Option<(Service, Country)>) -> Result<StationData> {
    let element = attrs.element();
    let model_error = |source| XmlError::Model { element, source };
    let service = match (attrs.optional(tags::ATTR_SERVICE), defaults) {
        (Some(code), _) => Service::from_code(code).map_err(model_error)?,
        (None, Some((service, _))) => service,
        (None, None) => {
            return Err(XmlError::MissingAttribute {
                element,
                attribute: tags::ATTR_SERVICE,
            });
        }
    };
    let country = match (attrs.optional(tags::ATTR_COUNTRY), defaults) {
        (Some(code), _) => code.parse::<Country>().map_err(model_error)?,
        (None, Some((_, country))) => country,
        (None, None) => {
            return Err(XmlError::MissingAttribute {
                element,
                attribute: tags::ATTR_COUNTRY,
            });
        }
    };

    let mut station = StationData::new(service, country);
    station.facility_id = attrs.parse_or(tags::ATTR_FACILITY_ID, 0)?;
    station.call_sign = attrs.text_or_empty(tags::ATTR_CALL_SIGN);
    station.channel = match service.record_type() {
        RecordType::Wireless => attrs.parse_or(tags::ATTR_CHANNEL, 0)?,
        _ => attrs.parse_required(tags::ATTR_CHANNEL)?,
    };
    station.city = attrs.text_or_empty(tags::ATTR_CITY);
    station.state = attrs.text_or_empty(tags::ATTR_STATE);
    station.site_number = attrs.parse_or(tags::ATTR_SITE_NUMBER, 0)?;

    let dts_parent = service.is_dts() && defaults.is_none();
    if dts_parent {
        station.latitude = attrs.float_or(tags::ATTR_LATITUDE, 0.0)?;
        station.longitude = attrs.float_or(tags::ATTR_LONGITUDE, 0.0)?;
        station.height_amsl = attrs.float_or(tags::ATTR_HAMSL, 0.0)?;
        station.overall_haat = attrs.float_or(tags::ATTR_HAAT, 0.0)?;
        station.peak_erp = attrs.float_or(tags::ATTR_ERP, 0.0)?;
    } else {
        station.latitude = attrs.float_required(tags::ATTR_LATITUDE)?;
        station.longitude = attrs.float_required(tags::ATTR_LONGITUDE)?;
        station.height_amsl = attrs.float_required(tags::ATTR_HAMSL)?;
        station.overall_haat = attrs.float_required(tags::ATTR_HAAT)?;
        station.peak_erp = attrs.float_required(tags::ATTR_ERP)?;
    }

    if attrs.bool_or(tags::ATTR_HAS_APAT, false)? {
        station.horizontal_pattern = Some(HorizontalPatternInfo {
            name: attrs.required(tags::ATTR_APAT_NAME)?.to_string(),
            orientation: attrs.float_or(tags::ATTR_APAT_ORIENT, 0.0)?,
            pattern: None,
        });
    }
    if attrs.bool_or(tags::ATTR_HAS_EPAT, false)? {
        station.vertical_pattern = Some(VerticalPatternInfo {
            name: attrs.required(tags::ATTR_EPAT_NAME)?.to_string(),
            electrical_tilt: attrs.float_or(tags::ATTR_EPAT_ETILT, 0.0)?,
            mechanical_tilt: attrs.float_or(tags::ATTR_EPAT_MTILT, 0.0)?,
            mechanical_tilt_orientation: attrs.float_or(tags::ATTR_EPAT_ORIENT, 0.0)?,
            pattern: None,
        });
    }
    if attrs.bool_or(tags::ATTR_HAS_MPAT, false)? {
        station.matrix_pattern = Some(MatrixPatternInfo {
            name: attrs.required(tags::ATTR_MPAT_NAME)?.to_string(),
            pattern: None,
        });
    }
    station.use_generic_vertical_pattern = attrs.bool_or(tags::ATTR_USE_GENERIC, true)?;
    Ok(station)
}
