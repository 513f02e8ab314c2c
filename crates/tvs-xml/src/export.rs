//! Study XML writer.
//!
//! Sources backed by an external dataset are written by reference; everything
//! else is written inline with its full station data. Permanence flags are
//! study-local and never exported.

use std::io::Write;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use tracing::{debug, info};
use tvs_core::{EditError, ScenarioEditData, SourceArena, SourceEditData, StudyEditData};
use tvs_model::{Provenance, ScenarioKey, StationData};

use crate::tags;
use crate::{Result, XmlError};

struct XmlOut<W: Write> {
    writer: Writer<W>,
}

fn bool_text(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

impl<W: Write> XmlOut<W> {
    fn new(writer: W) -> Self {
        Self {
            writer: Writer::new_with_indent(writer, b' ', 2),
        }
    }

    fn begin_document(&mut self) -> Result<()> {
        self.writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        let mut root = BytesStart::new(tags::TAG_STUDY);
        root.push_attribute((tags::ATTR_VERSION, tags::XML_VERSION_CURRENT.to_string().as_str()));
        self.writer.write_event(Event::Start(root))?;
        Ok(())
    }

    fn end(&mut self, tag: &str) -> Result<()> {
        self.writer.write_event(Event::End(BytesEnd::new(tag)))?;
        Ok(())
    }

    fn text_element(&mut self, start: BytesStart<'_>, text: &str) -> Result<()> {
        let tag = String::from_utf8_lossy(start.name().as_ref()).to_string();
        self.writer.write_event(Event::Start(start))?;
        self.writer.write_event(Event::Text(BytesText::new(text)))?;
        self.end(&tag)
    }

    fn scenario(&mut self, scenario: &ScenarioEditData, arena: &SourceArena) -> Result<()> {
        let mut start = BytesStart::new(tags::TAG_SCENARIO);
        start.push_attribute((tags::ATTR_NAME, scenario.name()));
        self.writer.write_event(Event::Start(start))?;
        if !scenario.description().is_empty() {
            self.text_element(BytesStart::new(tags::TAG_DESCRIPTION), scenario.description())?;
        }
        for parameter in scenario.parameters() {
            let mut start = BytesStart::new(tags::TAG_PARAMETER);
            start.push_attribute((tags::ATTR_KEY, parameter.key.to_string().as_str()));
            self.writer.write_event(Event::Start(start))?;
            for (index, value) in parameter.values.iter().enumerate() {
                let mut start = BytesStart::new(tags::TAG_VALUE);
                start.push_attribute((tags::ATTR_INDEX, index.to_string().as_str()));
                self.text_element(start, value)?;
            }
            self.end(tags::TAG_PARAMETER)?;
        }
        for item in scenario.source_list().items() {
            let source = arena
                .get(item.key())
                .ok_or(EditError::MissingSource(item.key()))?;
            self.source(source, arena, Some((item.is_desired(), item.is_undesired())))?;
        }
        self.end(tags::TAG_SCENARIO)
    }

    /// Writes one top-level source. `flags` carries the scenario membership
    /// flags when written inside a scenario.
    fn source(
        &mut self,
        source: &SourceEditData,
        arena: &SourceArena,
        flags: Option<(bool, bool)>,
    ) -> Result<()> {
        let mut start = BytesStart::new(tags::TAG_SOURCE);
        if let Some((desired, undesired)) = flags {
            start.push_attribute((tags::ATTR_DESIRED, bool_text(desired)));
            start.push_attribute((tags::ATTR_UNDESIRED, bool_text(undesired)));
        }
        let replicate = source.original_source_key().map(|_| source.channel());
        let original = source.original_source_key().and_then(|key| arena.get(key));
        let by_reference = source.is_locked() && original.is_none_or(SourceEditData::is_locked);

        if by_reference
            && let Provenance::External { record_id, .. } = source.provenance()
        {
            start.push_attribute((tags::ATTR_LOCKED, "true"));
            start.push_attribute((tags::ATTR_RECORD_ID, record_id.as_str()));
            if let Some(channel) = replicate {
                start.push_attribute((tags::ATTR_REPLICATE, channel.to_string().as_str()));
            }
            self.writer.write_event(Event::Empty(start))?;
            return Ok(());
        }

        // Inline replications are written as their original plus a target.
        let (body, replicate) = match original {
            Some(original) => (original, replicate),
            None => (source, None),
        };
        start.push_attribute((tags::ATTR_LOCKED, bool_text(body.is_locked())));
        match body.provenance() {
            Provenance::UserRecord { id } => {
                start.push_attribute((tags::ATTR_USER_RECORD_ID, id.to_string().as_str()));
            }
            Provenance::External { record_id, .. } if !body.is_locked() => {
                start.push_attribute((tags::ATTR_RECORD_ID, record_id.as_str()));
            }
            _ => {}
        }
        if let Some(channel) = replicate {
            start.push_attribute((tags::ATTR_REPLICATE, channel.to_string().as_str()));
        }
        self.inline_body(tags::TAG_SOURCE, start, body)
    }

    fn inline_body(&mut self, tag: &'static str, mut start: BytesStart<'_>, source: &SourceEditData) -> Result<()> {
        if !source.station().patterns_loaded() {
            return Err(EditError::PatternsNotLoaded(source.key()).into());
        }
        station_attributes(&mut start, source.station());
        self.writer.write_event(Event::Start(start))?;

        let lines: String = source
            .attributes()
            .iter()
            .map(|(name, value)| format!("{name}={value}\n"))
            .collect();
        if !lines.is_empty() {
            self.writer.write_event(Event::Text(BytesText::new(&lines)))?;
        }
        self.patterns(source.station())?;
        for site in source.dts_sources() {
            self.inline_body(tags::TAG_DTS_SOURCE, BytesStart::new(tags::TAG_DTS_SOURCE), site)?;
        }
        self.end(tag)
    }

    fn patterns(&mut self, station: &StationData) -> Result<()> {
        if let Some(pattern) = station.horizontal_pattern.as_ref().and_then(|info| info.pattern.as_ref()) {
            let text = point_lines(pattern.points().iter().map(|p| format!("{},{}", p.angle, p.field)));
            self.text_element(BytesStart::new(tags::TAG_APAT), &text)?;
        }
        if let Some(pattern) = station.vertical_pattern.as_ref().and_then(|info| info.pattern.as_ref()) {
            let text = point_lines(pattern.points().iter().map(|p| format!("{},{}", p.angle, p.field)));
            self.text_element(BytesStart::new(tags::TAG_EPAT), &text)?;
        }
        if let Some(matrix) = station.matrix_pattern.as_ref().and_then(|info| info.pattern.as_ref()) {
            let text = point_lines(matrix.slices().iter().flat_map(|slice| {
                slice
                    .pattern
                    .points()
                    .iter()
                    .map(move |p| format!("{},{},{}", slice.azimuth, p.angle, p.field))
            }));
            self.text_element(BytesStart::new(tags::TAG_MPAT), &text)?;
        }
        Ok(())
    }

    fn finish(mut self) -> Result<W> {
        self.end(tags::TAG_STUDY)?;
        Ok(self.writer.into_inner())
    }
}

fn point_lines(points: impl Iterator<Item = String>) -> String {
    let mut text = String::from("\n");
    for point in points {
        text.push_str(&point);
        text.push('\n');
    }
    text
}

fn station_attributes(start: &mut BytesStart<'_>, station: &StationData) {
    let mut push = |name: &str, value: String| start.push_attribute((name, value.as_str()));
    push(tags::ATTR_SERVICE, station.service.code().to_string());
    push(tags::ATTR_COUNTRY, station.country.code().to_string());
    if station.facility_id != 0 {
        push(tags::ATTR_FACILITY_ID, station.facility_id.to_string());
    }
    if !station.call_sign.is_empty() {
        push(tags::ATTR_CALL_SIGN, station.call_sign.clone());
    }
    push(tags::ATTR_CHANNEL, station.channel.to_string());
    if !station.city.is_empty() {
        push(tags::ATTR_CITY, station.city.clone());
    }
    if !station.state.is_empty() {
        push(tags::ATTR_STATE, station.state.clone());
    }
    if station.site_number != 0 {
        push(tags::ATTR_SITE_NUMBER, station.site_number.to_string());
    }
    push(tags::ATTR_LATITUDE, station.latitude.to_string());
    push(tags::ATTR_LONGITUDE, station.longitude.to_string());
    push(tags::ATTR_HAMSL, station.height_amsl.to_string());
    push(tags::ATTR_HAAT, station.overall_haat.to_string());
    push(tags::ATTR_ERP, station.peak_erp.to_string());
    if let Some(info) = &station.horizontal_pattern {
        push(tags::ATTR_HAS_APAT, "true".to_string());
        push(tags::ATTR_APAT_NAME, info.name.clone());
        push(tags::ATTR_APAT_ORIENT, info.orientation.to_string());
    }
    if let Some(info) = &station.vertical_pattern {
        push(tags::ATTR_HAS_EPAT, "true".to_string());
        push(tags::ATTR_EPAT_NAME, info.name.clone());
        push(tags::ATTR_EPAT_ETILT, info.electrical_tilt.to_string());
        push(tags::ATTR_EPAT_MTILT, info.mechanical_tilt.to_string());
        push(tags::ATTR_EPAT_ORIENT, info.mechanical_tilt_orientation.to_string());
    }
    if let Some(info) = &station.matrix_pattern {
        push(tags::ATTR_HAS_MPAT, "true".to_string());
        push(tags::ATTR_MPAT_NAME, info.name.clone());
    }
    if !station.use_generic_vertical_pattern {
        push(tags::ATTR_USE_GENERIC, "false".to_string());
    }
}

/// Writes the given scenarios, or every top-level scenario when `keys` is
/// empty, as one study document.
pub fn write_scenarios<W: Write>(writer: W, study: &StudyEditData, keys: &[ScenarioKey]) -> Result<W> {
    if let Some(missing) = keys.iter().find(|key| study.scenario(**key).is_none()) {
        return Err(XmlError::UnknownScenario(*missing));
    }
    let mut out = XmlOut::new(writer);
    out.begin_document()?;
    let mut written = 0;
    for scenario in study.scenarios() {
        if !keys.is_empty() && !keys.contains(&scenario.key()) {
            continue;
        }
        debug!(scenario = %scenario.name(), sources = scenario.source_list().len(), "exporting scenario");
        out.scenario(scenario, study.sources())?;
        written += 1;
    }
    info!(study = %study.name(), scenarios = written, "exported scenarios");
    out.finish()
}

/// Writes sources as top-level elements, for collection or single-record
/// import.
pub fn write_sources<'s, W: Write>(
    writer: W,
    arena: &SourceArena,
    sources: impl IntoIterator<Item = &'s SourceEditData>,
) -> Result<W> {
    let mut out = XmlOut::new(writer);
    out.begin_document()?;
    for source in sources {
        out.source(source, arena, None)?;
    }
    out.finish()
}

/// Convenience wrapper around [`write_scenarios`] producing a string.
pub fn scenarios_to_string(study: &StudyEditData, keys: &[ScenarioKey]) -> Result<String> {
    let bytes = write_scenarios(Vec::new(), study, keys)?;
    String::from_utf8(bytes).map_err(|err| XmlError::Syntax {
        position: 0,
        message: err.to_string(),
    })
}
