//! Streaming GPX reader.
//!
//! Elements are matched by local name, so both GPX 1.0 (what the public
//! trackpoints endpoint serves) and GPX 1.1 documents are accepted.
//!
//! A `<trkpt>` whose `<time>` is absent or unreadable is kept with
//! `time: None`; the validator drops the whole track later. Missing or
//! non-numeric coordinates fail the page.

use chrono::{DateTime, NaiveDateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use shared::{Track, TrackPoint, TrackSegment};

/// Timestamp layout used by the trackpoints API.
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("malformed GPX document: {0}")]
    Malformed(String),
    #[error("track point has invalid {attribute}: {value:?}")]
    InvalidCoordinate {
        attribute: &'static str,
        value: Option<String>,
    },
}

#[derive(Clone, Copy)]
enum Field {
    Name,
    Desc,
    Url,
    Time,
}

#[derive(Default)]
struct TrackBuilder {
    depth: usize,
    name: Option<String>,
    desc: Option<String>,
    url: Option<String>,
    link: Option<String>,
    segments: Vec<TrackSegment>,
}

impl TrackBuilder {
    fn build(self) -> Track {
        Track {
            name: self.name,
            desc: self.desc,
            url: self.url.or(self.link),
            track_segments: self.segments,
            ..Default::default()
        }
    }
}

struct PointBuilder {
    depth: usize,
    lat: f64,
    lon: f64,
    time: Option<String>,
}

#[derive(Default)]
struct PageState {
    depth: usize,
    saw_root: bool,
    root_closed: bool,
    tracks: Vec<Track>,
    track: Option<TrackBuilder>,
    segment: Option<Vec<TrackPoint>>,
    point: Option<PointBuilder>,
    capturing: Option<Field>,
    text: String,
}

impl PageState {
    fn open(&mut self, element: &BytesStart<'_>) -> Result<(), ParseError> {
        let name = element.local_name();
        let name = name.as_ref();
        if self.root_closed {
            return Err(ParseError::Malformed(format!(
                "<{}> after the closed <gpx> root",
                String::from_utf8_lossy(name)
            )));
        }
        self.depth += 1;

        if !self.saw_root {
            if name != b"gpx" {
                return Err(ParseError::Malformed(format!(
                    "root element is <{}>, expected <gpx>",
                    String::from_utf8_lossy(name)
                )));
            }
            self.saw_root = true;
            return Ok(());
        }

        match name {
            b"trk" if self.track.is_none() => {
                self.track = Some(TrackBuilder {
                    depth: self.depth,
                    ..Default::default()
                });
            }
            b"trkseg" if self.track.is_some() && self.segment.is_none() => {
                self.segment = Some(Vec::new());
            }
            b"trkpt" if self.segment.is_some() && self.point.is_none() => {
                let (lat, lon) = coordinates(element)?;
                self.point = Some(PointBuilder {
                    depth: self.depth,
                    lat,
                    lon,
                    time: None,
                });
            }
            b"time" => {
                if self.point.as_ref().is_some_and(|p| p.depth + 1 == self.depth) {
                    self.begin_capture(Field::Time);
                }
            }
            b"name" | b"desc" | b"url" if self.at_track_child() => {
                self.begin_capture(match name {
                    b"name" => Field::Name,
                    b"desc" => Field::Desc,
                    _ => Field::Url,
                });
            }
            b"link" if self.at_track_child() => {
                if let Some(href) = attribute(element, b"href")? {
                    if let Some(track) = self.track.as_mut() {
                        track.link = non_blank(href);
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn close(&mut self, name: &[u8]) {
        if self.capturing.is_some() {
            self.end_capture();
        }

        match name {
            b"trkpt" if self.point.as_ref().is_some_and(|p| p.depth == self.depth) => {
                if let (Some(point), Some(segment)) = (self.point.take(), self.segment.as_mut()) {
                    let time = point.time.as_deref().and_then(parse_timestamp);
                    if time.is_none() {
                        tracing::debug!(
                            "track point ({}, {}) has no usable timestamp",
                            point.lat,
                            point.lon
                        );
                    }
                    segment.push(TrackPoint::new(point.lat, point.lon, time));
                }
            }
            b"trkseg" if self.point.is_none() => {
                if let (Some(points), Some(track)) = (self.segment.take(), self.track.as_mut()) {
                    track.segments.push(TrackSegment::new(points));
                }
            }
            b"trk" if self.track.as_ref().is_some_and(|t| t.depth == self.depth) => {
                if let Some(track) = self.track.take() {
                    self.tracks.push(track.build());
                }
            }
            _ => {}
        }
        self.depth = self.depth.saturating_sub(1);
        if self.saw_root && self.depth == 0 {
            self.root_closed = true;
        }
    }

    fn at_track_child(&self) -> bool {
        self.segment.is_none()
            && self
                .track
                .as_ref()
                .is_some_and(|t| t.depth + 1 == self.depth)
    }

    fn begin_capture(&mut self, field: Field) {
        self.capturing = Some(field);
        self.text.clear();
    }

    fn end_capture(&mut self) {
        let Some(field) = self.capturing.take() else {
            return;
        };
        let value = non_blank(std::mem::take(&mut self.text));
        match field {
            Field::Time => {
                if let Some(point) = self.point.as_mut() {
                    point.time = value;
                }
            }
            Field::Name | Field::Desc | Field::Url => {
                if let Some(track) = self.track.as_mut() {
                    let slot = match field {
                        Field::Name => &mut track.name,
                        Field::Desc => &mut track.desc,
                        _ => &mut track.url,
                    };
                    *slot = value;
                }
            }
        }
    }

    fn finish(self) -> Result<Vec<Track>, ParseError> {
        if !self.saw_root {
            return Err(ParseError::Malformed("document has no <gpx> root".into()));
        }
        if self.depth != 0 {
            return Err(ParseError::Malformed(
                "unexpected end of document inside an open element".into(),
            ));
        }
        Ok(self.tracks)
    }
}

/// Parse one trace page into its tracks, in document order.
///
/// A well-formed document without `<trk>` elements yields an empty list;
/// anything that is not readable GPX is a [`ParseError`].
pub fn parse_page(xml: &str) -> Result<Vec<Track>, ParseError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut state = PageState::default();

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => {
                return Err(ParseError::Malformed(format!(
                    "error at position {}: {e}",
                    reader.buffer_position()
                )));
            }
        };

        match event {
            Event::Start(e) => state.open(&e)?,
            Event::Empty(e) => {
                state.open(&e)?;
                state.close(e.local_name().as_ref());
            }
            Event::End(e) => state.close(e.local_name().as_ref()),
            Event::Text(_) | Event::CData(_) if state.root_closed => {
                return Err(ParseError::Malformed(format!(
                    "text after the closed <gpx> root at position {}",
                    reader.buffer_position()
                )));
            }
            Event::Text(e) if state.capturing.is_some() => {
                let text = e
                    .unescape()
                    .map_err(|e| ParseError::Malformed(e.to_string()))?;
                state.text.push_str(&text);
            }
            Event::CData(e) if state.capturing.is_some() => {
                state.text.push_str(&String::from_utf8_lossy(&e));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    state.finish()
}

/// Accepts the fixed `YYYY-MM-DDTHH:MM:SSZ` layout and, failing that, any
/// RFC 3339 instant, normalized to UTC.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, TIME_FORMAT)
        .map(|naive| naive.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(text).map(|dt| dt.with_timezone(&Utc)))
        .ok()
}

fn coordinates(element: &BytesStart<'_>) -> Result<(f64, f64), ParseError> {
    let lat = coordinate(element, "lat")?;
    let lon = coordinate(element, "lon")?;
    Ok((lat, lon))
}

fn coordinate(element: &BytesStart<'_>, attribute_name: &'static str) -> Result<f64, ParseError> {
    let raw = attribute(element, attribute_name.as_bytes())?;
    raw.as_deref()
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .ok_or(ParseError::InvalidCoordinate {
            attribute: attribute_name,
            value: raw,
        })
}

fn attribute(element: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, ParseError> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| ParseError::Malformed(e.to_string()))?;
        if attr.key.local_name().as_ref() == key {
            let value = attr
                .unescape_value()
                .map_err(|e| ParseError::Malformed(e.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn non_blank(text: String) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == text.len() {
        Some(text)
    } else {
        Some(trimmed.to_string())
    }
}
