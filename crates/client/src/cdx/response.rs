//! Capture index response formats.
//!
//! The index answers either with the wayback XML query format or with JSON
//! (an array of objects, an object with a `results` array, CDX-server style
//! header-plus-rows, or newline-delimited objects). Each record becomes an
//! [`IndexResult`] and is normalized into a [`Capture`] right away.

use quick_xml::Reader;
use quick_xml::events::Event;
use serde::Deserialize;

use memento_core::Capture;
use memento_core::timestamp::{Timestamp, TimestampError};

/// Failures while reading an index response or one of its records.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndexParseError {
    #[error("unrecognised response format")]
    UnknownFormat,

    #[error("XML error: {0}")]
    Xml(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("record is missing {0}")]
    MissingField(&'static str),

    #[error("{field} is not a byte offset: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("bad capture date: {0}")]
    InvalidTimestamp(#[from] TimestampError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    Xml,
    Json,
}

impl IndexFormat {
    /// Content-Type first, then the first non-whitespace byte.
    pub fn detect(content_type: Option<&str>, body: &[u8]) -> Option<Self> {
        if let Some(ct) = content_type.map(str::to_ascii_lowercase) {
            if ct.contains("xml") {
                return Some(Self::Xml);
            }
            if ct.contains("json") {
                return Some(Self::Json);
            }
        }

        match body.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'<') => Some(Self::Xml),
            Some(b'[') | Some(b'{') => Some(Self::Json),
            _ => None,
        }
    }
}

/// One `<result>` element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlResult {
    pub file: Option<String>,
    pub compressedoffset: Option<String>,
    pub compressedendoffset: Option<String>,
    pub capturedate: Option<String>,
}

/// A JSON number or string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(u64),
    Text(String),
}

impl Scalar {
    fn into_text(self) -> String {
        match self {
            Scalar::Int(n) => n.to_string(),
            Scalar::Text(s) => s,
        }
    }
}

/// One JSON result object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct JsonResult {
    #[serde(default, alias = "filename")]
    pub file: Option<String>,
    #[serde(default, alias = "offset")]
    pub compressedoffset: Option<Scalar>,
    #[serde(default, alias = "length")]
    pub compressedendoffset: Option<Scalar>,
    #[serde(default, alias = "timestamp")]
    pub capturedate: Option<Scalar>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexResult {
    Xml(XmlResult),
    Json(JsonResult),
}

impl IndexResult {
    pub fn into_capture(self) -> Result<Capture, IndexParseError> {
        let (file, offset, end, date) = match self {
            IndexResult::Xml(r) => (r.file, r.compressedoffset, r.compressedendoffset, r.capturedate),
            IndexResult::Json(r) => (
                r.file,
                r.compressedoffset.map(Scalar::into_text),
                r.compressedendoffset.map(Scalar::into_text),
                r.capturedate.map(Scalar::into_text),
            ),
        };

        let file = file
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .ok_or(IndexParseError::MissingField("file"))?;
        let offset = offset.ok_or(IndexParseError::MissingField("compressedoffset"))?;
        let date = date.ok_or(IndexParseError::MissingField("capturedate"))?;

        Ok(Capture {
            timestamp: Timestamp::parse(&date)?,
            file,
            compressed_offset: parse_offset("compressedoffset", &offset)?,
            compressed_end_offset: match end.as_deref().map(str::trim) {
                None | Some("") | Some("-") => None,
                Some(value) => Some(parse_offset("compressedendoffset", value)?),
            },
        })
    }
}

fn parse_offset(field: &'static str, value: &str) -> Result<u64, IndexParseError> {
    value
        .trim()
        .parse()
        .map_err(|_| IndexParseError::InvalidNumber { field, value: value.to_string() })
}

/// Split a response body into index records.
///
/// A document that cannot be read at all is an error; in newline-delimited
/// JSON a bad line is skipped.
pub fn parse_index_response(content_type: Option<&str>, body: &[u8]) -> Result<Vec<IndexResult>, IndexParseError> {
    match IndexFormat::detect(content_type, body) {
        Some(IndexFormat::Xml) => parse_xml(body),
        Some(IndexFormat::Json) => parse_json(body),
        None if body.iter().all(u8::is_ascii_whitespace) => Ok(Vec::new()),
        None => Err(IndexParseError::UnknownFormat),
    }
}

#[derive(Clone, Copy)]
enum XmlField {
    File,
    Offset,
    EndOffset,
    Date,
}

fn parse_xml(body: &[u8]) -> Result<Vec<IndexResult>, IndexParseError> {
    let text = std::str::from_utf8(body).map_err(|e| IndexParseError::Xml(e.to_string()))?;
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut results = Vec::new();
    let mut current: Option<XmlResult> = None;
    let mut field: Option<XmlField> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                field = None;
                match e.name().as_ref() {
                    b"result" => current = Some(XmlResult::default()),
                    b"file" => field = Some(XmlField::File),
                    b"compressedoffset" => field = Some(XmlField::Offset),
                    b"compressedendoffset" => field = Some(XmlField::EndOffset),
                    b"capturedate" => field = Some(XmlField::Date),
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                let value = e.unescape().map_err(|e| IndexParseError::Xml(e.to_string()))?;
                set_field(current.as_mut(), field, &value);
            }
            Ok(Event::CData(e)) => {
                let value = std::str::from_utf8(&e).map_err(|e| IndexParseError::Xml(e.to_string()))?;
                set_field(current.as_mut(), field, value);
            }
            Ok(Event::End(e)) => {
                field = None;
                if e.name().as_ref() == b"result"
                    && let Some(result) = current.take()
                {
                    results.push(IndexResult::Xml(result));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(IndexParseError::Xml(format!(
                    "at position {}: {e}",
                    reader.buffer_position()
                )));
            }
            _ => {}
        }
    }

    Ok(results)
}

fn set_field(result: Option<&mut XmlResult>, field: Option<XmlField>, value: &str) {
    let (Some(result), Some(field)) = (result, field) else {
        return;
    };
    let slot = match field {
        XmlField::File => &mut result.file,
        XmlField::Offset => &mut result.compressedoffset,
        XmlField::EndOffset => &mut result.compressedendoffset,
        XmlField::Date => &mut result.capturedate,
    };
    slot.get_or_insert_with(String::new).push_str(value);
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonBody {
    Rows(Vec<Vec<serde_json::Value>>),
    List(Vec<serde_json::Value>),
    Wrapped { results: Vec<serde_json::Value> },
}

fn parse_json(body: &[u8]) -> Result<Vec<IndexResult>, IndexParseError> {
    match serde_json::from_slice::<JsonBody>(body) {
        Ok(JsonBody::List(values)) | Ok(JsonBody::Wrapped { results: values }) => Ok(objects_to_results(values)),
        Ok(JsonBody::Rows(rows)) => Ok(rows_to_results(rows)),
        Err(whole) => parse_ndjson(body).ok_or_else(|| IndexParseError::Json(whole.to_string())),
    }
}

/// One object per record; an object serde cannot read is dropped on its own.
fn objects_to_results(values: Vec<serde_json::Value>) -> Vec<IndexResult> {
    values
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<JsonResult>(value) {
            Ok(result) => Some(IndexResult::Json(result)),
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable index record");
                None
            }
        })
        .collect()
}

/// CDX-server JSON output: the first row names the columns.
fn rows_to_results(rows: Vec<Vec<serde_json::Value>>) -> Vec<IndexResult> {
    let mut rows = rows.into_iter();
    let Some(header) = rows.next() else {
        return Vec::new();
    };
    let columns: Vec<String> = header
        .into_iter()
        .map(|v| v.as_str().map(str::to_string).unwrap_or_default())
        .collect();

    rows.filter_map(|row| {
        let object: serde_json::Map<String, serde_json::Value> = columns.iter().cloned().zip(row).collect();
        match serde_json::from_value::<JsonResult>(serde_json::Value::Object(object)) {
            Ok(result) => Some(IndexResult::Json(result)),
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable index row");
                None
            }
        }
    })
    .collect()
}

/// Newline-delimited objects. None when no line parses.
fn parse_ndjson(body: &[u8]) -> Option<Vec<IndexResult>> {
    let text = std::str::from_utf8(body).ok()?;
    let mut parsed_any = false;
    let mut results = Vec::new();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match serde_json::from_str::<JsonResult>(line) {
            Ok(result) => {
                parsed_any = true;
                results.push(IndexResult::Json(result));
            }
            Err(e) => tracing::warn!(error = %e, "skipping unreadable index line"),
        }
    }

    parsed_any.then_some(results)
}
