//! WARC and ARC record parsing.
//!
//! ### WARC
//! `WARC/1.x` version line, named header fields, blank line, then
//! `Content-Length` bytes of block. Blocks typed `application/http` hold an
//! HTTP message whose body is the payload.
//!
//! ### ARC
//! One header line `URL IP DATE CONTENT-TYPE ... LENGTH` (five fields in v1,
//! ten in v2), then LENGTH bytes that usually start with an HTTP response.

use std::io::Read;
use std::sync::LazyLock;

use flate2::read::{DeflateDecoder, MultiGzDecoder, ZlibDecoder};
use regex::Regex;

use memento_core::Timestamp;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

static SLUG_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new("[^0-9a-zA-Z]+").expect("invalid slug pattern"));

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("empty record")]
    Empty,

    #[error("record header is not terminated")]
    UnterminatedHeader,

    #[error("malformed record header: {0}")]
    BadHeader(String),

    #[error("record has no usable length: {0}")]
    BadLength(String),

    #[error("record block truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("decoded payload exceeds {0} bytes")]
    TooLarge(usize),
}

/// Container format of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Warc,
    Arc,
}

impl Framing {
    pub fn detect(record: &[u8]) -> Self {
        if record.starts_with(b"WARC/") { Framing::Warc } else { Framing::Arc }
    }

    /// Content type of the raw record.
    pub fn content_type(self) -> &'static str {
        match self {
            Framing::Warc => "application/warc",
            Framing::Arc => "application/arc",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Framing::Warc => "warc",
            Framing::Arc => "arc",
        }
    }
}

/// Header fields in order of appearance, looked up case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    fn parse(lines: &str) -> Self {
        let mut fields: Vec<(String, String)> = Vec::new();
        for line in lines.lines() {
            if line.starts_with([' ', '\t']) {
                if let Some((_, value)) = fields.last_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                continue;
            }
            if let Some((name, value)) = line.split_once(':') {
                fields.push((name.trim().to_string(), value.trim().to_string()));
            }
        }
        Self(fields)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// A record reduced to its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRecord {
    pub framing: Framing,
    /// WARC named fields; for ARC the header line fields under their v1 names.
    pub headers: Headers,
    pub http_status: Option<u16>,
    pub http_headers: Option<Headers>,
    pub payload: Vec<u8>,
    pub content_type: String,
}

/// Parse one uncompressed record. `limit` caps the decoded payload.
pub fn parse_record(record: &[u8], limit: usize) -> Result<ParsedRecord, RecordError> {
    if record.is_empty() {
        return Err(RecordError::Empty);
    }
    match Framing::detect(record) {
        Framing::Warc => parse_warc(record, limit),
        Framing::Arc => parse_arc(record, limit),
    }
}

/// Total length of the record at the start of `bytes`, once its header is
/// complete. Used to stop reading uncompressed record files.
pub fn record_extent(bytes: &[u8]) -> Result<Option<usize>, RecordError> {
    match Framing::detect(bytes) {
        Framing::Warc => {
            let Some((header_len, block_start)) = find_blank_line(bytes) else {
                return Ok(None);
            };
            let headers = warc_headers(&bytes[..header_len])?;
            Ok(Some(block_start + warc_block_length(&headers)?))
        }
        Framing::Arc => {
            let Some(line_end) = bytes.iter().position(|b| *b == b'\n') else {
                return Ok(None);
            };
            let line = arc_line(&bytes[..line_end])?;
            Ok(Some(line_end + 1 + line.length))
        }
    }
}

fn parse_warc(record: &[u8], limit: usize) -> Result<ParsedRecord, RecordError> {
    let (header_len, block_start) = find_blank_line(record).ok_or(RecordError::UnterminatedHeader)?;
    let headers = warc_headers(&record[..header_len])?;
    let block = take_block(&record[block_start..], warc_block_length(&headers)?)?;

    let warc_type = headers.get("WARC-Type").unwrap_or_default().to_ascii_lowercase();
    let block_type = headers.get("Content-Type").unwrap_or(DEFAULT_CONTENT_TYPE).to_string();
    let carries_http = block_type.to_ascii_lowercase().starts_with("application/http")
        || (matches!(warc_type.as_str(), "response" | "request" | "revisit") && block.starts_with(b"HTTP/"));

    if carries_http && let Some(message) = parse_http(block, limit)? {
        return Ok(ParsedRecord {
            framing: Framing::Warc,
            headers,
            http_status: message.status,
            content_type: message.content_type(),
            http_headers: Some(message.headers),
            payload: message.body,
        });
    }

    Ok(ParsedRecord {
        framing: Framing::Warc,
        headers,
        http_status: None,
        http_headers: None,
        payload: block.to_vec(),
        content_type: block_type,
    })
}

fn parse_arc(record: &[u8], limit: usize) -> Result<ParsedRecord, RecordError> {
    let line_end = record
        .iter()
        .position(|b| *b == b'\n')
        .ok_or(RecordError::UnterminatedHeader)?;
    let line = arc_line(&record[..line_end])?;
    let block = take_block(&record[line_end + 1..], line.length)?;

    let headers = Headers(vec![
        ("URL".to_string(), line.url.clone()),
        ("IP-address".to_string(), line.ip.clone()),
        ("Archive-date".to_string(), line.date.clone()),
        ("Content-type".to_string(), line.content_type.clone()),
        ("Archive-length".to_string(), line.length.to_string()),
    ]);

    if block.starts_with(b"HTTP/")
        && let Some(message) = parse_http(block, limit)?
    {
        let content_type = message
            .headers
            .get("Content-Type")
            .map(str::to_string)
            .unwrap_or_else(|| line.content_type.clone());
        return Ok(ParsedRecord {
            framing: Framing::Arc,
            headers,
            http_status: message.status,
            http_headers: Some(message.headers),
            payload: message.body,
            content_type,
        });
    }

    Ok(ParsedRecord {
        framing: Framing::Arc,
        headers,
        http_status: None,
        http_headers: None,
        payload: block.to_vec(),
        content_type: line.content_type,
    })
}

fn warc_headers(header: &[u8]) -> Result<Headers, RecordError> {
    let text = std::str::from_utf8(header).map_err(|e| RecordError::BadHeader(e.to_string()))?;
    let (version, fields) = text.split_once('\n').unwrap_or((text, ""));
    if !version.trim_end().starts_with("WARC/") {
        return Err(RecordError::BadHeader(format!("unexpected version line {version:?}")));
    }
    Ok(Headers::parse(fields))
}

fn warc_block_length(headers: &Headers) -> Result<usize, RecordError> {
    let value = headers
        .get("Content-Length")
        .ok_or_else(|| RecordError::BadLength("missing Content-Length".into()))?;
    value.trim().parse().map_err(|_| RecordError::BadLength(value.to_string()))
}

struct ArcLine {
    url: String,
    ip: String,
    date: String,
    content_type: String,
    length: usize,
}

fn arc_line(line: &[u8]) -> Result<ArcLine, RecordError> {
    let text = std::str::from_utf8(line).map_err(|e| RecordError::BadHeader(e.to_string()))?;
    let fields: Vec<&str> = text.split_whitespace().collect();
    if fields.len() < 5 {
        return Err(RecordError::BadHeader(format!("ARC header has {} fields", fields.len())));
    }

    let length_field = fields[fields.len() - 1];
    Ok(ArcLine {
        url: fields[0].to_string(),
        ip: fields[1].to_string(),
        date: fields[2].to_string(),
        content_type: fields[3].to_string(),
        length: length_field
            .parse()
            .map_err(|_| RecordError::BadLength(length_field.to_string()))?,
    })
}

fn take_block(rest: &[u8], length: usize) -> Result<&[u8], RecordError> {
    rest.get(..length)
        .ok_or(RecordError::Truncated { expected: length, actual: rest.len() })
}

/// End of the header (exclusive) and start of what follows the blank line.
///
/// Whichever terminator comes first wins, so a bare-LF header is not split
/// at a CRLF blank line further on in the body.
fn find_blank_line(bytes: &[u8]) -> Option<(usize, usize)> {
    let crlf = find(bytes, b"\r\n\r\n").map(|pos| (pos, pos + 4));
    let lf = find(bytes, b"\n\n").map(|pos| (pos, pos + 2));
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(if b.0 < a.0 { b } else { a }),
        (a, b) => a.or(b),
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

struct HttpMessage {
    status: Option<u16>,
    headers: Headers,
    body: Vec<u8>,
}

impl HttpMessage {
    fn content_type(&self) -> String {
        self.headers.get("Content-Type").unwrap_or(DEFAULT_CONTENT_TYPE).to_string()
    }
}

/// Split an HTTP message; None if it has no header terminator.
fn parse_http(block: &[u8], limit: usize) -> Result<Option<HttpMessage>, RecordError> {
    let Some((header_len, body_start)) = find_blank_line(block) else {
        return Ok(None);
    };
    let head = String::from_utf8_lossy(&block[..header_len]).into_owned();
    let (start_line, fields) = head.split_once('\n').unwrap_or((head.as_str(), ""));
    let status = start_line
        .strip_prefix("HTTP/")
        .and_then(|rest| rest.split_whitespace().nth(1))
        .and_then(|code| code.parse().ok());
    let headers = Headers::parse(fields);

    let mut body = block[body_start..].to_vec();
    if headers
        .get("Transfer-Encoding")
        .is_some_and(|te| te.to_ascii_lowercase().contains("chunked"))
    {
        match dechunk(&body) {
            Some(joined) => body = joined,
            None => tracing::debug!("payload is not validly chunked, keeping it as stored"),
        }
    }
    if let Some(encoding) = headers.get("Content-Encoding") {
        body = decode_content(body, &encoding.to_ascii_lowercase(), limit)?;
    }
    if body.len() > limit {
        return Err(RecordError::TooLarge(limit));
    }

    Ok(Some(HttpMessage { status, headers, body }))
}

fn dechunk(body: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(body.len());
    let mut pos = 0;

    loop {
        let line_len = body.get(pos..)?.iter().position(|b| *b == b'\n')?;
        let line = std::str::from_utf8(&body[pos..pos + line_len]).ok()?;
        let size_text = line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_text, 16).ok()?;
        pos += line_len + 1;

        if size == 0 {
            return Some(out);
        }
        out.extend_from_slice(body.get(pos..pos + size)?);
        pos += size;
        if body.get(pos..pos + 2) == Some(b"\r\n".as_slice()) {
            pos += 2;
        } else if body.get(pos) == Some(&b'\n') {
            pos += 1;
        }
    }
}

fn decode_content(body: Vec<u8>, encoding: &str, limit: usize) -> Result<Vec<u8>, RecordError> {
    let decoded = match encoding.trim() {
        "gzip" | "x-gzip" => read_limited(MultiGzDecoder::new(body.as_slice()), limit)?,
        "deflate" => match read_limited(ZlibDecoder::new(body.as_slice()), limit)? {
            Some(bytes) => Some(bytes),
            None => read_limited(DeflateDecoder::new(body.as_slice()), limit)?,
        },
        _ => return Ok(body),
    };

    Ok(decoded.unwrap_or_else(|| {
        tracing::warn!(encoding, "payload does not decode as declared, keeping it as stored");
        body
    }))
}

/// Read everything, None on a decode error.
fn read_limited(reader: impl Read, limit: usize) -> Result<Option<Vec<u8>>, RecordError> {
    let mut out = Vec::new();
    match reader.take(limit as u64 + 1).read_to_end(&mut out) {
        Ok(_) if out.len() > limit => Err(RecordError::TooLarge(limit)),
        Ok(_) => Ok(Some(out)),
        Err(_) => Ok(None),
    }
}

/// File name for an exported record: `{timestamp}_{url slug}.{warc|arc}`.
pub fn export_filename(timestamp: &Timestamp, url: &str, framing: Framing) -> String {
    let slug = SLUG_PATTERN.replace_all(url, "-");
    format!("{timestamp}_{slug}.{}", framing.extension())
}
