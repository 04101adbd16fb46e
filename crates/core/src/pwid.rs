//! Persistent Web IDentifiers.
//!
//! A PWID names one archived page as
//! `urn:pwid:{archive}:{YYYY-MM-DDThh:mm:ssZ}:{scope}:{url}` and travels either
//! raw, percent-encoded, or base64-encoded inside URLs.

use std::str::FromStr;
use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::Error;
use crate::timestamp::Timestamp;

pub const DEFAULT_ARCHIVE_ID: &str = "webarchive.org.uk";
pub const DEFAULT_SCOPE: &str = "page";

const URN_PREFIX: &str = "urn:pwid:";

static URN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^urn:pwid:([^:]+):(\d{4})-(\d{2})-(\d{2})T(\d{2}):(\d{2}):(\d{2})(?:\.\d+)?Z:([^:]+):(.+)$")
        .expect("invalid PWID pattern")
});

/// How the timestamp is expanded inside the URN.
///
/// `Legacy` reproduces identifiers issued by older deployments, which wrote
/// the hour in place of the minutes (`hh:hh:ss`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PwidLayout {
    #[default]
    Iso,
    Legacy,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PwidError {
    #[error("invalid timestamp {0:?}: expected 14 digits")]
    InvalidTimestamp(String),

    #[error("empty URL")]
    EmptyUrl,

    #[error("{0:?} is neither a URN nor a percent- or base64-encoded URN")]
    Undecodable(String),

    #[error("malformed PWID {0:?}: expected urn:pwid:archive:YYYY-MM-DDThh:mm:ssZ:scope:url")]
    Malformed(String),
}

impl From<PwidError> for Error {
    fn from(err: PwidError) -> Self {
        match &err {
            PwidError::InvalidTimestamp(_) => Error::InvalidTimestamp(err.to_string()),
            _ => Error::MalformedIdentifier(err.to_string()),
        }
    }
}

/// A parsed identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Pwid {
    pub archive_id: String,
    #[schemars(with = "String")]
    pub timestamp: Timestamp,
    pub scope: String,
    pub url: String,
}

impl Pwid {
    /// Identifier in the default archive and `page` scope.
    pub fn new(timestamp: &str, url: &str) -> Result<Self, PwidError> {
        let timestamp =
            Timestamp::parse(timestamp).map_err(|_| PwidError::InvalidTimestamp(timestamp.to_string()))?;
        if url.is_empty() {
            return Err(PwidError::EmptyUrl);
        }

        Ok(Self {
            archive_id: DEFAULT_ARCHIVE_ID.to_string(),
            timestamp,
            scope: DEFAULT_SCOPE.to_string(),
            url: url.to_string(),
        })
    }

    pub fn with_archive_id(mut self, archive_id: impl Into<String>) -> Self {
        self.archive_id = archive_id.into();
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// The URN string.
    pub fn to_urn(&self, layout: PwidLayout) -> String {
        let pattern = match layout {
            PwidLayout::Iso => "%Y-%m-%dT%H:%M:%SZ",
            PwidLayout::Legacy => "%Y-%m-%dT%H:%H:%SZ",
        };

        format!(
            "{URN_PREFIX}{}:{}:{}:{}",
            self.archive_id,
            self.timestamp.naive().format(pattern),
            self.scope,
            self.url
        )
    }

    /// Padded URL-safe base64 of the URN.
    pub fn encode(&self, layout: PwidLayout) -> String {
        URL_SAFE.encode(self.to_urn(layout))
    }

    /// Parse any accepted transport form.
    pub fn parse(token: &str) -> Result<Self, PwidError> {
        let urn = decode_token(token.trim())?;
        parse_urn(&urn)
    }
}

impl FromStr for Pwid {
    type Err = PwidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Base64 token for `timestamp` and `url` in the default archive and scope.
pub fn generate(timestamp: &str, url: &str) -> Result<String, Error> {
    Ok(Pwid::new(timestamp, url)?.encode(PwidLayout::Iso))
}

pub fn parse(token: &str) -> Result<Pwid, Error> {
    Ok(Pwid::parse(token)?)
}

fn decode_token(token: &str) -> Result<String, PwidError> {
    if token.starts_with(URN_PREFIX) {
        return Ok(token.to_string());
    }

    if token.to_ascii_lowercase().starts_with("urn%3a") {
        return urlencoding::decode(token)
            .map(|decoded| decoded.into_owned())
            .map_err(|_| PwidError::Undecodable(token.to_string()));
    }

    [URL_SAFE, URL_SAFE_NO_PAD, STANDARD, STANDARD_NO_PAD]
        .iter()
        .filter_map(|engine| engine.decode(token).ok())
        .filter_map(|bytes| String::from_utf8(bytes).ok())
        .find(|decoded| decoded.starts_with(URN_PREFIX))
        .ok_or_else(|| PwidError::Undecodable(token.to_string()))
}

fn parse_urn(urn: &str) -> Result<Pwid, PwidError> {
    let caps = URN_PATTERN.captures(urn).ok_or_else(|| PwidError::Malformed(urn.to_string()))?;
    let field = |i: usize| caps.get(i).map_or("", |m| m.as_str());

    // Legacy identifiers carry the hour twice; the seconds and date survive.
    let digits = format!("{}{}{}{}{}{}", field(2), field(3), field(4), field(5), field(6), field(7));
    let timestamp = Timestamp::parse(&digits).map_err(|_| PwidError::InvalidTimestamp(digits))?;

    Ok(Pwid {
        archive_id: field(1).to_string(),
        timestamp,
        scope: field(8).to_string(),
        url: field(9).to_string(),
    })
}
