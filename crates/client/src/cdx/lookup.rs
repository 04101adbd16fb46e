//! Raw index lookups.
//!
//! A lookup passes match type, sort order and limit straight through to the
//! CDX server and reads back its space-separated CDX11 lines:
//!
//! `urlkey timestamp original mimetype statuscode digest redirect robotflags length offset filename`

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use memento_core::Error;

/// Which URLs a lookup matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    #[default]
    Exact,
    /// Every URL starting with the given one.
    Prefix,
    /// Every URL on the same host.
    Host,
    /// The host and all of its subdomains.
    Domain,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Exact => "exact",
            MatchType::Prefix => "prefix",
            MatchType::Host => "host",
            MatchType::Domain => "domain",
        }
    }
}

impl FromStr for MatchType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(MatchType::Exact),
            "prefix" => Ok(MatchType::Prefix),
            "host" => Ok(MatchType::Host),
            "domain" => Ok(MatchType::Domain),
            other => Err(Error::InvalidInput(format!(
                "unknown match type {other:?}: expected exact, prefix, host or domain"
            ))),
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result order of a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LookupSort {
    /// Ascending by URL key, then timestamp.
    #[default]
    Default,
    Reverse,
    Closest,
}

impl LookupSort {
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupSort::Default => "default",
            LookupSort::Reverse => "reverse",
            LookupSort::Closest => "closest",
        }
    }
}

impl FromStr for LookupSort {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(LookupSort::Default),
            "reverse" => Ok(LookupSort::Reverse),
            "closest" => Ok(LookupSort::Closest),
            other => Err(Error::InvalidInput(format!(
                "unknown sort {other:?}: expected default, reverse or closest"
            ))),
        }
    }
}

impl fmt::Display for LookupSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lookup request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupQuery {
    pub url: String,
    pub match_type: MatchType,
    pub sort: LookupSort,
    pub limit: Option<usize>,
}

impl LookupQuery {
    pub fn exact(url: impl Into<String>) -> Self {
        Self { url: url.into(), match_type: MatchType::default(), sort: LookupSort::default(), limit: None }
    }

    /// Query-string pairs for the CDX server.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("url", self.url.clone()),
            ("matchType", self.match_type.to_string()),
            ("sort", self.sort.to_string()),
        ];
        if let Some(limit) = self.limit {
            params.push(("limit", limit.to_string()));
        }
        params
    }
}

/// One CDX11 line. `-` fields are absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CdxLine {
    pub urlkey: String,
    /// 14-digit capture timestamp.
    pub timestamp: String,
    pub original: String,
    pub mimetype: Option<String>,
    pub status: Option<u16>,
    pub digest: Option<String>,
    pub redirect: Option<String>,
    pub length: Option<u64>,
    pub offset: Option<u64>,
    pub filename: Option<String>,
}

impl CdxLine {
    /// None unless the line has at least eleven fields.
    pub fn parse(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [urlkey, timestamp, original, mimetype, status, digest, redirect, _robots, length, offset, filename, ..] =
            fields.as_slice()
        else {
            return None;
        };

        Some(Self {
            urlkey: urlkey.to_string(),
            timestamp: timestamp.to_string(),
            original: original.to_string(),
            mimetype: present(mimetype).map(str::to_string),
            status: present(status).and_then(|s| s.parse().ok()),
            digest: present(digest).map(str::to_string),
            redirect: present(redirect).map(str::to_string),
            length: present(length).and_then(|s| s.parse().ok()),
            offset: present(offset).and_then(|s| s.parse().ok()),
            filename: present(filename).map(str::to_string),
        })
    }
}

fn present<'a>(field: &&'a str) -> Option<&'a str> {
    Some(*field).filter(|f| *f != "-")
}

/// Every readable line of a CDX11 body; short lines are skipped.
pub fn parse_cdx_lines(body: &str) -> Vec<CdxLine> {
    body.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter_map(|line| {
            let parsed = CdxLine::parse(line);
            if parsed.is_none() {
                tracing::warn!(%line, "skipping short CDX line");
            }
            parsed
        })
        .collect()
}
