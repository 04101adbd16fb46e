//! Archived URL keys.
//!
//! The index is keyed on the URL as crawled. A caller's URL is brought to
//! that form before any lookup: a bare host gets `http://`, the host is
//! lowercased and the fragment (never sent to a server, so never crawled)
//! is dropped. Scheme, path and query are otherwise kept byte for byte.

use memento_core::Error;

#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("only http and https captures are archived, not {0}:")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl From<UrlError> for Error {
    fn from(err: UrlError) -> Self {
        Error::InvalidUrl(err.to_string())
    }
}

/// The index key form of `input`.
pub fn canonicalize(input: &str) -> Result<url::Url, UrlError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(UrlError::Empty);
    }

    let with_scheme = if input.contains("://") { input.to_string() } else { format!("http://{input}") };
    let mut url = url::Url::parse(&with_scheme).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(UrlError::UnsupportedScheme(url.scheme().to_string()));
    }

    // url lowercases ASCII hosts already; IDNs come back punycoded.
    url.set_fragment(None);
    Ok(url)
}

/// Rewrite a leading `https:` to `http:`. PWIDs always carry the plain form.
pub fn downgrade_https(url: &str) -> String {
    match url.strip_prefix("https:") {
        Some(rest) => format!("http:{rest}"),
        None => url.to_string(),
    }
}
