//! Client code for memento.
//!
//! This crate provides the capture index client, closest-capture matching,
//! record fetching from remote storage, rendering and the retrieval service
//! shared by the server and CLI.

pub mod access;
pub mod canonical;
pub mod cdx;
pub mod matcher;
pub mod render;
pub mod service;
pub mod warc;

pub use access::{AccessOracle, OpenAccess, WaybackAccessClient};
pub use canonical::{UrlError, canonicalize, downgrade_https};
pub use cdx::{CaptureIndex, CdxClient, CdxConfig, CdxLine, LookupQuery, LookupSort, MatchType};
pub use matcher::{Match, closest, closest_capture};
pub use render::{NormalizedImage, RenderClient, Renderer, normalize};
pub use service::{
    ArchiveService, ImageForm, RecordExport, RenderOptions, Retrieval, RetrievalRequest, ServiceConfig, Source,
};
pub use warc::{FetchMode, Framing, Payload, RangeReader, RecordFetcher, StorageClient, StorageConfig};
