//! MCP tool implementations.
//!
//! This module contains all tools exposed by the memento server.

pub mod cache;
pub mod memento;
pub mod pwid;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CachePurgeParams, purge_impl};
pub use memento::{
    MementoFetchParams, MementoListParams, MementoLookupParams, MementoPwidFetchParams, MementoResolveParams,
    MementoWarcParams,
};
pub use pwid::{PwidGenerateParams, PwidParseParams};
