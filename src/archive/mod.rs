//! Search executor and the HTTP client for the archive's search, IIIF and image services.

pub mod client;
pub mod executor;
mod record;
pub(crate) mod token;

pub use client::ArchiveClient;
pub use executor::SearchExecutor;
pub use record::SearchResult;

use serde_json::{Map, Value};

use crate::error::Result;
use crate::query::StructuredQuerySpec;

pub type RawRecord = Map<String, Value>;

/// One search call: the spec plus the page size to request.
#[derive(Debug, Clone, Copy)]
pub struct SearchRequest<'a> {
    pub spec: &'a StructuredQuerySpec,
    pub rows: u32,
}

/// Undecoded page as returned by the archive.
#[derive(Debug, Default)]
pub struct RawPage {
    pub records: Vec<RawRecord>,
    /// Offset of the first record in the full result set.
    pub start: u64,
    pub total_results: Option<u64>,
    /// Opaque cursor for the next page; `None` when this is the last page.
    pub next_token: Option<String>,
    /// Facet counts, passed through as the archive returns them.
    pub facets: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct ImageData {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// The external archive. Implemented by `ArchiveClient`; tests use in-memory mocks.
pub trait ArchiveApi {
    async fn search(&self, request: SearchRequest<'_>, page_token: Option<&str>) -> Result<RawPage>;

    /// Looks up a single record by its identifier.
    async fn lookup_record(&self, record_id: &str) -> Result<Option<RawRecord>>;

    async fn fetch_manifest(&self, record_id: &str) -> Result<Value>;

    async fn fetch_image(&self, url: &str) -> Result<ImageData>;

    /// URL of a record's IIIF manifest (no network access).
    fn manifest_url(&self, record_id: &str) -> String;
}
