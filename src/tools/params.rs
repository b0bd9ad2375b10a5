use schemars::JsonSchema;
use serde::Deserialize;

pub use crate::query::{Language, StructuredQuerySpec};
use crate::media::StreamFormat;

#[derive(Deserialize, JsonSchema)]
pub struct ProcessQueryParams {
    /// Natural-language question in Hebrew or English
    pub query: String,
    /// Query language: "he", "en", or "auto" (default)
    pub language: Option<Language>,
}

#[derive(Deserialize, JsonSchema)]
pub struct GenerateResponseParams {
    /// Natural-language question; interpreted and searched with fallback candidates
    pub query: Option<String>,
    /// Structured search spec (e.g. one returned by process_natural_query). Use instead of `query`.
    pub spec: Option<StructuredQuerySpec>,
    /// Response language: "he", "en", or "auto" (default)
    pub language: Option<Language>,
    /// Return only the number of matches (and facet counts, if the spec asks for them)
    #[serde(default)]
    pub count_only: Option<bool>,
}

#[derive(Deserialize, JsonSchema)]
pub struct StreamBatchesParams {
    /// Structured search spec to page through
    pub spec: StructuredQuerySpec,
    /// Continuation token from a previous call (omit to start from the first page)
    pub continuation_token: Option<String>,
    /// Results per batch (1-100, default from NLI_PAGE_SIZE)
    pub page_size: Option<u32>,
    /// Batches to return in this call (1-5, default: 1)
    pub max_batches: Option<u8>,
    /// Response language: "he", "en", or "auto" (default)
    pub language: Option<Language>,
}

#[derive(Deserialize, JsonSchema)]
pub struct GetImageParams {
    /// IIIF image identifier (e.g. "FL45213010")
    pub identifier: String,
    /// IIIF region (default: "full")
    pub region: Option<String>,
    /// IIIF size, e.g. "max", "600,", "!400,400" (default: "max")
    pub size: Option<String>,
    /// Rotation in degrees, 0-360; prefix with "!" to mirror (default: "0")
    pub rotation: Option<String>,
    /// "default", "color", "gray", or "bitonal" (default: "default")
    pub quality: Option<String>,
    /// "jpg", "png", "gif", "webp", or "tif" (default: "jpg")
    pub format: Option<String>,
}

#[derive(Deserialize, JsonSchema)]
pub struct GetManifestParams {
    /// Record identifier
    #[serde(alias = "recordId")]
    pub record_id: String,
}

#[derive(Deserialize, JsonSchema, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StreamChoice {
    Mp4,
    Hls,
    Audio,
    #[default]
    All,
}

impl StreamChoice {
    pub fn format(self) -> Option<StreamFormat> {
        match self {
            StreamChoice::Mp4 => Some(StreamFormat::Mp4),
            StreamChoice::Hls => Some(StreamFormat::Hls),
            StreamChoice::Audio => Some(StreamFormat::Audio),
            StreamChoice::All => None,
        }
    }
}

#[derive(Deserialize, JsonSchema)]
pub struct GetStreamParams {
    /// Record identifier
    #[serde(alias = "itemId", alias = "recordId")]
    pub record_id: String,
    /// "mp4", "hls", "audio", or "all" (default)
    pub format: Option<StreamChoice>,
}
