//! Media resolution: thumbnail, then IIIF manifest, then stream.

mod guard;
pub mod manifest;
mod resolver;

pub use guard::{DnsResolver, TokioDnsResolver, check_media_url};
pub use resolver::{MediaResolver, ResolvedItem};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize, Serializer};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Thumbnail,
    IiifManifest,
    Stream,
}

#[derive(Serialize, Deserialize, JsonSchema, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StreamFormat {
    Mp4,
    Hls,
    Audio,
}

impl StreamFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            StreamFormat::Mp4 => "video/mp4",
            StreamFormat::Hls => "application/vnd.apple.mpegurl",
            StreamFormat::Audio => "audio/mpeg",
        }
    }
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct MediaRef {
    pub kind: MediaKind,
    pub locator: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<StreamFormat>,
}

impl MediaRef {
    pub fn thumbnail(url: impl Into<String>) -> Self {
        Self {
            kind: MediaKind::Thumbnail,
            locator: url.into(),
            format: None,
        }
    }

    pub fn manifest(url: impl Into<String>) -> Self {
        Self {
            kind: MediaKind::IiifManifest,
            locator: url.into(),
            format: None,
        }
    }

    pub fn stream(url: impl Into<String>, format: StreamFormat) -> Self {
        Self {
            kind: MediaKind::Stream,
            locator: url.into(),
            format: Some(format),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MediaPayload {
    Url(String),
    Inline(Vec<u8>),
}

impl Serialize for MediaPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            MediaPayload::Url(url) => map.serialize_entry("url", url)?,
            MediaPayload::Inline(bytes) => map.serialize_entry("data", &STANDARD.encode(bytes))?,
        }
        map.end()
    }
}

/// Presentable media for one result. Lives only as long as the response it serves.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ResolvedMedia {
    pub kind: MediaKind,
    pub payload: MediaPayload,
    pub mime_type: String,
}

/// Non-fatal: the item is still returned, without media.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct MediaUnavailable {
    pub record_id: String,
    pub kind: MediaKind,
    pub reason: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("blocked: media host is internal or private")]
    InternalHost,

    #[error("invalid media URL: {0}")]
    InvalidUrl(String),

    #[error("DNS resolution failed: {0}")]
    DnsResolution(String),

    #[error("{0}")]
    Fetch(#[from] crate::error::NliError),
}
