//! Decoding of archive records (JSON-LD flavoured maps) into search results.

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use super::RawRecord;
use crate::media::{MediaKind, MediaRef, StreamFormat};
use crate::query::ResponseLanguage;

const STREAM_FIELDS: [(&str, StreamFormat); 3] = [
    ("stream_url_mp4", StreamFormat::Mp4),
    ("stream_url_hls", StreamFormat::Hls),
    ("audio_url", StreamFormat::Audio),
];

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct TextVariant {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    pub text: String,
}

/// A metadata value with its language variants, in archive order.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct LocalizedText {
    pub variants: Vec<TextVariant>,
}

impl LocalizedText {
    pub fn from_value(value: &Value) -> Self {
        let mut variants = Vec::new();
        collect_variants(value, &mut variants);
        Self { variants }
    }

    pub fn first(&self) -> Option<&str> {
        self.variants.first().map(|v| v.text.as_str())
    }

    /// The variant tagged with `lang`, else the record's native (first) variant.
    pub fn pick(&self, lang: ResponseLanguage) -> Option<&str> {
        self.variants
            .iter()
            .find(|v| v.lang.as_deref().is_some_and(|tag| lang.matches_tag(tag)))
            .map(|v| v.text.as_str())
            .or_else(|| self.first())
    }
}

fn collect_variants(value: &Value, out: &mut Vec<TextVariant>) {
    match value {
        Value::String(s) => {
            if let Some(embedded) = parse_embedded(s) {
                collect_variants(&embedded, out);
            } else if !s.trim().is_empty() {
                out.push(TextVariant {
                    lang: None,
                    text: s.trim().to_string(),
                });
            }
        }
        Value::Number(n) => out.push(TextVariant {
            lang: None,
            text: n.to_string(),
        }),
        Value::Array(items) => items.iter().for_each(|item| collect_variants(item, out)),
        Value::Object(map) => {
            let text = match map.get("@value") {
                Some(Value::String(s)) => s.trim().to_string(),
                Some(Value::Number(n)) => n.to_string(),
                _ => return,
            };
            if !text.is_empty() {
                let lang = map
                    .get("@language")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                out.push(TextVariant { lang, text });
            }
        }
        Value::Null | Value::Bool(_) => {}
    }
}

/// Some records carry `{'@value': ...}` serialized into a string with single quotes.
fn parse_embedded(s: &str) -> Option<Value> {
    let trimmed = s.trim();
    if !trimmed.starts_with('{') || !trimmed.contains("@value") {
        return None;
    }
    serde_json::from_str::<Value>(trimmed)
        .or_else(|_| serde_json::from_str::<Value>(&trimmed.replace('\'', "\"")))
        .ok()
        .filter(Value::is_object)
}

/// Value of `name`, matching either the bare key or the last segment of a
/// namespaced key such as `http://purl.org/dc/elements/1.1/title`.
pub(crate) fn field<'a>(record: &'a RawRecord, name: &str) -> Option<&'a Value> {
    record.get(name).or_else(|| {
        record
            .iter()
            .find(|(key, _)| {
                key.rsplit(['/', '#'])
                    .next()
                    .is_some_and(|last| last.eq_ignore_ascii_case(name))
            })
            .map(|(_, v)| v)
    })
}

pub(crate) fn field_text(record: &RawRecord, name: &str) -> Option<String> {
    field(record, name)
        .map(LocalizedText::from_value)
        .and_then(|t| t.first().map(str::to_string))
}

fn is_web_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// One hit from the search endpoint.
#[derive(Serialize, Clone, Debug)]
pub struct SearchResult {
    pub record_id: String,
    pub title: LocalizedText,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip)]
    pub raw_metadata: RawRecord,
    pub media_refs: Vec<MediaRef>,
}

impl SearchResult {
    /// Returns `None` for records without an identifier; nothing can be resolved for them.
    pub fn from_raw(raw: RawRecord, manifest_url: impl Fn(&str) -> String) -> Option<Self> {
        let Some(record_id) = field_text(&raw, "recordid").or_else(|| field_text(&raw, "id"))
        else {
            warn!("skipping archive record without an identifier");
            return None;
        };

        let title = field(&raw, "title")
            .map(LocalizedText::from_value)
            .unwrap_or_default();
        let language = field_text(&raw, "language");
        let media_refs = media_refs(&raw, &record_id, manifest_url);

        Some(Self {
            record_id,
            title,
            language,
            raw_metadata: raw,
            media_refs,
        })
    }

    pub fn metadata(&self, name: &str) -> LocalizedText {
        field(&self.raw_metadata, name)
            .map(LocalizedText::from_value)
            .unwrap_or_default()
    }

    /// Identifier used in item page URLs on the library website.
    pub fn page_id(&self) -> String {
        field_text(&self.raw_metadata, "id")
            .map(|id| id.rsplit('/').next().unwrap_or_default().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| self.record_id.clone())
    }

    pub fn first_ref(&self, kind: MediaKind) -> Option<&MediaRef> {
        self.media_refs.iter().find(|r| r.kind == kind)
    }
}

fn media_refs(
    raw: &RawRecord,
    record_id: &str,
    manifest_url: impl Fn(&str) -> String,
) -> Vec<MediaRef> {
    let mut refs: Vec<MediaRef> = Vec::new();
    let mut push = |r: MediaRef| {
        if !refs.contains(&r) {
            refs.push(r);
        }
    };

    if let Some(thumbs) = field(raw, "thumbnail").map(LocalizedText::from_value) {
        for v in thumbs.variants.iter().filter(|v| is_web_url(&v.text)) {
            push(MediaRef::thumbnail(&v.text));
        }
    }

    let mut has_stream = false;
    for (name, format) in STREAM_FIELDS {
        if let Some(url) = field_text(raw, name).filter(|u| is_web_url(u)) {
            has_stream = true;
            push(MediaRef::stream(url, format));
        }
    }

    match field_text(raw, "manifest").filter(|u| is_web_url(u)) {
        Some(url) => push(MediaRef::manifest(url)),
        None if !has_stream => push(MediaRef::manifest(manifest_url(record_id))),
        None => {}
    }

    refs
}
