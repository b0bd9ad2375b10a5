//! The six boundary operations, independent of any transport.

use futures::stream::Stream;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::archive::{ArchiveApi, ImageData, SearchExecutor, SearchResult};
use crate::config::{MAX_PAGE_SIZE, Settings};
use crate::error::{NliError, Result};
use crate::media::{DnsResolver, MediaKind, MediaResolver, StreamFormat, manifest};
use crate::query::{self, Language, Query, ResponseLanguage, StructuredQuerySpec};
use crate::response::{self, ResponsePayload};

const IMAGE_QUALITIES: [&str; 4] = ["default", "color", "gray", "bitonal"];
const IMAGE_FORMATS: [&str; 5] = ["jpg", "png", "gif", "webp", "tif"];

pub enum ResponseRequest {
    Spec(StructuredQuerySpec),
    Text(String),
}

#[derive(Serialize, Debug, Clone)]
pub struct GeneratedResponse {
    pub payload: ResponsePayload,
    /// The spec that produced the page; continue it with `stream_batches`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec: Option<StructuredQuerySpec>,
    /// Set when the request was raw text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<Query>,
}

/// Result of a count-only search.
#[derive(Serialize, Debug, Clone)]
pub struct ResultCount {
    pub language: ResponseLanguage,
    pub total_results: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facets: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec: Option<StructuredQuerySpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<Query>,
}

/// IIIF Image API request. Defaults to the full image at maximum size.
#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub identifier: String,
    pub region: String,
    pub size: String,
    pub rotation: String,
    pub quality: String,
    pub format: String,
}

impl ImageRequest {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            region: "full".into(),
            size: "max".into(),
            rotation: "0".into(),
            quality: "default".into(),
            format: "jpg".into(),
        }
    }

    /// `{base}/{identifier}/{region}/{size}/{rotation}/{quality}.{format}`
    pub fn url(&self, base: &str) -> Result<String> {
        let identifier = self.identifier.trim();
        if identifier.is_empty() {
            return Err(NliError::QueryRejected("image identifier is empty".into()));
        }
        let segment_ok = |s: &str| {
            !s.is_empty()
                && s.chars().all(|c| {
                    c.is_ascii_alphanumeric() || matches!(c, ',' | '.' | ':' | '!' | '^' | '-')
                })
        };
        for (name, value) in [
            ("region", &self.region),
            ("size", &self.size),
            ("rotation", &self.rotation),
        ] {
            if !segment_ok(value) {
                return Err(NliError::QueryRejected(format!("invalid {name} '{value}'")));
            }
        }
        let rotation_ok = self
            .rotation
            .trim_start_matches('!')
            .parse::<f64>()
            .is_ok_and(|r| (0.0..=360.0).contains(&r));
        if !rotation_ok {
            return Err(NliError::QueryRejected(format!(
                "rotation must be between 0 and 360, got '{}'",
                self.rotation
            )));
        }
        if !IMAGE_QUALITIES.contains(&self.quality.as_str()) {
            return Err(NliError::QueryRejected(format!(
                "quality must be one of {}",
                IMAGE_QUALITIES.join(", ")
            )));
        }
        if !IMAGE_FORMATS.contains(&self.format.as_str()) {
            return Err(NliError::QueryRejected(format!(
                "format must be one of {}",
                IMAGE_FORMATS.join(", ")
            )));
        }
        Ok(format!(
            "{base}/{}/{}/{}/{}/{}.{}",
            utf8_percent_encode(identifier, NON_ALPHANUMERIC),
            self.region,
            self.size,
            self.rotation,
            self.quality,
            self.format
        ))
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct ManifestData {
    pub record_id: String,
    pub manifest_url: String,
    /// First page image, skipping logos.
    pub preview_image: Option<String>,
    pub canvas_count: usize,
    pub manifest: Value,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct StreamLink {
    pub format: StreamFormat,
    pub url: String,
    pub mime_type: &'static str,
}

#[derive(Serialize, Debug, Clone)]
pub struct StreamDescriptor {
    pub record_id: String,
    pub streams: Vec<StreamLink>,
}

/// Interpreter, executor, resolver and assembler wired to one archive.
pub struct Pipeline<A> {
    api: A,
    settings: Settings,
}

impl<A: ArchiveApi + DnsResolver> Pipeline<A> {
    pub fn new(api: A, settings: Settings) -> Self {
        Self { api, settings }
    }

    pub fn process_natural_query(&self, text: &str, hint: Language) -> Result<Query> {
        query::interpret(text, hint)
    }

    /// Runs the full pipeline for a single page.
    ///
    /// Only interpretation failures are errors; a failed search yields a
    /// payload carrying the error marker.
    pub async fn generate_response(
        &self,
        request: ResponseRequest,
        hint: Language,
    ) -> Result<GeneratedResponse> {
        let executor = SearchExecutor::new(&self.api, &self.settings);
        let (query, candidates, language) = self.candidates(request, hint)?;

        let page = match executor.execute(&candidates, None).await {
            Ok(page) => page,
            Err(e) => {
                warn!(error = %e, "response page failed");
                return Ok(GeneratedResponse {
                    payload: ResponsePayload::failed(language, &e),
                    spec: None,
                    query,
                });
            }
        };

        let spec = candidates.get(page.spec_index).cloned();
        info!(
            results = page.results.len(),
            candidate = page.spec_index,
            language = language.code(),
            "response generated"
        );
        let items = MediaResolver::new(&self.api, &self.settings.media)
            .resolve_page(page.results)
            .await;
        Ok(GeneratedResponse {
            payload: response::assemble(language, items, page.next_page_token, page.total_results)
                .with_offset(page.offset)
                .with_facets(page.facets),
            spec,
            query,
        })
    }

    /// Number of matches (and facet counts, when requested) without fetching media.
    pub async fn count_results(
        &self,
        request: ResponseRequest,
        hint: Language,
    ) -> Result<ResultCount> {
        let (query, candidates, language) = self.candidates(request, hint)?;
        let page = SearchExecutor::new(&self.api, &self.settings)
            .count(&candidates)
            .await?;
        info!(
            total = ?page.total_results,
            candidate = page.spec_index,
            "results counted"
        );
        Ok(ResultCount {
            language,
            total_results: page.total_results.unwrap_or(0),
            facets: page.facets,
            spec: candidates.get(page.spec_index).cloned(),
            query,
        })
    }

    fn candidates(
        &self,
        request: ResponseRequest,
        hint: Language,
    ) -> Result<(Option<Query>, Vec<StructuredQuerySpec>, ResponseLanguage)> {
        Ok(match request {
            ResponseRequest::Text(text) => {
                let query = self.process_natural_query(&text, hint)?;
                let candidates = query.candidate_specs.clone();
                let language = query.language;
                (Some(query), candidates, language)
            }
            ResponseRequest::Spec(spec) => {
                let language = spec_language(&spec, hint);
                (None, vec![spec], language)
            }
        })
    }

    /// Lazy page sequence for one spec, resumable from a continuation token.
    pub fn stream_batches(
        &self,
        spec: StructuredQuerySpec,
        page_token: Option<String>,
        page_size: Option<u32>,
        hint: Language,
    ) -> impl Stream<Item = ResponsePayload> + '_ {
        let rows = page_size
            .unwrap_or(self.settings.page_size)
            .clamp(1, MAX_PAGE_SIZE);
        let language = spec_language(&spec, hint);
        response::stream_batches(&self.api, &self.settings, spec, page_token, rows, language)
    }

    pub fn image_url(&self, request: &ImageRequest) -> Result<String> {
        request.url(&self.settings.iiif_url)
    }

    pub async fn get_image(&self, request: &ImageRequest) -> Result<ImageData> {
        let url = self.image_url(request)?;
        self.api.fetch_image(&url).await
    }

    pub async fn get_manifest(&self, record_id: &str) -> Result<ManifestData> {
        let record_id = non_empty_id(record_id)?;
        let manifest = self.api.fetch_manifest(record_id).await?;
        Ok(ManifestData {
            record_id: record_id.to_string(),
            manifest_url: self.api.manifest_url(record_id),
            preview_image: manifest::first_image_url(&manifest),
            canvas_count: manifest::canvas_count(&manifest),
            manifest,
        })
    }

    /// Stream URLs of a record; `None` selects every format.
    pub async fn get_stream(
        &self,
        record_id: &str,
        format: Option<StreamFormat>,
    ) -> Result<StreamDescriptor> {
        let record_id = non_empty_id(record_id)?;
        let raw = self
            .api
            .lookup_record(record_id)
            .await?
            .ok_or_else(|| NliError::NotFound(format!("record {record_id}")))?;
        let result = SearchResult::from_raw(raw, |id| self.api.manifest_url(id))
            .ok_or_else(|| NliError::Decode(format!("record {record_id} has no identifier")))?;

        let streams = result
            .media_refs
            .iter()
            .filter(|r| r.kind == MediaKind::Stream)
            .filter_map(|r| {
                let f = r.format?;
                format.is_none_or(|wanted| wanted == f).then(|| StreamLink {
                    format: f,
                    url: r.locator.clone(),
                    mime_type: f.mime_type(),
                })
            })
            .collect();
        Ok(StreamDescriptor {
            record_id: record_id.to_string(),
            streams,
        })
    }
}

fn non_empty_id(record_id: &str) -> Result<&str> {
    let trimmed = record_id.trim();
    if trimmed.is_empty() {
        Err(NliError::QueryRejected("record identifier is empty".into()))
    } else {
        Ok(trimmed)
    }
}

/// Structured requests carry no raw text, so detection runs over the spec's values.
fn spec_language(spec: &StructuredQuerySpec, hint: Language) -> ResponseLanguage {
    let text: Vec<&str> = spec
        .fielded_terms
        .values()
        .map(String::as_str)
        .chain(spec.free_text_fallback.as_deref())
        .collect();
    hint.resolve(&text.join(" "))
}
