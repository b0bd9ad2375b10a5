//! Language-consistent payloads built from resolved search pages.

mod stream;

pub use stream::stream_batches;

use serde::Serialize;
use serde_json::Value;

use crate::archive::SearchResult;
use crate::error::NliError;
use crate::media::{MediaUnavailable, ResolvedItem, ResolvedMedia};
use crate::query::ResponseLanguage;

const ITEM_PAGE_BASE: &str = "https://www.nli.org.il";

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ResponseItem {
    pub record_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    pub item_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<ResolvedMedia>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<MediaUnavailable>,
}

/// Marks a page that could not be produced.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ErrorMarker {
    pub code: &'static str,
    pub message: String,
    pub retriable: bool,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ResponsePayload {
    pub language: ResponseLanguage,
    pub items: Vec<ResponseItem>,
    /// Present iff more results remain.
    pub continuation_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_results: Option<u64>,
    /// Position of the first item in the full result set.
    pub offset: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facets: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorMarker>,
}

impl ResponsePayload {
    pub fn failed(language: ResponseLanguage, error: &NliError) -> Self {
        Self {
            language,
            items: Vec::new(),
            continuation_token: None,
            total_results: None,
            offset: 0,
            facets: None,
            error: Some(ErrorMarker {
                code: error.code(),
                message: error.user_message(language),
                retriable: error.is_retriable(),
            }),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_facets(mut self, facets: Option<Value>) -> Self {
        self.facets = facets;
        self
    }
}

/// Builds the payload for one page. Item order follows `items`.
pub fn assemble(
    language: ResponseLanguage,
    items: Vec<ResolvedItem>,
    continuation_token: Option<String>,
    total_results: Option<u64>,
) -> ResponsePayload {
    ResponsePayload {
        language,
        items: items
            .into_iter()
            .map(|item| response_item(language, item))
            .collect(),
        continuation_token,
        total_results,
        offset: 0,
        facets: None,
        error: None,
    }
}

fn response_item(language: ResponseLanguage, item: ResolvedItem) -> ResponseItem {
    let ResolvedItem {
        result,
        media,
        warning,
    } = item;
    ResponseItem {
        title: result
            .title
            .pick(language)
            .map_or_else(|| result.record_id.clone(), str::to_string),
        creator: localized(&result, "creator", language),
        date: localized(&result, "date", language),
        item_url: item_url(language, &result.page_id()),
        record_id: result.record_id,
        media,
        warning,
    }
}

fn localized(result: &SearchResult, field: &str, language: ResponseLanguage) -> Option<String> {
    result
        .metadata(field)
        .pick(language)
        .map(str::to_string)
}

pub fn item_url(language: ResponseLanguage, page_id: &str) -> String {
    format!("{ITEM_PAGE_BASE}/{}/articles/{page_id}", language.code())
}
