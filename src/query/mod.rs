//! Query interpretation: language detection, topic inference and ranked structured specs.

mod interpret;
mod lang;
mod lexicon;

pub use interpret::interpret;
pub use lang::{Language, ResponseLanguage};

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{NliError, Result};

/// Fields the search endpoint accepts inside its `query` clause list,
/// plus the item language which travels as its own parameter.
#[derive(
    Serialize, Deserialize, JsonSchema, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum Field {
    #[serde(rename = "title")]
    Title,
    #[serde(rename = "creator")]
    Creator,
    #[serde(rename = "subject")]
    Subject,
    #[serde(rename = "desc")]
    Desc,
    #[serde(rename = "any")]
    Any,
    /// Start of the date range, `YYYYMMDD`.
    #[serde(rename = "dr_s")]
    DateStart,
    /// End of the date range, `YYYYMMDD`.
    #[serde(rename = "dr_e")]
    DateEnd,
    /// Item language (archive language code, e.g. `heb`).
    #[serde(rename = "lang")]
    Language,
}

impl Field {
    pub fn name(self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Creator => "creator",
            Field::Subject => "subject",
            Field::Desc => "desc",
            Field::Any => "any",
            Field::DateStart => "dr_s",
            Field::DateEnd => "dr_e",
            Field::Language => "lang",
        }
    }

    /// Match precision used in the `field,operator,value` clause.
    pub fn operator(self) -> &'static str {
        match self {
            Field::DateStart | Field::DateEnd => "exact",
            _ => "contains",
        }
    }

    /// Whether the field is expressed as a `query` clause rather than a parameter.
    pub fn is_clause(self) -> bool {
        !matches!(self, Field::Language)
    }
}

/// Filter parameters of the search endpoint.
#[derive(
    Serialize, Deserialize, JsonSchema, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "camelCase")]
pub enum Filter {
    MaterialType,
    AvailabilityType,
    Collection,
    Publisher,
    Contributor,
    PublicationYearFrom,
    PublicationYearTo,
    Isbn,
    Issn,
    DateFrom,
    DateTo,
    SortField,
    SortOrder,
}

impl Filter {
    const ALL: [Filter; 13] = [
        Filter::MaterialType,
        Filter::AvailabilityType,
        Filter::Collection,
        Filter::Publisher,
        Filter::Contributor,
        Filter::PublicationYearFrom,
        Filter::PublicationYearTo,
        Filter::Isbn,
        Filter::Issn,
        Filter::DateFrom,
        Filter::DateTo,
        Filter::SortField,
        Filter::SortOrder,
    ];

    /// Name of the query-string parameter on the search endpoint.
    pub fn param_name(self) -> &'static str {
        match self {
            Filter::MaterialType => "material_type",
            Filter::AvailabilityType => "availability_type",
            Filter::Collection => "collection",
            Filter::Publisher => "publisher",
            Filter::Contributor => "contributor",
            Filter::PublicationYearFrom => "publication_year_from",
            Filter::PublicationYearTo => "publication_year_to",
            Filter::Isbn => "isbn",
            Filter::Issn => "issn",
            Filter::DateFrom => "start_date",
            Filter::DateTo => "end_date",
            Filter::SortField => "sortField",
            Filter::SortOrder => "sort_order",
        }
    }

    fn schema_name(self) -> &'static str {
        match self {
            Filter::MaterialType => "materialType",
            Filter::AvailabilityType => "availabilityType",
            Filter::Collection => "collection",
            Filter::Publisher => "publisher",
            Filter::Contributor => "contributor",
            Filter::PublicationYearFrom => "publicationYearFrom",
            Filter::PublicationYearTo => "publicationYearTo",
            Filter::Isbn => "isbn",
            Filter::Issn => "issn",
            Filter::DateFrom => "dateFrom",
            Filter::DateTo => "dateTo",
            Filter::SortField => "sortField",
            Filter::SortOrder => "sortOrder",
        }
    }

    /// Accepts either the endpoint parameter name or the camelCase tool name.
    pub fn from_param_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.param_name() == name || f.schema_name() == name)
    }
}

/// Why a candidate spec was generated. Candidates are ranked, not merged.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    #[default]
    Primary,
    AlternateMaterial,
    PersonAsSubject,
    FreeText,
}

/// Facet counts requested alongside a search.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, Default, PartialEq, Eq)]
pub struct FacetRequest {
    /// Fields to count values of, e.g. `["materialType", "language"]`
    pub fields: Vec<String>,
    /// Maximum values per facet field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
    /// `count` or `index`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,
}

/// A parameter set the archive's search endpoint accepts.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, Default, PartialEq, Eq)]
pub struct StructuredQuerySpec {
    /// Fielded terms, e.g. `{"creator": "חיים נחמן ביאליק", "lang": "heb"}`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fielded_terms: BTreeMap<Field, String>,
    /// Filters, e.g. `{"materialType": "manuscripts"}`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filters: BTreeMap<Filter, String>,
    /// Free text searched across all fields when nothing more specific is known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free_text_fallback: Option<String>,
    /// Explicit cap on the number of results the user asked for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// Facet counts to return with the page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facets: Option<FacetRequest>,
    /// Record fields to return; empty returns every field. The record identifier is always kept.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    #[serde(default)]
    pub variant: Variant,
}

impl StructuredQuerySpec {
    pub fn free_text(text: impl Into<String>) -> Self {
        Self {
            free_text_fallback: Some(text.into()),
            variant: Variant::FreeText,
            ..Default::default()
        }
    }

    pub fn with_term(mut self, field: Field, value: impl Into<String>) -> Self {
        self.fielded_terms.insert(field, value.into());
        self
    }

    pub fn with_filter(mut self, filter: Filter, value: impl Into<String>) -> Self {
        self.filters.insert(filter, value.into());
        self
    }

    /// Whether the spec produces a non-empty `query` clause list.
    pub fn has_query(&self) -> bool {
        self.fielded_terms
            .iter()
            .any(|(f, v)| f.is_clause() && !v.trim().is_empty())
            || self
                .free_text_fallback
                .as_deref()
                .is_some_and(|t| !t.trim().is_empty())
    }

    /// Rejects specs that would send an empty query to the archive.
    pub fn validate(&self) -> Result<()> {
        if !self.has_query() {
            return Err(NliError::QueryRejected(
                "spec needs at least one fielded term or free text".into(),
            ));
        }
        if let Some(field) = self
            .fielded_terms
            .iter()
            .find(|(_, v)| v.trim().is_empty())
            .map(|(f, _)| f)
        {
            return Err(NliError::QueryRejected(format!(
                "empty value for field '{}'",
                field.name()
            )));
        }
        if self.limit == Some(0) {
            return Err(NliError::QueryRejected("limit must be positive".into()));
        }
        if let Some(facets) = &self.facets
            && facets.fields.iter().all(|f| f.trim().is_empty())
        {
            return Err(NliError::QueryRejected(
                "facet request needs at least one field".into(),
            ));
        }
        Ok(())
    }

    /// Same search, ignoring the variant tag.
    pub(crate) fn same_search(&self, other: &Self) -> bool {
        self.fielded_terms == other.fielded_terms
            && self.filters == other.filters
            && self.free_text_fallback == other.free_text_fallback
    }
}

/// An interpreted request. Immutable once built.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Query {
    pub raw_text: String,
    pub language: ResponseLanguage,
    pub inferred_topics: Vec<String>,
    pub candidate_specs: Vec<StructuredQuerySpec>,
}
