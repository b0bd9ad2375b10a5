use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{ArchiveApi, SearchRequest, SearchResult};
use crate::config::{AccessTier, Settings};
use crate::error::{NliError, Result};
use crate::query::StructuredQuerySpec;

/// One page of decoded results.
#[derive(Serialize, Debug, Clone, Default)]
pub struct SearchPage {
    pub results: Vec<SearchResult>,
    /// Opaque; present iff the archive has more results for the same spec.
    pub next_page_token: Option<String>,
    pub total_results: Option<u64>,
    /// Offset of the first result in the full result set.
    pub offset: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facets: Option<Value>,
    /// Which candidate produced the page.
    pub spec_index: usize,
}

impl SearchPage {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

pub struct SearchExecutor<'a, A> {
    api: &'a A,
    settings: &'a Settings,
}

impl<'a, A: ArchiveApi> SearchExecutor<'a, A> {
    pub fn new(api: &'a A, settings: &'a Settings) -> Self {
        Self { api, settings }
    }

    /// Runs one spec for one page of `rows` results.
    pub async fn execute_page_sized(
        &self,
        spec: &StructuredQuerySpec,
        page_token: Option<&str>,
        rows: u32,
    ) -> Result<SearchPage> {
        spec.validate()?;
        let rows = rows.max(1);
        self.check_access(spec, rows)?;

        let raw = self
            .api
            .search(SearchRequest { spec, rows }, page_token)
            .await?;
        let results: Vec<SearchResult> = raw
            .records
            .into_iter()
            .filter_map(|record| SearchResult::from_raw(record, |id| self.api.manifest_url(id)))
            .collect();

        debug!(
            results = results.len(),
            more = raw.next_token.is_some(),
            "page executed"
        );
        Ok(SearchPage {
            results,
            next_page_token: raw.next_token,
            total_results: raw.total_results,
            offset: raw.start,
            facets: raw.facets,
            spec_index: 0,
        })
    }

    /// Tries candidates in order until one returns results.
    ///
    /// A continuation token belongs to the spec that produced it, so with a
    /// token only the first candidate is searched. Failures abort the loop;
    /// only empty pages move on to the next candidate.
    pub async fn execute(
        &self,
        candidates: &[StructuredQuerySpec],
        page_token: Option<&str>,
    ) -> Result<SearchPage> {
        self.execute_sized(candidates, page_token, self.settings.page_size)
            .await
    }

    /// Total matches and facet counts of the first matching candidate, without records.
    pub async fn count(&self, candidates: &[StructuredQuerySpec]) -> Result<SearchPage> {
        let mut page = self.execute_sized(candidates, None, 1).await?;
        page.results.clear();
        page.next_page_token = None;
        Ok(page)
    }

    async fn execute_sized(
        &self,
        candidates: &[StructuredQuerySpec],
        page_token: Option<&str>,
        rows: u32,
    ) -> Result<SearchPage> {
        let Some(first) = candidates.first() else {
            return Err(NliError::EmptyQuery);
        };
        if page_token.is_some() {
            return self.execute_page_sized(first, page_token, rows).await;
        }

        let budget = candidates.len().min(self.settings.max_fallback_attempts.max(1));
        let mut last = SearchPage::default();
        for (index, spec) in candidates.iter().take(budget).enumerate() {
            let mut page = self.execute_page_sized(spec, None, rows).await?;
            page.spec_index = index;
            if !page.is_empty() {
                if index > 0 {
                    info!(candidate = index, variant = ?spec.variant, "fallback candidate matched");
                }
                return Ok(page);
            }
            debug!(candidate = index, "candidate returned no results");
            last = page;
        }
        warn!(tried = budget, "no candidate returned results");
        Ok(last)
    }

    fn check_access(&self, spec: &StructuredQuerySpec, rows: u32) -> Result<()> {
        if self.settings.tier != AccessTier::Visitor {
            return Ok(());
        }
        let policy = &self.settings.access;
        if rows > policy.visitor_max_rows {
            return Err(NliError::Authentication(format!(
                "page size {rows} exceeds the visitor limit of {}",
                policy.visitor_max_rows
            )));
        }
        if let Some(filter) = spec
            .filters
            .keys()
            .find(|f| policy.elevated_filters.contains(f))
        {
            return Err(NliError::Authentication(format!(
                "filter '{}' requires a personal key",
                filter.param_name()
            )));
        }
        Ok(())
    }
}
