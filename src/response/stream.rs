use futures::stream::{self, Stream};
use tracing::{debug, warn};

use super::{ResponsePayload, assemble};
use crate::archive::{ArchiveApi, SearchExecutor};
use crate::config::Settings;
use crate::media::{DnsResolver, MediaResolver};
use crate::query::{ResponseLanguage, StructuredQuerySpec};

enum Cursor {
    Start(Option<String>),
    Next(String),
    Done,
}

struct Batches {
    spec: StructuredQuerySpec,
    cursor: Cursor,
    pages: usize,
}

/// Lazily pages through one spec, yielding one payload per page.
///
/// Nothing is fetched until the stream is polled, and only the current page
/// is held. A failed page yields a payload carrying the error marker and ends
/// the stream. An empty first page ends it without yielding.
pub fn stream_batches<'a, A: ArchiveApi + DnsResolver>(
    api: &'a A,
    settings: &'a Settings,
    spec: StructuredQuerySpec,
    page_token: Option<String>,
    rows: u32,
    language: ResponseLanguage,
) -> impl Stream<Item = ResponsePayload> + 'a {
    let state = Batches {
        spec,
        cursor: Cursor::Start(page_token),
        pages: 0,
    };

    stream::unfold(state, move |mut state| async move {
        let token = match std::mem::replace(&mut state.cursor, Cursor::Done) {
            Cursor::Done => return None,
            Cursor::Start(token) => token,
            Cursor::Next(token) => Some(token),
        };

        let executor = SearchExecutor::new(api, settings);
        let page = match executor
            .execute_page_sized(&state.spec, token.as_deref(), rows)
            .await
        {
            Ok(page) => page,
            Err(e) => {
                warn!(page = state.pages, error = %e, "batch failed");
                return Some((ResponsePayload::failed(language, &e), state));
            }
        };
        if page.is_empty() && page.next_page_token.is_none() {
            debug!(pages = state.pages, "no more batches");
            return None;
        }

        if let Some(next) = &page.next_page_token {
            state.cursor = Cursor::Next(next.clone());
        }
        state.pages += 1;

        let items = MediaResolver::new(api, &settings.media)
            .resolve_page(page.results)
            .await;
        let payload = assemble(language, items, page.next_page_token, page.total_results)
            .with_offset(page.offset)
            .with_facets(page.facets);
        Some((payload, state))
    })
}
