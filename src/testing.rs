//! In-memory archive used by executor, resolver, streamer and pipeline tests.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Mutex;

use serde_json::{Value, json};

use crate::archive::{ArchiveApi, ImageData, RawPage, RawRecord, SearchRequest, token};
use crate::error::{NliError, Result};
use crate::media::{DnsResolver, MediaError};
use crate::query::StructuredQuerySpec;

pub(crate) fn record_with(value: Value) -> RawRecord {
    value.as_object().cloned().expect("record fixture must be an object")
}

/// `rec-0 .. rec-{n-1}`, each with a title and a thumbnail.
pub(crate) fn records(n: usize) -> Vec<RawRecord> {
    (0..n)
        .map(|i| {
            record_with(json!({
                "recordid": format!("rec-{i}"),
                "title": [
                    {"@value": format!("כותר {i}"), "@language": "heb"},
                    {"@value": format!("Title {i}"), "@language": "eng"}
                ],
                "creator": format!("Creator {i}"),
                "date": "1923",
                "thumbnail": format!("https://img.test/rec-{i}.jpg")
            }))
        })
        .collect()
}

#[derive(Default)]
struct Calls {
    search: usize,
    lookup: usize,
    manifest: usize,
    image: usize,
}

#[derive(Default)]
pub(crate) struct MockArchive {
    dataset: Vec<RawRecord>,
    empty_searches: usize,
    failure: Mutex<Option<(usize, NliError)>>,
    failing_images: HashSet<String>,
    manifests: HashMap<String, Value>,
    /// Address every host name resolves to; a public one unless overridden.
    resolved_ip: Option<IpAddr>,
    calls: Mutex<Calls>,
    searches: Mutex<Vec<(StructuredQuerySpec, u32)>>,
}

impl MockArchive {
    pub(crate) fn with_records(n: usize) -> Self {
        Self::from_records(records(n))
    }

    pub(crate) fn from_records(dataset: Vec<RawRecord>) -> Self {
        Self {
            dataset,
            ..Self::default()
        }
    }

    /// The first `n` searches find nothing.
    pub(crate) fn empty_for(mut self, n: usize) -> Self {
        self.empty_searches = n;
        self
    }

    /// Search number `call` (1-based) fails with `error`.
    pub(crate) fn fail_on_call(self, call: usize, error: NliError) -> Self {
        *self.failure.lock().unwrap() = Some((call, error));
        self
    }

    pub(crate) fn failing_image(mut self, url: &str) -> Self {
        self.failing_images.insert(url.to_string());
        self
    }

    pub(crate) fn with_manifest(mut self, record_id: &str, manifest: Value) -> Self {
        self.manifests.insert(record_id.to_string(), manifest);
        self
    }

    pub(crate) fn resolving_to(mut self, ip: IpAddr) -> Self {
        self.resolved_ip = Some(ip);
        self
    }

    pub(crate) fn search_calls(&self) -> usize {
        self.calls.lock().unwrap().search
    }

    pub(crate) fn lookup_calls(&self) -> usize {
        self.calls.lock().unwrap().lookup
    }

    pub(crate) fn manifest_calls(&self) -> usize {
        self.calls.lock().unwrap().manifest
    }

    pub(crate) fn image_calls(&self) -> usize {
        self.calls.lock().unwrap().image
    }

    pub(crate) fn searched(&self) -> Vec<(StructuredQuerySpec, u32)> {
        self.searches.lock().unwrap().clone()
    }
}

impl ArchiveApi for MockArchive {
    async fn search(
        &self,
        request: SearchRequest<'_>,
        page_token: Option<&str>,
    ) -> Result<RawPage> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            calls.search += 1;
            calls.search
        };
        self.searches
            .lock()
            .unwrap()
            .push((request.spec.clone(), request.rows));

        {
            let mut failure = self.failure.lock().unwrap();
            if failure.as_ref().is_some_and(|(at, _)| *at == call)
                && let Some((_, error)) = failure.take()
            {
                return Err(error);
            }
        }
        if call <= self.empty_searches {
            return Ok(RawPage {
                total_results: Some(0),
                ..RawPage::default()
            });
        }

        let start = page_token.map(token::decode).transpose()?.unwrap_or(0) as usize;
        let end = (start + request.rows as usize).min(self.dataset.len());
        let records = self.dataset.get(start..end).unwrap_or_default().to_vec();
        let next_token = (end < self.dataset.len()).then(|| token::encode(end as u64));
        Ok(RawPage {
            records,
            start: start as u64,
            total_results: Some(self.dataset.len() as u64),
            next_token,
            facets: request
                .spec
                .facets
                .as_ref()
                .map(|f| json!({ "requested": f.fields })),
        })
    }

    async fn lookup_record(&self, record_id: &str) -> Result<Option<RawRecord>> {
        self.calls.lock().unwrap().lookup += 1;
        Ok(self
            .dataset
            .iter()
            .find(|r| r.get("recordid").and_then(Value::as_str) == Some(record_id))
            .cloned())
    }

    async fn fetch_manifest(&self, record_id: &str) -> Result<Value> {
        self.calls.lock().unwrap().manifest += 1;
        self.manifests
            .get(record_id)
            .cloned()
            .ok_or_else(|| NliError::NotFound(format!("manifest of record {record_id}")))
    }

    async fn fetch_image(&self, url: &str) -> Result<ImageData> {
        self.calls.lock().unwrap().image += 1;
        if self.failing_images.contains(url) {
            return Err(NliError::TransientNetwork {
                attempts: 3,
                message: "HTTP 503".into(),
            });
        }
        Ok(ImageData {
            bytes: vec![0xff, 0xd8, 0xff, 0xe0],
            mime_type: "image/jpeg".into(),
        })
    }

    fn manifest_url(&self, record_id: &str) -> String {
        format!("https://iiif.test/{record_id}/manifest")
    }
}

impl DnsResolver for MockArchive {
    async fn lookup(
        &self,
        _host: &str,
        _port: u16,
    ) -> std::result::Result<Vec<IpAddr>, MediaError> {
        Ok(vec![self.resolved_ip.unwrap_or(IpAddr::from([93, 184, 216, 34]))])
    }
}
