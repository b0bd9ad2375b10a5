use std::future::Future;
use std::time::Duration;

use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use super::{ArchiveApi, ImageData, RawPage, RawRecord, SearchRequest, token};
use crate::config::{ApiKey, RetryPolicy, Settings};
use crate::error::{NliError, Result};
use crate::media::{DnsResolver, MediaError, TokioDnsResolver, check_media_url};
use crate::query::{Field, StructuredQuerySpec};

const MAX_IMAGE_BYTES: usize = 10_000_000;
const CLAUSE_SEPARATOR: &str = ",AND;";

/// Outcome of one attempt, before the retry loop decides what to do with it.
enum Failure {
    Transient(String),
    Fatal(NliError),
}

impl From<reqwest::Error> for Failure {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            Failure::Fatal(NliError::QueryRejected(e.to_string()))
        } else if e.is_decode() {
            Failure::Fatal(NliError::Decode(e.to_string()))
        } else {
            Failure::Transient(e.to_string())
        }
    }
}

impl From<NliError> for Failure {
    fn from(e: NliError) -> Self {
        Failure::Fatal(e)
    }
}

/// HTTP adapter for the Open Library search endpoint and the IIIF services.
#[derive(Clone)]
pub struct ArchiveClient {
    http: Client,
    api_key: ApiKey,
    search_url: String,
    iiif_url: String,
    retry: RetryPolicy,
    allow_private_hosts: bool,
}

impl ArchiveClient {
    pub fn new(http: Client, settings: &Settings) -> Self {
        Self {
            http,
            api_key: settings.api_key.clone(),
            search_url: settings.search_url.clone(),
            iiif_url: settings.iiif_url.clone(),
            retry: settings.retry.clone(),
            allow_private_hosts: settings.media.allow_private_hosts,
        }
    }

    async fn with_retry<T, F, Fut>(&self, what: &'static str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, Failure>>,
    {
        let attempts = self.retry.max_attempts.max(1);
        let mut last = String::new();
        for attempt in 0..attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(Failure::Fatal(e)) => return Err(e),
                Err(Failure::Transient(message)) => {
                    last = message;
                    if attempt + 1 < attempts {
                        let delay = self.backoff(attempt);
                        debug!(
                            what,
                            attempt = attempt + 1,
                            delay_ms = delay.as_millis() as u64,
                            error = %last,
                            "retrying after transient error"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
        warn!(what, attempts, error = %last, "archive unreachable");
        Err(NliError::TransientNetwork {
            attempts,
            message: last,
        })
    }

    /// Equal jitter backoff: base/2 + rand(0, base/2).
    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.retry.initial_backoff.as_millis() as u64 * 2u64.pow(attempt);
        let half = base / 2;
        Duration::from_millis(half + fastrand::u64(..half.max(1)))
    }

    async fn get_json(&self, url: &url::Url) -> std::result::Result<Value, Failure> {
        let response = self
            .http
            .get(url.clone())
            .header("User-Agent", crate::USER_AGENT)
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json::<Value>().await?)
    }

    async fn download_image(&self, url: &url::Url) -> std::result::Result<ImageData, Failure> {
        let response = self
            .http
            .get(url.clone())
            .header("User-Agent", crate::USER_AGENT)
            .send()
            .await?;

        if response.url() != url {
            let final_url = response.url().as_str();
            check_media_url(final_url, self.allow_private_hosts, self)
                .await
                .map_err(|e| {
                    warn!(from = %url, to = final_url, error = %e, "image redirect rejected");
                    NliError::QueryRejected(format!("redirect target rejected: {e}"))
                })?;
        }
        let response = check_status(response).await?;

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or_default().trim().to_ascii_lowercase())
            .unwrap_or_default();
        if !mime_type.starts_with("image/") {
            let detail = format!("not an image (content-type '{mime_type}')");
            return Err(NliError::Decode(detail).into());
        }

        if let Some(len) = response.content_length()
            && len as usize > MAX_IMAGE_BYTES
        {
            return Err(too_large().into());
        }

        let mut bytes = Vec::new();
        let mut stream = response;
        while let Some(chunk) = stream.chunk().await? {
            bytes.extend_from_slice(&chunk);
            if bytes.len() > MAX_IMAGE_BYTES {
                return Err(too_large().into());
            }
        }
        Ok(ImageData { bytes, mime_type })
    }

    fn search_url_with(&self, params: &[(&str, String)]) -> Result<url::Url> {
        let mut url = url::Url::parse(&self.search_url)
            .map_err(|e| NliError::QueryRejected(format!("invalid search URL: {e}")))?;
        url.query_pairs_mut()
            .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));
        Ok(url)
    }
}

async fn check_status(response: Response) -> std::result::Result<Response, Failure> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, &body))
}

fn classify_status(status: StatusCode, body: &str) -> Failure {
    let snippet: String = body.chars().take(200).collect();
    match status.as_u16() {
        401 | 403 => Failure::Fatal(NliError::Authentication(format!("HTTP {status}"))),
        404 => Failure::Fatal(NliError::NotFound(format!("HTTP {status}"))),
        408 | 429 | 500..=599 => Failure::Transient(format!("HTTP {status}")),
        _ => Failure::Fatal(NliError::QueryRejected(format!("HTTP {status}: {snippet}"))),
    }
}

/// Values may not contain the clause delimiters.
fn clause_value(value: &str) -> String {
    value
        .replace([',', ';'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// `field,operator,value` clauses joined with `,AND;`.
pub(crate) fn build_query(spec: &StructuredQuerySpec) -> String {
    let mut clauses: Vec<String> = spec
        .fielded_terms
        .iter()
        .filter(|(field, value)| field.is_clause() && !value.trim().is_empty())
        .map(|(field, value)| {
            format!("{},{},{}", field.name(), field.operator(), clause_value(value))
        })
        .collect();
    if let Some(text) = spec
        .free_text_fallback
        .as_deref()
        .filter(|t| !t.trim().is_empty())
    {
        clauses.push(format!("{},contains,{}", Field::Any.name(), clause_value(text)));
    }
    clauses.join(CLAUSE_SEPARATOR)
}

pub(crate) fn search_params(
    spec: &StructuredQuerySpec,
    rows: u32,
    start: u64,
    api_key: &str,
) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("api_key", api_key.to_string()),
        ("query", build_query(spec)),
        ("output_format", "json".to_string()),
        ("rows", rows.to_string()),
        ("start", start.to_string()),
    ];
    if let Some(lang) = spec.fielded_terms.get(&Field::Language) {
        params.push(("language", lang.clone()));
    }
    params.extend(
        spec.filters
            .iter()
            .map(|(filter, value)| (filter.param_name(), value.clone())),
    );
    if let Some(facets) = &spec.facets {
        params.extend(
            facets
                .fields
                .iter()
                .map(|f| f.trim())
                .filter(|f| !f.is_empty())
                .map(|f| ("facet.field", f.to_string())),
        );
        if let Some(limit) = facets.limit {
            params.push(("facet.limit", limit.to_string()));
        }
        if let Some(offset) = facets.offset {
            params.push(("facet.offset", offset.to_string()));
        }
        if let Some(sort) = facets.sort.as_deref().filter(|s| !s.trim().is_empty()) {
            params.push(("facet.sort", sort.trim().to_string()));
        }
    }
    let mut fields: Vec<&str> = spec
        .fields
        .iter()
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .collect();
    if !fields.is_empty() {
        if !fields.contains(&"recordid") {
            fields.push("recordid");
        }
        params.push(("fields", fields.join(",")));
    }
    params
}

fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Debug, Default)]
struct DecodedPage {
    items: Vec<Value>,
    total: Option<u64>,
    facets: Option<Value>,
}

/// The endpoint answers with either a bare array or `{total_results, items}`.
fn decode_page(body: Value) -> Result<DecodedPage> {
    match body {
        Value::Array(items) => Ok(DecodedPage {
            items,
            ..DecodedPage::default()
        }),
        Value::Object(mut map) => {
            if let Some(error) = map.get("error").filter(|e| !e.is_null()) {
                return Err(NliError::QueryRejected(error.to_string()));
            }
            let total = map.get("total_results").and_then(as_count);
            let facets = ["facets", "facet_counts"]
                .into_iter()
                .find_map(|key| map.remove(key).filter(|v| !v.is_null()));
            let items = match map.remove("items") {
                Some(Value::Array(items)) => items,
                None | Some(Value::Null) => Vec::new(),
                Some(other) => {
                    return Err(NliError::Decode(format!(
                        "expected an item list, got {}",
                        type_name(&other)
                    )));
                }
            };
            Ok(DecodedPage {
                items,
                total,
                facets,
            })
        }
        other => Err(NliError::Decode(format!(
            "expected an object or array, got {}",
            type_name(&other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn into_records(items: Vec<Value>) -> Vec<RawRecord> {
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(map),
            other => {
                debug!(kind = type_name(&other), "skipping non-object search item");
                None
            }
        })
        .collect()
}

impl ArchiveApi for ArchiveClient {
    async fn search(
        &self,
        request: SearchRequest<'_>,
        page_token: Option<&str>,
    ) -> Result<RawPage> {
        let start = page_token.map(token::decode).transpose()?.unwrap_or(0);
        let rows = match request.spec.limit {
            Some(limit) => {
                let remaining = u64::from(limit).saturating_sub(start);
                if remaining == 0 {
                    return Ok(RawPage {
                        start,
                        ..RawPage::default()
                    });
                }
                request.rows.min(remaining as u32)
            }
            None => request.rows,
        };

        let params = search_params(request.spec, rows, start, self.api_key.expose());
        let url = self.search_url_with(&params)?;

        let url = &url;
        let body = self
            .with_retry("search", move || self.get_json(url))
            .await
            .map_err(|e| match e {
                NliError::NotFound(detail) => NliError::QueryRejected(detail),
                other => other,
            })?;
        let page = decode_page(body)?;

        let fetched = page.items.len() as u64;
        let end = start + fetched;
        // An uncounted response carries the whole remaining result set.
        let total = page.total.unwrap_or(end);
        let within_limit = request.spec.limit.is_none_or(|limit| end < u64::from(limit));
        let next_token = (fetched > 0 && end < total && within_limit).then(|| token::encode(end));

        debug!(start, rows, fetched, total, "search page fetched");
        Ok(RawPage {
            records: into_records(page.items),
            start,
            total_results: Some(total),
            next_token,
            facets: page.facets,
        })
    }

    async fn lookup_record(&self, record_id: &str) -> Result<Option<RawRecord>> {
        let params = [
            ("api_key", self.api_key.expose().to_string()),
            ("query", format!("RecordId,exact,{}", clause_value(record_id))),
            ("output_format", "json".to_string()),
            ("rows", "1".to_string()),
            ("start", "0".to_string()),
        ];
        let url = &self.search_url_with(&params)?;
        let body = match self.with_retry("lookup", move || self.get_json(url)).await {
            Ok(body) => body,
            Err(NliError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let page = decode_page(body)?;
        Ok(into_records(page.items).into_iter().next())
    }

    async fn fetch_manifest(&self, record_id: &str) -> Result<Value> {
        let raw = self.manifest_url(record_id);
        let url = &url::Url::parse(&raw)
            .map_err(|e| NliError::QueryRejected(format!("invalid manifest URL: {e}")))?;
        self.with_retry("manifest", move || self.get_json(url))
            .await
            .map_err(|e| match e {
                NliError::NotFound(_) => {
                    NliError::NotFound(format!("manifest of record {record_id}"))
                }
                other => other,
            })
    }

    async fn fetch_image(&self, url: &str) -> Result<ImageData> {
        let parsed =
            &url::Url::parse(url).map_err(|e| NliError::QueryRejected(format!("{url}: {e}")))?;
        self.with_retry("image", move || self.download_image(parsed))
            .await
    }

    fn manifest_url(&self, record_id: &str) -> String {
        format!(
            "{}/{}/manifest",
            self.iiif_url,
            utf8_percent_encode(record_id, NON_ALPHANUMERIC)
        )
    }
}

impl DnsResolver for ArchiveClient {
    async fn lookup(
        &self,
        host: &str,
        port: u16,
    ) -> std::result::Result<Vec<std::net::IpAddr>, MediaError> {
        TokioDnsResolver.lookup(host, port).await
    }
}

fn too_large() -> NliError {
    NliError::Decode(format!("image larger than {MAX_IMAGE_BYTES} bytes"))
}


#[cfg(test)]
mod http_tests {
    use super::*;
    use crate::query::FacetRequest;
    use futures::StreamExt;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ArchiveClient {
        let settings = Settings {
            search_url: format!("{}/search", server.uri()),
            iiif_url: format!("{}/iiif", server.uri()),
            retry: RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::ZERO,
            },
            ..Settings::default()
        };
        ArchiveClient::new(Client::new(), &settings)
    }

    fn records(range: std::ops::Range<u32>) -> Vec<Value> {
        range.map(|i| json!({"recordid": i.to_string()})).collect()
    }

    #[tokio::test]
    async fn search_sends_clauses_and_pages_with_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("query", "creator,contains,Herzl"))
            .and(query_param("start", "0"))
            .and(query_param("rows", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total_results": 5,
                "items": records(0..3)
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("start", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total_results": 5,
                "items": records(3..5)
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let spec = StructuredQuerySpec::default().with_term(Field::Creator, "Herzl");
        let request = SearchRequest { spec: &spec, rows: 3 };

        let first = client.search(request, None).await.unwrap();
        assert_eq!(first.records.len(), 3);
        assert_eq!(first.total_results, Some(5));
        let token = first.next_token.expect("more pages");

        let second = client.search(request, Some(&token)).await.unwrap();
        assert_eq!(second.records.len(), 2);
        assert!(second.next_token.is_none());
    }

    #[tokio::test]
    async fn bare_array_response_is_the_whole_result_set() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(records(0..2))))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let spec = StructuredQuerySpec::free_text("x");
        let full = client
            .search(SearchRequest { spec: &spec, rows: 2 }, None)
            .await
            .unwrap();
        assert_eq!(full.records.len(), 2);
        assert_eq!(full.total_results, Some(2));
        assert!(full.next_token.is_none());

        let short = client
            .search(SearchRequest { spec: &spec, rows: 5 }, None)
            .await
            .unwrap();
        assert!(short.next_token.is_none());
    }

    #[tokio::test]
    async fn exact_multiple_of_page_size_ends_without_empty_page() {
        let server = MockServer::start().await;
        for start in [0u32, 3] {
            Mock::given(method("GET"))
                .and(path("/search"))
                .and(query_param("start", start.to_string()))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "total_results": 6,
                    "items": records(start..start + 3)
                })))
                .expect(1)
                .mount(&server)
                .await;
        }

        let client = client_for(&server);
        let settings = Settings::default();
        let payloads: Vec<_> = crate::response::stream_batches(
            &client,
            &settings,
            StructuredQuerySpec::free_text("x"),
            None,
            3,
            crate::query::ResponseLanguage::En,
        )
        .collect()
        .await;

        let sizes: Vec<_> = payloads.iter().map(|p| p.items.len()).collect();
        assert_eq!(sizes, [3, 3]);
        assert!(payloads[0].continuation_token.is_some());
        assert!(payloads[1].continuation_token.is_none());
        assert_eq!(payloads[1].total_results, Some(6));
    }

    #[tokio::test]
    async fn uncounted_exact_fill_is_a_single_batch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(records(0..3))))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let settings = Settings::default();
        let payloads: Vec<_> = crate::response::stream_batches(
            &client,
            &settings,
            StructuredQuerySpec::free_text("x"),
            None,
            3,
            crate::query::ResponseLanguage::En,
        )
        .collect()
        .await;

        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].items.len(), 3);
        assert_eq!(payloads[0].total_results, Some(3));
        assert!(payloads[0].continuation_token.is_none());
    }

    #[tokio::test]
    async fn facets_pass_through_from_the_archive() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("facet.field", "materialType"))
            .and(query_param("facet.limit", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total_results": 40,
                "items": records(0..2),
                "facets": {"materialType": {"maps": 25, "photographs": 15}}
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let mut spec = StructuredQuerySpec::free_text("safed");
        spec.facets = Some(FacetRequest {
            fields: vec!["materialType".into()],
            limit: Some(3),
            ..FacetRequest::default()
        });
        let page = client
            .search(SearchRequest { spec: &spec, rows: 2 }, None)
            .await
            .unwrap();
        assert_eq!(page.facets.unwrap()["materialType"]["maps"], 25);
        assert!(page.next_token.is_some());
    }

    #[tokio::test]
    async fn limit_caps_rows_and_stops_paging() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("rows", "4"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total_results": 100,
                "items": records(0..4)
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let mut spec = StructuredQuerySpec::free_text("x");
        spec.limit = Some(4);
        let page = client
            .search(SearchRequest { spec: &spec, rows: 10 }, None)
            .await
            .unwrap();
        assert_eq!(page.records.len(), 4);
        assert!(page.next_token.is_none());
    }

    #[tokio::test]
    async fn server_errors_are_retried_then_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let spec = StructuredQuerySpec::free_text("x");
        let err = client
            .search(SearchRequest { spec: &spec, rows: 10 }, None)
            .await
            .unwrap_err();
        assert!(matches!(err, NliError::TransientNetwork { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn transient_error_then_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total_results": 1,
                "items": records(0..1)
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let spec = StructuredQuerySpec::free_text("x");
        let page = client
            .search(SearchRequest { spec: &spec, rows: 10 }, None)
            .await
            .unwrap();
        assert_eq!(page.records.len(), 1);
    }

    #[tokio::test]
    async fn rate_limit_then_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total_results": 2,
                "items": records(0..2)
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let spec = StructuredQuerySpec::free_text("x");
        let page = client
            .search(SearchRequest { spec: &spec, rows: 10 }, None)
            .await
            .unwrap();
        assert_eq!(page.records.len(), 2);
    }

    #[tokio::test]
    async fn slow_archive_times_out_after_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([]))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let settings = Settings {
            search_url: format!("{}/search", server.uri()),
            retry: RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::ZERO,
            },
            ..Settings::default()
        };
        let http = Client::builder()
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        let client = ArchiveClient::new(http, &settings);
        let spec = StructuredQuerySpec::free_text("x");
        let err = client
            .search(SearchRequest { spec: &spec, rows: 10 }, None)
            .await
            .unwrap_err();
        assert!(matches!(err, NliError::TransientNetwork { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn refused_connection_is_transient() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let settings = Settings {
            search_url: format!("http://127.0.0.1:{port}/search"),
            retry: RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::ZERO,
            },
            ..Settings::default()
        };
        let client = ArchiveClient::new(Client::new(), &settings);
        let spec = StructuredQuerySpec::free_text("x");
        let err = client
            .search(SearchRequest { spec: &spec, rows: 10 }, None)
            .await
            .unwrap_err();
        assert!(matches!(err, NliError::TransientNetwork { attempts: 3, .. }));
        assert!(err.is_retriable());
    }

    #[tokio::test]
    async fn unauthorized_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let spec = StructuredQuerySpec::free_text("x");
        let err = client
            .search(SearchRequest { spec: &spec, rows: 10 }, None)
            .await
            .unwrap_err();
        assert!(matches!(err, NliError::Authentication(_)));
    }

    #[tokio::test]
    async fn search_404_is_a_rejected_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let spec = StructuredQuerySpec::free_text("x");
        let err = client
            .search(SearchRequest { spec: &spec, rows: 10 }, None)
            .await
            .unwrap_err();
        assert!(matches!(err, NliError::QueryRejected(_)));
    }

    #[tokio::test]
    async fn garbage_token_fails_before_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let spec = StructuredQuerySpec::free_text("x");
        let err = client
            .search(SearchRequest { spec: &spec, rows: 10 }, Some("%%%"))
            .await
            .unwrap_err();
        assert!(matches!(err, NliError::QueryRejected(_)));
    }

    #[tokio::test]
    async fn lookup_uses_exact_record_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("query", "RecordId,exact,990012"))
            .and(query_param("rows", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"recordid": "990012", "stream_url_mp4": "https://m/1.mp4"}]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let record = client.lookup_record("990012").await.unwrap().unwrap();
        assert_eq!(record["stream_url_mp4"], "https://m/1.mp4");
        assert!(client.lookup_record("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn manifest_404_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/iiif/FL123/manifest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"@id": "m"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/iiif/gone/manifest"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert_eq!(client.fetch_manifest("FL123").await.unwrap()["@id"], "m");
        assert!(matches!(
            client.fetch_manifest("gone").await,
            Err(NliError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn image_must_have_image_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/thumb.jpg"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(vec![0xff, 0xd8, 0xff], "image/jpeg"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/page.html"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("<html></html>", "text/html"),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let image = client
            .fetch_image(&format!("{}/thumb.jpg", server.uri()))
            .await
            .unwrap();
        assert_eq!(image.mime_type, "image/jpeg");
        assert_eq!(image.bytes, vec![0xff, 0xd8, 0xff]);

        let err = client
            .fetch_image(&format!("{}/page.html", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, NliError::Decode(_)));
    }

    #[tokio::test]
    async fn image_redirect_to_private_host_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/thumb.jpg"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", format!("{}/secret.jpg", server.uri()).as_str()),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/secret.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0xff, 0xd8], "image/jpeg"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .fetch_image(&format!("{}/thumb.jpg", server.uri()))
            .await
            .unwrap_err();
        assert!(
            matches!(err, NliError::QueryRejected(ref m) if m.contains("redirect target rejected"))
        );

        let mut settings = Settings {
            search_url: format!("{}/search", server.uri()),
            ..Settings::default()
        };
        settings.media.allow_private_hosts = true;
        let permissive = ArchiveClient::new(Client::new(), &settings);
        let image = permissive
            .fetch_image(&format!("{}/thumb.jpg", server.uri()))
            .await
            .unwrap();
        assert_eq!(image.bytes, vec![0xff, 0xd8]);
    }

    #[test]
    fn manifest_url_encodes_identifier() {
        let settings = Settings::default();
        let client = ArchiveClient::new(Client::new(), &settings);
        assert_eq!(
            client.manifest_url("FL 1/2"),
            "https://iiif.nli.org.il/IIIFv21/FL%201%2F2/manifest"
        );
    }
}
