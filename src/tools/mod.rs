mod errors;
mod format;
mod params;

pub use params::{
    GenerateResponseParams, GetImageParams, GetManifestParams, GetStreamParams,
    ProcessQueryParams, StreamBatchesParams,
};

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures::StreamExt;
use reqwest::Client;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, Implementation, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use tracing::info;

use errors::nli_to_mcp_error;
use format::{
    format_count, format_manifest, format_payload, format_query, format_streams, json_block,
};

use crate::archive::ArchiveClient;
use crate::config::Settings;
use crate::pipeline::{ImageRequest, Pipeline, ResponseRequest};
use crate::response::ResponsePayload;

/// TCP connection establishment timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Global HTTP client timeout covering DNS + connect + response body.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
/// Maximum redirect hops before aborting.
const MAX_REDIRECTS: usize = 5;
const MAX_BATCHES: u8 = 5;

fn http_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(HTTP_TIMEOUT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .build()
}

/// MCP server handler exposing the National Library of Israel tools.
///
/// Configuration is read from `NLI_*` environment variables; see `Settings::from_env`.
#[derive(Clone)]
pub struct NliScout {
    pipeline: Arc<Pipeline<ArchiveClient>>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl NliScout {
    pub fn new(settings: Settings) -> Result<Self, reqwest::Error> {
        let archive = ArchiveClient::new(http_client()?, &settings);
        Ok(Self::with_pipeline(Pipeline::new(archive, settings)))
    }

    fn with_pipeline(pipeline: Pipeline<ArchiveClient>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        name = "process_natural_query",
        description = "Interpret a natural-language question (Hebrew or English) into ranked structured search specs for the National Library of Israel catalogue. No network access. Returns the detected language, inferred topics, and candidate specs; pass a spec to generate_response or stream_batches."
    )]
    async fn process_natural_query(
        &self,
        Parameters(params): Parameters<ProcessQueryParams>,
    ) -> Result<CallToolResult, McpError> {
        if params.query.trim().is_empty() {
            return Err(McpError::invalid_params("query must not be empty", None));
        }

        info!(query = %params.query, "tool:process_natural_query");

        let query = self
            .pipeline
            .process_natural_query(&params.query, params.language.unwrap_or_default())
            .map_err(nli_to_mcp_error)?;

        info!(
            language = query.language.code(),
            candidates = query.candidate_specs.len(),
            "process_natural_query complete"
        );
        Ok(CallToolResult::success(vec![Content::text(format_query(
            &query,
        )?)]))
    }

    #[tool(
        name = "generate_response",
        description = "Search the National Library of Israel catalogue and return one page of results with titles, creators, dates, item page links, and media (thumbnail, IIIF manifest, or stream). Accepts either a natural-language `query` (candidates are tried in order until one has results) or a structured `spec`; a spec may request facet counts and a subset of record fields. Set `count_only` to get just the number of matches. Answers in the language of the question."
    )]
    async fn generate_response(
        &self,
        Parameters(params): Parameters<GenerateResponseParams>,
    ) -> Result<CallToolResult, McpError> {
        let request = match (params.query, params.spec) {
            (Some(query), None) if !query.trim().is_empty() => ResponseRequest::Text(query),
            (Some(_), None) => {
                return Err(McpError::invalid_params("query must not be empty", None));
            }
            (None, Some(spec)) => ResponseRequest::Spec(spec),
            _ => {
                return Err(McpError::invalid_params(
                    "provide exactly one of `query` or `spec`",
                    None,
                ));
            }
        };

        let count_only = params.count_only.unwrap_or(false);
        info!(
            text = matches!(request, ResponseRequest::Text(_)),
            count_only,
            "tool:generate_response"
        );

        if count_only {
            let count = self
                .pipeline
                .count_results(request, params.language.unwrap_or_default())
                .await
                .map_err(nli_to_mcp_error)?;
            info!(total = count.total_results, "generate_response count complete");
            return Ok(CallToolResult::success(vec![Content::text(format_count(
                &count,
            )?)]));
        }

        let generated = self
            .pipeline
            .generate_response(request, params.language.unwrap_or_default())
            .await
            .map_err(nli_to_mcp_error)?;

        let mut output = format_payload(&generated.payload)?;
        if let Some(spec) = &generated.spec {
            output.push_str("\nSpec used:\n");
            output.push_str(&json_block(spec)?);
        }

        info!(
            items = generated.payload.items.len(),
            failed = generated.payload.is_failed(),
            "generate_response complete"
        );
        Ok(tool_result(&generated.payload, output))
    }

    #[tool(
        name = "stream_batches",
        description = "Page through the results of a structured spec. Returns up to `max_batches` pages (1-5) and a continuation token; call again with the token to continue. Use after generate_response when more results are available."
    )]
    async fn stream_batches(
        &self,
        Parameters(params): Parameters<StreamBatchesParams>,
    ) -> Result<CallToolResult, McpError> {
        let max_batches = params.max_batches.unwrap_or(1).clamp(1, MAX_BATCHES);

        info!(
            max_batches,
            resumed = params.continuation_token.is_some(),
            "tool:stream_batches"
        );

        let batches: Vec<ResponsePayload> = self
            .pipeline
            .stream_batches(
                params.spec,
                params.continuation_token,
                params.page_size,
                params.language.unwrap_or_default(),
            )
            .take(usize::from(max_batches))
            .collect()
            .await;

        if batches.is_empty() {
            return Ok(CallToolResult::success(vec![Content::text(
                "No results found. The result set is empty or already exhausted.",
            )]));
        }

        let mut output = String::new();
        for (i, batch) in batches.iter().enumerate() {
            output.push_str(&format!("### Batch {}\n\n", i + 1));
            output.push_str(&format_payload(batch)?);
            output.push('\n');
        }

        info!(batches = batches.len(), "stream_batches complete");
        match batches.last() {
            Some(last) => Ok(tool_result(last, output)),
            None => Ok(CallToolResult::success(vec![Content::text(output)])),
        }
    }

    #[tool(
        name = "get_image",
        description = "Fetch an image from the library's IIIF Image API. Region, size, rotation, quality and format follow the IIIF Image API 2.1 syntax (defaults: full/max/0/default.jpg)."
    )]
    async fn get_image(
        &self,
        Parameters(params): Parameters<GetImageParams>,
    ) -> Result<CallToolResult, McpError> {
        info!(identifier = %params.identifier, "tool:get_image");

        let mut request = ImageRequest::new(params.identifier);
        if let Some(region) = params.region {
            request.region = region;
        }
        if let Some(size) = params.size {
            request.size = size;
        }
        if let Some(rotation) = params.rotation {
            request.rotation = rotation;
        }
        if let Some(quality) = params.quality {
            request.quality = quality;
        }
        if let Some(format) = params.format {
            request.format = format;
        }

        let url = self.pipeline.image_url(&request).map_err(nli_to_mcp_error)?;
        let image = self
            .pipeline
            .get_image(&request)
            .await
            .map_err(nli_to_mcp_error)?;

        info!(bytes = image.bytes.len(), mime = %image.mime_type, "get_image complete");
        Ok(CallToolResult::success(vec![
            Content::text(format!(
                "Image retrieved from {url} ({}, {} bytes)",
                image.mime_type,
                image.bytes.len()
            )),
            Content::image(STANDARD.encode(&image.bytes), image.mime_type),
        ]))
    }

    #[tool(
        name = "get_manifest",
        description = "Fetch the IIIF Presentation manifest of a record. Returns the manifest JSON, its page count, and the first page image (logos skipped)."
    )]
    async fn get_manifest(
        &self,
        Parameters(params): Parameters<GetManifestParams>,
    ) -> Result<CallToolResult, McpError> {
        info!(record_id = %params.record_id, "tool:get_manifest");

        let data = self
            .pipeline
            .get_manifest(&params.record_id)
            .await
            .map_err(nli_to_mcp_error)?;

        info!(pages = data.canvas_count, "get_manifest complete");
        Ok(CallToolResult::success(vec![Content::text(format_manifest(
            &data,
        )?)]))
    }

    #[tool(
        name = "get_stream",
        description = "Look up the streaming URLs (MP4 video, HLS, audio) of a record."
    )]
    async fn get_stream(
        &self,
        Parameters(params): Parameters<GetStreamParams>,
    ) -> Result<CallToolResult, McpError> {
        info!(record_id = %params.record_id, "tool:get_stream");

        let format = params.format.unwrap_or_default().format();
        let streams = self
            .pipeline
            .get_stream(&params.record_id, format)
            .await
            .map_err(nli_to_mcp_error)?;

        info!(streams = streams.streams.len(), "get_stream complete");
        Ok(CallToolResult::success(vec![Content::text(format_streams(
            &streams,
        )?)]))
    }
}

/// Failed pages are tool errors but keep the localized payload as content.
fn tool_result(payload: &ResponsePayload, output: String) -> CallToolResult {
    if payload.is_failed() {
        CallToolResult::error(vec![Content::text(output)])
    } else {
        CallToolResult::success(vec![Content::text(output)])
    }
}

#[tool_handler]
impl ServerHandler for NliScout {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "nli-scout".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            instructions: Some(
                "nli-scout searches the National Library of Israel catalogue. Start with process_natural_query or generate_response for a question in Hebrew or English, page further with stream_batches, and use get_image, get_manifest and get_stream for an item's media. Answer in the language of the question and link item titles to their item_url."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
