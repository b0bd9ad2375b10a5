use std::fmt::Write;

use rmcp::ErrorData as McpError;
use serde::Serialize;

use crate::media::{MediaPayload, ResolvedMedia};
use crate::pipeline::{ManifestData, ResultCount, StreamDescriptor};
use crate::query::{Query, ResponseLanguage};
use crate::response::{ResponseItem, ResponsePayload};

/// Markdown link with `[`, `]`, `(`, `)` escaped in both parts.
fn link(text: &str, url: &str) -> String {
    format!("[{}]({})", escape_link(text), escape_link(url))
}

fn escape_link(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '[' | ']' | '(' | ')') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Metadata values can span lines; list items cannot.
fn one_line(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(super) fn json_block(value: &impl Serialize) -> Result<String, McpError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(format!("failed to serialize result: {e}"), None))?;
    Ok(format!("```json\n{json}\n```\n"))
}

pub(super) fn format_query(query: &Query) -> Result<String, McpError> {
    let mut out = format!("## Query: {}\n\n", one_line(&query.raw_text));
    let _ = writeln!(out, "- Language: {}", query.language.code());
    if !query.inferred_topics.is_empty() {
        let _ = writeln!(out, "- Topics: {}", query.inferred_topics.join(", "));
    }
    let _ = writeln!(
        out,
        "- Candidates: {} (tried in order until one has results)\n",
        query.candidate_specs.len()
    );
    out.push_str(&json_block(&query.candidate_specs)?);
    Ok(out)
}

fn media_line(media: &ResolvedMedia) -> String {
    let kind = json_name(&media.kind);
    match &media.payload {
        MediaPayload::Url(url) => format!("{kind}: {url}"),
        MediaPayload::Inline(bytes) => {
            format!("{kind}: inline {} ({} bytes)", media.mime_type, bytes.len())
        }
    }
}

fn item_line(out: &mut String, index: usize, item: &ResponseItem) {
    let mut line = format!("{}. {}", index + 1, link(&one_line(&item.title), &item.item_url));
    let details: Vec<String> = [&item.creator, &item.date]
        .into_iter()
        .flatten()
        .map(|s| one_line(s))
        .collect();
    if !details.is_empty() {
        let _ = write!(line, " ({})", details.join(", "));
    }
    let _ = writeln!(out, "{line}");
    if let Some(media) = &item.media {
        let _ = writeln!(out, "   - {}", media_line(media));
    }
    if let Some(warning) = &item.warning {
        let _ = writeln!(out, "   - media unavailable: {}", one_line(&warning.reason));
    }
}

/// Readable summary followed by the payload as JSON.
pub(super) fn format_payload(payload: &ResponsePayload) -> Result<String, McpError> {
    let mut out = String::new();
    if let Some(error) = &payload.error {
        let _ = writeln!(out, "**{}** ({})\n", error.message, error.code);
    } else if payload.items.is_empty() {
        out.push_str(match payload.language {
            ResponseLanguage::He => "לא נמצאו תוצאות.\n\n",
            ResponseLanguage::En => "No results found.\n\n",
        });
    } else {
        if let Some(total) = payload.total_results {
            let first = payload.offset + 1;
            let last = payload.offset + payload.items.len() as u64;
            let _ = writeln!(out, "Showing results {first}-{last} of {total}\n");
        }
        for (i, item) in payload.items.iter().enumerate() {
            item_line(&mut out, i, item);
        }
        out.push('\n');
    }
    if let Some(token) = &payload.continuation_token {
        let _ = writeln!(
            out,
            "More results available: call stream_batches with continuation_token `{token}`.\n"
        );
    }
    out.push_str(&json_block(payload)?);
    Ok(out)
}

pub(super) fn format_count(count: &ResultCount) -> Result<String, McpError> {
    let mut out = match count.language {
        ResponseLanguage::He => format!("נמצאו {} תוצאות.\n\n", count.total_results),
        ResponseLanguage::En => format!("{} results found.\n\n", count.total_results),
    };
    out.push_str(&json_block(count)?);
    Ok(out)
}

pub(super) fn format_manifest(data: &ManifestData) -> Result<String, McpError> {
    let mut out = format!("## Manifest: {}\n\n", one_line(&data.record_id));
    let _ = writeln!(out, "- URL: {}", data.manifest_url);
    let _ = writeln!(out, "- Pages: {}", data.canvas_count);
    match &data.preview_image {
        Some(url) => {
            let _ = writeln!(out, "- Preview image: {url}\n");
        }
        None => out.push_str("- Preview image: none\n\n"),
    }
    out.push_str(&json_block(&data.manifest)?);
    Ok(out)
}

pub(super) fn format_streams(streams: &StreamDescriptor) -> Result<String, McpError> {
    let mut out = format!("## Streams: {}\n\n", one_line(&streams.record_id));
    if streams.streams.is_empty() {
        out.push_str("No streams available for this record.\n\n");
    }
    for stream in &streams.streams {
        let format = json_name(&stream.format);
        let _ = writeln!(out, "- {} ({format}): {}", stream.mime_type, stream.url);
    }
    if !streams.streams.is_empty() {
        out.push('\n');
    }
    out.push_str(&json_block(streams)?);
    Ok(out)
}

fn json_name(value: &impl Serialize) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}
