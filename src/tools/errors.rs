use rmcp::ErrorData as McpError;

use crate::error::NliError;

pub(super) fn retriable_error(e: &impl std::fmt::Display) -> McpError {
    McpError::internal_error(format!("{e} (retriable)"), None)
}

pub(super) fn nli_to_mcp_error(e: NliError) -> McpError {
    match &e {
        NliError::EmptyQuery | NliError::QueryRejected(_) | NliError::NotFound(_) => {
            McpError::invalid_params(e.to_string(), None)
        }
        NliError::Authentication(_) => McpError::invalid_params(
            format!("{e}. Set NLI_API_KEY to a personal key from the National Library of Israel"),
            None,
        ),
        NliError::TransientNetwork { .. } => retriable_error(&e),
        NliError::Decode(_) => McpError::internal_error(e.to_string(), None),
    }
}
