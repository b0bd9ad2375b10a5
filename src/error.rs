//! Error taxonomy shared by the interpreter, executor and passthrough operations.

use crate::query::ResponseLanguage;

/// Errors that abort a request or a page.
///
/// Per-item media problems are not errors; see [`crate::media::MediaUnavailable`].
#[derive(Debug, thiserror::Error)]
pub enum NliError {
    #[error("query is empty")]
    EmptyQuery,

    #[error("archive rejected the query: {0}")]
    QueryRejected(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("archive unreachable after {attempts} attempts: {message}")]
    TransientNetwork { attempts: u32, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("could not decode archive response: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, NliError>;

impl NliError {
    /// Stable machine-readable code carried by failed response payloads.
    pub fn code(&self) -> &'static str {
        match self {
            NliError::EmptyQuery => "empty_query",
            NliError::QueryRejected(_) => "query_rejected",
            NliError::Authentication(_) => "authentication",
            NliError::TransientNetwork { .. } => "transient_network",
            NliError::NotFound(_) => "not_found",
            NliError::Decode(_) => "decode",
        }
    }

    pub fn is_retriable(&self) -> bool {
        matches!(self, NliError::TransientNetwork { .. })
    }

    /// Human-readable message in the response language.
    pub fn user_message(&self, lang: ResponseLanguage) -> String {
        match lang {
            ResponseLanguage::En => match self {
                NliError::EmptyQuery => "Please enter a search query.".into(),
                NliError::QueryRejected(detail) => {
                    format!("The library catalogue could not process this search ({detail}).")
                }
                NliError::Authentication(_) => {
                    "This request needs a personal NLI API key (set NLI_API_KEY).".into()
                }
                NliError::TransientNetwork { .. } => {
                    "The library catalogue is not responding right now. Please try again later."
                        .into()
                }
                NliError::NotFound(what) => format!("No item was found for {what}."),
                NliError::Decode(_) => {
                    "The library catalogue returned an unreadable response.".into()
                }
            },
            ResponseLanguage::He => match self {
                NliError::EmptyQuery => "נא להזין שאילתת חיפוש.".into(),
                NliError::QueryRejected(detail) => {
                    format!("קטלוג הספרייה לא הצליח לעבד את החיפוש ({detail}).")
                }
                NliError::Authentication(_) => {
                    "בקשה זו דורשת מפתח API אישי של הספרייה הלאומית (NLI_API_KEY).".into()
                }
                NliError::TransientNetwork { .. } => {
                    "קטלוג הספרייה אינו זמין כרגע. נא לנסות שוב מאוחר יותר.".into()
                }
                NliError::NotFound(what) => format!("לא נמצא פריט עבור {what}."),
                NliError::Decode(_) => "קטלוג הספרייה החזיר תשובה שאינה קריאה.".into(),
            },
        }
    }
}
