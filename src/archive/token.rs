//! Continuation tokens. Only the client adapter looks inside them.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use crate::error::{NliError, Result};

const PREFIX: &str = "start:";

pub(crate) fn encode(start: u64) -> String {
    URL_SAFE_NO_PAD.encode(format!("{PREFIX}{start}"))
}

pub(crate) fn decode(token: &str) -> Result<u64> {
    let invalid = || NliError::QueryRejected("invalid continuation token".into());
    let bytes = URL_SAFE_NO_PAD.decode(token.trim()).map_err(|_| invalid())?;
    let text = String::from_utf8(bytes).map_err(|_| invalid())?;
    text.strip_prefix(PREFIX)
        .and_then(|n| n.parse().ok())
        .ok_or_else(invalid)
}
