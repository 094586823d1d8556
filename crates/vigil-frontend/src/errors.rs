//! Error types for expression parsing.

use thiserror::Error;

/// Number of bytes of context kept on each side of a parse failure.
const CONTEXT_BYTES: usize = 10;

/// Errors that can occur while parsing an expression.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum FrontendError {
    /// Parse failure with a bounded context window around the failure point.
    #[error("parse error: {context} [{origin}]")]
    Parse { context: String, origin: String },

    /// Input the grammar accepted but the tree builder rejected.
    #[error("parse error: {0}")]
    Malformed(String),
}

impl FrontendError {
    /// Build a parse error whose message shows up to [`CONTEXT_BYTES`] bytes
    /// on each side of `pos`, separated by an `--ERROR--` marker.
    pub fn parse_at(source: &str, pos: usize, origin: &str) -> Self {
        let bytes = source.as_bytes();
        let pos = pos.min(bytes.len());
        let start = pos.saturating_sub(CONTEXT_BYTES);
        let end = (pos + CONTEXT_BYTES).min(bytes.len());
        let before = String::from_utf8_lossy(&bytes[start..pos]);
        let after = String::from_utf8_lossy(&bytes[pos..end]);
        Self::Parse {
            context: format!("{} --ERROR-- {}", before, after),
            origin: origin.to_string(),
        }
    }
}
