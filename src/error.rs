//! Error types for docformat
//!
//! This module defines all error types used throughout the library.
//! The taxonomy separates malformed input, invalid argument values,
//! missing required arguments and configuration lookup gaps, so callers
//! can tell "bad document" apart from "bad configuration".

use thiserror::Error;

/// Result type alias using the docformat Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for document conversion operations
#[derive(Error, Debug)]
pub enum Error {
    /// Structurally broken input: empty documents/blocks, unsupported
    /// root or document types
    #[error("malformed input: {0}")]
    MalformedDocument(String),

    /// A value was present but unusable (bad UUID, bad date, invalid
    /// XML inside a data value, invalid data key)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A required value was absent (link without rel, missing item
    /// class code)
    #[error("required argument missing: {0}")]
    RequiredArgument(String),

    /// A configuration table has no entry for the requested type or
    /// code. Distinct from malformed input: this indicates a gap in the
    /// configuration, not bad data.
    #[error("missing mapping: {0}")]
    MissingMapping(String),

    /// XML parsing or serialization error
    #[error("XML error: {0}")]
    Xml(String),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Nesting depth or size limit exceeded
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// URL parsing error
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Empty document error
    pub fn empty_doc() -> Self {
        Error::MalformedDocument("empty document".to_string())
    }

    /// Empty block error, with the path to the offending block
    pub fn empty_block(path: &str) -> Self {
        Error::MalformedDocument(format!("empty block: {}", path))
    }

    /// Empty item error for a named document kind
    pub fn empty_item(kind: &str) -> Self {
        Error::MalformedDocument(format!("empty {}", kind))
    }

    /// Unsupported root or document type error
    pub fn unsupported_type(name: &str) -> Self {
        Error::MalformedDocument(format!("unsupported type {:?}", name))
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::Xml(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::empty_doc();
        assert_eq!(err.to_string(), "malformed input: empty document");

        let err = Error::unsupported_type("rumor");
        assert_eq!(err.to_string(), "malformed input: unsupported type \"rumor\"");

        let err = Error::MissingMapping("qcode for doctype x-im/unknown".to_string());
        assert!(err.to_string().starts_with("missing mapping:"));
    }

    #[test]
    fn test_missing_mapping_is_not_malformed() {
        let err = Error::MissingMapping("x".to_string());
        assert!(!matches!(err, Error::MalformedDocument(_)));
    }

    #[test]
    fn test_empty_block_path() {
        let err = Error::empty_block("meta/0/links/2");
        assert_eq!(err.to_string(), "malformed input: empty block: meta/0/links/2");
    }
}
