//! # docformat
//!
//! Bidirectional conversion between a generic JSON document tree and
//! NewsML-G2 XML items.
//!
//! The generic side is a `Document` of nested `Block`s and flat
//! `Property` lists. The XML side covers the NewsML-G2 item family:
//! news items, concept items, planning items, assignments, lists and
//! packages. Conversion is driven by an `Options` table that maps
//! block types, qcodes, statuses and property names between the two
//! worlds, and both directions are expected to round-trip.
//!
//! ## Example
//!
//! ```rust,ignore
//! use docformat::{from_xml, to_xml, Options};
//!
//! let opts = Options::defaults();
//!
//! // Parse a NewsML-G2 item into the generic tree
//! let document = from_xml(&xml, &opts)?;
//!
//! // And serialize it back
//! let xml = to_xml(&document, &opts)?;
//! ```

#![warn(clippy::all)]

// Foundation
pub mod error;
pub mod limits;

// XML and document trees
pub mod document;
pub mod dom;

// Configuration
pub mod config;

// Normalization, sanitizing and block utilities
pub mod blockutil;
pub mod normalize;
pub mod sanitize;

// Item converters
pub mod convert;
pub mod newsml;

// Re-exports for convenience
pub use config::Options;
pub use convert::{from_xml, to_xml, to_xml_with_default};
pub use document::{check_for_empty_blocks, Block, Document, Property};
pub use error::{Error, Result};
pub use limits::{Depth, Limits};

/// Version of the docformat library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// NewsML-G2 item namespace
pub const NAR_NAMESPACE: &str = newsml::NAR_NAMESPACE;

/// Extension container namespace
pub const NEWSML_NAMESPACE: &str = newsml::NEWSML_NAMESPACE;

/// IDF content markup namespace
pub const IDF_NAMESPACE: &str = newsml::IDF_NAMESPACE;
