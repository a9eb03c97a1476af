//! Content document model
//!
//! A [`Document`] is a format-neutral tree of [`Block`]s with
//! document-level [`Property`] entries. Blocks carry their own nested
//! `content`, `meta` and `links` collections, so the same structure
//! serves article bodies, metadata annotations and relations alike.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A format-neutral content document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique ID for the document, a random v4 or URI-derived v5 UUID
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uuid: String,
    /// Content type of the document
    #[serde(default, skip_serializing_if = "String::is_empty", rename = "type")]
    pub doc_type: String,
    /// Identifies the document in a more readable way than the UUID
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uri: String,
    /// Browseable location of the document, if any
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    /// Document title, often used as the headline
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    /// Path on which the document can be exposed on a website
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    /// Initial creation time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    /// Modified time as presented to end users
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    /// Published time as presented to end users
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<DateTime<Utc>>,
    /// End of the publication window, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unpublished: Option<DateTime<Utc>>,
    /// Content blocks, what gets rendered when the document is viewed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<Block>,
    /// Metadata blocks
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub meta: Vec<Block>,
    /// Links to other resources and entities
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Block>,
    /// Header-like document-level properties, mainly a bucket for
    /// values that must survive conversion to and from other formats
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<Property>,
    /// Name of the source of the document
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
    /// IETF language tag, e.g. "en", "sv-SE"
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub language: String,
    /// Free-form document status, e.g. "draft" or "withheld"
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,
    /// Provider of the document
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub provider: String,
}

/// A document-level name/value property with optional parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Property {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub parameters: IndexMap<String, String>,
}

impl Property {
    /// A property with no parameters
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            parameters: IndexMap::new(),
        }
    }

    /// Builder-style parameter setter
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Get a parameter value
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(|s| s.as_str())
    }
}

/// A node in a document tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Block ID
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// References another document
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uuid: String,
    /// References another entity
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uri: String,
    /// Browseable URL for the block
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    /// Type of the block
    #[serde(default, skip_serializing_if = "String::is_empty", rename = "type")]
    pub block_type: String,
    /// Title or headline of the block
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    /// Block data, keyed values with document-order preserved
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub data: IndexMap<String, String>,
    /// Relationship to the document or parent entity
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub rel: String,
    /// Name of the block, an alternative to `rel` when relationship
    /// does not fit
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Primitive value carried by the block
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
    /// Content type of the linked entity when it differs from the
    /// block type
    #[serde(default, skip_serializing_if = "String::is_empty", rename = "contentType")]
    pub content_type: String,
    /// Nested links
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Block>,
    /// Nested content blocks
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<Block>,
    /// Nested metadata blocks
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub meta: Vec<Block>,
    /// Role of the block
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub role: String,
}

impl Block {
    /// A block with only its type set
    pub fn of_type(block_type: impl Into<String>) -> Self {
        Self {
            block_type: block_type.into(),
            ..Default::default()
        }
    }

    /// True when every field holds its default value
    pub fn is_empty(&self) -> bool {
        *self == Block::default()
    }
}

impl Document {
    /// True when every field holds its default value
    pub fn is_empty(&self) -> bool {
        *self == Document::default()
    }

    /// Parse a document from its JSON representation
    pub fn from_json(input: &str) -> Result<Self> {
        let document: Document = serde_json::from_str(input)?;
        Ok(document)
    }

    /// Serialize the document to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Sort document properties stably by name
    pub fn sort_properties(&mut self) {
        self.properties.sort_by(|a, b| a.name.cmp(&b.name));
    }
}

/// Reject documents that are entirely empty or contain empty blocks.
///
/// An empty block anywhere in the tree is reported with its path, e.g.
/// `meta/0/content/2`.
pub fn check_for_empty_blocks(document: &Document) -> Result<()> {
    if document.is_empty() {
        return Err(Error::empty_doc());
    }
    for (kind, blocks) in [
        ("meta", &document.meta),
        ("links", &document.links),
        ("content", &document.content),
    ] {
        for (i, block) in blocks.iter().enumerate() {
            check_block_recursive(block, kind, i, "")?;
        }
    }
    Ok(())
}

fn check_block_recursive(block: &Block, kind: &str, idx: usize, parent_path: &str) -> Result<()> {
    let path = if parent_path.is_empty() {
        format!("{}/{}", kind, idx)
    } else {
        format!("{}/{}/{}", parent_path, kind, idx)
    };

    if block.is_empty() {
        return Err(Error::empty_block(&path));
    }

    for (kind, blocks) in [
        ("meta", &block.meta),
        ("links", &block.links),
        ("content", &block.content),
    ] {
        for (i, child) in blocks.iter().enumerate() {
            check_block_recursive(child, kind, i, &path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article() -> Document {
        Document {
            uuid: "9d1dcfa7-9d3d-4b09-8df3-f8e918726c16".to_string(),
            doc_type: "x-im/article".to_string(),
            title: "Test article".to_string(),
            content: vec![Block {
                id: "p1".to_string(),
                block_type: "x-im/paragraph".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_json_round_trip() {
        let doc = article();
        let json = doc.to_json().unwrap();
        let back = Document::from_json(&json).unwrap();
        assert_eq!(doc, back);
    }

    #[test]
    fn test_empty_fields_omitted_from_json() {
        let json = article().to_json().unwrap();
        assert!(!json.contains("\"uri\""));
        assert!(!json.contains("\"links\""));
        assert!(json.contains("\"type\": \"x-im/article\""));
    }

    #[test]
    fn test_check_for_empty_blocks_accepts_populated_tree() {
        assert!(check_for_empty_blocks(&article()).is_ok());
    }

    #[test]
    fn test_check_for_empty_blocks_rejects_empty_document() {
        let err = check_for_empty_blocks(&Document::default()).unwrap_err();
        assert!(matches!(err, Error::MalformedDocument(_)));
    }

    #[test]
    fn test_check_for_empty_blocks_reports_path() {
        let mut doc = article();
        doc.meta.push(Block {
            id: "m".to_string(),
            content: vec![Block::default()],
            ..Default::default()
        });
        let err = check_for_empty_blocks(&doc).unwrap_err();
        assert!(err.to_string().contains("meta/0/content/0"), "{}", err);
    }

    #[test]
    fn test_block_is_empty_ignores_no_fields() {
        let mut block = Block::default();
        assert!(block.is_empty());
        block.role = "heading".to_string();
        assert!(!block.is_empty());
    }

    #[test]
    fn test_property_parameters() {
        let prop = Property::new("imext:haspublishedversion", "true")
            .with_parameter("creator", "system");
        assert_eq!(prop.parameter("creator"), Some("system"));
        assert_eq!(prop.parameter("missing"), None);
    }

    #[test]
    fn test_sort_properties_is_stable() {
        let mut doc = Document::default();
        doc.properties = vec![
            Property::new("b", "1"),
            Property::new("a", "first"),
            Property::new("a", "second"),
        ];
        doc.sort_properties();
        assert_eq!(doc.properties[0].value, "first");
        assert_eq!(doc.properties[1].value, "second");
        assert_eq!(doc.properties[2].name, "b");
    }
}
