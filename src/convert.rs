//! Top-level conversion entry points.
//!
//! `to_xml` routes a document to the item assembler matching its type,
//! `from_xml` sniffs the root tag of an XML document and routes it to
//! the matching decoder. Both directions refuse structurally empty
//! input before any item logic runs.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::config::Options;
use crate::document::{check_for_empty_blocks, Document};
use crate::dom::{self, Element};
use crate::error::{Error, Result};
use crate::limits::{Depth, Limits};
use crate::newsml::{assignment, conceptitem, listpackage, newsitem, planning};
use crate::normalize;

/// How far into the input the root tag must appear.
const PEEK_SIZE: usize = 1024;

/// Document types rendered as `<newsItem>`.
const NEWS_ITEM_TYPES: [&str; 4] = ["x-im/article", "x-im/image", "x-im/graphic", "x-im/pdf"];

/// Concept vocabulary rendered as `<conceptItem>`.
const CONCEPT_ITEM_TYPES: [&str; 11] = [
    "x-im/author",
    "x-im/category",
    "x-im/channel",
    "x-im/content-profile",
    "x-im/event",
    "x-im/organisation",
    "x-im/person",
    "x-im/place",
    "x-im/section",
    "x-im/story",
    "x-im/topic",
];

/// Serializes a document to NewsML-G2 XML, routing on the document
/// type. Unknown types are an error.
pub fn to_xml(document: &Document, opts: &Options) -> Result<String> {
    to_xml_with_default(document, opts, |document, _| {
        Err(Error::unsupported_type(&document.doc_type))
    })
}

/// Serializes a document to NewsML-G2 XML, handing document types
/// without a built-in assembler to the supplied fallback.
pub fn to_xml_with_default<F>(document: &Document, opts: &Options, default_case: F) -> Result<String>
where
    F: FnOnce(&Document, &Options) -> Result<Element>,
{
    if *document == Document::default() {
        return Err(Error::empty_doc());
    }
    check_for_empty_blocks(document)?;

    let depth = Depth::default();
    let root = match document.doc_type.as_str() {
        t if NEWS_ITEM_TYPES.contains(&t) => newsitem::news_item_from_doc(document, opts, depth)?,
        t if CONCEPT_ITEM_TYPES.contains(&t) => {
            conceptitem::concept_item_from_doc(document, opts, depth)?
        }
        "x-im/newscoverage" => planning::planning_item_from_doc(document, opts, depth)?,
        "x-im/assignment" => assignment::assignment_from_doc(document, opts, depth)?,
        "x-im/package" => listpackage::package_from_doc(document, opts, depth)?,
        "x-im/list" => listpackage::list_from_doc(document, opts, depth)?,
        _ => default_case(document, opts)?,
    };
    Ok(root.to_xml())
}

/// Parses a NewsML-G2 XML document, routing on its root tag. The XML
/// is normalized before decoding, and the decoded properties are
/// sorted by name to make the output deterministic. Stricter checks
/// live in [`crate::normalize`] for callers that want them.
pub fn from_xml(input: &str, opts: &Options) -> Result<Document> {
    Limits::default().check_xml_size(input.len())?;

    let tag = peek_root_tag(input.as_bytes())?;
    let mut root = dom::parse(input)
        .map_err(|err| Error::MalformedDocument(format!("failed to parse document: {err}")))?;

    normalize::fix_newsml_namespaces(&mut root)?;

    let depth = Depth::default();
    let mut document = match tag.as_str() {
        "newsItem" => newsitem::news_item_to_doc(&root, opts, depth)?,
        "conceptItem" => conceptitem::concept_item_to_doc(&root, opts, depth)?,
        "planningItem" => planning::planning_item_to_doc(&root, opts, depth)?,
        "planning" => assignment::assignment_to_doc(&root, opts, depth)?,
        "list" => listpackage::list_to_doc(&root, opts, depth)?,
        "package" => listpackage::package_to_doc(&root, opts, depth)?,
        other => return Err(Error::unsupported_type(other)),
    };

    document.properties.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(document)
}

/// Streams events over the head of the input until the root start tag
/// shows up. The input is not fully parsed here.
fn peek_root_tag(input: &[u8]) -> Result<String> {
    let head = &input[..input.len().min(PEEK_SIZE)];
    let mut reader = Reader::from_reader(head);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(start)) | Ok(Event::Empty(start)) => {
                return Ok(
                    String::from_utf8_lossy(start.name().local_name().as_ref()).into_owned()
                );
            }
            Ok(Event::Eof) => {
                return Err(Error::MalformedDocument(format!(
                    "root tag was not found within the first {PEEK_SIZE} bytes of the document"
                )));
            }
            Ok(_) => {}
            Err(err) => {
                // A tag cut off by the peek window reads as a syntax
                // error, which still means no root tag in the window.
                if head.len() == PEEK_SIZE {
                    return Err(Error::MalformedDocument(format!(
                        "root tag was not found within the first {PEEK_SIZE} bytes of the document"
                    )));
                }
                return Err(Error::Xml(err.to_string()));
            }
        }
        buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Block;
    use chrono::{TimeZone, Utc};

    fn article() -> Document {
        let mut para = Block {
            block_type: "x-im/paragraph".to_string(),
            ..Default::default()
        };
        para.data
            .insert("text".to_string(), "A paragraph.".to_string());
        Document {
            uuid: "9442b824-6b41-4dbb-89fe-54c1b4cdb399".to_string(),
            doc_type: "x-im/article".to_string(),
            title: "Roundabout opens".to_string(),
            language: "sv-SE".to_string(),
            created: Some(Utc.with_ymd_and_hms(2022, 6, 1, 7, 0, 0).unwrap()),
            modified: Some(Utc.with_ymd_and_hms(2022, 6, 1, 8, 0, 0).unwrap()),
            content: vec![para],
            ..Default::default()
        }
    }

    #[test]
    fn article_goes_through_xml_and_back() {
        let opts = Options::defaults();
        let xml = to_xml(&article(), &opts).unwrap();
        assert!(xml.starts_with("<newsItem"));

        let document = from_xml(&xml, &opts).unwrap();
        assert_eq!(document.uuid, "9442b824-6b41-4dbb-89fe-54c1b4cdb399");
        assert_eq!(document.doc_type, "x-im/article");
        assert_eq!(document.title, "Roundabout opens");
        assert_eq!(document.content.len(), 1);
    }

    #[test]
    fn empty_document_is_rejected() {
        let opts = Options::defaults();
        assert!(to_xml(&Document::default(), &opts).is_err());
    }

    #[test]
    fn empty_block_is_reported_with_its_path() {
        let mut document = article();
        document.meta.push(Block::default());
        let opts = Options::defaults();
        let err = to_xml(&document, &opts).unwrap_err();
        assert!(err.to_string().contains("meta/0"));
    }

    #[test]
    fn unknown_document_type_is_an_error() {
        let mut document = article();
        document.doc_type = "x-im/unsupported".to_string();
        let opts = Options::defaults();
        let err = to_xml(&document, &opts).unwrap_err();
        assert!(err.to_string().contains("x-im/unsupported"));
    }

    #[test]
    fn default_handler_covers_custom_types() {
        let mut document = article();
        document.doc_type = "x-corp/review".to_string();
        document.content.clear();
        let opts = Options::defaults();
        let xml = to_xml_with_default(&document, &opts, |document, _| {
            Ok(Element::new("review").with_attr("guid", &document.uuid))
        })
        .unwrap();
        assert!(xml.starts_with("<review"));
    }

    #[test]
    fn root_tag_must_appear_early() {
        let padding = format!("<!-- {} --><newsItem/>", "x".repeat(2048));
        let opts = Options::defaults();
        let err = from_xml(&padding, &opts).unwrap_err();
        assert!(err.to_string().contains("root tag was not found"));
    }

    #[test]
    fn unsupported_root_tag_is_an_error() {
        let opts = Options::defaults();
        let err = from_xml("<html></html>", &opts).unwrap_err();
        assert!(err.to_string().contains("unsupported type"));
    }

    #[test]
    fn decoded_properties_are_sorted_by_name() {
        let opts = Options::defaults();
        let xml = to_xml(&article(), &opts).unwrap();
        let document = from_xml(&xml, &opts).unwrap();
        let names: Vec<&str> = document.properties.iter().map(|p| p.name.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }
}
