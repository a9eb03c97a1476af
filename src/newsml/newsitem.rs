//! The `<newsItem>` root: articles, images, graphics and PDFs.

use crate::config::Options;
use crate::document::Document;
use crate::dom::Element;
use crate::error::{Error, Result};
use crate::limits::Depth;
use crate::newsml::{self, content, contentmeta::ContentMeta, itemmeta::ItemMeta};

const ARTICLE_TYPE: &str = "x-im/article";

/// Serializes a document as a `<newsItem>` element.
pub(crate) fn news_item_from_doc(
    document: &Document,
    opts: &Options,
    depth: Depth,
) -> Result<Element> {
    let mut root = newsml::envelope("newsItem", &document.uuid, true);

    let item_meta = ItemMeta::from_doc(document, opts, depth)?;
    root.push_element(item_meta.to_element());

    let content_meta = ContentMeta::from_doc(document, opts, depth)?;
    if !content_meta.is_empty() {
        root.push_element(content_meta.to_element());
    }

    // Only articles carry body content.
    if document.doc_type == ARTICLE_TYPE {
        root.push_element(content::content_set_element(document, opts, depth)?);
    }

    Ok(root)
}

/// Decodes a `<newsItem>` element into a document.
pub(crate) fn news_item_to_doc(el: &Element, opts: &Options, depth: Depth) -> Result<Document> {
    if el.name != "newsItem" {
        return Err(Error::MalformedDocument(format!(
            "expected newsItem root, got {}",
            el.name
        )));
    }
    let mut document = Document {
        uuid: el.attr("guid").unwrap_or_default().to_string(),
        ..Default::default()
    };

    if let Some(item_meta) = el.find_child("itemMeta") {
        ItemMeta::from_element(item_meta).apply_to_doc(&mut document, opts, depth)?;
    }
    if let Some(content_meta) = el.find_child("contentMeta") {
        ContentMeta::from_element(content_meta).apply_to_doc(&mut document, opts, depth)?;
    }
    if let Some(content_set) = el.find_child("contentSet") {
        content::decode_content_set(content_set, &mut document, opts, depth)?;
    }

    Ok(document)
}
