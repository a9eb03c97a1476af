//! Validation and cleanup passes over documents and raw item XML.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::config::{Options, BLOCK_NODE, TAG_NODE, TYPE_NODE};
use crate::document::{Block, Document};
use crate::dom::Element;
use crate::error::{Error, Result};
use crate::newsml::{IDF_NAMESPACE, NEWSML_NAMESPACE};

/// Visits every block in the document: content first, then meta, then
/// links, recursing depth first.
pub fn walk_document<F>(document: &mut Document, visitor: &mut F) -> Result<()>
where
    F: FnMut(&mut Block) -> Result<()>,
{
    walk_blocks(&mut document.content, visitor)?;
    walk_blocks(&mut document.meta, visitor)?;
    walk_blocks(&mut document.links, visitor)?;
    Ok(())
}

fn walk_blocks<F>(blocks: &mut [Block], visitor: &mut F) -> Result<()>
where
    F: FnMut(&mut Block) -> Result<()>,
{
    for block in blocks {
        visitor(block)?;
        walk_blocks(&mut block.content, visitor)?;
        walk_blocks(&mut block.meta, visitor)?;
        walk_blocks(&mut block.links, visitor)?;
    }
    Ok(())
}

/// Visits every element below the root. The visitor receives the
/// element, its parent tag and its slash-separated path.
pub fn walk_elements<F>(root: &mut Element, visitor: &mut F) -> Result<()>
where
    F: FnMut(&mut Element, &str, &str) -> Result<()>,
{
    let path = format!("/{}", root.name);
    walk_children(root, &path, visitor)
}

fn walk_children<F>(node: &mut Element, path: &str, visitor: &mut F) -> Result<()>
where
    F: FnMut(&mut Element, &str, &str) -> Result<()>,
{
    let parent = node.name.clone();
    for child in node.child_elements_mut() {
        let child_path = format!("{}/{}", path, child.name);
        visitor(child, &parent, &child_path)?;
        walk_children(child, &child_path, visitor)?;
    }
    Ok(())
}

static UUID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .unwrap()
});

fn check_uuid(uuid: &str) -> Result<()> {
    if uuid.is_empty() || UUID_PATTERN.is_match(uuid) {
        Ok(())
    } else {
        Err(Error::InvalidArgument("invalid uuid".to_string()))
    }
}

/// Validates the uuid of every block in the document. Empty uuids are
/// allowed.
pub fn validate_document_uuids(document: &mut Document) -> Result<()> {
    walk_document(document, &mut |block| {
        check_uuid(&block.uuid).map_err(|err| {
            Error::InvalidArgument(format!(
                "uuid error {}[{}]: {}",
                block.block_type, block.uuid, err
            ))
        })
    })
}

/// Structural validation of a generic document: required root fields,
/// named properties, well-formed uuid/uri/url values on the document
/// and on every block.
pub fn validate_document(document: &mut Document) -> Result<()> {
    if document.uuid.is_empty() {
        return Err(Error::RequiredArgument("document uuid".to_string()));
    }
    if !UUID_PATTERN.is_match(&document.uuid) {
        return Err(Error::InvalidArgument(format!(
            "invalid document uuid: {}",
            document.uuid
        )));
    }
    if document.doc_type.is_empty() {
        return Err(Error::RequiredArgument("document type".to_string()));
    }
    if document.created.is_none() {
        return Err(Error::RequiredArgument("document created".to_string()));
    }
    check_location(&document.uri, "document uri")?;
    check_location(&document.url, "document url")?;
    for property in &document.properties {
        if property.name.is_empty() {
            return Err(Error::RequiredArgument("property name".to_string()));
        }
    }
    walk_document(document, &mut |block| {
        check_uuid(&block.uuid).map_err(|_| {
            Error::InvalidArgument(format!("invalid block uuid: {}", block.uuid))
        })?;
        check_location(&block.uri, "block uri")?;
        check_location(&block.url, "block url")
    })
}

fn check_location(value: &str, what: &str) -> Result<()> {
    if value.is_empty() {
        return Ok(());
    }
    Url::parse(value)
        .map_err(|err| Error::InvalidArgument(format!("invalid {what} {value}: {err}")))?;
    Ok(())
}

/// Validates the root date fields and every configured block data date.
pub fn validate_document_dates(document: &mut Document, opts: &Options) -> Result<()> {
    let root_dates = [
        ("created", &document.created),
        ("modified", &document.modified),
        ("published", &document.published),
        ("unpublished", &document.unpublished),
    ];
    for (name, value) in root_dates {
        if !opts.is_date(BLOCK_NODE, name) {
            continue;
        }
        if let Some(ts) = value {
            validate_date(opts, BLOCK_NODE, name, &crate::newsml::format_timestamp(ts))?;
        }
    }

    walk_document(document, &mut |block| {
        for (key, value) in &block.data {
            if opts.is_date(BLOCK_NODE, key) {
                validate_date(opts, BLOCK_NODE, key, value).map_err(|err| {
                    Error::InvalidArgument(format!(
                        "error in block data {}: {}",
                        block.name, err
                    ))
                })?;
            }
        }
        Ok(())
    })
}

/// Validates configured date elements in raw item XML. Tag-configured
/// dates are read from element text, type-configured dates from the
/// configured attribute.
pub fn validate_newsml_dates(root: &mut Element, opts: &Options) -> Result<()> {
    walk_elements(root, &mut |element, _parent, path| {
        let outcome = if opts.is_date(TAG_NODE, &element.name) {
            validate_date(opts, TAG_NODE, &element.name, &element.text())
        } else {
            let type_attr = element.attr("type").unwrap_or_default().to_string();
            if !type_attr.is_empty() && opts.is_date(TYPE_NODE, &type_attr) {
                let value_attr = opts.date_attribute(TYPE_NODE, &type_attr);
                match element.attr(value_attr) {
                    Some(value) => {
                        let value = value.to_string();
                        validate_date(opts, TYPE_NODE, &type_attr, &value)
                    }
                    None => Err(Error::InvalidArgument(format!(
                        "no attribute found for {value_attr}"
                    ))),
                }
            } else {
                Ok(())
            }
        };
        outcome.map_err(|err| Error::InvalidArgument(format!("error {path}: {err}")))
    })
}

/// Validates every uuid attribute in raw item XML, plus `<uuid>` tags
/// inside data payloads. Empty values are allowed.
pub fn validate_newsml_uuids(root: &mut Element) -> Result<()> {
    walk_elements(root, &mut |element, _parent, path| {
        let value = match element.attr("uuid") {
            Some(attr) => attr.to_string(),
            None if element.name == "uuid" => element.text(),
            None => return Ok(()),
        };
        check_uuid(&value).map_err(|err| {
            Error::InvalidArgument(format!("uuid error {path}[{value}]: {err}"))
        })
    })
}

/// Adds missing namespaces to `<links>`, `<object>`, `<metadata>` and
/// `<idf>` elements, drops empty link uuid attributes and rejects links
/// without a rel attribute.
pub fn fix_newsml_namespaces(root: &mut Element) -> Result<()> {
    walk_elements(root, &mut |element, parent, path| {
        match element.name.as_str() {
            "link" => {
                if element.attr("uuid") == Some("") {
                    element.remove_attr("uuid");
                }
                if element.attr("rel").is_none() {
                    return Err(Error::RequiredArgument(format!("{path}[@rel]")));
                }
            }
            "links" | "object" | "metadata" => {
                if parent == "itemMeta" || parent == "contentMeta" {
                    let missing = element.attr("xmlns").map(str::is_empty).unwrap_or(true);
                    if missing {
                        element.set_attr("xmlns", NEWSML_NAMESPACE);
                    }
                }
            }
            "idf" => {
                let missing = element.attr("xmlns").map(str::is_empty).unwrap_or(true);
                if missing {
                    element.set_attr("xmlns", IDF_NAMESPACE);
                }
            }
            _ => {}
        }
        Ok(())
    })
}

static OFFSET_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(Z|[+-][0-1][0-5]:[0-5][0-9])$").unwrap());

/// Validates one date value against the configured format for its
/// group and name. Unknown formats are treated as regex patterns.
pub fn validate_date(opts: &Options, group: &str, name: &str, date: &str) -> Result<()> {
    let format = opts.date_format(group, name);

    if date.is_empty() && opts.date_allow_blank(group, name) {
        return Ok(());
    }

    let failure = match format {
        "RFC3339" | "RFC3339Nano" => {
            if !OFFSET_SUFFIX.is_match(date) {
                Some(format!("time \"{date}\" UTC offset is missing or invalid"))
            } else {
                chrono::DateTime::parse_from_rfc3339(date)
                    .err()
                    .map(|err| err.to_string())
            }
        }
        pattern => {
            let valid = Regex::new(pattern).map_err(|_| {
                Error::InvalidArgument(format!("invalid date format: {pattern}"))
            })?;
            if valid.is_match(date) {
                None
            } else {
                return Err(Error::InvalidArgument(format!(
                    "invalid date {name} {date}"
                )));
            }
        }
    };

    if let Some(reason) = failure {
        if opts.date_allow_string(group, name) {
            return Ok(());
        }
        return Err(Error::InvalidArgument(format!(
            "invalid date {name} {date}: {reason}"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DateElementOptions;
    use crate::dom;

    #[test]
    fn walker_visits_nested_blocks() {
        let mut document = Document::default();
        document.content.push(Block {
            block_type: "a".to_string(),
            meta: vec![Block {
                block_type: "b".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        });
        document.links.push(Block {
            block_type: "c".to_string(),
            ..Default::default()
        });
        let mut seen = Vec::new();
        walk_document(&mut document, &mut |block| {
            seen.push(block.block_type.clone());
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec!["a", "b", "c"]);
    }

    #[test]
    fn structural_validation_requires_root_fields() {
        let mut document = Document {
            uuid: "1b2778b4-74f6-46a5-a54c-e76bcf783e4c".to_string(),
            doc_type: "x-im/article".to_string(),
            ..Default::default()
        };
        let err = validate_document(&mut document).unwrap_err();
        assert!(err.to_string().contains("created"));

        document.created = Some(chrono::Utc::now());
        assert!(validate_document(&mut document).is_ok());

        document.url = "::not a url::".to_string();
        assert!(validate_document(&mut document).is_err());
    }

    #[test]
    fn bad_block_uuid_is_reported_with_its_type() {
        let mut document = Document::default();
        document.links.push(Block {
            block_type: "x-im/channel".to_string(),
            uuid: "not-a-uuid".to_string(),
            ..Default::default()
        });
        let err = validate_document_uuids(&mut document).unwrap_err();
        assert!(err.to_string().contains("uuid error x-im/channel[not-a-uuid]"));
    }

    #[test]
    fn empty_uuids_are_allowed() {
        let mut document = Document::default();
        document.links.push(Block {
            block_type: "x-im/channel".to_string(),
            ..Default::default()
        });
        assert!(validate_document_uuids(&mut document).is_ok());
    }

    #[test]
    fn link_without_rel_is_rejected() {
        let mut root = dom::parse(
            "<newsItem><itemMeta><links><link uuid=\"\" type=\"x-im/channel\"/></links></itemMeta></newsItem>",
        )
        .unwrap();
        let err = fix_newsml_namespaces(&mut root).unwrap_err();
        assert!(err
            .to_string()
            .contains("/newsItem/itemMeta/links/link[@rel]"));
    }

    #[test]
    fn namespaces_are_added_where_missing() {
        let mut root = dom::parse(
            "<newsItem><itemMeta><links><link rel=\"channel\" uuid=\"\"/></links></itemMeta>\
             <contentSet><inlineXML><idf/></inlineXML></contentSet></newsItem>",
        )
        .unwrap();
        fix_newsml_namespaces(&mut root).unwrap();
        let links = root
            .find_child("itemMeta")
            .and_then(|im| im.find_child("links"))
            .unwrap();
        assert_eq!(links.attr("xmlns"), Some(NEWSML_NAMESPACE));
        let link = links.find_child("link").unwrap();
        assert!(link.attr("uuid").is_none());
        let idf = root
            .find_child("contentSet")
            .and_then(|cs| cs.find_child("inlineXML"))
            .and_then(|ix| ix.find_child("idf"))
            .unwrap();
        assert_eq!(idf.attr("xmlns"), Some(IDF_NAMESPACE));
    }

    #[test]
    fn newsml_uuid_tags_are_checked() {
        let mut root = dom::parse(
            "<newsItem><itemMeta><links><link rel=\"related-geo\">\
             <data><uuid>totally wrong</uuid></data></link></links></itemMeta></newsItem>",
        )
        .unwrap();
        let err = validate_newsml_uuids(&mut root).unwrap_err();
        assert!(err.to_string().contains("uuid error"));
    }

    #[test]
    fn configured_tag_dates_are_validated() {
        let opts = Options::defaults();
        let mut root = dom::parse(
            "<newsItem><itemMeta><firstCreated>2022-03-01T08:00:00Z</firstCreated></itemMeta></newsItem>",
        )
        .unwrap();
        assert!(validate_newsml_dates(&mut root, &opts).is_ok());

        let mut bad = dom::parse(
            "<newsItem><itemMeta><firstCreated>2022-03-01 08:00</firstCreated></itemMeta></newsItem>",
        )
        .unwrap();
        let err = validate_newsml_dates(&mut bad, &opts).unwrap_err();
        assert!(err.to_string().contains("/newsItem/itemMeta/firstCreated"));
    }

    #[test]
    fn allow_string_tolerates_legacy_values() {
        let mut opts = Options::defaults();
        if let Some(tags) = opts.date_elements.get_mut(crate::config::TAG_NODE) {
            tags.insert(
                "firstCreated".to_string(),
                DateElementOptions {
                    format: Some("RFC3339".to_string()),
                    allow_string: true,
                    ..Default::default()
                },
            );
        }
        assert!(validate_date(&opts, TAG_NODE, "firstCreated", "sometime in march").is_ok());
    }

    #[test]
    fn pattern_formats_match_whole_values() {
        let mut opts = Options::defaults();
        opts.date_elements
            .entry(TAG_NODE.to_string())
            .or_default()
            .insert(
                "pubdate".to_string(),
                DateElementOptions {
                    format: Some(r"^\d{4}-\d{2}-\d{2}$".to_string()),
                    ..Default::default()
                },
            );
        assert!(validate_date(&opts, TAG_NODE, "pubdate", "2022-06-01").is_ok());
        assert!(validate_date(&opts, TAG_NODE, "pubdate", "yesterday").is_err());
    }
}
