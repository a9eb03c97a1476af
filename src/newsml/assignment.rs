//! The assignment `<planning>` root. Assignments are the one item kind
//! without catalog references.

use crate::config::{Context, Options};
use crate::document::{Block, Document, Property};
use crate::dom::Element;
use crate::error::{Error, Result};
use crate::limits::Depth;
use crate::newsml::{self, object, Description, ExtProperty};

const ASSIGNMENT_TYPE: &str = "x-im/assignment";

/// Serializes a document as an assignment `<planning>` element.
pub(crate) fn assignment_from_doc(
    document: &Document,
    opts: &Options,
    depth: Depth,
) -> Result<Element> {
    let mut root = newsml::envelope("planning", &document.uuid, false);

    let mut item_class = None;
    let mut descriptions: Vec<Description> = Vec::new();
    let mut ext_properties = vec![
        ExtProperty::new("imext:type", &document.doc_type),
        ExtProperty::new("imext:status", &document.status),
    ];

    if let Some(created) = &document.created {
        ext_properties.push(ExtProperty::new(
            "nrpdate:created",
            newsml::format_timestamp(created),
        ));
    }
    if let Some(modified) = &document.modified {
        ext_properties.push(ExtProperty::new(
            "nrpdate:modified",
            newsml::format_timestamp(modified),
        ));
    }

    for property in &document.properties {
        if opts.has_property_exception(&property.name, "planning") {
            ext_properties.push(ExtProperty::new(&property.name, &property.value));
        }
    }

    let mut links = Vec::new();
    for link in &document.links {
        links.push(object::link_to_element(link, opts, depth)?);
    }

    for meta in &document.meta {
        if meta.block_type != ASSIGNMENT_TYPE {
            continue;
        }
        for (key, value) in &meta.data {
            match key.as_str() {
                "type" => item_class = Some(opts.assignment_type_to_qcode(value)?),
                "start" => {
                    ext_properties.push(ExtProperty::new("nrpdate:start", value.clone()))
                }
                "end" => ext_properties.push(ExtProperty::new("nrpdate:end", value.clone())),
                "description" => descriptions.push(Description {
                    role: "nrpdesc:intern".to_string(),
                    text: value.clone(),
                }),
                "publicDescription" => descriptions.push(Description {
                    role: "nrpdesc:extern".to_string(),
                    text: value.clone(),
                }),
                _ => {}
            }
        }
    }

    if let Some(item_class) = &item_class {
        root.push_element(newsml::qcode_element("itemClass", item_class));
    }
    if !document.title.is_empty() {
        let mut headline = Element::new("headline");
        headline.push_text(&document.title);
        root.push_element(headline);
    }
    for description in &descriptions {
        root.push_element(description.to_element());
    }
    for prop in &ext_properties {
        root.push_element(prop.to_element("planningExtProperty"));
    }
    if let Some(links) = newsml::newsml_container("links", links) {
        root.push_element(links);
    }

    Ok(root)
}

/// Decodes an assignment `<planning>` element into a document.
pub(crate) fn assignment_to_doc(el: &Element, opts: &Options, depth: Depth) -> Result<Document> {
    if el.name != "planning" {
        return Err(Error::MalformedDocument(format!(
            "expected planning root, got {}",
            el.name
        )));
    }

    let item_class = el
        .find_child("itemClass")
        .and_then(|c| c.attr("qcode"))
        .filter(|q| !q.is_empty())
        .ok_or_else(|| Error::RequiredArgument("missing ItemClass.QCode".to_string()))?;
    let subtype = opts.assignment_qcode_to_type(item_class)?;

    let mut document = Document {
        uuid: el.attr("guid").unwrap_or_default().to_string(),
        doc_type: ASSIGNMENT_TYPE.to_string(),
        title: el
            .find_child("headline")
            .map(Element::text)
            .unwrap_or_default(),
        ..Default::default()
    };

    let mut start_date = String::new();
    let mut end_date = String::new();
    for prop_el in el.find_children("planningExtProperty") {
        let prop = ExtProperty::from_element(prop_el);
        match prop.prop_type.as_str() {
            "imext:status" => document.status = prop.value.clone(),
            "nrpdate:created" => {
                document.created = Some(newsml::parse_rfc3339(&prop.value, "created")?)
            }
            "nrpdate:modified" => {
                document.modified = Some(newsml::parse_rfc3339(&prop.value, "modified")?)
            }
            "nrpdate:start" => start_date = prop.value.clone(),
            "nrpdate:end" => end_date = prop.value.clone(),
            _ => {
                if !prop.value.is_empty() {
                    document
                        .properties
                        .push(Property::new(&prop.prop_type, &prop.value));
                }
            }
        }
    }

    if let Some(links) = el.find_child("links") {
        document.links =
            object::blocks_from_links_container(links, opts, Context::Link, depth)?;
    }

    let mut type_meta = Block {
        block_type: ASSIGNMENT_TYPE.to_string(),
        ..Default::default()
    };
    type_meta.data.insert("type".to_string(), subtype);
    type_meta.data.insert("start".to_string(), start_date);
    type_meta.data.insert("end".to_string(), end_date);
    for description in el.find_children("description") {
        let description = Description::from_element(description);
        match description.role.as_str() {
            "nrpdesc:intern" => {
                type_meta
                    .data
                    .insert("description".to_string(), description.text);
            }
            "nrpdesc:extern" => {
                type_meta
                    .data
                    .insert("publicDescription".to_string(), description.text);
            }
            _ => {}
        }
    }
    document.meta.push(type_meta);

    Ok(document)
}
