//! The `<conceptItem>` root: authors, categories, events and other
//! concept documents.

use indexmap::IndexMap;

use crate::config::{Context, Options, DESTINATION_LINK, DESTINATION_META};
use crate::document::{Block, Document, Property};
use crate::dom::Element;
use crate::error::{Error, Result};
use crate::limits::Depth;
use crate::newsml::{
    self, concept::Concept, contentmeta::ContentMeta, data, itemmeta::ItemMeta, Description,
    ExtProperty,
};

const EVENT_DETAILS_TYPE: &str = "x-im/event-details";
const COVERAGE_TYPE: &str = "x-im/newscoverage";
const EVENT_TYPE: &str = "x-im/event";
const SECTION_REL: &str = "section";

/// Serializes a document as a `<conceptItem>` element.
pub(crate) fn concept_item_from_doc(
    document: &Document,
    opts: &Options,
    depth: Depth,
) -> Result<Element> {
    let mut root = newsml::envelope("conceptItem", &document.uuid, true);

    let holder = document
        .properties
        .iter()
        .filter(|p| p.name.eq_ignore_ascii_case("copyrightHolder"))
        .last();
    if let Some(holder) = holder {
        root.push_element(newsml::rights_info_element(&holder.value));
    }

    let mut item_meta = ItemMeta::from_doc(document, opts, depth)?;

    // Concept details are carried by the concept section instead.
    item_meta.ext_properties.retain(|p| {
        !matches!(
            p.prop_type.as_str(),
            "imext:uri" | "nrpdate:start" | "nrpdate:end" | "conceptid"
        )
    });
    item_meta.item_class = Some("cinat:concept".to_string());
    // The title is mapped to the concept name.
    item_meta.title = String::new();

    let mut content_meta = ContentMeta::from_doc(document, opts, depth)?;
    content_meta.metadata.retain(|object| {
        !opts.is_section_object(object.attr("type").unwrap_or_default(), "conceptitem")
    });

    let mut registration = String::new();
    let mut date_granularity = String::new();
    for meta in &document.meta {
        if meta.block_type != COVERAGE_TYPE && meta.block_type != EVENT_TYPE {
            continue;
        }
        if let Some(value) = meta.data.get("dateGranularity") {
            date_granularity = value.clone();
        }
        for (key, value) in &meta.data {
            match key.as_str() {
                "slug" => content_meta.slugline = value.clone(),
                "priority" => content_meta.urgency = value.clone(),
                "description" => content_meta.descriptions.push(Description {
                    role: "nrpdesc:intern".to_string(),
                    text: value.clone(),
                }),
                "publicDescription" => content_meta.descriptions.push(Description {
                    role: "nrpdesc:extern".to_string(),
                    text: value.clone(),
                }),
                "start" | "end" => {
                    let mut prop =
                        ExtProperty::new(format!("nrpdate:{key}"), value.clone());
                    prop.why = format!("nrpwhy:{date_granularity}");
                    item_meta.ext_properties.push(prop);
                }
                "registration" => registration = value.clone(),
                _ => {}
            }
        }
    }

    item_meta
        .ext_properties
        .retain(|p| !opts.is_section_property(&p.prop_type, "concept"));

    for link in &document.links {
        if link.rel == SECTION_REL {
            let mut prop = ExtProperty::new("nrp:sector", &link.value);
            prop.literal = link.title.clone();
            content_meta.ext_properties.push(prop);
        }
    }
    // Section and geo links live in contentMeta for concepts.
    item_meta.links.retain(|link| {
        link.attr("type") != Some("x-geo/point") && link.attr("rel") != Some(SECTION_REL)
    });

    let mut concept = Concept::from_doc(document, opts, depth)?;

    let registration_block = Block {
        data: IndexMap::from([("registration".to_string(), registration.clone())]),
        ..Default::default()
    };
    let raw = data::transform_data_to_raw(&registration_block, opts, Context::Meta, depth)?;
    if !registration.is_empty() {
        let mut found = false;
        for object in &mut concept.metadata {
            if object.attr("type") != Some(EVENT_DETAILS_TYPE) {
                continue;
            }
            let has_data = object.find_child("data").is_some();
            if has_data {
                if let Some(data_el) = object.child_elements_mut().find(|c| c.name == "data") {
                    data_el.children = raw.nodes.clone();
                }
            } else {
                let mut data_el = Element::new("data");
                data_el.children = raw.nodes.clone();
                object.push_element(data_el);
            }
            found = true;
            break;
        }
        if !found {
            let mut object = Element::new("object")
                .with_attr("id", "d1e25")
                .with_attr("type", EVENT_DETAILS_TYPE);
            let mut data_el = Element::new("data");
            data_el.children = raw.nodes;
            object.push_element(data_el);
            concept.metadata.push(object);
        }
    }

    root.push_element(item_meta.to_element());
    root.push_element(content_meta.to_element());
    root.push_element(concept.to_element());

    Ok(root)
}

/// Decodes a `<conceptItem>` element into a document.
pub(crate) fn concept_item_to_doc(
    el: &Element,
    opts: &Options,
    depth: Depth,
) -> Result<Document> {
    if el.name != "conceptItem" {
        return Err(Error::MalformedDocument(format!(
            "expected conceptItem root, got {}",
            el.name
        )));
    }
    let mut document = Document {
        uuid: el.attr("guid").unwrap_or_default().to_string(),
        ..Default::default()
    };

    if let Some(rights_info) = el.find_child("rightsInfo") {
        if let Some(holder) = newsml::rights_info_holder(rights_info) {
            if !holder.is_empty() {
                document
                    .properties
                    .push(Property::new("copyrightHolder", holder));
            }
        }
    }

    let mut meta_has_info = false;
    let mut meta_block = Block {
        block_type: EVENT_TYPE.to_string(),
        ..Default::default()
    };

    if let Some(item_meta) = el.find_child("itemMeta") {
        let im = ItemMeta::from_element(item_meta);
        im.apply_to_doc(&mut document, opts, depth)?;
        for prop in &im.ext_properties {
            match prop.prop_type.as_str() {
                "nrpdate:start" | "nrpdate:end" => {
                    meta_has_info = true;
                    let key = prop.prop_type.trim_start_matches("nrpdate:");
                    meta_block.data.insert(key.to_string(), prop.value.clone());
                    meta_block.data.insert(
                        "dateGranularity".to_string(),
                        prop.why.replace("nrpwhy:", ""),
                    );
                }
                "nrpdate:created" => {
                    document.created = Some(newsml::parse_rfc3339(&prop.value, "created")?)
                }
                "nrpdate:modified" => {
                    document.modified = Some(newsml::parse_rfc3339(&prop.value, "modified")?)
                }
                _ => {}
            }
        }
    }

    if let Some(content_meta) = el.find_child("contentMeta") {
        let cm = ContentMeta::from_element(content_meta);
        cm.apply_to_doc(&mut document, opts, depth)?;

        if !cm.urgency.is_empty() {
            meta_has_info = true;
            meta_block
                .data
                .insert("priority".to_string(), cm.urgency.clone());
        }
        if !cm.slugline.is_empty() {
            meta_has_info = true;
            meta_block
                .data
                .insert("slug".to_string(), cm.slugline.clone());
        }
        if !cm.descriptions.is_empty() {
            for description in &cm.descriptions {
                match description.role.as_str() {
                    "nrpdesc:intern" => {
                        meta_has_info = true;
                        meta_block
                            .data
                            .insert("description".to_string(), description.text.clone());
                    }
                    "nrpdesc:extern" => {
                        meta_has_info = true;
                        meta_block
                            .data
                            .insert("publicDescription".to_string(), description.text.clone());
                    }
                    _ => {}
                }
            }
            document.properties.retain(|p| p.name != "description");
        }
        for prop in &cm.ext_properties {
            if prop.prop_type != "nrp:sector" {
                continue;
            }
            document.links.push(Block {
                uri: format!("nrp://section/{}", prop.literal.to_lowercase()),
                title: prop.literal.clone(),
                rel: SECTION_REL.to_string(),
                value: prop.value.clone(),
                ..Default::default()
            });
            document.properties.retain(|p| p.name != "nrp:sector");
            break;
        }
    }

    if let Some(concept) = el.find_child("concept") {
        let concept = Concept::from_element(concept);
        concept.apply_to_doc(&mut document, opts, depth)?;
        for object in &concept.metadata {
            if object.attr("type") != Some(EVENT_DETAILS_TYPE) {
                continue;
            }
            let Some(data_el) = object.find_child("data") else {
                continue;
            };
            let (data, blocks) = data::transform_data_from_raw(
                EVENT_DETAILS_TYPE,
                &data_el.children,
                opts,
                Context::Meta,
                depth,
            )?;
            if let Some(registration) = data.get("registration") {
                meta_has_info = true;
                meta_block
                    .data
                    .insert("registration".to_string(), registration.clone());
            }
            match opts.element_destination(EVENT_DETAILS_TYPE) {
                DESTINATION_LINK => meta_block.links.extend(blocks),
                DESTINATION_META => meta_block.meta.extend(blocks),
                other => {
                    return Err(Error::InvalidArgument(format!(
                        "invalid destination configured: {other}"
                    )))
                }
            }
        }
    }

    document.properties.retain(|p| p.name != "sector");

    if meta_has_info {
        document.meta.push(meta_block);
    }

    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn depth() -> Depth {
        Depth::default()
    }

    fn event() -> Document {
        let mut details = Block {
            id: "ed-1".to_string(),
            block_type: EVENT_DETAILS_TYPE.to_string(),
            ..Default::default()
        };
        details
            .data
            .insert("registration".to_string(), "required".to_string());
        let mut coverage = Block {
            block_type: EVENT_TYPE.to_string(),
            ..Default::default()
        };
        coverage
            .data
            .insert("dateGranularity".to_string(), "date".to_string());
        coverage
            .data
            .insert("start".to_string(), "2022-06-01".to_string());
        coverage
            .data
            .insert("slug".to_string(), "midsummer".to_string());
        Document {
            uuid: "5b8d1b33-0de4-450c-a0ef-9b0f20b0a33c".to_string(),
            doc_type: "x-im/event".to_string(),
            title: "Midsummer concert".to_string(),
            uri: "im://event/midsummer".to_string(),
            meta: vec![details, coverage],
            ..Default::default()
        }
    }

    #[test]
    fn item_class_is_always_concept() {
        let opts = Options::defaults();
        let el = concept_item_from_doc(&event(), &opts, depth()).unwrap();
        let item_class = el
            .find_child("itemMeta")
            .and_then(|im| im.find_child("itemClass"))
            .unwrap();
        assert_eq!(item_class.attr("qcode"), Some("cinat:concept"));
        // The title moves to the concept name.
        assert!(el.find_child("itemMeta").unwrap().find_child("title").is_none());
        let name = el
            .find_child("concept")
            .and_then(|c| c.find_child("name"))
            .unwrap();
        assert_eq!(name.text(), "Midsummer concert");
    }

    #[test]
    fn event_dates_become_ext_properties() {
        let opts = Options::defaults();
        let el = concept_item_from_doc(&event(), &opts, depth()).unwrap();
        let item_meta = el.find_child("itemMeta").unwrap();
        let start = item_meta
            .find_children("itemMetaExtProperty")
            .find(|p| p.attr("type") == Some("nrpdate:start"))
            .unwrap();
        assert_eq!(start.attr("value"), Some("2022-06-01"));
        assert_eq!(start.attr("why"), Some("nrpwhy:date"));
        let slugline = el
            .find_child("contentMeta")
            .and_then(|cm| cm.find_child("slugline"))
            .unwrap();
        assert_eq!(slugline.text(), "midsummer");
    }

    #[test]
    fn registration_round_trips_through_event_details() {
        let opts = Options::defaults();
        let el = concept_item_from_doc(&event(), &opts, depth()).unwrap();

        let document = concept_item_to_doc(&el, &opts, depth()).unwrap();
        let meta = document
            .meta
            .iter()
            .find(|b| b.block_type == EVENT_TYPE && !b.data.is_empty())
            .unwrap();
        assert_eq!(
            meta.data.get("registration").map(String::as_str),
            Some("required")
        );
        assert_eq!(meta.data.get("start").map(String::as_str), Some("2022-06-01"));
        assert_eq!(
            meta.data.get("dateGranularity").map(String::as_str),
            Some("date")
        );
        assert_eq!(meta.data.get("slug").map(String::as_str), Some("midsummer"));
    }

    #[test]
    fn section_links_travel_as_sector_properties() {
        let mut document = event();
        document.links.push(Block {
            rel: SECTION_REL.to_string(),
            title: "Sport".to_string(),
            value: "4".to_string(),
            ..Default::default()
        });
        let opts = Options::defaults();
        let el = concept_item_from_doc(&document, &opts, depth()).unwrap();
        let sector = el
            .find_child("contentMeta")
            .unwrap()
            .find_children("contentMetaExtProperty")
            .find(|p| p.attr("type") == Some("nrp:sector"))
            .unwrap();
        assert_eq!(sector.attr("literal"), Some("Sport"));
        assert_eq!(sector.attr("value"), Some("4"));

        let decoded = concept_item_to_doc(&el, &opts, depth()).unwrap();
        let link = decoded.links.iter().find(|l| l.rel == SECTION_REL).unwrap();
        assert_eq!(link.uri, "nrp://section/sport");
        assert_eq!(link.title, "Sport");
        assert!(!decoded.properties.iter().any(|p| p.name == "nrp:sector"));
    }

    #[test]
    fn bad_created_date_is_an_error() {
        let mut el = newsml::envelope("conceptItem", "u", true);
        let mut item_meta = Element::new("itemMeta");
        item_meta.push_element(
            Element::new("itemMetaExtProperty")
                .with_attr("type", "nrpdate:created")
                .with_attr("value", "not a date"),
        );
        el.push_element(item_meta);
        let opts = Options::defaults();
        let err = concept_item_to_doc(&el, &opts, depth()).unwrap_err();
        assert!(err.to_string().contains("failed to parse created"));
    }
}
