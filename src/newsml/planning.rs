//! The `<planningItem>` root and its news coverage set.

use crate::config::{Context, Options};
use crate::document::{Block, Document, Property};
use crate::dom::Element;
use crate::error::{Error, Result};
use crate::limits::Depth;
use crate::newsml::{
    self, contentmeta::ContentMeta, itemmeta::ItemMeta, object, Description, ExtProperty,
};

const COVERAGE_TYPE: &str = "x-im/newscoverage";
const ASSIGNMENT_TYPE: &str = "x-im/assignment";
const CHANNEL_TYPE: &str = "x-im/imchn";
const ARTICLE_SOURCE_TYPE: &str = "x-im/articlesource";

/// One `<newsCoverage>` entry: an id and the assignment links.
#[derive(Debug, Default)]
struct NewsCoverage {
    id: String,
    links: Vec<Element>,
}

impl NewsCoverage {
    fn to_element(&self) -> Element {
        let mut el = Element::new("newsCoverage");
        el.set_attr_opt("id", &self.id);
        if let Some(links) = newsml::newsml_container("links", self.links.clone()) {
            el.push_element(links);
        }
        el
    }

    fn from_element(el: &Element) -> Self {
        let mut nc = NewsCoverage {
            id: el.attr("id").unwrap_or_default().to_string(),
            ..Default::default()
        };
        if let Some(links) = el.find_child("links") {
            nc.links = links.find_children("link").cloned().collect();
        }
        nc
    }
}

fn coverage_set_from_doc(
    document: &Document,
    opts: &Options,
    depth: Depth,
) -> Result<Vec<NewsCoverage>> {
    let mut set = Vec::new();
    for block in &document.links {
        if block.block_type != ASSIGNMENT_TYPE {
            continue;
        }
        let mut nc = NewsCoverage {
            id: block.id.clone(),
            ..Default::default()
        };
        for link in &block.links {
            if link.block_type == CHANNEL_TYPE || link.block_type == ARTICLE_SOURCE_TYPE {
                continue;
            }
            nc.links.push(object::link_to_element(link, opts, depth)?);
        }
        set.push(nc);
    }
    Ok(set)
}

/// Serializes a document as a `<planningItem>` element.
pub(crate) fn planning_item_from_doc(
    document: &Document,
    opts: &Options,
    depth: Depth,
) -> Result<Element> {
    let mut root = newsml::envelope("planningItem", &document.uuid, true);

    let holder = document
        .properties
        .iter()
        .filter(|p| p.name.eq_ignore_ascii_case("copyrightholder"))
        .last();
    if let Some(holder) = holder {
        root.push_element(newsml::rights_info_element(&holder.value));
    }

    let mut item_meta = ItemMeta::from_doc(document, opts, depth)?;
    item_meta.item_class = Some("plinat:newscoverage".to_string());

    // Planning dates are truncated to whole seconds; the full precision
    // travels in the imext ext properties instead.
    if let Some(created) = &document.created {
        item_meta.first_created = newsml::format_timestamp_seconds(created);
        item_meta.add_ext_property("imext:created", newsml::format_timestamp(created));
    }
    if let Some(modified) = &document.modified {
        item_meta.version_created = newsml::format_timestamp_seconds(modified);
        item_meta.add_ext_property("imext:modified", newsml::format_timestamp(modified));
    }

    for prop in &mut item_meta.ext_properties {
        if let Some(fixed) = opts.property_name_to_xml("planning", &prop.prop_type) {
            prop.prop_type = fixed.to_string();
        }
    }
    item_meta
        .ext_properties
        .retain(|p| !opts.is_section_property(&p.prop_type, "planning"));

    // Assignments are carried by the news coverage set.
    item_meta
        .links
        .retain(|link| link.attr("type") != Some(ASSIGNMENT_TYPE));

    let mut content_meta = ContentMeta::from_doc(document, opts, depth)?;
    content_meta.metadata.clear();

    for meta in &document.meta {
        if meta.block_type != COVERAGE_TYPE {
            continue;
        }
        let granularity = meta
            .data
            .get("dateGranularity")
            .cloned()
            .unwrap_or_default();
        for (key, value) in &meta.data {
            match key.as_str() {
                "slug" => content_meta.slugline = value.clone(),
                "priority" => content_meta.urgency = value.clone(),
                "start" | "end" => {
                    let mut prop =
                        ExtProperty::new(format!("nrpdate:{key}"), value.clone());
                    prop.why = format!("nrpwhy:{granularity}");
                    item_meta.ext_properties.push(prop);
                }
                "description" => content_meta.descriptions.push(Description {
                    role: "nrpdesc:intern".to_string(),
                    text: value.clone(),
                }),
                "publicDescription" => content_meta.descriptions.push(Description {
                    role: "nrpdesc:extern".to_string(),
                    text: value.clone(),
                }),
                _ => {}
            }
        }
    }

    let mut coverage_set = coverage_set_from_doc(document, opts, depth)?;
    for coverage in &mut coverage_set {
        coverage.links.retain(|link| {
            let link_type = link.attr("type").unwrap_or_default();
            !opts.link_exceptions.iter().any(|le| {
                le.block_type == link_type && le.section.iter().any(|s| s != "planning")
            })
        });
    }

    root.push_element(item_meta.to_element());
    root.push_element(content_meta.to_element());
    let mut set_el = Element::new("newsCoverageSet");
    for coverage in &coverage_set {
        set_el.push_element(coverage.to_element());
    }
    root.push_element(set_el);

    Ok(root)
}

/// Decodes a `<planningItem>` element into a document.
pub(crate) fn planning_item_to_doc(
    el: &Element,
    opts: &Options,
    depth: Depth,
) -> Result<Document> {
    if el.name != "planningItem" {
        return Err(Error::MalformedDocument(format!(
            "expected planningItem root, got {}",
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
                    .push(Property::new("copyrightholder", holder));
            }
        }
    }

    let item_meta = el.find_child("itemMeta").map(ItemMeta::from_element);
    if let Some(im) = &item_meta {
        im.apply_to_doc(&mut document, opts, depth)?;
    }
    let content_meta = el
        .find_child("contentMeta")
        .map(ContentMeta::from_element)
        .unwrap_or_default();
    content_meta.apply_to_doc(&mut document, opts, depth)?;

    // These properties are carried by the newscoverage meta block.
    let mapped = [
        "nrpdate:start",
        "nrpdate:end",
        "nrpdate:created",
        "nrpdate:modified",
        "description",
        "slugline",
        "urgency",
    ];
    document
        .properties
        .retain(|p| !mapped.iter().any(|m| m.eq_ignore_ascii_case(&p.name)));

    let mut meta = Block {
        block_type: COVERAGE_TYPE.to_string(),
        ..Default::default()
    };
    meta.data
        .insert("priority".to_string(), content_meta.urgency.clone());
    meta.data
        .insert("slug".to_string(), content_meta.slugline.clone());
    for description in &content_meta.descriptions {
        match description.role.as_str() {
            "nrpdesc:intern" => {
                meta.data
                    .insert("description".to_string(), description.text.clone());
            }
            "nrpdesc:extern" => {
                meta.data
                    .insert("publicDescription".to_string(), description.text.clone());
            }
            _ => {}
        }
    }

    if let Some(im) = &item_meta {
        for prop in &im.ext_properties {
            match prop.prop_type.as_str() {
                "nrpdate:start" | "nrpdate:end" => {
                    let key = prop.prop_type.trim_start_matches("nrpdate:");
                    meta.data.insert(key.to_string(), prop.value.clone());
                    meta.data.insert(
                        "dateGranularity".to_string(),
                        prop.why
                            .strip_prefix("nrpwhy:")
                            .unwrap_or(&prop.why)
                            .to_string(),
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

    document.meta.push(meta);

    if let Some(set_el) = el.find_child("newsCoverageSet") {
        for (i, coverage_el) in set_el.find_children("newsCoverage").enumerate() {
            let coverage = NewsCoverage::from_element(coverage_el);
            let mut block = Block {
                block_type: ASSIGNMENT_TYPE.to_string(),
                id: coverage.id.clone(),
                ..Default::default()
            };
            for link in &coverage.links {
                let child = object::block_from_link(link, opts, Context::Link, depth)
                    .map_err(|err| {
                        Error::MalformedDocument(format!(
                            "failed to convert newscoverage {i}: {err}"
                        ))
                    })?;
                block.links.push(child);
            }
            document.links.push(block);
        }
    }

    Ok(document)
}
