//! Link and object trees under `itemMeta`, `contentMeta` and data
//! payloads.

use indexmap::IndexMap;

use crate::config::{Context, DataType, Options};
use crate::document::Block;
use crate::dom::Element;
use crate::error::Result;
use crate::limits::Depth;
use crate::newsml::content;
use crate::newsml::data::{self, Consumed};

const FLAGS_TYPE: &str = "x-im/flags";
const CHANNEL_TYPE: &str = "x-im/imchn";
const GENERIC_PROPERTY_TYPE: &str = "x-im/generic-property";

/// Builds a `<link>` element from a link block. Content children are
/// not carried by links.
pub(crate) fn link_to_element(block: &Block, opts: &Options, depth: Depth) -> Result<Element> {
    let mut el = Element::new("link");
    el.set_attr_opt("rel", &block.rel);
    el.set_attr_opt("role", &block.role);
    el.set_attr_opt("title", &block.title);
    el.set_attr_opt("type", &block.block_type);
    el.set_attr_opt("uri", &block.uri);
    el.set_attr_opt("url", &block.url);
    el.set_attr_opt("uuid", &block.uuid);

    let mut consumed = Consumed::None;
    if !block.data.is_empty() {
        let raw = data::transform_data_to_raw(block, opts, Context::Link, depth)?;
        let mut data_el = Element::new("data");
        data_el.children = raw.nodes;
        el.push_element(data_el);
        consumed = raw.consumed;
    }

    if consumed != Consumed::Links {
        let mut links = Vec::new();
        for child in &block.links {
            links.push(link_to_element(child, opts, depth.descend()?)?);
        }
        if !links.is_empty() {
            let mut container = Element::new("links");
            for link in links {
                container.push_element(link);
            }
            el.push_element(container);
        }
    }

    if consumed != Consumed::Meta {
        let option = opts.block_options(&block.block_type, Context::Link);
        let mut objects = Vec::new();
        for meta in &block.meta {
            if option.has_flags && meta.block_type == FLAGS_TYPE {
                continue;
            }
            objects.push(object_to_element(meta, opts, Context::Link, depth.descend()?)?);
        }
        if !objects.is_empty() {
            let mut container = Element::new("meta");
            for object in objects {
                container.push_element(object);
            }
            el.push_element(container);
        }
    }

    Ok(el)
}

/// Builds an `<object>` element from a meta block.
pub(crate) fn object_to_element(
    block: &Block,
    opts: &Options,
    context: Context,
    depth: Depth,
) -> Result<Element> {
    let mut el = Element::new("object");
    el.set_attr_opt("id", &block.id);
    el.set_attr_opt("type", &block.block_type);
    el.set_attr_opt("title", &block.title);
    el.set_attr_opt("uuid", &block.uuid);

    let mut consumed = Consumed::None;
    let mut data_el = Element::new("data");
    if !block.content.is_empty() {
        data_el.push_element(content::idf_text_element(&block.content, opts, depth.descend()?)?);
    }
    if !block.data.is_empty() {
        let raw = data::transform_data_to_raw(block, opts, context, depth)?;
        data_el.children.extend(raw.nodes);
        consumed = raw.consumed;
    }
    if !data_el.children.is_empty() {
        el.push_element(data_el);
    }

    if consumed != Consumed::Links {
        let mut links = Vec::new();
        for child in &block.links {
            if child.block_type == CHANNEL_TYPE {
                continue;
            }
            links.push(link_to_element(child, opts, depth.descend()?)?);
        }
        if !links.is_empty() {
            let mut container = Element::new("links");
            for link in links {
                container.push_element(link);
            }
            el.push_element(container);
        }
    }

    let mut properties = Vec::new();
    let mut objects = Vec::new();
    if consumed != Consumed::Meta {
        for meta in &block.meta {
            // Blocks matched by a conversion rule are already part of
            // the raw data payload.
            if data::conversion_rule_applies(meta, opts) {
                continue;
            }
            if meta.block_type == FLAGS_TYPE {
                continue;
            }
            if meta.block_type == GENERIC_PROPERTY_TYPE && !meta.data.is_empty() {
                for (name, value) in &meta.data {
                    properties.push(
                        Element::new("property")
                            .with_attr("name", name)
                            .with_attr("value", value),
                    );
                }
                continue;
            }
            objects.push(object_to_element(meta, opts, context, depth.descend()?)?);
        }
    }
    if !properties.is_empty() {
        let mut container = Element::new("properties");
        for property in properties {
            container.push_element(property);
        }
        el.push_element(container);
    }
    if !objects.is_empty() {
        let mut container = Element::new("meta");
        for object in objects {
            container.push_element(object);
        }
        el.push_element(container);
    }

    Ok(el)
}

/// Decodes a `<link>` element into a link block.
pub(crate) fn block_from_link(
    el: &Element,
    opts: &Options,
    context: Context,
    depth: Depth,
) -> Result<Block> {
    let mut block = Block {
        title: el.attr("title").unwrap_or_default().to_string(),
        block_type: el.attr("type").unwrap_or_default().to_string(),
        uri: el.attr("uri").unwrap_or_default().to_string(),
        url: el.attr("url").unwrap_or_default().to_string(),
        uuid: el.attr("uuid").unwrap_or_default().to_string(),
        rel: el.attr("rel").unwrap_or_default().to_string(),
        role: el.attr("role").unwrap_or_default().to_string(),
        ..Default::default()
    };

    if let Some(data_el) = el.find_child("data") {
        let (values, children) = data::transform_data_from_raw(
            &block.block_type,
            &data_el.children,
            opts,
            context,
            depth,
        )?;
        block.data = values;
        data::route_blocks(&mut block, children, opts)?;
    }

    if let Some(links) = el.find_child("links") {
        for link in links.find_children("link") {
            block
                .links
                .push(block_from_link(link, opts, context, depth.descend()?)?);
        }
    }

    if let Some(meta) = el.find_child("meta") {
        for object in meta.find_children("object") {
            block
                .meta
                .push(block_from_object(object, opts, context, depth.descend()?)?);
        }
    }

    Ok(block)
}

/// Decodes an `<object>` element into a meta block.
pub(crate) fn block_from_object(
    el: &Element,
    opts: &Options,
    context: Context,
    depth: Depth,
) -> Result<Block> {
    let mut block = Block {
        block_type: el.attr("type").unwrap_or_default().to_string(),
        id: el.attr("id").unwrap_or_default().to_string(),
        title: el.attr("title").unwrap_or_default().to_string(),
        uuid: el.attr("uuid").unwrap_or_default().to_string(),
        ..Default::default()
    };

    if let Some(links) = el.find_child("links") {
        for link in links.find_children("link") {
            block
                .links
                .push(block_from_link(link, opts, context, depth.descend()?)?);
        }
    }

    if let Some(data_el) = el.find_child("data") {
        let is_blob = opts
            .data_conversion_for_type(&block.block_type)
            .map(|dc| dc.datatype == DataType::Blob)
            .unwrap_or(false);
        if is_blob {
            let mut values = IndexMap::new();
            values.insert("format".to_string(), "xml".to_string());
            values.insert(
                "text".to_string(),
                data::nodes_to_string(&data_el.children),
            );
            block.meta.push(Block {
                data: values,
                ..Default::default()
            });
        } else {
            block.content =
                content::idf_content_from_nodes(&data_el.children, opts, depth.descend()?)?;
            let (values, children) = data::transform_data_from_raw(
                &block.block_type,
                &data_el.children,
                opts,
                context,
                depth,
            )?;
            block.data = values;
            data::route_blocks(&mut block, children, opts)?;
        }
    }

    if let Some(properties) = el.find_child("properties") {
        let mut values = IndexMap::new();
        for property in properties.find_children("property") {
            let name = property.attr("name").unwrap_or_default().to_string();
            if !name.is_empty() {
                values.insert(name, property.attr("value").unwrap_or_default().to_string());
            }
        }
        block.meta.push(Block {
            block_type: GENERIC_PROPERTY_TYPE.to_string(),
            data: values,
            ..Default::default()
        });
    }

    if let Some(meta) = el.find_child("meta") {
        for object in meta.find_children("object") {
            block
                .meta
                .push(block_from_object(object, opts, context, depth.descend()?)?);
        }
    }

    Ok(block)
}

/// Decodes every `<link>` child of a `<links>` container.
pub(crate) fn blocks_from_links_container(
    el: &Element,
    opts: &Options,
    context: Context,
    depth: Depth,
) -> Result<Vec<Block>> {
    let mut blocks = Vec::new();
    for link in el.find_children("link") {
        blocks.push(block_from_link(link, opts, context, depth)?);
    }
    Ok(blocks)
}
