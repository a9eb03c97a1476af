//! The IDF content set: ordered body markup under
//! `<contentSet><inlineXML><idf>`.

use indexmap::IndexMap;

use crate::config::{Context, Options};
use crate::document::{Block, Document};
use crate::dom::{self, Element, Node};
use crate::error::Result;
use crate::limits::Depth;
use crate::newsml::data::{self, Consumed};
use crate::newsml::IDF_NAMESPACE;
use crate::sanitize;

const ORDERED_LIST: &str = "ordered-list";
const PARAGRAPH_TYPE: &str = "x-im/paragraph";
const FLAGS_TYPE: &str = "x-im/flags";
const GENERIC_PROPERTY_TYPE: &str = "x-im/generic-property";

/// Builds the `<contentSet>` element for a document's content list.
pub(crate) fn content_set_element(
    document: &Document,
    opts: &Options,
    depth: Depth,
) -> Result<Element> {
    let mut group = Element::new("group").with_attr("type", "body");
    group.children = content_nodes_from_blocks(&document.content, opts, depth)?;

    let mut idf = Element::new("idf")
        .with_attr("xmlns", IDF_NAMESPACE)
        .with_attr("dir", "ltr");
    idf.set_attr_opt("xml:lang", &document.language);
    idf.push_element(group);

    let mut inline = Element::new("inlineXML");
    inline.push_element(idf);
    let mut content_set = Element::new("contentSet");
    content_set.push_element(inline);
    Ok(content_set)
}

/// Serializes content blocks into group children: `<element>` for text
/// element types, `<object>` for everything else.
pub(crate) fn content_nodes_from_blocks(
    blocks: &[Block],
    opts: &Options,
    depth: Depth,
) -> Result<Vec<Node>> {
    let mut nodes = Vec::new();
    for block in blocks {
        let el = if opts.is_element_type(&block.block_type) {
            element_from_block(block, opts)?
        } else {
            content_object_to_element(block, opts, depth)?
        };
        nodes.push(Node::Element(el));
    }
    Ok(nodes)
}

/// Wraps serialized content blocks in a `<text format="idf">` element,
/// the form embedded in object data payloads.
pub(crate) fn idf_text_element(blocks: &[Block], opts: &Options, depth: Depth) -> Result<Element> {
    let mut text = Element::new("text").with_attr("format", "idf");
    text.children = content_nodes_from_blocks(blocks, opts, depth)?;
    Ok(text)
}

/// Builds an `<element>` from a text element block.
pub(crate) fn element_from_block(block: &Block, opts: &Options) -> Result<Element> {
    let element_type = opts.element_type_to_xml(&block.block_type);
    let mut el = Element::new("element");
    el.set_attr_opt("id", &block.id);
    el.set_attr("type", &element_type);
    if let Some(format) = block.data.get("format") {
        el.set_attr_opt("format", format);
    }
    if let Some(variation) = block.data.get("variation") {
        el.set_attr_opt("variation", variation);
    }

    if element_type.contains(ORDERED_LIST) && !block.content.is_empty() {
        for item in &block.content {
            if let Some(text) = item.data.get("text") {
                let mut list_item = Element::new("list-item");
                list_item.children = dom::parse_fragment(text)?;
                el.push_element(list_item);
            }
        }
    } else if let Some(text) = block.data.get("text") {
        el.children = dom::parse_fragment(text)?;
    }

    Ok(el)
}

/// Decodes an `<element>` into a text element block.
pub(crate) fn block_from_element(el: &Element, opts: &Options) -> Result<Block> {
    let xml_type = el.attr("type").unwrap_or_default();
    let mut block = Block {
        block_type: opts.element_type_from_xml(xml_type),
        id: el.attr("id").unwrap_or_default().to_string(),
        ..Default::default()
    };

    let inner = el.inner_xml();
    if !inner.is_empty() {
        if !xml_type.contains(ORDERED_LIST) {
            let text = sanitize::sanitize_html(&inner, opts)?;
            block.data.insert("text".to_string(), text);
        } else {
            block.content = list_items_to_blocks(el, opts)?;
        }
    }
    block
        .data
        .insert("format".to_string(), "html".to_string());
    if let Some(variation) = el.attr("variation") {
        if !variation.is_empty() {
            block
                .data
                .insert("variation".to_string(), variation.to_string());
        }
    }

    Ok(block)
}

/// Each `<list-item>` becomes a paragraph block.
fn list_items_to_blocks(el: &Element, opts: &Options) -> Result<Vec<Block>> {
    let mut blocks = Vec::new();
    for item in el.find_children("list-item") {
        let mut data = IndexMap::new();
        data.insert(
            "text".to_string(),
            sanitize::sanitize_html(&item.inner_xml(), opts)?,
        );
        data.insert("format".to_string(), "html".to_string());
        blocks.push(Block {
            block_type: PARAGRAPH_TYPE.to_string(),
            data,
            ..Default::default()
        });
    }
    Ok(blocks)
}

/// Serializes a top-level content object. Content children fold into
/// the data payload as a `<text format="idf">` element.
pub(crate) fn content_object_to_element(
    block: &Block,
    opts: &Options,
    depth: Depth,
) -> Result<Element> {
    // At the top level, content folds into the data payload as IDF
    // markup instead of a content child collection.
    let mut flat = block.clone();
    flat.content = Vec::new();
    let mut el = content_child_to_element(&flat, "object", opts, depth)?;
    if !block.content.is_empty() {
        let text = idf_text_element(&block.content, opts, depth.descend()?)?;
        let data_pos = el
            .children
            .iter()
            .position(|n| matches!(n, Node::Element(c) if c.name == "data"));
        match data_pos {
            Some(i) => {
                if let Node::Element(data_el) = &mut el.children[i] {
                    data_el.children.insert(0, Node::Element(text));
                }
            }
            None => {
                let mut data_el = Element::new("data");
                data_el.push_element(text);
                el.children.insert(0, Node::Element(data_el));
            }
        }
    }
    Ok(el)
}

/// Serializes a nested content object or link. `tag` is `object` or
/// `link` depending on the containing collection.
pub(crate) fn content_child_to_element(
    block: &Block,
    tag: &str,
    opts: &Options,
    depth: Depth,
) -> Result<Element> {
    let mut el = Element::new(tag);
    el.set_attr_opt("id", &block.id);
    el.set_attr_opt("uuid", &block.uuid);
    el.set_attr_opt("uri", &block.uri);
    el.set_attr_opt("url", &block.url);
    el.set_attr_opt("type", &block.block_type);
    el.set_attr_opt("title", &block.title);
    el.set_attr_opt("name", &block.name);
    el.set_attr_opt("value", &block.value);
    el.set_attr_opt("rel", &block.rel);
    el.set_attr_opt("contenttype", &block.content_type);

    let mut consumed = Consumed::None;
    if !block.data.is_empty() {
        let raw = data::transform_data_to_raw(block, opts, Context::Content, depth)?;
        let mut data_el = Element::new("data");
        data_el.children = raw.nodes;
        el.push_element(data_el);
        consumed = raw.consumed;
    }

    if !block.content.is_empty() {
        let mut container = Element::new("content");
        for child in &block.content {
            container.push_element(content_child_to_element(
                child,
                "object",
                opts,
                depth.descend()?,
            )?);
        }
        el.push_element(container);
    }

    if consumed != Consumed::Links && !block.links.is_empty() {
        let mut container = Element::new("links");
        for link in &block.links {
            container.push_element(content_child_to_element(
                link,
                "link",
                opts,
                depth.descend()?,
            )?);
        }
        el.push_element(container);
    }

    let mut properties = Vec::new();
    let mut objects = Vec::new();
    if consumed != Consumed::Meta {
        for meta in &block.meta {
            if meta.block_type == FLAGS_TYPE {
                continue;
            }
            if meta.block_type == GENERIC_PROPERTY_TYPE {
                for (name, value) in &meta.data {
                    properties.push(
                        Element::new("property")
                            .with_attr("name", name)
                            .with_attr("value", value),
                    );
                }
                continue;
            }
            objects.push(content_child_to_element(meta, "object", opts, depth.descend()?)?);
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

/// Decodes a top-level group `<object>`. The element type is mapped
/// through the element-type table and data payload text markers are
/// cleaned up.
pub(crate) fn block_from_group_object(
    el: &Element,
    opts: &Options,
    depth: Depth,
) -> Result<Block> {
    let mut block = Block {
        id: el.attr("id").unwrap_or_default().to_string(),
        url: el.attr("url").unwrap_or_default().to_string(),
        uri: el.attr("uri").unwrap_or_default().to_string(),
        title: el.attr("title").unwrap_or_default().to_string(),
        uuid: el.attr("uuid").unwrap_or_default().to_string(),
        block_type: opts.element_type_from_xml(el.attr("type").unwrap_or_default()),
        ..Default::default()
    };

    if let Some(data_el) = el.find_child("data") {
        block.content = idf_content_from_nodes(&data_el.children, opts, depth.descend()?)?;

        let (mut values, children) = data::transform_data_from_raw(
            &block.block_type,
            &data_el.children,
            opts,
            Context::Content,
            depth,
        )?;
        for key in ["text", "format", "variation"] {
            if values.get(key).map(String::is_empty).unwrap_or(false) {
                values.shift_remove(key);
            }
        }
        block.data = values;
        data::route_blocks(&mut block, children, opts)?;
    }

    if let Some(links) = el.find_child("links") {
        block.links = content_children_to_blocks(links, "link", opts, depth.descend()?)?;
    }
    if let Some(properties) = el.find_child("properties") {
        block.meta.push(properties_to_block(properties, opts, depth)?);
    }
    if let Some(content) = el.find_child("content") {
        block.content = content_children_to_blocks(content, "object", opts, depth.descend()?)?;
    }
    if let Some(meta) = el.find_child("meta") {
        block
            .meta
            .extend(content_children_to_blocks(meta, "object", opts, depth.descend()?)?);
    }

    Ok(block)
}

/// Decodes nested content objects or links. Types are carried through
/// unmapped at this level.
fn content_children_to_blocks(
    container: &Element,
    tag: &str,
    opts: &Options,
    depth: Depth,
) -> Result<Vec<Block>> {
    let mut blocks = Vec::new();
    for el in container.find_children(tag) {
        let mut block = Block {
            id: el.attr("id").unwrap_or_default().to_string(),
            title: el.attr("title").unwrap_or_default().to_string(),
            block_type: el.attr("type").unwrap_or_default().to_string(),
            uri: el.attr("uri").unwrap_or_default().to_string(),
            url: el.attr("url").unwrap_or_default().to_string(),
            uuid: el.attr("uuid").unwrap_or_default().to_string(),
            rel: el.attr("rel").unwrap_or_default().to_string(),
            name: el.attr("name").unwrap_or_default().to_string(),
            content_type: el.attr("contenttype").unwrap_or_default().to_string(),
            value: el.attr("value").unwrap_or_default().to_string(),
            ..Default::default()
        };

        if let Some(data_el) = el.find_child("data") {
            let (values, children) = data::transform_data_from_raw(
                &block.block_type,
                &data_el.children,
                opts,
                Context::Content,
                depth,
            )?;
            block.data = values;
            data::route_blocks(&mut block, children, opts)?;
        }
        if let Some(properties) = el.find_child("properties") {
            block.meta.push(properties_to_block(properties, opts, depth)?);
        }
        if let Some(links) = el.find_child("links") {
            block.links = content_children_to_blocks(links, "link", opts, depth.descend()?)?;
        }
        if let Some(content) = el.find_child("content") {
            block.content =
                content_children_to_blocks(content, "object", opts, depth.descend()?)?;
        }
        if let Some(meta) = el.find_child("meta") {
            block.meta =
                content_children_to_blocks(meta, "object", opts, depth.descend()?)?;
        }

        blocks.push(block);
    }
    Ok(blocks)
}

fn properties_to_block(properties: &Element, _opts: &Options, _depth: Depth) -> Result<Block> {
    let mut values = IndexMap::new();
    for property in properties.find_children("property") {
        let name = property.attr("name").unwrap_or_default().to_string();
        if !name.is_empty() {
            values.insert(name, property.attr("value").unwrap_or_default().to_string());
        }
    }
    Ok(Block {
        block_type: GENERIC_PROPERTY_TYPE.to_string(),
        data: values,
        ..Default::default()
    })
}

/// Finds a `<text format="idf">` element among raw data nodes and
/// decodes its children as content blocks.
pub(crate) fn idf_content_from_nodes(
    nodes: &[Node],
    opts: &Options,
    depth: Depth,
) -> Result<Vec<Block>> {
    for node in nodes {
        let Some(el) = node.as_element() else { continue };
        if let Some(text) =
            el.find_first(&|e| e.name == "text" && e.attr("format") == Some("idf"))
        {
            return blocks_from_group_children(&text.children, opts, depth);
        }
    }
    Ok(Vec::new())
}

/// Decodes group children: `<element>` and `<object>` nodes in order.
pub(crate) fn blocks_from_group_children(
    nodes: &[Node],
    opts: &Options,
    depth: Depth,
) -> Result<Vec<Block>> {
    let mut blocks = Vec::new();
    for node in nodes {
        let Some(el) = node.as_element() else { continue };
        match el.name.as_str() {
            "element" => blocks.push(block_from_element(el, opts)?),
            "object" => blocks.push(block_from_group_object(el, opts, depth.descend()?)?),
            _ => {}
        }
    }
    Ok(blocks)
}

/// Decodes a `<contentSet>` into the document's content list.
pub(crate) fn decode_content_set(
    el: &Element,
    document: &mut Document,
    opts: &Options,
    depth: Depth,
) -> Result<()> {
    let Some(inline) = el.find_child("inlineXML") else {
        return Ok(());
    };
    let Some(idf) = inline.find_child("idf") else {
        return Ok(());
    };
    if let Some(lang) = idf.attr("xml:lang") {
        if !lang.is_empty() {
            document.language = lang.to_string();
        }
    }
    for group in idf.find_children("group") {
        let blocks = blocks_from_group_children(&group.children, opts, depth)?;
        document.content.extend(blocks);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn depth() -> Depth {
        Depth::default()
    }

    #[test]
    fn paragraph_blocks_become_elements() {
        let mut block = Block {
            block_type: "x-im/paragraph".to_string(),
            id: "p1".to_string(),
            ..Default::default()
        };
        block
            .data
            .insert("text".to_string(), "Hello <em>world</em>".to_string());
        let opts = Options::defaults();
        let el = element_from_block(&block, &opts).unwrap();
        assert_eq!(el.attr("type"), Some("body"));
        assert_eq!(el.inner_xml(), "Hello <em>world</em>");

        let back = block_from_element(&el, &opts).unwrap();
        assert_eq!(back.block_type, "x-im/paragraph");
        assert_eq!(
            back.data.get("text").map(String::as_str),
            Some("Hello <em>world</em>")
        );
        assert_eq!(back.data.get("format").map(String::as_str), Some("html"));
    }

    #[test]
    fn ordered_lists_nest_list_items() {
        let mut first = Block {
            block_type: "x-im/paragraph".to_string(),
            ..Default::default()
        };
        first.data.insert("text".to_string(), "one".to_string());
        let mut second = Block {
            block_type: "x-im/paragraph".to_string(),
            ..Default::default()
        };
        second.data.insert("text".to_string(), "two".to_string());
        let block = Block {
            block_type: "x-im/ordered-list".to_string(),
            content: vec![first, second],
            ..Default::default()
        };

        let mut opts = Options::defaults();
        opts.elements(&["x-im/ordered-list"]);
        let el = element_from_block(&block, &opts).unwrap();
        assert_eq!(
            el.inner_xml(),
            "<list-item>one</list-item><list-item>two</list-item>"
        );

        let back = block_from_element(&el, &opts).unwrap();
        assert_eq!(back.content.len(), 2);
        assert_eq!(back.content[0].block_type, "x-im/paragraph");
        assert_eq!(back.content[1].data.get("text").map(String::as_str), Some("two"));
    }

    #[test]
    fn content_set_wraps_a_body_group() {
        let mut para = Block {
            block_type: "x-im/paragraph".to_string(),
            ..Default::default()
        };
        para.data.insert("text".to_string(), "body".to_string());
        let document = Document {
            language: "sv-SE".to_string(),
            content: vec![para],
            ..Default::default()
        };
        let opts = Options::defaults();
        let el = content_set_element(&document, &opts, depth()).unwrap();
        let idf = el.find_child("inlineXML").unwrap().find_child("idf").unwrap();
        assert_eq!(idf.attr("xmlns"), Some(IDF_NAMESPACE));
        assert_eq!(idf.attr("xml:lang"), Some("sv-SE"));
        let group = idf.find_child("group").unwrap();
        assert_eq!(group.attr("type"), Some("body"));
        assert_eq!(group.child_elements().count(), 1);
    }

    #[test]
    fn embedded_idf_text_round_trips_object_content() {
        let mut para = Block {
            block_type: "x-im/paragraph".to_string(),
            ..Default::default()
        };
        para.data.insert("text".to_string(), "caption".to_string());
        let opts = Options::defaults();
        let text = idf_text_element(&[para], &opts, depth()).unwrap();
        let nodes = vec![crate::dom::Node::Element(text)];
        let blocks = idf_content_from_nodes(&nodes, &opts, depth()).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(
            blocks[0].data.get("text").map(String::as_str),
            Some("caption")
        );
    }
}
