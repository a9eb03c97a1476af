//! Transcoding between block data maps and raw XML payloads.

use indexmap::IndexMap;

use crate::config::{
    Context, DataConversion, DataType, Options, ValueHandling, DEFAULT_VALUE_ATTRIBUTE,
    DESTINATION_LINK, DESTINATION_META,
};
use crate::document::Block;
use crate::dom::{self, Element, Node};
use crate::error::{Error, Result};
use crate::limits::Depth;
use crate::newsml::content;
use crate::sanitize;

const FLAGS_TYPE: &str = "x-im/flags";
const HTML_EMBED_TYPE: &str = "x-im/htmlembed";

/// Which child collection of the source block was folded into the raw
/// payload and must not be serialized again by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Consumed {
    #[default]
    None,
    Links,
    Meta,
}

/// A raw data payload together with the consumption record.
#[derive(Debug, Default)]
pub(crate) struct RawData {
    pub nodes: Vec<Node>,
    pub consumed: Consumed,
}

/// Validates a data key for use as an XML element name. Keys may
/// contain letters, digits, underscores and hyphens, and may not start
/// with a digit.
pub(crate) fn check_data_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidArgument("data keys may not be empty".to_string()));
    }
    for (i, ch) in key.chars().enumerate() {
        let ok = match ch {
            '_' | '-' => true,
            'a'..='z' | 'A'..='Z' => true,
            '0'..='9' => i > 0,
            _ => false,
        };
        if !ok {
            return Err(Error::InvalidArgument(format!(
                "keys may not contain {ch:?}"
            )));
        }
    }
    Ok(())
}

/// Serializes child nodes back into markup text.
pub(crate) fn nodes_to_string(nodes: &[Node]) -> String {
    let mut wrapper = Element::new("x");
    wrapper.children = nodes.to_vec();
    wrapper.inner_xml()
}

/// True when a conversion element rule matches the block's type and
/// name, meaning the block serializes inside the parent's data payload.
pub(crate) fn conversion_rule_applies(block: &Block, opts: &Options) -> bool {
    opts.data_conversion_element(&block.block_type, &block.name)
        .is_some()
}

fn destination_blocks<'a>(block: &'a Block, destination: &str) -> Result<&'a [Block]> {
    match destination {
        DESTINATION_LINK => Ok(&block.links),
        DESTINATION_META => Ok(&block.meta),
        other => Err(Error::InvalidArgument(format!(
            "invalid destination configured: {other}"
        ))),
    }
}

fn consumed_for(destination: &str) -> Consumed {
    match destination {
        DESTINATION_LINK => Consumed::Links,
        _ => Consumed::Meta,
    }
}

/// Encodes the data map of a block (plus any conversion-configured
/// child blocks) into raw XML nodes.
pub(crate) fn transform_data_to_raw(
    block: &Block,
    opts: &Options,
    context: Context,
    depth: Depth,
) -> Result<RawData> {
    let destination = opts.element_destination(&block.block_type).to_string();
    let dest_blocks = destination_blocks(block, &destination)?;

    if let Some(dc) = opts.data_conversion_for_type(&block.block_type) {
        if dc.datatype != DataType::Xml {
            return convert_whole_payload(dc, dest_blocks, &destination, opts, depth);
        }
    }

    let mut nodes = Vec::new();
    let mut consumed = Consumed::None;

    if !dest_blocks.is_empty() {
        for child in dest_blocks {
            let Some(rule) = opts.data_conversion_element(&child.block_type, &child.name) else {
                continue;
            };
            let mut el = Element::new(&rule.name);
            for (key, value) in &child.data {
                // Attribute policy is looked up on the parent type.
                let attr = opts.block_options(&block.block_type, context).attribute(key);
                if attr.value_handling == ValueHandling::Attribute {
                    el.set_attr(key, value);
                } else {
                    let mut sub = Element::new(key);
                    sub.push_text(value);
                    el.push_element(sub);
                }
            }
            nodes.push(Node::Element(el));
        }
        if destination == DESTINATION_LINK {
            consumed = Consumed::Links;
        }
    }

    let option = opts.block_options(&block.block_type, context);
    let mut keys: Vec<&String> = block.data.keys().collect();
    keys.sort();
    for key in keys {
        check_data_key(key)?;
        let value = &block.data[key.as_str()];
        match option.attribute(key).value_handling {
            ValueHandling::CData => {
                let mut el = Element::new(key);
                el.push_cdata(value);
                nodes.push(Node::Element(el));
            }
            ValueHandling::Text => {
                let mut el = Element::new(key);
                el.push_text(value);
                nodes.push(Node::Element(el));
            }
            ValueHandling::Attribute => {
                let attr = option.attribute(key);
                let name = if attr.value_attribute.is_empty() {
                    DEFAULT_VALUE_ATTRIBUTE
                } else {
                    attr.value_attribute.as_str()
                };
                nodes.push(Node::Element(Element::new(key).with_attr(name, value)));
            }
            ValueHandling::Xml => {
                let parsed = dom::parse(&format!("<{key}>{value}</{key}>")).map_err(|_| {
                    Error::InvalidArgument(format!("invalid XML in value for {key}"))
                })?;
                nodes.push(Node::Element(parsed));
            }
        }
    }

    if option.has_flags {
        for meta in &block.meta {
            if meta.block_type != FLAGS_TYPE {
                continue;
            }
            let mut flags = Element::new("flags");
            for (key, enabled) in &meta.data {
                if enabled == "true" {
                    let mut flag = Element::new("flag");
                    flag.push_text(key);
                    flags.push_element(flag);
                }
            }
            nodes.push(Node::Element(flags));
        }
    }

    Ok(RawData { nodes, consumed })
}

fn convert_whole_payload(
    dc: &DataConversion,
    dest_blocks: &[Block],
    destination: &str,
    opts: &Options,
    depth: Depth,
) -> Result<RawData> {
    let nodes = match dc.datatype {
        DataType::Idf => content::content_nodes_from_blocks(dest_blocks, opts, depth.descend()?)?,
        DataType::Blob => {
            let text = dest_blocks
                .first()
                .and_then(|b| b.data.get("text"))
                .cloned()
                .unwrap_or_default();
            dom::parse_fragment(&text)?
        }
        DataType::Xml => Vec::new(),
    };
    Ok(RawData {
        nodes,
        consumed: consumed_for(destination),
    })
}

/// Decodes raw XML nodes back into a data map and nested blocks. The
/// caller routes the blocks to the destination configured for
/// `object_type`.
pub(crate) fn transform_data_from_raw(
    object_type: &str,
    nodes: &[Node],
    opts: &Options,
    context: Context,
    depth: Depth,
) -> Result<(IndexMap<String, String>, Vec<Block>)> {
    let conversion = opts.data_conversion_for_type(object_type);
    if let Some(dc) = conversion {
        match dc.datatype {
            DataType::Idf => {
                let blocks = content::blocks_from_group_children(nodes, opts, depth.descend()?)?;
                return Ok((IndexMap::new(), blocks));
            }
            DataType::Blob => {
                let mut data = IndexMap::new();
                data.insert("format".to_string(), "xml".to_string());
                data.insert("text".to_string(), nodes_to_string(nodes));
                let block = Block {
                    data,
                    ..Default::default()
                };
                return Ok((IndexMap::new(), vec![block]));
            }
            DataType::Xml => {}
        }
    }

    let option = opts.block_options(object_type, context);
    let mut data = IndexMap::new();
    let mut blocks = Vec::new();

    for node in nodes {
        let Some(el) = node.as_element() else { continue };
        if el.name.is_empty() || el.attr("format") == Some("idf") {
            continue;
        }
        if el.name == "flags" && option.has_flags {
            blocks.push(flags_block(el));
            continue;
        }
        if conversion.is_some() {
            if let Some(rule) = opts.data_conversion_element(object_type, &el.name) {
                let rule = rule.clone();
                blocks.push(element_to_block(el, &rule, opts, context, depth.descend()?)?);
                continue;
            }
        }
        let attr = option.attribute(&el.name);
        if attr.value_handling == ValueHandling::CData {
            if let Some(value) = el.leading_cdata() {
                data.insert(el.name.clone(), value);
                continue;
            }
            // No CDATA section present; treat the content as markup.
        }
        match attr.value_handling {
            ValueHandling::Text => {
                data.insert(el.name.clone(), el.text());
            }
            ValueHandling::Attribute => {
                let name = if attr.value_attribute.is_empty() {
                    DEFAULT_VALUE_ATTRIBUTE
                } else {
                    attr.value_attribute.as_str()
                };
                data.insert(
                    el.name.clone(),
                    el.attr(name).unwrap_or_default().to_string(),
                );
            }
            ValueHandling::Xml | ValueHandling::CData => {
                let inner = el.inner_xml();
                let value = if object_type == HTML_EMBED_TYPE {
                    inner
                } else {
                    sanitize::sanitize_html(&inner, opts)?
                };
                data.insert(el.name.clone(), value);
            }
        }
    }

    Ok((data, blocks))
}

fn flags_block(el: &Element) -> Block {
    let mut data = IndexMap::new();
    for flag in el.find_children("flag") {
        let name = flag.text();
        if !name.is_empty() {
            data.insert(name, "true".to_string());
        }
    }
    Block {
        block_type: FLAGS_TYPE.to_string(),
        data,
        ..Default::default()
    }
}

/// Rebuilds a nested block from a conversion-rule element. Attributes
/// on the element override decoded data entries.
fn element_to_block(
    el: &Element,
    rule: &crate::config::DataElement,
    opts: &Options,
    context: Context,
    depth: Depth,
) -> Result<Block> {
    let mut block = Block {
        name: rule.name.clone(),
        block_type: rule.block_type.clone(),
        rel: rule.rel.clone(),
        ..Default::default()
    };
    let (mut data, children) =
        transform_data_from_raw(&rule.block_type, &el.children, opts, context, depth)?;
    for (key, value) in &el.attributes {
        data.insert(key.clone(), value.clone());
    }
    block.data = data;
    route_blocks(&mut block, children, opts)?;
    Ok(block)
}

/// Appends decoded child blocks to the collection configured as the
/// destination for the parent block's type.
pub(crate) fn route_blocks(block: &mut Block, children: Vec<Block>, opts: &Options) -> Result<()> {
    if children.is_empty() {
        return Ok(());
    }
    match opts.element_destination(&block.block_type) {
        DESTINATION_LINK => block.links.extend(children),
        DESTINATION_META => block.meta.extend(children),
        other => {
            return Err(Error::InvalidArgument(format!(
                "invalid destination configured: {other}"
            )))
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AttributeOptions;

    fn depth() -> Depth {
        Depth::default()
    }

    #[test]
    fn data_keys_reject_bad_characters() {
        assert!(check_data_key("text").is_ok());
        assert!(check_data_key("a1-b_2").is_ok());
        assert!(check_data_key("").is_err());
        assert!(check_data_key("1abc").is_err());
        assert!(check_data_key("a b").is_err());
        assert!(check_data_key("a.b").is_err());
    }

    #[test]
    fn encode_sorts_keys_and_escapes_text() {
        let mut block = Block {
            block_type: "x-im/test".to_string(),
            ..Default::default()
        };
        block.data.insert("zeta".to_string(), "1".to_string());
        block.data.insert("alpha".to_string(), "a < b".to_string());
        let opts = Options::defaults();
        let raw = transform_data_to_raw(&block, &opts, Context::Meta, depth()).unwrap();
        assert_eq!(nodes_to_string(&raw.nodes), "<alpha>a &lt; b</alpha><zeta>1</zeta>");
    }

    #[test]
    fn attribute_handling_uses_configured_name() {
        let mut opts = Options::defaults();
        opts.attributes(
            "x-im/test",
            &[(
                "width",
                AttributeOptions {
                    value_handling: ValueHandling::Attribute,
                    value_attribute: "count".to_string(),
                },
            )],
        );
        let mut block = Block {
            block_type: "x-im/test".to_string(),
            ..Default::default()
        };
        block.data.insert("width".to_string(), "10".to_string());
        let raw = transform_data_to_raw(&block, &opts, Context::Meta, depth()).unwrap();
        assert_eq!(nodes_to_string(&raw.nodes), "<width count=\"10\"/>");

        let (data, blocks) =
            transform_data_from_raw("x-im/test", &raw.nodes, &opts, Context::Meta, depth())
                .unwrap();
        assert!(blocks.is_empty());
        assert_eq!(data.get("width").map(String::as_str), Some("10"));
    }

    #[test]
    fn xml_values_must_parse() {
        let mut opts = Options::defaults();
        opts.attributes(
            "x-im/test",
            &[(
                "body",
                AttributeOptions {
                    value_handling: ValueHandling::Xml,
                    value_attribute: String::new(),
                },
            )],
        );
        let mut block = Block {
            block_type: "x-im/test".to_string(),
            ..Default::default()
        };
        block
            .data
            .insert("body".to_string(), "<p>ok</p>".to_string());
        let raw = transform_data_to_raw(&block, &opts, Context::Meta, depth()).unwrap();
        assert_eq!(nodes_to_string(&raw.nodes), "<body><p>ok</p></body>");

        block
            .data
            .insert("body".to_string(), "<p>broken".to_string());
        let err = transform_data_to_raw(&block, &opts, Context::Meta, depth()).unwrap_err();
        assert!(err.to_string().contains("invalid XML in value for body"));
    }

    #[test]
    fn flags_round_trip_through_meta_blocks() {
        let mut opts = Options::defaults();
        opts.support_flags(&["x-im/test"]);
        let mut flags = Block {
            block_type: FLAGS_TYPE.to_string(),
            ..Default::default()
        };
        flags.data.insert("breaking".to_string(), "true".to_string());
        flags.data.insert("minor".to_string(), "false".to_string());
        let block = Block {
            block_type: "x-im/test".to_string(),
            meta: vec![flags],
            ..Default::default()
        };
        let raw = transform_data_to_raw(&block, &opts, Context::Meta, depth()).unwrap();
        assert_eq!(
            nodes_to_string(&raw.nodes),
            "<flags><flag>breaking</flag></flags>"
        );

        let (data, blocks) =
            transform_data_from_raw("x-im/test", &raw.nodes, &opts, Context::Meta, depth())
                .unwrap();
        assert!(data.is_empty());
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].block_type, FLAGS_TYPE);
        assert_eq!(
            blocks[0].data.get("breaking").map(String::as_str),
            Some("true")
        );
    }

    #[test]
    fn idf_formatted_elements_are_skipped_on_decode() {
        let nodes = dom::parse_fragment("<text format=\"idf\"><p>x</p></text><w>1</w>").unwrap();
        let opts = Options::defaults();
        let (data, blocks) =
            transform_data_from_raw("x-im/image", &nodes, &opts, Context::Link, depth()).unwrap();
        assert!(blocks.is_empty());
        assert_eq!(data.get("w").map(String::as_str), Some("1"));
        assert!(!data.contains_key("text"));
    }
}
