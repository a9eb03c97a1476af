//! The `<list>` and `<package>` collection roots. Unlike the G2 items
//! these carry no envelope attributes, only a uuid.

use crate::config::Options;
use crate::document::{Block, Document, Property};
use crate::dom::Element;
use crate::error::{Error, Result};
use crate::limits::Depth;
use crate::newsml::{self, itemmeta::ItemMeta};

const LIST_TYPE: &str = "x-im/list";
const PACKAGE_TYPE: &str = "x-im/package";
const CHANNEL_TYPE: &str = "x-im/channel";

/// A `<product>` entry: a channel title with an optional uuid.
#[derive(Debug, Clone, Default)]
struct Product {
    uuid: String,
    text: String,
}

impl Product {
    fn to_element(&self) -> Element {
        let mut el = Element::new("product");
        el.set_attr_opt("uuid", &self.uuid);
        el.push_text(&self.text);
        el
    }

    fn from_element(el: &Element) -> Self {
        Product {
            uuid: el.attr("uuid").unwrap_or_default().to_string(),
            text: el.text(),
        }
    }

    fn from_link(link: &Element) -> Self {
        Product {
            uuid: link.attr("uuid").unwrap_or_default().to_string(),
            text: link.attr("title").unwrap_or_default().to_string(),
        }
    }

    fn to_link(&self) -> Block {
        Block {
            rel: "channel".to_string(),
            block_type: CHANNEL_TYPE.to_string(),
            title: self.text.clone(),
            uuid: self.uuid.clone(),
            ..Default::default()
        }
    }
}

fn products_element(products: &[Product]) -> Option<Element> {
    if products.is_empty() {
        return None;
    }
    let mut el = Element::new("products");
    for product in products {
        el.push_element(product.to_element());
    }
    Some(el)
}

fn products_from_element(el: &Element) -> Vec<Product> {
    el.find_child("products")
        .map(|p| p.find_children("product").map(Product::from_element).collect())
        .unwrap_or_default()
}

/// List item types are written capitalized without the `x-im/` prefix.
fn item_type_to_xml(block_type: &str) -> String {
    let stripped = block_type.replacen("x-im/", "", 1);
    let mut chars = stripped.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn item_type_from_xml(item_type: &str) -> String {
    format!("x-im/{}", item_type.to_lowercase())
}

/// Serializes a document as a `<list>` element.
pub(crate) fn list_from_doc(document: &Document, opts: &Options, depth: Depth) -> Result<Element> {
    if document.doc_type != LIST_TYPE {
        return Err(Error::InvalidArgument("wrong document type".to_string()));
    }

    let mut item_meta = ItemMeta::from_doc(document, opts, depth)?;
    // The document URI is derived from the uuid and never round-trips
    // through the XML.
    item_meta
        .ext_properties
        .retain(|p| p.prop_type != "imext:uri");

    let mut products = Vec::new();
    let mut items: Vec<Element> = Vec::new();
    let mut kept = Vec::new();
    for link in item_meta.links {
        match link.attr("rel") {
            Some("channel") => products.push(Product::from_link(&link)),
            Some("item") => {
                let mut item = Element::new("item");
                item.set_attr_opt("uuid", link.attr("uuid").unwrap_or_default());
                item.set_attr_opt("type", link.attr("type").unwrap_or_default());
                items.push(item);
            }
            _ => kept.push(link),
        }
    }
    item_meta.links = kept;
    item_meta.title = String::new();
    item_meta.item_class = None;
    item_meta.ext_properties.retain(|p| {
        !matches!(
            p.prop_type.as_str(),
            "imext:description" | "imext:product" | "imext:itemLimit" | "imext:type"
        )
    });

    let mut description = String::new();
    let mut limit = 0usize;
    for meta in &document.meta {
        if meta.block_type != LIST_TYPE {
            continue;
        }
        if let Some(value) = meta.data.get("description") {
            description = value.clone();
        }
        if let Some(value) = meta.data.get("limit") {
            limit = value.parse().map_err(|_| {
                Error::InvalidArgument(format!("invalid limit in document: {value}"))
            })?;
        }
    }

    for content in &document.content {
        let mut item = Element::new("item");
        item.set_attr_opt("uuid", &content.uuid);
        item.set_attr_opt("type", &item_type_to_xml(&content.block_type));
        items.push(item);
    }

    let mut root = Element::new("list").with_attr("uuid", &document.uuid);
    if !document.title.is_empty() {
        let mut name = Element::new("name");
        name.push_text(&document.title);
        root.push_element(name);
    }
    if !description.is_empty() {
        let mut el = Element::new("description");
        el.push_text(&description);
        root.push_element(el);
    }
    root.push_element(Element::new("type").with_text("list"));
    if let Some(products) = products_element(&products) {
        root.push_element(products);
    }
    if !items.is_empty() || limit > 0 {
        let mut items_el = Element::new("items").with_attr("limit", limit.to_string());
        for item in items {
            items_el.push_element(item);
        }
        root.push_element(items_el);
    }
    root.push_element(item_meta.to_element());

    Ok(root)
}

/// Decodes a `<list>` element into a document.
pub(crate) fn list_to_doc(el: &Element, opts: &Options, depth: Depth) -> Result<Document> {
    if el.name != "list" {
        return Err(Error::MalformedDocument(format!(
            "expected list root, got {}",
            el.name
        )));
    }
    let uuid = el.attr("uuid").unwrap_or_default().to_string();
    let mut document = Document {
        doc_type: LIST_TYPE.to_string(),
        uuid: uuid.clone(),
        ..Default::default()
    };

    for product in products_from_element(el) {
        document.links.push(product.to_link());
    }

    let items = el.find_child("items");
    if let Some(items) = items {
        for item in items.find_children("item") {
            document.content.push(Block {
                uuid: item.attr("uuid").unwrap_or_default().to_string(),
                block_type: item_type_from_xml(item.attr("type").unwrap_or_default()),
                ..Default::default()
            });
        }
    }

    if let Some(item_meta) = el.find_child("itemMeta") {
        ItemMeta::from_element(item_meta).apply_to_doc(&mut document, opts, depth)?;
    }

    let mut meta = Block {
        block_type: LIST_TYPE.to_string(),
        ..Default::default()
    };
    meta.data.insert(
        "description".to_string(),
        el.find_child("description")
            .map(Element::text)
            .unwrap_or_default(),
    );
    meta.data.insert(
        "limit".to_string(),
        items
            .and_then(|i| i.attr("limit"))
            .unwrap_or("0")
            .to_string(),
    );
    document.meta.push(meta);

    // itemMeta decoding sets the title, the list name wins.
    document.title = el.find_child("name").map(Element::text).unwrap_or_default();
    document.uri = format!("im://list/{uuid}");

    Ok(document)
}

fn package_status_to_xml(status: &str) -> Result<&'static str> {
    match status {
        "draft" | "" => Ok("draft"),
        "usable" => Ok("public"),
        "canceled" => Ok("private"),
        other => Err(Error::InvalidArgument(format!(
            "can't convert status {other}"
        ))),
    }
}

fn package_status_from_xml(status: &str) -> Result<&'static str> {
    match status {
        "draft" | "" => Ok("draft"),
        "public" => Ok("usable"),
        "private" => Ok("canceled"),
        other => Err(Error::InvalidArgument(format!(
            "can't convert status {other}"
        ))),
    }
}

/// Serializes a document as a `<package>` element.
pub(crate) fn package_from_doc(
    document: &Document,
    opts: &Options,
    depth: Depth,
) -> Result<Element> {
    let pub_status = package_status_to_xml(&document.status)?;

    let mut item_meta = ItemMeta::from_doc(document, opts, depth)?;
    item_meta.pub_status = None;
    item_meta
        .ext_properties
        .retain(|p| !opts.is_section_property(&p.prop_type, "package"));
    item_meta.title = String::new();
    item_meta.item_class = None;

    let mut published = false;
    let mut pkg_type = String::new();
    let mut category = String::new();
    for prop in &document.properties {
        match prop.name.to_lowercase().as_str() {
            "type" => pkg_type = prop.value.clone(),
            "category" => category = prop.value.clone(),
            "published" => {
                published = prop.value.parse().map_err(|_| {
                    Error::InvalidArgument(format!("invalid published value: {}", prop.value))
                })?
            }
            _ => {}
        }
    }

    let mut cover = None;
    let mut item_list = None;
    let mut products = Vec::new();
    for link in &document.links {
        match link.rel.as_str() {
            "list" => item_list = Some(link.uuid.clone()),
            "channel" => products.push(Product {
                uuid: link.uuid.clone(),
                text: link.title.clone(),
            }),
            "cover" => {
                if cover.is_none() {
                    cover = Some(link.uuid.clone());
                }
            }
            _ => {}
        }
    }
    item_meta.links.retain(|link| {
        !matches!(link.attr("rel"), Some("list") | Some("channel") | Some("cover"))
    });
    if let Some(pos) = item_meta
        .ext_properties
        .iter()
        .position(|p| p.prop_type == "published")
    {
        item_meta.ext_properties.remove(pos);
    }

    let mut root = Element::new("package")
        .with_attr("uuid", &document.uuid)
        .with_attr("published", published.to_string());
    if let Some(cover) = &cover {
        root.push_element(Element::new("cover").with_attr("uuid", cover));
    }
    if !document.title.is_empty() {
        let mut name = Element::new("name");
        name.push_text(&document.title);
        root.push_element(name);
    }
    if !pkg_type.is_empty() {
        root.push_element(Element::new("type").with_text(&pkg_type));
    }
    if let Some(products) = products_element(&products) {
        root.push_element(products);
    }
    if !category.is_empty() {
        root.push_element(Element::new("category").with_text(&category));
    }
    if let Some(published) = &document.published {
        let mut el = Element::new("pubStart");
        el.push_text(&newsml::format_timestamp(published));
        root.push_element(el);
    }
    if let Some(unpublished) = &document.unpublished {
        let mut el = Element::new("pubStop");
        el.push_text(&newsml::format_timestamp(unpublished));
        root.push_element(el);
    }
    root.push_element(Element::new("pubStatus").with_text(pub_status));
    if let Some(item_list) = &item_list {
        root.push_element(Element::new("itemList").with_attr("uuid", item_list));
    }
    root.push_element(item_meta.to_element());

    Ok(root)
}

/// Decodes a `<package>` element into a document.
pub(crate) fn package_to_doc(el: &Element, opts: &Options, depth: Depth) -> Result<Document> {
    if el.name != "package" {
        return Err(Error::MalformedDocument(format!(
            "expected package root, got {}",
            el.name
        )));
    }
    let mut document = Document {
        uuid: el.attr("uuid").unwrap_or_default().to_string(),
        doc_type: PACKAGE_TYPE.to_string(),
        ..Default::default()
    };

    let pub_status = el
        .find_child("pubStatus")
        .map(Element::text)
        .unwrap_or_default();
    document.status = package_status_from_xml(&pub_status)?.to_string();

    let published = el.attr("published").unwrap_or("false");
    document
        .properties
        .push(Property::new("published", published));

    if let Some(pub_start) = el.find_child("pubStart") {
        document.published = Some(newsml::parse_rfc3339(&pub_start.text(), "pubStart")?);
    }
    if let Some(pub_stop) = el.find_child("pubStop") {
        document.unpublished = Some(newsml::parse_rfc3339(&pub_stop.text(), "pubStop")?);
    }

    document.meta.push(Block {
        block_type: PACKAGE_TYPE.to_string(),
        ..Default::default()
    });

    for product in products_from_element(el) {
        document.links.push(product.to_link());
    }
    if let Some(cover) = el.find_child("cover") {
        document.links.push(Block {
            rel: "cover".to_string(),
            block_type: "x-im/article".to_string(),
            uuid: cover.attr("uuid").unwrap_or_default().to_string(),
            ..Default::default()
        });
    }

    for (name, tag) in [("type", "type"), ("category", "category")] {
        if let Some(child) = el.find_child(tag) {
            let value = child.text();
            if !value.is_empty() {
                document.properties.push(Property::new(name, value));
            }
        }
    }

    if let Some(item_meta) = el.find_child("itemMeta") {
        ItemMeta::from_element(item_meta).apply_to_doc(&mut document, opts, depth)?;
    }

    if let Some(item_list) = el.find_child("itemList") {
        document.links.push(Block {
            block_type: LIST_TYPE.to_string(),
            rel: "list".to_string(),
            uuid: item_list.attr("uuid").unwrap_or_default().to_string(),
            ..Default::default()
        });
    }

    // itemMeta decoding sets the title, the package name wins.
    document.title = el.find_child("name").map(Element::text).unwrap_or_default();

    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn depth() -> Depth {
        Depth::default()
    }

    fn list() -> Document {
        let mut meta = Block {
            block_type: LIST_TYPE.to_string(),
            ..Default::default()
        };
        meta.data
            .insert("description".to_string(), "Front page picks".to_string());
        meta.data.insert("limit".to_string(), "5".to_string());
        Document {
            uuid: "6ba7bc29-1f05-4a46-9f79-ab02b98a6dcd".to_string(),
            doc_type: LIST_TYPE.to_string(),
            title: "Front page".to_string(),
            meta: vec![meta],
            content: vec![Block {
                uuid: "a2f4e7a0-1a30-4f9c-8f4a-7d4ab07679f9".to_string(),
                block_type: "x-im/article".to_string(),
                ..Default::default()
            }],
            links: vec![Block {
                rel: "channel".to_string(),
                block_type: CHANNEL_TYPE.to_string(),
                title: "Web".to_string(),
                uuid: "d5a0c4b4-7d9a-4f8b-9a0a-55f46e0f7a26".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn wrong_type_is_rejected() {
        let opts = Options::defaults();
        let document = Document {
            doc_type: "x-im/article".to_string(),
            ..Default::default()
        };
        assert!(list_from_doc(&document, &opts, depth()).is_err());
    }

    #[test]
    fn list_round_trips() {
        let opts = Options::defaults();
        let el = list_from_doc(&list(), &opts, depth()).unwrap();
        assert_eq!(el.find_child("name").unwrap().text(), "Front page");
        let items = el.find_child("items").unwrap();
        assert_eq!(items.attr("limit"), Some("5"));
        let item = items.find_child("item").unwrap();
        assert_eq!(item.attr("type"), Some("Article"));

        let decoded = list_to_doc(&el, &opts, depth()).unwrap();
        assert_eq!(decoded.doc_type, LIST_TYPE);
        assert_eq!(decoded.title, "Front page");
        assert_eq!(decoded.uri, "im://list/6ba7bc29-1f05-4a46-9f79-ab02b98a6dcd");
        assert_eq!(decoded.content.len(), 1);
        assert_eq!(decoded.content[0].block_type, "x-im/article");
        let channel = decoded.links.iter().find(|l| l.rel == "channel").unwrap();
        assert_eq!(channel.title, "Web");
        let meta = decoded
            .meta
            .iter()
            .find(|m| m.block_type == LIST_TYPE)
            .unwrap();
        assert_eq!(meta.data.get("limit").map(String::as_str), Some("5"));
    }

    #[test]
    fn invalid_limit_is_an_error() {
        let mut document = list();
        document.meta[0]
            .data
            .insert("limit".to_string(), "many".to_string());
        let opts = Options::defaults();
        let err = list_from_doc(&document, &opts, depth()).unwrap_err();
        assert!(err.to_string().contains("invalid limit in document: many"));
    }

    fn package() -> Document {
        let mut document = Document {
            uuid: "843cea3f-dd5e-421f-ae80-5a0b08a6a415".to_string(),
            doc_type: PACKAGE_TYPE.to_string(),
            title: "Weekend bundle".to_string(),
            status: "usable".to_string(),
            links: vec![
                Block {
                    rel: "list".to_string(),
                    block_type: LIST_TYPE.to_string(),
                    uuid: "4d25a1b2-8f6e-4c2c-b9d4-6c27e5ffd3a1".to_string(),
                    ..Default::default()
                },
                Block {
                    rel: "cover".to_string(),
                    block_type: "x-im/article".to_string(),
                    uuid: "ee13dbf8-3f0c-4c4f-9aa5-f2f6608d9b0d".to_string(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        document.properties.push(Property::new("published", "true"));
        document.properties.push(Property::new("category", "sports"));
        document
    }

    #[test]
    fn package_round_trips() {
        let opts = Options::defaults();
        let el = package_from_doc(&package(), &opts, depth()).unwrap();
        assert_eq!(el.attr("published"), Some("true"));
        assert_eq!(el.find_child("pubStatus").unwrap().text(), "public");
        assert_eq!(
            el.find_child("itemList").unwrap().attr("uuid"),
            Some("4d25a1b2-8f6e-4c2c-b9d4-6c27e5ffd3a1")
        );
        assert_eq!(
            el.find_child("cover").unwrap().attr("uuid"),
            Some("ee13dbf8-3f0c-4c4f-9aa5-f2f6608d9b0d")
        );

        let decoded = package_to_doc(&el, &opts, depth()).unwrap();
        assert_eq!(decoded.doc_type, PACKAGE_TYPE);
        assert_eq!(decoded.status, "usable");
        assert_eq!(decoded.title, "Weekend bundle");
        let published = decoded
            .properties
            .iter()
            .find(|p| p.name == "published")
            .unwrap();
        assert_eq!(published.value, "true");
        assert!(decoded.links.iter().any(|l| l.rel == "list"));
        assert!(decoded.links.iter().any(|l| l.rel == "cover"));
        let category = decoded
            .properties
            .iter()
            .find(|p| p.name == "category")
            .unwrap();
        assert_eq!(category.value, "sports");
    }

    #[test]
    fn unknown_status_is_an_error() {
        let mut document = package();
        document.status = "embargoed".to_string();
        let opts = Options::defaults();
        let err = package_from_doc(&document, &opts, depth()).unwrap_err();
        assert!(err.to_string().contains("can't convert status embargoed"));
    }
}
