//! The `<itemMeta>` section shared by all item kinds.

use indexmap::IndexMap;

use crate::config::{Context, Options};
use crate::document::{Block, Document, Property};
use crate::dom::Element;
use crate::error::{Error, Result};
use crate::limits::Depth;
use crate::newsml::{self, object, ExtProperty};

const NOTE_TYPE: &str = "x-im/note";
const RELATED_GEO_TYPE: &str = "x-im/related-geo";
const RELATED_GEO_REL: &str = "related-geo";
const SERVICE_TYPE: &str = "x-im/service";

/// A `<service>` entry: qcode and why attributes, name child.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Service {
    pub qcode: String,
    pub name: String,
    pub why: String,
}

impl Service {
    fn to_element(&self) -> Element {
        let mut el = Element::new("service");
        el.set_attr_opt("qcode", &self.qcode);
        el.set_attr_opt("why", &self.why);
        if !self.name.is_empty() {
            let mut name = Element::new("name");
            name.push_text(&self.name);
            el.push_element(name);
        }
        el
    }

    fn from_element(el: &Element) -> Self {
        Service {
            qcode: el.attr("qcode").unwrap_or_default().to_string(),
            name: el.find_child("name").map(Element::text).unwrap_or_default(),
            why: el.attr("why").unwrap_or_default().to_string(),
        }
    }

    fn from_link(block: &Block) -> Self {
        Service {
            qcode: block.value.clone(),
            name: block.title.clone(),
            why: block.data.get("why").cloned().unwrap_or_default(),
        }
    }
}

/// Intermediate representation of `<itemMeta>`. Document assemblers
/// post-process the fields before the element is emitted.
#[derive(Debug, Default)]
pub(crate) struct ItemMeta {
    pub item_class: Option<String>,
    pub file_name: Option<String>,
    pub version_created: String,
    pub first_created: String,
    pub provider: String,
    pub pub_status: Option<String>,
    pub role: Option<String>,
    pub title: String,
    pub links: Vec<Element>,
    pub ed_notes: Vec<String>,
    pub ext_properties: Vec<ExtProperty>,
    pub services: Vec<Service>,
    pub metadata: Vec<Element>,
}

impl ItemMeta {
    pub fn from_doc(document: &Document, opts: &Options, depth: Depth) -> Result<Self> {
        if document.doc_type.is_empty() {
            return Err(Error::MalformedDocument(
                "document is missing type".to_string(),
            ));
        }

        let mut im = ItemMeta {
            item_class: Some(item_class_qcode(&document.doc_type, opts)?),
            title: document.title.clone(),
            provider: document.provider.clone(),
            ..Default::default()
        };

        if let Some(published) = &document.published {
            im.add_ext_property("imext:pubstart", newsml::format_timestamp(published));
        }
        if !document.status.is_empty() {
            im.pub_status = Some(opts.status_to_xml(&document.status));
        }
        if let Some(unpublished) = &document.unpublished {
            im.add_ext_property("imext:pubstop", newsml::format_timestamp(unpublished));
        }

        if !document.url.is_empty() {
            im.add_ext_property("imext:url", &document.url);
        }
        if !document.uri.is_empty() {
            im.add_ext_property("imext:uri", &document.uri);
        }
        im.add_ext_property("imext:type", &document.doc_type);
        if !document.path.is_empty() {
            im.add_ext_property("imext:path", &document.path);
        }

        for property in &document.properties {
            match property.name.to_lowercase().as_str() {
                "filename" => im.file_name = Some(property.value.clone()),
                "section" => im.services.push(Service {
                    qcode: format!("imsection:{}", property.value),
                    name: property
                        .parameters
                        .get("name")
                        .cloned()
                        .unwrap_or_default(),
                    why: String::new(),
                }),
                "role" => im.role = Some(property.value.clone()),
                _ => {
                    if !opts.is_property_exception(&document.doc_type, &property.name) {
                        let mut prop = ExtProperty::new(&property.name, &property.value);
                        if let Some(creator) = property.parameters.get("creator") {
                            prop.creator = creator.clone();
                        }
                        if let Some(why) = property.parameters.get("why") {
                            prop.why = why.clone();
                        }
                        im.ext_properties.push(prop);
                    }
                }
            }
        }

        im.sort_ext_properties();

        if let Some(created) = &document.created {
            im.first_created = newsml::format_timestamp(created);
        }
        if let Some(modified) = &document.modified {
            im.version_created = newsml::format_timestamp(modified);
        }

        im.add_links(document, opts, depth)?;
        im.add_geo_links(document);

        for meta in &document.meta {
            if meta.block_type == NOTE_TYPE {
                im.ed_notes
                    .push(meta.data.get("text").cloned().unwrap_or_default());
            }
        }
        for block in &document.meta {
            if block.block_type == NOTE_TYPE
                || !opts.is_item_meta_object_type(&document.doc_type, &block.block_type)
            {
                continue;
            }
            im.metadata
                .push(object::object_to_element(block, opts, Context::Meta, depth)?);
        }

        Ok(im)
    }

    pub fn add_ext_property(&mut self, prop_type: impl Into<String>, value: impl Into<String>) {
        self.ext_properties.push(ExtProperty::new(prop_type, value));
    }

    pub fn sort_ext_properties(&mut self) {
        self.ext_properties
            .sort_by(|a, b| a.prop_type.cmp(&b.prop_type));
    }

    fn add_links(&mut self, document: &Document, opts: &Options, depth: Depth) -> Result<()> {
        for (i, link) in document.links.iter().enumerate() {
            if opts.is_item_meta_link_exception(&link.block_type, &link.rel) {
                continue;
            }
            match link.block_type.as_str() {
                RELATED_GEO_TYPE => continue,
                SERVICE_TYPE => self.services.push(Service::from_link(link)),
                _ => {
                    let el = object::link_to_element(link, opts, depth).map_err(|err| {
                        Error::MalformedDocument(format!("failed to convert link {i}: {err}"))
                    })?;
                    self.links.push(el);
                }
            }
        }
        Ok(())
    }

    /// All `related-geo` links collapse into one link whose data holds
    /// a `<uuid>` entry per location.
    fn add_geo_links(&mut self, document: &Document) {
        let mut data = Element::new("data");
        let mut found = false;
        for link in &document.links {
            if link.rel != RELATED_GEO_REL {
                continue;
            }
            found = true;
            if link.uuid.is_empty() && link.title.is_empty() {
                continue;
            }
            let mut uuid = Element::new("uuid").with_attr("title", &link.title);
            uuid.push_text(&link.uuid);
            data.push_element(uuid);
        }
        if found {
            let mut el = Element::new("link").with_attr("rel", RELATED_GEO_REL);
            el.push_element(data);
            self.links.push(el);
        }
    }

    pub fn to_element(&self) -> Element {
        let mut el = Element::new("itemMeta");
        if let Some(item_class) = &self.item_class {
            el.push_element(newsml::qcode_element("itemClass", item_class));
        }
        if let Some(file_name) = &self.file_name {
            let mut child = Element::new("fileName");
            child.push_text(file_name);
            el.push_element(child);
        }
        let mut version_created = Element::new("versionCreated");
        version_created.push_text(&self.version_created);
        el.push_element(version_created);
        let mut first_created = Element::new("firstCreated");
        first_created.push_text(&self.first_created);
        el.push_element(first_created);
        if !self.provider.is_empty() {
            el.push_element(Element::new("provider").with_attr("literal", &self.provider));
        }
        if let Some(status) = &self.pub_status {
            el.push_element(newsml::qcode_element("pubStatus", status));
        }
        if let Some(role) = &self.role {
            el.push_element(newsml::qcode_element("role", role));
        }
        if !self.title.is_empty() {
            let mut title = Element::new("title");
            title.push_text(&self.title);
            el.push_element(title);
        }
        if let Some(links) = newsml::newsml_container("links", self.links.clone()) {
            el.push_element(links);
        }
        for note in &self.ed_notes {
            let mut ed_note = Element::new("edNote");
            ed_note.push_text(note);
            el.push_element(ed_note);
        }
        for prop in &self.ext_properties {
            el.push_element(prop.to_element("itemMetaExtProperty"));
        }
        for service in &self.services {
            el.push_element(service.to_element());
        }
        if let Some(metadata) = newsml::newsml_container("metadata", self.metadata.clone()) {
            el.push_element(metadata);
        }
        el
    }

    pub fn from_element(el: &Element) -> Self {
        let mut im = ItemMeta {
            item_class: el
                .find_child("itemClass")
                .and_then(|c| c.attr("qcode"))
                .map(str::to_string),
            file_name: el.find_child("fileName").map(Element::text),
            version_created: el
                .find_child("versionCreated")
                .map(Element::text)
                .unwrap_or_default(),
            first_created: el
                .find_child("firstCreated")
                .map(Element::text)
                .unwrap_or_default(),
            provider: el
                .find_child("provider")
                .and_then(|p| p.attr("literal"))
                .unwrap_or_default()
                .to_string(),
            pub_status: el
                .find_child("pubStatus")
                .and_then(|c| c.attr("qcode"))
                .map(str::to_string),
            role: el
                .find_child("role")
                .and_then(|c| c.attr("qcode"))
                .map(str::to_string),
            title: el.find_child("title").map(Element::text).unwrap_or_default(),
            ..Default::default()
        };
        if let Some(links) = el.find_child("links") {
            im.links = links.find_children("link").cloned().collect();
        }
        for note in el.find_children("edNote") {
            im.ed_notes.push(note.text());
        }
        for prop in el.find_children("itemMetaExtProperty") {
            im.ext_properties.push(ExtProperty::from_element(prop));
        }
        for service in el.find_children("service") {
            im.services.push(Service::from_element(service));
        }
        if let Some(metadata) = el.find_child("metadata") {
            im.metadata = metadata.find_children("object").cloned().collect();
        }
        im
    }

    pub fn apply_to_doc(
        &self,
        document: &mut Document,
        opts: &Options,
        depth: Depth,
    ) -> Result<()> {
        if !self.first_created.is_empty() {
            let converted = newsml::convert_timestamp(&self.first_created)
                .map_err(|err| Error::InvalidArgument(format!("firstCreated {err}")))?;
            document.created = Some(converted.ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "firstCreated has invalid value: {}",
                    self.first_created
                ))
            })?);
        }
        if !self.version_created.is_empty() {
            let converted = newsml::convert_timestamp(&self.version_created)
                .map_err(|err| Error::InvalidArgument(format!("versionCreated {err}")))?;
            document.modified = Some(converted.ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "versionCreated has invalid value: {}",
                    self.version_created
                ))
            })?);
        }
        document.title = self.title.clone();
        if let Some(item_class) = &self.item_class {
            // Concepts carry their type in imext:type instead, so an
            // unmapped qcode is not an error here.
            if let Ok(doc_type) = opts.qcode_to_document_type(item_class) {
                document.doc_type = doc_type;
            } else {
                document.doc_type = String::new();
            }
        }
        if let Some(status) = &self.pub_status {
            if !status.is_empty() {
                document.status = opts.status_from_xml(status);
            }
        }
        if let Some(file_name) = &self.file_name {
            document
                .properties
                .push(Property::new("filename", file_name));
        }
        if let Some(role) = &self.role {
            document.properties.push(Property::new("role", role));
        }
        if !self.provider.is_empty() {
            document.provider = self.provider.clone();
        }

        for prop in &self.ext_properties {
            apply_ext_property(document, prop)?;
        }

        for (i, link) in self.links.iter().enumerate() {
            if link.attr("rel") == Some(RELATED_GEO_REL) {
                geo_links_to_doc(document, link).map_err(|err| {
                    Error::MalformedDocument(format!("failed to convert geo link {i}: {err}"))
                })?;
                continue;
            }
            let block =
                object::block_from_link(link, opts, Context::Link, depth).map_err(|err| {
                    Error::MalformedDocument(format!("failed to convert link {i}: {err}"))
                })?;
            document.links.push(block);
        }

        for note in &self.ed_notes {
            let mut data = IndexMap::new();
            data.insert("text".to_string(), note.clone());
            document.meta.push(Block {
                id: document.meta.len().to_string(),
                block_type: NOTE_TYPE.to_string(),
                data,
                ..Default::default()
            });
        }

        for service in &self.services {
            let mut data = IndexMap::new();
            data.insert("why".to_string(), service.why.clone());
            document.links.push(Block {
                block_type: SERVICE_TYPE.to_string(),
                title: service.name.clone(),
                value: service.qcode.clone(),
                data,
                ..Default::default()
            });
        }

        for (i, metadata) in self.metadata.iter().enumerate() {
            let block = object::block_from_object(metadata, opts, Context::Meta, depth)
                .map_err(|err| {
                    Error::MalformedDocument(format!(
                        "failed to convert metadata object {i}: {err}"
                    ))
                })?;
            document.meta.push(block);
        }

        Ok(())
    }
}

/// Routes the item class qcode for a document type: asset types map
/// through the qcode table, planning and collection types are fixed,
/// and everything else resolves as a concept with a news item
/// fallback.
fn item_class_qcode(doc_type: &str, opts: &Options) -> Result<String> {
    match doc_type {
        "x-im/article" | "x-im/image" | "x-im/pdf" => opts.document_type_to_qcode(doc_type),
        "x-im/newscoverage" => Ok("x-im/assignment".to_string()),
        "x-im/list" => Ok("x-im/list".to_string()),
        "x-im/package" => Ok("x-im/package".to_string()),
        _ => Ok(opts
            .concept_type_to_qcode(doc_type)
            .unwrap_or_else(|_| "imext:newsitem".to_string())),
    }
}

fn apply_ext_property(document: &mut Document, prop: &ExtProperty) -> Result<()> {
    match prop.prop_type.as_str() {
        "imext:uri" => document.uri = prop.value.clone(),
        "imext:url" => document.url = prop.value.clone(),
        "imext:path" => document.path = prop.value.clone(),
        "imext:type" => document.doc_type = prop.value.clone(),
        "imext:pubstart" => {
            let converted = newsml::convert_timestamp(&prop.value)
                .map_err(|err| Error::InvalidArgument(format!("imext:pubstart {err}")))?;
            if let Some(ts) = converted {
                document.published = Some(ts);
            }
        }
        "imext:pubstop" => {
            let converted = newsml::convert_timestamp(&prop.value)
                .map_err(|err| Error::InvalidArgument(format!("imext:pubstop {err}")))?;
            if let Some(ts) = converted {
                document.unpublished = Some(ts);
            }
        }
        _ => {
            let mut property = Property::new(&prop.prop_type, &prop.value);
            if !prop.creator.is_empty() {
                property = property.with_parameter("creator", &prop.creator);
            }
            if !prop.why.is_empty() {
                property = property.with_parameter("why", &prop.why);
            }
            document.properties.push(property);
        }
    }
    Ok(())
}

fn geo_links_to_doc(document: &mut Document, link: &Element) -> Result<()> {
    let Some(data) = link.find_child("data") else {
        document.links.push(Block {
            block_type: RELATED_GEO_TYPE.to_string(),
            rel: RELATED_GEO_REL.to_string(),
            ..Default::default()
        });
        return Ok(());
    };
    for uuid in data.find_children("uuid") {
        document.links.push(Block {
            block_type: RELATED_GEO_TYPE.to_string(),
            rel: RELATED_GEO_REL.to_string(),
            uuid: uuid.text(),
            title: uuid.attr("title").unwrap_or_default().to_string(),
            ..Default::default()
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono::Utc;

    fn depth() -> Depth {
        Depth::default()
    }

    fn article() -> Document {
        Document {
            uuid: "9f447d12-ae73-4a64-8c3f-1f2f16ea7158".to_string(),
            doc_type: "x-im/article".to_string(),
            title: "A headline".to_string(),
            created: Some(Utc.with_ymd_and_hms(2022, 3, 1, 8, 0, 0).unwrap()),
            modified: Some(Utc.with_ymd_and_hms(2022, 3, 2, 9, 30, 0).unwrap()),
            ..Default::default()
        }
    }

    #[test]
    fn from_doc_requires_a_type() {
        let document = Document::default();
        let opts = Options::defaults();
        let err = ItemMeta::from_doc(&document, &opts, depth()).unwrap_err();
        assert!(err.to_string().contains("missing type"));
    }

    #[test]
    fn created_dates_become_item_dates() {
        let opts = Options::defaults();
        let im = ItemMeta::from_doc(&article(), &opts, depth()).unwrap();
        assert_eq!(im.first_created, "2022-03-01T08:00:00Z");
        assert_eq!(im.version_created, "2022-03-02T09:30:00Z");
        assert_eq!(im.item_class.as_deref(), Some("ninat:text"));

        let el = im.to_element();
        let names: Vec<&str> = el.child_elements().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "itemClass",
                "versionCreated",
                "firstCreated",
                "title",
                "itemMetaExtProperty"
            ]
        );
    }

    #[test]
    fn ext_properties_sort_by_type() {
        let mut document = article();
        document.uri = "im://article/a".to_string();
        document.path = "/a".to_string();
        let opts = Options::defaults();
        let im = ItemMeta::from_doc(&document, &opts, depth()).unwrap();
        let types: Vec<&str> = im
            .ext_properties
            .iter()
            .map(|p| p.prop_type.as_str())
            .collect();
        assert_eq!(types, vec!["imext:path", "imext:type", "imext:uri"]);
    }

    #[test]
    fn related_geo_links_aggregate_into_one_link() {
        let mut document = article();
        for (uuid, title) in [("u1", "Stockholm"), ("u2", "Oslo")] {
            document.links.push(Block {
                block_type: RELATED_GEO_TYPE.to_string(),
                rel: RELATED_GEO_REL.to_string(),
                uuid: uuid.to_string(),
                title: title.to_string(),
                ..Default::default()
            });
        }
        let opts = Options::defaults();
        let im = ItemMeta::from_doc(&document, &opts, depth()).unwrap();
        assert_eq!(im.links.len(), 1);
        let data = im.links[0].find_child("data").unwrap();
        let uuids: Vec<String> = data.find_children("uuid").map(Element::text).collect();
        assert_eq!(uuids, vec!["u1", "u2"]);

        let mut decoded = Document::default();
        geo_links_to_doc(&mut decoded, &im.links[0]).unwrap();
        assert_eq!(decoded.links.len(), 2);
        assert_eq!(decoded.links[1].title, "Oslo");
    }

    #[test]
    fn ed_notes_round_trip_as_note_blocks() {
        let mut document = article();
        let mut data = IndexMap::new();
        data.insert("text".to_string(), "check the quotes".to_string());
        document.meta.push(Block {
            block_type: NOTE_TYPE.to_string(),
            data,
            ..Default::default()
        });
        let opts = Options::defaults();
        let im = ItemMeta::from_doc(&document, &opts, depth()).unwrap();
        assert_eq!(im.ed_notes, vec!["check the quotes"]);

        let mut decoded = Document::default();
        im.apply_to_doc(&mut decoded, &opts, depth()).unwrap();
        let note = decoded
            .meta
            .iter()
            .find(|b| b.block_type == NOTE_TYPE)
            .unwrap();
        assert_eq!(
            note.data.get("text").map(String::as_str),
            Some("check the quotes")
        );
    }
}
