//! The `<contentMeta>` section.

use crate::config::{Context, Options};
use crate::document::{Document, Property};
use crate::dom::Element;
use crate::error::{Error, Result};
use crate::limits::Depth;
use crate::newsml::{self, object, Description, ExtProperty, LiteralValue};

const NOTE_TYPE: &str = "x-im/note";
const CATEGORY_TYPE: &str = "x-im/category";

/// Intermediate representation of `<contentMeta>`.
#[derive(Debug, Default)]
pub(crate) struct ContentMeta {
    pub content_created: String,
    pub content_modified: String,
    pub info_source: Option<LiteralValue>,
    pub alt_id: String,
    pub slugline: String,
    pub by: String,
    pub headline: String,
    pub descriptions: Vec<Description>,
    pub creator: Option<LiteralValue>,
    pub language: String,
    pub urgency: String,
    pub ext_properties: Vec<ExtProperty>,
    pub metadata: Vec<Element>,
    pub links: Vec<Element>,
}

impl ContentMeta {
    pub fn from_doc(document: &Document, opts: &Options, depth: Depth) -> Result<Self> {
        let mut cm = ContentMeta::default();

        if let Some(created) = &document.created {
            cm.content_created = newsml::format_timestamp(created);
        }
        if let Some(modified) = &document.modified {
            cm.content_modified = newsml::format_timestamp(modified);
        }

        for property in &document.properties {
            cm.add_property(property, opts);
        }

        for block in &document.meta {
            if block.block_type == NOTE_TYPE
                || opts.is_item_meta_object_type(&document.doc_type, &block.block_type)
                || opts.is_concept_object_type(&block.block_type)
            {
                continue;
            }
            cm.metadata
                .push(object::object_to_element(block, opts, Context::Meta, depth)?);
        }

        let allowed = opts.allowed_content_meta_links();
        for (i, link) in document.links.iter().enumerate() {
            if !allowed.contains(link.block_type.as_str()) {
                continue;
            }
            if link.block_type == CATEGORY_TYPE && opts.is_item_meta_category_rel(&link.rel) {
                continue;
            }
            let el = object::link_to_element(link, opts, depth).map_err(|err| {
                Error::MalformedDocument(format!("failed to convert link {i}: {err}"))
            })?;
            cm.links.push(el);
        }

        Ok(cm)
    }

    fn add_property(&mut self, property: &Property, opts: &Options) {
        match property.name.to_lowercase().as_str() {
            "infosource" => {
                self.info_source = Some(LiteralValue {
                    text: property.value.clone(),
                    literal: property.parameter("literal").unwrap_or_default().to_string(),
                })
            }
            "altid" => self.alt_id = property.value.clone(),
            "slugline" => self.slugline = property.value.clone(),
            "headline" => self.headline = property.value.clone(),
            "by" => self.by = property.value.clone(),
            "description" => self.descriptions.push(Description {
                role: property.parameter("role").unwrap_or_default().to_string(),
                text: property.value.clone(),
            }),
            "creator" => {
                self.creator = Some(LiteralValue {
                    text: property.value.clone(),
                    literal: property.parameter("literal").unwrap_or_default().to_string(),
                })
            }
            "urgency" => self.urgency = property.value.clone(),
            "language" => {
                if !property.value.is_empty() {
                    self.language = property.value.clone();
                }
            }
            "nrp:sector" => {
                let mut prop = ExtProperty::new("nrp:sector", &property.value);
                if let Some(literal) = property.parameter("literal") {
                    prop.literal = literal.to_string();
                }
                self.ext_properties.push(prop);
            }
            _ => {
                if opts.has_property_exception(&property.name, "contentmeta") {
                    self.ext_properties
                        .push(ExtProperty::new(&property.name, &property.value));
                }
            }
        }
    }

    /// True when nothing but a headline, language, urgency or ext
    /// property is set. Such a section is elided from news items.
    pub fn is_empty(&self) -> bool {
        self.content_created.is_empty()
            && self.content_modified.is_empty()
            && self.info_source.is_none()
            && self.creator.is_none()
            && self.alt_id.is_empty()
            && self.slugline.is_empty()
            && self.by.is_empty()
            && self.descriptions.is_empty()
            && self.metadata.is_empty()
            && self.links.is_empty()
    }

    pub fn to_element(&self) -> Element {
        let mut el = Element::new("contentMeta");
        for (tag, value) in [
            ("contentCreated", &self.content_created),
            ("contentModified", &self.content_modified),
        ] {
            if !value.is_empty() {
                let mut child = Element::new(tag);
                child.push_text(value);
                el.push_element(child);
            }
        }
        if let Some(info_source) = &self.info_source {
            el.push_element(info_source.to_element("infoSource"));
        }
        for (tag, value) in [
            ("altId", &self.alt_id),
            ("slugline", &self.slugline),
            ("by", &self.by),
            ("headline", &self.headline),
        ] {
            if !value.is_empty() {
                let mut child = Element::new(tag);
                child.push_text(value);
                el.push_element(child);
            }
        }
        for description in &self.descriptions {
            el.push_element(description.to_element());
        }
        if let Some(creator) = &self.creator {
            el.push_element(creator.to_element("creator"));
        }
        if !self.language.is_empty() {
            el.push_element(Element::new("language").with_attr("tag", &self.language));
        }
        if !self.urgency.is_empty() {
            let mut urgency = Element::new("urgency");
            urgency.push_text(&self.urgency);
            el.push_element(urgency);
        }
        for prop in &self.ext_properties {
            el.push_element(prop.to_element("contentMetaExtProperty"));
        }
        if let Some(metadata) = newsml::newsml_container("metadata", self.metadata.clone()) {
            el.push_element(metadata);
        }
        if let Some(links) = newsml::newsml_container("links", self.links.clone()) {
            el.push_element(links);
        }
        el
    }

    pub fn from_element(el: &Element) -> Self {
        let mut cm = ContentMeta {
            content_created: el
                .find_child("contentCreated")
                .map(Element::text)
                .unwrap_or_default(),
            content_modified: el
                .find_child("contentModified")
                .map(Element::text)
                .unwrap_or_default(),
            info_source: el
                .find_child("infoSource")
                .map(LiteralValue::from_element),
            alt_id: el.find_child("altId").map(Element::text).unwrap_or_default(),
            slugline: el
                .find_child("slugline")
                .map(Element::text)
                .unwrap_or_default(),
            by: el.find_child("by").map(Element::text).unwrap_or_default(),
            headline: el
                .find_child("headline")
                .map(Element::text)
                .unwrap_or_default(),
            creator: el.find_child("creator").map(LiteralValue::from_element),
            language: el
                .find_child("language")
                .and_then(|l| l.attr("tag"))
                .unwrap_or_default()
                .to_string(),
            urgency: el
                .find_child("urgency")
                .map(Element::text)
                .unwrap_or_default(),
            ..Default::default()
        };
        for description in el.find_children("description") {
            cm.descriptions.push(Description::from_element(description));
        }
        for prop in el.find_children("contentMetaExtProperty") {
            cm.ext_properties.push(ExtProperty::from_element(prop));
        }
        if let Some(metadata) = el.find_child("metadata") {
            cm.metadata = metadata.find_children("object").cloned().collect();
        }
        if let Some(links) = el.find_child("links") {
            cm.links = links.find_children("link").cloned().collect();
        }
        cm
    }

    pub fn apply_to_doc(
        &self,
        document: &mut Document,
        opts: &Options,
        depth: Depth,
    ) -> Result<()> {
        for (name, value) in [
            ("altId", &self.alt_id),
            ("slugline", &self.slugline),
            ("headline", &self.headline),
            ("by", &self.by),
            ("urgency", &self.urgency),
            ("language", &self.language),
        ] {
            if !value.is_empty() {
                document.properties.push(Property::new(name, value));
            }
        }
        for description in &self.descriptions {
            let mut prop = Property::new("description", &description.text);
            if !description.role.is_empty() {
                prop = prop.with_parameter("role", &description.role);
            }
            document.properties.push(prop);
        }
        if let Some(info_source) = &self.info_source {
            let mut prop = Property::new("infoSource", &info_source.text);
            if !info_source.literal.is_empty() {
                prop = prop.with_parameter("literal", &info_source.literal);
            }
            document.properties.push(prop);
        }
        if let Some(creator) = &self.creator {
            let mut prop = Property::new("creator", &creator.text);
            if !creator.literal.is_empty() {
                prop = prop.with_parameter("literal", &creator.literal);
            }
            document.properties.push(prop);
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

        let allowed = opts.allowed_content_meta_links();
        for (i, link) in self.links.iter().enumerate() {
            let link_type = link.attr("type").unwrap_or_default();
            if !allowed.contains(link_type) {
                continue;
            }
            let block =
                object::block_from_link(link, opts, Context::Link, depth).map_err(|err| {
                    Error::MalformedDocument(format!("failed to convert link {i}: {err}"))
                })?;
            document.links.push(block);
        }

        for prop in &self.ext_properties {
            let mut property = Property::new(&prop.prop_type, &prop.value);
            if !prop.literal.is_empty() {
                property = property.with_parameter("literal", &prop.literal);
            }
            document.properties.push(property);
        }

        if document.created.is_none() && !self.content_created.is_empty() {
            // A missing or unparsable value is tolerated here.
            if let Ok(Some(created)) = newsml::convert_timestamp(&self.content_created) {
                document.created = Some(created);
            }
        }

        Ok(())
    }
}
