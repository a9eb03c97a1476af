//! Conversion configuration
//!
//! All type mappings, value-handling rules, exception tables and
//! sanitizer settings live in an [`Options`] value. [`Options::defaults`]
//! provides the built-in baseline and [`Options::merge`] layers a custom
//! configuration on top of it. Nothing in this crate consults global
//! state; every converter takes its `Options` as an argument.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{Error, Result};

/// The structural context a block is being converted in. Attribute
/// overrides in the configuration are keyed by this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Context {
    Meta,
    Link,
    Content,
}

impl Context {
    pub fn as_str(&self) -> &'static str {
        match self {
            Context::Meta => "meta",
            Context::Link => "link",
            Context::Content => "content",
        }
    }
}

/// How a data value is written into XML
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ValueHandling {
    /// Escaped character data (the default)
    #[default]
    #[serde(rename = "")]
    Text,
    /// A CDATA section
    #[serde(rename = "cdata")]
    CData,
    /// The value is itself XML and is emitted as child markup
    #[serde(rename = "xml")]
    Xml,
    /// The value becomes an attribute on the data element
    #[serde(rename = "attribute")]
    Attribute,
}

/// Attribute name used by [`ValueHandling::Attribute`] when the
/// configuration does not name one
pub const DEFAULT_VALUE_ATTRIBUTE: &str = "value";

/// Per-key value handling for one block type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeOptions {
    #[serde(default, rename = "value-handling")]
    pub value_handling: ValueHandling,
    #[serde(default, rename = "value-attribute", skip_serializing_if = "String::is_empty")]
    pub value_attribute: String,
}

/// Conversion options for a single block type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockOption {
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub block_type: String,
    /// Text-bearing block types become `<element>` in content groups
    #[serde(default, rename = "isElement")]
    pub is_element: bool,
    /// Block types whose boolean data keys collapse into a flags list
    #[serde(default, rename = "flags")]
    pub has_flags: bool,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub attributes: IndexMap<String, AttributeOptions>,
    /// Per-context attribute overrides, keyed by context name
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub overrides: IndexMap<String, IndexMap<String, AttributeOptions>>,
}

impl BlockOption {
    /// Handling for one data key, defaulting when unconfigured
    pub fn attribute(&self, name: &str) -> AttributeOptions {
        self.attributes.get(name).cloned().unwrap_or_default()
    }
}

/// A qcode to document-type mapping entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QcodeMapping {
    pub qcode: String,
    #[serde(rename = "type")]
    pub doc_type: String,
}

/// A two-way mapping between an XML vocabulary value and a document
/// value, used for statuses and element types
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValueMapping {
    #[serde(rename = "newsml")]
    pub xml: String,
    #[serde(rename = "navigadoc")]
    pub doc: String,
}

/// A sectioned property-name mapping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyMapping {
    pub section: Vec<String>,
    #[serde(rename = "newsml")]
    pub xml: String,
    #[serde(rename = "navigadoc")]
    pub doc: String,
}

/// A relationship scoped to a section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelSection {
    pub name: String,
    pub section: String,
}

/// Routes links and objects of a type into specific item sections
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkObjectException {
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rel: Vec<RelSection>,
    #[serde(default)]
    pub section: Vec<String>,
}

/// Routes properties of a name into specific item sections
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyException {
    #[serde(rename = "type")]
    pub name: String,
    #[serde(default)]
    pub section: Vec<String>,
}

/// Where converted data children of a block are attached on decode
pub const DESTINATION_META: &str = "meta";
pub const DESTINATION_LINK: &str = "link";

/// How the data payload of a conversion-configured type is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DataType {
    /// Element children become nested blocks
    #[default]
    #[serde(rename = "")]
    Xml,
    /// The whole payload is kept verbatim as a single text value
    #[serde(rename = "blob")]
    Blob,
    /// The payload is body markup and round-trips through the content
    /// converter
    #[serde(rename = "idf")]
    Idf,
}

/// One element rule inside a data conversion
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataElement {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub block_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub rel: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<String>,
}

/// Structured conversion of a block type's data payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataConversion {
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub block_type: String,
    /// "meta" or "link"; anything else is rejected when used
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub destination: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub elements: Vec<DataElement>,
    #[serde(default, rename = "data-type")]
    pub datatype: DataType,
    #[serde(default)]
    pub flags: bool,
}

/// Validation rules for one named date element
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DateElementOptions {
    #[serde(default)]
    pub required: bool,
    #[serde(default, rename = "allow-blank")]
    pub allow_blank: bool,
    #[serde(default, rename = "allow-string")]
    pub allow_string: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, rename = "use-attribute", skip_serializing_if = "Option::is_none")]
    pub use_attribute: Option<String>,
}

/// Date validation rules grouped by node kind ("tags", "types",
/// "blocks"), then by date name
pub type DateConfig = IndexMap<String, IndexMap<String, DateElementOptions>>;

/// Node-kind keys of [`DateConfig`]
pub const TAG_NODE: &str = "tags";
pub const TYPE_NODE: &str = "types";
pub const BLOCK_NODE: &str = "blocks";

/// Allowed attributes for one set of HTML elements, both as
/// comma-separated lists
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HtmlElementAttributes {
    #[serde(default, rename = "element", skip_serializing_if = "String::is_empty")]
    pub elements: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub attributes: String,
}

/// HTML sanitizer policy. Boolean fields use `Option` so that a custom
/// configuration only overrides what it explicitly sets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HtmlSanitizeOptions {
    #[serde(default, rename = "allow-standard-attributes", skip_serializing_if = "Option::is_none")]
    pub allow_standard_attributes: Option<bool>,
    #[serde(default, rename = "allow-images", skip_serializing_if = "Option::is_none")]
    pub allow_images: Option<bool>,
    #[serde(default, rename = "allow-lists", skip_serializing_if = "Option::is_none")]
    pub allow_lists: Option<bool>,
    #[serde(default, rename = "allow-tables", skip_serializing_if = "Option::is_none")]
    pub allow_tables: Option<bool>,
    #[serde(default, rename = "allow-relative-urls", skip_serializing_if = "Option::is_none")]
    pub allow_relative_urls: Option<bool>,
    #[serde(default, rename = "allowed-url-schemes", skip_serializing_if = "String::is_empty")]
    pub allowed_url_schemes: String,
    #[serde(default, rename = "allowed-elements-attributes", skip_serializing_if = "Vec::is_empty")]
    pub elements_attributes: Vec<HtmlElementAttributes>,
}

/// The complete conversion configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Options {
    #[serde(default, rename = "text-options")]
    pub text_options: IndexMap<String, BlockOption>,
    #[serde(default, rename = "qcode-type", skip_serializing_if = "Vec::is_empty")]
    pub qcode_types: Vec<QcodeMapping>,
    #[serde(default, rename = "assignment-qcode-type", skip_serializing_if = "Vec::is_empty")]
    pub assignment_qcode_types: Vec<QcodeMapping>,
    #[serde(default, rename = "concept-qcode-type", skip_serializing_if = "Vec::is_empty")]
    pub concept_qcode_types: Vec<QcodeMapping>,
    #[serde(default, rename = "status", skip_serializing_if = "Vec::is_empty")]
    pub statuses: Vec<ValueMapping>,
    #[serde(default, rename = "element-type", skip_serializing_if = "Vec::is_empty")]
    pub element_types: Vec<ValueMapping>,
    #[serde(default, rename = "property-type", skip_serializing_if = "Vec::is_empty")]
    pub property_types: Vec<PropertyMapping>,
    #[serde(default, rename = "link-exceptions", skip_serializing_if = "Vec::is_empty")]
    pub link_exceptions: Vec<LinkObjectException>,
    #[serde(default, rename = "object-exceptions", skip_serializing_if = "Vec::is_empty")]
    pub object_exceptions: Vec<LinkObjectException>,
    #[serde(default, rename = "property-exceptions", skip_serializing_if = "Vec::is_empty")]
    pub property_exceptions: Vec<PropertyException>,
    #[serde(default, rename = "data-conversions", skip_serializing_if = "Vec::is_empty")]
    pub data_conversions: Vec<DataConversion>,
    #[serde(default, rename = "date-elements", skip_serializing_if = "IndexMap::is_empty")]
    pub date_elements: DateConfig,
    #[serde(default, rename = "html-sanitize-options")]
    pub html_sanitize: HtmlSanitizeOptions,
}

impl Options {
    /// An empty configuration
    pub fn new() -> Self {
        Options::default()
    }

    /// Parse a configuration from JSON
    pub fn from_json(input: &str) -> Result<Self> {
        let opts: Options = serde_json::from_str(input)?;
        Ok(opts)
    }

    /// Mark block types as text elements
    pub fn elements(&mut self, types: &[&str]) {
        for t in types {
            let option = self.entry(t);
            option.is_element = true;
        }
    }

    /// Mark block types as flag-capable
    pub fn support_flags(&mut self, types: &[&str]) {
        for t in types {
            let option = self.entry(t);
            option.has_flags = true;
        }
    }

    /// Set attribute handling for a block type
    pub fn attributes(&mut self, block_type: &str, attrs: &[(&str, AttributeOptions)]) {
        let option = self.entry(block_type);
        for (name, value) in attrs {
            option.attributes.insert((*name).to_string(), value.clone());
        }
    }

    /// Set contextual attribute overrides for a block type
    pub fn override_attributes(
        &mut self,
        block_type: &str,
        context: Context,
        attrs: &[(&str, AttributeOptions)],
    ) {
        let option = self.entry(block_type);
        let overrides = option
            .overrides
            .entry(context.as_str().to_string())
            .or_default();
        for (name, value) in attrs {
            overrides.insert((*name).to_string(), value.clone());
        }
    }

    fn entry(&mut self, block_type: &str) -> &mut BlockOption {
        let option = self
            .text_options
            .entry(block_type.to_string())
            .or_default();
        if option.block_type.is_empty() {
            option.block_type = block_type.to_string();
        }
        option
    }

    /// Options for a block type with any overrides for the given
    /// context applied on top of the base attributes
    pub fn block_options(&self, block_type: &str, context: Context) -> BlockOption {
        let mut option = self
            .text_options
            .get(block_type)
            .cloned()
            .unwrap_or_default();
        if let Some(overrides) = option.overrides.get(context.as_str()).cloned() {
            for (name, value) in overrides {
                option.attributes.insert(name, value);
            }
        }
        option
    }

    /// True when the block type renders as a text element in content
    pub fn is_element_type(&self, block_type: &str) -> bool {
        self.text_options
            .get(block_type)
            .map(|o| o.is_element)
            .unwrap_or(false)
    }

    /// Data conversion configured for a block type, if any
    pub fn data_conversion_for_type(&self, block_type: &str) -> Option<&DataConversion> {
        self.data_conversions
            .iter()
            .find(|dc| dc.block_type == block_type)
    }

    /// Element rule for a tag within the conversion of a block type
    pub fn data_conversion_element(&self, block_type: &str, tag: &str) -> Option<&DataElement> {
        self.data_conversions
            .iter()
            .flat_map(|dc| dc.elements.iter())
            .find(|e| e.block_type == block_type && e.name == tag)
    }

    /// Destination for converted data children of a block type. The
    /// value is validated where it is acted on; "meta" applies when no
    /// conversion is configured.
    pub fn element_destination(&self, block_type: &str) -> &str {
        match self.data_conversion_for_type(block_type) {
            Some(dc) => dc.destination.as_str(),
            None => DESTINATION_META,
        }
    }

    /// Map an XML status qcode to its document value, passing unknown
    /// values through
    pub fn status_from_xml(&self, status: &str) -> String {
        self.statuses
            .iter()
            .find(|s| s.xml == status)
            .map(|s| s.doc.clone())
            .unwrap_or_else(|| status.to_string())
    }

    /// Map a document status to its XML qcode, passing unknown values
    /// through
    pub fn status_to_xml(&self, status: &str) -> String {
        self.statuses
            .iter()
            .find(|s| s.doc == status)
            .map(|s| s.xml.clone())
            .unwrap_or_else(|| status.to_string())
    }

    /// Map an XML element name to its document block type, passing
    /// unknown values through
    pub fn element_type_from_xml(&self, name: &str) -> String {
        self.element_types
            .iter()
            .find(|e| e.xml == name)
            .map(|e| e.doc.clone())
            .unwrap_or_else(|| name.to_string())
    }

    /// Map a document block type to its XML element name, passing
    /// unknown values through
    pub fn element_type_to_xml(&self, block_type: &str) -> String {
        self.element_types
            .iter()
            .find(|e| e.doc == block_type)
            .map(|e| e.xml.clone())
            .unwrap_or_else(|| block_type.to_string())
    }

    /// Document type for an item-class qcode
    pub fn qcode_to_document_type(&self, qcode: &str) -> Result<String> {
        self.qcode_types
            .iter()
            .find(|q| q.qcode == qcode)
            .map(|q| q.doc_type.clone())
            .ok_or_else(|| Error::MissingMapping(format!("no document type for qcode {}", qcode)))
    }

    /// Item-class qcode for a document type
    pub fn document_type_to_qcode(&self, doc_type: &str) -> Result<String> {
        self.qcode_types
            .iter()
            .find(|q| q.doc_type == doc_type)
            .map(|q| q.qcode.clone())
            .ok_or_else(|| Error::MissingMapping(format!("no qcode for document type {}", doc_type)))
    }

    /// Concept qcode for a document type
    pub fn concept_type_to_qcode(&self, doc_type: &str) -> Result<String> {
        self.concept_qcode_types
            .iter()
            .find(|q| q.doc_type == doc_type)
            .map(|q| q.qcode.clone())
            .ok_or_else(|| Error::MissingMapping(format!("no qcode for document type {}", doc_type)))
    }

    /// Assignment qcode for a document type
    pub fn assignment_type_to_qcode(&self, doc_type: &str) -> Result<String> {
        self.assignment_qcode_types
            .iter()
            .find(|q| q.doc_type == doc_type)
            .map(|q| q.qcode.clone())
            .ok_or_else(|| Error::MissingMapping(format!("no qcode for document type {}", doc_type)))
    }

    /// Document type for an assignment qcode
    pub fn assignment_qcode_to_type(&self, qcode: &str) -> Result<String> {
        self.assignment_qcode_types
            .iter()
            .find(|q| q.qcode == qcode)
            .map(|q| q.doc_type.clone())
            .ok_or_else(|| Error::MissingMapping(format!("no document type for qcode {}", qcode)))
    }

    /// Planning-style property renames: XML name for a document
    /// property within a section
    pub fn property_name_to_xml(&self, section: &str, name: &str) -> Option<&str> {
        self.property_types
            .iter()
            .find(|p| p.doc == name && p.section.iter().any(|s| s == section))
            .map(|p| p.xml.as_str())
    }

    /// Planning-style property renames: document name for an XML
    /// property within a section
    pub fn property_name_from_xml(&self, section: &str, name: &str) -> Option<&str> {
        self.property_types
            .iter()
            .find(|p| p.xml == name && p.section.iter().any(|s| s == section))
            .map(|p| p.doc.as_str())
    }

    /// Whether a property is routed away from the itemMeta of the given
    /// document type
    pub fn is_property_exception(&self, doc_type: &str, name: &str) -> bool {
        for prop in &self.property_exceptions {
            if !prop.name.eq_ignore_ascii_case(name) {
                continue;
            }
            let sections: HashSet<&str> = prop.section.iter().map(|s| s.as_str()).collect();
            return match doc_type {
                "x-im/article" | "x-im/image" | "x-im/graphic" | "x-im/pdf" => {
                    !sections.contains("itemmeta-newsitem")
                }
                "x-im/newscoverage" => !sections.contains("itemmeta-planning"),
                "x-im/assignment" => !sections.contains("itemmeta-assignment"),
                _ => {
                    !sections.contains("itemmeta-concept")
                        || sections.contains("itemmeta-conceptitem")
                }
            };
        }
        false
    }

    /// Whether a property belongs to the given section
    pub fn has_property_exception(&self, name: &str, section: &str) -> bool {
        for prop in &self.property_exceptions {
            if !prop.name.eq_ignore_ascii_case(name) {
                continue;
            }
            let extra = match section {
                "contentmeta" => "itemmeta-newsml",
                "planning" => "itemmeta-planning",
                _ => continue,
            };
            if prop.section.iter().any(|s| s == section || s == extra) {
                return true;
            }
        }
        false
    }

    /// Whether a property name is listed under the given section alone,
    /// with no implied extras
    pub fn is_section_property(&self, name: &str, section: &str) -> bool {
        self.property_exceptions.iter().any(|p| {
            p.name.eq_ignore_ascii_case(name) && p.section.iter().any(|s| s == section)
        })
    }

    /// Whether an object type is listed under the given section
    pub fn is_section_object(&self, block_type: &str, section: &str) -> bool {
        self.object_exceptions
            .iter()
            .any(|o| o.block_type == block_type && o.section.iter().any(|s| s == section))
    }

    /// Link types allowed in contentMeta
    pub fn allowed_content_meta_links(&self) -> HashSet<&str> {
        self.link_exceptions
            .iter()
            .filter(|l| l.section.iter().any(|s| s == "contentmeta"))
            .map(|l| l.block_type.as_str())
            .collect()
    }

    /// Whether a link is routed away from newsItem itemMeta
    pub fn is_item_meta_link_exception(&self, link_type: &str, link_rel: &str) -> bool {
        for link in &self.link_exceptions {
            if link.block_type != link_type {
                continue;
            }
            if link.section.iter().any(|s| s == "itemmeta-newsitem") {
                return false;
            }
            if link.rel.is_empty() {
                return true;
            }
            if link.rel.iter().any(|r| r.name == link_rel) {
                return true;
            }
        }
        false
    }

    /// Whether a category link with the given rel stays in itemMeta
    pub fn is_item_meta_category_rel(&self, rel: &str) -> bool {
        for link in &self.link_exceptions {
            if link.block_type == "x-im/category" && link.rel.iter().any(|r| r.name == rel) {
                return false;
            }
        }
        true
    }

    /// Whether an object type belongs in concept metadata
    pub fn is_concept_object_type(&self, block_type: &str) -> bool {
        self.object_exceptions.iter().any(|o| {
            o.block_type == block_type && o.section.iter().any(|s| s == "concept")
        })
    }

    /// Whether an object type belongs in the itemMeta of the given
    /// document type
    pub fn is_item_meta_object_type(&self, doc_type: &str, block_type: &str) -> bool {
        for object in &self.object_exceptions {
            if object.block_type != block_type {
                continue;
            }
            let sections: HashSet<&str> = object.section.iter().map(|s| s.as_str()).collect();
            return match doc_type {
                "x-im/article" | "x-im/image" | "x-im/graphic" | "x-im/pdf" => {
                    sections.contains("itemmeta-newsitem")
                }
                "x-im/newscoverage" => sections.contains("itemmeta-planning"),
                "x-im/assignment" => sections.contains("itemmeta-assignment"),
                _ => {
                    sections.contains("itemmeta-concept")
                        || sections.contains("itemmeta-conceptitem")
                }
            };
        }
        false
    }

    /// Whether a date name is validated within a node-kind group
    pub fn is_date(&self, group: &str, name: &str) -> bool {
        self.date_elements
            .get(group)
            .map(|g| g.contains_key(name))
            .unwrap_or(false)
    }

    fn date_options(&self, group: &str, name: &str) -> Option<&DateElementOptions> {
        self.date_elements.get(group)?.get(name)
    }

    pub fn date_required(&self, group: &str, name: &str) -> bool {
        self.date_options(group, name).map(|d| d.required).unwrap_or(false)
    }

    pub fn date_allow_blank(&self, group: &str, name: &str) -> bool {
        self.date_options(group, name).map(|d| d.allow_blank).unwrap_or(false)
    }

    pub fn date_allow_string(&self, group: &str, name: &str) -> bool {
        self.date_options(group, name).map(|d| d.allow_string).unwrap_or(false)
    }

    /// Date format name, "RFC3339" when unspecified
    pub fn date_format(&self, group: &str, name: &str) -> &str {
        self.date_options(group, name)
            .and_then(|d| d.format.as_deref())
            .unwrap_or("RFC3339")
    }

    /// Attribute carrying the date value, "value" when unspecified
    pub fn date_attribute(&self, group: &str, name: &str) -> &str {
        self.date_options(group, name)
            .and_then(|d| d.use_attribute.as_deref())
            .unwrap_or(DEFAULT_VALUE_ATTRIBUTE)
    }

    /// Layer a custom configuration over this one.
    ///
    /// Text options replace by type. Qcode, status, element-type,
    /// property-type and data-conversion tables append, so custom
    /// entries with new keys extend the table while lookups keep
    /// finding the earlier baseline entries first. Link, object and
    /// property exceptions merge by type with section union. Date
    /// elements replace per name within matching groups. Sanitizer
    /// booleans apply only when the custom value is set.
    pub fn merge(&mut self, custom: Options) {
        for (key, value) in custom.text_options {
            self.text_options.insert(key, value);
        }
        self.concept_qcode_types.extend(custom.concept_qcode_types);
        self.qcode_types.extend(custom.qcode_types);
        self.assignment_qcode_types.extend(custom.assignment_qcode_types);
        self.statuses.extend(custom.statuses);
        self.property_types.extend(custom.property_types);
        self.element_types.extend(custom.element_types);

        merge_link_object_exceptions(&mut self.link_exceptions, custom.link_exceptions);
        merge_link_object_exceptions(&mut self.object_exceptions, custom.object_exceptions);

        let mut new_props = Vec::new();
        for prop in custom.property_exceptions {
            match self
                .property_exceptions
                .iter_mut()
                .find(|p| p.name == prop.name)
            {
                Some(existing) => {
                    existing.section = merge_sections(&existing.section, &prop.section);
                }
                None => new_props.push(prop),
            }
        }
        self.property_exceptions.extend(new_props);

        self.data_conversions.extend(custom.data_conversions);

        for (group, names) in custom.date_elements {
            if let Some(existing) = self.date_elements.get_mut(&group) {
                for (name, value) in names {
                    existing.insert(name, value);
                }
            }
        }

        let html = custom.html_sanitize;
        if html.allow_standard_attributes.is_some() {
            self.html_sanitize.allow_standard_attributes = html.allow_standard_attributes;
        }
        if html.allow_tables.is_some() {
            self.html_sanitize.allow_tables = html.allow_tables;
        }
        if html.allow_images.is_some() {
            self.html_sanitize.allow_images = html.allow_images;
        }
        if html.allow_lists.is_some() {
            self.html_sanitize.allow_lists = html.allow_lists;
        }
        if html.allow_relative_urls.is_some() {
            self.html_sanitize.allow_relative_urls = html.allow_relative_urls;
        }
        if !html.allowed_url_schemes.is_empty() {
            self.html_sanitize.allowed_url_schemes = html.allowed_url_schemes;
        }

        // Custom element rules come first so they win on dedup
        let mut merged = html.elements_attributes;
        merged.append(&mut self.html_sanitize.elements_attributes);
        let mut seen = HashSet::new();
        merged.retain(|e| seen.insert(e.elements.clone()));
        self.html_sanitize.elements_attributes = merged;
    }

    /// The built-in baseline configuration
    pub fn defaults() -> Self {
        let mut opts = Options::new();

        opts.elements(&[
            "x-im/paragraph", "preamble", "leadin", "body", "dateline",
            "headline", "x-im/header", "subheadline", "subheadline1", "subheadline2",
            "subheadline3", "subheadline4", "subheadline5",
            "drophead", "fact-body", "pagedateline", "preleadin",
            "madmansrow", "blockquote", "x-im/unordered-list",
            "x-im/ordered-list", "monospace", "byline", "attribution",
        ]);

        opts.support_flags(&["x-im/image", "x-im/teaser"]);

        let cdata = AttributeOptions {
            value_handling: ValueHandling::CData,
            value_attribute: String::new(),
        };
        let xml = AttributeOptions {
            value_handling: ValueHandling::Xml,
            value_attribute: String::new(),
        };

        opts.attributes("x-im/iframely", &[("embedCode", cdata.clone())]);
        opts.attributes("x-im/youtube", &[("embedCode", cdata.clone())]);
        opts.attributes("x-im/htmlembed", &[("embedCode", cdata)]);
        opts.attributes("x-im/table", &[
            ("thead", xml.clone()),
            ("tbody", xml.clone()),
            ("tfoot", xml.clone()),
        ]);
        opts.attributes("x-im/teaser", &[("title", xml.clone()), ("text", xml.clone())]);
        opts.attributes("x-im/content-part", &[
            ("caption", xml.clone()),
            ("title", xml.clone()),
            ("subject", xml.clone()),
        ]);
        opts.attributes("x-im/pdf", &[("title", xml.clone()), ("text", xml.clone())]);
        opts.attributes("x-im/imagegallery", &[("text", xml.clone())]);
        opts.override_attributes("x-im/image", Context::Content, &[("text", xml)]);

        opts.qcode_types = qcode_table(&[
            ("ninat:picture", "x-im/image"),
            ("ninat:graphic", "x-im/pdf"),
            ("ninat:text", "x-im/article"),
            ("ninat:video", "x-im/video"),
            ("cinat:concept", "x-im/concept"),
        ]);

        opts.assignment_qcode_types = qcode_table(&[
            ("ninat:picture", "x-im/image"),
            ("ninat:graphic", "x-im/pdf"),
            ("ninat:text", "x-im/article"),
            ("ninat:video", "x-im/video"),
        ]);

        opts.concept_qcode_types = qcode_table(&[
            ("cpnat:person", "x-im/author"),
            ("cpnat:object", "x-im/category"),
            ("cpnat:abstract", "x-im/channel"),
            ("cpnat:object", "x-im/content-profile"),
            ("cpnat:event", "x-im/event"),
            ("cpnat:organisation", "x-im/organisation"),
            ("cpnat:person", "x-im/person"),
            ("cpnat:poi", "x-im/place"),
            ("cpnat:object", "x-im/section"),
            ("cpnat:object", "x-im/topic"),
            ("cpnat:abstract", "x-im/story"),
        ]);

        opts.statuses = value_table(&[
            ("imext:draft", "draft"),
            ("imext:done", "done"),
            ("imext:approved", "approved"),
            ("stat:usable", "usable"),
            ("stat:canceled", "canceled"),
            ("stat:withheld", "withheld"),
        ]);

        opts.element_types = value_table(&[
            ("body", "x-im/paragraph"),
            ("headline", "x-im/header"),
        ]);

        opts.property_types = vec![
            property_mapping("planning", "nrpdate:start", "imext:start"),
            property_mapping("planning", "nrpdate:end", "imext:end"),
            property_mapping("planning", "nrpdate:created", "imext:created"),
            property_mapping("planning", "nrpdate:modified", "imext:modified"),
            property_mapping("planning", "nrp:sector", "imext:sector"),
        ];

        opts.link_exceptions = vec![
            link_exception("x-im/articlesource", &[], &["contentmeta"]),
            link_exception("x-im/premium", &[], &["contentmeta"]),
            link_exception("x-im/articletype", &[], &["contentmeta"]),
            link_exception("x-geo/point", &[], &["contentmeta"]),
            link_exception("x-im/contenttype", &[], &["contentmeta"]),
            link_exception("x-im/articlecontent", &[], &["contentmeta"]),
            link_exception("x-im/articlecontenttype", &[], &["contentmeta"]),
            link_exception(
                "x-im/category",
                &[("category", "planning"), ("category", "contentmeta")],
                &["contentmeta"],
            ),
            link_exception("x-im/articleoptions", &[], &["contentmeta"]),
            link_exception("x-im/articleoptions/plus", &[], &["contentmeta"]),
            link_exception(
                "x-im/articleoptions/comments",
                &[("comment", "contentmeta")],
                &["contentmeta"],
            ),
            link_exception("x-im/plus", &[], &["contentmeta"]),
        ];

        opts.object_exceptions = vec![
            link_exception("x-im/contact-info", &[], &["concept"]),
            link_exception("x-im/position", &[], &["concept"]),
            link_exception("x-im/event-details", &[], &["concept"]),
            link_exception("cpnat:person", &[], &["conceptitem"]),
            link_exception("cpnat:object", &[], &["conceptitem"]),
            link_exception("cpnat:event", &[], &["conceptitem"]),
            link_exception("cpnat:abstract", &[], &["conceptitem"]),
            link_exception("cpnat:organisation", &[], &["conceptitem"]),
            link_exception("cpnat:poi", &[], &["conceptitem"]),
            link_exception("x-im/event", &[], &["conceptitem"]),
            link_exception("x-im/polygon", &[], &["concept"]),
        ];

        opts.property_exceptions = property_exception_table(&[
            ("imext:description", &["list"]),
            ("imext:product", &["list", "package"]),
            ("imext:itemLimit", &["list"]),
            ("imext:type", &["list", "package"]),
            ("imext:pubstart", &["package"]),
            ("imext:pubstop", &["package"]),
            ("imext:cover", &["package"]),
            ("category", &["package"]),
            ("uri", &["contentmeta"]),
            ("altId", &["contentmeta"]),
            ("infosource", &["contentmeta"]),
            ("contentcreated", &["contentmeta"]),
            ("contentmodified", &["contentmeta"]),
            ("type", &["contentmeta"]),
            ("by", &["contentmeta"]),
            ("headline", &["contentmeta"]),
            ("description", &["contentmeta", "concept"]),
            ("definition", &["concept"]),
            ("slugline", &["contentmeta", "planning"]),
            ("provider", &["contentmeta"]),
            ("nrp:sector", &["contentmeta", "concept"]),
            ("imext:header", &["contentmeta"]),
            ("imext:subheader", &["contentmeta"]),
            ("imext:deck", &["contentmeta"]),
            ("imext:simplebyline", &["contentmeta"]),
            ("copyrightholder", &["planning", "concept"]),
            ("headline", &["planning"]),
            ("imext:headline", &["concept"]),
            ("imext:slugline", &["concept"]),
            ("urgency", &["planning", "concept"]),
            ("concepttypes", &["concept"]),
            ("imext:qcode", &["concept"]),
            ("nrptype:evtyp", &["concept"]),
            ("infoSource", &["contentmeta"]),
            ("creator", &["contentmeta"]),
            ("language", &["contentmeta"]),
            ("conceptid", &["concept"]),
        ]);

        let nano = DateElementOptions {
            format: Some("RFC3339Nano".to_string()),
            ..Default::default()
        };
        let mut tags = IndexMap::new();
        tags.insert("firstCreated".to_string(), nano.clone());
        tags.insert("versionCreated".to_string(), nano.clone());
        tags.insert("contentCreated".to_string(), nano.clone());
        tags.insert("contentModified".to_string(), nano);
        opts.date_elements.insert(TAG_NODE.to_string(), tags);

        opts.html_sanitize = HtmlSanitizeOptions {
            allow_standard_attributes: Some(true),
            allow_images: Some(true),
            allow_lists: Some(true),
            allow_tables: Some(true),
            allow_relative_urls: Some(false),
            allowed_url_schemes: "http,https,mailto,sms,tel,callto".to_string(),
            elements_attributes: vec![
                element_attrs("strong", "id,type"),
                element_attrs("em", ""),
                element_attrs("mark", "id"),
                element_attrs("a", "href,rel,target,download,title"),
                element_attrs("element", "id,type"),
                element_attrs("ins", "id,collapsed,creationdate,modificationdate,username"),
                element_attrs("code", "id"),
                element_attrs(
                    "x-person",
                    "id,tag,tagdescription,tagid,tagimageurl,taglongdescription",
                ),
            ],
        };

        opts
    }
}

fn merge_link_object_exceptions(
    base: &mut Vec<LinkObjectException>,
    custom: Vec<LinkObjectException>,
) {
    let mut new_entries = Vec::new();
    for entry in custom {
        match base.iter_mut().find(|b| b.block_type == entry.block_type) {
            Some(existing) => {
                existing.rel = entry.rel;
                existing.section = merge_sections(&existing.section, &entry.section);
            }
            None => new_entries.push(entry),
        }
    }
    base.extend(new_entries);
}

/// Union of two section lists, deduplicated, with itemmeta-scoped
/// sections displacing their plain counterparts
fn merge_sections(base: &[String], custom: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    for section in base.iter().chain(custom.iter()) {
        if !merged.contains(section) {
            merged.push(section.clone());
        }
    }

    let mut removals: Vec<&str> = Vec::new();
    for section in &merged {
        match section.as_str() {
            "itemmeta-newsitem" => removals.push("contentmeta"),
            "itemmeta-concept" => removals.push("concept"),
            "itemmeta-conceptitem" => removals.push("conceptitem"),
            "itemmeta-planning" => removals.push("planning"),
            _ => {}
        }
    }
    let removals: Vec<String> = removals.into_iter().map(String::from).collect();
    merged.retain(|s| !removals.contains(s));
    merged
}

fn qcode_table(entries: &[(&str, &str)]) -> Vec<QcodeMapping> {
    entries
        .iter()
        .map(|(qcode, doc_type)| QcodeMapping {
            qcode: (*qcode).to_string(),
            doc_type: (*doc_type).to_string(),
        })
        .collect()
}

fn value_table(entries: &[(&str, &str)]) -> Vec<ValueMapping> {
    entries
        .iter()
        .map(|(xml, doc)| ValueMapping {
            xml: (*xml).to_string(),
            doc: (*doc).to_string(),
        })
        .collect()
}

fn property_mapping(section: &str, xml: &str, doc: &str) -> PropertyMapping {
    PropertyMapping {
        section: vec![section.to_string()],
        xml: xml.to_string(),
        doc: doc.to_string(),
    }
}

fn link_exception(
    block_type: &str,
    rels: &[(&str, &str)],
    sections: &[&str],
) -> LinkObjectException {
    LinkObjectException {
        block_type: block_type.to_string(),
        rel: rels
            .iter()
            .map(|(name, section)| RelSection {
                name: (*name).to_string(),
                section: (*section).to_string(),
            })
            .collect(),
        section: sections.iter().map(|s| (*s).to_string()).collect(),
    }
}

fn property_exception_table(entries: &[(&str, &[&str])]) -> Vec<PropertyException> {
    entries
        .iter()
        .map(|(name, sections)| PropertyException {
            name: (*name).to_string(),
            section: sections.iter().map(|s| (*s).to_string()).collect(),
        })
        .collect()
}

fn element_attrs(elements: &str, attributes: &str) -> HtmlElementAttributes {
    HtmlElementAttributes {
        elements: elements.to_string(),
        attributes: attributes.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_element_types() {
        let opts = Options::defaults();
        assert!(opts.is_element_type("x-im/paragraph"));
        assert!(opts.is_element_type("blockquote"));
        assert!(!opts.is_element_type("x-im/image"));
    }

    #[test]
    fn test_block_options_context_override() {
        let opts = Options::defaults();

        let base = opts.block_options("x-im/image", Context::Meta);
        assert_eq!(base.attribute("text").value_handling, ValueHandling::Text);

        let content = opts.block_options("x-im/image", Context::Content);
        assert_eq!(content.attribute("text").value_handling, ValueHandling::Xml);
        assert!(content.has_flags);
    }

    #[test]
    fn test_status_mapping_passes_unknown_through() {
        let opts = Options::defaults();
        assert_eq!(opts.status_to_xml("draft"), "imext:draft");
        assert_eq!(opts.status_from_xml("stat:usable"), "usable");
        assert_eq!(opts.status_to_xml("bespoke"), "bespoke");
    }

    #[test]
    fn test_qcode_lookup_errors_on_unknown() {
        let opts = Options::defaults();
        assert_eq!(
            opts.qcode_to_document_type("ninat:text").unwrap(),
            "x-im/article"
        );
        assert!(matches!(
            opts.document_type_to_qcode("x-im/unknown"),
            Err(Error::MissingMapping(_))
        ));
    }

    #[test]
    fn test_concept_qcode_first_match_wins() {
        let opts = Options::defaults();
        assert_eq!(
            opts.concept_type_to_qcode("x-im/author").unwrap(),
            "cpnat:person"
        );
        assert_eq!(
            opts.concept_type_to_qcode("x-im/topic").unwrap(),
            "cpnat:object"
        );
    }

    #[test]
    fn test_property_exception_doc_type_scoping() {
        let opts = Options::defaults();
        // contentmeta-scoped properties are exceptions for articles
        assert!(opts.is_property_exception("x-im/article", "slugline"));
        // planning-scoped names are exceptions for newscoverage
        assert!(opts.is_property_exception("x-im/newscoverage", "urgency"));
        // unknown names are not
        assert!(!opts.is_property_exception("x-im/article", "nosuch"));
    }

    #[test]
    fn test_item_meta_link_exception_rel_scoping() {
        let opts = Options::defaults();
        assert!(opts.is_item_meta_link_exception("x-im/premium", ""));
        assert!(opts.is_item_meta_link_exception("x-im/category", "category"));
        assert!(!opts.is_item_meta_link_exception("x-im/category", "subject"));
        assert!(!opts.is_item_meta_category_rel("category"));
        assert!(opts.is_item_meta_category_rel("subject"));
    }

    #[test]
    fn test_element_destination_default() {
        let mut opts = Options::defaults();
        assert_eq!(opts.element_destination("x-im/socialembed"), "meta");

        opts.data_conversions.push(DataConversion {
            block_type: "x-im/socialembed".to_string(),
            destination: "link".to_string(),
            ..Default::default()
        });
        assert_eq!(opts.element_destination("x-im/socialembed"), "link");
    }

    #[test]
    fn test_merge_overrides_text_options_by_key() {
        let mut base = Options::defaults();
        let mut custom = Options::new();
        custom.attributes("x-im/youtube", &[(
            "embedCode",
            AttributeOptions {
                value_handling: ValueHandling::Xml,
                value_attribute: String::new(),
            },
        )]);
        base.merge(custom);
        let option = base.block_options("x-im/youtube", Context::Meta);
        assert_eq!(option.attribute("embedCode").value_handling, ValueHandling::Xml);
    }

    #[test]
    fn test_merge_sections_itemmeta_displaces_plain() {
        let mut base = Options::defaults();
        let mut custom = Options::new();
        custom.property_exceptions.push(PropertyException {
            name: "slugline".to_string(),
            section: vec!["itemmeta-planning".to_string()],
        });
        base.merge(custom);

        let slugline = base
            .property_exceptions
            .iter()
            .find(|p| p.name == "slugline")
            .unwrap();
        assert!(slugline.section.iter().any(|s| s == "itemmeta-planning"));
        assert!(!slugline.section.iter().any(|s| s == "planning"));
        assert!(slugline.section.iter().any(|s| s == "contentmeta"));
    }

    #[test]
    fn test_merge_appends_new_exception_types() {
        let mut base = Options::defaults();
        let mut custom = Options::new();
        custom.link_exceptions.push(link_exception(
            "x-custom/thing",
            &[],
            &["contentmeta"],
        ));
        base.merge(custom);
        assert!(base.allowed_content_meta_links().contains("x-custom/thing"));
    }

    #[test]
    fn test_merge_html_booleans_only_when_set() {
        let mut base = Options::defaults();
        let custom = Options::new();
        base.merge(custom);
        assert_eq!(base.html_sanitize.allow_tables, Some(true));

        let mut custom = Options::new();
        custom.html_sanitize.allow_tables = Some(false);
        base.merge(custom);
        assert_eq!(base.html_sanitize.allow_tables, Some(false));
        assert_eq!(base.html_sanitize.allow_images, Some(true));
    }

    #[test]
    fn test_merge_element_attributes_custom_wins() {
        let mut base = Options::defaults();
        let mut custom = Options::new();
        custom
            .html_sanitize
            .elements_attributes
            .push(element_attrs("a", "href"));
        base.merge(custom);

        let a = base
            .html_sanitize
            .elements_attributes
            .iter()
            .find(|e| e.elements == "a")
            .unwrap();
        assert_eq!(a.attributes, "href");
        let count = base
            .html_sanitize
            .elements_attributes
            .iter()
            .filter(|e| e.elements == "a")
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_merge_date_elements_per_name() {
        let mut base = Options::defaults();
        let mut custom = Options::new();
        let mut tags = IndexMap::new();
        tags.insert(
            "firstCreated".to_string(),
            DateElementOptions {
                allow_blank: true,
                format: Some("RFC3339".to_string()),
                ..Default::default()
            },
        );
        custom.date_elements.insert(TAG_NODE.to_string(), tags);
        base.merge(custom);

        assert!(base.date_allow_blank(TAG_NODE, "firstCreated"));
        assert_eq!(base.date_format(TAG_NODE, "firstCreated"), "RFC3339");
        assert_eq!(base.date_format(TAG_NODE, "versionCreated"), "RFC3339Nano");
    }

    #[test]
    fn test_value_handling_from_json() {
        let json = r#"{
            "text-options": {
                "x-acme/embed": {
                    "type": "x-acme/embed",
                    "attributes": {
                        "code": {"value-handling": "cdata"},
                        "id": {"value-handling": "attribute", "value-attribute": "guid"}
                    }
                }
            }
        }"#;
        let opts = Options::from_json(json).unwrap();
        let option = opts.block_options("x-acme/embed", Context::Meta);
        assert_eq!(option.attribute("code").value_handling, ValueHandling::CData);
        let id = option.attribute("id");
        assert_eq!(id.value_handling, ValueHandling::Attribute);
        assert_eq!(id.value_attribute, "guid");
    }

    #[test]
    fn test_date_defaults() {
        let opts = Options::defaults();
        assert!(opts.is_date(TAG_NODE, "firstCreated"));
        assert!(!opts.is_date(TAG_NODE, "unrelated"));
        assert_eq!(opts.date_attribute(TAG_NODE, "firstCreated"), "value");
        assert!(!opts.date_allow_string(TAG_NODE, "firstCreated"));
    }
}
