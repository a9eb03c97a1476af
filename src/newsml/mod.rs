//! NewsML-G2 item assembly and disassembly.
//!
//! Each submodule owns one layer of the format: `data` transcodes block
//! data maps, `object` handles link/object trees, `content` handles the
//! IDF content set, and the remaining modules assemble whole items
//! (news, concept, planning, assignment, list, package).

pub mod assignment;
pub mod concept;
pub mod conceptitem;
pub mod content;
pub mod contentmeta;
pub mod data;
pub mod itemmeta;
pub mod listpackage;
pub mod newsitem;
pub mod object;
pub mod planning;

use chrono::{DateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::dom::Element;
use crate::error::{Error, Result};

/// NewsML-G2 namespace used on every item root.
pub const NAR_NAMESPACE: &str = "http://iptc.org/std/nar/2006-10-01/";
/// Namespace for the `links`/`metadata`/`object` extension containers.
pub const NEWSML_NAMESPACE: &str = "http://www.infomaker.se/newsml/1.0";
/// Namespace of the IDF content markup inside `contentSet`.
pub const IDF_NAMESPACE: &str = "http://www.infomaker.se/idf/1.0";

const CONFORMANCE: &str = "power";
const STANDARD: &str = "NewsML-G2";
const STANDARD_VERSION: &str = "2.26";
const ITEM_VERSION: &str = "1";

const CATALOG_REFS: [&str; 2] = [
    "http://www.iptc.org/std/catalog/catalog.IPTC-G2-Standards_30.xml",
    "http://infomaker.se/spec/catalog/catalog.infomaker.g2.1_0.xml",
];

/// Builds an item root element with the standard envelope attributes.
/// Catalog references are emitted for every root except `planning`.
pub(crate) fn envelope(tag: &str, guid: &str, with_catalog_refs: bool) -> Element {
    let mut root = Element::new(tag)
        .with_attr("xmlns", NAR_NAMESPACE)
        .with_attr("conformance", CONFORMANCE)
        .with_attr("guid", guid)
        .with_attr("standard", STANDARD)
        .with_attr("standardversion", STANDARD_VERSION)
        .with_attr("version", ITEM_VERSION);
    if with_catalog_refs {
        for href in CATALOG_REFS {
            root.push_element(Element::new("catalogRef").with_attr("href", href));
        }
    }
    root
}

static OFFSET_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(Z|[+-][0-1][0-5]:[0-5][0-9])$").unwrap());

/// Parses an RFC 3339 timestamp into UTC. The timestamp must carry an
/// explicit offset. Empty strings and the legacy placeholders `null`
/// and `undefined` yield `None`.
pub fn convert_timestamp(input: &str) -> Result<Option<DateTime<Utc>>> {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed == "null" || trimmed == "undefined" {
        return Ok(None);
    }
    if !OFFSET_SUFFIX.is_match(trimmed) {
        return Err(Error::InvalidArgument(format!(
            "timestamp {trimmed:?} has no UTC offset"
        )));
    }
    let parsed = DateTime::parse_from_rfc3339(trimmed).map_err(|err| {
        Error::InvalidArgument(format!("invalid timestamp {trimmed:?}: {err}"))
    })?;
    Ok(Some(parsed.with_timezone(&Utc)))
}

/// Formats a timestamp with sub-second precision where present.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Formats a timestamp truncated to whole seconds.
pub fn format_timestamp_seconds(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parses a strict RFC 3339 timestamp, naming the field in the error.
pub(crate) fn parse_rfc3339(value: &str, what: &str) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(value)
        .map_err(|_| Error::InvalidArgument(format!("failed to parse {what}: {value}")))?;
    Ok(parsed.with_timezone(&Utc))
}

/// An `<itemMetaExtProperty>`/`<contentMetaExtProperty>`/
/// `<planningExtProperty>` entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ExtProperty {
    pub prop_type: String,
    pub value: String,
    pub creator: String,
    pub why: String,
    pub literal: String,
}

impl ExtProperty {
    pub fn new(prop_type: impl Into<String>, value: impl Into<String>) -> Self {
        ExtProperty {
            prop_type: prop_type.into(),
            value: value.into(),
            ..Default::default()
        }
    }

    pub fn to_element(&self, tag: &str) -> Element {
        let mut el = Element::new(tag)
            .with_attr("type", &self.prop_type)
            .with_attr("value", &self.value);
        el.set_attr_opt("creator", &self.creator);
        el.set_attr_opt("why", &self.why);
        el.set_attr_opt("literal", &self.literal);
        el
    }

    pub fn from_element(el: &Element) -> Self {
        ExtProperty {
            prop_type: el.attr("type").unwrap_or_default().to_string(),
            value: el.attr("value").unwrap_or_default().to_string(),
            creator: el.attr("creator").unwrap_or_default().to_string(),
            why: el.attr("why").unwrap_or_default().to_string(),
            literal: el.attr("literal").unwrap_or_default().to_string(),
        }
    }
}

/// A role-tagged `<description>` entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Description {
    pub role: String,
    pub text: String,
}

impl Description {
    pub fn to_element(&self) -> Element {
        let mut el = Element::new("description");
        el.set_attr_opt("role", &self.role);
        if !self.text.is_empty() {
            el.push_text(&self.text);
        }
        el
    }

    pub fn from_element(el: &Element) -> Self {
        Description {
            role: el.attr("role").unwrap_or_default().to_string(),
            text: el.text(),
        }
    }
}

/// An element with a `literal` attribute and text content, as used by
/// `infoSource` and `creator`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct LiteralValue {
    pub text: String,
    pub literal: String,
}

impl LiteralValue {
    pub fn to_element(&self, tag: &str) -> Element {
        let mut el = Element::new(tag);
        el.set_attr_opt("literal", &self.literal);
        if !self.text.is_empty() {
            el.push_text(&self.text);
        }
        el
    }

    pub fn from_element(el: &Element) -> Self {
        LiteralValue {
            text: el.text(),
            literal: el.attr("literal").unwrap_or_default().to_string(),
        }
    }
}

/// Builds a child element carrying only a `qcode` attribute, as used by
/// `itemClass`, `pubStatus` and `role`.
pub(crate) fn qcode_element(tag: &str, qcode: &str) -> Element {
    Element::new(tag).with_attr("qcode", qcode)
}

/// Wraps child elements in a container carrying the newsml extension
/// namespace. Returns `None` when there are no children.
pub(crate) fn newsml_container(tag: &str, children: Vec<Element>) -> Option<Element> {
    if children.is_empty() {
        return None;
    }
    let mut container = Element::new(tag).with_attr("xmlns", NEWSML_NAMESPACE);
    for child in children {
        container.push_element(child);
    }
    Some(container)
}

/// Builds the `<rightsInfo><copyrightHolder><name>` chain.
pub(crate) fn rights_info_element(holder: &str) -> Element {
    let mut name = Element::new("name");
    name.push_text(holder);
    let mut copyright_holder = Element::new("copyrightHolder");
    copyright_holder.push_element(name);
    let mut rights = Element::new("rightsInfo");
    rights.push_element(copyright_holder);
    rights
}

/// Reads the copyright holder name out of a `<rightsInfo>` element.
pub(crate) fn rights_info_holder(el: &Element) -> Option<String> {
    let name = el.find_child("copyrightHolder")?.find_child("name")?;
    Some(name.text())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn envelope_carries_catalog_refs() {
        let root = envelope("newsItem", "abc-123", true);
        assert_eq!(root.attr("guid"), Some("abc-123"));
        assert_eq!(root.attr("conformance"), Some("power"));
        assert_eq!(root.attr("standardversion"), Some("2.26"));
        assert_eq!(root.find_children("catalogRef").count(), 2);
    }

    #[test]
    fn planning_envelope_has_no_catalog_refs() {
        let root = envelope("planning", "abc-123", false);
        assert!(root.find_child("catalogRef").is_none());
    }

    #[test]
    fn timestamps_require_an_offset() {
        assert!(convert_timestamp("2022-03-01T12:00:00").is_err());
        let ts = convert_timestamp("2022-03-01T12:00:00+01:00")
            .unwrap()
            .unwrap();
        assert_eq!(format_timestamp_seconds(&ts), "2022-03-01T11:00:00Z");
    }

    #[test]
    fn legacy_placeholders_are_treated_as_unset() {
        for input in ["", "  ", "null", "undefined"] {
            assert_eq!(convert_timestamp(input).unwrap(), None);
        }
    }

    #[test]
    fn format_trims_zero_subseconds() {
        let ts = Utc.with_ymd_and_hms(2022, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(format_timestamp(&ts), "2022-03-01T12:00:00Z");
    }

    #[test]
    fn ext_property_round_trips() {
        let prop = ExtProperty {
            prop_type: "imext:type".to_string(),
            value: "x-im/article".to_string(),
            creator: "sys".to_string(),
            why: String::new(),
            literal: String::new(),
        };
        let el = prop.to_element("itemMetaExtProperty");
        assert_eq!(ExtProperty::from_element(&el), prop);
    }
}
