//! HTML sanitization for rich-text values
//!
//! Rich-text data values may carry inline markup. Before such markup is
//! stored on a document it is filtered through an allow-list policy
//! built from [`HtmlSanitizeOptions`]: unknown elements are unwrapped
//! to their content, script and style content is dropped, attributes
//! are reduced to the allowed set and URL attributes are checked
//! against the allowed schemes.

use std::collections::HashSet;

use url::Url;

use crate::config::{HtmlSanitizeOptions, Options};
use crate::dom::{self, Element, Node};
use crate::error::Result;

const STANDARD_ATTRIBUTES: &[&str] = &["dir", "id", "lang", "title"];
const URL_ATTRIBUTES: &[&str] = &["href", "src", "cite"];

const LIST_ELEMENTS: &[(&str, &[&str])] = &[
    ("ul", &["type"]),
    ("ol", &["type"]),
    ("li", &["value"]),
    ("dl", &[]),
    ("dt", &[]),
    ("dd", &[]),
];

const IMAGE_ELEMENTS: &[(&str, &[&str])] =
    &[("img", &["align", "alt", "height", "src", "width"])];

const TABLE_ELEMENTS: &[(&str, &[&str])] = &[
    ("table", &["summary"]),
    ("caption", &[]),
    ("thead", &[]),
    ("tbody", &[]),
    ("tfoot", &[]),
    ("tr", &[]),
    ("td", &["colspan", "rowspan", "headers", "scope"]),
    ("th", &["colspan", "rowspan", "headers", "scope"]),
    ("col", &["span"]),
    ("colgroup", &["span"]),
];

/// Elements whose content is discarded along with the tag
const DROP_CONTENT: &[&str] = &["script", "style"];

struct Policy {
    /// Canonical element name paired with its allowed attributes
    allowed: Vec<(String, HashSet<String>)>,
    allow_standard_attributes: bool,
    allow_relative_urls: bool,
    schemes: Vec<String>,
}

impl Policy {
    fn from_options(opts: &HtmlSanitizeOptions) -> Self {
        let mut allowed: Vec<(String, HashSet<String>)> = Vec::new();

        for ea in &opts.elements_attributes {
            let attrs: Vec<&str> = split_list(&ea.attributes);
            for element in split_list(&ea.elements) {
                allow(&mut allowed, element, &attrs);
            }
        }
        if opts.allow_lists == Some(true) {
            for (name, attrs) in LIST_ELEMENTS {
                allow(&mut allowed, name, attrs);
            }
        }
        if opts.allow_images == Some(true) {
            for (name, attrs) in IMAGE_ELEMENTS {
                allow(&mut allowed, name, attrs);
            }
        }
        if opts.allow_tables == Some(true) {
            for (name, attrs) in TABLE_ELEMENTS {
                allow(&mut allowed, name, attrs);
            }
        }

        Policy {
            allowed,
            allow_standard_attributes: opts.allow_standard_attributes == Some(true),
            allow_relative_urls: opts.allow_relative_urls == Some(true),
            schemes: split_list(&opts.allowed_url_schemes)
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }

    /// Canonical name and allowed attributes for an element, matched
    /// case-insensitively
    fn lookup(&self, name: &str) -> Option<(&str, &HashSet<String>)> {
        self.allowed
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(n, set)| (n.as_str(), set))
    }

    fn attribute_allowed(&self, allowed: &HashSet<String>, name: &str) -> bool {
        allowed.contains(name)
            || (self.allow_standard_attributes && STANDARD_ATTRIBUTES.contains(&name))
    }

    fn url_allowed(&self, value: &str) -> bool {
        match Url::parse(value) {
            Ok(url) => self.schemes.iter().any(|s| s == url.scheme()),
            Err(url::ParseError::RelativeUrlWithoutBase) => self.allow_relative_urls,
            Err(_) => false,
        }
    }

    fn sanitize_nodes(&self, nodes: Vec<Node>, out: &mut Vec<Node>) {
        for node in nodes {
            match node {
                Node::Element(element) => self.sanitize_element(element, out),
                text => out.push(text),
            }
        }
    }

    fn sanitize_element(&self, element: Element, out: &mut Vec<Node>) {
        if DROP_CONTENT
            .iter()
            .any(|n| n.eq_ignore_ascii_case(&element.name))
        {
            return;
        }

        match self.lookup(&element.name) {
            Some((canonical, allowed)) => {
                let mut clean = Element::new(canonical);
                for (name, value) in &element.attributes {
                    if !self.attribute_allowed(allowed, name) {
                        continue;
                    }
                    if URL_ATTRIBUTES.contains(&name.as_str()) && !self.url_allowed(value) {
                        continue;
                    }
                    clean.set_attr(name.clone(), value.clone());
                }
                self.sanitize_nodes(element.children, &mut clean.children);
                out.push(Node::Element(clean));
            }
            // The tag is unwrapped, its content survives
            None => self.sanitize_nodes(element.children, out),
        }
    }
}

fn allow(allowed: &mut Vec<(String, HashSet<String>)>, name: &str, attrs: &[&str]) {
    let idx = match allowed
        .iter()
        .position(|(n, _)| n.eq_ignore_ascii_case(name))
    {
        Some(idx) => idx,
        None => {
            allowed.push((name.to_string(), HashSet::new()));
            allowed.len() - 1
        }
    };
    for attr in attrs {
        allowed[idx].1.insert((*attr).to_string());
    }
}

fn split_list(list: &str) -> Vec<&str> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Sanitize an XML/HTML fragment according to the sanitizer settings
/// in `opts`, returning the filtered fragment
pub fn sanitize_html(text: &str, opts: &Options) -> Result<String> {
    let policy = Policy::from_options(&opts.html_sanitize);
    let nodes = dom::parse_fragment(text)?;

    let mut clean = Vec::new();
    policy.sanitize_nodes(nodes, &mut clean);

    let mut out = String::new();
    let mut wrapper = Element::new("w");
    wrapper.children = clean;
    out.push_str(&wrapper.inner_xml());
    Ok(out)
}

/// Remove all markup from a fragment, keeping character data only
pub fn strip_tags(text: &str) -> Result<String> {
    fn collect(nodes: &[Node], out: &mut String) {
        for node in nodes {
            match node {
                Node::Text(t) | Node::CData(t) => out.push_str(t),
                Node::Element(e) => collect(&e.children, out),
            }
        }
    }

    let nodes = dom::parse_fragment(text)?;
    let mut out = String::new();
    collect(&nodes, &mut out);
    Ok(out)
}
