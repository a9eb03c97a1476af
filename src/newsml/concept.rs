//! The `<concept>` element shared by concept items.

use crate::config::{Context, Options};
use crate::document::{Document, Property};
use crate::dom::Element;
use crate::error::{Error, Result};
use crate::limits::Depth;
use crate::newsml::{self, data, object};
use crate::sanitize;

const EVENT_DETAILS_TYPE: &str = "x-im/event-details";

/// The `<conceptId>` child: a URI plus provenance attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ConceptId {
    pub uri: String,
    pub creator: String,
    pub created: String,
    pub modified: String,
    pub qcode: String,
    pub text: String,
}

/// A role-tagged `<definition>`; the text is escaped markup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Definition {
    pub role: String,
    pub text: String,
}

#[derive(Debug, Default)]
pub(crate) struct Concept {
    pub concept_id: ConceptId,
    pub type_qcode: String,
    pub name: String,
    pub definitions: Vec<Definition>,
    pub metadata: Vec<Element>,
}

impl Concept {
    pub fn from_doc(document: &Document, opts: &Options, depth: Depth) -> Result<Self> {
        let mut concept = Concept {
            name: document.title.clone(),
            concept_id: ConceptId {
                uri: document.uri.clone(),
                ..Default::default()
            },
            ..Default::default()
        };

        concept.add_from_properties(document);
        concept.add_concept_metadata(document, opts, depth)?;
        concept.type_qcode = opts.concept_type_to_qcode(&document.doc_type)?;

        Ok(concept)
    }

    fn add_from_properties(&mut self, document: &Document) {
        for prop in &document.properties {
            match prop.name.to_lowercase().as_str() {
                "definition" => {
                    let role = prop.parameter("role").unwrap_or_default();
                    if role.is_empty() {
                        continue;
                    }
                    self.definitions.push(Definition {
                        role: role.to_string(),
                        text: prop.value.clone(),
                    });
                }
                "conceptid" => {
                    // The document URI is authoritative; only fall
                    // back to the property when it was missing.
                    if self.concept_id.uri.is_empty() {
                        self.concept_id.uri =
                            prop.parameter("uri").unwrap_or_default().to_string();
                    }
                    self.concept_id.creator =
                        prop.parameter("creator").unwrap_or_default().to_string();
                    self.concept_id.created =
                        prop.parameter("created").unwrap_or_default().to_string();
                    self.concept_id.modified =
                        prop.parameter("modified").unwrap_or_default().to_string();
                    self.concept_id.qcode =
                        prop.parameter("qcode").unwrap_or_default().to_string();
                    self.type_qcode = self.concept_id.qcode.clone();
                }
                _ => {}
            }
        }
    }

    fn add_concept_metadata(
        &mut self,
        document: &Document,
        opts: &Options,
        depth: Depth,
    ) -> Result<()> {
        for prop in &document.properties {
            if prop.name != "concepttypes" {
                continue;
            }
            for (id, ctype) in &prop.parameters {
                let Some(meta) = document.meta.iter().find(|m| &m.id == id) else {
                    continue;
                };
                let raw = data::transform_data_to_raw(meta, opts, Context::Meta, depth)?;
                let mut el = Element::new("object")
                    .with_attr("id", id)
                    .with_attr("type", ctype);
                let mut data_el = Element::new("data");
                data_el.children = raw.nodes;
                el.push_element(data_el);
                self.metadata.push(el);
            }
        }

        for block in &document.meta {
            if !opts.is_concept_object_type(&block.block_type) {
                continue;
            }
            let raw = data::transform_data_to_raw(block, opts, Context::Meta, depth)?;
            let mut el = Element::new("object");
            el.set_attr_opt("id", &block.id);
            el.set_attr("type", &block.block_type);
            let mut data_el = Element::new("data");
            data_el.children = raw.nodes;
            el.push_element(data_el);
            self.metadata.push(el);
        }

        Ok(())
    }

    pub fn to_element(&self) -> Element {
        let mut el = Element::new("concept");

        let mut concept_id = Element::new("conceptId").with_attr("uri", &self.concept_id.uri);
        concept_id.set_attr_opt("creator", &self.concept_id.creator);
        concept_id.set_attr_opt("created", &self.concept_id.created);
        concept_id.set_attr_opt("modified", &self.concept_id.modified);
        concept_id.set_attr_opt("qcode", &self.concept_id.qcode);
        if !self.concept_id.text.is_empty() {
            concept_id.push_text(&self.concept_id.text);
        }
        el.push_element(concept_id);

        el.push_element(Element::new("type").with_attr("qcode", &self.type_qcode));

        let mut name = Element::new("name");
        name.push_text(&self.name);
        el.push_element(name);

        for definition in &self.definitions {
            let mut def = Element::new("definition").with_attr("role", &definition.role);
            def.push_text(&definition.text);
            el.push_element(def);
        }

        if let Some(metadata) = newsml::newsml_container("metadata", self.metadata.clone()) {
            el.push_element(metadata);
        }

        el
    }

    pub fn from_element(el: &Element) -> Self {
        let mut concept = Concept {
            name: el.find_child("name").map(Element::text).unwrap_or_default(),
            type_qcode: el
                .find_child("type")
                .and_then(|t| t.attr("qcode"))
                .unwrap_or_default()
                .to_string(),
            ..Default::default()
        };
        if let Some(concept_id) = el.find_child("conceptId") {
            concept.concept_id = ConceptId {
                uri: concept_id.attr("uri").unwrap_or_default().to_string(),
                creator: concept_id.attr("creator").unwrap_or_default().to_string(),
                created: concept_id.attr("created").unwrap_or_default().to_string(),
                modified: concept_id.attr("modified").unwrap_or_default().to_string(),
                qcode: concept_id.attr("qcode").unwrap_or_default().to_string(),
                text: concept_id.text(),
            };
        }
        for def in el.find_children("definition") {
            concept.definitions.push(Definition {
                role: def.attr("role").unwrap_or_default().to_string(),
                text: def.inner_xml(),
            });
        }
        if let Some(metadata) = el.find_child("metadata") {
            concept.metadata = metadata.find_children("object").cloned().collect();
        }
        concept
    }

    pub fn apply_to_doc(
        &self,
        document: &mut Document,
        opts: &Options,
        depth: Depth,
    ) -> Result<()> {
        document.title = self.name.clone();
        document.uri = self.concept_id.uri.clone();

        for (i, metadata) in self.metadata.iter().enumerate() {
            let mut block = object::block_from_object(metadata, opts, Context::Meta, depth)
                .map_err(|err| {
                    Error::MalformedDocument(format!(
                        "failed to convert metadata object {i}: {err}"
                    ))
                })?;
            if block.block_type == EVENT_DETAILS_TYPE {
                block.data.shift_remove("registration");
            }
            document.meta.push(block);
        }

        for definition in &self.definitions {
            let text = sanitize::strip_tags(&definition.text)?;
            document.properties.push(
                Property::new("definition", text).with_parameter("role", &definition.role),
            );
        }

        document.properties.push(
            Property::new("conceptid", &self.concept_id.text)
                .with_parameter("uri", &self.concept_id.uri)
                .with_parameter("creator", &self.concept_id.creator)
                .with_parameter("created", &self.concept_id.created)
                .with_parameter("qcode", &self.concept_id.qcode)
                .with_parameter("modified", &self.concept_id.modified),
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn depth() -> Depth {
        Depth::default()
    }

    #[test]
    fn concept_type_resolves_from_document_type() {
        let document = Document {
            doc_type: "x-im/person".to_string(),
            title: "Jane Writer".to_string(),
            uri: "im://person/j".to_string(),
            ..Default::default()
        };
        let opts = Options::defaults();
        let concept = Concept::from_doc(&document, &opts, depth()).unwrap();
        assert_eq!(concept.type_qcode, "cpnat:person");
        assert_eq!(concept.name, "Jane Writer");
        assert_eq!(concept.concept_id.uri, "im://person/j");
    }

    #[test]
    fn unknown_concept_type_is_an_error() {
        let document = Document {
            doc_type: "x-im/unheard-of".to_string(),
            ..Default::default()
        };
        let opts = Options::defaults();
        assert!(Concept::from_doc(&document, &opts, depth()).is_err());
    }

    #[test]
    fn definitions_escape_on_encode_and_strip_on_decode() {
        let mut document = Document {
            doc_type: "x-im/person".to_string(),
            ..Default::default()
        };
        document.properties.push(
            Property::new("definition", "a < b").with_parameter("role", "drol:short"),
        );
        let opts = Options::defaults();
        let concept = Concept::from_doc(&document, &opts, depth()).unwrap();
        let el = concept.to_element();
        let definition = el.find_child("definition").unwrap();
        assert_eq!(definition.inner_xml(), "a &lt; b");

        let parsed = Concept::from_element(&el);
        let mut decoded = Document::default();
        parsed.apply_to_doc(&mut decoded, &opts, depth()).unwrap();
        let prop = decoded
            .properties
            .iter()
            .find(|p| p.name == "definition")
            .unwrap();
        assert_eq!(prop.value, "a < b");
        assert_eq!(prop.parameter("role"), Some("drol:short"));
    }

    #[test]
    fn definitions_without_role_are_dropped_on_encode() {
        let mut document = Document {
            doc_type: "x-im/person".to_string(),
            ..Default::default()
        };
        document
            .properties
            .push(Property::new("definition", "no role"));
        let opts = Options::defaults();
        let concept = Concept::from_doc(&document, &opts, depth()).unwrap();
        assert!(concept.definitions.is_empty());
    }
}
