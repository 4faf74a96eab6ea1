//! Exclusive XML Canonicalization 1.0 over [`XmlElement`] trees.
//!
//! Only namespace declarations an element visibly utilizes are rendered: the
//! one bound to its own prefix, the ones bound to its attributes' prefixes and
//! any named in the `InclusiveNamespaces` prefix list. A declaration already
//! rendered by an output ancestor with the same URI is not repeated.

use crate::xml::{XmlElement, XmlNode, escape_attribute, escape_text, is_namespace_declaration};
use std::collections::{BTreeMap, BTreeSet};

pub const EXCLUSIVE: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
pub const EXCLUSIVE_WITH_COMMENTS: &str = "http://www.w3.org/2001/10/xml-exc-c14n#WithComments";
const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Canonicalization {
    #[default]
    Exclusive,
    ExclusiveWithComments,
}

impl Canonicalization {
    pub fn uri(self) -> &'static str {
        match self {
            Canonicalization::Exclusive => EXCLUSIVE,
            Canonicalization::ExclusiveWithComments => EXCLUSIVE_WITH_COMMENTS,
        }
    }

    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            EXCLUSIVE => Some(Canonicalization::Exclusive),
            EXCLUSIVE_WITH_COMMENTS => Some(Canonicalization::ExclusiveWithComments),
            _ => None,
        }
    }

    pub fn with_comments(self) -> bool {
        self == Canonicalization::ExclusiveWithComments
    }

    /// Canonical form of the subtree rooted at `apex`, leaving out the
    /// `excluded` descendant entirely. `inclusive_prefixes` is the
    /// `InclusiveNamespaces` prefix list, `#default` naming the default
    /// namespace.
    pub fn canonicalize(
        self,
        apex: &XmlElement,
        excluded: Option<&XmlElement>,
        inclusive_prefixes: &[String],
    ) -> String {
        let mut writer = Writer {
            excluded,
            with_comments: self.with_comments(),
            inclusive_prefixes: inclusive_prefixes
                .iter()
                .map(|prefix| match prefix.as_str() {
                    "#default" => "",
                    other => other,
                })
                .collect(),
            output: String::new(),
        };
        writer.element(apex, &BTreeMap::new());
        writer.output
    }
}

struct Writer<'a> {
    excluded: Option<&'a XmlElement>,
    with_comments: bool,
    inclusive_prefixes: BTreeSet<&'a str>,
    output: String,
}

struct Attribute<'e> {
    namespace: &'e str,
    local_name: &'e str,
    name: &'e str,
    value: &'e str,
}

impl Writer<'_> {
    fn element(&mut self, element: &XmlElement, rendered: &BTreeMap<String, String>) {
        if self.excluded.is_some_and(|excluded| std::ptr::eq(excluded, element)) {
            return;
        }

        let attributes = canonical_attributes(element);

        let mut utilized: BTreeSet<&str> = self.inclusive_prefixes.clone();
        utilized.insert(element.prefix().unwrap_or_default());
        for attribute in &attributes {
            if let Some((prefix, _)) = attribute.name.split_once(':')
                && prefix != "xml"
            {
                utilized.insert(prefix);
            }
        }

        // BTreeSet order puts the default namespace first, then prefixes
        // lexicographically, which is the canonical order.
        let mut declarations: Vec<(&str, &str)> = Vec::new();
        for prefix in utilized {
            match element.lookup_namespace(prefix) {
                Some(uri) if rendered.get(prefix).map(String::as_str) != Some(uri) => {
                    declarations.push((prefix, uri));
                }
                Some(_) => {}
                None if prefix.is_empty()
                    && rendered.get("").is_some_and(|uri| !uri.is_empty()) =>
                {
                    declarations.push(("", ""));
                }
                None => {}
            }
        }

        self.output.push('<');
        self.output.push_str(element.name());
        for (prefix, uri) in &declarations {
            if prefix.is_empty() {
                self.output.push_str(" xmlns=\"");
            } else {
                self.output.push_str(" xmlns:");
                self.output.push_str(prefix);
                self.output.push_str("=\"");
            }
            self.output.push_str(&escape_attribute(uri));
            self.output.push('"');
        }
        for attribute in &attributes {
            self.output.push(' ');
            self.output.push_str(attribute.name);
            self.output.push_str("=\"");
            self.output.push_str(&escape_attribute(attribute.value));
            self.output.push('"');
        }
        self.output.push('>');

        let mut scope = rendered.clone();
        for (prefix, uri) in declarations {
            scope.insert(prefix.to_string(), uri.to_string());
        }

        for child in element.children() {
            match child {
                XmlNode::Element(child) => self.element(child, &scope),
                XmlNode::Text(text) => self.output.push_str(&escape_text(text)),
                XmlNode::Comment(text) if self.with_comments => {
                    self.output.push_str("<!--");
                    self.output.push_str(text);
                    self.output.push_str("-->");
                }
                XmlNode::Comment(_) => {}
                XmlNode::ProcessingInstruction { target, data } => {
                    self.output.push_str("<?");
                    self.output.push_str(target);
                    if !data.is_empty() {
                        self.output.push(' ');
                        self.output.push_str(&data.replace('\r', "&#xD;"));
                    }
                    self.output.push_str("?>");
                }
            }
        }

        self.output.push_str("</");
        self.output.push_str(element.name());
        self.output.push('>');
    }
}

/// Non-namespace attributes, ordered by namespace URI then local name, so the
/// unqualified ones come first.
fn canonical_attributes(element: &XmlElement) -> Vec<Attribute<'_>> {
    let mut attributes: Vec<Attribute<'_>> = element
        .attributes()
        .iter()
        .filter(|(name, _)| !is_namespace_declaration(name))
        .map(|(name, value)| {
            let (namespace, local_name) = match name.split_once(':') {
                Some(("xml", local)) => (XML_NAMESPACE, local),
                Some((prefix, local)) => (element.lookup_namespace(prefix).unwrap_or_default(), local),
                None => ("", name.as_str()),
            };
            Attribute {
                namespace,
                local_name,
                name,
                value,
            }
        })
        .collect();
    attributes.sort_by(|a, b| (a.namespace, a.local_name).cmp(&(b.namespace, b.local_name)));
    attributes
}
