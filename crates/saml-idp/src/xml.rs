//! Small read-only XML tree over `quick-xml` events.
//!
//! Every element remembers the byte span it occupies in the source text and
//! the namespace declarations it inherits, so signature verification can cut
//! out exact fragments and canonicalize them on their own.
//!
//! Line endings and attribute values are normalized the way an XML processor
//! reports them, which is the input canonicalization is defined over.

use crate::error::{Error, Result};
use quick_xml::Reader;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use std::ops::Range;

pub mod ns {
    pub const ASSERTION: &str = "urn:oasis:names:tc:SAML:2.0:assertion";
    pub const PROTOCOL: &str = "urn:oasis:names:tc:SAML:2.0:protocol";
    pub const DSIG: &str = "http://www.w3.org/2000/09/xmldsig#";
}

#[derive(Debug, Clone)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    Comment(String),
    ProcessingInstruction { target: String, data: String },
}

#[derive(Debug, Clone)]
pub struct XmlElement {
    name: String,
    namespace: Option<String>,
    attributes: Vec<(String, String)>,
    inherited_namespaces: Vec<(String, String)>,
    children: Vec<XmlNode>,
    span: Range<usize>,
}

impl XmlElement {
    /// Qualified name as written, e.g. `samlp:AuthnRequest`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn local_name(&self) -> &str {
        self.name
            .split_once(':')
            .map_or(self.name.as_str(), |(_, local)| local)
    }

    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(prefix, _)| prefix)
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn is(&self, namespace: &str, local_name: &str) -> bool {
        self.local_name() == local_name && self.namespace() == Some(namespace)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Attributes as written, namespace declarations included.
    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    /// Namespace URI bound to `prefix` (`""` for the default namespace), or
    /// `None` when it is unbound here. `xmlns=""` unbinds the default.
    pub fn lookup_namespace(&self, prefix: &str) -> Option<&str> {
        let key = if prefix.is_empty() {
            "xmlns".to_string()
        } else {
            format!("xmlns:{prefix}")
        };
        self.attributes
            .iter()
            .chain(self.inherited_namespaces.iter())
            .find(|(k, _)| *k == key)
            .map(|(_, uri)| uri.as_str())
            .filter(|uri| !uri.is_empty())
    }

    pub fn span(&self) -> Range<usize> {
        self.span.clone()
    }

    pub fn children(&self) -> &[XmlNode] {
        &self.children
    }

    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(element) => Some(element),
            _ => None,
        })
    }

    pub fn child(&self, namespace: &str, local_name: &str) -> Option<&XmlElement> {
        self.elements().find(|el| el.is(namespace, local_name))
    }

    /// Depth-first search below this element (the element itself excluded).
    pub fn descendant(&self, namespace: &str, local_name: &str) -> Option<&XmlElement> {
        self.elements().find_map(|el| {
            if el.is(namespace, local_name) {
                Some(el)
            } else {
                el.descendant(namespace, local_name)
            }
        })
    }

    /// Concatenated direct text content.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                XmlNode::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct XmlDocument {
    source: String,
    root: XmlElement,
}

impl XmlDocument {
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(false);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root = None;

        loop {
            let start = reader.buffer_position() as usize;
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let element = open_element(&e, start, stack.last())?;
                    stack.push(element);
                }
                Ok(Event::Empty(e)) => {
                    let mut element = open_element(&e, start, stack.last())?;
                    element.span.end = reader.buffer_position() as usize;
                    attach(element, &mut stack, &mut root)?;
                }
                Ok(Event::End(_)) => {
                    let mut element = stack
                        .pop()
                        .ok_or_else(|| Error::Xml("unexpected closing tag".into()))?;
                    element.span.end = reader.buffer_position() as usize;
                    attach(element, &mut stack, &mut root)?;
                }
                Ok(Event::Text(t)) => match stack.last_mut() {
                    Some(parent) => {
                        let raw = normalize_line_endings(utf8(&t)?);
                        let text = unescape(&raw).map_err(|e| Error::Xml(e.to_string()))?;
                        parent.children.push(XmlNode::Text(text.into_owned()));
                    }
                    None if t.iter().all(u8::is_ascii_whitespace) => {}
                    None => return Err(Error::Xml("text outside of the root element".into())),
                },
                Ok(Event::CData(c)) => {
                    let parent = stack
                        .last_mut()
                        .ok_or_else(|| Error::Xml("CDATA outside of the root element".into()))?;
                    let text = normalize_line_endings(utf8(&c)?);
                    parent.children.push(XmlNode::Text(text));
                }
                // Comments and processing instructions around the root element
                // are not part of any signed element, so only inner ones are kept.
                Ok(Event::Comment(c)) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = normalize_line_endings(utf8(&c)?);
                        parent.children.push(XmlNode::Comment(text));
                    }
                }
                Ok(Event::PI(pi)) => {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(XmlNode::ProcessingInstruction {
                            target: utf8(pi.target())?.to_string(),
                            data: normalize_line_endings(utf8(pi.content())?.trim_start()),
                        });
                    }
                }
                Ok(Event::DocType(_)) => {
                    return Err(Error::Xml("DOCTYPE declarations are not accepted".into()));
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(Error::Xml(e.to_string())),
            }
        }

        if !stack.is_empty() {
            return Err(Error::Xml("unclosed element at end of input".into()));
        }
        let root = root.ok_or_else(|| Error::Xml("document has no root element".into()))?;

        Ok(Self {
            source: xml.to_string(),
            root,
        })
    }

    pub fn root(&self) -> &XmlElement {
        &self.root
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Finds the element whose `ID` attribute equals `id`.
    pub fn element_by_id(&self, id: &str) -> Option<&XmlElement> {
        fn search<'a>(element: &'a XmlElement, id: &str) -> Option<&'a XmlElement> {
            if element.attribute("ID") == Some(id) {
                return Some(element);
            }
            element.elements().find_map(|child| search(child, id))
        }
        search(&self.root, id)
    }

    /// Source text of `element` as a standalone fragment: namespace
    /// declarations inherited from ancestors are copied onto its start tag and
    /// the optional `excluded` descendant is cut out.
    pub fn fragment(&self, element: &XmlElement, excluded: Option<&XmlElement>) -> Result<String> {
        let span = element.span();
        let mut text = String::with_capacity(span.len());

        match excluded.map(XmlElement::span) {
            Some(cut) if cut.start >= span.start && cut.end <= span.end => {
                text.push_str(&self.source[span.start..cut.start]);
                text.push_str(&self.source[cut.end..span.end]);
            }
            Some(_) => return Err(Error::Xml("excluded element lies outside the fragment".into())),
            None => text.push_str(&self.source[span]),
        }

        let declarations: String = element
            .inherited_namespaces
            .iter()
            .map(|(key, uri)| format!(" {key}=\"{}\"", escape_attribute(uri)))
            .collect();
        text.insert_str(1 + element.name.len(), &declarations);

        Ok(text)
    }
}

/// Escapes character data the way canonical XML renders it, so documents
/// written with it are already in canonical form.
pub fn escape_text(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '\r' => escaped.push_str("&#xD;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Attribute value counterpart of [`escape_text`].
pub fn escape_attribute(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '"' => escaped.push_str("&quot;"),
            '\t' => escaped.push_str("&#x9;"),
            '\n' => escaped.push_str("&#xA;"),
            '\r' => escaped.push_str("&#xD;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn open_element(e: &BytesStart<'_>, start: usize, parent: Option<&XmlElement>) -> Result<XmlElement> {
    let name = std::str::from_utf8(e.name().as_ref())
        .map_err(|e| Error::Xml(e.to_string()))?
        .to_string();

    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| Error::Xml(e.to_string()))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| Error::Xml(e.to_string()))?
            .to_string();
        let raw = normalize_attribute_whitespace(utf8(&attr.value)?);
        let value = unescape(&raw)
            .map_err(|e| Error::Xml(e.to_string()))?
            .into_owned();
        attributes.push((key, value));
    }

    let mut in_scope: Vec<(String, String)> = parent
        .map(|p| {
            let mut scope = p.inherited_namespaces.clone();
            for (key, uri) in p.attributes.iter().filter(|(key, _)| is_namespace_declaration(key)) {
                scope.retain(|(k, _)| k != key);
                scope.push((key.clone(), uri.clone()));
            }
            scope
        })
        .unwrap_or_default();

    let namespace = {
        let wanted = match name.split_once(':') {
            Some((prefix, _)) => format!("xmlns:{prefix}"),
            None => "xmlns".to_string(),
        };
        attributes
            .iter()
            .chain(in_scope.iter())
            .find(|(key, _)| *key == wanted)
            .map(|(_, uri)| uri.clone())
            .filter(|uri| !uri.is_empty())
    };

    in_scope.retain(|(key, _)| !attributes.iter().any(|(k, _)| k == key));

    Ok(XmlElement {
        name,
        namespace,
        attributes,
        inherited_namespaces: in_scope,
        children: Vec::new(),
        span: start..start,
    })
}

fn attach(element: XmlElement, stack: &mut [XmlElement], root: &mut Option<XmlElement>) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(XmlNode::Element(element)),
        None if root.is_none() => *root = Some(element),
        None => return Err(Error::Xml("multiple root elements".into())),
    }
    Ok(())
}

pub(crate) fn is_namespace_declaration(key: &str) -> bool {
    key == "xmlns" || key.starts_with("xmlns:")
}

fn utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| Error::Xml(e.to_string()))
}

/// `\r\n` and lone `\r` become `\n`. Runs before entity expansion so a
/// `&#xD;` reference survives.
fn normalize_line_endings(raw: &str) -> String {
    if raw.contains('\r') {
        raw.replace("\r\n", "\n").replace('\r', "\n")
    } else {
        raw.to_string()
    }
}

/// Literal tabs and line breaks in an attribute value read as spaces.
fn normalize_attribute_whitespace(raw: &str) -> String {
    normalize_line_endings(raw).replace(['\t', '\n'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGOUT: &str = r#"<?xml version="1.0"?>
<samlp:LogoutRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_r1">
  <saml:Issuer>http://sp.example.com</saml:Issuer>
  <saml:NameID>a&amp;b</saml:NameID>
  <samlp:SessionIndex><![CDATA[idx]]></samlp:SessionIndex>
</samlp:LogoutRequest>"#;

    #[test]
    fn resolves_namespaces_and_text() {
        let doc = XmlDocument::parse(LOGOUT).unwrap();
        let root = doc.root();
        assert!(root.is(ns::PROTOCOL, "LogoutRequest"));
        assert_eq!(root.attribute("ID"), Some("_r1"));
        let issuer = root.child(ns::ASSERTION, "Issuer").unwrap();
        assert_eq!(issuer.text(), "http://sp.example.com");
        assert_eq!(root.child(ns::ASSERTION, "NameID").unwrap().text(), "a&b");
        assert_eq!(root.child(ns::PROTOCOL, "SessionIndex").unwrap().text(), "idx");
        assert!(root.child(ns::PROTOCOL, "Issuer").is_none());
    }

    #[test]
    fn default_namespace_applies_to_unprefixed_children() {
        let xml = r#"<LogoutRequest xmlns="urn:oasis:names:tc:SAML:2.0:protocol"><Issuer xmlns="urn:oasis:names:tc:SAML:2.0:assertion">x</Issuer><SessionIndex>s</SessionIndex></LogoutRequest>"#;
        let doc = XmlDocument::parse(xml).unwrap();
        assert!(doc.root().child(ns::ASSERTION, "Issuer").is_some());
        assert!(doc.root().child(ns::PROTOCOL, "SessionIndex").is_some());
    }

    #[test]
    fn fragment_carries_inherited_declarations() {
        let doc = XmlDocument::parse(LOGOUT).unwrap();
        let issuer = doc.root().child(ns::ASSERTION, "Issuer").unwrap();
        let fragment = doc.fragment(issuer, None).unwrap();
        assert!(fragment.starts_with("<saml:Issuer xmlns:samlp="));
        assert!(fragment.contains(r#"xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion""#));
        assert!(fragment.ends_with("</saml:Issuer>"));
    }

    #[test]
    fn fragment_cuts_excluded_element() {
        let doc = XmlDocument::parse(LOGOUT).unwrap();
        let root = doc.root();
        let name_id = root.child(ns::ASSERTION, "NameID").unwrap();
        let fragment = doc.fragment(root, Some(name_id)).unwrap();
        assert!(!fragment.contains("NameID"));
        assert!(fragment.contains("SessionIndex"));
    }

    #[test]
    fn element_by_id() {
        let doc = XmlDocument::parse(LOGOUT).unwrap();
        assert_eq!(doc.element_by_id("_r1").unwrap().local_name(), "LogoutRequest");
        assert!(doc.element_by_id("_missing").is_none());
    }

    #[test]
    fn escapes_like_canonical_xml() {
        assert_eq!(escape_text("a<b & 'c'>"), "a&lt;b &amp; 'c'&gt;");
        assert_eq!(escape_attribute("x\"y'\n<"), "x&quot;y'&#xA;&lt;");
    }

    #[test]
    fn normalizes_line_endings_and_attribute_whitespace() {
        let xml = "<a b=\"x\ty\r\nz\" c=\"1&#xA;2\">l1\r\nl2\rl3&#xD;<!--n\r\n--><?pi  some data?></a>";
        let doc = XmlDocument::parse(xml).unwrap();
        let root = doc.root();
        assert_eq!(root.attribute("b"), Some("x y z"));
        assert_eq!(root.attribute("c"), Some("1\n2"));
        assert_eq!(root.text(), "l1\nl2\nl3\r");
        assert!(matches!(&root.children()[1], XmlNode::Comment(c) if c == "n\n"));
        assert!(matches!(
            &root.children()[2],
            XmlNode::ProcessingInstruction { target, data } if target == "pi" && data == "some data"
        ));
    }

    #[test]
    fn looks_up_namespaces_in_scope() {
        let xml = r#"<a xmlns="urn:d" xmlns:p="urn:p"><b xmlns=""><p:c/></b></a>"#;
        let doc = XmlDocument::parse(xml).unwrap();
        let b = doc.root().elements().next().unwrap();
        assert_eq!(doc.root().lookup_namespace(""), Some("urn:d"));
        assert_eq!(b.lookup_namespace(""), None);
        assert_eq!(b.elements().next().unwrap().lookup_namespace("p"), Some("urn:p"));
        assert_eq!(b.lookup_namespace("q"), None);
    }

    #[test]
    fn rejects_hostile_or_broken_input() {
        assert!(XmlDocument::parse("").is_err());
        assert!(XmlDocument::parse("<a><b></a>").is_err());
        assert!(XmlDocument::parse("<a>").is_err());
        assert!(XmlDocument::parse("<a/><b/>").is_err());
        assert!(
            XmlDocument::parse(r#"<!DOCTYPE a [<!ENTITY x "y">]><a>&x;</a>"#).is_err()
        );
    }
}
