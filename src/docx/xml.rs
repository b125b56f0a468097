use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::error::{Error, Result};

pub(crate) const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

#[derive(Clone, Debug)]
pub(crate) struct XmlAttribute {
    /// Qualified name as written, e.g. `w:val` or `xmlns:w`.
    pub(crate) qname: String,
    pub(crate) namespace: Option<String>,
    pub(crate) local: String,
    pub(crate) value: String,
}

impl XmlAttribute {
    pub(crate) fn plain(name: &str, value: impl Into<String>) -> Self {
        Self {
            qname: name.to_string(),
            namespace: None,
            local: name.to_string(),
            value: value.into(),
        }
    }

    pub(crate) fn prefixed(prefix: &str, local: &str, namespace: &str, value: impl Into<String>) -> Self {
        Self {
            qname: format!("{prefix}:{local}"),
            namespace: Some(namespace.to_string()),
            local: local.to_string(),
            value: value.into(),
        }
    }

    pub(crate) fn xmlns(prefix: &str, uri: &str) -> Self {
        Self::plain(&format!("xmlns:{prefix}"), uri)
    }
}

#[derive(Clone, Debug)]
pub(crate) enum XmlNode {
    Element(XmlElement),
    Text(String),
    Comment(String),
}

/// Owned, editable element. Namespace declarations are kept as `xmlns`
/// attributes where they originally appeared.
#[derive(Clone, Debug)]
pub(crate) struct XmlElement {
    pub(crate) prefix: Option<String>,
    pub(crate) name: String,
    pub(crate) namespace: Option<String>,
    pub(crate) attributes: Vec<XmlAttribute>,
    pub(crate) children: Vec<XmlNode>,
}

impl XmlElement {
    pub(crate) fn new(prefix: Option<&str>, name: &str, namespace: Option<&str>) -> Self {
        Self {
            prefix: prefix.map(String::from),
            name: name.to_string(),
            namespace: namespace.map(String::from),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub(crate) fn is(&self, namespace: &str, name: &str) -> bool {
        self.name == name && self.namespace.as_deref() == Some(namespace)
    }

    pub(crate) fn qname(&self) -> String {
        match &self.prefix {
            Some(p) => format!("{p}:{}", self.name),
            None => self.name.clone(),
        }
    }

    pub(crate) fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.namespace.is_none() && a.local == name)
            .map(|a| a.value.as_str())
    }

    pub(crate) fn set_attribute(&mut self, attr: XmlAttribute) {
        match self
            .attributes
            .iter_mut()
            .find(|a| a.namespace == attr.namespace && a.local == attr.local)
        {
            Some(existing) => existing.value = attr.value,
            None => self.attributes.push(attr),
        }
    }

    pub(crate) fn with_attr(mut self, attr: XmlAttribute) -> Self {
        self.attributes.push(attr);
        self
    }

    pub(crate) fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    pub(crate) fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|c| match c {
            XmlNode::Element(e) => Some(e),
            _ => None,
        })
    }

    pub(crate) fn child(&self, namespace: &str, name: &str) -> Option<&XmlElement> {
        self.elements().find(|e| e.is(namespace, name))
    }

    pub(crate) fn child_element(&self, index: usize) -> Option<&XmlElement> {
        match self.children.get(index)? {
            XmlNode::Element(e) => Some(e),
            _ => None,
        }
    }

    pub(crate) fn child_element_mut(&mut self, index: usize) -> Option<&mut XmlElement> {
        match self.children.get_mut(index)? {
            XmlNode::Element(e) => Some(e),
            _ => None,
        }
    }

    /// Follow a path of child indices.
    pub(crate) fn at_path(&self, path: &[usize]) -> Option<&XmlElement> {
        path.iter().try_fold(self, |el, &i| el.child_element(i))
    }

    pub(crate) fn at_path_mut(&mut self, path: &[usize]) -> Option<&mut XmlElement> {
        path.iter().try_fold(self, |el, &i| el.child_element_mut(i))
    }

    /// Concatenated text of direct text children.
    pub(crate) fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|c| match c {
                XmlNode::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn descendants(&self) -> Vec<&XmlElement> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(el) = stack.pop() {
            out.push(el);
            stack.extend(el.elements().collect::<Vec<_>>().into_iter().rev());
        }
        out
    }
}

/// Parse a part into an owned tree.
pub(crate) fn parse(xml: &str) -> Result<XmlElement> {
    let doc = roxmltree::Document::parse(xml)?;
    let root = doc.root_element();
    Ok(convert(root, None))
}

fn convert(node: roxmltree::Node, parent: Option<roxmltree::Node>) -> XmlElement {
    let tag = node.tag_name();
    let prefix = tag
        .namespace()
        .and_then(|uri| node.lookup_prefix(uri))
        .filter(|p| !p.is_empty());
    let mut element = XmlElement::new(prefix, tag.name(), tag.namespace());

    for ns in node.namespaces() {
        if ns.name() == Some("xml") {
            continue;
        }
        let inherited = parent.is_some_and(|p| {
            p.namespaces()
                .any(|pns| pns.name() == ns.name() && pns.uri() == ns.uri())
        });
        if inherited {
            continue;
        }
        let qname = match ns.name() {
            Some(p) => format!("xmlns:{p}"),
            None => "xmlns".to_string(),
        };
        element.attributes.push(XmlAttribute::plain(&qname, ns.uri()));
    }

    for attr in node.attributes() {
        let xml_attr = match attr.namespace() {
            Some(XML_NS) => XmlAttribute::prefixed("xml", attr.name(), XML_NS, attr.value()),
            Some(uri) => match node.lookup_prefix(uri).filter(|p| !p.is_empty()) {
                Some(p) => XmlAttribute::prefixed(p, attr.name(), uri, attr.value()),
                None => XmlAttribute::plain(attr.name(), attr.value()),
            },
            None => XmlAttribute::plain(attr.name(), attr.value()),
        };
        element.attributes.push(xml_attr);
    }

    for child in node.children() {
        if child.is_element() {
            element.children.push(XmlNode::Element(convert(child, Some(node))));
        } else if child.is_text() {
            if let Some(t) = child.text() {
                element.children.push(XmlNode::Text(t.to_string()));
            }
        } else if child.is_comment() {
            if let Some(t) = child.text() {
                element.children.push(XmlNode::Comment(t.to_string()));
            }
        }
    }
    element
}

/// Serialize a part with the standalone declaration Word writes.
pub(crate) fn serialize(root: &XmlElement) -> Result<Vec<u8>> {
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))
        .map_err(write_err)?;
    writer
        .get_mut()
        .extend_from_slice(b"\r\n");
    write_element(&mut writer, root)?;
    Ok(writer.into_inner())
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &XmlElement) -> Result<()> {
    let qname = element.qname();
    let mut start = BytesStart::new(qname.as_str());
    for attr in &element.attributes {
        start.push_attribute((attr.qname.as_str(), attr.value.as_str()));
    }
    if element.children.is_empty() {
        return writer.write_event(Event::Empty(start)).map_err(write_err);
    }
    writer.write_event(Event::Start(start)).map_err(write_err)?;
    for child in &element.children {
        match child {
            XmlNode::Element(e) => write_element(writer, e)?,
            XmlNode::Text(t) => writer
                .write_event(Event::Text(BytesText::new(t)))
                .map_err(write_err)?,
            XmlNode::Comment(c) => writer
                .write_event(Event::Comment(BytesText::from_escaped(c.as_str())))
                .map_err(write_err)?,
        }
    }
    writer
        .write_event(Event::End(BytesEnd::new(qname.as_str())))
        .map_err(write_err)
}

fn write_err(e: impl std::fmt::Display) -> Error {
    Error::Xml(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

    #[test]
    fn round_trip_keeps_prefixes_and_declarations() {
        let src = r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:t xml:space="preserve"> a &amp; b </w:t></w:r></w:p></w:body></w:document>"#;
        let tree = parse(src).unwrap();
        let out = String::from_utf8(serialize(&tree).unwrap()).unwrap();
        assert!(out.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>"));
        assert!(out.contains(r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">"#));
        assert!(out.contains(r#"<w:t xml:space="preserve"> a &amp; b </w:t>"#));

        let reparsed = parse(&out).unwrap();
        let t = reparsed.at_path(&[0, 0, 0, 0]).unwrap();
        assert!(t.is(W, "t"));
        assert_eq!(t.text(), " a & b ");
    }

    #[test]
    fn default_namespace_stays_unprefixed() {
        let src = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Target="a.xml"/></Relationships>"#;
        let tree = parse(src).unwrap();
        let out = String::from_utf8(serialize(&tree).unwrap()).unwrap();
        assert!(out.contains(r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#));
        assert!(out.contains(r#"<Relationship Id="rId1" Target="a.xml"/>"#));
    }
}
