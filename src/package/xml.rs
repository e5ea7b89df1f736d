//! Owned XML element tree built from `quick-xml` events.
//!
//! Office parts are small enough to hold in memory, and both the Word and
//! PowerPoint walkers need random access (look-ahead for `mc:Choice`,
//! sibling properties like `m:fPr`), so each part is parsed once into an
//! [`XmlElement`] tree instead of being streamed.
//!
//! Element and attribute names keep their prefixes (`w:p`, `m:oMath`,
//! `r:embed`). Office writers use the conventional prefixes for the
//! namespaces this crate reads, so lookups match on the qualified name.

use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// A parsed XML element.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlElement {
    /// Qualified name, e.g. `m:oMath`.
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

/// A child of an [`XmlElement`].
#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Part of the name after the namespace prefix.
    pub fn local_name(&self) -> &str {
        match self.name.split_once(':') {
            Some((_, local)) => local,
            None => &self.name,
        }
    }

    pub fn is(&self, qname: &str) -> bool {
        self.name == qname
    }

    /// Attribute by qualified name.
    pub fn attr(&self, qname: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == qname)
            .map(|(_, v)| v.as_str())
    }

    /// Attribute by local name, whatever its prefix.
    pub fn attr_local(&self, local: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == local || k.rsplit(':').next() == Some(local))
            .map(|(_, v)| v.as_str())
    }

    /// Child elements, skipping text nodes.
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|n| match n {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    /// First direct child with the given qualified name.
    pub fn child(&self, qname: &str) -> Option<&XmlElement> {
        self.elements().find(|e| e.name == qname)
    }

    /// All direct children with the given qualified name.
    pub fn children_named<'a>(&'a self, qname: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.elements().filter(move |e| e.name == qname)
    }

    /// Follow a path of direct children: `el.path(&["p:spPr", "a:xfrm", "a:off"])`.
    pub fn path(&self, names: &[&str]) -> Option<&XmlElement> {
        let mut current = self;
        for name in names {
            current = current.child(name)?;
        }
        Some(current)
    }

    /// Depth-first search for the first descendant with the given name.
    pub fn find(&self, qname: &str) -> Option<&XmlElement> {
        for el in self.elements() {
            if el.name == qname {
                return Some(el);
            }
            if let Some(found) = el.find(qname) {
                return Some(found);
            }
        }
        None
    }

    /// All descendants with the given name, in document order.
    pub fn find_all<'a>(&'a self, qname: &str) -> Vec<&'a XmlElement> {
        let mut out = Vec::new();
        self.collect_named(qname, &mut out);
        out
    }

    fn collect_named<'a>(&'a self, qname: &str, out: &mut Vec<&'a XmlElement>) {
        for el in self.elements() {
            if el.name == qname {
                out.push(el);
            }
            el.collect_named(qname, out);
        }
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for node in &self.children {
            match node {
                XmlNode::Text(t) => out.push_str(t),
                XmlNode::Element(e) => e.collect_text(out),
            }
        }
    }

    fn push_text(&mut self, text: &str) {
        if let Some(XmlNode::Text(last)) = self.children.last_mut() {
            last.push_str(text);
        } else {
            self.children.push(XmlNode::Text(text.to_string()));
        }
    }
}

/// OOXML boolean toggle: an absent `val` means "on".
pub fn is_on(el: Option<&XmlElement>) -> bool {
    match el {
        None => false,
        Some(e) => !matches!(
            e.attr_local("val"),
            Some("0") | Some("false") | Some("off")
        ),
    }
}

/// Parse a whole XML document and return its root element.
pub fn parse(xml: &str) -> Result<XmlElement, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => stack.push(element_from(&e)),
            Ok(Event::Empty(e)) => {
                let el = element_from(&e);
                attach(&mut stack, &mut root, el);
            }
            Ok(Event::End(_)) => {
                let el = stack
                    .pop()
                    .ok_or_else(|| "closing tag without an open element".to_string())?;
                attach(&mut stack, &mut root, el);
            }
            Ok(Event::Text(e)) => {
                if let Some(top) = stack.last_mut() {
                    top.push_text(&String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(top) = stack.last_mut() {
                    top.push_text(&String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if let Some(top) = stack.last_mut() {
                    let entity = String::from_utf8_lossy(&e);
                    if let Some(resolved) = resolve_entity(&entity) {
                        top.push_text(&resolved);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(format!(
                    "at byte {}: {}",
                    reader.buffer_position(),
                    e
                ))
            }
        }
    }

    if !stack.is_empty() {
        return Err(format!("unclosed element <{}>", stack[stack.len() - 1].name));
    }
    root.ok_or_else(|| "document has no root element".to_string())
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, el: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(XmlNode::Element(el)),
        None => {
            if root.is_none() {
                *root = Some(el);
            }
        }
    }
}

fn element_from(start: &BytesStart<'_>) -> XmlElement {
    let mut el = XmlElement::new(String::from_utf8_lossy(start.name().as_ref()));
    for attr in start.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let raw = String::from_utf8_lossy(&attr.value).into_owned();
        let value = match unescape(&raw) {
            Ok(v) => v.into_owned(),
            Err(_) => raw,
        };
        el.attrs.push((key, value));
    }
    el
}

fn resolve_entity(entity: &str) -> Option<String> {
    match entity {
        "apos" => return Some("'".to_string()),
        "quot" => return Some("\"".to_string()),
        "lt" => return Some("<".to_string()),
        "gt" => return Some(">".to_string()),
        "amp" => return Some("&".to_string()),
        _ => {}
    }

    let code = if let Some(hex) = entity.strip_prefix("#x") {
        u32::from_str_radix(hex, 16).ok()
    } else if let Some(dec) = entity.strip_prefix('#') {
        dec.parse::<u32>().ok()
    } else {
        None
    };
    code.and_then(char::from_u32).map(|c| c.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_elements_with_prefixes() {
        let root = parse(
            r#"<?xml version="1.0"?><w:p xmlns:w="x"><w:r><w:t xml:space="preserve"> hi </w:t></w:r><w:r/></w:p>"#,
        )
        .unwrap();
        assert_eq!(root.name, "w:p");
        assert_eq!(root.local_name(), "p");
        assert_eq!(root.children_named("w:r").count(), 2);
        assert_eq!(root.find("w:t").unwrap().text(), " hi ");
        assert_eq!(root.find("w:t").unwrap().attr("xml:space"), Some("preserve"));
    }

    #[test]
    fn resolves_entities_in_text_and_attributes() {
        let root = parse(r#"<a t="x &amp; y">1 &lt; 2 &#x3B1; &#946;</a>"#).unwrap();
        assert_eq!(root.attr("t"), Some("x & y"));
        assert_eq!(root.text(), "1 < 2 α β");
    }

    #[test]
    fn attr_local_ignores_prefix() {
        let root = parse(r#"<m:chr m:val="∑"/>"#).unwrap();
        assert_eq!(root.attr_local("val"), Some("∑"));
        assert_eq!(root.attr("val"), None);
    }

    #[test]
    fn path_and_find_all() {
        let root = parse("<a><b><c>1</c></b><b><c>2</c></b></a>").unwrap();
        assert_eq!(root.path(&["b", "c"]).unwrap().text(), "1");
        let all: Vec<String> = root.find_all("c").iter().map(|c| c.text()).collect();
        assert_eq!(all, vec!["1", "2"]);
    }

    #[test]
    fn toggle_semantics() {
        let on = parse(r#"<w:b/>"#).unwrap();
        let off = parse(r#"<w:b w:val="0"/>"#).unwrap();
        assert!(is_on(Some(&on)));
        assert!(!is_on(Some(&off)));
        assert!(!is_on(None));
    }

    #[test]
    fn rejects_malformed_xml() {
        assert!(parse("<a><b></a>").is_err());
        assert!(parse("").is_err());
    }
}
