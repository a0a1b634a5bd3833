//! In-memory XML document tree.
//!
//! Documents are parsed with `quick-xml` into an owned tree and serialised
//! back to text. The tree keeps whitespace text nodes so that reserialising an
//! unmodified document preserves its layout; comparisons that should ignore
//! formatting go through [`XmlDocument::structurally_eq`].

use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::{BytesDecl, BytesStart, Event};
use thiserror::Error;

/// Error raised when text is not a well-formed XML document.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("malformed XML at byte {position}: {message}")]
pub struct ParseError {
    position: u64,
    message: String,
}

impl ParseError {
    fn new(position: u64, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }

    /// Byte offset at which the problem was detected.
    #[must_use]
    pub const fn position(&self) -> u64 {
        self.position
    }

    /// Description of the problem.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A single `name="value"` pair on an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Qualified attribute name.
    pub name: String,
    /// Unescaped attribute value.
    pub value: String,
}

impl Attribute {
    /// Builds an attribute.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Content node of an element or of the document prolog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Child element.
    Element(Element),
    /// Unescaped character data.
    Text(String),
    /// CDATA section content.
    CData(String),
    /// Comment body.
    Comment(String),
    /// Processing instruction body (target and data).
    ProcessingInstruction(String),
    /// Document type declaration body.
    DocType(String),
}

/// An element with its attributes and content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    attributes: Vec<Attribute>,
    children: Vec<Node>,
}

impl Element {
    /// Creates an empty element.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Qualified element name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attributes in document order.
    #[must_use]
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Replaces the attribute list wholesale.
    pub fn replace_attributes(&mut self, attributes: Vec<Attribute>) {
        self.attributes = attributes;
    }

    /// Returns the value of the named attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attribute| attribute.name == name)
            .map(|attribute| attribute.value.as_str())
    }

    /// Sets an attribute, keeping its position when it already exists.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(existing) = self
            .attributes
            .iter_mut()
            .find(|attribute| attribute.name == name)
        {
            existing.value = value;
            return;
        }
        self.attributes.push(Attribute { name, value });
    }

    /// Removes the named attribute, returning its value.
    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        let index = self
            .attributes
            .iter()
            .position(|attribute| attribute.name == name)?;
        Some(self.attributes.remove(index).value)
    }

    /// Content nodes in document order.
    #[must_use]
    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Appends a content node.
    pub fn push(&mut self, node: Node) {
        self.children.push(node);
    }

    /// Builder-style variant of [`Element::set_attribute`].
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(name, value);
        self
    }

    /// Builder-style variant of [`Element::push`].
    #[must_use]
    pub fn with_child(mut self, node: Node) -> Self {
        self.push(node);
        self
    }

    /// Direct child elements.
    pub fn child_elements(&self) -> impl Iterator<Item = &Self> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    /// Concatenated text and CDATA of the direct children.
    #[must_use]
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(text) | Node::CData(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Visits this element and all descendants in document order.
    pub fn visit(&self, visitor: &mut dyn FnMut(&Self, usize)) {
        self.visit_at(0, visitor);
    }

    fn visit_at(&self, depth: usize, visitor: &mut dyn FnMut(&Self, usize)) {
        visitor(self, depth);
        for child in self.child_elements() {
            child.visit_at(depth + 1, visitor);
        }
    }

    /// Applies `rewrite` to this element and all descendants, parents first.
    pub fn rewrite(&mut self, rewrite: &mut dyn FnMut(&mut Self)) {
        rewrite(self);
        for child in &mut self.children {
            if let Node::Element(element) = child {
                element.rewrite(rewrite);
            }
        }
    }

    fn normalized(&self) -> Self {
        let mut attributes = self.attributes.clone();
        attributes.sort_by(|left, right| left.name.cmp(&right.name));
        let children = self
            .children
            .iter()
            .filter_map(|node| match node {
                Node::Element(element) => Some(Node::Element(element.normalized())),
                Node::Text(text) | Node::CData(text) => {
                    let trimmed = text.trim();
                    (!trimmed.is_empty()).then(|| Node::Text(trimmed.to_owned()))
                }
                Node::Comment(_) | Node::ProcessingInstruction(_) | Node::DocType(_) => None,
            })
            .collect();
        Self {
            name: self.name.clone(),
            attributes,
            children,
        }
    }

    fn write_to(&self, out: &mut String) {
        out.push_str(&format!("<{}", self.name));
        for attribute in &self.attributes {
            out.push_str(&format!(
                " {}=\"{}\"",
                attribute.name,
                escape(attribute.value.as_str())
            ));
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            write_node(child, out);
        }
        out.push_str(&format!("</{}>", self.name));
    }
}

/// The `<?xml ...?>` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    version: String,
    encoding: Option<String>,
    standalone: Option<String>,
}

impl Default for Declaration {
    fn default() -> Self {
        Self {
            version: "1.0".to_owned(),
            encoding: Some("UTF-8".to_owned()),
            standalone: None,
        }
    }
}

impl Declaration {
    fn from_event(decl: &BytesDecl<'_>, position: u64) -> Result<Self, ParseError> {
        let text = |bytes: &[u8]| String::from_utf8_lossy(bytes).into_owned();
        let version = decl
            .version()
            .map_err(|error| ParseError::new(position, error.to_string()))?;
        let encoding = decl
            .encoding()
            .transpose()
            .map_err(|error| ParseError::new(position, error.to_string()))?;
        let standalone = decl
            .standalone()
            .transpose()
            .map_err(|error| ParseError::new(position, error.to_string()))?;
        Ok(Self {
            version: text(&version),
            encoding: encoding.map(|value| text(&value)),
            standalone: standalone.map(|value| text(&value)),
        })
    }

    /// Trees are always serialised as UTF-8, so any other label is
    /// rewritten.
    fn write_to(&self, out: &mut String) {
        out.push_str(&format!("<?xml version=\"{}\"", self.version));
        if let Some(encoding) = &self.encoding {
            let encoding = if is_utf8_label(encoding) {
                encoding.as_str()
            } else {
                "UTF-8"
            };
            out.push_str(&format!(" encoding=\"{encoding}\""));
        }
        if let Some(standalone) = &self.standalone {
            out.push_str(&format!(" standalone=\"{standalone}\""));
        }
        out.push_str("?>");
    }
}

fn is_utf8_label(encoding: &str) -> bool {
    encoding.eq_ignore_ascii_case("utf-8") || encoding.eq_ignore_ascii_case("utf8")
}

/// A parsed XML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    declaration: Option<Declaration>,
    prolog: Vec<Node>,
    root: Element,
    epilog: Vec<Node>,
}

impl XmlDocument {
    /// Wraps a root element in a document with a default declaration.
    #[must_use]
    pub fn new(root: Element) -> Self {
        Self {
            declaration: Some(Declaration::default()),
            prolog: Vec::new(),
            root,
            epilog: Vec::new(),
        }
    }

    /// Parses UTF-8 bytes.
    ///
    /// A declaration naming another encoding is accepted only when the
    /// bytes are plain ASCII, which reads the same either way.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] for invalid UTF-8, for non-ASCII content
    /// declared in another encoding, or for malformed markup.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        let text = std::str::from_utf8(bytes).map_err(|error| {
            ParseError::new(
                u64::try_from(error.valid_up_to()).unwrap_or(u64::MAX),
                "document is not valid UTF-8",
            )
        })?;
        let document = Self::parse(text)?;
        let declared = document
            .declaration
            .as_ref()
            .and_then(|declaration| declaration.encoding.as_deref());
        let mislabelled =
            declared.filter(|encoding| !is_utf8_label(encoding) && !bytes.is_ascii());
        if let Some(encoding) = mislabelled {
            return Err(ParseError::new(
                0,
                format!("document declares encoding {encoding}; only UTF-8 content is supported"),
            ));
        }
        Ok(document)
    }

    /// Parses document text.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] when the text is not a single well-formed
    /// document.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let mut reader = Reader::from_str(text);
        let mut builder = TreeBuilder::default();

        loop {
            let position = offset(reader.buffer_position());
            let event = reader
                .read_event()
                .map_err(|error| ParseError::new(position, error.to_string()))?;
            match event {
                Event::Decl(decl) => {
                    builder.declaration = Some(Declaration::from_event(&decl, position)?);
                }
                Event::Start(start) => builder.open(element_from(&start, position)?),
                Event::Empty(start) => {
                    builder.attach(Node::Element(element_from(&start, position)?), position)?;
                }
                Event::End(_) => builder.close(position)?,
                Event::Text(text) => {
                    let value = text
                        .unescape()
                        .map_err(|error| ParseError::new(position, error.to_string()))?;
                    builder.attach(Node::Text(value.into_owned()), position)?;
                }
                Event::CData(data) => {
                    let value = String::from_utf8_lossy(&data.into_inner()).into_owned();
                    builder.attach(Node::CData(value), position)?;
                }
                Event::Comment(comment) => {
                    let value = String::from_utf8_lossy(&comment).into_owned();
                    builder.attach(Node::Comment(value), position)?;
                }
                Event::PI(instruction) => {
                    let value = String::from_utf8_lossy(&instruction).into_owned();
                    builder.attach(Node::ProcessingInstruction(value), position)?;
                }
                Event::DocType(doctype) => {
                    let value = String::from_utf8_lossy(&doctype).trim().to_owned();
                    builder.attach(Node::DocType(value), position)?;
                }
                Event::Eof => break,
            }
        }

        builder.finish(offset(reader.buffer_position()))
    }

    /// Root element.
    #[must_use]
    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Mutable root element.
    pub fn root_mut(&mut self) -> &mut Element {
        &mut self.root
    }

    /// Serialises the document to text, ending with a newline.
    #[must_use]
    pub fn to_xml_string(&self) -> String {
        let mut out = String::new();
        if let Some(declaration) = &self.declaration {
            declaration.write_to(&mut out);
            out.push('\n');
        }
        for node in &self.prolog {
            write_node(node, &mut out);
            out.push('\n');
        }
        self.root.write_to(&mut out);
        out.push('\n');
        for node in &self.epilog {
            write_node(node, &mut out);
            out.push('\n');
        }
        out
    }

    /// Serialised bytes, as written to disk.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_xml_string().into_bytes()
    }

    /// Compares two documents ignoring whitespace-only text, surrounding
    /// whitespace in text, attribute order, comments and the prolog.
    #[must_use]
    pub fn structurally_eq(&self, other: &Self) -> bool {
        self.root.normalized() == other.root.normalized()
    }
}

#[derive(Default)]
struct TreeBuilder {
    declaration: Option<Declaration>,
    prolog: Vec<Node>,
    open: Vec<Element>,
    root: Option<Element>,
    epilog: Vec<Node>,
}

impl TreeBuilder {
    fn open(&mut self, element: Element) {
        self.open.push(element);
    }

    fn close(&mut self, position: u64) -> Result<(), ParseError> {
        let element = self
            .open
            .pop()
            .ok_or_else(|| ParseError::new(position, "unexpected closing tag"))?;
        self.attach(Node::Element(element), position)
    }

    fn attach(&mut self, node: Node, position: u64) -> Result<(), ParseError> {
        if let Some(parent) = self.open.last_mut() {
            parent.push(node);
            return Ok(());
        }
        match node {
            Node::Text(text) if text.trim().is_empty() => Ok(()),
            Node::Text(_) | Node::CData(_) => Err(ParseError::new(
                position,
                "character data outside the root element",
            )),
            Node::Element(element) => {
                if self.root.is_some() {
                    return Err(ParseError::new(position, "multiple root elements"));
                }
                self.root = Some(element);
                Ok(())
            }
            other if self.root.is_none() => {
                self.prolog.push(other);
                Ok(())
            }
            other => {
                self.epilog.push(other);
                Ok(())
            }
        }
    }

    fn finish(self, position: u64) -> Result<XmlDocument, ParseError> {
        if let Some(unclosed) = self.open.last() {
            return Err(ParseError::new(
                position,
                format!("unclosed element <{}>", unclosed.name()),
            ));
        }
        let root = self
            .root
            .ok_or_else(|| ParseError::new(position, "document has no root element"))?;
        Ok(XmlDocument {
            declaration: self.declaration,
            prolog: self.prolog,
            root,
            epilog: self.epilog,
        })
    }
}

fn offset(position: impl TryInto<u64>) -> u64 {
    position.try_into().unwrap_or(u64::MAX)
}

fn element_from(start: &BytesStart<'_>, position: u64) -> Result<Element, ParseError> {
    let mut element = Element::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|error| ParseError::new(position, error.to_string()))?;
        let value = attribute
            .unescape_value()
            .map_err(|error| ParseError::new(position, error.to_string()))?;
        element.attributes.push(Attribute {
            name: String::from_utf8_lossy(attribute.key.as_ref()).into_owned(),
            value: value.into_owned(),
        });
    }
    Ok(element)
}

fn write_node(node: &Node, out: &mut String) {
    match node {
        Node::Element(element) => element.write_to(out),
        Node::Text(text) => out.push_str(&escape(text.as_str())),
        Node::CData(data) => {
            out.push_str(&format!("<![CDATA[{data}]]>"));
        }
        Node::Comment(comment) => {
            out.push_str(&format!("<!--{comment}-->"));
        }
        Node::ProcessingInstruction(body) => {
            out.push_str(&format!("<?{body}?>"));
        }
        Node::DocType(body) => {
            out.push_str(&format!("<!DOCTYPE {body}>"));
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    const RECIPE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!-- syllabub -->
<recipe title="Syllabub">
  <section kind="equipment">
    <item>bowl</item>
    <item>whisk &amp; spoon</item>
  </section>
  <note><![CDATA[a < b]]></note>
</recipe>
"#;

    #[test]
    fn parses_elements_attributes_and_text() {
        let document = XmlDocument::parse(RECIPE).expect("parse recipe");
        let root = document.root();
        assert_eq!(root.name(), "recipe");
        assert_eq!(root.attribute("title"), Some("Syllabub"));

        let section = root.child_elements().next().expect("section");
        let items: Vec<String> = section.child_elements().map(Element::text).collect();
        assert_eq!(items, vec!["bowl".to_owned(), "whisk & spoon".to_owned()]);
    }

    #[test]
    fn reserialising_preserves_layout() {
        let document = XmlDocument::parse(RECIPE).expect("parse recipe");
        let text = document.to_xml_string();
        assert_eq!(text, RECIPE);
    }

    #[test]
    fn reparsing_serialised_output_is_structurally_equal() {
        let document = XmlDocument::parse(RECIPE).expect("parse recipe");
        let reparsed = XmlDocument::parse(&document.to_xml_string()).expect("reparse");
        assert_eq!(document, reparsed);
    }

    #[test]
    fn structural_equality_ignores_whitespace_and_attribute_order() {
        let compact = XmlDocument::parse(r#"<a x="1" y="2"><b>t</b></a>"#).expect("parse");
        let spaced =
            XmlDocument::parse("<a y=\"2\" x=\"1\">\n  <b>  t </b>\n</a>").expect("parse");
        assert!(compact.structurally_eq(&spaced));
        assert_ne!(compact, spaced);
    }

    #[test]
    fn structural_equality_detects_attribute_changes() {
        let before = XmlDocument::parse(r#"<a x="1"/>"#).expect("parse");
        let after = XmlDocument::parse(r#"<a x="2"/>"#).expect("parse");
        assert!(!before.structurally_eq(&after));
    }

    #[rstest]
    #[case("<a><b></a>")]
    #[case("<a/><b/>")]
    #[case("text <a/>")]
    #[case("<a>")]
    #[case("")]
    fn rejects_malformed_documents(#[case] text: &str) {
        assert!(XmlDocument::parse(text).is_err(), "accepted {text:?}");
    }

    #[test]
    fn attribute_editing_keeps_positions() {
        let mut element = Element::new("item")
            .with_attribute("a", "1")
            .with_attribute("b", "2");
        element.set_attribute("a", "3");
        assert_eq!(element.attributes().first().map(|a| a.value.as_str()), Some("3"));
        assert_eq!(element.remove_attribute("b"), Some("2".to_owned()));
        assert_eq!(element.remove_attribute("missing"), None);
    }

    #[test]
    fn escapes_special_characters_on_output() {
        let document = XmlDocument::new(
            Element::new("a")
                .with_attribute("q", "\"x\" & <y>")
                .with_child(Node::Text("1 < 2".to_owned())),
        );
        let text = document.to_xml_string();
        let reparsed = XmlDocument::parse(&text).expect("reparse escaped output");
        assert_eq!(reparsed.root().attribute("q"), Some("\"x\" & <y>"));
        assert_eq!(reparsed.root().text(), "1 < 2");
    }

    #[test]
    fn non_utf8_bytes_are_rejected() {
        let error = XmlDocument::from_bytes(b"<a>caf\xe9</a>").expect_err("latin-1 bytes");
        assert_eq!(error.position(), 6);
    }

    #[test]
    fn non_ascii_content_under_a_foreign_label_is_rejected() {
        let bytes = "<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><a>café</a>".as_bytes();
        assert!(XmlDocument::from_bytes(bytes).is_err());
    }

    #[test]
    fn ascii_content_under_a_foreign_label_is_relabelled_on_output() {
        let document = XmlDocument::from_bytes(
            br#"<?xml version="1.0" encoding="ISO-8859-1"?><a>cafe</a>"#,
        )
        .expect("ascii document");
        assert_eq!(
            document.to_xml_string(),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<a>cafe</a>\n"
        );
    }

    #[test]
    fn visit_reports_depths() {
        let document = XmlDocument::parse("<a><b><c/></b><b/></a>").expect("parse");
        let mut seen = Vec::new();
        document
            .root()
            .visit(&mut |element, depth| seen.push((element.name().to_owned(), depth)));
        assert_eq!(
            seen,
            vec![
                ("a".to_owned(), 0),
                ("b".to_owned(), 1),
                ("c".to_owned(), 2),
                ("b".to_owned(), 1),
            ]
        );
    }
}
