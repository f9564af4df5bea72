//! Markup parser: turns a template document into an [`Element`] tree.

use crate::error::{Error, Result};
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::Reader;

/// Handling of whitespace-only text between elements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Whitespace {
    /// Drop whitespace-only text nodes.
    #[default]
    Trim,
    /// Keep every text node as written.
    Preserve,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    pub whitespace: Whitespace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Text {
    pub content: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(Text),
}

/// A parsed tag with its attributes and children. Immutable after parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    /// Attributes in document order; names are unique.
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
    /// 1-based line of the opening `<`.
    pub line: usize,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }
}

/// Parse a document with the default options.
pub fn parse(source: &str) -> Result<Element> {
    parse_with(source, ParseOptions::default())
}

pub fn parse_with(source: &str, options: ParseOptions) -> Result<Element> {
    MarkupParser::new(source, options).parse()
}

/// Element under construction.
struct BuildNode {
    name: String,
    attributes: Vec<Attribute>,
    line: usize,
    children: Vec<Node>,
}

struct MarkupParser<'a> {
    reader: Reader<&'a [u8]>,
    options: ParseOptions,
    /// Byte offsets where each line starts.
    line_starts: Vec<usize>,
    stack: Vec<BuildNode>,
}

impl<'a> MarkupParser<'a> {
    fn new(source: &'a str, options: ParseOptions) -> Self {
        let mut reader = Reader::from_str(source);
        reader.config_mut().trim_text_start = false;
        reader.config_mut().trim_text_end = false;

        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();

        Self {
            reader,
            options,
            line_starts,
            stack: Vec::new(),
        }
    }

    fn line_at(&self, offset: usize) -> usize {
        self.line_starts.partition_point(|&start| start <= offset)
    }

    fn malformed(&self, message: impl Into<String>, offset: usize) -> Error {
        Error::MalformedMarkup {
            message: message.into(),
            line: self.line_at(offset),
        }
    }

    fn parse(mut self) -> Result<Element> {
        let mut root: Option<Element> = None;

        loop {
            let event_start = self.reader.buffer_position() as usize;

            match self.reader.read_event() {
                Ok(Event::Start(e)) => {
                    let node = self.start_node(&e, event_start)?;
                    self.stack.push(node);
                }
                Ok(Event::End(e)) => {
                    let end_name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    let node = self.stack.pop().ok_or_else(|| {
                        self.malformed(format!("unexpected closing tag </{}>", end_name), event_start)
                    })?;
                    if node.name != end_name {
                        return Err(self.malformed(
                            format!("expected </{}>, found </{}>", node.name, end_name),
                            event_start,
                        ));
                    }
                    let element = Element {
                        name: node.name,
                        attributes: node.attributes,
                        children: node.children,
                        line: node.line,
                    };
                    self.attach(element, &mut root, event_start)?;
                }
                Ok(Event::Empty(e)) => {
                    let node = self.start_node(&e, event_start)?;
                    let element = Element {
                        name: node.name,
                        attributes: node.attributes,
                        children: Vec::new(),
                        line: node.line,
                    };
                    self.attach(element, &mut root, event_start)?;
                }
                Ok(Event::Text(e)) => {
                    self.handle_text(&e, event_start)?;
                }
                Ok(Event::CData(e)) => {
                    let content = String::from_utf8_lossy(e.as_ref()).into_owned();
                    self.push_text(content, event_start)?;
                }
                Ok(Event::Comment(_) | Event::PI(_) | Event::Decl(_) | Event::DocType(_)) => {}
                Ok(Event::Eof) => break,
                Err(e) => {
                    let position = self.reader.error_position() as usize;
                    return Err(self.malformed(e.to_string(), position));
                }
            }
        }

        if let Some(node) = self.stack.last() {
            return Err(Error::MalformedMarkup {
                message: format!("<{}> is never closed", node.name),
                line: node.line,
            });
        }

        root.ok_or_else(|| Error::MalformedMarkup {
            message: "document has no root element".to_string(),
            line: 1,
        })
    }

    fn start_node(&self, e: &BytesStart<'_>, event_start: usize) -> Result<BuildNode> {
        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();

        let mut attributes = Vec::new();
        for attr_result in e.attributes() {
            let attr = attr_result.map_err(|err| {
                self.malformed(format!("invalid attribute in <{}>: {}", name, err), event_start)
            })?;
            let value = attr.unescape_value().map_err(|err| {
                self.malformed(
                    format!("invalid attribute value in <{}>: {}", name, err),
                    event_start,
                )
            })?;
            attributes.push(Attribute {
                name: String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
                value: value.into_owned(),
            });
        }

        Ok(BuildNode {
            name,
            attributes,
            line: self.line_at(event_start),
            children: Vec::new(),
        })
    }

    fn attach(&mut self, element: Element, root: &mut Option<Element>, offset: usize) -> Result<()> {
        match self.stack.last_mut() {
            Some(parent) => {
                parent.children.push(Node::Element(element));
                Ok(())
            }
            None if root.is_some() => Err(self.malformed(
                format!("second root element <{}>", element.name),
                offset,
            )),
            None => {
                *root = Some(element);
                Ok(())
            }
        }
    }

    fn handle_text(&mut self, e: &BytesText<'_>, event_start: usize) -> Result<()> {
        let text = e.unescape().map_err(|err| {
            self.malformed(format!("invalid text content: {}", err), event_start)
        })?;
        self.push_text(text.into_owned(), event_start)
    }

    fn push_text(&mut self, content: String, event_start: usize) -> Result<()> {
        let blank = content.trim().is_empty();
        if blank && (self.stack.is_empty() || self.options.whitespace == Whitespace::Trim) {
            return Ok(());
        }

        let line = self.line_at(event_start);
        match self.stack.last_mut() {
            Some(node) => {
                node.children.push(Node::Text(Text { content, line }));
                Ok(())
            }
            None => Err(self.malformed("text outside the root element", event_start)),
        }
    }
}
