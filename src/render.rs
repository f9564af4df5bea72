//! Template evaluator: walks a parsed document and builds messages.
//!
//! Every element first goes through its control attributes. `for` runs
//! before anything else and re-processes the element once per value in a
//! child scope; `if` runs next (inside that scope, so it can see the loop
//! variable) and drops the whole subtree when false-y. Only then are the
//! tag's own attributes and children evaluated.

use std::collections::BTreeMap;
use std::mem;

use tracing::{debug, trace};

use crate::ast::Piece;
use crate::error::{Error, ExprError, Location, Result};
use crate::eval::{iterate, loop_info, Evaluator};
use crate::markup::{Element, Node, Text};
use crate::message::{
    plain_text, Button, Inline, Keyboard, KeyboardKind, Media, RenderedMessage, RenderedMessages,
    ReplyOptions, Segment,
};
use crate::parser::{parse_for, split_markers};
use crate::value::{parse_flag, Context};

const CONTROL_ATTRIBUTES: [&str; 2] = ["if", "for"];

/// Evaluate a `<message>` document into a single message.
///
/// Control attributes on the root may still yield zero or several messages;
/// both are errors here. Use [`evaluate_all`] for those documents.
pub fn evaluate(root: &Element, context: &Context) -> Result<RenderedMessage> {
    let messages = evaluate_all(root, context)?;
    match messages.len() {
        1 => Ok(messages.0.into_iter().next().unwrap_or_default()),
        n => Err(Error::InvalidMessage(format!(
            "template rendered {} messages, expected exactly one",
            n
        ))),
    }
}

/// Evaluate a `<message>` or `<messages>` document.
pub fn evaluate_all(root: &Element, context: &Context) -> Result<RenderedMessages> {
    let mut renderer = Renderer {
        ev: Evaluator::new(context),
    };
    let mut messages = Vec::new();

    match root.name.as_str() {
        "message" => renderer.expand(root, |r| {
            messages.push(r.message(root)?);
            Ok(())
        })?,
        "messages" => renderer.expand(root, |r| r.messages(root, &mut messages))?,
        _ => {
            return Err(Error::UnknownTag {
                tag: root.name.clone(),
                parent: "document".to_string(),
                line: root.line,
            })
        }
    }

    debug!(root = %root.name, messages = messages.len(), "rendered template");
    Ok(RenderedMessages(messages))
}

/// Message text under construction.
///
/// Inline pieces accumulate until the next block element closes them into
/// a paragraph of their own.
#[derive(Default)]
struct TextLayout {
    segments: Vec<Segment>,
    buffer: Vec<Inline>,
}

impl TextLayout {
    fn add_inline(&mut self, inline: Inline) {
        if !inline.is_empty() {
            self.buffer.push(inline);
        }
    }

    fn add_block(&mut self, segment: Segment) {
        self.close_paragraph();
        self.segments.push(segment);
    }

    fn close_paragraph(&mut self) {
        if !self.buffer.is_empty() {
            let content = mem::take(&mut self.buffer);
            self.segments.push(Segment::paragraph(content));
        }
    }

    fn finish(mut self) -> Vec<Segment> {
        self.close_paragraph();
        self.segments
    }
}

/// Keyboard rows under construction. Bare buttons share a row.
#[derive(Default)]
struct KeyboardLayout {
    rows: Vec<Vec<Button>>,
    buffer: Vec<Button>,
}

impl KeyboardLayout {
    fn add(&mut self, button: Button) {
        self.buffer.push(button);
    }

    fn add_row(&mut self, row: Vec<Button>) {
        self.close_row();
        self.rows.push(row);
    }

    fn close_row(&mut self) {
        if !self.buffer.is_empty() {
            let row = mem::take(&mut self.buffer);
            self.rows.push(row);
        }
    }

    fn finish(mut self) -> Vec<Vec<Button>> {
        self.close_row();
        self.rows
    }
}

struct Renderer<'a> {
    ev: Evaluator<'a>,
}

impl<'a> Renderer<'a> {
    /// Run `body` once per active instance of `element`, after `for` and `if`.
    fn expand<F>(&mut self, element: &Element, mut body: F) -> Result<()>
    where
        F: FnMut(&mut Self) -> Result<()>,
    {
        let source = match element.attr("for") {
            Some(source) => source,
            None => return self.guard(element, &mut body),
        };

        let location = location(element, Some("for"));
        let spec = parse_for(source).map_err(|e| e.at(source, location.clone()))?;
        let items = self
            .ev
            .eval_expr(&spec.iterable)
            .and_then(iterate)
            .map_err(|e| e.at(source, location))?;

        trace!(tag = %element.name, var = %spec.target, iterations = items.len(), "for loop");

        let length = items.len();
        for (index0, item) in items.into_iter().enumerate() {
            self.ev.push_scope();
            self.ev.set_local(spec.target.as_str(), item);
            self.ev.set_local("loop", loop_info(index0, length));
            let result = self.guard(element, &mut body);
            self.ev.pop_scope();
            result?;
        }
        Ok(())
    }

    fn guard<F>(&mut self, element: &Element, body: &mut F) -> Result<()>
    where
        F: FnMut(&mut Self) -> Result<()>,
    {
        if let Some(source) = element.attr("if") {
            let value = self
                .ev
                .eval(source)
                .map_err(|e| e.at(source, location(element, Some("if"))))?;
            if !value.is_truthy() {
                trace!(tag = %element.name, line = element.line, "if is false-y, skipping");
                return Ok(());
            }
        }
        body(self)
    }

    /// Interpolated value of an attribute.
    fn attr(&self, element: &Element, name: &str) -> Result<Option<String>> {
        match element.attr(name) {
            Some(raw) => self
                .ev
                .interpolate(raw, &location(element, Some(name)))
                .map(Some),
            None => Ok(None),
        }
    }

    fn required_attr(&self, element: &Element, name: &str) -> Result<String> {
        self.attr(element, name)?
            .ok_or_else(|| Error::MissingAttribute {
                tag: element.name.clone(),
                attribute: name.to_string(),
                line: element.line,
            })
    }

    fn bool_attr(&self, element: &Element, name: &str) -> Result<Option<bool>> {
        let value = match self.attr(element, name)? {
            Some(value) => value,
            None => return Ok(None),
        };
        match parse_flag(&value) {
            Some(flag) => Ok(Some(flag)),
            None => Err(Error::InvalidAttribute {
                tag: element.name.clone(),
                attribute: name.to_string(),
                message: format!("expected a boolean, got {:?}", value),
                line: element.line,
            }),
        }
    }

    /// Text node content: whitespace collapsed, markers interpolated.
    fn text(&self, text: &Text, parent: &Element) -> Result<String> {
        let location = Location {
            tag: parent.name.clone(),
            line: text.line,
            attribute: None,
        };
        let collapsed = collapse_whitespace(&text.content)
            .map_err(|e| e.at(text.content.trim(), location.clone()))?;
        self.ev.interpolate(&collapsed, &location)
    }

    fn messages(&mut self, root: &Element, out: &mut Vec<RenderedMessage>) -> Result<()> {
        for child in &root.children {
            match child {
                Node::Text(text) if text.content.trim().is_empty() => {}
                Node::Element(element) if element.name == "message" => {
                    self.expand(element, |r| {
                        out.push(r.message(element)?);
                        Ok(())
                    })?;
                }
                other => return Err(unexpected(other, root)),
            }
        }
        Ok(())
    }

    fn message(&mut self, element: &Element) -> Result<RenderedMessage> {
        if let Some(requires) = element.attr("requires") {
            let missing: Vec<String> = requires
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty() && !self.ev.is_defined(name))
                .map(str::to_string)
                .collect();
            if !missing.is_empty() {
                return Err(Error::MissingVariables {
                    names: missing,
                    line: element.line,
                });
            }
        }

        let mut layout = TextLayout::default();
        let mut message = RenderedMessage::default();

        for child in &element.children {
            match child {
                Node::Text(text) => {
                    let content = self.text(text, element)?;
                    layout.add_inline(Inline::Text(content));
                }
                Node::Element(child) => {
                    self.expand(child, |r| r.message_tag(child, element, &mut layout, &mut message))?;
                }
            }
        }

        message.segments = layout.finish();
        Ok(message)
    }

    fn message_tag(
        &mut self,
        element: &Element,
        parent: &Element,
        layout: &mut TextLayout,
        message: &mut RenderedMessage,
    ) -> Result<()> {
        match element.name.as_str() {
            "heading" => {
                let content = self.inline_children(element, false)?;
                layout.add_block(Segment::heading(content));
            }
            "p" => {
                let content = self.inline_children(element, true)?;
                layout.add_block(Segment::paragraph(content));
            }
            "br" => layout.add_block(Segment::line_break()),
            "img" => {
                message.image = Some(Media {
                    source: self.required_attr(element, "src")?,
                });
            }
            "anim" => {
                message.animation = Some(Media {
                    source: self.required_attr(element, "src")?,
                });
            }
            "inline-keyboard" => {
                message.keyboard = Some(self.keyboard(element, KeyboardKind::Inline)?);
            }
            "reply-keyboard" => {
                let options = ReplyOptions {
                    resize_keyboard: self.bool_attr(element, "resize_keyboard")?,
                    one_time_keyboard: self.bool_attr(element, "one_time_keyboard")?,
                    input_field_placeholder: self.attr(element, "input_field_placeholder")?,
                    selective: self.bool_attr(element, "selective")?,
                };
                message.keyboard = Some(self.keyboard(element, KeyboardKind::Reply(options))?);
            }
            _ => {
                let mut pieces = Vec::new();
                self.inline_tag(element, parent, true, &mut pieces)?;
                for piece in pieces {
                    layout.add_inline(piece);
                }
            }
        }
        Ok(())
    }

    /// Inline content of `element`. Without `markup` only text and `<span>`
    /// are allowed.
    fn inline_children(&mut self, element: &Element, markup: bool) -> Result<Vec<Inline>> {
        let mut out = Vec::new();
        for child in &element.children {
            match child {
                Node::Text(text) => {
                    let content = self.text(text, element)?;
                    if !content.is_empty() {
                        out.push(Inline::Text(content));
                    }
                }
                Node::Element(child) => {
                    self.expand(child, |r| r.inline_tag(child, element, markup, &mut out))?;
                }
            }
        }
        Ok(out)
    }

    fn inline_tag(
        &mut self,
        element: &Element,
        parent: &Element,
        markup: bool,
        out: &mut Vec<Inline>,
    ) -> Result<()> {
        let inline = match element.name.as_str() {
            "span" => {
                let content = self.inline_children(element, markup)?;
                out.extend(content);
                return Ok(());
            }
            "b" if markup => Inline::Bold(self.inline_children(element, true)?),
            "i" if markup => Inline::Italic(self.inline_children(element, true)?),
            "u" if markup => Inline::Underline(self.inline_children(element, true)?),
            "code" if markup => Inline::Code(plain_text(&self.inline_children(element, false)?)),
            "a" if markup => {
                let href = self.required_attr(element, "href")?;
                let text = plain_text(&self.inline_children(element, false)?);
                Inline::Link { href, text }
            }
            _ => return Err(unknown_tag(element, parent)),
        };
        if !inline.is_empty() {
            out.push(inline);
        }
        Ok(())
    }

    fn keyboard(&mut self, element: &Element, kind: KeyboardKind) -> Result<Keyboard> {
        let mut layout = KeyboardLayout::default();

        for child in &element.children {
            match child {
                Node::Text(text) if text.content.trim().is_empty() => {}
                Node::Element(child) if child.name == "button" => {
                    self.expand(child, |r| {
                        layout.add(r.button(child)?);
                        Ok(())
                    })?;
                }
                Node::Element(child) if child.name == "row" => {
                    self.expand(child, |r| {
                        let row = r.keyboard_row(child)?;
                        layout.add_row(row);
                        Ok(())
                    })?;
                }
                other => return Err(unexpected(other, element)),
            }
        }

        Ok(Keyboard {
            kind,
            rows: layout.finish(),
        })
    }

    fn keyboard_row(&mut self, element: &Element) -> Result<Vec<Button>> {
        let mut row = Vec::new();
        for child in &element.children {
            match child {
                Node::Text(text) if text.content.trim().is_empty() => {}
                Node::Element(child) if child.name == "button" => {
                    self.expand(child, |r| {
                        row.push(r.button(child)?);
                        Ok(())
                    })?;
                }
                other => return Err(unexpected(other, element)),
            }
        }
        Ok(row)
    }

    fn button(&mut self, element: &Element) -> Result<Button> {
        let label = match self.attr(element, "text")? {
            Some(label) => label,
            None => plain_text(&self.inline_children(element, false)?),
        };

        let mut attributes = BTreeMap::new();
        for attr in &element.attributes {
            let name = attr.name.as_str();
            if name == "text" || CONTROL_ATTRIBUTES.contains(&name) {
                continue;
            }
            let value = self
                .ev
                .interpolate(&attr.value, &location(element, Some(name)))?;
            attributes.insert(attr.name.clone(), value);
        }

        Ok(Button { label, attributes })
    }
}

fn location(element: &Element, attribute: Option<&str>) -> Location {
    Location {
        tag: element.name.clone(),
        line: element.line,
        attribute: attribute.map(str::to_string),
    }
}

fn unknown_tag(element: &Element, parent: &Element) -> Error {
    Error::UnknownTag {
        tag: element.name.clone(),
        parent: parent.name.clone(),
        line: element.line,
    }
}

/// Error for a child node that is not allowed in `parent`.
fn unexpected(node: &Node, parent: &Element) -> Error {
    match node {
        Node::Element(element) => unknown_tag(element, parent),
        Node::Text(text) => Error::UnknownTag {
            tag: "#text".to_string(),
            parent: parent.name.clone(),
            line: text.line,
        },
    }
}

/// Collapse whitespace runs outside `#{...}` markers and trim the ends.
fn collapse_whitespace(raw: &str) -> std::result::Result<String, ExprError> {
    let mut out = String::with_capacity(raw.len());
    for piece in split_markers(raw)? {
        match piece {
            Piece::Literal(s) => {
                let mut in_space = out.ends_with(' ');
                for c in s.chars() {
                    if c.is_whitespace() {
                        if !in_space {
                            out.push(' ');
                            in_space = true;
                        }
                    } else {
                        out.push(c);
                        in_space = false;
                    }
                }
            }
            Piece::Expr(source) => {
                out.push_str("#{");
                out.push_str(source);
                out.push('}');
            }
        }
    }
    Ok(out.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::parse;
    use crate::message::SegmentKind;
    use pretty_assertions::assert_eq;

    fn render(source: &str, context: &Context) -> Result<RenderedMessage> {
        evaluate(&parse(source)?, context)
    }

    fn texts(message: &RenderedMessage) -> Vec<String> {
        message.segments.iter().map(Segment::text).collect()
    }

    #[test]
    fn collapses_whitespace_outside_markers() {
        assert_eq!(
            collapse_whitespace("  Hello \n\t  #{ \"a  b\" }   world  ").unwrap(),
            "Hello #{ \"a  b\" } world"
        );
    }

    #[test]
    fn bare_text_groups_into_paragraphs() {
        let message = render(
            "<message>Hello <b>there</b><br/>General <span>Kenobi</span></message>",
            &Context::new(),
        )
        .unwrap();

        assert_eq!(
            message.segments,
            vec![
                Segment::paragraph(vec![
                    Inline::Text("Hello".into()),
                    Inline::Bold(vec![Inline::Text("there".into())]),
                ]),
                Segment::line_break(),
                Segment::paragraph(vec![
                    Inline::Text("General".into()),
                    Inline::Text("Kenobi".into()),
                ]),
            ]
        );
    }

    #[test]
    fn inline_markup() {
        let message = render(
            r#"<message><p><i>a <u>b</u></i> <code>x <span>y</span></code> <a href="https://t.me/#{user}">me</a></p></message>"#,
            &Context::new().with("user", "bot"),
        )
        .unwrap();

        assert_eq!(
            message.segments[0].content,
            vec![
                Inline::Italic(vec![
                    Inline::Text("a".into()),
                    Inline::Underline(vec![Inline::Text("b".into())]),
                ]),
                Inline::Code("x y".into()),
                Inline::Link {
                    href: "https://t.me/bot".into(),
                    text: "me".into(),
                },
            ]
        );
    }

    #[test]
    fn heading_allows_only_plain_text() {
        let message = render("<message><heading>Hi <span>you</span></heading></message>", &Context::new())
            .unwrap();
        assert_eq!(message.segments[0].kind, SegmentKind::Heading);
        assert_eq!(message.segments[0].text(), "Hi you");

        match render("<message><heading><b>x</b></heading></message>", &Context::new()) {
            Err(Error::UnknownTag { tag, parent, .. }) => {
                assert_eq!(tag, "b");
                assert_eq!(parent, "heading");
            }
            other => panic!("expected unknown tag, got {:?}", other),
        }
    }

    #[test]
    fn for_runs_before_if() {
        let message = render(
            r#"<message><p for="i in range(5)" if="i % 2 == 0">#{i}</p></message>"#,
            &Context::new(),
        )
        .unwrap();
        assert_eq!(texts(&message), vec!["0", "2", "4"]);
    }

    #[test]
    fn loop_helper_and_nested_loops() {
        let ctx = Context::from_json(serde_json::json!({ "rows": [["a", "b"], ["c"]] })).unwrap();
        let message = render(
            r#"<message>
                <p for="row in rows">#{loop.index}: <span for="cell in row">#{cell}</span></p>
            </message>"#,
            &ctx,
        )
        .unwrap();
        assert_eq!(texts(&message), vec!["1: a b", "2: c"]);
    }

    #[test]
    fn loop_variable_does_not_leak() {
        let result = render(
            r#"<message><p for="i in range(2)">#{i}</p><p>#{i}</p></message>"#,
            &Context::new(),
        );
        assert!(matches!(result, Err(Error::Expression { .. })));
    }

    #[test]
    fn for_over_non_iterable_fails() {
        match render(r#"<message><p for="i in 3">x</p></message>"#, &Context::new()) {
            Err(Error::Expression { location, .. }) => {
                assert_eq!(location.tag, "p");
                assert_eq!(location.attribute.as_deref(), Some("for"));
            }
            other => panic!("expected expression error, got {:?}", other),
        }
        assert!(render(r#"<message><p for="3 in x">x</p></message>"#, &Context::new()).is_err());
    }

    #[test]
    fn media_last_one_wins() {
        let message = render(
            r##"<message><img src="a.png"/><img for="n in ['b', 'c']" src="#{n}.png"/><anim src="x.gif"/></message>"##,
            &Context::new(),
        )
        .unwrap();
        assert_eq!(message.image.unwrap().source, "c.png");
        assert_eq!(message.animation.unwrap().source, "x.gif");
    }

    #[test]
    fn img_requires_src() {
        assert!(matches!(
            render("<message><img/></message>", &Context::new()),
            Err(Error::MissingAttribute { .. })
        ));
    }

    #[test]
    fn keyboard_rows() {
        let message = render(
            r#"<message>
                <inline-keyboard>
                    <button callback_data="a">A</button>
                    <button url="https://example.com" text="B"/>
                    <row>
                        <button for="n in range(2)" callback_data="n#{n}">N#{n}</button>
                    </row>
                    <button callback_data="z" if="false">Z</button>
                    <button callback_data="last">Last</button>
                </inline-keyboard>
            </message>"#,
            &Context::new(),
        )
        .unwrap();

        let keyboard = message.keyboard.unwrap();
        assert_eq!(keyboard.kind, KeyboardKind::Inline);
        let labels: Vec<Vec<&str>> = keyboard
            .rows
            .iter()
            .map(|row| row.iter().map(|b| b.label.as_str()).collect())
            .collect();
        assert_eq!(labels, vec![vec!["A", "B"], vec!["N0", "N1"], vec!["Last"]]);
        assert_eq!(keyboard.rows[0][1].url(), Some("https://example.com"));
        assert_eq!(keyboard.rows[1][1].callback_data(), Some("n1"));
        assert!(!keyboard.rows[0][1].attributes.contains_key("text"));
    }

    #[test]
    fn reply_keyboard_options() {
        let message = render(
            r##"<message>
                Pick one
                <reply-keyboard resize_keyboard="true" one_time_keyboard="#{once}" input_field_placeholder="Color">
                    <button>Red</button>
                    <button request_location="true">Here</button>
                </reply-keyboard>
            </message>"##,
            &Context::new().with("once", false),
        )
        .unwrap();

        let keyboard = message.keyboard.unwrap();
        assert_eq!(
            keyboard.kind,
            KeyboardKind::Reply(ReplyOptions {
                resize_keyboard: Some(true),
                one_time_keyboard: Some(false),
                input_field_placeholder: Some("Color".into()),
                selective: None,
            })
        );
        assert_eq!(keyboard.rows[0].len(), 2);

        assert!(matches!(
            render(
                r#"<message>x<reply-keyboard selective="maybe"><button>a</button></reply-keyboard></message>"#,
                &Context::new()
            ),
            Err(Error::InvalidAttribute { .. })
        ));
    }

    #[test]
    fn text_inside_keyboard_is_rejected() {
        assert!(matches!(
            render(
                "<message><inline-keyboard>oops<button>a</button></inline-keyboard></message>",
                &Context::new()
            ),
            Err(Error::UnknownTag { .. })
        ));
    }

    #[test]
    fn unknown_tags_fail_closed() {
        match render("<message><p>x</p><marquee>y</marquee></message>", &Context::new()) {
            Err(Error::UnknownTag { tag, parent, line }) => {
                assert_eq!(tag, "marquee");
                assert_eq!(parent, "message");
                assert_eq!(line, 1);
            }
            other => panic!("expected unknown tag, got {:?}", other),
        }
        // Known tags in the wrong place fail too.
        assert!(render("<message><p><img src=\"a\"/></p></message>", &Context::new()).is_err());
        assert!(render("<document/>", &Context::new()).is_err());
    }

    #[test]
    fn unknown_tag_in_skipped_subtree_is_not_reported() {
        let message = render(
            "<message><p>ok</p><marquee if=\"false\">y</marquee></message>",
            &Context::new(),
        )
        .unwrap();
        assert_eq!(texts(&message), vec!["ok"]);
    }

    #[test]
    fn requires_checks_context() {
        let source = r#"<message requires="first, last"><p>#{first} #{last}</p></message>"#;
        match render(source, &Context::new().with("first", "Ivan")) {
            Err(Error::MissingVariables { names, .. }) => assert_eq!(names, vec!["last"]),
            other => panic!("expected missing variables, got {:?}", other),
        }
        let ctx = Context::new().with("first", "Ivan").with("last", "Ivanov");
        assert_eq!(texts(&render(source, &ctx).unwrap()), vec!["Ivan Ivanov"]);
    }

    #[test]
    fn messages_document() {
        let root = parse(
            r#"<messages>
                <message for="name in names"><p>Hi #{name}</p></message>
                <message if="false"><p>never</p></message>
            </messages>"#,
        )
        .unwrap();
        let ctx = Context::new().with("names", vec!["Ann", "Bob"]);

        let messages = evaluate_all(&root, &ctx).unwrap();
        let all: Vec<String> = messages.iter().map(RenderedMessage::text).collect();
        assert_eq!(all, vec!["Hi Ann", "Hi Bob"]);

        assert!(evaluate(&root, &ctx).is_err());
        assert!(evaluate(&root, &Context::new().with("names", vec!["Ann"])).is_ok());
    }

    #[test]
    fn interpolated_value_whitespace_is_kept() {
        let message = render(
            "<message><p>[#{value}]</p></message>",
            &Context::new().with("value", "a\n b"),
        )
        .unwrap();
        assert_eq!(texts(&message), vec!["[a\n b]"]);
    }
}
