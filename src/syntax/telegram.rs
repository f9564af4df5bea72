use quick_xml::escape::partial_escape;

use super::Syntax;
use crate::message::{plain_text, Inline, RenderedMessage, SegmentKind};

/// Telegram `parse_mode = "HTML"` output.
///
/// Headings are upper-cased and bold; inline styles map to `<b>`, `<i>`,
/// `<u>`, `<code>` and `<a>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TelegramHtml;

impl Syntax for TelegramHtml {
    fn format_text(&self, message: &RenderedMessage) -> String {
        message
            .segments
            .iter()
            .map(|segment| match segment.kind {
                SegmentKind::Heading => format!(
                    "<b>{}</b>",
                    escape_text(&plain_text(&segment.content).to_uppercase())
                ),
                SegmentKind::Paragraph => format_inlines(&segment.content),
                SegmentKind::LineBreak => String::new(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn parse_mode(&self) -> Option<&'static str> {
        Some("HTML")
    }
}

fn format_inlines(items: &[Inline]) -> String {
    items
        .iter()
        .filter(|item| !item.is_empty())
        .map(format_inline)
        .collect::<Vec<_>>()
        .join(" ")
}

fn format_inline(item: &Inline) -> String {
    match item {
        Inline::Text(s) => escape_text(s),
        Inline::Bold(items) => format!("<b>{}</b>", format_inlines(items)),
        Inline::Italic(items) => format!("<i>{}</i>", format_inlines(items)),
        Inline::Underline(items) => format!("<u>{}</u>", format_inlines(items)),
        Inline::Code(s) => format!("<code>{}</code>", escape_text(s)),
        Inline::Link { href, text } => format!(
            "<a href=\"{}\">{}</a>",
            escape_text(href).replace('"', "&quot;"),
            escape_text(text)
        ),
    }
}

/// Telegram only understands `&lt;`, `&gt;`, `&amp;` and `&quot;`.
fn escape_text(s: &str) -> String {
    partial_escape(s).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Media, Segment};
    use crate::syntax::Method;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn formats_segments() {
        let message = RenderedMessage {
            segments: vec![
                Segment::heading(vec![Inline::Text("Hello!".into())]),
                Segment::paragraph(vec![
                    Inline::Text("a < b & c".into()),
                    Inline::Bold(vec![Inline::Italic(vec![Inline::Text("x".into())])]),
                ]),
                Segment::line_break(),
                Segment::paragraph(vec![
                    Inline::Code("<tag>".into()),
                    Inline::Link {
                        href: "https://e.com/?q=\"1\"&a=2".into(),
                        text: "link".into(),
                    },
                ]),
            ],
            ..Default::default()
        };

        assert_eq!(
            TelegramHtml.format_text(&message),
            "<b>HELLO!</b>\n\
             a &lt; b &amp; c <b><i>x</i></b>\n\
             \n\
             <code>&lt;tag&gt;</code> <a href=\"https://e.com/?q=&quot;1&quot;&amp;a=2\">link</a>"
        );
    }

    #[test]
    fn photo_uses_caption() {
        let message = RenderedMessage {
            segments: vec![Segment::paragraph(vec![Inline::Text("Look".into())])],
            image: Some(Media {
                source: "https://e.com/cat.png".into(),
            }),
            ..Default::default()
        };

        let sendable = TelegramHtml.build_sendable(&message).unwrap();
        assert_eq!(sendable.method, Method::SendPhoto);
        assert_eq!(
            sendable.payload(1),
            json!({
                "chat_id": 1,
                "photo": "https://e.com/cat.png",
                "caption": "Look",
                "parse_mode": "HTML",
            })
        );
    }

    #[test]
    fn animation_without_text() {
        let message = RenderedMessage {
            animation: Some(Media {
                source: "file-id".into(),
            }),
            ..Default::default()
        };

        let sendable = TelegramHtml.build_sendable(&message).unwrap();
        assert_eq!(sendable.method, Method::SendAnimation);
        assert_eq!(sendable.param("caption"), None);
        assert_eq!(sendable.param("parse_mode"), None);
    }

    #[test]
    fn rejects_invalid_message() {
        assert!(TelegramHtml.build_sendable(&RenderedMessage::default()).is_err());
    }
}
