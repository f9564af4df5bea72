//! The normalized message a template renders to.
//!
//! This is everything a [`Syntax`](crate::syntax::Syntax) adapter gets to
//! see; the markup tree itself never leaves the evaluator.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Heading,
    Paragraph,
    LineBreak,
}

/// Formatted text inside a segment. Adapters decide how styles are shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Inline {
    Text(String),
    Bold(Vec<Inline>),
    Italic(Vec<Inline>),
    Underline(Vec<Inline>),
    Code(String),
    Link { href: String, text: String },
}

impl Inline {
    pub fn plain_text(&self) -> String {
        match self {
            Inline::Text(s) | Inline::Code(s) => s.clone(),
            Inline::Link { text, .. } => text.clone(),
            Inline::Bold(items) | Inline::Italic(items) | Inline::Underline(items) => {
                plain_text(items)
            }
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        match self {
            Inline::Text(s) | Inline::Code(s) => s.is_empty(),
            Inline::Link { text, .. } => text.is_empty(),
            Inline::Bold(items) | Inline::Italic(items) | Inline::Underline(items) => {
                items.iter().all(Inline::is_empty)
            }
        }
    }
}

/// Plain text of a run of inline pieces, joined by single spaces.
pub fn plain_text(items: &[Inline]) -> String {
    items
        .iter()
        .map(Inline::plain_text)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// One block of message text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub kind: SegmentKind,
    pub content: Vec<Inline>,
}

impl Segment {
    pub fn heading(content: Vec<Inline>) -> Self {
        Self {
            kind: SegmentKind::Heading,
            content,
        }
    }

    pub fn paragraph(content: Vec<Inline>) -> Self {
        Self {
            kind: SegmentKind::Paragraph,
            content,
        }
    }

    pub fn line_break() -> Self {
        Self {
            kind: SegmentKind::LineBreak,
            content: Vec::new(),
        }
    }

    pub fn text(&self) -> String {
        plain_text(&self.content)
    }
}

/// A photo or animation: an URL or a file id known to the bot platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Media {
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Button {
    pub label: String,
    /// Non-control attributes of the `<button>`, interpolated, as written.
    pub attributes: BTreeMap<String, String>,
}

impl Button {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn callback_data(&self) -> Option<&str> {
        self.get("callback_data")
    }

    pub fn url(&self) -> Option<&str> {
        self.get("url")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplyOptions {
    pub resize_keyboard: Option<bool>,
    pub one_time_keyboard: Option<bool>,
    pub input_field_placeholder: Option<String>,
    pub selective: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyboardKind {
    /// Buttons attached to the message.
    Inline,
    /// Buttons replacing the user's keyboard.
    Reply(ReplyOptions),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Keyboard {
    pub kind: KeyboardKind,
    pub rows: Vec<Vec<Button>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenderedMessage {
    pub segments: Vec<Segment>,
    pub image: Option<Media>,
    pub animation: Option<Media>,
    pub keyboard: Option<Keyboard>,
}

impl RenderedMessage {
    /// Plain text, one line per segment.
    pub fn text(&self) -> String {
        self.segments
            .iter()
            .map(Segment::text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn has_text(&self) -> bool {
        self.segments
            .iter()
            .any(|s| s.content.iter().any(|i| !i.is_empty()))
    }

    /// A message carries at most one kind of media.
    pub fn check_media(&self) -> Result<()> {
        if self.image.is_some() && self.animation.is_some() {
            return Err(Error::InvalidMessage(
                "a message cannot contain both an image and an animation".to_string(),
            ));
        }
        Ok(())
    }

    /// Check the message can be sent at all.
    pub fn validate(&self) -> Result<()> {
        self.check_media()?;
        if !self.has_text() && self.image.is_none() && self.animation.is_none() {
            return Err(Error::InvalidMessage(
                "a message needs text, an image or an animation".to_string(),
            ));
        }
        Ok(())
    }
}

/// Messages rendered from a `<messages>` document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RenderedMessages(pub Vec<RenderedMessage>);

impl RenderedMessages {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RenderedMessage> {
        self.0.iter()
    }

    /// The only message, `None` when there are none.
    ///
    /// More than one message is an error.
    pub fn extract(self) -> Result<Option<RenderedMessage>> {
        let mut messages = self.0;
        match messages.len() {
            0 => Ok(None),
            1 => Ok(messages.pop()),
            n => Err(Error::InvalidMessage(format!(
                "expected a single message, found {}",
                n
            ))),
        }
    }
}

impl IntoIterator for RenderedMessages {
    type Item = RenderedMessage;
    type IntoIter = std::vec::IntoIter<RenderedMessage>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_text_joins_inline_pieces() {
        let segment = Segment::paragraph(vec![
            Inline::Text("Hello".into()),
            Inline::Bold(vec![Inline::Text("big".into())]),
            Inline::Text(String::new()),
            Inline::Link {
                href: "https://example.com".into(),
                text: "world".into(),
            },
        ]);
        assert_eq!(segment.text(), "Hello big world");
    }

    #[test]
    fn validate_rejects_image_and_animation() {
        let message = RenderedMessage {
            image: Some(Media { source: "a.png".into() }),
            animation: Some(Media { source: "b.gif".into() }),
            ..Default::default()
        };
        assert!(matches!(message.validate(), Err(Error::InvalidMessage(_))));
    }

    #[test]
    fn validate_rejects_empty_message() {
        let message = RenderedMessage {
            segments: vec![Segment::line_break()],
            ..Default::default()
        };
        assert!(message.validate().is_err());

        let message = RenderedMessage {
            image: Some(Media { source: "a.png".into() }),
            ..Default::default()
        };
        assert!(message.validate().is_ok());
    }

    #[test]
    fn extract() {
        assert_eq!(RenderedMessages(vec![]).extract().unwrap(), None);

        let one = RenderedMessages(vec![RenderedMessage::default()]);
        assert!(one.extract().unwrap().is_some());

        let two = RenderedMessages(vec![RenderedMessage::default(), RenderedMessage::default()]);
        assert!(two.extract().is_err());
    }
}
