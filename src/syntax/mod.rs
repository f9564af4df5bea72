//! Syntax adapters: translate a [`RenderedMessage`] into a bot API request.
//!
//! An adapter decides how headings and inline styles look in the final text
//! (HTML markup, plain text, ...). The request shape itself (which method,
//! which fields, the keyboard encoding) follows the Telegram Bot API and is
//! shared by every adapter.

mod keyboard;
mod plain;
mod telegram;

use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::{json, Map, Value as Json};
use tracing::debug;

use crate::error::{Error, Result};
use crate::message::RenderedMessage;

pub use plain::PlainText;
pub use telegram::TelegramHtml;

/// Translates rendered messages into sendable requests.
///
/// Adapters only decide how the text looks; the request shape is shared.
pub trait Syntax: Send + Sync {
    /// Message text as it should appear in the `text` or `caption` field.
    fn format_text(&self, message: &RenderedMessage) -> String;

    /// Value of the Bot API `parse_mode` field, if the text uses one.
    fn parse_mode(&self) -> Option<&'static str> {
        None
    }

    fn build_sendable(&self, message: &RenderedMessage) -> Result<Sendable> {
        assemble(message, self.format_text(message), self.parse_mode())
    }
}

/// Bot API method a [`Sendable`] calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Method {
    SendMessage,
    SendPhoto,
    SendAnimation,
    EditMessageText,
    EditMessageMedia,
    EditMessageCaption,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::SendMessage => "sendMessage",
            Method::SendPhoto => "sendPhoto",
            Method::SendAnimation => "sendAnimation",
            Method::EditMessageText => "editMessageText",
            Method::EditMessageMedia => "editMessageMedia",
            Method::EditMessageCaption => "editMessageCaption",
        }
    }
}

/// A ready-to-send request: method name plus JSON parameters, without the
/// chat it goes to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sendable {
    pub method: Method,
    pub params: Map<String, Json>,
}

impl Sendable {
    pub fn param(&self, name: &str) -> Option<&Json> {
        self.params.get(name)
    }

    /// Request body for sending to `chat_id`.
    pub fn payload(&self, chat_id: i64) -> Json {
        let mut body = self.params.clone();
        body.insert("chat_id".to_string(), json!(chat_id));
        Json::Object(body)
    }

    /// Request body for an edit of `message_id` in `chat_id`.
    pub fn edit_payload(&self, chat_id: i64, message_id: i64) -> Json {
        let mut body = self.params.clone();
        body.insert("chat_id".to_string(), json!(chat_id));
        body.insert("message_id".to_string(), json!(message_id));
        Json::Object(body)
    }
}

/// Media kind of the chat message an edit targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditTarget {
    Text,
    Photo,
    Animation,
}

/// Build the request that edits an existing chat message into `message`.
///
/// A text message can only get new text; a media message can get new media
/// of the same kind, or a new caption when the render carries no media. An
/// empty render clears the caption.
pub fn build_edit(
    syntax: &dyn Syntax,
    message: &RenderedMessage,
    target: EditTarget,
) -> Result<Sendable> {
    message.check_media()?;

    let text = Some(syntax.format_text(message))
        .filter(|text| !text.is_empty())
        .map(Json::String);
    let parse_mode = match text {
        Some(_) => syntax.parse_mode().map(|mode| json!(mode)),
        None => None,
    };

    let mut params = Map::new();
    if let Some(keyboard) = &message.keyboard {
        params.insert("reply_markup".to_string(), keyboard::reply_markup(keyboard)?);
    }

    if target == EditTarget::Text {
        if let Some(text) = text.clone() {
            params.insert("text".to_string(), text);
            if let Some(mode) = parse_mode {
                params.insert("parse_mode".to_string(), mode);
            }
            return Ok(Sendable {
                method: Method::EditMessageText,
                params,
            });
        }
    }

    let media = match (&message.image, &message.animation, target) {
        (Some(image), _, EditTarget::Photo) => Some(("photo", image)),
        (_, Some(animation), EditTarget::Animation) => Some(("animation", animation)),
        (None, None, _) => None,
        _ => {
            return Err(Error::InvalidMessage(
                "an edit must keep the media type of the existing message".to_string(),
            ))
        }
    };

    if let Some((kind, media)) = media {
        let mut input = Map::new();
        input.insert("type".to_string(), json!(kind));
        input.insert("media".to_string(), json!(media.source));
        if let Some(text) = text {
            input.insert("caption".to_string(), text);
            if let Some(mode) = parse_mode {
                input.insert("parse_mode".to_string(), mode);
            }
        }
        params.insert("media".to_string(), Json::Object(input));
        return Ok(Sendable {
            method: Method::EditMessageMedia,
            params,
        });
    }

    params.insert("caption".to_string(), text.unwrap_or_else(|| json!("")));
    if let Some(mode) = parse_mode {
        params.insert("parse_mode".to_string(), mode);
    }
    Ok(Sendable {
        method: Method::EditMessageCaption,
        params,
    })
}

/// Shared request shape: photo, animation or plain text message.
fn assemble(message: &RenderedMessage, text: String, parse_mode: Option<&str>) -> Result<Sendable> {
    message.validate()?;

    let mut params = Map::new();
    let text_field = if let Some(image) = &message.image {
        params.insert("photo".to_string(), json!(image.source));
        "caption"
    } else if let Some(animation) = &message.animation {
        params.insert("animation".to_string(), json!(animation.source));
        "caption"
    } else {
        "text"
    };
    let method = match (&message.image, &message.animation) {
        (Some(_), _) => Method::SendPhoto,
        (None, Some(_)) => Method::SendAnimation,
        (None, None) => Method::SendMessage,
    };

    if !text.is_empty() {
        params.insert(text_field.to_string(), json!(text));
        if let Some(mode) = parse_mode {
            params.insert("parse_mode".to_string(), json!(mode));
        }
    }

    if let Some(keyboard) = &message.keyboard {
        params.insert("reply_markup".to_string(), keyboard::reply_markup(keyboard)?);
    }

    Ok(Sendable { method, params })
}

static DEFAULT_SYNTAX: Lazy<RwLock<Arc<dyn Syntax>>> = Lazy::new(|| {
    let syntax: Arc<dyn Syntax> = Arc::new(TelegramHtml);
    RwLock::new(syntax)
});

/// Replace the adapter used by [`crate::render`] and [`crate::Template::render`].
///
/// Meant to be called once at startup; [`crate::Template::render_with`]
/// takes an adapter explicitly instead.
pub fn set_default_syntax(syntax: Arc<dyn Syntax>) {
    debug!("default syntax adapter replaced");
    *DEFAULT_SYNTAX
        .write()
        .unwrap_or_else(PoisonError::into_inner) = syntax;
}

pub fn default_syntax() -> Arc<dyn Syntax> {
    DEFAULT_SYNTAX
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}
