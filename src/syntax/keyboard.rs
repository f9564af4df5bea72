//! `reply_markup` encoding for inline and reply keyboards.

use serde_json::{json, Map, Value as Json};

use crate::error::{Error, Result};
use crate::message::{Button, Keyboard, KeyboardKind};
use crate::value::parse_flag;

/// Button fields the Bot API expects as booleans.
const BOOL_FIELDS: &[&str] = &["pay", "request_contact", "request_location"];

/// Button fields the Bot API expects as `{ "url": ... }` objects.
const URL_OBJECT_FIELDS: &[&str] = &["web_app", "login_url"];

pub(super) fn reply_markup(keyboard: &Keyboard) -> Result<Json> {
    let rows = keyboard
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(button)
                .collect::<Result<Vec<_>>>()
                .map(Json::Array)
        })
        .collect::<Result<Vec<_>>>()?;

    let mut markup = Map::new();
    match &keyboard.kind {
        KeyboardKind::Inline => {
            markup.insert("inline_keyboard".to_string(), Json::Array(rows));
        }
        KeyboardKind::Reply(options) => {
            markup.insert("keyboard".to_string(), Json::Array(rows));
            if let Some(v) = options.resize_keyboard {
                markup.insert("resize_keyboard".to_string(), json!(v));
            }
            if let Some(v) = options.one_time_keyboard {
                markup.insert("one_time_keyboard".to_string(), json!(v));
            }
            if let Some(v) = &options.input_field_placeholder {
                markup.insert("input_field_placeholder".to_string(), json!(v));
            }
            if let Some(v) = options.selective {
                markup.insert("selective".to_string(), json!(v));
            }
        }
    }
    Ok(Json::Object(markup))
}

fn button(button: &Button) -> Result<Json> {
    let mut fields = Map::new();
    fields.insert("text".to_string(), json!(button.label));

    for (name, value) in &button.attributes {
        let field = if BOOL_FIELDS.contains(&name.as_str()) {
            json!(parse_bool(name, value)?)
        } else if URL_OBJECT_FIELDS.contains(&name.as_str()) {
            json!({ "url": value })
        } else if name == "request_poll" {
            json!({ "type": value })
        } else if name == "callback_game" {
            json!({})
        } else {
            json!(value)
        };
        fields.insert(name.clone(), field);
    }
    Ok(Json::Object(fields))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    parse_flag(value).ok_or_else(|| {
        Error::InvalidMessage(format!(
            "button field `{}` expects a boolean, got {:?}",
            name, value
        ))
    })
}
