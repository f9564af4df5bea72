//! botmarkup: XML-like message templates for chat bots.
//!
//! A template is a small markup document describing one bot message:
//! headings and paragraphs of text, an optional image or animation, and an
//! inline or reply keyboard. Templates are evaluated against a [`Context`]
//! of variables and turned into a [`Sendable`] request by a [`Syntax`]
//! adapter.
//!
//! ```xml
//! <message>
//!     <heading>Hello, #{user.name}!</heading>
//!     <p for="item in items">#{loop.index}. #{item}</p>
//!     <p if="not items">Nothing here yet.</p>
//!     <inline-keyboard>
//!         <button callback_data="refresh">Refresh</button>
//!     </inline-keyboard>
//! </message>
//! ```
//!
//! Control attributes:
//! - `if="expr"` keeps the element only when `expr` is truthy.
//! - `for="name in expr"` repeats the element once per value.
//!
//! Interpolation: `#{expr}` in text and attribute values. Expressions are a
//! small Python-like language: literals, variables, `.attr` and `[index]`
//! access, arithmetic, comparisons, `and` / `or` / `not`, `in`, and a few
//! builtins (`range`, `len`, `str`, `int`, `float`, `bool`, `abs`, `min`,
//! `max`, `lower`, `upper`).
//!
//! Evaluation never performs I/O and never mutates the context; a parsed
//! [`Template`] can be rendered from many threads at once.

mod ast;
mod error;
mod eval;
mod lexer;
mod markup;
mod message;
mod parser;
mod render;
mod syntax;
mod value;

use std::fs;
use std::path::Path;

use tracing::debug;

pub use error::{Error, ExprError, Location, Result};
pub use markup::{Attribute, Element, Node, ParseOptions, Text, Whitespace};
pub use message::{
    Button, Inline, Keyboard, KeyboardKind, Media, RenderedMessage, RenderedMessages,
    ReplyOptions, Segment, SegmentKind,
};
pub use syntax::{
    build_edit, default_syntax, set_default_syntax, EditTarget, Method, PlainText, Sendable,
    Syntax, TelegramHtml,
};
pub use value::{Context, Value};

/// A parsed template, ready to be evaluated any number of times.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    root: Element,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self> {
        Self::parse_with(source, ParseOptions::default())
    }

    pub fn parse_with(source: &str, options: ParseOptions) -> Result<Self> {
        let root = markup::parse_with(source, options)?;
        debug!(root = %root.name, len = source.len(), "template parsed");
        Ok(Self { root })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "template loaded");
        Self::parse(&source)
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Evaluate a `<message>` template into exactly one message.
    pub fn evaluate(&self, context: &Context) -> Result<RenderedMessage> {
        render::evaluate(&self.root, context)
    }

    /// Evaluate a `<message>` or `<messages>` template.
    pub fn evaluate_all(&self, context: &Context) -> Result<RenderedMessages> {
        render::evaluate_all(&self.root, context)
    }

    /// Evaluate and build a request with the process-wide default syntax.
    pub fn render(&self, context: &Context) -> Result<Sendable> {
        self.render_with(context, default_syntax().as_ref())
    }

    pub fn render_with(&self, context: &Context, syntax: &dyn Syntax) -> Result<Sendable> {
        let message = self.evaluate(context)?;
        syntax.build_sendable(&message)
    }
}

/// Parse `source` and render it with the default syntax.
pub fn render(source: &str, context: &Context) -> Result<Sendable> {
    Template::parse(source)?.render(context)
}

/// Read a template file and render it with the default syntax.
pub fn render_file(path: impl AsRef<Path>, context: &Context) -> Result<Sendable> {
    Template::from_file(path)?.render(context)
}
