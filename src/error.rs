//! Error types for parsing, evaluating and translating templates.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for botmarkup operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Where in the template an evaluation error happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub tag: String,
    pub line: usize,
    /// Attribute name when the failing expression sits in an attribute value.
    pub attribute: Option<String>,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}> at line {}", self.tag, self.line)?;
        if let Some(attr) = &self.attribute {
            write!(f, ", attribute `{}`", attr)?;
        }
        Ok(())
    }
}

/// Errors raised while rendering a template. Every variant aborts the render.
#[derive(Debug, Error)]
pub enum Error {
    /// The document is not well-formed.
    #[error("malformed markup at line {line}: {message}")]
    MalformedMarkup { message: String, line: usize },

    /// A tag that is unsupported, or not allowed where it appears.
    #[error("unknown tag <{tag}> inside <{parent}> at line {line}")]
    UnknownTag {
        tag: String,
        parent: String,
        line: usize,
    },

    /// An interpolation or control-attribute expression failed.
    #[error("{location}: cannot evaluate `{expr}`: {message}")]
    Expression {
        expr: String,
        message: String,
        location: Location,
    },

    #[error("<{tag}> at line {line} requires attribute `{attribute}`")]
    MissingAttribute {
        tag: String,
        attribute: String,
        line: usize,
    },

    #[error("<{tag}> at line {line}: invalid `{attribute}`: {message}")]
    InvalidAttribute {
        tag: String,
        attribute: String,
        message: String,
        line: usize,
    },

    /// Variables named by `<message requires="...">` are absent from the context.
    #[error("template at line {line} requires context variables: {}", names.join(", "))]
    MissingVariables { names: Vec<String>, line: usize },

    /// The rendered message cannot be turned into a bot request.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("failed to read template {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure of a single expression, before a template location is attached.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ExprError(pub String);

impl ExprError {
    pub fn new(message: impl Into<String>) -> Self {
        ExprError(message.into())
    }

    /// Attach the expression source and template location.
    pub fn at(self, expr: &str, location: Location) -> Error {
        Error::Expression {
            expr: expr.to_string(),
            message: self.0,
            location,
        }
    }
}
