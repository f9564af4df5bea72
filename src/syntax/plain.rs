use super::Syntax;
use crate::message::RenderedMessage;

/// Plain text output: no markup, no `parse_mode`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainText;

impl Syntax for PlainText {
    fn format_text(&self, message: &RenderedMessage) -> String {
        message.text()
    }
}
