use std::sync::Arc;

use botmarkup::{render, set_default_syntax, Context, PlainText};
use serde_json::json;

// Kept in its own test binary: the default adapter is process-wide.
#[test]
fn default_syntax_can_be_replaced() {
    let source = "<message><heading>Hi</heading><p>a &lt; b</p></message>";

    let html = render(source, &Context::new()).unwrap();
    assert_eq!(html.param("text"), Some(&json!("<b>HI</b>\na &lt; b")));
    assert_eq!(html.param("parse_mode"), Some(&json!("HTML")));

    set_default_syntax(Arc::new(PlainText));
    let plain = render(source, &Context::new()).unwrap();
    assert_eq!(plain.param("text"), Some(&json!("Hi\na < b")));
    assert_eq!(plain.param("parse_mode"), None);
}
