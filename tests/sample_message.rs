use botmarkup::{Context, Method, Segment, SegmentKind, Template, TelegramHtml};
use pretty_assertions::assert_eq;
use serde_json::json;

const SAMPLE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/sample.xml");

fn texts(segments: &[Segment]) -> Vec<String> {
    segments
        .iter()
        .filter(|s| s.kind == SegmentKind::Paragraph)
        .map(Segment::text)
        .collect()
}

#[test]
fn sample_with_count() {
    let template = Template::from_file(SAMPLE).unwrap();
    let message = template.evaluate(&Context::new().with("count", 3)).unwrap();

    assert_eq!(message.segments[0].kind, SegmentKind::Heading);
    assert_eq!(message.segments[0].text(), "Counter");
    assert_eq!(
        texts(&message.segments),
        vec![
            "Try to change \"count\" in context 0",
            "Try to change \"count\" in context 1",
            "Try to change \"count\" in context 2",
        ]
    );
    assert_eq!(
        message.image.as_ref().map(|m| m.source.as_str()),
        Some("https://example.com/counter.png")
    );

    let keyboard = message.keyboard.unwrap();
    assert_eq!(keyboard.rows.len(), 1);
    assert_eq!(keyboard.rows[0].len(), 1);
    assert_eq!(keyboard.rows[0][0].label, "Ok.");
    assert_eq!(keyboard.rows[0][0].callback_data(), Some("delete"));
}

#[test]
fn sample_without_count() {
    let template = Template::from_file(SAMPLE).unwrap();
    let message = template.evaluate(&Context::new().with("count", 0)).unwrap();

    assert_eq!(texts(&message.segments), vec!["Ok, now there is nothing..."]);
}

#[test]
fn sample_telegram_payload() {
    let template = Template::from_file(SAMPLE).unwrap();
    let sendable = template
        .render_with(&Context::new().with("count", 1), &TelegramHtml)
        .unwrap();

    assert_eq!(sendable.method, Method::SendPhoto);
    assert_eq!(
        sendable.payload(100),
        json!({
            "chat_id": 100,
            "photo": "https://example.com/counter.png",
            "caption": "<b>COUNTER</b>\nTry to change \"count\" in context 0",
            "parse_mode": "HTML",
            "reply_markup": {
                "inline_keyboard": [[{ "text": "Ok.", "callback_data": "delete" }]]
            },
        })
    );
}

#[test]
fn sample_from_json_context() {
    let ctx = Context::from_json(json!({ "count": 2 })).unwrap();
    let message = botmarkup::Template::from_file(SAMPLE)
        .unwrap()
        .evaluate(&ctx)
        .unwrap();
    assert_eq!(texts(&message.segments).len(), 2);
}
