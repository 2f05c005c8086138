use serde_json::Value;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::OffsetDateTime;
use tokio::time::{Duration, Instant};

use crate::backend::{Document, Identity};
use crate::ui;
use crate::GetField;

const SOUND_THROTTLE: Duration = Duration::from_millis(1000);
const TIME_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[hour]:[minute]");

/// One display block per message.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageBlock {
    pub id: String,
    pub mine: bool,
    pub sender: String,
    pub avatar: String,
    pub time: String,
    pub timestamp: Option<i64>,
    pub text: String,
    /// Plain-text-escaped body, safe to drop into markup as-is.
    pub html: String,
    pub attachment: Option<String>,
    pub can_delete: bool,
    pub visible: bool,
}

pub struct Rendered {
    pub blocks: Vec<MessageBlock>,
    pub play_sound: bool,
}

/// Turns message snapshots into display order and view state. Stateful
/// only for the notification throttle clock.
#[derive(Default)]
pub struct Renderer {
    last_sound: Option<Instant>,
}

impl Renderer {
    pub fn render(
        &mut self,
        docs: &[Document],
        viewer: Option<&Identity>,
        filter: Option<&str>,
    ) -> Rendered {
        let viewer_id = viewer.map(|identity| identity.id.to_string());

        let mut blocks: Vec<MessageBlock> = docs
            .iter()
            .rev()
            .map(|doc| {
                let sender = doc.fields.get_str_field("sender").unwrap_or_else(|_| "Anonymous".into());
                let text = doc.fields.get_str_field("text").unwrap_or_default();
                let mine = viewer_id.is_some() && doc.fields.get_str_field("userId").ok() == viewer_id;
                let timestamp = doc.fields.get("timestamp").and_then(Value::as_i64);
                let avatar = doc
                    .fields
                    .get_str_field("avatar")
                    .unwrap_or_else(|_| ui::avatar_url(&sender));
                MessageBlock {
                    id: doc.id.clone(),
                    mine,
                    avatar,
                    time: time_label(timestamp),
                    timestamp,
                    html: escape_html(&text),
                    text,
                    sender,
                    attachment: doc.fields.get("imageUrl").and_then(Value::as_str).map(str::to_owned),
                    can_delete: mine,
                    visible: true,
                }
            })
            .collect();

        // the snapshot arrives newest-first; display is oldest-first,
        // committed messages strictly ascending by server time
        blocks.sort_by_key(|block| block.timestamp.unwrap_or(i64::MAX));

        let mut play_sound = false;
        for block in &blocks {
            if block.mine || block.timestamp.is_none() {
                continue;
            }
            let now = Instant::now();
            if self.last_sound.is_none_or(|last| now.duration_since(last) >= SOUND_THROTTLE) {
                play_sound = true;
                self.last_sound = Some(now);
            }
        }

        apply_filter(&mut blocks, filter);
        Rendered { blocks, play_sound }
    }
}

pub fn apply_filter(blocks: &mut [MessageBlock], filter: Option<&str>) {
    match filter {
        Some(term) => {
            let term = term.to_lowercase();
            for block in blocks {
                block.visible = block.text.to_lowercase().contains(&term);
            }
        }
        None => {
            for block in blocks {
                block.visible = true;
            }
        }
    }
}

/// "Now" stands in for a server timestamp that has not been assigned yet.
fn time_label(timestamp_millis: Option<i64>) -> String {
    timestamp_millis
        .and_then(|ms| OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000).ok())
        .and_then(|at| at.format(&TIME_FORMAT).ok())
        .unwrap_or_else(|| "Now".to_string())
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use super::*;

    fn doc(id: &str, fields: serde_json::Value) -> Document {
        Document { id: id.into(), fields }
    }

    fn external(id: &str, ts: i64) -> Document {
        doc(id, json!({"text": format!("m{ts}"), "sender": "Bo", "userId": Uuid::now_v7(), "timestamp": ts}))
    }

    #[tokio::test(start_paused = true)]
    async fn order_is_ascending_regardless_of_delivery_order() {
        let mut renderer = Renderer::default();
        let docs = vec![external("b", 20), external("c", 30), external("a", 10)];
        let rendered = renderer.render(&docs, None, None);
        let times: Vec<_> = rendered.blocks.iter().map(|b| b.timestamp.unwrap()).collect();
        assert_eq!(times, [10, 20, 30]);
    }

    #[tokio::test(start_paused = true)]
    async fn uncommitted_timestamp_renders_as_now() {
        let mut renderer = Renderer::default();
        let docs = vec![doc("p", json!({"text": "pending", "sender": "Bo"}))];
        let rendered = renderer.render(&docs, None, None);
        assert_eq!(rendered.blocks[0].time, "Now");
        // and a pending message never rings the bell
        assert!(!rendered.play_sound);
    }

    #[tokio::test(start_paused = true)]
    async fn body_is_escaped_plain_text() {
        let mut renderer = Renderer::default();
        let docs = vec![doc("x", json!({"text": "<script>alert('&')</script>", "sender": "Bo", "timestamp": 1}))];
        let rendered = renderer.render(&docs, None, None);
        assert_eq!(
            rendered.blocks[0].html,
            "&lt;script&gt;alert(&#39;&amp;&#39;)&lt;/script&gt;"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn delete_is_offered_only_to_the_author() {
        let viewer = Identity { id: Uuid::now_v7(), email: "a@x.com".into() };
        let mut renderer = Renderer::default();
        let docs = vec![
            doc("mine", json!({"text": "hi", "sender": "Ana", "userId": viewer.id, "timestamp": 1})),
            external("theirs", 2),
        ];
        let rendered = renderer.render(&docs, Some(&viewer), None);
        assert!(rendered.blocks[0].can_delete && rendered.blocks[0].mine);
        assert!(!rendered.blocks[1].can_delete && !rendered.blocks[1].mine);
    }

    #[tokio::test(start_paused = true)]
    async fn sound_is_throttled_to_one_per_second() {
        let mut renderer = Renderer::default();

        // two external messages in the same snapshot: one bell
        let first = renderer.render(&[external("a", 1), external("b", 2)], None, None);
        assert!(first.play_sound);

        // another message 500ms later stays inside the window
        tokio::time::advance(Duration::from_millis(500)).await;
        let second = renderer.render(&[external("a", 1), external("b", 2), external("c", 3)], None, None);
        assert!(!second.play_sound);

        // past the window the bell rings again
        tokio::time::advance(Duration::from_millis(600)).await;
        let third = renderer.render(&[external("d", 4)], None, None);
        assert!(third.play_sound);
    }

    #[tokio::test(start_paused = true)]
    async fn own_messages_are_silent() {
        let viewer = Identity { id: Uuid::now_v7(), email: "a@x.com".into() };
        let mut renderer = Renderer::default();
        let docs = vec![doc("mine", json!({"text": "hi", "sender": "Ana", "userId": viewer.id, "timestamp": 1}))];
        assert!(!renderer.render(&docs, Some(&viewer), None).play_sound);
    }

    #[tokio::test(start_paused = true)]
    async fn filter_hides_non_matching_blocks() {
        let mut renderer = Renderer::default();
        let docs = vec![
            doc("a", json!({"text": "Hello world", "sender": "Bo", "timestamp": 1})),
            doc("b", json!({"text": "goodbye", "sender": "Bo", "timestamp": 2})),
        ];
        let rendered = renderer.render(&docs, None, Some("HELLO"));
        assert!(rendered.blocks[0].visible);
        assert!(!rendered.blocks[1].visible);
    }
}
