use serde_json::json;
use tokio::time::{Duration, Instant};

use crate::backend::{now_millis, server_timestamp, Backend, BlobStore, DocumentStore};
use crate::{AppResult, ChatApp};

const TYPING_QUIET_PERIOD: Duration = Duration::from_secs(2);
const MAX_ATTACHMENT_BYTES: usize = 5 * 1024 * 1024;

pub const EMOJIS: [&str; 12] = ["😀", "😂", "😍", "🤔", "👍", "👏", "🎉", "🔥", "❤️", "😎", "🥳", "😢"];

/// Captures input and the typing-indicator timeout. Every keystroke
/// shows the indicator and re-arms a 2s quiet-period deadline, so the
/// indicator stays up through a sustained burst.
#[derive(Default)]
pub struct Composer {
    pub input: String,
    pub typing: bool,
    typing_deadline: Option<Instant>,
}

impl Composer {
    pub fn on_input(&mut self, input: &str) {
        self.input = input.to_string();
        self.typing = true;
        self.typing_deadline = Some(Instant::now() + TYPING_QUIET_PERIOD);
    }

    pub fn insert_emoji(&mut self, emoji: &str) {
        self.input.push_str(emoji);
    }

    pub fn char_count(&self) -> usize {
        self.input.chars().count()
    }

    pub fn clear(&mut self) {
        self.input.clear();
        self.expire_typing();
    }

    pub(crate) fn expire_typing(&mut self) {
        self.typing = false;
        self.typing_deadline = None;
    }

    /// Resolves when the quiet period elapses; pends forever while no
    /// deadline is armed.
    pub async fn typing_expired(&self) {
        match self.typing_deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }
}

impl<B: Backend> ChatApp<B> {
    /// Writes the composed message. No optimistic local append: the
    /// subscription echo is the only rendering path.
    pub async fn submit(&mut self) -> AppResult<()> {
        let text = self.composer.input.trim().to_string();
        if text.is_empty() {
            self.ui.toast("Nothing to send yet!");
            return Ok(());
        }
        let Some(identity) = self.session.identity.clone() else {
            self.ui.toast("Please login first!");
            return Ok(());
        };
        let Some(room) = self.rooms.active() else {
            self.ui.toast("Pick a room first!");
            return Ok(());
        };

        let fields = json!({
            "text": text,
            "sender": self.session.display_name,
            "userId": identity.id,
            "avatar": self.session.avatar,
            "timestamp": server_timestamp(),
        });
        match self.backend.append(&room.collection(), fields).await {
            Ok(_) => self.composer.clear(),
            Err(error) => {
                tracing::warn!(%error, room = room.name, "message write failed");
                self.ui.toast("Failed to send message");
            }
        }
        Ok(())
    }

    pub async fn delete_message(&mut self, id: &str) -> AppResult<()> {
        let Some(room) = self.rooms.active() else {
            return Ok(());
        };
        match self.backend.delete(&format!("{}/{id}", room.collection())).await {
            Ok(()) => self.ui.toast("Message deleted"),
            Err(error) => {
                tracing::warn!(%error, id, "message delete failed");
                self.ui.toast("Failed to delete message");
            }
        }
        Ok(())
    }

    /// Uploads a blob and posts a message pointing at it. Wired into
    /// the library surface only; the terminal UI does not drive it.
    pub async fn send_attachment(&mut self, filename: &str, bytes: &[u8]) -> AppResult<()> {
        if bytes.len() > MAX_ATTACHMENT_BYTES {
            self.ui.toast("File size must be less than 5MB");
            return Ok(());
        }
        let Some(identity) = self.session.identity.clone() else {
            self.ui.toast("Please login first!");
            return Ok(());
        };
        let Some(room) = self.rooms.active() else {
            self.ui.toast("Pick a room first!");
            return Ok(());
        };

        let path = format!("chat-uploads/{}/{}_{filename}", identity.id, now_millis());
        let locator = match self.backend.put(&path, bytes).await {
            Ok(locator) => locator,
            Err(error) => {
                tracing::warn!(%error, path, "blob upload failed");
                self.ui.toast("Failed to upload file");
                return Ok(());
            }
        };
        let url = self.backend.download_url(&locator);
        let fields = json!({
            "text": format!("Shared a file: {filename}"),
            "imageUrl": url,
            "sender": self.session.display_name,
            "userId": identity.id,
            "avatar": self.session.avatar,
            "timestamp": server_timestamp(),
        });
        match self.backend.append(&room.collection(), fields).await {
            Ok(_) => self.ui.toast("File uploaded successfully!"),
            Err(error) => {
                tracing::warn!(%error, "attachment message write failed");
                self.ui.toast("Failed to upload file");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::timeout;

    use super::*;
    use crate::testutil::{drain, signed_in_app, test_app};
    use crate::ui::MessagePane;

    #[tokio::test(start_paused = true)]
    async fn empty_or_whitespace_input_never_writes() {
        let mut app = signed_in_app().await;
        for input in ["", "   ", "\t\n"] {
            app.composer.on_input(input);
            app.submit().await.unwrap();
            assert_eq!(app.backend.collection_len("rooms/general/messages"), 0);
        }
        assert!(app.ui.take_toasts().iter().all(|t| t == "Nothing to send yet!"));
    }

    #[tokio::test(start_paused = true)]
    async fn signed_out_submit_is_rejected_with_a_toast() {
        let mut app = test_app();
        app.composer.on_input("hello");
        app.submit().await.unwrap();
        assert_eq!(app.backend.collection_len("rooms/general/messages"), 0);
        assert_eq!(app.ui.take_toasts(), ["Please login first!"]);
    }

    #[tokio::test(start_paused = true)]
    async fn submit_round_trips_through_the_subscription() {
        let mut app = signed_in_app().await;
        app.composer.on_input("  hello general  ");
        app.submit().await.unwrap();

        // input clears and the indicator resets immediately
        assert_eq!(app.composer.input, "");
        assert!(!app.composer.typing);

        drain(&mut app).await;
        match &app.ui.pane {
            MessagePane::Messages(blocks) => {
                assert_eq!(blocks.len(), 1);
                assert_eq!(blocks[0].text, "hello general");
                assert!(blocks[0].mine);
                assert_ne!(blocks[0].time, "Now");
            }
            other => panic!("expected rendered message, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn deleting_an_own_message_empties_the_room() {
        let mut app = signed_in_app().await;
        app.composer.on_input("oops");
        app.submit().await.unwrap();
        drain(&mut app).await;

        let id = match &app.ui.pane {
            MessagePane::Messages(blocks) => blocks[0].id.clone(),
            other => panic!("expected rendered message, got {other:?}"),
        };
        app.delete_message(&id).await.unwrap();
        drain(&mut app).await;
        assert!(matches!(app.ui.pane, MessagePane::Empty));
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_attachments_are_rejected_before_upload() {
        let mut app = signed_in_app().await;
        let big = vec![0u8; MAX_ATTACHMENT_BYTES + 1];
        app.send_attachment("huge.bin", &big).await.unwrap();
        assert_eq!(app.ui.take_toasts(), ["File size must be less than 5MB"]);
        assert_eq!(app.backend.collection_len("rooms/general/messages"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn attachment_posts_a_message_with_the_blob_url() {
        let mut app = signed_in_app().await;
        app.send_attachment("cat.png", b"png-bytes").await.unwrap();
        drain(&mut app).await;
        match &app.ui.pane {
            MessagePane::Messages(blocks) => {
                assert_eq!(blocks[0].text, "Shared a file: cat.png");
                let url = blocks[0].attachment.as_deref().unwrap();
                assert!(url.starts_with("https://blobs.test/chat-uploads/"));
            }
            other => panic!("expected rendered message, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn typing_indicator_debounces_across_keystrokes() {
        let mut composer = Composer::default();
        composer.on_input("h");
        assert!(composer.typing);

        // a keystroke at 1s pushes the deadline to 3s
        tokio::time::advance(Duration::from_secs(1)).await;
        composer.on_input("he");

        let early = timeout(Duration::from_millis(1999), composer.typing_expired()).await;
        assert!(early.is_err(), "indicator must stay armed through the burst");

        composer.typing_expired().await;
        composer.expire_typing();
        assert!(!composer.typing);
    }

    #[tokio::test(start_paused = true)]
    async fn emoji_insert_and_char_count() {
        let mut composer = Composer::default();
        composer.on_input("hi ");
        composer.insert_emoji(EMOJIS[0]);
        assert_eq!(composer.input, "hi 😀");
        assert_eq!(composer.char_count(), 4);
    }
}
