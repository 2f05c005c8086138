use crate::backend::{Backend, Direction, DocumentStore, LiveQuery, Snapshot};
use crate::rooms::{self, Room};
use crate::ChatApp;

const MESSAGE_LIMIT: usize = 50;

/// At most one message subscription exists at a time. Switching rooms
/// drops the previous handle before the replacement opens and bumps the
/// epoch, so a snapshot delivered for a superseded subscription can be
/// recognized and discarded.
pub struct RoomSubscription {
    active: Option<&'static Room>,
    epoch: u64,
    pub(crate) live: Option<LiveQuery>,
}

impl RoomSubscription {
    pub fn new() -> Self {
        Self { active: None, epoch: 0, live: None }
    }

    pub fn active(&self) -> Option<&'static Room> {
        self.active
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Opens a live query for `room`, replacing the previous one.
    /// Returns false without touching anything if `room` is already
    /// the active room.
    pub fn switch_to<S: DocumentStore>(&mut self, store: &S, room: &'static Room) -> bool {
        if self.active == Some(room) {
            return false;
        }
        self.live = None;
        self.epoch += 1;
        self.live = Some(store.live_query(
            &room.collection(),
            "timestamp",
            Direction::Descending,
            Some(MESSAGE_LIMIT),
        ));
        self.active = Some(room);
        true
    }

    pub fn stop(&mut self) {
        self.live = None;
        self.active = None;
        self.epoch += 1;
    }
}

impl Default for RoomSubscription {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> ChatApp<B> {
    pub fn switch_room(&mut self, name: &str) -> crate::AppResult<()> {
        if self.session.identity.is_none() {
            self.ui.toast("Please login first!");
            return Ok(());
        }
        let Some(room) = rooms::find(name) else {
            self.ui.toast(format!("No such room: {name}"));
            return Ok(());
        };
        if self.rooms.switch_to(&self.backend, room) {
            self.ui.show_room(room);
            tracing::debug!(room = room.name, "room subscription opened");
        }
        Ok(())
    }

    /// Snapshot handler for the message subscription. Snapshots carry
    /// the epoch of the subscription that produced them; anything from
    /// a superseded subscription is dropped unrendered.
    pub(crate) fn on_messages(&mut self, epoch: u64, snapshot: Snapshot) {
        if epoch != self.rooms.epoch() {
            tracing::debug!(epoch, current = self.rooms.epoch(), "discarding superseded snapshot");
            return;
        }
        match snapshot {
            Ok(docs) => {
                let rendered = self.renderer.render(
                    &docs,
                    self.session.identity.as_ref(),
                    self.ui.search.as_deref(),
                );
                if rendered.play_sound && self.ui.notifications_enabled {
                    self.ui.ring_bell();
                }
                self.ui.set_messages(rendered.blocks);
            }
            Err(error) => {
                tracing::warn!(%error, "message subscription failed");
                self.ui.set_messages_failed();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::backend::DocumentStore;
    use crate::testutil::{drain, signed_in_app};
    use crate::ui::MessagePane;

    #[tokio::test(start_paused = true)]
    async fn switching_to_the_active_room_is_a_noop() {
        let mut app = signed_in_app().await;
        let epoch = app.rooms.epoch();
        // one message subscription, one presence subscription
        assert_eq!(app.backend.live_query_count(), 2);

        app.switch_room("general").unwrap();
        assert_eq!(app.rooms.epoch(), epoch);
        assert_eq!(app.backend.live_query_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn at_most_one_message_subscription_across_switches() {
        let mut app = signed_in_app().await;
        for name in ["tech", "random", "gaming", "music", "general"] {
            app.switch_room(name).unwrap();
            drain(&mut app).await;
            assert_eq!(app.backend.live_query_count(), 2);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stale_snapshot_does_not_render_into_the_new_room() {
        let mut app = signed_in_app().await;
        drain(&mut app).await;
        let general_epoch = app.rooms.epoch();

        app.switch_room("tech").unwrap();
        let late = Ok(vec![crate::backend::Document {
            id: "m1".into(),
            fields: json!({"text": "left behind in general", "sender": "Bo", "timestamp": 1}),
        }]);
        app.on_messages(general_epoch, late);
        assert!(matches!(app.ui.pane, MessagePane::Loading));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_snapshot_renders_the_placeholder() {
        let mut app = signed_in_app().await;
        drain(&mut app).await;
        assert!(matches!(app.ui.pane, MessagePane::Empty));
    }

    #[tokio::test(start_paused = true)]
    async fn subscription_error_renders_the_error_placeholder() {
        let mut app = signed_in_app().await;
        drain(&mut app).await;
        app.on_messages(app.rooms.epoch(), Err(crate::backend::BackendError::Other("query failed".into())));
        assert!(matches!(app.ui.pane, MessagePane::Failed));
    }

    #[tokio::test(start_paused = true)]
    async fn messages_from_the_new_room_render_after_a_switch() {
        let mut app = signed_in_app().await;
        drain(&mut app).await;
        app.backend
            .append("rooms/tech/messages", json!({"text": "hello tech", "sender": "Bo", "timestamp": 5}))
            .await
            .unwrap();
        app.switch_room("tech").unwrap();
        drain(&mut app).await;
        match &app.ui.pane {
            MessagePane::Messages(blocks) => {
                assert_eq!(blocks.len(), 1);
                assert_eq!(blocks[0].text, "hello tech");
            }
            other => panic!("expected messages, got {other:?}"),
        }
    }
}
