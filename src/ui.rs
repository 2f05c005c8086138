use crate::presence::Roster;
use crate::rooms::render::{apply_filter, MessageBlock};
use crate::rooms::Room;
use crate::store::LocalStore;

pub const KEY_USERNAME: &str = "chatUsername";
pub const KEY_THEME: &str = "chatTheme";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Auth,
    Chat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Theme {
    Light,
    Dark,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessagePane {
    Loading,
    Empty,
    Failed,
    Messages(Vec<MessageBlock>),
}

/// Pure view state. Rebuilt pieces are replaced wholesale; nothing here
/// talks to the backend.
pub struct UiState {
    pub screen: Screen,
    pub theme: Theme,
    pub pane: MessagePane,
    pub roster: Roster,
    pub auth_status: Option<(StatusKind, String)>,
    pub search: Option<String>,
    pub notifications_enabled: bool,
    pub room_title: String,
    pub room_icon: String,
    pub room_description: String,
    pub username: String,
    pub avatar: String,
    pub dirty: bool,
    toasts: Vec<String>,
    bell: bool,
}

impl UiState {
    pub fn new(store: &LocalStore) -> Self {
        let theme = match store.get(KEY_THEME).as_deref() {
            Some("light") => Theme::Light,
            _ => Theme::Dark,
        };
        Self {
            screen: Screen::Auth,
            theme,
            pane: MessagePane::Empty,
            roster: Roster::default(),
            auth_status: None,
            search: None,
            notifications_enabled: true,
            room_title: String::new(),
            room_icon: String::new(),
            room_description: String::new(),
            username: String::new(),
            avatar: String::new(),
            dirty: false,
            toasts: Vec::new(),
            bell: false,
        }
    }

    pub fn toggle_theme(&mut self, store: &mut LocalStore) -> Theme {
        self.theme = match self.theme {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        };
        store.set(KEY_THEME, if self.theme == Theme::Light { "light" } else { "dark" });
        self.theme
    }

    pub fn toast(&mut self, message: impl Into<String>) {
        self.toasts.push(message.into());
    }

    pub fn take_toasts(&mut self) -> Vec<String> {
        std::mem::take(&mut self.toasts)
    }

    pub fn ring_bell(&mut self) {
        self.bell = true;
    }

    pub fn take_bell(&mut self) -> bool {
        std::mem::take(&mut self.bell)
    }

    pub fn auth_info(&mut self, message: impl Into<String>) {
        self.auth_status = Some((StatusKind::Info, message.into()));
    }

    pub fn auth_success(&mut self, message: impl Into<String>) {
        self.auth_status = Some((StatusKind::Success, message.into()));
    }

    pub fn auth_error(&mut self, message: impl Into<String>) {
        self.auth_status = Some((StatusKind::Error, message.into()));
    }

    pub fn show_chat(&mut self, username: &str, avatar: &str) {
        self.screen = Screen::Chat;
        self.username = username.to_string();
        self.avatar = avatar.to_string();
        self.dirty = true;
    }

    /// Back to the auth screen with every rendered piece cleared.
    pub fn show_auth(&mut self) {
        self.screen = Screen::Auth;
        self.pane = MessagePane::Empty;
        self.roster = Roster::default();
        self.search = None;
        self.room_title.clear();
        self.room_icon.clear();
        self.room_description.clear();
        self.username.clear();
        self.avatar.clear();
        self.dirty = true;
    }

    pub fn show_room(&mut self, room: &Room) {
        self.room_title = capitalize(room.name);
        self.room_icon = room.icon.to_string();
        self.room_description = room.description.to_string();
        self.pane = MessagePane::Loading;
        self.dirty = true;
    }

    pub fn set_messages(&mut self, blocks: Vec<MessageBlock>) {
        self.pane = if blocks.is_empty() { MessagePane::Empty } else { MessagePane::Messages(blocks) };
        self.dirty = true;
    }

    pub fn set_messages_failed(&mut self) {
        self.pane = MessagePane::Failed;
        self.dirty = true;
    }

    pub fn set_search(&mut self, term: Option<&str>) {
        self.search = term.map(|t| t.to_string()).filter(|t| !t.is_empty());
        if let MessagePane::Messages(blocks) = &mut self.pane {
            apply_filter(blocks, self.search.as_deref());
        }
        self.dirty = true;
    }

    pub fn toggle_notifications(&mut self) {
        self.notifications_enabled = !self.notifications_enabled;
        let message =
            if self.notifications_enabled { "Notifications enabled" } else { "Notifications disabled" };
        self.toast(message);
    }
}

pub fn avatar_url(name: &str) -> String {
    format!(
        "https://ui-avatars.com/api/?name={}&background=random&bold=true&size=128",
        urlencoding::encode(name)
    )
}

pub(crate) fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
