use crate::backend::{
    server_timestamp, Backend, BackendError, Direction, DocumentStore, Identity, IdentityService,
    LiveQuery, Snapshot,
};
use crate::{presence, rooms, ui, AppResult, ChatApp};

const MIN_PASSWORD_LEN: usize = 6;

/// The signed-in identity and its locally resolved display name.
#[derive(Default)]
pub struct Session {
    pub identity: Option<Identity>,
    pub display_name: String,
    pub avatar: String,
    pub(crate) pending_name: Option<String>,
}

#[derive(Debug)]
pub enum Event {
    Auth(Option<Identity>),
    Messages { epoch: u64, snapshot: Snapshot },
    Presence(Snapshot),
    TypingExpired,
}

/// Display name: explicit choice first, then the locally cached one,
/// then the email local-part.
pub fn resolve_display_name(explicit: Option<String>, cached: Option<String>, email: &str) -> String {
    explicit
        .filter(|name| !name.trim().is_empty())
        .or(cached)
        .unwrap_or_else(|| email.split('@').next().unwrap_or(email).to_string())
}

/// A small fixed set of rejection codes gets friendly text; everything
/// else shows the backend's own message.
pub fn friendly_auth_message(error: &BackendError) -> String {
    match error {
        BackendError::UserNotFound | BackendError::WrongPassword => {
            "Invalid credentials. Try signing up!".to_string()
        }
        BackendError::EmailInUse => "Email already in use. Try logging in!".to_string(),
        other => other.to_string(),
    }
}

impl<B: Backend> ChatApp<B> {
    pub async fn login(&mut self, email: &str, password: &str, username: &str) -> AppResult<()> {
        let (email, password, username) = (email.trim(), password.trim(), username.trim());
        if email.is_empty() || password.is_empty() || username.is_empty() {
            self.ui.auth_error("Please fill all fields");
            return Ok(());
        }

        self.ui.auth_info("Logging in...");
        match self.backend.verify_credential(email, password).await {
            Ok(_) => {
                self.session.pending_name = Some(username.to_string());
                self.store.set(ui::KEY_USERNAME, username);
            }
            Err(error) => self.ui.auth_error(friendly_auth_message(&error)),
        }
        Ok(())
    }

    pub async fn signup(&mut self, email: &str, password: &str, username: &str) -> AppResult<()> {
        let (email, password, username) = (email.trim(), password.trim(), username.trim());
        if email.is_empty() || password.is_empty() || username.is_empty() {
            self.ui.auth_error("Please fill all fields");
            return Ok(());
        }
        if password.len() < MIN_PASSWORD_LEN {
            self.ui.auth_error("Password must be at least 6 characters");
            return Ok(());
        }

        self.ui.auth_info("Creating account...");
        match self.backend.create_credential(email, password).await {
            Ok(identity) => {
                self.session.pending_name = Some(username.to_string());
                self.store.set(ui::KEY_USERNAME, username);
                let profile = serde_json::json!({
                    "username": username,
                    "email": email,
                    "createdAt": server_timestamp(),
                });
                if let Err(error) = self.backend.upsert(&format!("users/{}", identity.id), profile).await {
                    self.ui.auth_error(friendly_auth_message(&error));
                } else {
                    self.ui.auth_success("Account created successfully!");
                }
            }
            Err(error) => self.ui.auth_error(friendly_auth_message(&error)),
        }
        Ok(())
    }

    pub async fn logout(&mut self) -> AppResult<()> {
        if let Some(identity) = self.session.identity.clone() {
            if let Err(error) = presence::go_offline(&self.backend, &identity).await {
                tracing::warn!(%error, "presence delete failed on logout");
            }
        }
        self.backend.sign_out().await;
        self.ui.auth_status = None;
        Ok(())
    }

    /// Best-effort unload path: clears the presence record before the
    /// process goes away. Not guaranteed to run on a crash, which is a
    /// known gap of existence-based presence.
    pub async fn shutdown(&mut self) {
        if let Some(identity) = self.session.identity.clone() {
            let _ = presence::go_offline(&self.backend, &identity).await;
        }
    }

    /// One authoritative transition drives all downstream state.
    async fn on_auth_change(&mut self, identity: Option<Identity>) -> AppResult<()> {
        match identity {
            Some(identity) => {
                let name = resolve_display_name(
                    self.session.pending_name.take(),
                    self.store.get(ui::KEY_USERNAME),
                    &identity.email,
                );
                let avatar = ui::avatar_url(&name);
                self.session.identity = Some(identity.clone());
                self.session.display_name = name.clone();
                self.session.avatar = avatar.clone();
                self.ui.show_chat(&name, &avatar);

                if let Err(error) = presence::go_online(&self.backend, &identity, &name, &avatar).await {
                    tracing::warn!(%error, "presence upsert failed");
                    self.ui.toast("Failed to update presence");
                }
                self.presence_live =
                    Some(self.backend.live_query("online", "lastSeen", Direction::Ascending, None));
                self.switch_room(rooms::DEFAULT_ROOM)?;
                tracing::info!(user = %name, "signed in");
            }
            None => {
                self.session.identity = None;
                self.session.display_name.clear();
                self.session.avatar.clear();
                self.rooms.stop();
                self.presence_live = None;
                self.composer.clear();
                self.ui.show_auth();
                tracing::info!("signed out");
            }
        }
        Ok(())
    }

    /// Multiplexes the auth-state channel, both live subscriptions, and
    /// the typing deadline. Everything downstream runs in `apply`, one
    /// event at a time.
    pub async fn next_event(&mut self) -> Event {
        let epoch = self.rooms.epoch();
        let ChatApp { auth_rx, rooms, presence_live, composer, .. } = self;
        tokio::select! {
            changed = auth_rx.changed() => {
                let _ = changed;
                Event::Auth(auth_rx.borrow_and_update().clone())
            }
            Some(snapshot) = next_snapshot(rooms.live.as_mut()) => {
                Event::Messages { epoch, snapshot }
            }
            Some(snapshot) = next_snapshot(presence_live.as_mut()) => Event::Presence(snapshot),
            () = composer.typing_expired() => Event::TypingExpired,
        }
    }

    pub async fn apply(&mut self, event: Event) -> AppResult<()> {
        match event {
            Event::Auth(identity) => self.on_auth_change(identity).await?,
            Event::Messages { epoch, snapshot } => self.on_messages(epoch, snapshot),
            Event::Presence(snapshot) => self.on_presence(snapshot),
            Event::TypingExpired => self.composer.expire_typing(),
        }
        Ok(())
    }
}

async fn next_snapshot(live: Option<&mut LiveQuery>) -> Option<Snapshot> {
    match live {
        Some(live) => live.next().await,
        None => std::future::pending().await,
    }
}
