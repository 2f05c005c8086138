pub mod appresult;
pub mod backend;
pub mod config;
pub mod presence;
pub mod rooms;
pub mod session;
pub mod store;
pub mod ui;

use anyhow::anyhow;
use serde_json::Value;
use tokio::sync::watch;

pub use appresult::{AppError, AppResult};
pub use session::Event;

use backend::{Backend, Identity, LiveQuery};
use config::Config;
use rooms::msg::Composer;
use rooms::render::Renderer;
use rooms::subscription::RoomSubscription;
use session::Session;
use store::LocalStore;
use ui::UiState;

/// Everything the client owns, in one place: the backend handle, the
/// signed-in session, the two subscription handles, and the view state.
/// Each handle has exactly one owner and one cancellation point.
pub struct ChatApp<B: Backend> {
    pub backend: B,
    pub config: Config,
    pub store: LocalStore,
    pub ui: UiState,
    pub session: Session,
    pub rooms: RoomSubscription,
    pub composer: Composer,
    pub renderer: Renderer,
    pub(crate) presence_live: Option<LiveQuery>,
    pub(crate) auth_rx: watch::Receiver<Option<Identity>>,
}

impl<B: Backend> ChatApp<B> {
    pub fn new(backend: B, config: Config) -> Self {
        let store = LocalStore::open(&config.local_store_path);
        let ui = UiState::new(&store);
        let auth_rx = backend.auth_state();
        Self {
            backend,
            config,
            store,
            ui,
            session: Session::default(),
            rooms: RoomSubscription::new(),
            composer: Composer::default(),
            renderer: Renderer::default(),
            presence_live: None,
            auth_rx,
        }
    }
}

pub trait GetField {
    fn get_str_field(&self, field: &str) -> AppResult<String>;
}

impl GetField for Value {
    fn get_str_field(&self, field: &str) -> AppResult<String> {
        Ok(self
            .get(field)
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("expected string field {field} in document"))?
            .to_owned())
    }
}
