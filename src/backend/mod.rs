pub mod memory;

use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

/// An authenticated account as issued by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
}

/// One stored document: a backend-issued id plus an opaque field map.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Value,
}

/// Rejections the backend can hand back. The first three carry the
/// well-known auth codes the UI maps to friendly text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("auth/user-not-found")]
    UserNotFound,
    #[error("auth/wrong-password")]
    WrongPassword,
    #[error("auth/email-already-in-use")]
    EmailInUse,
    #[error("permission denied")]
    PermissionDenied,
    #[error("not signed in")]
    Unauthenticated,
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

pub type Snapshot = Result<Vec<Document>, BackendError>;

/// Handle on one live query. The backend pushes a full result set on
/// every matching change; dropping the handle unsubscribes.
pub struct LiveQuery {
    rx: mpsc::UnboundedReceiver<Snapshot>,
}

impl LiveQuery {
    pub fn new(rx: mpsc::UnboundedReceiver<Snapshot>) -> Self {
        Self { rx }
    }

    pub async fn next(&mut self) -> Option<Snapshot> {
        self.rx.recv().await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobLocator(pub String);

/// Sentinel field value the store replaces with its own clock at commit.
pub const SERVER_TIMESTAMP: &str = "__server_timestamp__";

pub fn server_timestamp() -> Value {
    Value::String(SERVER_TIMESTAMP.to_string())
}

pub fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[allow(async_fn_in_trait)]
pub trait IdentityService {
    async fn create_credential(&self, email: &str, password: &str) -> Result<Identity, BackendError>;
    async fn verify_credential(&self, email: &str, password: &str) -> Result<Identity, BackendError>;
    async fn sign_out(&self);
    /// Fires on every session transition; the current value is the
    /// signed-in identity, if any.
    fn auth_state(&self) -> watch::Receiver<Option<Identity>>;
}

#[allow(async_fn_in_trait)]
pub trait DocumentStore {
    async fn upsert(&self, path: &str, fields: Value) -> Result<(), BackendError>;
    async fn delete(&self, path: &str) -> Result<(), BackendError>;
    async fn append(&self, collection: &str, fields: Value) -> Result<String, BackendError>;
    fn live_query(
        &self,
        collection: &str,
        order_field: &str,
        direction: Direction,
        limit: Option<usize>,
    ) -> LiveQuery;
}

#[allow(async_fn_in_trait)]
pub trait BlobStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<BlobLocator, BackendError>;
    fn download_url(&self, locator: &BlobLocator) -> String;
}

pub trait Backend: IdentityService + DocumentStore + BlobStore + Clone {}

impl<T: IdentityService + DocumentStore + BlobStore + Clone> Backend for T {}
