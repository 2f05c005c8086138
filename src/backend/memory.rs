use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use super::{
    now_millis, BackendError, BlobLocator, BlobStore, Direction, Document, DocumentStore, Identity,
    IdentityService, LiveQuery, Snapshot, SERVER_TIMESTAMP,
};

/// In-process stand-in for the hosted backend. Documents live in a
/// single path-keyed map; every mutation re-evaluates the registered
/// live queries and pushes a fresh snapshot to each subscriber, the
/// same ordered-and-limited result set the hosted store would fan out.
#[derive(Clone)]
pub struct MemoryBackend {
    shared: Arc<Shared>,
}

struct Shared {
    bucket: String,
    auth_tx: watch::Sender<Option<Identity>>,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    accounts: HashMap<String, Account>,
    docs: BTreeMap<String, Value>,
    blobs: HashMap<String, Vec<u8>>,
    subs: Vec<QuerySub>,
    signed_in: Option<Identity>,
}

struct Account {
    password: String,
    identity: Identity,
}

struct QuerySub {
    spec: QuerySpec,
    tx: mpsc::UnboundedSender<Snapshot>,
}

#[derive(Clone)]
struct QuerySpec {
    collection: String,
    order_field: String,
    direction: Direction,
    limit: Option<usize>,
}

impl QuerySpec {
    fn prefix(&self) -> String {
        format!("{}/", self.collection)
    }
}

impl MemoryBackend {
    pub fn new(bucket: &str) -> Self {
        Self {
            shared: Arc::new(Shared {
                bucket: bucket.to_string(),
                auth_tx: watch::channel(None).0,
                state: Mutex::new(State::default()),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.shared.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of live queries that still have a listening subscriber.
    pub fn live_query_count(&self) -> usize {
        let mut state = self.lock();
        state.subs.retain(|sub| !sub.tx.is_closed());
        state.subs.len()
    }

    pub fn document(&self, path: &str) -> Option<Value> {
        self.lock().docs.get(path).cloned()
    }

    pub fn collection_len(&self, collection: &str) -> usize {
        let state = self.lock();
        let prefix = format!("{collection}/");
        state
            .docs
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .filter(|(path, _)| !path[prefix.len()..].contains('/'))
            .count()
    }
}

fn eval(docs: &BTreeMap<String, Value>, spec: &QuerySpec) -> Vec<Document> {
    let prefix = spec.prefix();
    let mut out: Vec<Document> = docs
        .range(prefix.clone()..)
        .take_while(|(path, _)| path.starts_with(&prefix))
        .filter(|(path, _)| !path[prefix.len()..].contains('/'))
        .map(|(path, fields)| Document {
            id: path[prefix.len()..].to_string(),
            fields: fields.clone(),
        })
        .collect();
    out.sort_by_key(|doc| doc.fields.get(&spec.order_field).and_then(Value::as_i64).unwrap_or(0));
    if spec.direction == Direction::Descending {
        out.reverse();
    }
    if let Some(limit) = spec.limit {
        out.truncate(limit);
    }
    out
}

fn publish(state: &mut State, path: &str) {
    state.subs.retain(|sub| !sub.tx.is_closed());
    for sub in &state.subs {
        if path.starts_with(&sub.spec.prefix()) {
            let _ = sub.tx.send(Ok(eval(&state.docs, &sub.spec)));
        }
    }
}

fn resolve_server_timestamps(fields: &mut Value) {
    if let Some(map) = fields.as_object_mut() {
        let now = now_millis();
        for value in map.values_mut() {
            if value.as_str() == Some(SERVER_TIMESTAMP) {
                *value = Value::from(now);
            }
        }
    }
}

/// Writes require a session; presence and profile paths are writable
/// only by the identity they are keyed by.
fn write_guard(state: &State, path: &str) -> Result<Identity, BackendError> {
    let identity = state.signed_in.clone().ok_or(BackendError::Unauthenticated)?;
    let own = identity.id.to_string();
    for scope in ["online/", "users/"] {
        if let Some(rest) = path.strip_prefix(scope) {
            if rest != own {
                return Err(BackendError::PermissionDenied);
            }
        }
    }
    Ok(identity)
}

fn is_message_path(path: &str) -> bool {
    path.starts_with("rooms/") && path.contains("/messages/")
}

impl IdentityService for MemoryBackend {
    async fn create_credential(&self, email: &str, password: &str) -> Result<Identity, BackendError> {
        let identity = {
            let mut state = self.lock();
            if state.accounts.contains_key(email) {
                return Err(BackendError::EmailInUse);
            }
            let identity = Identity { id: Uuid::now_v7(), email: email.to_string() };
            state.accounts.insert(
                email.to_string(),
                Account { password: password.to_string(), identity: identity.clone() },
            );
            state.signed_in = Some(identity.clone());
            identity
        };
        tracing::info!(email, "credential created");
        self.shared.auth_tx.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    async fn verify_credential(&self, email: &str, password: &str) -> Result<Identity, BackendError> {
        let identity = {
            let mut state = self.lock();
            let account = state.accounts.get(email).ok_or(BackendError::UserNotFound)?;
            if account.password != password {
                return Err(BackendError::WrongPassword);
            }
            let identity = account.identity.clone();
            state.signed_in = Some(identity.clone());
            identity
        };
        tracing::info!(email, "credential verified");
        self.shared.auth_tx.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) {
        self.lock().signed_in = None;
        self.shared.auth_tx.send_replace(None);
    }

    fn auth_state(&self) -> watch::Receiver<Option<Identity>> {
        self.shared.auth_tx.subscribe()
    }
}

impl DocumentStore for MemoryBackend {
    async fn upsert(&self, path: &str, mut fields: Value) -> Result<(), BackendError> {
        let mut state = self.lock();
        write_guard(&state, path)?;
        resolve_server_timestamps(&mut fields);
        state.docs.insert(path.to_string(), fields);
        publish(&mut state, path);
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), BackendError> {
        let mut state = self.lock();
        let identity = write_guard(&state, path)?;
        let Some(existing) = state.docs.get(path) else {
            // deleting an absent document is not an error
            return Ok(());
        };
        if is_message_path(path) {
            let author = existing.get("userId").and_then(Value::as_str);
            if author != Some(identity.id.to_string().as_str()) {
                return Err(BackendError::PermissionDenied);
            }
        }
        state.docs.remove(path);
        publish(&mut state, path);
        Ok(())
    }

    async fn append(&self, collection: &str, mut fields: Value) -> Result<String, BackendError> {
        let id = Uuid::now_v7().to_string();
        let path = format!("{collection}/{id}");
        let mut state = self.lock();
        write_guard(&state, &path)?;
        resolve_server_timestamps(&mut fields);
        state.docs.insert(path.clone(), fields);
        publish(&mut state, &path);
        Ok(id)
    }

    fn live_query(
        &self,
        collection: &str,
        order_field: &str,
        direction: Direction,
        limit: Option<usize>,
    ) -> LiveQuery {
        let (tx, rx) = mpsc::unbounded_channel();
        let spec = QuerySpec {
            collection: collection.to_string(),
            order_field: order_field.to_string(),
            direction,
            limit,
        };
        let mut state = self.lock();
        let _ = tx.send(Ok(eval(&state.docs, &spec)));
        state.subs.push(QuerySub { spec, tx });
        LiveQuery::new(rx)
    }
}

impl BlobStore for MemoryBackend {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<BlobLocator, BackendError> {
        let mut state = self.lock();
        if state.signed_in.is_none() {
            return Err(BackendError::Unauthenticated);
        }
        state.blobs.insert(path.to_string(), bytes.to_vec());
        Ok(BlobLocator(path.to_string()))
    }

    fn download_url(&self, locator: &BlobLocator) -> String {
        format!("https://{}/{}", self.shared.bucket, locator.0)
    }
}
