use serde_json::json;

use crate::backend::{server_timestamp, Backend, BackendError, Document, DocumentStore, Identity, Snapshot};
use crate::{ChatApp, GetField};

/// Record existence is the online signal: one document per identity,
/// created at sign-in, deleted at sign-out. There is no heartbeat, so
/// an unclean disconnect can leave a stale record behind.
pub async fn go_online<S: DocumentStore>(
    store: &S,
    identity: &Identity,
    username: &str,
    avatar: &str,
) -> Result<(), BackendError> {
    store
        .upsert(
            &format!("online/{}", identity.id),
            json!({
                "username": username,
                "avatar": avatar,
                "lastSeen": server_timestamp(),
            }),
        )
        .await
}

pub async fn go_offline<S: DocumentStore>(store: &S, identity: &Identity) -> Result<(), BackendError> {
    store.delete(&format!("online/{}", identity.id)).await
}

#[derive(Debug, Clone, PartialEq)]
pub struct RosterEntry {
    pub name: String,
    pub avatar: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Roster {
    pub entries: Vec<RosterEntry>,
    pub online_count: usize,
}

/// Rebuilt wholesale on every snapshot; the viewer's own record is
/// excluded but counted.
pub fn build_roster(docs: &[Document], viewer: Option<&Identity>) -> Roster {
    let viewer_id = viewer.map(|identity| identity.id.to_string());
    let entries: Vec<RosterEntry> = docs
        .iter()
        .filter(|doc| Some(&doc.id) != viewer_id.as_ref())
        .map(|doc| {
            let name = doc.fields.get_str_field("username").unwrap_or_else(|_| "Anonymous".into());
            let avatar = doc
                .fields
                .get_str_field("avatar")
                .unwrap_or_else(|_| crate::ui::avatar_url(&name));
            RosterEntry { name, avatar }
        })
        .collect();
    let online_count = entries.len() + 1;
    Roster { entries, online_count }
}

impl<B: Backend> ChatApp<B> {
    pub(crate) fn on_presence(&mut self, snapshot: Snapshot) {
        match snapshot {
            Ok(docs) => {
                self.ui.roster = build_roster(&docs, self.session.identity.as_ref());
                self.ui.dirty = true;
            }
            Err(error) => tracing::warn!(%error, "presence subscription failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;
    use uuid::Uuid;

    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::backend::IdentityService;

    #[tokio::test]
    async fn going_online_and_offline_tracks_the_record() {
        let backend = MemoryBackend::new("blobs.test");
        let identity = backend.create_credential("a@x.com", "abcdef").await.unwrap();
        let path = format!("online/{}", identity.id);

        go_online(&backend, &identity, "Ana", "https://a/x").await.unwrap();
        let record = backend.document(&path).unwrap();
        assert_eq!(record["username"], "Ana");
        assert!(record["lastSeen"].as_i64().unwrap() > 0);

        go_offline(&backend, &identity).await.unwrap();
        assert!(backend.document(&path).is_none());
    }

    #[test]
    fn roster_excludes_the_viewer_and_counts_them() {
        let viewer = Identity { id: Uuid::now_v7(), email: "a@x.com".into() };
        let doc = |id: String, name: &str| Document {
            id,
            fields: serde_json::json!({"username": name, "avatar": "https://a/x"}),
        };
        let docs = vec![
            doc(viewer.id.to_string(), "Ana"),
            doc(Uuid::now_v7().to_string(), "Bo"),
            doc(Uuid::now_v7().to_string(), "Cy"),
        ];
        let roster = build_roster(&docs, Some(&viewer));
        let names: Vec<_> = roster.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["Bo", "Cy"]);
        assert_eq!(roster.online_count, 3);
    }

    #[test]
    fn missing_fields_fall_back() {
        let docs = vec![Document { id: "x".into(), fields: Value::Null }];
        let roster = build_roster(&docs, None);
        assert_eq!(roster.entries[0].name, "Anonymous");
        assert!(roster.entries[0].avatar.contains("Anonymous"));
        assert_eq!(roster.online_count, 2);
    }
}
