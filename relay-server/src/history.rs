//! Session history manager.
//!
//! Owns the mapping from session id to ordered message list. One chat turn is
//! load → append user → complete → append assistant → persist. The store is
//! the only state that survives between turns.
//!
//! If the completion fails nothing is written, so a stored history always
//! holds complete user/assistant pairs.
//!
//! There is no locking: two turns racing on one session are last-writer-wins,
//! and a purge between load and persist is undone by the persist.

use crate::error::RelayError;
use crate::message::Message;
use crate::store::{SessionStore, StoreError};
use crate::upstream::CompletionClient;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Result of a successful chat turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub response: String,
    pub session_id: String,
}

/// Load-append-persist over a [`SessionStore`] and a [`CompletionClient`].
#[derive(Clone)]
pub struct SessionHistory {
    store: Arc<dyn SessionStore>,
    upstream: Arc<dyn CompletionClient>,
}

impl SessionHistory {
    pub fn new(store: Arc<dyn SessionStore>, upstream: Arc<dyn CompletionClient>) -> Self {
        Self { store, upstream }
    }

    /// Use the caller's id when present and non-empty, otherwise mint a UUID v4.
    pub fn resolve_session_id(requested: Option<&str>) -> String {
        match requested {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Load the stored history for a session. Absent means empty.
    pub async fn load(&self, session_id: &str) -> Result<Vec<Message>, StoreError> {
        match self.store.get(session_id).await? {
            Some(bytes) => decode_history(session_id, &bytes),
            None => Ok(Vec::new()),
        }
    }

    async fn save(&self, session_id: &str, history: &[Message]) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(history).map_err(|e| StoreError::Corrupt {
            key: session_id.to_string(),
            reason: e.to_string(),
        })?;
        self.store.set(session_id, &bytes).await
    }

    /// Run one chat turn.
    ///
    /// Returns the assistant's reply and the effective session id.
    pub async fn chat_turn(
        &self,
        session_id: Option<&str>,
        message: &str,
    ) -> Result<ChatTurn, RelayError> {
        let session_id = Self::resolve_session_id(session_id);

        let mut history = self.load(&session_id).await?;
        history.push(Message::user(message));

        let reply = match self.upstream.complete(&history).await {
            Ok(reply) => reply,
            Err(e) => {
                // The pending user message is dropped with `history`.
                tracing::warn!(
                    session_id = %session_id,
                    history_len = history.len(),
                    error = %e,
                    "Completion failed, history left unchanged"
                );
                return Err(e.into());
            }
        };

        history.push(Message::assistant(reply.clone()));
        self.save(&session_id, &history).await?;

        tracing::info!(
            session_id = %session_id,
            history_len = history.len(),
            "Chat turn completed"
        );

        Ok(ChatTurn {
            response: reply,
            session_id,
        })
    }
}

fn decode_history(session_id: &str, bytes: &[u8]) -> Result<Vec<Message>, StoreError> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::Corrupt {
        key: session_id.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;
    use crate::store::InMemoryStore;
    use crate::upstream::UpstreamError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replies "echo: <last user message>" and records every history it saw.
    #[derive(Default)]
    struct EchoClient {
        seen: Mutex<Vec<Vec<Message>>>,
    }

    #[async_trait]
    impl CompletionClient for EchoClient {
        async fn complete(&self, messages: &[Message]) -> Result<String, UpstreamError> {
            self.seen.lock().unwrap().push(messages.to_vec());
            let last = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
            Ok(format!("echo: {last}"))
        }
    }

    struct FailingClient;

    #[async_trait]
    impl CompletionClient for FailingClient {
        async fn complete(&self, _messages: &[Message]) -> Result<String, UpstreamError> {
            Err(UpstreamError::Status {
                status: 503,
                body: "overloaded".into(),
            })
        }
    }

    fn manager_with(
        upstream: Arc<dyn CompletionClient>,
    ) -> (SessionHistory, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        (SessionHistory::new(store.clone(), upstream), store)
    }

    #[test]
    fn test_resolve_session_id() {
        assert_eq!(SessionHistory::resolve_session_id(Some("abc")), "abc");

        let generated = SessionHistory::resolve_session_id(None);
        assert!(uuid::Uuid::parse_str(&generated).is_ok());

        let from_empty = SessionHistory::resolve_session_id(Some(""));
        assert!(uuid::Uuid::parse_str(&from_empty).is_ok());
        assert_ne!(generated, from_empty);
    }

    #[tokio::test]
    async fn test_first_turn_creates_pair() {
        let (manager, store) = manager_with(Arc::new(EchoClient::default()));

        let turn = manager.chat_turn(Some("s1"), "hi").await.unwrap();
        assert_eq!(turn.session_id, "s1");
        assert_eq!(turn.response, "echo: hi");

        let history = manager.load("s1").await.unwrap();
        assert_eq!(history, vec![Message::user("hi"), Message::assistant("echo: hi")]);

        let raw = store.get("s1").await.unwrap().unwrap();
        assert_eq!(
            String::from_utf8(raw).unwrap(),
            r#"[{"role":"user","content":"hi"},{"role":"assistant","content":"echo: hi"}]"#
        );
    }

    #[tokio::test]
    async fn test_turns_alternate_in_order() {
        let (manager, _store) = manager_with(Arc::new(EchoClient::default()));

        for i in 0..5 {
            manager.chat_turn(Some("s"), &format!("m{i}")).await.unwrap();
        }

        let history = manager.load("s").await.unwrap();
        assert_eq!(history.len(), 10);
        for (i, pair) in history.chunks(2).enumerate() {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[0].content, format!("m{i}"));
            assert_eq!(pair[1].role, Role::Assistant);
            assert_eq!(pair[1].content, format!("echo: m{i}"));
        }
    }

    #[tokio::test]
    async fn test_upstream_sees_full_history_including_new_message() {
        let client = Arc::new(EchoClient::default());
        let (manager, _store) = manager_with(client.clone());

        manager.chat_turn(Some("s"), "one").await.unwrap();
        manager.chat_turn(Some("s"), "two").await.unwrap();

        let seen = client.seen.lock().unwrap();
        assert_eq!(seen[0], vec![Message::user("one")]);
        assert_eq!(
            seen[1],
            vec![
                Message::user("one"),
                Message::assistant("echo: one"),
                Message::user("two"),
            ]
        );
    }

    #[tokio::test]
    async fn test_upstream_failure_leaves_store_untouched() {
        let (manager, store) = manager_with(Arc::new(FailingClient));

        let err = manager.chat_turn(Some("fresh"), "hi").await.unwrap_err();
        assert!(matches!(err, RelayError::Upstream(_)));
        assert!(store.get("fresh").await.unwrap().is_none());

        let before = serde_json::to_vec(&vec![Message::user("a"), Message::assistant("b")]).unwrap();
        store.set("existing", &before).await.unwrap();

        manager.chat_turn(Some("existing"), "c").await.unwrap_err();
        assert_eq!(store.get("existing").await.unwrap().unwrap(), before);
    }

    #[tokio::test]
    async fn test_corrupt_history_is_store_error() {
        let client = Arc::new(EchoClient::default());
        let (manager, store) = manager_with(client.clone());
        store.set("bad", b"not json").await.unwrap();

        let err = manager.chat_turn(Some("bad"), "hi").await.unwrap_err();
        assert!(matches!(err, RelayError::Store(StoreError::Corrupt { .. })));
        assert!(client.seen.lock().unwrap().is_empty());
    }
}
