//! Session registry
//!
//! Sessions are keyed by signaling-connection id. A new offer on a
//! connection replaces any session that connection already owns, closing it
//! first, so a reconnecting viewer never races a stale transport.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use super::Session;

pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Create-or-replace: register `session` for this connection, closing
    /// and discarding whatever the connection had before.
    pub async fn replace(&self, connection_id: Uuid, session: Arc<Session>) {
        let previous = self
            .sessions
            .write()
            .await
            .insert(connection_id, session);

        if let Some(previous) = previous {
            tracing::info!(
                "Replacing session {} on connection {}",
                previous.id(),
                connection_id
            );
            previous.close().await;
        }
    }

    pub async fn get(&self, connection_id: Uuid) -> Option<Arc<Session>> {
        self.sessions.read().await.get(&connection_id).cloned()
    }

    /// Remove and close the connection's session, if any. Called when the
    /// signaling loop ends.
    pub async fn remove(&self, connection_id: Uuid) {
        let session = self.sessions.write().await.remove(&connection_id);
        if let Some(session) = session {
            session.close().await;
            tracing::debug!("Removed session for connection {}", connection_id);
        }
    }

    /// Close every tracked session (process shutdown)
    pub async fn close_all(&self) {
        let sessions: Vec<Arc<Session>> = self.sessions.write().await.drain().map(|(_, s)| s).collect();
        for session in sessions {
            session.close().await;
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::LatestControlSink;
    use crate::session::{SessionConfig, SessionState};
    use crate::state::VideoMode;
    use roboscope_media::{FrameSource, ImageBuffer, SceneRenderer};

    struct NullScene;

    impl SceneRenderer for NullScene {
        fn render(&self) -> anyhow::Result<(ImageBuffer, ImageBuffer)> {
            Ok((ImageBuffer::black(4, 4), ImageBuffer::black(4, 4)))
        }
    }

    fn make_session() -> Arc<Session> {
        Session::new(
            SessionConfig {
                video_mode: VideoMode::Combined,
                fps: 30,
                test_pattern: true,
                stun_servers: vec![],
            },
            Arc::new(FrameSource::new(Arc::new(NullScene), 4, 4)),
            Arc::new(LatestControlSink::new()),
        )
    }

    #[tokio::test]
    async fn replace_closes_the_previous_session() {
        let registry = SessionRegistry::new();
        let connection_id = Uuid::new_v4();

        let first = make_session();
        registry.replace(connection_id, first.clone()).await;
        assert_eq!(registry.len().await, 1);

        let second = make_session();
        registry.replace(connection_id, second.clone()).await;

        assert_eq!(registry.len().await, 1);
        assert_eq!(first.state().await, SessionState::Closed);
        assert_eq!(second.state().await, SessionState::Idle);
    }

    #[tokio::test]
    async fn remove_closes_and_forgets() {
        let registry = SessionRegistry::new();
        let connection_id = Uuid::new_v4();

        let session = make_session();
        registry.replace(connection_id, session.clone()).await;
        registry.remove(connection_id).await;

        assert!(registry.is_empty().await);
        assert_eq!(session.state().await, SessionState::Closed);

        // Removing an unknown connection is a no-op.
        registry.remove(Uuid::new_v4()).await;
    }

    #[tokio::test]
    async fn close_all_drains_the_registry() {
        let registry = SessionRegistry::new();
        let a = make_session();
        let b = make_session();
        registry.replace(Uuid::new_v4(), a.clone()).await;
        registry.replace(Uuid::new_v4(), b.clone()).await;

        registry.close_all().await;

        assert!(registry.is_empty().await);
        assert_eq!(a.state().await, SessionState::Closed);
        assert_eq!(b.state().await, SessionState::Closed);
    }
}
