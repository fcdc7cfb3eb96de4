use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::chat::CompletionBackend;
use crate::outbound::ConnectionHandle;

use super::actor::{run_session, Session, SessionCommand, SessionSettings};

struct SessionEntry {
    generation: u64,
    tx: mpsc::UnboundedSender<SessionCommand>,
}

pub(crate) struct HubInner {
    sessions: Mutex<HashMap<String, SessionEntry>>,
    backend: Arc<dyn CompletionBackend>,
    settings: SessionSettings,
    next_generation: AtomicU64,
}

impl HubInner {
    fn sessions(&self) -> MutexGuard<'_, HashMap<String, SessionEntry>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Called by an idle session whose retention elapsed. Under the hub lock,
    /// either hands back a command that raced in, or unregisters the session
    /// and closes its mailbox so no later `connect` can reach it.
    pub(crate) fn retire(
        &self,
        session_id: &str,
        generation: u64,
        rx: &mut mpsc::UnboundedReceiver<SessionCommand>,
    ) -> Option<SessionCommand> {
        let mut sessions = self.sessions();
        if let Ok(cmd) = rx.try_recv() {
            return Some(cmd);
        }
        if sessions
            .get(session_id)
            .is_some_and(|e| e.generation == generation)
        {
            sessions.remove(session_id);
        }
        rx.close();
        None
    }
}

/// Directory of live sessions, keyed by session id.
///
/// Each session runs as its own task and owns its registry and transcript;
/// the hub only routes connections to the right mailbox, creating sessions
/// on first use.
#[derive(Clone)]
pub struct SessionHub {
    inner: Arc<HubInner>,
}

impl SessionHub {
    pub fn new(backend: Arc<dyn CompletionBackend>, settings: SessionSettings) -> Self {
        Self {
            inner: Arc::new(HubInner {
                sessions: Mutex::new(HashMap::new()),
                backend,
                settings,
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.inner.settings
    }

    /// Attach a connection to `session_id`, starting the session if needed.
    /// The connection's welcome is queued on `handle` by the session.
    pub fn connect(
        &self,
        session_id: &str,
        conn_id: Uuid,
        handle: ConnectionHandle,
    ) -> SessionLink {
        let mut sessions = self.inner.sessions();
        let mut join = SessionCommand::Join { conn_id, handle };
        let tx = loop {
            let live = sessions
                .get(session_id)
                .filter(|entry| !entry.tx.is_closed())
                .map(|entry| entry.tx.clone());
            let tx = match live {
                Some(tx) => tx,
                None => self.spawn_session(&mut sessions, session_id),
            };
            match tx.send(join) {
                Ok(()) => break tx,
                Err(mpsc::error::SendError(cmd)) => {
                    // The session task ended without unregistering.
                    sessions.remove(session_id);
                    join = cmd;
                }
            }
        };
        SessionLink {
            session_id: session_id.to_string(),
            conn_id,
            tx,
        }
    }

    fn spawn_session(
        &self,
        sessions: &mut HashMap<String, SessionEntry>,
        session_id: &str,
    ) -> mpsc::UnboundedSender<SessionCommand> {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Session::new(
            session_id,
            &self.inner.settings,
            self.inner.backend.clone(),
        );
        tokio::spawn(run_session(
            session,
            rx,
            self.inner.settings.retention,
            generation,
            Arc::downgrade(&self.inner),
        ));
        sessions.insert(
            session_id.to_string(),
            SessionEntry {
                generation,
                tx: tx.clone(),
            },
        );
        tracing::debug!(session = session_id, generation, "session spawned");
        tx
    }

    /// Drop a session immediately, regardless of connections. Its transcript
    /// is discarded and every attached connection is closed.
    pub fn evict(&self, session_id: &str) -> bool {
        match self.inner.sessions().remove(session_id) {
            Some(entry) => {
                let _ = entry.tx.send(SessionCommand::Shutdown);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.inner.sessions().contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.inner.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A connection's attachment to its session. Dropping it detaches the
/// connection.
pub struct SessionLink {
    session_id: String,
    conn_id: Uuid,
    tx: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionLink {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn conn_id(&self) -> Uuid {
        self.conn_id
    }

    /// Hand a text frame to the session. Returns false once the session has
    /// gone away.
    pub fn inbound(&self, text: String) -> bool {
        self.tx
            .send(SessionCommand::Inbound {
                conn_id: self.conn_id,
                text,
            })
            .is_ok()
    }
}

impl Drop for SessionLink {
    fn drop(&mut self) {
        let _ = self.tx.send(SessionCommand::Leave {
            conn_id: self.conn_id,
        });
    }
}
