use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::mpsc;
use uuid::Uuid;

use huddle_protocol::{
    decode_client_message, ChatRequest, ClientMessage, DecodeError, Negotiation, ServerMessage,
    SignalKind,
};

use crate::chat::{normalize, CompletionBackend, CompletionDriver, TranscriptStore};
use crate::outbound::ConnectionHandle;

use super::hub::HubInner;
use super::registry::ConnectionRegistry;
use super::relay;

/// Input to a session actor.
#[derive(Debug)]
pub enum SessionCommand {
    Join {
        conn_id: Uuid,
        handle: ConnectionHandle,
    },
    Inbound {
        conn_id: Uuid,
        text: String,
    },
    Leave {
        conn_id: Uuid,
    },
    Shutdown,
}

/// Per-session settings shared by every session of a hub.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub default_model: String,
    pub welcome_message: String,
    /// How long an empty session waits for a new connection before exiting.
    pub retention: Duration,
}

/// State of one session. Only ever touched from its own task, so commands
/// are applied strictly one at a time in arrival order.
pub struct Session {
    id: String,
    registry: ConnectionRegistry,
    transcript: TranscriptStore,
    model: String,
    welcome_message: String,
    driver: CompletionDriver,
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        settings: &SessionSettings,
        backend: Arc<dyn CompletionBackend>,
    ) -> Self {
        Self {
            id: id.into(),
            registry: ConnectionRegistry::new(),
            transcript: TranscriptStore::new(),
            model: settings.default_model.clone(),
            welcome_message: settings.welcome_message.clone(),
            driver: CompletionDriver::new(backend),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn transcript(&self) -> &TranscriptStore {
        &self.transcript
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Apply one command. `Shutdown` is handled by the run loop.
    pub async fn handle(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Join { conn_id, handle } => self.join(conn_id, handle),
            SessionCommand::Inbound { conn_id, text } => self.inbound(conn_id, &text).await,
            SessionCommand::Leave { conn_id } => self.leave(conn_id),
            SessionCommand::Shutdown => {}
        }
    }

    fn join(&mut self, conn_id: Uuid, handle: ConnectionHandle) {
        let welcome = ServerMessage::Welcome {
            message: self.welcome_message.clone(),
            model: self.model.clone(),
        };
        if let Err(e) = handle.deliver(welcome) {
            tracing::debug!(%conn_id, error = %e, "welcome not delivered");
        }
        self.registry.add(conn_id, handle);
        tracing::info!(
            session = %self.id,
            %conn_id,
            connections = self.registry.len(),
            "connection joined"
        );
    }

    fn leave(&mut self, conn_id: Uuid) {
        let Some(conn) = self.registry.remove(conn_id) else {
            return;
        };
        tracing::info!(
            session = %self.id,
            %conn_id,
            peer_id = ?conn.peer_id,
            connections = self.registry.len(),
            "connection left"
        );
        if let Some(peer_id) = conn.peer_id {
            relay::announce_leave(&self.registry, &peer_id, None);
        }
    }

    async fn inbound(&mut self, conn_id: Uuid, text: &str) {
        let Some(origin) = self.registry.get(conn_id).map(|c| c.handle.clone()) else {
            tracing::debug!(session = %self.id, %conn_id, "message from unregistered connection");
            return;
        };
        let msg = match decode_client_message(text) {
            Ok(msg) => msg,
            Err(DecodeError::UnknownType(kind)) => {
                tracing::debug!(session = %self.id, %conn_id, %kind, "unknown message type");
                reply(&origin, ServerMessage::error(format!("Unknown message type: {kind}")));
                return;
            }
            Err(e) => {
                tracing::warn!(session = %self.id, %conn_id, error = %e, "failed to decode message");
                reply(&origin, ServerMessage::error(format!("Invalid message: {e}")));
                return;
            }
        };

        match msg {
            ClientMessage::Presence(presence) => self.presence(conn_id, &origin, presence.peer_id),
            ClientMessage::Chat(request) => self.chat(&origin, request).await,
            ClientMessage::Clear => {
                self.transcript.clear();
                tracing::info!(session = %self.id, %conn_id, "transcript cleared");
                reply(
                    &origin,
                    ServerMessage::Cleared {
                        message: "Conversation history cleared".to_string(),
                    },
                );
            }
            ClientMessage::VideoStarted(n) => {
                self.signal(conn_id, &origin, SignalKind::VideoStarted, n)
            }
            ClientMessage::VideoStopped(n) => {
                self.signal(conn_id, &origin, SignalKind::VideoStopped, n)
            }
            ClientMessage::WebrtcOffer(n) => self.signal(conn_id, &origin, SignalKind::WebrtcOffer, n),
            ClientMessage::WebrtcAnswer(n) => {
                self.signal(conn_id, &origin, SignalKind::WebrtcAnswer, n)
            }
            ClientMessage::WebrtcIce(n) => self.signal(conn_id, &origin, SignalKind::WebrtcIce, n),
        }
    }

    fn presence(&mut self, conn_id: Uuid, origin: &ConnectionHandle, peer_id: String) {
        let peer_id = peer_id.trim();
        if peer_id.is_empty() {
            reply(origin, ServerMessage::error("Invalid message: empty peerId"));
            return;
        }
        let previous = self.registry.peer_id(conn_id).map(str::to_string);
        if previous.as_deref() == Some(peer_id) {
            tracing::debug!(session = %self.id, %conn_id, %peer_id, "presence repeated");
            return;
        }
        self.registry.set_peer_id(conn_id, peer_id);
        if let Some(previous) = previous {
            tracing::info!(session = %self.id, %conn_id, from = %previous, to = %peer_id, "peer renamed");
            relay::announce_leave(&self.registry, &previous, Some(conn_id));
        } else {
            tracing::info!(session = %self.id, %conn_id, %peer_id, "peer joined");
        }
        relay::announce_join(&self.registry, conn_id);
    }

    /// Forward a negotiation message, stamping it with the sender's peer id.
    fn signal(
        &self,
        conn_id: Uuid,
        origin: &ConnectionHandle,
        kind: SignalKind,
        mut negotiation: Negotiation,
    ) {
        let sender = self.registry.peer_id(conn_id).map(str::to_string);
        if kind.is_directed() {
            let target = negotiation
                .peer_id
                .take()
                .filter(|t| !t.trim().is_empty());
            let Some(target) = target else {
                reply(
                    origin,
                    ServerMessage::error(format!("Invalid message: {} requires peerId", kind.as_str())),
                );
                return;
            };
            if sender.is_none() {
                tracing::debug!(session = %self.id, %conn_id, "directed signal from undeclared peer");
            }
            negotiation.peer_id = sender;
            let delivered = relay::relay_to_peer(&self.registry, &kind.into_message(negotiation), &target);
            tracing::debug!(session = %self.id, kind = kind.as_str(), %target, delivered, "signal relayed");
        } else {
            if sender.is_some() {
                negotiation.peer_id = sender;
            }
            let delivered =
                relay::broadcast(&self.registry, &kind.into_message(negotiation), Some(conn_id));
            tracing::debug!(session = %self.id, kind = kind.as_str(), delivered, "signal broadcast");
        }
    }

    async fn chat(&mut self, origin: &ConnectionHandle, request: ChatRequest) {
        let ChatRequest {
            content,
            model,
            files,
        } = request;
        if let Some(model) = model.filter(|m| !m.trim().is_empty()) {
            if model != self.model {
                tracing::info!(session = %self.id, from = %self.model, to = %model, "model switched");
                self.model = model;
            }
        }
        let turn = normalize(content.as_deref(), &files);
        tracing::debug!(
            session = %self.id,
            model = %self.model,
            attachments = files.len(),
            history = self.transcript.len(),
            "chat request"
        );
        self.driver
            .run(&mut self.transcript, &self.model, turn, origin)
            .await;
    }
}

fn reply(origin: &ConnectionHandle, msg: ServerMessage) {
    if let Err(e) = origin.deliver(msg) {
        tracing::debug!(error = %e, "reply not delivered");
    }
}

/// Drive a session until it is shut down, its mailbox closes, or it has been
/// empty for the retention period.
pub(crate) async fn run_session(
    mut session: Session,
    mut rx: mpsc::UnboundedReceiver<SessionCommand>,
    retention: Duration,
    generation: u64,
    hub: Weak<HubInner>,
) {
    tracing::info!(session = %session.id, "session started");
    loop {
        let next = if session.registry.is_empty() {
            tokio::time::timeout(retention, rx.recv()).await.ok()
        } else {
            Some(rx.recv().await)
        };
        let cmd = match next {
            Some(Some(cmd)) => cmd,
            Some(None) => break,
            None => {
                let pending = match hub.upgrade() {
                    Some(hub) => hub.retire(&session.id, generation, &mut rx),
                    None => None,
                };
                match pending {
                    Some(cmd) => cmd,
                    None => {
                        tracing::info!(session = %session.id, "session retention elapsed");
                        break;
                    }
                }
            }
        };
        if matches!(cmd, SessionCommand::Shutdown) {
            tracing::info!(session = %session.id, "session evicted");
            break;
        }
        session.handle(cmd).await;
    }
    tracing::info!(
        session = %session.id,
        turns = session.transcript.len(),
        "session closed"
    );
}
