use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use huddle_protocol::ServerMessage;

use crate::outbound::{ConnectionHandle, DeliveryError};

use super::backend::{BackendError, CompletionBackend, CompletionRequest};
use super::transcript::TranscriptStore;
use super::turn::Turn;

/// How long one chat message may wait for room in the originator's queue.
pub const ORIGIN_SEND_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverPhase {
    Idle,
    Sending,
    Streaming,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed { reply: String },
    Failed { error: String },
}

/// Runs one chat exchange at a time against the completion backend.
///
/// The user turn is appended before the request and removed again if the
/// exchange fails, so a failed exchange leaves the transcript as it was.
pub struct CompletionDriver {
    backend: Arc<dyn CompletionBackend>,
    phase: DriverPhase,
}

impl CompletionDriver {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            backend,
            phase: DriverPhase::Idle,
        }
    }

    pub fn phase(&self) -> DriverPhase {
        self.phase
    }

    fn transition(&mut self, next: DriverPhase) {
        tracing::debug!(from = ?self.phase, to = ?next, "driver phase");
        self.phase = next;
    }

    /// Append `turn`, stream the reply to `origin`, and record the outcome.
    ///
    /// `origin` sees `ack`, then `stream` increments in backend order, then
    /// exactly one of `complete` or `error`.
    pub async fn run(
        &mut self,
        transcript: &mut TranscriptStore,
        model: &str,
        turn: Turn,
        origin: &ConnectionHandle,
    ) -> TurnOutcome {
        self.transition(DriverPhase::Sending);
        transcript.append(turn);
        let mut link = OriginLink::new(origin);
        link.send(ServerMessage::Ack {
            message: "Message received, generating response...".to_string(),
        })
        .await;

        let result = self
            .stream_reply(transcript.snapshot(), model, &mut link)
            .await;
        let outcome = match result {
            Ok(reply) => {
                transcript.append(Turn::assistant(reply.clone()));
                self.transition(DriverPhase::Completed);
                link.send(ServerMessage::Complete {
                    message: "Response complete".to_string(),
                })
                .await;
                TurnOutcome::Completed { reply }
            }
            Err(e) => {
                self.transition(DriverPhase::Failed);
                tracing::warn!(%model, error = %e, "completion failed; rolling back user turn");
                let error = format!("Error streaming from backend: {e}");
                link.send(ServerMessage::error(error.clone())).await;
                transcript.rollback_last();
                TurnOutcome::Failed { error }
            }
        };
        self.transition(DriverPhase::Idle);
        outcome
    }

    async fn stream_reply(
        &mut self,
        turns: &[Turn],
        model: &str,
        link: &mut OriginLink<'_>,
    ) -> Result<String, BackendError> {
        let mut stream = self
            .backend
            .stream_chat(CompletionRequest { model, turns })
            .await?;
        self.transition(DriverPhase::Streaming);

        let mut reply = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if chunk.content.is_empty() {
                continue;
            }
            reply.push_str(&chunk.content);
            link.send(ServerMessage::Stream {
                content: chunk.content,
                done: chunk.done,
            })
            .await;
        }
        Ok(reply)
    }
}

/// Delivery to the connection that started the exchange. Once it has gone
/// away or stopped reading, further messages are dropped without affecting
/// the exchange.
struct OriginLink<'a> {
    handle: &'a ConnectionHandle,
    gone: bool,
}

impl<'a> OriginLink<'a> {
    fn new(handle: &'a ConnectionHandle) -> Self {
        Self {
            handle,
            gone: false,
        }
    }

    async fn send(&mut self, msg: ServerMessage) {
        if self.gone {
            return;
        }
        match self.handle.deliver_ordered(msg, ORIGIN_SEND_DEADLINE).await {
            Ok(()) => {}
            Err(DeliveryError::Stalled) => {
                tracing::warn!("originating connection not reading; dropping chat output");
                self.gone = true;
            }
            Err(e) => {
                tracing::debug!(error = %e, "originating connection gone; dropping chat output");
                self.gone = true;
            }
        }
    }
}
