use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tracing::Instrument;
use uuid::Uuid;

use huddle_protocol::encode_server_message;

use crate::outbound::ConnectionHandle;
use crate::session::{SessionHub, SessionLink};

const CLOSE_IDLE: u16 = 4000;
const CLOSE_GOING_AWAY: u16 = 1001;

/// Parameters required to run a connection.
#[derive(Clone)]
pub struct ConnectionParams {
    pub session_id: String,
    pub hub: SessionHub,
    pub heartbeat_interval: Duration,
    pub idle_timeout: Duration,
    pub outbound_buffer: usize,
}

/// Run one WebSocket for its whole life: attach to the session, pump frames
/// both ways with heartbeat + idle timeout, detach on exit.
pub async fn run_connection(socket: WebSocket, params: ConnectionParams) {
    let conn_id = Uuid::new_v4();
    let span = tracing::info_span!("conn", id = %conn_id, session = %params.session_id);
    run_message_loop(socket, conn_id, params)
        .instrument(span)
        .await;
}

async fn run_message_loop(socket: WebSocket, conn_id: Uuid, params: ConnectionParams) {
    let ConnectionParams {
        session_id,
        hub,
        heartbeat_interval,
        idle_timeout,
        outbound_buffer,
    } = params;

    let (mut sink, mut stream) = socket.split();
    let (handle, mut outbound_rx) = ConnectionHandle::channel(outbound_buffer);
    let link = hub.connect(&session_id, conn_id, handle);
    tracing::info!("connection attached");

    let mut idle_deadline = tokio::time::Instant::now() + idle_timeout;
    let mut heartbeat = tokio::time::interval(heartbeat_interval);
    heartbeat.tick().await; // consume immediate first tick

    loop {
        tokio::select! {
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        idle_deadline = tokio::time::Instant::now() + idle_timeout;
                        if !forward(&link, text.as_str().to_owned()) {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        idle_deadline = tokio::time::Instant::now() + idle_timeout;
                        // Text protocol only; the session reports it as invalid.
                        let text = String::from_utf8_lossy(&data).into_owned();
                        if !forward(&link, text) {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        idle_deadline = tokio::time::Instant::now() + idle_timeout;
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        idle_deadline = tokio::time::Instant::now() + idle_timeout;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        if let Some(frame) = frame {
                            tracing::info!(code = %frame.code, reason = %frame.reason, "ws close");
                        } else {
                            tracing::info!("ws close");
                        }
                        break;
                    }
                    None => {
                        tracing::info!("ws stream ended");
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::warn!("ws error: {e}");
                        break;
                    }
                }
            }
            // Messages queued by the session.
            msg = outbound_rx.recv() => {
                match msg {
                    Some(msg) => match encode_server_message(&msg) {
                        Ok(json) => {
                            if sink.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(kind = msg.kind(), error = %e, "failed to encode outbound message");
                        }
                    },
                    None => {
                        tracing::info!("session closed");
                        close(&mut sink, CLOSE_GOING_AWAY, "session closed").await;
                        break;
                    }
                }
            }
            _ = heartbeat.tick() => {
                if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
            _ = tokio::time::sleep_until(idle_deadline) => {
                tracing::info!("idle timeout");
                close(&mut sink, CLOSE_IDLE, "idle timeout").await;
                break;
            }
        }
    }

    drop(link);
    tracing::info!("connection closed");
}

fn forward(link: &SessionLink, text: String) -> bool {
    if link.inbound(text) {
        return true;
    }
    tracing::info!(session = link.session_id(), "session gone; closing connection");
    false
}

async fn close(sink: &mut SplitSink<WebSocket, Message>, code: u16, reason: &'static str) {
    let _ = sink
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await;
}
