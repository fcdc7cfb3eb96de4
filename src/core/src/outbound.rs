use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

use huddle_protocol::ServerMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("outbound queue full")]
    Full,
    #[error("connection closed")]
    Closed,
    #[error("outbound queue stalled")]
    Stalled,
}

/// Sending half of one connection's outbound queue.
///
/// The session holds one per registered connection; the connection loop owns
/// the receiver and writes each message to the socket. Dropping every handle
/// ends that loop.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    tx: mpsc::Sender<ServerMessage>,
}

impl ConnectionHandle {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queue a message without waiting. Used for fan-out, where one slow
    /// socket must not hold up the others.
    pub fn deliver(&self, msg: ServerMessage) -> Result<(), DeliveryError> {
        self.tx.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Queue a message, waiting up to `deadline` for capacity. Used for the
    /// stream of a single chat exchange, where dropping an increment would
    /// corrupt the reply.
    pub async fn deliver_ordered(
        &self,
        msg: ServerMessage,
        deadline: Duration,
    ) -> Result<(), DeliveryError> {
        match tokio::time::timeout(deadline, self.tx.send(msg)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(DeliveryError::Closed),
            Err(_) => Err(DeliveryError::Stalled),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deliver_reports_full_and_closed() {
        let (handle, rx) = ConnectionHandle::channel(1);
        assert!(handle.deliver(ServerMessage::error("a")).is_ok());
        assert_eq!(
            handle.deliver(ServerMessage::error("b")),
            Err(DeliveryError::Full)
        );
        drop(rx);
        assert!(handle.is_closed());
        assert_eq!(
            handle.deliver(ServerMessage::error("c")),
            Err(DeliveryError::Closed)
        );
    }

    const DEADLINE: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn deliver_ordered_fails_once_receiver_is_gone() {
        let (handle, mut rx) = ConnectionHandle::channel(4);
        handle
            .deliver_ordered(ServerMessage::error("a"), DEADLINE)
            .await
            .unwrap();
        assert_eq!(rx.recv().await, Some(ServerMessage::error("a")));
        drop(rx);
        assert_eq!(
            handle.deliver_ordered(ServerMessage::error("b"), DEADLINE).await,
            Err(DeliveryError::Closed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn deliver_ordered_gives_up_on_a_full_queue() {
        let (handle, mut rx) = ConnectionHandle::channel(1);
        handle.deliver(ServerMessage::error("a")).unwrap();

        let started = tokio::time::Instant::now();
        assert_eq!(
            handle.deliver_ordered(ServerMessage::error("b"), DEADLINE).await,
            Err(DeliveryError::Stalled)
        );
        assert!(started.elapsed() >= DEADLINE);
        assert_eq!(rx.recv().await, Some(ServerMessage::error("a")));
        assert!(rx.try_recv().is_err());
    }
}
