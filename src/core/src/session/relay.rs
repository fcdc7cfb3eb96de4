//! Fan-out of presence and negotiation messages over a [`ConnectionRegistry`].
//!
//! Delivery is best-effort and per connection: a full or closed queue is
//! logged and skipped, never reported to the sender.

use uuid::Uuid;

use huddle_protocol::ServerMessage;

use super::registry::{ConnectionRegistry, RegisteredConnection};

fn deliver(conn: &RegisteredConnection, msg: &ServerMessage) -> bool {
    match conn.handle.deliver(msg.clone()) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(
                conn_id = %conn.conn_id,
                peer_id = ?conn.peer_id,
                kind = msg.kind(),
                error = %e,
                "delivery failed"
            );
            false
        }
    }
}

/// Send `msg` to every connection except `exclude`. Returns how many
/// deliveries succeeded.
pub fn broadcast(registry: &ConnectionRegistry, msg: &ServerMessage, exclude: Option<Uuid>) -> usize {
    registry
        .all()
        .filter(|c| Some(c.conn_id) != exclude)
        .filter(|c| deliver(c, msg))
        .count()
}

/// Send `msg` to every connection that declared `target` as its peer id.
/// An absent target is not an error.
pub fn relay_to_peer(registry: &ConnectionRegistry, msg: &ServerMessage, target: &str) -> usize {
    let delivered = registry
        .by_peer_id(target)
        .filter(|c| deliver(c, msg))
        .count();
    if delivered == 0 {
        tracing::debug!(target_peer = target, kind = msg.kind(), "relay target not connected");
    }
    delivered
}

/// Presence join for a connection whose peer id is already recorded: tell it
/// about every other declared peer, then announce it to the other declared
/// peers. Undeclared connections learn the peer list when they declare, so
/// nobody hears about the same join twice.
pub fn announce_join(registry: &ConnectionRegistry, conn_id: Uuid) {
    let Some(joined) = registry.get(conn_id) else {
        return;
    };
    let Some(peer_id) = joined.peer_id.clone() else {
        return;
    };
    let others = move || {
        registry
            .all()
            .filter(move |c| c.conn_id != conn_id && c.peer_id.is_some())
    };
    for other in others() {
        if let Some(existing) = &other.peer_id {
            deliver(
                joined,
                &ServerMessage::PeerJoined {
                    peer_id: existing.clone(),
                },
            );
        }
    }
    let notice = ServerMessage::PeerJoined { peer_id };
    for other in others() {
        deliver(other, &notice);
    }
}

/// Announce a departed peer id to the remaining connections except `exclude`.
pub fn announce_leave(registry: &ConnectionRegistry, peer_id: &str, exclude: Option<Uuid>) {
    broadcast(
        registry,
        &ServerMessage::PeerLeft {
            peer_id: peer_id.to_string(),
        },
        exclude,
    );
}
