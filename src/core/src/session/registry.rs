use uuid::Uuid;

use crate::outbound::ConnectionHandle;

/// One live connection of a session.
#[derive(Debug)]
pub struct RegisteredConnection {
    pub conn_id: Uuid,
    /// Set by a `presence` announcement; `None` until then.
    pub peer_id: Option<String>,
    pub handle: ConnectionHandle,
}

/// The live connections of one session, in join order.
///
/// Owned by the session actor, so no locking. Operations on unknown
/// connection ids are silent no-ops.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: Vec<RegisteredConnection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Re-adding a known id replaces its transport and
    /// clears its peer id.
    pub fn add(&mut self, conn_id: Uuid, handle: ConnectionHandle) {
        match self.connections.iter_mut().find(|c| c.conn_id == conn_id) {
            Some(existing) => {
                existing.handle = handle;
                existing.peer_id = None;
            }
            None => self.connections.push(RegisteredConnection {
                conn_id,
                peer_id: None,
                handle,
            }),
        }
    }

    pub fn remove(&mut self, conn_id: Uuid) -> Option<RegisteredConnection> {
        let pos = self.connections.iter().position(|c| c.conn_id == conn_id)?;
        Some(self.connections.remove(pos))
    }

    /// Returns false when the connection is not registered.
    pub fn set_peer_id(&mut self, conn_id: Uuid, peer_id: impl Into<String>) -> bool {
        match self.connections.iter_mut().find(|c| c.conn_id == conn_id) {
            Some(conn) => {
                conn.peer_id = Some(peer_id.into());
                true
            }
            None => false,
        }
    }

    pub fn get(&self, conn_id: Uuid) -> Option<&RegisteredConnection> {
        self.connections.iter().find(|c| c.conn_id == conn_id)
    }

    pub fn peer_id(&self, conn_id: Uuid) -> Option<&str> {
        self.get(conn_id).and_then(|c| c.peer_id.as_deref())
    }

    pub fn all(&self) -> impl Iterator<Item = &RegisteredConnection> {
        self.connections.iter()
    }

    pub fn by_peer_id<'a>(
        &'a self,
        peer_id: &'a str,
    ) -> impl Iterator<Item = &'a RegisteredConnection> + 'a {
        self.connections
            .iter()
            .filter(move |c| c.peer_id.as_deref() == Some(peer_id))
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> ConnectionHandle {
        ConnectionHandle::channel(4).0
    }

    #[test]
    fn add_remove_and_lookup() {
        let mut reg = ConnectionRegistry::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        reg.add(a, handle());
        reg.add(b, handle());
        assert_eq!(reg.len(), 2);
        assert!(reg.peer_id(a).is_none());

        assert!(reg.set_peer_id(b, "p2"));
        assert_eq!(reg.peer_id(b), Some("p2"));
        let found: Vec<Uuid> = reg.by_peer_id("p2").map(|c| c.conn_id).collect();
        assert_eq!(found, vec![b]);
        assert_eq!(reg.by_peer_id("p1").count(), 0);

        let removed = reg.remove(b).unwrap();
        assert_eq!(removed.peer_id.as_deref(), Some("p2"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn unknown_ids_are_noops() {
        let mut reg = ConnectionRegistry::new();
        let ghost = Uuid::new_v4();
        assert!(reg.remove(ghost).is_none());
        assert!(!reg.set_peer_id(ghost, "p1"));
        assert!(reg.is_empty());
    }

    #[test]
    fn re_adding_keeps_one_entry_and_resets_peer() {
        let mut reg = ConnectionRegistry::new();
        let a = Uuid::new_v4();
        reg.add(a, handle());
        reg.set_peer_id(a, "p1");
        reg.add(a, handle());
        assert_eq!(reg.len(), 1);
        assert!(reg.peer_id(a).is_none());
    }

    #[test]
    fn same_peer_id_on_several_connections() {
        let mut reg = ConnectionRegistry::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        reg.add(a, handle());
        reg.add(b, handle());
        reg.set_peer_id(a, "p1");
        reg.set_peer_id(b, "p1");
        assert_eq!(reg.by_peer_id("p1").count(), 2);
        let order: Vec<Uuid> = reg.all().map(|c| c.conn_id).collect();
        assert_eq!(order, vec![a, b]);
    }
}
