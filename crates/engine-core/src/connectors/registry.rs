use crate::{
    connectors::transport::{ConnectionOpener, DestinationConnection},
    error::TransportError,
};
use model::core::identifiers::DestinationKey;
use std::{collections::HashMap, fmt, sync::Arc};
use tracing::debug;

/// Index of a connection within its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(usize);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Connections opened by one copy session, one per destination key.
///
/// Entries live as long as the registry. The registry is owned by a single
/// session and is not shared between tasks.
pub struct ConnectionRegistry {
    opener: Arc<dyn ConnectionOpener>,
    ids: HashMap<DestinationKey, ConnectionId>,
    connections: Vec<Box<dyn DestinationConnection>>,
}

impl ConnectionRegistry {
    pub fn new(opener: Arc<dyn ConnectionOpener>) -> Self {
        Self {
            opener,
            ids: HashMap::new(),
            connections: Vec::new(),
        }
    }

    /// Returns the cached connection for `key`, opening it on first use.
    pub async fn resolve(&mut self, key: &DestinationKey) -> Result<ConnectionId, TransportError> {
        if let Some(id) = self.ids.get(key) {
            return Ok(*id);
        }

        let connection = self.opener.open(key).await?;
        let id = ConnectionId(self.connections.len());
        self.connections.push(connection);
        self.ids.insert(key.clone(), id);

        debug!(destination = %key, connection = %id, "Opened data node connection");
        Ok(id)
    }

    pub fn get(&self, id: ConnectionId) -> &dyn DestinationConnection {
        self.connections[id.0].as_ref()
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> &mut dyn DestinationConnection {
        self.connections[id.0].as_mut()
    }

    pub fn all(&self) -> impl Iterator<Item = (ConnectionId, &dyn DestinationConnection)> {
        self.connections
            .iter()
            .enumerate()
            .map(|(i, c)| (ConnectionId(i), c.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Drops every connection. Returns how many were released.
    pub fn release(&mut self) -> usize {
        self.ids.clear();
        let released = self.connections.len();
        self.connections.clear();
        released
    }
}
