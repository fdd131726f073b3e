//! Live WebSocket connection tracking
//!
//! Each socket is registered here with the channel its writer task drains.
//! A connection becomes a lobby subscriber once one of its join actions
//! succeeds, and lobby broadcasts go to every subscriber of that code.
//!
//! Connections are transport state only. Player identity lives in the
//! session, so dropping a connection never removes a player.

use log::{debug, info};
use shared::ServerEvent;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::mpsc;

pub type ConnectionId = u32;

/// Lobby and player a connection has joined as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub code: String,
    pub player_id: String,
}

#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    /// Outbound queue drained by the socket's writer task
    pub sender: mpsc::UnboundedSender<ServerEvent>,
    pub subscription: Option<Subscription>,
}

impl Connection {
    pub fn new(id: ConnectionId, sender: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            id,
            sender,
            subscription: None,
        }
    }

    /// Queues an event. False once the writer task is gone.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.sender.send(event).is_ok()
    }

    fn is_subscribed_to(&self, code: &str) -> bool {
        self.subscription.as_ref().is_some_and(|s| s.code == code)
    }
}

/// Registry of open sockets and the lobby each one listens to.
///
/// Ids are handed out sequentially starting at 1 and never reused within
/// one server run.
pub struct ClientManager {
    clients: HashMap<ConnectionId, Connection>,
    next_client_id: ConnectionId,
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Registers a socket and returns its id.
    ///
    /// Returns `None` when `max_clients` sockets are already open; the
    /// caller is expected to close the socket after telling the peer.
    pub fn add_client(
        &mut self,
        addr: SocketAddr,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) -> Option<ConnectionId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients
            .insert(client_id, Connection::new(client_id, sender));
        Some(client_id)
    }

    /// Unregisters a socket, handing back the connection so the caller can
    /// release whatever player it was bound to.
    pub fn remove_client(&mut self, client_id: &ConnectionId) -> Option<Connection> {
        let client = self.clients.remove(client_id)?;
        info!("Client {} disconnected", client.id);
        Some(client)
    }

    /// Binds a connection to a lobby player.
    ///
    /// A connection holds at most one binding. Returns the binding this call
    /// replaced, if it was a different one, so the caller can mark that
    /// player as gone. Unknown connections are ignored.
    pub fn subscribe(
        &mut self,
        client_id: ConnectionId,
        code: &str,
        player_id: &str,
    ) -> Option<Subscription> {
        let client = self.clients.get_mut(&client_id)?;
        debug!("Client {} subscribed to {} as {}", client_id, code, player_id);

        let next = Subscription {
            code: code.to_string(),
            player_id: player_id.to_string(),
        };
        client
            .subscription
            .replace(next.clone())
            .filter(|previous| *previous != next)
    }

    /// Sends a private event to one connection.
    pub fn send_to(&self, client_id: ConnectionId, event: ServerEvent) -> bool {
        self.clients
            .get(&client_id)
            .is_some_and(|client| client.send(event))
    }

    /// Sends `event` to every subscriber of `code`.
    ///
    /// Returns how many queues accepted it. Subscribers whose writer task
    /// already exited are skipped; they get removed when their read loop
    /// notices the close.
    pub fn broadcast(&self, code: &str, event: &ServerEvent) -> usize {
        self.clients
            .values()
            .filter(|client| client.is_subscribed_to(code))
            .filter(|client| client.send(event.clone()))
            .count()
    }

    /// Whether any connection other than `client_id` is bound to this
    /// player. Used so a stale socket closing does not mark a reconnected
    /// player as disconnected.
    pub fn player_has_other_connection(
        &self,
        client_id: ConnectionId,
        code: &str,
        player_id: &str,
    ) -> bool {
        self.clients.values().any(|client| {
            client.id != client_id
                && client
                    .subscription
                    .as_ref()
                    .is_some_and(|s| s.code == code && s.player_id == player_id)
        })
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
