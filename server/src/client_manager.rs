//! Connection tracking for the game server
//!
//! This module keeps the transport-level view of who is connected:
//! - Connection lifecycle (connect, disconnect, timeout)
//! - Capacity enforcement and address lookup for incoming datagrams
//! - Waiting room membership, which decides who receives round broadcasts
//!
//! Player identity and scores live in the game session; a connection only
//! becomes a player once it registers a username.

use log::info;
use shared::PlayerId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Which connections a broadcast is meant for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Every connected client
    All,
    /// Only clients that joined the waiting room
    WaitingRoom,
}

/// A connected client
#[derive(Debug)]
pub struct Connection {
    /// Identifier assigned by the server, reused as the player id
    pub id: PlayerId,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
    /// Whether the client has joined the waiting room
    pub in_waiting_room: bool,
}

impl Connection {
    pub fn new(id: PlayerId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            in_waiting_room: false,
        }
    }

    /// Returns true if nothing was heard from the client within `timeout`
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all client connections
///
/// Enforces the server's capacity limit and maps datagram source addresses
/// back to connection ids.
pub struct ClientManager {
    /// Connected clients indexed by their unique ID
    clients: HashMap<PlayerId, Connection>,
    /// Next available client ID for new connections
    next_client_id: PlayerId,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
}

impl ClientManager {
    /// Creates a new client manager with the specified capacity limit
    ///
    /// Client IDs start from 1 and increment for each new connection.
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Attempts to add a new client connection
    ///
    /// Returns Some(client_id) if successful, None if server is at capacity.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<PlayerId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, Connection::new(client_id, addr));

        Some(client_id)
    }

    /// Removes a client; returns false if they were already gone
    pub fn remove_client(&mut self, client_id: PlayerId) -> bool {
        if let Some(client) = self.clients.remove(&client_id) {
            info!("Client {} disconnected", client.id);
            true
        } else {
            false
        }
    }

    /// Finds a client ID by their network address
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<PlayerId> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn get(&self, client_id: PlayerId) -> Option<&Connection> {
        self.clients.get(&client_id)
    }

    /// Refreshes the client's activity timestamp
    pub fn touch(&mut self, client_id: PlayerId) -> bool {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.last_seen = Instant::now();
            true
        } else {
            false
        }
    }

    /// Adds the client to the waiting room broadcast group
    pub fn join_waiting_room(&mut self, client_id: PlayerId) -> bool {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.in_waiting_room = true;
            true
        } else {
            false
        }
    }

    /// Checks for and removes timed-out clients
    ///
    /// Returns the removed client IDs so the game session can drop the
    /// matching players.
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<PlayerId> {
        let timed_out: Vec<PlayerId> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        for client_id in &timed_out {
            self.remove_client(*client_id);
        }

        timed_out
    }

    /// Gets the IDs and addresses of every client in `audience`
    pub fn get_client_addrs(&self, audience: Audience) -> Vec<(PlayerId, SocketAddr)> {
        self.clients
            .values()
            .filter(|client| match audience {
                Audience::All => true,
                Audience::WaitingRoom => client.in_waiting_room,
            })
            .map(|client| (client.id, client.addr))
            .collect()
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
