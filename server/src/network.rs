//! Server network layer handling UDP communications and session coordination

use crate::client_manager::{Audience, ClientManager};
use crate::game::{GameEvent, GameManager};
use crate::rounds::RoundKind;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, PlayerId, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client_id: PlayerId },
    Shutdown,
}

/// Messages sent from the main loop to the sender task
#[derive(Debug)]
pub enum OutboundMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    BroadcastPacket {
        packet: Packet,
        audience: Audience,
    },
}

/// Runtime settings for [`Server`]
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub max_clients: usize,
    /// Silence after which a connection is dropped
    pub client_timeout: Duration,
    /// Round kinds to draw from; empty means all
    pub round_kinds: Vec<RoundKind>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_clients: 32,
            client_timeout: Duration::from_secs(10),
            round_kinds: RoundKind::ALL.to_vec(),
        }
    }
}

/// Main server coordinating networking and the game session
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    game: GameManager,
    client_timeout: Duration,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    outbound_tx: mpsc::UnboundedSender<OutboundMessage>,
    outbound_rx: mpsc::UnboundedReceiver<OutboundMessage>,
    game_events: mpsc::UnboundedReceiver<GameEvent>,
}

impl Server {
    pub async fn new(addr: &str, config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (game, game_events) = GameManager::new(config.round_kinds);

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(config.max_clients))),
            game,
            client_timeout: config.client_timeout,
            server_tx,
            server_rx,
            outbound_tx,
            outbound_rx,
            game_events,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Handle to the game session this server drives
    pub fn game(&self) -> GameManager {
        self.game.clone()
    }

    /// Sender that can stop the main loop with [`ServerMessage::Shutdown`]
    pub fn control(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; 65536];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut outbound_rx =
            std::mem::replace(&mut self.outbound_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                match message {
                    OutboundMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    OutboundMessage::BroadcastPacket { packet, audience } => {
                        let client_addrs = {
                            let clients_guard = clients.read().await;
                            clients_guard.get_client_addrs(audience)
                        };

                        for (client_id, addr) in client_addrs {
                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();
        let timeout = self.client_timeout;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts(timeout)
                };

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self
            .outbound_tx
            .send(OutboundMessage::SendPacket { packet, addr })
        {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn broadcast_packet(&self, packet: Packet, audience: Audience) {
        if let Err(e) = self
            .outbound_tx
            .send(OutboundMessage::BroadcastPacket { packet, audience })
        {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    async fn broadcast_player_count(&self) {
        let count = self.game.player_count().await;
        self.broadcast_packet(Packet::PlayerCount { count }, Audience::All);
    }

    /// Drops a departed connection's player from the session
    async fn drop_player(&self, client_id: PlayerId) {
        if self.game.disconnect(client_id).await {
            info!("Player {} left the session", client_id);
            self.broadcast_player_count().await;
        }
    }

    /// Processes an incoming packet from `addr`
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        let client_id = {
            let mut clients = self.clients.write().await;
            let client_id = clients.find_client_by_addr(addr);
            if let Some(id) = client_id {
                clients.touch(id);
            }
            client_id
        };

        match packet {
            Packet::Connect { client_version } => {
                info!(
                    "Client connecting from {} (version: {})",
                    addr, client_version
                );

                if client_version != PROTOCOL_VERSION {
                    self.send_packet(
                        Packet::Disconnected {
                            reason: "Protocol version mismatch".to_string(),
                        },
                        addr,
                    );
                    return;
                }

                // Remove existing connection if present
                if let Some(existing_id) = client_id {
                    info!("Removing existing client {} from {}", existing_id, addr);
                    self.clients.write().await.remove_client(existing_id);
                    self.drop_player(existing_id).await;
                }

                let new_id = self.clients.write().await.add_client(addr);
                let response = match new_id {
                    Some(client_id) => Packet::Connected { client_id },
                    None => Packet::Disconnected {
                        reason: "Server full".to_string(),
                    },
                };
                self.send_packet(response, addr);
            }

            Packet::StatusRequest => {
                let status = self.game.status().await;
                self.send_packet(Packet::Status(status), addr);
            }

            Packet::Register { username } => {
                let Some(client_id) = client_id else {
                    warn!("Register from unconnected address {}", addr);
                    return;
                };

                let registration = self.game.register(client_id, &username).await;
                if let Some(evicted) = registration.evicted {
                    info!(
                        "Player {} evicted by {} re-registering '{}'",
                        evicted, client_id, registration.username
                    );
                }

                let success = registration.success;
                self.send_packet(
                    Packet::RegistrationStatus {
                        success,
                        player_id: registration.player_id,
                        username: registration.username,
                        game_state: registration.game_state,
                        round_in_progress: registration.round_in_progress,
                    },
                    addr,
                );

                if success {
                    self.clients.write().await.join_waiting_room(client_id);
                    self.broadcast_player_count().await;
                }
            }

            Packet::JoinWaitingRoom => {
                let Some(client_id) = client_id else {
                    warn!("JoinWaitingRoom from unconnected address {}", addr);
                    return;
                };

                self.clients.write().await.join_waiting_room(client_id);
                if self.game.join_waiting_room(client_id).await {
                    debug!("Player {} completed the waiting room", client_id);
                }
            }

            Packet::Click { payload } => {
                let Some(client_id) = client_id else {
                    warn!("Click from unconnected address {}", addr);
                    return;
                };

                let result = self.game.process_click(client_id, &payload).await;
                self.send_packet(Packet::ClickResult { result }, addr);
            }

            Packet::Heartbeat => {
                if client_id.is_none() {
                    debug!("Heartbeat from unconnected address {}", addr);
                }
            }

            Packet::Disconnect => {
                if let Some(client_id) = client_id {
                    self.clients.write().await.remove_client(client_id);
                    self.drop_player(client_id).await;
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Forwards a session event to the waiting room
    fn handle_game_event(&self, event: GameEvent) {
        let packet = match event {
            GameEvent::RoundStart {
                round_type,
                round_data,
            } => Packet::RoundStart {
                round_type,
                round_data,
            },
            GameEvent::RoundEnd {
                results,
                leaderboard,
            } => Packet::RoundEnd {
                results,
                leaderboard,
            },
        };
        self.broadcast_packet(packet, Audience::WaitingRoom);
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        // Initialize concurrent tasks
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        info!(
            "Server started successfully with rounds: {:?}",
            self.game.round_kinds()
        );

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            info!("Client {} timed out", client_id);
                            self.drop_player(client_id).await;
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                Some(event) = self.game_events.recv() => {
                    self.handle_game_event(event);
                },
            }
        }

        Ok(())
    }
}
