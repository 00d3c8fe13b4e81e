//! # Reflex Rush Server Library
//!
//! This library provides the authoritative server for a multiplayer reaction
//! game. Players register a username, gather in a waiting room, and compete
//! in short timed rounds; the server owns every clock reading and every
//! verdict, and keeps a leaderboard of average reaction times.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Judging
//! Clients only report that they clicked (and where). The server decides
//! whether a click was early, late, on target or off, using its own
//! timestamps. Client-reported times are only trusted after correcting for
//! the offset between the client's clock and the server's.
//!
//! ### Session Management
//! A single session tracks registered players, their ready flags and
//! statistics, and at most one running round. Rounds start when every player
//! is ready and end when their timeline runs out or when the round decides it
//! is finished early (for example, everyone has clicked).
//!
//! ### Event Broadcasting
//! Round starts and ends are published on a channel and forwarded by the
//! network layer to every client in the waiting room.
//!
//! ## Module Organization
//!
//! ### Rounds Module (`rounds`)
//! The `Round` trait and its five variants:
//! - Color change: click as soon as the screen turns green
//! - Brightness: click when a ramp matches a target level
//! - Click box: hit a box that appears at a random position
//! - Double trouble: hit the green box, not the red one
//! - Tic-tac-toe: find the single winning move on a board
//!
//! ### Players Module (`players`)
//! Username registry, ready flags, running averages and the leaderboard.
//!
//! ### Game Module (`game`)
//! The `GameManager` session handle: round lifecycle, click routing and the
//! at-most-once round end.
//!
//! ### Client Manager Module (`client_manager`)
//! Connection tracking, capacity limits, timeouts and waiting-room membership.
//!
//! ### Network Module (`network`)
//! UDP socket handling and packet dispatch between clients and the session.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new("127.0.0.1:8080", ServerConfig::default()).await?;
//!
//!     // Runs until shut down:
//!     // - Accepts connections and registrations
//!     // - Starts rounds once everyone in the waiting room is ready
//!     // - Judges clicks and broadcasts round results
//!     // - Drops clients that stop sending heartbeats
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! The server uses an event-driven architecture with internal async tasks that handle:
//! - **Network Receiver**: Continuously listens for incoming packets
//! - **Network Sender**: Processes outgoing packet queue and broadcasts
//! - **Timeout Checker**: Monitors client health and removes inactive connections
//! - **Round Timelines**: One task per round sleeping through its stimulus schedule
//! - **Main Loop**: Dispatches packets to the session and forwards its events

pub mod client_manager;
pub mod game;
pub mod network;
pub mod players;
pub mod rounds;
pub mod utils;
