//! Headless bot that plays every round with a plausible click
//!
//! Useful for load testing and for exercising the server without a UI:
//! `RUST_LOG=info cargo run --bin test_client -- --username bot1`

use bincode::{deserialize, serialize};
use clap::Parser;
use log::{debug, error, info, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use server::rounds::tic_tac_toe::unique_winning_move;
use shared::{
    timestamp_secs, Board, BoardCell, ClickPayload, ClickPosition, Packet, Point, RoundData,
    PROTOCOL_VERSION,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{interval, sleep, timeout};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Username to register
    #[arg(short, long, default_value = "bot")]
    username: String,

    /// Fastest simulated reaction in milliseconds
    #[arg(long, default_value = "180")]
    min_reaction_ms: u64,

    /// Slowest simulated reaction in milliseconds
    #[arg(long, default_value = "600")]
    max_reaction_ms: u64,

    /// Probability of picking the right target when there is a wrong one
    #[arg(short, long, default_value = "0.8")]
    accuracy: f64,
}

/// What the bot does in response to a round
struct PlannedClick {
    after: Duration,
    position: Option<ClickPosition>,
}

impl Args {
    fn reaction<R: Rng>(&self, rng: &mut R) -> f64 {
        let max = self.max_reaction_ms.max(self.min_reaction_ms);
        rng.gen_range(self.min_reaction_ms..=max) as f64 / 1000.0
    }

    fn plan(&self, round_data: &RoundData) -> PlannedClick {
        let mut rng = rand::thread_rng();
        let reaction = self.reaction(&mut rng);
        let hit = rng.gen_bool(self.accuracy.clamp(0.0, 1.0));

        let (wait, position) = match round_data {
            RoundData::ColorChange { .. } => {
                // The color flip is random; guess at the midpoint of its range
                (4.5 + reaction, None)
            }
            RoundData::Brightness {
                target_brightness,
                initial_pause,
                brightness_duration,
                ..
            } => {
                let on_target = *target_brightness as f64 / 100.0 * brightness_duration;
                let jitter = rng.gen_range(-0.15..0.15);
                (initial_pause + on_target + jitter, None)
            }
            RoundData::ClickBox {
                delay, position, ..
            } => (delay + reaction, Some(ClickPosition::Point(*position))),
            RoundData::DoubleTrouble {
                delay,
                good_position,
                bad_position,
                ..
            } => {
                let target: Point = if hit { *good_position } else { *bad_position };
                (delay + reaction, Some(ClickPosition::Point(target)))
            }
            RoundData::TicTacToe { delay, board, .. } => {
                let cell = if hit {
                    unique_winning_move(board)
                } else {
                    random_empty_cell(board, &mut rng)
                };
                (delay + reaction, cell.map(ClickPosition::Cell))
            }
        };

        PlannedClick {
            after: Duration::from_secs_f64(wait.max(0.0)),
            position,
        }
    }
}

fn random_empty_cell<R: Rng>(board: &Board, rng: &mut R) -> Option<BoardCell> {
    let empty: Vec<BoardCell> = (0..3u8)
        .flat_map(|row| (0..3u8).map(move |col| BoardCell { row, col }))
        .filter(|cell| board[cell.row as usize][cell.col as usize].is_none())
        .collect();
    empty.choose(rng).copied()
}

async fn send(
    socket: &UdpSocket,
    packet: &Packet,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = serialize(packet)?;
    socket.send_to(&data, addr).await?;
    Ok(())
}

/// Sends a click after the planned delay without blocking the receive loop
fn schedule_click(socket: Arc<UdpSocket>, server_addr: SocketAddr, plan: PlannedClick) {
    tokio::spawn(async move {
        sleep(plan.after).await;

        let now = timestamp_secs();
        let mut payload = ClickPayload::at(now, now);
        if let Some(position) = plan.position {
            payload = payload.with_position(position);
        }

        let packet = Packet::Click { payload };
        match serialize(&packet) {
            Ok(data) => {
                if let Err(e) = socket.send_to(&data, server_addr).await {
                    error!("Failed to send click: {}", e);
                }
            }
            Err(e) => error!("Failed to encode click: {}", e),
        }
    });
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let server_addr: SocketAddr = args.server.parse()?;

    let socket = Arc::new(UdpSocket::bind("0.0.0.0:0").await?);
    info!("Bot socket bound to {}", socket.local_addr()?);

    send(
        &socket,
        &Packet::Connect {
            client_version: PROTOCOL_VERSION,
        },
        server_addr,
    )
    .await?;

    let mut buffer = vec![0u8; 65536];
    let (len, _) = timeout(Duration::from_secs(5), socket.recv_from(&mut buffer)).await??;
    match deserialize::<Packet>(&buffer[0..len])? {
        Packet::Connected { client_id } => info!("Connected with client ID {}", client_id),
        Packet::Disconnected { reason } => {
            warn!("Connection refused: {}", reason);
            return Ok(());
        }
        other => {
            warn!("Unexpected handshake reply: {:?}", other);
            return Ok(());
        }
    }

    send(
        &socket,
        &Packet::Register {
            username: args.username.clone(),
        },
        server_addr,
    )
    .await?;

    let mut heartbeat = interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            received = socket.recv_from(&mut buffer) => {
                let (len, _) = match received {
                    Ok(received) => received,
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        continue;
                    }
                };

                let packet = match deserialize::<Packet>(&buffer[0..len]) {
                    Ok(packet) => packet,
                    Err(e) => {
                        warn!("Failed to deserialize packet: {}", e);
                        continue;
                    }
                };

                match packet {
                    Packet::RegistrationStatus { success, username, round_in_progress, .. } => {
                        if !success {
                            warn!("Registration as '{}' rejected", args.username);
                            break;
                        }
                        info!("Registered as {} (round in progress: {})", username, round_in_progress);
                        send(&socket, &Packet::JoinWaitingRoom, server_addr).await?;
                    }
                    Packet::PlayerCount { count } => debug!("{} players online", count),
                    Packet::RoundStart { round_type, round_data } => {
                        info!("Round started: {}", round_type);
                        schedule_click(Arc::clone(&socket), server_addr, args.plan(&round_data));
                    }
                    Packet::ClickResult { result } => {
                        info!("{}: {}", result.status.as_str(), result.message);
                    }
                    Packet::RoundEnd { leaderboard, .. } => {
                        if let Some(leader) = leaderboard.first() {
                            info!("Round over; leader {} at {:.3}s", leader.username, leader.avg_time);
                        }
                        send(&socket, &Packet::JoinWaitingRoom, server_addr).await?;
                    }
                    Packet::Disconnected { reason } => {
                        warn!("Disconnected by server: {}", reason);
                        break;
                    }
                    other => debug!("Ignoring packet: {:?}", other),
                }
            }

            _ = heartbeat.tick() => {
                send(&socket, &Packet::Heartbeat, server_addr).await?;
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down bot");
                send(&socket, &Packet::Disconnect, server_addr).await?;
                break;
            }
        }
    }

    Ok(())
}
