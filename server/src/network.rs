//! Server network layer handling UDP communications and event routing.
//!
//! A receiver task feeds every decoded intent into an mpsc queue; one
//! authoritative loop drains it, mutates the registry, and broadcasts the
//! resulting events to the per-lobby peer roster. A periodic sweep drops
//! timed-out peers and idle lobbies.

use crate::game::{AdvanceOutcome, RecordOutcome};
use crate::lobby::{LeaveOutcome, LobbyRegistry};
use crate::questions::QuestionSource;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::protocol::{ClientIntent, ServerEvent};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};
use tokio::time::interval;

/// Peers that stay silent this long are dropped from their room.
const PEER_TIMEOUT: Duration = Duration::from_secs(30);
/// Lobbies with no mutations for this long are garbage-collected.
const LOBBY_IDLE_TIMEOUT: Duration = Duration::from_secs(600);
const SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Messages sent from the network task to the main loop
#[derive(Debug)]
enum ServerMessage {
    PacketReceived {
        intent: ClientIntent,
        addr: SocketAddr,
    },
}

/// One client's transport presence inside a lobby room.
#[derive(Debug, Clone)]
struct Peer {
    player_id: String,
    player_name: String,
    addr: SocketAddr,
    last_seen: Instant,
}

/// Main server coordinating the socket, the registry, and broadcasts.
pub struct Server {
    socket: Arc<UdpSocket>,
    registry: Arc<Mutex<LobbyRegistry>>,
    questions: Arc<dyn QuestionSource + Send + Sync>,
    /// Lobby code → connected peers.
    rooms: HashMap<String, Vec<Peer>>,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        registry: Arc<Mutex<LobbyRegistry>>,
        questions: Arc<dyn QuestionSource + Send + Sync>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            registry,
            questions,
            rooms: HashMap::new(),
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Spawns the task that continuously listens for incoming packets
    async fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 8192];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(intent) = deserialize::<ClientIntent>(&buffer[0..len]) {
                            if server_tx
                                .send(ServerMessage::PacketReceived { intent, addr })
                                .is_err()
                            {
                                break;
                            }
                        } else {
                            warn!("Undecodable packet from {}", addr);
                        }
                    }
                    Err(err) => {
                        error!("Error receiving packet: {}", err);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver().await;

        let mut sweep = interval(SWEEP_INTERVAL);
        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { intent, addr }) => {
                            self.handle_intent(intent, addr).await;
                        }
                        None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = sweep.tick() => {
                    self.sweep().await;
                },
            }
        }
        Ok(())
    }

    async fn handle_intent(&mut self, intent: ClientIntent, addr: SocketAddr) {
        match intent {
            ClientIntent::Hello {
                player_id,
                player_name,
                lobby_code,
            } => {
                if !lobby_code.is_empty() {
                    self.register_peer(&lobby_code, &player_id, &player_name, addr);
                }
                self.send_event(&ServerEvent::Welcome, addr).await;
            }

            ClientIntent::JoinRoom {
                lobby_code,
                player_name,
                player_id,
            } => {
                let snapshot = {
                    let registry = self.registry.lock().await;
                    registry.snapshot(&lobby_code)
                };
                match snapshot {
                    Ok(snapshot) => {
                        self.register_peer(&lobby_code, &player_id, &player_name, addr);
                        self.broadcast(
                            &lobby_code,
                            &ServerEvent::PlayerJoined {
                                name: player_name.clone(),
                                id: player_id.clone(),
                            },
                            Some(&player_id),
                        )
                        .await;
                        self.broadcast(&lobby_code, &ServerEvent::LobbyUpdate(snapshot), None)
                            .await;
                    }
                    Err(err) => {
                        self.send_event(
                            &ServerEvent::Error {
                                message: err.to_string(),
                            },
                            addr,
                        )
                        .await;
                    }
                }
            }

            ClientIntent::LeaveRoom {
                lobby_code,
                player_name,
                player_id,
            } => {
                self.forget_peer(&lobby_code, &player_id);
                let outcome = {
                    let mut registry = self.registry.lock().await;
                    registry.leave(&lobby_code, &player_name)
                };
                match outcome {
                    Ok(LeaveOutcome::Left) => {
                        self.broadcast(
                            &lobby_code,
                            &ServerEvent::PlayerLeft {
                                name: player_name,
                                id: player_id,
                            },
                            None,
                        )
                        .await;
                        let snapshot = {
                            let registry = self.registry.lock().await;
                            registry.snapshot(&lobby_code)
                        };
                        if let Ok(snapshot) = snapshot {
                            self.broadcast(&lobby_code, &ServerEvent::LobbyUpdate(snapshot), None)
                                .await;
                        }
                    }
                    Ok(LeaveOutcome::Disbanded) => {
                        // Remaining clients discover the missing lobby on
                        // their next poll and bail out.
                        self.rooms.remove(&lobby_code);
                    }
                    Err(err) => debug!("Leave from {} failed: {}", player_name, err),
                }
            }

            ClientIntent::StartGame { lobby_code } => {
                let started = {
                    let mut registry = self.registry.lock().await;
                    let settings = match registry.snapshot(&lobby_code) {
                        Ok(snapshot) => snapshot.settings,
                        Err(err) => {
                            drop(registry);
                            self.send_event(
                                &ServerEvent::Error {
                                    message: err.to_string(),
                                },
                                addr,
                            )
                            .await;
                            return;
                        }
                    };
                    let questions = self.questions.generate(&settings);
                    registry.start_game(&lobby_code, questions)
                };
                match started {
                    Ok(first_question) => {
                        self.broadcast(
                            &lobby_code,
                            &ServerEvent::GameStarted {
                                lobby_code: lobby_code.clone(),
                            },
                            None,
                        )
                        .await;
                        self.broadcast(
                            &lobby_code,
                            &ServerEvent::NewQuestion {
                                index: 0,
                                question: first_question,
                            },
                            None,
                        )
                        .await;
                    }
                    Err(err) => {
                        self.send_event(
                            &ServerEvent::Error {
                                message: err.to_string(),
                            },
                            addr,
                        )
                        .await;
                    }
                }
            }

            ClientIntent::SubmitAnswer { lobby_code, answer } => {
                let (outcome, results) = {
                    let mut registry = self.registry.lock().await;
                    match registry.lobby_mut(&lobby_code) {
                        Ok(lobby) => {
                            let outcome = lobby.record_answer(&answer);
                            let results = lobby.results();
                            (outcome, results)
                        }
                        Err(err) => {
                            drop(registry);
                            self.send_event(
                                &ServerEvent::Error {
                                    message: err.to_string(),
                                },
                                addr,
                            )
                            .await;
                            return;
                        }
                    }
                };
                match outcome {
                    Ok(RecordOutcome::Recorded {
                        all_answered,
                        last_question,
                    }) => {
                        self.broadcast(&lobby_code, &ServerEvent::PlayerAnswered(answer), None)
                            .await;
                        if all_answered {
                            self.broadcast(&lobby_code, &ServerEvent::AllAnswersIn, None)
                                .await;
                        }
                        if all_answered && last_question {
                            self.broadcast(&lobby_code, &ServerEvent::GameOver(results), None)
                                .await;
                        }
                    }
                    // At-least-once delivery: silently drop redeliveries
                    Ok(RecordOutcome::Duplicate) => {}
                    Err(err) => debug!("Answer for {} rejected: {}", lobby_code, err),
                }
            }

            ClientIntent::RequestNextQuestion { lobby_code } => {
                let (advanced, results) = {
                    let mut registry = self.registry.lock().await;
                    match registry.lobby_mut(&lobby_code) {
                        Ok(lobby) => match lobby.game.as_mut() {
                            Some(game) => {
                                let advanced = game.advance();
                                (advanced, lobby.results())
                            }
                            None => return,
                        },
                        Err(_) => return,
                    }
                };
                match advanced {
                    AdvanceOutcome::Next { index, question } => {
                        self.broadcast(
                            &lobby_code,
                            &ServerEvent::NewQuestion { index, question },
                            None,
                        )
                        .await;
                    }
                    AdvanceOutcome::Finished => {
                        // Redundant for clients that saw the first
                        // game_over; they deduplicate.
                        self.broadcast(&lobby_code, &ServerEvent::GameOver(results), None)
                            .await;
                    }
                    AdvanceOutcome::Pending => {}
                }
            }

            ClientIntent::FetchLobby { lobby_code } => {
                let snapshot = {
                    let registry = self.registry.lock().await;
                    registry.snapshot(&lobby_code)
                };
                match snapshot {
                    Ok(snapshot) => {
                        self.send_event(&ServerEvent::LobbyUpdate(snapshot), addr)
                            .await
                    }
                    Err(err) => {
                        self.send_event(
                            &ServerEvent::Error {
                                message: err.to_string(),
                            },
                            addr,
                        )
                        .await;
                    }
                }
            }
        }
    }

    /// Adds or refreshes a peer's address inside its room.
    fn register_peer(&mut self, lobby_code: &str, player_id: &str, player_name: &str, addr: SocketAddr) {
        let peers = self.rooms.entry(lobby_code.to_string()).or_default();
        if let Some(peer) = peers.iter_mut().find(|p| p.player_id == player_id) {
            peer.addr = addr;
            peer.last_seen = Instant::now();
            return;
        }
        peers.push(Peer {
            player_id: player_id.to_string(),
            player_name: player_name.to_string(),
            addr,
            last_seen: Instant::now(),
        });
    }

    fn forget_peer(&mut self, lobby_code: &str, player_id: &str) {
        if let Some(peers) = self.rooms.get_mut(lobby_code) {
            peers.retain(|p| p.player_id != player_id);
            if peers.is_empty() {
                self.rooms.remove(lobby_code);
            }
        }
    }

    async fn send_event(&self, event: &ServerEvent, addr: SocketAddr) {
        match serialize(event) {
            Ok(bytes) => {
                if let Err(err) = self.socket.send_to(&bytes, addr).await {
                    debug!("Send to {} failed: {}", addr, err);
                }
            }
            Err(err) => error!("Could not serialize event: {}", err),
        }
    }

    /// Sends an event to every peer in a lobby room, optionally skipping
    /// the originating player.
    async fn broadcast(&self, lobby_code: &str, event: &ServerEvent, exclude: Option<&str>) {
        let Some(peers) = self.rooms.get(lobby_code) else {
            return;
        };
        for peer in peers {
            if exclude == Some(peer.player_id.as_str()) {
                continue;
            }
            self.send_event(event, peer.addr).await;
        }
    }

    /// Drops timed-out peers and idle lobbies.
    async fn sweep(&mut self) {
        for (code, peers) in self.rooms.iter_mut() {
            peers.retain(|peer| {
                let live = peer.last_seen.elapsed() <= PEER_TIMEOUT;
                if !live {
                    debug!("Dropping silent peer {} from room {}", peer.player_name, code);
                }
                live
            });
        }
        self.rooms.retain(|_, peers| !peers.is_empty());

        let expired = {
            let mut registry = self.registry.lock().await;
            registry.sweep_idle(LOBBY_IDLE_TIMEOUT)
        };
        for code in expired {
            self.rooms.remove(&code);
        }
    }
}
