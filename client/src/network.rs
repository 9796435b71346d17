//! Network driver.
//!
//! Owns the UDP transport, the channel adapter, and both state machines,
//! and serializes everything — inbound datagrams, UI commands, timer
//! ticks, poll completions — through one `select!` loop. No other task
//! ever touches client state.
//!
//! Connection handling mirrors the transport contract: a handshake
//! (`Hello` → `Welcome`) establishes the logical connection, reconnects
//! retry a bounded number of times, and while the channel is down the lobby
//! polling fallback keeps the view fresh.

use crate::api::LobbyApi;
use crate::channel::{ChannelEvent, EventChannel};
use crate::effect::{ApiCall, Effect, Notice};
use crate::lobby::{Identity, LobbySync, SnapshotSource};
use crate::quiz::QuizMachine;
use crate::storage::{SessionSnapshot, SessionStore};
use log::{debug, info, warn};
use shared::api::ApiError;
use shared::protocol::{ClientIntent, ServerEvent};
use shared::{
    SettingsPatch, MAX_RECONNECT_ATTEMPTS, POLL_INTERVAL_SECS, RECONNECT_DELAY_SECS,
};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::interval;

/// No inbound traffic for this long triggers a handshake probe.
const PROBE_AFTER: Duration = Duration::from_secs(5);
/// No inbound traffic for this long marks the channel disconnected.
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(15);

/// UI-driven intents, serialized into the driver loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    ToggleReady,
    UpdateSettings(SettingsPatch),
    StartGame,
    SelectAnswer(String),
    SetAvatar(String),
    Leave,
}

/// Cheap cloneable handle the embedding UI uses to drive the client.
#[derive(Clone)]
pub struct SyncHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl SyncHandle {
    pub fn toggle_ready(&self) {
        let _ = self.commands.send(Command::ToggleReady);
    }

    pub fn update_settings(&self, patch: SettingsPatch) {
        let _ = self.commands.send(Command::UpdateSettings(patch));
    }

    pub fn start_game(&self) {
        let _ = self.commands.send(Command::StartGame);
    }

    pub fn select_answer(&self, letter: &str) {
        let _ = self.commands.send(Command::SelectAnswer(letter.to_string()));
    }

    pub fn set_avatar(&self, avatar: &str) {
        let _ = self.commands.send(Command::SetAvatar(avatar.to_string()));
    }

    pub fn leave(&self) {
        let _ = self.commands.send(Command::Leave);
    }
}

pub struct SyncClient<A: LobbyApi> {
    socket: UdpSocket,
    api: A,
    store: SessionStore,
    session: SessionSnapshot,

    channel: EventChannel,
    lobby: LobbySync,
    quiz: Option<QuizMachine>,

    commands: mpsc::UnboundedReceiver<Command>,
    notices: mpsc::UnboundedSender<Notice>,

    last_inbound: Instant,
    reconnect_attempts: u32,
    exhaustion_reported: bool,
    shutting_down: bool,
}

impl<A: LobbyApi> SyncClient<A> {
    /// Binds the transport and assembles the driver around an established
    /// session (see `api::create_session` / `api::join_session`).
    pub async fn connect(
        server_addr: &str,
        api: A,
        store: SessionStore,
        session: SessionSnapshot,
    ) -> Result<
        (Self, SyncHandle, mpsc::UnboundedReceiver<Notice>),
        Box<dyn std::error::Error>,
    > {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(server_addr).await?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();

        let identity = Identity {
            player_id: session.player_id.clone(),
            player_name: session.player_name.clone(),
            is_host: session.is_host,
        };
        let lobby = LobbySync::new(&session.lobby_code, identity);

        let client = Self {
            socket,
            api,
            store,
            session,
            channel: EventChannel::new(),
            lobby,
            quiz: None,
            commands: command_rx,
            notices: notice_tx,
            last_inbound: Instant::now(),
            reconnect_attempts: 0,
            exhaustion_reported: false,
            shutting_down: false,
        };
        let handle = SyncHandle {
            commands: command_tx,
        };
        Ok((client, handle, notice_rx))
    }

    /// Direct access to the channel adapter so the embedding UI can
    /// register its own topic subscriptions before `run` starts.
    pub fn channel_mut(&mut self) -> &mut EventChannel {
        &mut self.channel
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!(
            "Joining lobby {} as {}",
            self.session.lobby_code, self.session.player_name
        );
        let hello = self.hello_intent();
        self.send_intent(&hello).await;
        let join_effects = self.lobby.join();
        self.apply_effects(join_effects).await;

        let mut fine_tick = interval(Duration::from_millis(100));
        let mut coarse_tick = interval(Duration::from_secs(1));
        let mut poll_tick = interval(Duration::from_secs(POLL_INTERVAL_SECS));
        let mut reconnect_tick = interval(Duration::from_secs(RECONNECT_DELAY_SECS));
        let mut buffer = [0u8; 8192];

        while !self.shutting_down {
            tokio::select! {
                result = self.socket.recv(&mut buffer) => {
                    match result {
                        Ok(len) => match bincode::deserialize::<ServerEvent>(&buffer[..len]) {
                            Ok(event) => self.handle_event(event).await,
                            Err(err) => warn!("Undecodable server event: {}", err),
                        },
                        Err(err) => {
                            debug!("Socket receive error: {}", err);
                            self.mark_disconnected();
                        }
                    }
                },

                command = self.commands.recv() => {
                    match command {
                        Some(command) => self.handle_command(command).await,
                        None => {
                            // Every handle dropped: tear down and stop
                            self.teardown().await;
                        }
                    }
                },

                _ = fine_tick.tick() => {
                    if let Some(quiz) = self.quiz.as_mut() {
                        let effects = quiz.tick(0.1);
                        self.apply_effects(effects).await;
                    }
                },

                _ = coarse_tick.tick() => {
                    if let Some(quiz) = self.quiz.as_mut() {
                        let effects = quiz.tick_pause(1.0);
                        self.apply_effects(effects).await;
                    }
                    self.check_connection_health().await;
                },

                _ = poll_tick.tick() => {
                    self.poll_fallback().await;
                },

                _ = reconnect_tick.tick() => {
                    self.try_reconnect().await;
                },
            }
        }
        Ok(())
    }

    fn hello_intent(&self) -> ClientIntent {
        ClientIntent::Hello {
            player_id: self.session.player_id.clone(),
            player_name: self.session.player_name.clone(),
            lobby_code: self.session.lobby_code.clone(),
        }
    }

    async fn handle_event(&mut self, event: ServerEvent) {
        self.last_inbound = Instant::now();

        if matches!(event, ServerEvent::Welcome) {
            self.reconnect_attempts = 0;
            self.exhaustion_reported = false;
            self.channel.set_connected(true);
            self.flush_outbox().await;
        }

        let now = Instant::now();
        let lobby_effects = self.lobby.handle_event(&event, now);
        let lobby_surfaced_error =
            matches!(event, ServerEvent::Error { .. }) && !lobby_effects.is_empty();
        self.apply_effects(lobby_effects).await;

        if self.lobby.game_started() && self.quiz.is_none() {
            self.enter_quiz().await;
        }

        if let Some(quiz) = self.quiz.as_mut() {
            let effects = quiz.handle_event(&event);
            self.apply_effects(effects).await;
        } else if let ServerEvent::Error { message } = &event {
            // Not in a quiz and not a join rejection: lobby-level errors
            // go straight to the user
            if !lobby_surfaced_error {
                let _ = self.notices.send(Notice::GameError {
                    message: message.clone(),
                });
            }
        }

        // External subscribers observe every event last, after the
        // machines have settled the new state.
        self.channel.dispatch(&ChannelEvent::Message(event));
        self.flush_outbox().await;
    }

    async fn handle_command(&mut self, command: Command) {
        let effects = match command {
            Command::ToggleReady => self.lobby.toggle_ready(),
            Command::UpdateSettings(patch) => self.lobby.update_settings(&patch),
            Command::StartGame => self.lobby.start_game(),
            Command::SetAvatar(avatar) => self.lobby.set_avatar(&avatar),
            Command::SelectAnswer(letter) => match self.quiz.as_mut() {
                Some(quiz) => quiz.select_answer(&letter),
                None => Vec::new(),
            },
            Command::Leave => {
                self.teardown().await;
                return;
            }
        };
        self.apply_effects(effects).await;
    }

    /// Fetches the question set and roster, then moves into the quiz.
    async fn enter_quiz(&mut self) {
        match self.api.game_state(&self.session.lobby_code).await {
            Ok(view) => {
                let mut quiz = QuizMachine::new(
                    &self.session.lobby_code,
                    &self.session.player_id,
                    &self.session.player_name,
                    view.settings,
                );
                let effects = quiz.begin(view.questions, view.players, view.current_question);
                self.quiz = Some(quiz);
                self.apply_effects(effects).await;
                info!("Entered quiz for lobby {}", self.session.lobby_code);
            }
            Err(err) => {
                // Stay in Loading; the pushed NewQuestion events still
                // drive the machine forward.
                warn!("Could not fetch game state: {}", err);
                let settings = self.lobby.settings().cloned().unwrap_or_default();
                self.quiz = Some(QuizMachine::new(
                    &self.session.lobby_code,
                    &self.session.player_id,
                    &self.session.player_name,
                    settings,
                ));
            }
        }
    }

    async fn apply_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Send(intent) => self.channel.emit(intent),
                Effect::Api(call) => self.run_api_call(call).await,
                Effect::PersistResults(results) => {
                    if let Err(err) = self
                        .store
                        .save_results(&self.session.lobby_code, &results)
                    {
                        warn!("Could not persist game results: {}", err);
                    }
                }
                Effect::Notify(notice) => {
                    let _ = self.notices.send(notice);
                }
            }
        }
        self.flush_outbox().await;
    }

    /// Background API calls: failures are logged and dropped, the next
    /// authoritative snapshot repairs any divergence.
    async fn run_api_call(&mut self, call: ApiCall) {
        let result = match &call {
            ApiCall::ToggleReady {
                lobby_code,
                player_name,
                ready,
            } => self.api.toggle_ready(lobby_code, player_name, *ready).await,
            ApiCall::UpdateSettings {
                lobby_code,
                settings,
            } => self.api.update_settings(lobby_code, settings).await,
            ApiCall::UpdateAvatar {
                lobby_code,
                player_name,
                avatar,
            } => {
                self.api
                    .update_avatar(lobby_code, player_name, avatar)
                    .await
            }
            ApiCall::LeaveLobby {
                lobby_code,
                player_name,
            } => self.api.leave_lobby(lobby_code, player_name).await,
        };
        if let Err(err) = result {
            warn!("Background API call {:?} failed: {}", call, err);
        }
    }

    async fn flush_outbox(&mut self) {
        if !self.channel.is_connected() {
            return;
        }
        for intent in self.channel.take_outbox() {
            self.send_intent(&intent).await;
        }
    }

    async fn send_intent(&self, intent: &ClientIntent) {
        match bincode::serialize(intent) {
            Ok(bytes) => {
                if let Err(err) = self.socket.send(&bytes).await {
                    debug!("Send failed: {}", err);
                }
            }
            Err(err) => warn!("Could not serialize intent: {}", err),
        }
    }

    async fn poll_fallback(&mut self) {
        let now = Instant::now();
        if !self.lobby.should_poll(now, self.channel.is_connected()) {
            return;
        }
        match self.api.lobby_info(&self.session.lobby_code).await {
            Ok(snapshot) => {
                let applied =
                    self.lobby
                        .apply_snapshot(SnapshotSource::Poll, snapshot, Instant::now());
                if applied && self.lobby.game_started() && self.quiz.is_none() {
                    self.enter_quiz().await;
                }
            }
            Err(ApiError::NotFound) => {
                // The lobby vanished server-side; redirect the user out
                let _ = self.notices.send(Notice::LobbyGone);
                self.teardown().await;
            }
            Err(err) => debug!("Lobby poll failed: {}", err),
        }
    }

    async fn try_reconnect(&mut self) {
        if self.channel.is_connected() {
            return;
        }
        if self.reconnect_attempts >= MAX_RECONNECT_ATTEMPTS {
            if !self.exhaustion_reported {
                self.exhaustion_reported = true;
                warn!("Reconnect attempts exhausted");
                let _ = self.notices.send(Notice::ConnectionLost);
            }
            return;
        }
        self.reconnect_attempts += 1;
        debug!(
            "Reconnect attempt {}/{}",
            self.reconnect_attempts, MAX_RECONNECT_ATTEMPTS
        );
        let hello = self.hello_intent();
        self.send_intent(&hello).await;
    }

    /// Probes a quiet connection and declares it dead after the timeout;
    /// the Welcome reply to a probe refreshes `last_inbound`.
    async fn check_connection_health(&mut self) {
        if !self.channel.is_connected() {
            return;
        }
        let silent_for = self.last_inbound.elapsed();
        if silent_for >= CONNECTION_TIMEOUT {
            info!("No traffic for {:?}, reconnecting", silent_for);
            self.mark_disconnected();
        } else if silent_for >= PROBE_AFTER {
            let hello = self.hello_intent();
            self.send_intent(&hello).await;
        }
    }

    fn mark_disconnected(&mut self) {
        self.channel.set_connected(false);
        self.reconnect_attempts = 0;
        self.exhaustion_reported = false;
    }

    /// Single teardown path: leaves the room, clears the persisted
    /// session, drops all subscriptions and timers. Nothing can mutate
    /// state after this.
    async fn teardown(&mut self) {
        if self.shutting_down {
            return;
        }
        self.shutting_down = true;

        let effects = self.lobby.teardown();
        for effect in effects {
            match effect {
                // Best-effort farewell even if the handshake is down
                Effect::Send(intent) => self.send_intent(&intent).await,
                Effect::Api(call) => self.run_api_call(call).await,
                other => debug!("Dropping teardown effect {:?}", other),
            }
        }
        if let Some(quiz) = self.quiz.as_mut() {
            quiz.teardown();
        }
        if let Err(err) = self.store.clear() {
            warn!("Could not clear session store: {}", err);
        }
        self.channel.clear();
        info!("Left lobby {}", self.session.lobby_code);
    }
}
