//! Lobby registry and lifecycle management.
//!
//! This module handles the server side of lobby membership:
//! - Lobby creation with short human-shareable codes
//! - Joins with the full conflict taxonomy (not found, name taken,
//!   already started, full)
//! - Ready flags, settings and avatar updates, host-leave disbanding
//! - Monotonic sequence stamping for every outgoing snapshot
//! - Idle-lobby sweeping

use crate::game::GameFlow;
use log::info;
use rand::Rng;
use shared::{
    GameResults, GameSettings, LobbySnapshot, Player, PlayerStanding, Question,
    LOBBY_CODE_LEN, MAX_PLAYERS_PER_LOBBY,
};
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobbyError {
    NotFound,
    NameTaken,
    AlreadyStarted,
    LobbyFull,
    NotEnoughReady,
    PlayerNotFound,
    NotStarted,
}

impl fmt::Display for LobbyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LobbyError::NotFound => write!(f, "lobby not found"),
            LobbyError::NameTaken => write!(f, "player name already taken"),
            LobbyError::AlreadyStarted => write!(f, "game has already started"),
            LobbyError::LobbyFull => write!(f, "lobby is full"),
            LobbyError::NotEnoughReady => {
                write!(f, "at least one other player must be ready to start")
            }
            LobbyError::PlayerNotFound => write!(f, "player not found in lobby"),
            LobbyError::NotStarted => write!(f, "game has not started"),
        }
    }
}

impl std::error::Error for LobbyError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    Left,
    /// The host left; the whole lobby is gone.
    Disbanded,
}

/// One lobby: roster, settings, optional running game, and the sequence
/// counter stamped onto every snapshot.
pub struct Lobby {
    pub code: String,
    pub host_id: String,
    pub players: Vec<Player>,
    pub settings: GameSettings,
    pub game: Option<GameFlow>,
    seq: u64,
    last_activity: Instant,
}

impl Lobby {
    fn new(code: String, host: Player) -> Self {
        Self {
            code,
            host_id: host.id.clone(),
            players: vec![host],
            settings: GameSettings::default(),
            game: None,
            seq: 0,
            last_activity: Instant::now(),
        }
    }

    /// Every mutation passes through here so no snapshot can ever go out
    /// without a fresh sequence number.
    fn touch(&mut self) {
        self.seq += 1;
        self.last_activity = Instant::now();
    }

    pub fn snapshot(&self) -> LobbySnapshot {
        LobbySnapshot {
            code: self.code.clone(),
            players: self.players.clone(),
            settings: self.settings.clone(),
            game_started: self.game.is_some(),
            seq: self.seq,
        }
    }

    pub fn player_by_name(&self, name: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.name == name)
    }

    fn player_by_name_mut(&mut self, name: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.name == name)
    }

    /// Records an answer into the running game, folding accepted events
    /// into the roster aggregates. Duplicates are reported, not applied.
    pub fn record_answer(
        &mut self,
        event: &shared::AnswerEvent,
    ) -> Result<crate::game::RecordOutcome, LobbyError> {
        let game = self.game.as_mut().ok_or(LobbyError::NotStarted)?;
        let outcome = game.record_answer(event, &mut self.players);
        self.touch();
        Ok(outcome)
    }

    /// Current standings, sorted by score descending.
    pub fn results(&self) -> GameResults {
        let mut standings: Vec<PlayerStanding> = self
            .players
            .iter()
            .map(|p| PlayerStanding {
                name: p.name.clone(),
                score: p.score,
                correct_answers: p.correct_answers,
                avatar: p.avatar.clone(),
            })
            .collect();
        standings.sort_by(|a, b| b.score.cmp(&a.score));
        GameResults {
            lobby_code: self.code.clone(),
            standings,
        }
    }
}

/// All active lobbies, keyed by code.
#[derive(Default)]
pub struct LobbyRegistry {
    lobbies: HashMap<String, Lobby>,
}

impl LobbyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a lobby and returns (code, host player id). The creator is
    /// the host for the lobby's whole lifetime.
    pub fn create(&mut self, host_name: &str, avatar: &str) -> (String, String) {
        let code = self.unique_code();
        let host_id = Uuid::new_v4().to_string();
        let host = Player::new(&host_id, host_name, true, avatar);
        let mut lobby = Lobby::new(code.clone(), host);
        lobby.touch();
        info!("Lobby {} created by {}", code, host_name);
        self.lobbies.insert(code.clone(), lobby);
        (code, host_id)
    }

    fn unique_code(&self) -> String {
        loop {
            let code = generate_code();
            if !self.lobbies.contains_key(&code) {
                return code;
            }
        }
    }

    pub fn join(
        &mut self,
        code: &str,
        player_name: &str,
        avatar: &str,
    ) -> Result<String, LobbyError> {
        let lobby = self.lobbies.get_mut(code).ok_or(LobbyError::NotFound)?;
        if lobby.game.is_some() {
            return Err(LobbyError::AlreadyStarted);
        }
        if lobby.player_by_name(player_name).is_some() {
            return Err(LobbyError::NameTaken);
        }
        if lobby.players.len() >= MAX_PLAYERS_PER_LOBBY {
            return Err(LobbyError::LobbyFull);
        }
        let player_id = Uuid::new_v4().to_string();
        lobby
            .players
            .push(Player::new(&player_id, player_name, false, avatar));
        lobby.touch();
        info!("{} joined lobby {}", player_name, code);
        Ok(player_id)
    }

    pub fn leave(&mut self, code: &str, player_name: &str) -> Result<LeaveOutcome, LobbyError> {
        let lobby = self.lobbies.get_mut(code).ok_or(LobbyError::NotFound)?;
        let is_host = lobby
            .player_by_name(player_name)
            .ok_or(LobbyError::PlayerNotFound)?
            .is_host;
        if is_host {
            // The host never transfers; their departure ends the lobby
            self.lobbies.remove(code);
            info!("Lobby {} disbanded by host {}", code, player_name);
            return Ok(LeaveOutcome::Disbanded);
        }
        lobby.players.retain(|p| p.name != player_name);
        lobby.touch();
        info!("{} left lobby {}", player_name, code);
        Ok(LeaveOutcome::Left)
    }

    pub fn toggle_ready(
        &mut self,
        code: &str,
        player_name: &str,
        ready: bool,
    ) -> Result<(), LobbyError> {
        let lobby = self.lobbies.get_mut(code).ok_or(LobbyError::NotFound)?;
        if lobby.game.is_some() {
            return Err(LobbyError::AlreadyStarted);
        }
        let player = lobby
            .player_by_name_mut(player_name)
            .ok_or(LobbyError::PlayerNotFound)?;
        player.ready = ready;
        lobby.touch();
        Ok(())
    }

    /// Replaces the lobby settings wholesale (the client sends its merged
    /// view). Immutable once the game has started.
    pub fn update_settings(
        &mut self,
        code: &str,
        mut settings: GameSettings,
    ) -> Result<(), LobbyError> {
        let lobby = self.lobbies.get_mut(code).ok_or(LobbyError::NotFound)?;
        if lobby.game.is_some() {
            return Err(LobbyError::AlreadyStarted);
        }
        settings.sanitize();
        lobby.settings = settings;
        lobby.touch();
        Ok(())
    }

    pub fn update_avatar(
        &mut self,
        code: &str,
        player_name: &str,
        avatar: &str,
    ) -> Result<(), LobbyError> {
        let lobby = self.lobbies.get_mut(code).ok_or(LobbyError::NotFound)?;
        let player = lobby
            .player_by_name_mut(player_name)
            .ok_or(LobbyError::PlayerNotFound)?;
        player.avatar = avatar.to_string();
        lobby.touch();
        Ok(())
    }

    /// Starts the game with the given question list and returns the first
    /// question. Requires the host plus at least one ready player.
    pub fn start_game(
        &mut self,
        code: &str,
        questions: Vec<Question>,
    ) -> Result<Question, LobbyError> {
        let lobby = self.lobbies.get_mut(code).ok_or(LobbyError::NotFound)?;
        if lobby.game.is_some() {
            return Err(LobbyError::AlreadyStarted);
        }
        let ready = lobby
            .players
            .iter()
            .filter(|p| p.ready || p.is_host)
            .count();
        if ready < 2 {
            return Err(LobbyError::NotEnoughReady);
        }
        let game = GameFlow::new(questions, lobby.players.len());
        let first = game
            .current_question()
            .cloned()
            .ok_or(LobbyError::NotStarted)?;
        for player in &mut lobby.players {
            player.total_questions = game.question_count();
            player.current_question = 0;
        }
        lobby.game = Some(game);
        lobby.touch();
        info!("Game started in lobby {}", code);
        Ok(first)
    }

    pub fn lobby(&self, code: &str) -> Result<&Lobby, LobbyError> {
        self.lobbies.get(code).ok_or(LobbyError::NotFound)
    }

    pub fn lobby_mut(&mut self, code: &str) -> Result<&mut Lobby, LobbyError> {
        self.lobbies.get_mut(code).ok_or(LobbyError::NotFound)
    }

    pub fn snapshot(&self, code: &str) -> Result<LobbySnapshot, LobbyError> {
        Ok(self.lobby(code)?.snapshot())
    }

    /// Drops lobbies with no activity inside the window and returns their
    /// codes so the network layer can forget the matching peers.
    pub fn sweep_idle(&mut self, max_idle: Duration) -> Vec<String> {
        let expired: Vec<String> = self
            .lobbies
            .iter()
            .filter(|(_, lobby)| lobby.last_activity.elapsed() > max_idle)
            .map(|(code, _)| code.clone())
            .collect();
        for code in &expired {
            info!("Sweeping idle lobby {}", code);
            self.lobbies.remove(code);
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.lobbies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lobbies.is_empty()
    }
}

fn generate_code() -> String {
    // No 0/O or 1/I: these codes get read aloud and typed by hand
    const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    let mut rng = rand::thread_rng();
    (0..LOBBY_CODE_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::questions::{QuestionSource, SampleQuestionBank};

    fn two_player_lobby(registry: &mut LobbyRegistry) -> String {
        let (code, _) = registry.create("Alice", "🦊");
        registry.join(&code, "Bob", "🐢").unwrap();
        code
    }

    #[test]
    fn test_create_assigns_single_host() {
        let mut registry = LobbyRegistry::new();
        let (code, host_id) = registry.create("Alice", "🦊");
        registry.join(&code, "Bob", "🐢").unwrap();

        let lobby = registry.lobby(&code).unwrap();
        assert_eq!(lobby.host_id, host_id);
        assert_eq!(
            lobby.players.iter().filter(|p| p.is_host).count(),
            1,
            "exactly one host per lobby"
        );
        assert_eq!(code.len(), LOBBY_CODE_LEN);
    }

    #[test]
    fn test_join_conflicts() {
        let mut registry = LobbyRegistry::new();
        let (code, _) = registry.create("Alice", "🦊");

        assert_eq!(
            registry.join("NOPE42", "Bob", "🐢"),
            Err(LobbyError::NotFound)
        );
        assert_eq!(
            registry.join(&code, "Alice", "🐢"),
            Err(LobbyError::NameTaken)
        );

        for i in 0..(MAX_PLAYERS_PER_LOBBY - 1) {
            registry.join(&code, &format!("P{}", i), "🐢").unwrap();
        }
        assert_eq!(
            registry.join(&code, "Overflow", "🐢"),
            Err(LobbyError::LobbyFull)
        );
    }

    #[test]
    fn test_join_rejected_after_start() {
        let mut registry = LobbyRegistry::new();
        let code = two_player_lobby(&mut registry);
        registry.toggle_ready(&code, "Bob", true).unwrap();
        let questions = SampleQuestionBank.generate(&GameSettings::default());
        registry.start_game(&code, questions).unwrap();

        assert_eq!(
            registry.join(&code, "Carol", "🦉"),
            Err(LobbyError::AlreadyStarted)
        );
        assert_eq!(
            registry.toggle_ready(&code, "Bob", false),
            Err(LobbyError::AlreadyStarted)
        );
    }

    #[test]
    fn test_every_mutation_bumps_seq() {
        let mut registry = LobbyRegistry::new();
        let (code, _) = registry.create("Alice", "🦊");
        let seq0 = registry.snapshot(&code).unwrap().seq;

        registry.join(&code, "Bob", "🐢").unwrap();
        let seq1 = registry.snapshot(&code).unwrap().seq;
        assert!(seq1 > seq0);

        registry.toggle_ready(&code, "Bob", true).unwrap();
        let seq2 = registry.snapshot(&code).unwrap().seq;
        assert!(seq2 > seq1);

        // A pure read does not bump
        assert_eq!(registry.snapshot(&code).unwrap().seq, seq2);
    }

    #[test]
    fn test_settings_are_sanitized_on_write() {
        let mut registry = LobbyRegistry::new();
        let (code, _) = registry.create("Alice", "🦊");
        let settings = GameSettings {
            num_questions: 999,
            ..GameSettings::default()
        };
        registry.update_settings(&code, settings).unwrap();
        assert_eq!(
            registry.snapshot(&code).unwrap().settings.num_questions,
            shared::MAX_QUESTIONS
        );
    }

    #[test]
    fn test_start_requires_ready_player() {
        let mut registry = LobbyRegistry::new();
        let code = two_player_lobby(&mut registry);
        let questions = SampleQuestionBank.generate(&GameSettings::default());

        assert_eq!(
            registry.start_game(&code, questions.clone()),
            Err(LobbyError::NotEnoughReady)
        );

        registry.toggle_ready(&code, "Bob", true).unwrap();
        let first = registry.start_game(&code, questions).unwrap();
        assert_eq!(first.index, 0);
        assert!(registry.snapshot(&code).unwrap().game_started);
        assert_eq!(
            registry.lobby(&code).unwrap().players[0].total_questions,
            shared::DEFAULT_NUM_QUESTIONS
        );
    }

    #[test]
    fn test_host_leave_disbands_guest_leave_does_not() {
        let mut registry = LobbyRegistry::new();
        let code = two_player_lobby(&mut registry);

        assert_eq!(registry.leave(&code, "Bob"), Ok(LeaveOutcome::Left));
        assert_eq!(registry.lobby(&code).unwrap().players.len(), 1);

        assert_eq!(registry.leave(&code, "Alice"), Ok(LeaveOutcome::Disbanded));
        assert_eq!(registry.snapshot(&code), Err(LobbyError::NotFound));
    }

    #[test]
    fn test_sweep_removes_only_idle_lobbies() {
        let mut registry = LobbyRegistry::new();
        let (code, _) = registry.create("Alice", "🦊");

        assert!(registry.sweep_idle(Duration::from_secs(60)).is_empty());
        let swept = registry.sweep_idle(Duration::from_secs(0));
        assert_eq!(swept, vec![code]);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_generated_codes_are_well_formed() {
        for _ in 0..50 {
            let code = generate_code();
            assert_eq!(code.len(), LOBBY_CODE_LEN);
            assert!(code
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
            assert!(!code.contains('O') && !code.contains('I'));
        }
    }
}
