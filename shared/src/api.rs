//! Request/response boundary to the lobby service.
//!
//! This mirrors the REST-ish surface the UI layer talks to: each call is a
//! plain request returning a value or a conflict error. The in-tree server
//! provides an in-process implementation; a remote HTTP implementation is
//! the embedding application's concern and lives outside this workspace.

use crate::{AnswerEvent, GameResults, GameSettings, LobbySnapshot, Player, Question};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Lobby or game does not (or no longer does) exist.
    NotFound,
    /// Another player in the lobby already uses this name.
    NameTaken,
    /// The game has already started; late joins are rejected.
    AlreadyStarted,
    /// The lobby is at its player cap.
    LobbyFull,
    /// Request was understood but refused (wrong caller, bad state).
    Rejected(String),
    /// Transport-level failure; callers may retry or fall back.
    Unavailable(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::NotFound => write!(f, "lobby not found"),
            ApiError::NameTaken => write!(f, "player name already taken"),
            ApiError::AlreadyStarted => write!(f, "game has already started"),
            ApiError::LobbyFull => write!(f, "lobby is full"),
            ApiError::Rejected(reason) => write!(f, "request rejected: {}", reason),
            ApiError::Unavailable(reason) => write!(f, "service unavailable: {}", reason),
        }
    }
}

impl std::error::Error for ApiError {}

/// Outcome of creating a lobby: the shareable code plus the server-assigned
/// host identity.
#[derive(Debug, Clone)]
pub struct CreatedLobby {
    pub lobby_code: String,
    pub player_id: String,
}

/// Outcome of joining: the server-assigned player identity.
#[derive(Debug, Clone)]
pub struct JoinedLobby {
    pub player_id: String,
}

/// Snapshot of a running game used when (re-)entering the quiz view.
#[derive(Debug, Clone)]
pub struct GameStateView {
    pub questions: Vec<Question>,
    pub current_question: usize,
    pub players: Vec<Player>,
    pub settings: GameSettings,
}

/// The request/response API every lobby backend must offer.
#[allow(async_fn_in_trait)]
pub trait LobbyApi {
    async fn create_lobby(&self, host_name: &str, avatar: &str) -> Result<CreatedLobby, ApiError>;
    async fn join_lobby(
        &self,
        lobby_code: &str,
        player_name: &str,
        avatar: &str,
    ) -> Result<JoinedLobby, ApiError>;
    async fn lobby_info(&self, lobby_code: &str) -> Result<LobbySnapshot, ApiError>;
    async fn toggle_ready(
        &self,
        lobby_code: &str,
        player_name: &str,
        ready: bool,
    ) -> Result<(), ApiError>;
    async fn update_settings(
        &self,
        lobby_code: &str,
        settings: &GameSettings,
    ) -> Result<(), ApiError>;
    async fn start_game(&self, lobby_code: &str) -> Result<(), ApiError>;
    async fn game_state(&self, lobby_code: &str) -> Result<GameStateView, ApiError>;
    async fn submit_answer(&self, lobby_code: &str, answer: &AnswerEvent) -> Result<(), ApiError>;
    async fn game_results(&self, lobby_code: &str) -> Result<GameResults, ApiError>;
    async fn leave_lobby(&self, lobby_code: &str, player_name: &str) -> Result<(), ApiError>;
    async fn update_avatar(
        &self,
        lobby_code: &str,
        player_name: &str,
        avatar: &str,
    ) -> Result<(), ApiError>;
    async fn categories(&self) -> Result<Vec<String>, ApiError>;
}
