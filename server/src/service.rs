//! In-process implementation of the request/response API.
//!
//! Shares the lobby registry with the network front end, so polls through
//! this surface observe exactly the same sequence numbers as pushed
//! snapshots. Used by the binary for local play and by the integration
//! tests; a remote HTTP implementation would live with the UI layer.

use crate::game::AdvanceOutcome;
use crate::lobby::{LobbyError, LobbyRegistry};
use crate::questions::QuestionSource;
use shared::api::{ApiError, CreatedLobby, GameStateView, JoinedLobby, LobbyApi};
use shared::{AnswerEvent, GameResults, GameSettings, LobbySnapshot};
use std::sync::Arc;
use tokio::sync::Mutex;

fn to_api_error(err: LobbyError) -> ApiError {
    match err {
        LobbyError::NotFound => ApiError::NotFound,
        LobbyError::NameTaken => ApiError::NameTaken,
        LobbyError::AlreadyStarted => ApiError::AlreadyStarted,
        LobbyError::LobbyFull => ApiError::LobbyFull,
        other => ApiError::Rejected(other.to_string()),
    }
}

#[derive(Clone)]
pub struct InProcessApi {
    registry: Arc<Mutex<LobbyRegistry>>,
    questions: Arc<dyn QuestionSource + Send + Sync>,
}

impl InProcessApi {
    pub fn new(
        registry: Arc<Mutex<LobbyRegistry>>,
        questions: Arc<dyn QuestionSource + Send + Sync>,
    ) -> Self {
        Self {
            registry,
            questions,
        }
    }
}

impl LobbyApi for InProcessApi {
    async fn create_lobby(&self, host_name: &str, avatar: &str) -> Result<CreatedLobby, ApiError> {
        let mut registry = self.registry.lock().await;
        let (lobby_code, player_id) = registry.create(host_name, avatar);
        Ok(CreatedLobby {
            lobby_code,
            player_id,
        })
    }

    async fn join_lobby(
        &self,
        lobby_code: &str,
        player_name: &str,
        avatar: &str,
    ) -> Result<JoinedLobby, ApiError> {
        let mut registry = self.registry.lock().await;
        let player_id = registry
            .join(lobby_code, player_name, avatar)
            .map_err(to_api_error)?;
        Ok(JoinedLobby { player_id })
    }

    async fn lobby_info(&self, lobby_code: &str) -> Result<LobbySnapshot, ApiError> {
        let registry = self.registry.lock().await;
        registry.snapshot(lobby_code).map_err(to_api_error)
    }

    async fn toggle_ready(
        &self,
        lobby_code: &str,
        player_name: &str,
        ready: bool,
    ) -> Result<(), ApiError> {
        let mut registry = self.registry.lock().await;
        registry
            .toggle_ready(lobby_code, player_name, ready)
            .map_err(to_api_error)
    }

    async fn update_settings(
        &self,
        lobby_code: &str,
        settings: &GameSettings,
    ) -> Result<(), ApiError> {
        let mut registry = self.registry.lock().await;
        registry
            .update_settings(lobby_code, settings.clone())
            .map_err(to_api_error)
    }

    async fn start_game(&self, lobby_code: &str) -> Result<(), ApiError> {
        let mut registry = self.registry.lock().await;
        let settings = registry.snapshot(lobby_code).map_err(to_api_error)?.settings;
        let questions = self.questions.generate(&settings);
        registry
            .start_game(lobby_code, questions)
            .map_err(to_api_error)?;
        Ok(())
    }

    async fn game_state(&self, lobby_code: &str) -> Result<GameStateView, ApiError> {
        let registry = self.registry.lock().await;
        let lobby = registry.lobby(lobby_code).map_err(to_api_error)?;
        let game = lobby
            .game
            .as_ref()
            .ok_or_else(|| ApiError::Rejected(LobbyError::NotStarted.to_string()))?;
        Ok(GameStateView {
            questions: game.questions().to_vec(),
            current_question: game.current_index(),
            players: lobby.players.clone(),
            settings: lobby.settings.clone(),
        })
    }

    async fn submit_answer(&self, lobby_code: &str, answer: &AnswerEvent) -> Result<(), ApiError> {
        let mut registry = self.registry.lock().await;
        let lobby = registry.lobby_mut(lobby_code).map_err(to_api_error)?;
        lobby.record_answer(answer).map_err(to_api_error)?;
        Ok(())
    }

    async fn game_results(&self, lobby_code: &str) -> Result<GameResults, ApiError> {
        let registry = self.registry.lock().await;
        let lobby = registry.lobby(lobby_code).map_err(to_api_error)?;
        Ok(lobby.results())
    }

    async fn leave_lobby(&self, lobby_code: &str, player_name: &str) -> Result<(), ApiError> {
        let mut registry = self.registry.lock().await;
        registry
            .leave(lobby_code, player_name)
            .map(|_| ())
            .map_err(to_api_error)
    }

    async fn update_avatar(
        &self,
        lobby_code: &str,
        player_name: &str,
        avatar: &str,
    ) -> Result<(), ApiError> {
        let mut registry = self.registry.lock().await;
        registry
            .update_avatar(lobby_code, player_name, avatar)
            .map_err(to_api_error)
    }

    async fn categories(&self) -> Result<Vec<String>, ApiError> {
        Ok(vec![
            "General Knowledge".to_string(),
            "Science".to_string(),
            "History".to_string(),
            "Geography".to_string(),
            "Entertainment".to_string(),
        ])
    }
}

/// Advances the game on behalf of a pause-elapsed client and reports what
/// happened. Exposed for front ends that cannot reach the UDP loop.
pub async fn advance_question(
    registry: &Arc<Mutex<LobbyRegistry>>,
    lobby_code: &str,
) -> Result<AdvanceOutcome, LobbyError> {
    let mut registry = registry.lock().await;
    let lobby = registry.lobby_mut(lobby_code)?;
    let game = lobby.game.as_mut().ok_or(LobbyError::NotStarted)?;
    Ok(game.advance())
}
