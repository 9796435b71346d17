//! Wire protocol between clients and the lobby server.
//!
//! Every message is a tagged enum variant, so each topic carries a
//! statically checked payload instead of an untyped callback argument.
//! The transport is treated as at-least-once with no ordering guarantee:
//! receivers must tolerate duplicated and reordered events.

use crate::{AnswerEvent, GameResults, LobbySnapshot, Question};
use serde::{Deserialize, Serialize};

/// Messages emitted by a client.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum ClientIntent {
    /// Transport-level handshake, also used to re-associate an address
    /// after a reconnect.
    Hello {
        player_id: String,
        player_name: String,
        lobby_code: String,
    },
    JoinRoom {
        lobby_code: String,
        player_name: String,
        player_id: String,
    },
    LeaveRoom {
        lobby_code: String,
        player_name: String,
        player_id: String,
    },
    StartGame {
        lobby_code: String,
    },
    SubmitAnswer {
        lobby_code: String,
        answer: AnswerEvent,
    },
    RequestNextQuestion {
        lobby_code: String,
    },
    /// Pull a fresh lobby snapshot; the server answers with a unicast
    /// `LobbyUpdate`.
    FetchLobby {
        lobby_code: String,
    },
}

/// Messages pushed by the server.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum ServerEvent {
    /// Handshake acknowledgement.
    Welcome,
    LobbyUpdate(LobbySnapshot),
    PlayerJoined {
        name: String,
        id: String,
    },
    PlayerLeft {
        name: String,
        id: String,
    },
    GameStarted {
        lobby_code: String,
    },
    NewQuestion {
        index: usize,
        question: Question,
    },
    PlayerAnswered(AnswerEvent),
    AllAnswersIn,
    GameOver(GameResults),
    Error {
        message: String,
    },
}

/// Subscribable topics, including the synthetic connection-state topics
/// raised by the client-side channel adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Connect,
    Disconnect,
    Welcome,
    LobbyUpdate,
    PlayerJoined,
    PlayerLeft,
    GameStarted,
    NewQuestion,
    PlayerAnswered,
    AllAnswersIn,
    GameOver,
    Error,
}

impl ServerEvent {
    pub fn topic(&self) -> Topic {
        match self {
            ServerEvent::Welcome => Topic::Welcome,
            ServerEvent::LobbyUpdate(_) => Topic::LobbyUpdate,
            ServerEvent::PlayerJoined { .. } => Topic::PlayerJoined,
            ServerEvent::PlayerLeft { .. } => Topic::PlayerLeft,
            ServerEvent::GameStarted { .. } => Topic::GameStarted,
            ServerEvent::NewQuestion { .. } => Topic::NewQuestion,
            ServerEvent::PlayerAnswered(_) => Topic::PlayerAnswered,
            ServerEvent::AllAnswersIn => Topic::AllAnswersIn,
            ServerEvent::GameOver(_) => Topic::GameOver,
            ServerEvent::Error { .. } => Topic::Error,
        }
    }
}
