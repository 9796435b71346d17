//! Effects emitted by the state machines for the driver to execute.
//!
//! The machines themselves never touch the socket, the API, or disk;
//! they return these values and the network driver carries them out.
//! This keeps every transition synchronous and testable.

use shared::protocol::ClientIntent;
use shared::{GameResults, GameSettings};

/// A request/response call the driver should perform on the lobby API.
/// These run in the background: failures are logged, not surfaced,
/// because the next authoritative snapshot corrects any divergence.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    ToggleReady {
        lobby_code: String,
        player_name: String,
        ready: bool,
    },
    UpdateSettings {
        lobby_code: String,
        settings: GameSettings,
    },
    UpdateAvatar {
        lobby_code: String,
        player_name: String,
        avatar: String,
    },
    LeaveLobby {
        lobby_code: String,
        player_name: String,
    },
}

/// User-visible notifications surfaced to the embedding UI.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    PlayerJoined { name: String },
    PlayerLeft { name: String },
    /// The lobby vanished server-side; the UI should return to the
    /// lobby-selection screen.
    LobbyGone,
    /// Reconnection attempts are exhausted.
    ConnectionLost,
    GameError { message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Emit an intent on the event channel (queued while disconnected).
    Send(ClientIntent),
    /// Perform a background API call.
    Api(ApiCall),
    /// Persist final game results to durable storage.
    PersistResults(GameResults),
    /// Surface a notification to the user.
    Notify(Notice),
}
