//! Request/response boundary plus the enrollment helpers.
//!
//! Creating or joining a lobby happens over the request/response API
//! before any real-time synchronization starts; only afterwards does the
//! caller hand the resulting session to the network driver. Conflict
//! errors (name taken, lobby gone, game started) surface directly to the
//! caller and are never retried.

use crate::storage::{SessionSnapshot, SessionStore};
use log::warn;

pub use shared::api::{
    ApiError, CreatedLobby, GameStateView, JoinedLobby, LobbyApi,
};

/// Creates a lobby, persists the resulting host session, and returns it.
pub async fn create_session<A: LobbyApi>(
    api: &A,
    store: &SessionStore,
    host_name: &str,
    avatar: &str,
) -> Result<SessionSnapshot, ApiError> {
    let created = api.create_lobby(host_name, avatar).await?;
    let session = SessionSnapshot {
        player_name: host_name.to_string(),
        player_id: created.player_id,
        lobby_code: created.lobby_code,
        is_host: true,
        avatar: avatar.to_string(),
    };
    persist(store, &session);
    Ok(session)
}

/// Joins an existing lobby, persists the resulting session, and returns it.
pub async fn join_session<A: LobbyApi>(
    api: &A,
    store: &SessionStore,
    lobby_code: &str,
    player_name: &str,
    avatar: &str,
) -> Result<SessionSnapshot, ApiError> {
    let joined = api.join_lobby(lobby_code, player_name, avatar).await?;
    let session = SessionSnapshot {
        player_name: player_name.to_string(),
        player_id: joined.player_id,
        lobby_code: lobby_code.to_string(),
        is_host: false,
        avatar: avatar.to_string(),
    };
    persist(store, &session);
    Ok(session)
}

fn persist(store: &SessionStore, session: &SessionSnapshot) {
    // Membership is already established server-side at this point; a
    // failed local write only costs reload-resume, so log and move on.
    if let Err(err) = store.store(session) {
        warn!("Could not persist session snapshot: {}", err);
    }
}
