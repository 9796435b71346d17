//! Lobby synchronizer.
//!
//! Maintains this client's merged view of one lobby by reconciling
//! authoritative snapshots that arrive over two paths: pushed
//! `LobbyUpdate` events and polled request/response reads. Both paths
//! funnel through `apply_snapshot`, which accepts a snapshot only when
//! its sequence number is strictly greater than the last applied one —
//! the winner is decided by the server's mutation order, never by
//! arrival timing.

use crate::effect::{ApiCall, Effect, Notice};
use log::{debug, warn};
use shared::protocol::{ClientIntent, ServerEvent};
use shared::{GameSettings, LobbySnapshot, SettingsPatch, PUSH_STALE_AFTER_SECS};
use std::time::{Duration, Instant};

/// This player's identity inside the lobby, as assigned at join time.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub player_id: String,
    pub player_name: String,
    pub is_host: bool,
}

/// This client's relationship to the lobby code, independent of the
/// lobby entity's own lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobbyPhase {
    Disconnected,
    Connecting,
    Joined,
}

/// Which path a snapshot arrived on. Only push arrivals refresh the
/// staleness clock that suppresses the polling fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSource {
    Push,
    Poll,
}

pub struct LobbySync {
    phase: LobbyPhase,
    lobby_code: String,
    identity: Identity,
    snapshot: Option<LobbySnapshot>,
    last_seq: u64,
    last_push: Option<Instant>,
    game_started: bool,
}

impl LobbySync {
    pub fn new(lobby_code: &str, identity: Identity) -> Self {
        Self {
            phase: LobbyPhase::Disconnected,
            lobby_code: lobby_code.to_string(),
            identity,
            snapshot: None,
            last_seq: 0,
            last_push: None,
            game_started: false,
        }
    }

    pub fn phase(&self) -> LobbyPhase {
        self.phase
    }

    pub fn snapshot(&self) -> Option<&LobbySnapshot> {
        self.snapshot.as_ref()
    }

    pub fn settings(&self) -> Option<&GameSettings> {
        self.snapshot.as_ref().map(|s| &s.settings)
    }

    pub fn game_started(&self) -> bool {
        self.game_started
    }

    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Announces this client to the lobby room. The server confirms by
    /// pushing a `LobbyUpdate` with the refreshed roster; until then the
    /// phase stays `Connecting` and the polling fallback covers for a
    /// lost confirmation.
    pub fn join(&mut self) -> Vec<Effect> {
        self.phase = LobbyPhase::Connecting;
        vec![Effect::Send(ClientIntent::JoinRoom {
            lobby_code: self.lobby_code.clone(),
            player_name: self.identity.player_name.clone(),
            player_id: self.identity.player_id.clone(),
        })]
    }

    /// Single reconciliation path for both push and poll arrivals.
    /// Returns whether the snapshot was applied.
    pub fn apply_snapshot(
        &mut self,
        source: SnapshotSource,
        snapshot: LobbySnapshot,
        now: Instant,
    ) -> bool {
        if self.phase == LobbyPhase::Disconnected {
            return false;
        }
        if snapshot.code != self.lobby_code {
            warn!(
                "Ignoring snapshot for foreign lobby {} (ours: {})",
                snapshot.code, self.lobby_code
            );
            return false;
        }
        if snapshot.seq <= self.last_seq {
            debug!(
                "Discarding stale {:?} snapshot seq {} (applied: {})",
                source, snapshot.seq, self.last_seq
            );
            return false;
        }

        self.last_seq = snapshot.seq;
        if source == SnapshotSource::Push {
            self.last_push = Some(now);
        }
        if snapshot.game_started {
            self.game_started = true;
        }
        self.snapshot = Some(snapshot);
        self.phase = LobbyPhase::Joined;
        true
    }

    pub fn handle_event(&mut self, event: &ServerEvent, now: Instant) -> Vec<Effect> {
        if self.phase == LobbyPhase::Disconnected {
            return Vec::new();
        }
        match event {
            ServerEvent::LobbyUpdate(snapshot) => {
                self.apply_snapshot(SnapshotSource::Push, snapshot.clone(), now);
                Vec::new()
            }
            ServerEvent::PlayerJoined { name, .. } => {
                if name == &self.identity.player_name {
                    Vec::new()
                } else {
                    vec![Effect::Notify(Notice::PlayerJoined { name: name.clone() })]
                }
            }
            ServerEvent::PlayerLeft { name, .. } => {
                vec![Effect::Notify(Notice::PlayerLeft { name: name.clone() })]
            }
            ServerEvent::GameStarted { lobby_code } if lobby_code == &self.lobby_code => {
                self.game_started = true;
                Vec::new()
            }
            ServerEvent::Error { message } if self.phase == LobbyPhase::Connecting => {
                // Join intent was rejected; surface it instead of hanging
                // in Connecting forever.
                self.phase = LobbyPhase::Disconnected;
                vec![Effect::Notify(Notice::GameError {
                    message: message.clone(),
                })]
            }
            _ => Vec::new(),
        }
    }

    /// Optimistic ready toggle: flips the local roster entry immediately
    /// and reports the desired state to the server. The next authoritative
    /// snapshot wins over the optimistic value either way.
    pub fn toggle_ready(&mut self) -> Vec<Effect> {
        if self.game_started {
            return Vec::new();
        }
        let Some(snapshot) = self.snapshot.as_mut() else {
            debug!("Ready toggle before first snapshot, nothing to flip");
            return Vec::new();
        };
        let Some(me) = snapshot.player_mut(&self.identity.player_id) else {
            return Vec::new();
        };
        let desired = !me.ready;
        me.ready = desired;
        vec![Effect::Api(ApiCall::ToggleReady {
            lobby_code: self.lobby_code.clone(),
            player_name: self.identity.player_name.clone(),
            ready: desired,
        })]
    }

    /// Host-only settings update. The patch is merged into the local view
    /// immediately for UI responsiveness; the server's next snapshot is
    /// authoritative and re-converges any divergence.
    pub fn update_settings(&mut self, patch: &SettingsPatch) -> Vec<Effect> {
        if !self.identity.is_host {
            warn!("Ignoring settings update from non-host");
            return Vec::new();
        }
        if self.game_started {
            return Vec::new();
        }
        let Some(snapshot) = self.snapshot.as_mut() else {
            debug!("Settings update before first snapshot, dropping");
            return Vec::new();
        };
        patch.apply(&mut snapshot.settings);
        vec![Effect::Api(ApiCall::UpdateSettings {
            lobby_code: self.lobby_code.clone(),
            settings: snapshot.settings.clone(),
        })]
    }

    /// Host-only start intent. Never transitions local state directly:
    /// only the server-confirmed `GameStarted` event flips the client
    /// into quiz mode.
    pub fn start_game(&self) -> Vec<Effect> {
        if !self.identity.is_host || self.game_started {
            return Vec::new();
        }
        vec![Effect::Send(ClientIntent::StartGame {
            lobby_code: self.lobby_code.clone(),
        })]
    }

    /// Updates this player's avatar, optimistically and via the API.
    pub fn set_avatar(&mut self, avatar: &str) -> Vec<Effect> {
        if let Some(snapshot) = self.snapshot.as_mut() {
            if let Some(me) = snapshot.player_mut(&self.identity.player_id) {
                me.avatar = avatar.to_string();
            }
        }
        vec![Effect::Api(ApiCall::UpdateAvatar {
            lobby_code: self.lobby_code.clone(),
            player_name: self.identity.player_name.clone(),
            avatar: avatar.to_string(),
        })]
    }

    /// Whether the polling fallback should pull a snapshot now: always
    /// while the channel is down or the join is unconfirmed, and whenever
    /// no push update has arrived within the staleness threshold. While
    /// push updates are flowing, polling stays suppressed.
    pub fn should_poll(&self, now: Instant, channel_connected: bool) -> bool {
        match self.phase {
            LobbyPhase::Disconnected => false,
            _ if self.game_started => false,
            _ if !channel_connected => true,
            LobbyPhase::Connecting => true,
            LobbyPhase::Joined => match self.last_push {
                None => true,
                Some(at) => {
                    now.duration_since(at) >= Duration::from_secs(PUSH_STALE_AFTER_SECS)
                }
            },
        }
    }

    /// Leaves the lobby and drops all local state. Late events against a
    /// torn-down synchronizer are ignored.
    pub fn teardown(&mut self) -> Vec<Effect> {
        if self.phase == LobbyPhase::Disconnected {
            return Vec::new();
        }
        let mut effects = vec![Effect::Send(ClientIntent::LeaveRoom {
            lobby_code: self.lobby_code.clone(),
            player_name: self.identity.player_name.clone(),
            player_id: self.identity.player_id.clone(),
        })];
        // The host leaving disbands the lobby server-side; only regular
        // players file an explicit leave with the API.
        if !self.identity.is_host {
            effects.push(Effect::Api(ApiCall::LeaveLobby {
                lobby_code: self.lobby_code.clone(),
                player_name: self.identity.player_name.clone(),
            }));
        }
        self.phase = LobbyPhase::Disconnected;
        self.snapshot = None;
        self.last_push = None;
        self.game_started = false;
        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Difficulty, Player};

    fn identity(host: bool) -> Identity {
        Identity {
            player_id: "p-self".to_string(),
            player_name: "Alice".to_string(),
            is_host: host,
        }
    }

    fn snapshot(seq: u64) -> LobbySnapshot {
        LobbySnapshot {
            code: "ABC123".to_string(),
            players: vec![
                Player::new("p-self", "Alice", true, "🦊"),
                Player::new("p-bob", "Bob", false, "🐢"),
            ],
            settings: GameSettings::default(),
            game_started: false,
            seq,
        }
    }

    fn joined_sync() -> LobbySync {
        let mut sync = LobbySync::new("ABC123", identity(true));
        sync.join();
        sync.apply_snapshot(SnapshotSource::Push, snapshot(1), Instant::now());
        sync
    }

    #[test]
    fn test_join_emits_intent_and_connects() {
        let mut sync = LobbySync::new("ABC123", identity(false));
        assert_eq!(sync.phase(), LobbyPhase::Disconnected);

        let effects = sync.join();
        assert_eq!(sync.phase(), LobbyPhase::Connecting);
        assert!(matches!(
            effects.as_slice(),
            [Effect::Send(ClientIntent::JoinRoom { .. })]
        ));

        sync.apply_snapshot(SnapshotSource::Push, snapshot(1), Instant::now());
        assert_eq!(sync.phase(), LobbyPhase::Joined);
    }

    #[test]
    fn test_last_mutation_wins_regardless_of_interleaving() {
        let mut sync = LobbySync::new("ABC123", identity(false));
        sync.join();
        let now = Instant::now();

        let mut tagged = |seq: u64, name: &str| {
            let mut snap = snapshot(seq);
            snap.settings.topic = Some(name.to_string());
            snap
        };

        // Push seq 3, then a slow poll response with seq 2 arrives late,
        // then a poll that raced ahead with seq 5, then push seq 4.
        assert!(sync.apply_snapshot(SnapshotSource::Push, tagged(3, "three"), now));
        assert!(!sync.apply_snapshot(SnapshotSource::Poll, tagged(2, "two"), now));
        assert!(sync.apply_snapshot(SnapshotSource::Poll, tagged(5, "five"), now));
        assert!(!sync.apply_snapshot(SnapshotSource::Push, tagged(4, "four"), now));

        assert_eq!(sync.last_seq(), 5);
        assert_eq!(
            sync.snapshot().unwrap().settings.topic.as_deref(),
            Some("five")
        );
    }

    #[test]
    fn test_duplicate_snapshot_is_ignored() {
        let mut sync = joined_sync();
        assert!(!sync.apply_snapshot(SnapshotSource::Push, snapshot(1), Instant::now()));
        assert_eq!(sync.last_seq(), 1);
    }

    #[test]
    fn test_foreign_lobby_snapshot_is_ignored() {
        let mut sync = joined_sync();
        let mut foreign = snapshot(10);
        foreign.code = "OTHER9".to_string();
        assert!(!sync.apply_snapshot(SnapshotSource::Push, foreign, Instant::now()));
        assert_eq!(sync.last_seq(), 1);
    }

    #[test]
    fn test_ready_toggle_is_optimistic_but_snapshot_wins() {
        let mut sync = joined_sync();

        let effects = sync.toggle_ready();
        assert!(matches!(
            effects.as_slice(),
            [Effect::Api(ApiCall::ToggleReady { ready: true, .. })]
        ));
        assert!(sync.snapshot().unwrap().player("p-self").unwrap().ready);

        // Authoritative snapshot disagrees (server never saw the toggle)
        let mut server_view = snapshot(2);
        server_view.player_mut("p-self").unwrap().ready = false;
        sync.apply_snapshot(SnapshotSource::Push, server_view, Instant::now());
        assert!(!sync.snapshot().unwrap().player("p-self").unwrap().ready);
    }

    #[test]
    fn test_settings_merge_immediate_then_reconverges() {
        let mut sync = joined_sync();

        let patch = SettingsPatch {
            difficulty: Some(Difficulty::Hard),
            ..SettingsPatch::default()
        };
        let effects = sync.update_settings(&patch);
        assert_eq!(effects.len(), 1);
        assert_eq!(sync.settings().unwrap().difficulty, Difficulty::Hard);

        // The server settles on something else; its snapshot wins.
        let mut server_view = snapshot(2);
        server_view.settings.difficulty = Difficulty::Easy;
        sync.apply_snapshot(SnapshotSource::Push, server_view, Instant::now());
        assert_eq!(sync.settings().unwrap().difficulty, Difficulty::Easy);
    }

    #[test]
    fn test_non_host_cannot_touch_settings_or_start() {
        let mut sync = LobbySync::new("ABC123", identity(false));
        sync.join();
        sync.apply_snapshot(SnapshotSource::Push, snapshot(1), Instant::now());

        assert!(sync
            .update_settings(&SettingsPatch {
                difficulty: Some(Difficulty::Hard),
                ..SettingsPatch::default()
            })
            .is_empty());
        assert!(sync.start_game().is_empty());
    }

    #[test]
    fn test_start_game_emits_intent_without_local_transition() {
        let mut sync = joined_sync();
        let effects = sync.start_game();
        assert!(matches!(
            effects.as_slice(),
            [Effect::Send(ClientIntent::StartGame { .. })]
        ));
        // No local transition until the server confirms
        assert!(!sync.game_started());

        sync.handle_event(
            &ServerEvent::GameStarted {
                lobby_code: "ABC123".to_string(),
            },
            Instant::now(),
        );
        assert!(sync.game_started());
    }

    #[test]
    fn test_polling_gate() {
        let mut sync = LobbySync::new("ABC123", identity(false));
        let base = Instant::now();

        // Not joined yet: nothing to poll for
        assert!(!sync.should_poll(base, true));

        sync.join();
        // Join unconfirmed: poll regardless of channel state
        assert!(sync.should_poll(base, true));

        sync.apply_snapshot(SnapshotSource::Push, snapshot(1), base);
        // Fresh push: polling suppressed while connected
        assert!(!sync.should_poll(base + Duration::from_secs(2), true));
        // Channel down: poll immediately
        assert!(sync.should_poll(base + Duration::from_secs(2), false));
        // Push went stale: poll even while connected
        assert!(sync.should_poll(base + Duration::from_secs(6), true));

        // Poll responses do not refresh the push staleness clock
        sync.apply_snapshot(
            SnapshotSource::Poll,
            snapshot(2),
            base + Duration::from_secs(7),
        );
        assert!(sync.should_poll(base + Duration::from_secs(8), true));
    }

    #[test]
    fn test_teardown_emits_leave_and_silences_late_events() {
        let mut sync = joined_sync();
        let effects = sync.teardown();
        assert!(matches!(
            effects.first(),
            Some(Effect::Send(ClientIntent::LeaveRoom { .. }))
        ));
        assert_eq!(sync.phase(), LobbyPhase::Disconnected);

        // Late snapshot after teardown must not resurrect state
        assert!(!sync.apply_snapshot(SnapshotSource::Push, snapshot(9), Instant::now()));
        assert!(sync.snapshot().is_none());
        assert!(sync
            .handle_event(&ServerEvent::AllAnswersIn, Instant::now())
            .is_empty());
        // Double teardown is a no-op
        assert!(sync.teardown().is_empty());
    }

    #[test]
    fn test_host_teardown_skips_api_leave() {
        let mut host = joined_sync();
        let effects = host.teardown();
        assert_eq!(effects.len(), 1);

        let mut guest = LobbySync::new("ABC123", identity(false));
        guest.join();
        guest.apply_snapshot(SnapshotSource::Push, snapshot(1), Instant::now());
        let effects = guest.teardown();
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::Api(ApiCall::LeaveLobby { .. }))));
    }

    #[test]
    fn test_join_rejection_surfaces_error() {
        let mut sync = LobbySync::new("ABC123", identity(false));
        sync.join();
        let effects = sync.handle_event(
            &ServerEvent::Error {
                message: "lobby is full".to_string(),
            },
            Instant::now(),
        );
        assert!(matches!(
            effects.as_slice(),
            [Effect::Notify(Notice::GameError { .. })]
        ));
        assert_eq!(sync.phase(), LobbyPhase::Disconnected);
    }
}
