//! # Multiplayer Quiz Client Library
//!
//! This library implements the client half of the real-time multiplayer
//! quiz synchronization protocol. It keeps one player's view of a shared
//! quiz session consistent with every other player's, despite unreliable
//! delivery, variable latency, and reconnects, by treating the server as
//! the single source of truth and reconciling everything it pushes.
//!
//! ## Architecture Overview
//!
//! The core is a set of synchronous state machines driven by one async
//! loop. All inbound channel events, request/response completions, UI
//! commands, and timer ticks are serialized through that loop — nothing
//! mutates client state concurrently, and every state machine can be
//! exercised deterministically in tests by feeding it events and ticks.
//!
//! ### Authoritative Reconciliation
//! Lobby state arrives both as pushed snapshots and as polled responses.
//! Snapshots carry a monotonic sequence number stamped by the server; a
//! snapshot is applied only when its sequence number is strictly greater
//! than the last applied one, so a slow poll response can never overwrite
//! a fresher push (and vice versa), regardless of arrival order.
//!
//! ### Server-Paced Progression
//! The quiz state machine never advances itself to the next question. It
//! submits answers, counts down locally, and then waits for the server's
//! `NewQuestion` event, adopting the server-provided index as ground
//! truth. Duplicate or stale progression events are discarded by
//! comparing against the last applied index.
//!
//! ## Module Organization
//!
//! ### Channel Module (`channel`)
//! The event channel adapter: typed topic subscriptions dispatched in
//! registration order, keyed registration that cannot multiply callbacks,
//! an outbox that queues intents while the transport is down, and
//! synthetic connect/disconnect topics for connection-state observers.
//!
//! ### Storage Module (`storage`)
//! The session store: a durable JSON snapshot of this player's identity
//! and lobby membership, plus last-known game results, written only on
//! explicit user actions. This is the only durable state in the core.
//!
//! ### Lobby Module (`lobby`)
//! The lobby synchronizer: join/ready/settings/start intents and the
//! push-plus-poll reconciliation described above, including the polling
//! fallback that takes over while the channel is down or push updates
//! have gone stale.
//!
//! ### Quiz Module (`quiz`)
//! The live-quiz state machine: LOADING → QUESTION → WAITING → RESULTS,
//! local answer scoring, idempotent scoreboard aggregation, the answer
//! feedback delay, and the server-synchronized inter-question pause.
//!
//! ### Network Module (`network`)
//! The async driver: owns the UDP transport, the channel adapter, and
//! both state machines; runs the single `select!` loop; executes the
//! effects the machines emit; and handles reconnection with bounded
//! retries plus the polling fallback.
//!
//! ## Failure Philosophy
//!
//! Transport failures are recovered silently (reconnect, then polling);
//! conflict failures (name taken, lobby gone, game started) surface
//! immediately to the caller; background sync failures are logged and
//! swallowed. Local computations never panic on bad input — missing or
//! malformed data degrades to a no-op instead of poisoning the machine.

pub mod api;
pub mod channel;
pub mod effect;
pub mod lobby;
pub mod network;
pub mod quiz;
pub mod storage;

pub use effect::{ApiCall, Effect, Notice};
pub use lobby::{Identity, LobbyPhase, LobbySync, SnapshotSource};
pub use quiz::{QuizMachine, QuizPhase};
pub use storage::{SessionSnapshot, SessionStore};
