//! # Quiz Lobby Server Library
//!
//! Authoritative server for the multiplayer trivia protocol. It owns the
//! canonical lobby and game state; clients hold read-mostly projections
//! and reconcile against what this server pushes. Every state-changing
//! decision — roster membership, settings, question pacing, final
//! standings — is made here.
//!
//! ## Core Responsibilities
//!
//! ### Lobby Lifecycle
//! Lobbies are created with a short shareable code, accept joins until
//! the game starts (rejecting duplicate names and full rooms), and are
//! swept away after going idle. The host is fixed at creation and never
//! transfers; the host leaving disbands the lobby.
//!
//! ### Snapshot Sequencing
//! Every lobby mutation bumps a monotonic sequence number, and every
//! snapshot sent out — pushed or polled — carries it. Clients use the
//! number to discard stale snapshots, so the server never needs to care
//! which delivery path won a race.
//!
//! ### Game Pacing
//! The server decides when the session moves to the next question and
//! when it ends. Answer submissions are recorded idempotently (duplicate
//! deliveries cannot double-count), `all_answers_in` fires when the last
//! roster member answers, and advancing past a question that is not
//! fully answered is refused.
//!
//! ## Module Organization
//!
//! ### Lobby Module (`lobby`)
//! The lobby registry: creation, joins with conflict errors, ready
//! flags, host-only settings, avatar updates, sequence stamping, and
//! idle-lobby sweeping.
//!
//! ### Game Module (`game`)
//! Per-lobby game flow: question progression, idempotent answer
//! recording, all-answered detection, and final standings.
//!
//! ### Questions Module (`questions`)
//! The seam to quiz content generation, which is an external concern. A
//! built-in sample bank keeps the binary and the tests self-contained.
//!
//! ### Service Module (`service`)
//! In-process implementation of the client-facing request/response API,
//! shared with the network front end through the same registry.
//!
//! ### Network Module (`network`)
//! UDP front end: a receiver task feeds one authoritative loop over an
//! mpsc queue, per-lobby peer rosters route broadcasts, and a sweeper
//! drops timed-out peers and idle lobbies.

pub mod game;
pub mod lobby;
pub mod network;
pub mod questions;
pub mod service;
