//! Durable session storage.
//!
//! This module provides:
//! - OS-standard data directory location (via `directories` crate)
//! - the persisted session snapshot used to resume a lobby after a reload
//! - last-known game results, kept so the results view survives the
//!   server becoming unreachable after the game ends
//!
//! The store is written only in response to explicit user actions
//! (create/join/leave, game over); background sync never touches it.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use shared::GameResults;
use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;

/// Errors that can occur during storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// Could not determine a data directory on this platform
    NoDataDirectory,
    Io(io::Error),
    Format(serde_json::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::NoDataDirectory => write!(f, "could not determine data directory"),
            StorageError::Io(err) => write!(f, "storage io error: {}", err),
            StorageError::Format(err) => write!(f, "storage format error: {}", err),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        StorageError::Io(err)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Format(err)
    }
}

/// Everything needed to re-enter a lobby after a page reload:
/// this player's identity plus the lobby membership.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub player_name: String,
    pub player_id: String,
    pub lobby_code: String,
    pub is_host: bool,
    pub avatar: String,
}

/// File-backed store under the OS data directory.
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    /// Opens the store at the OS-standard location:
    /// - Linux: `$XDG_DATA_HOME/quizsync/` or `~/.local/share/quizsync/`
    /// - macOS: `~/Library/Application Support/quizsync/`
    pub fn open() -> Result<Self, StorageError> {
        let dirs = ProjectDirs::from("", "", "quizsync").ok_or(StorageError::NoDataDirectory)?;
        Ok(Self::at(dirs.data_dir().to_path_buf()))
    }

    /// Opens the store at an explicit root (used by tests).
    pub fn at(root: PathBuf) -> Self {
        Self { root }
    }

    fn session_path(&self) -> PathBuf {
        self.root.join("session.json")
    }

    fn results_path(&self, lobby_code: &str) -> PathBuf {
        self.root.join(format!("results_{}.json", lobby_code))
    }

    pub fn store(&self, snapshot: &SessionSnapshot) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)?;
        let data = serde_json::to_string_pretty(snapshot)?;
        fs::write(self.session_path(), data)?;
        Ok(())
    }

    pub fn load(&self) -> Result<Option<SessionSnapshot>, StorageError> {
        match fs::read_to_string(self.session_path()) {
            Ok(data) => Ok(Some(serde_json::from_str(&data)?)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Removes the persisted session. Results files are left in place so
    /// a finished game stays reviewable.
    pub fn clear(&self) -> Result<(), StorageError> {
        match fs::remove_file(self.session_path()) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    pub fn save_results(&self, lobby_code: &str, results: &GameResults) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)?;
        let data = serde_json::to_string_pretty(results)?;
        fs::write(self.results_path(lobby_code), data)?;
        Ok(())
    }

    pub fn load_results(&self, lobby_code: &str) -> Result<Option<GameResults>, StorageError> {
        match fs::read_to_string(self.results_path(lobby_code)) {
            Ok(data) => Ok(Some(serde_json::from_str(&data)?)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}
