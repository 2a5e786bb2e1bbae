//! Lobby Metadata Store
//!
//! The single mutable record describing the lobby. Seeded from the command
//! line at startup; rewritable only by a sole-member host (see
//! `Router::on_publish_lobby_info`), and only as a whole.

use serde::{Deserialize, Serialize};

/// Lobby metadata. One instance, process lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbyInfo {
    /// Lobby display name.
    pub name: String,
    /// Game mode string.
    pub mode: String,
    /// Player capacity; must stay positive.
    pub max_players: i32,
    /// Whether a password gates entry (enforced client-side at join UI).
    pub password_protected: bool,
    /// Comma-separated required mod list.
    pub mods: String,
    /// Comma-separated banned mod list.
    pub banned_mods: String,
}

impl LobbyInfo {
    /// Replace every field from a published update, or reject the whole
    /// update when it fails validation. No partial effect either way.
    pub fn apply(&mut self, update: &LobbyInfo) -> bool {
        if update.max_players <= 0 {
            tracing::error!(max_players = update.max_players, "published lobby: bad maxplayers");
            return false;
        }
        *self = update.clone();
        true
    }
}
