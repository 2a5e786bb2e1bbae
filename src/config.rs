//! Startup Configuration
//!
//! Arguments arrive as `key = value` tokens (whitespace around the `=` is
//! optional, keys are case-insensitive). Each flag maps to a typed field
//! through the match table in [`Config::from_args`]; anything malformed is
//! a hard startup error.

use crate::router::lobby::LobbyInfo;

/// Runtime configuration for one router process.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// UDP port to listen on.
    pub port: u16,
    /// Keepalive cadence, milliseconds.
    pub heartbeat_ms: u64,
    /// Peer silence budget before the liveness sweep forgets it, ms.
    pub timeout_ms: u64,
    /// Initial lobby metadata, until the host publishes its own.
    pub lobby: LobbyInfo,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 8720,
            heartbeat_ms: 50,
            timeout_ms: 3000,
            lobby: LobbyInfo {
                name: "Router Lobby".to_string(),
                mode: "Meadow".to_string(),
                max_players: 4,
                password_protected: false,
                mods: String::new(),
                banned_mods: String::new(),
            },
        }
    }
}

/// Configuration errors; all fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Token did not name a known flag.
    #[error("unexpected argument '{0}'")]
    UnknownFlag(String),

    /// A flag name was not followed by `=`.
    #[error("expected '=' after '{0}'")]
    ExpectedEquals(String),

    /// A flag had no value token.
    #[error("expected a value for '{0}'")]
    MissingValue(String),

    /// A value failed to parse as the flag's type.
    #[error("bad value '{value}' for '{flag}'")]
    BadValue {
        /// Flag being assigned.
        flag: String,
        /// Offending token.
        value: String,
    },
}

/// Split `key=value` shapes into separate `key`, `=`, `value` tokens so the
/// parser sees one grammar no matter how the shell grouped the arguments.
fn tokenize(args: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    for arg in args {
        if arg == "=" {
            out.push(arg.clone());
            continue;
        }
        for (i, part) in arg.split('=').enumerate() {
            if i > 0 {
                out.push("=".to_string());
            }
            if !part.is_empty() {
                out.push(part.to_string());
            }
        }
    }
    out
}

impl Config {
    /// Parse command-line arguments (program name already stripped).
    pub fn from_args(args: &[String]) -> Result<Self, ConfigError> {
        let mut config = Config::default();
        let tokens = tokenize(args);
        let mut iter = tokens.into_iter();

        while let Some(key) = iter.next() {
            let flag = key.to_lowercase();
            match iter.next() {
                Some(eq) if eq == "=" => {}
                _ => return Err(ConfigError::ExpectedEquals(key)),
            }
            let value = iter.next().ok_or_else(|| ConfigError::MissingValue(key.clone()))?;

            let bad = |v: &str| ConfigError::BadValue {
                flag: flag.clone(),
                value: v.to_string(),
            };

            match flag.as_str() {
                "port" => config.port = value.parse().map_err(|_| bad(&value))?,
                "heartbeat" => config.heartbeat_ms = value.parse().map_err(|_| bad(&value))?,
                "timeout" => config.timeout_ms = value.parse().map_err(|_| bad(&value))?,
                "maxplayers" => {
                    config.lobby.max_players = value.parse().map_err(|_| bad(&value))?
                }
                "passwordprotected" => {
                    config.lobby.password_protected = value.parse().map_err(|_| bad(&value))?
                }
                "name" => config.lobby.name = value,
                "mode" => config.lobby.mode = value,
                "mods" => config.lobby.mods = value,
                "bannedmods" => config.lobby.banned_mods = value,
                _ => return Err(ConfigError::UnknownFlag(key)),
            }
            tracing::debug!(flag = %flag, "set from command line");
        }

        Ok(config)
    }
}
