use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed stream path {path:?}: {reason}")]
    MalformedIdentity { path: String, reason: &'static str },

    #[error("failed to spawn {role} worker: {source}")]
    Spawn {
        role: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to terminate {role} worker (pid {pid:?}): {source}")]
    Termination {
        role: String,
        pid: Option<u32>,
        #[source]
        source: io::Error,
    },

    #[error("failed to read settings: {0}")]
    SettingsRead(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("orchestrator is no longer running")]
    Closed,
}
