//! Error taxonomy for the client lifecycle.
//!
//! Start-sequence errors converge on [`StartError`], which the lifecycle
//! manager converts into a host-visible diagnostic — nothing here escapes
//! the activation entry points as a panic or an unhandled failure.

use std::path::PathBuf;

use thiserror::Error;

/// A configuration value is structurally wrong.
///
/// Missing keys are never an error; they fall back to defaults.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration key `{key}` has the wrong type: expected {expected}")]
    InvalidType {
        key: &'static str,
        expected: &'static str,
    },
    #[error("invalid document selector pattern `{pattern}`")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

/// The analysis server process could not be launched.
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("failed to launch `{}`: {source}", .command.display())]
    Io {
        command: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("`{}` started without a {stream} pipe", .command.display())]
    MissingPipe {
        command: PathBuf,
        stream: &'static str,
    },
}

/// A session operation failed: handshake rejection, timeout, or a dead
/// message channel.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("initialize handshake rejected by server: {0}")]
    HandshakeFailed(String),
    #[error("request `{method}` timed out")]
    Timeout { method: &'static str },
    #[error("message channel closed")]
    ChannelClosed,
    #[error("session was already started")]
    AlreadyStarted,
}

/// Umbrella over everything that can go wrong between activation and a
/// running session. Consumed inside `start_hook`, never surfaced to the host
/// as a return value.
#[derive(Debug, Error)]
pub enum StartError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    #[error(transparent)]
    Session(#[from] SessionError),
}
