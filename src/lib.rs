//! Client lifecycle management for the calcagebra language server.
//!
//! This crate is the piece an editor host embeds: on activation it resolves
//! configuration, launches the bundled `calcagebra-ls` binary (or an explicit
//! override), performs the initialize handshake, and tears the session down
//! again on deactivation. At most one live [`Session`] exists at a time; the
//! [`LifecycleManager`] owns it and exposes the two hooks the host calls.

pub mod codec;
pub mod config;
pub mod error;
pub mod launcher;
pub mod selector;
pub mod session;

pub(crate) mod protocol;

mod manager;

pub use config::{
    ConfigReader, DiagnosticsOptions, InitializationOptions, SessionConfig, resolve,
};
pub use error::{ConfigError, SessionError, SpawnError, StartError};
pub use launcher::{
    ExecutableSpec, Launcher, Platform, ProcessLauncher, ServerHandle, resolve_command,
};
pub use manager::{LifecycleManager, LifecycleState};
pub use selector::{DocumentSelector, DocumentSelectorEntry};
pub use session::{Session, SessionState};
