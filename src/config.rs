//! Configuration resolution — the typed boundary between host settings and
//! everything downstream.
//!
//! The host exposes a key-value reader scoped to the `calcagebra` settings
//! namespace. [`resolve`] reads it exactly once and produces an immutable
//! [`SessionConfig`]; no other component touches raw configuration.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::ConfigError;
use crate::selector::DocumentSelector;

/// Read access to the host's layered configuration, scoped to the
/// `calcagebra` namespace. Keys are dotted paths like `server.enable`.
///
/// Absence of a key is not an error; `null` counts as absent.
pub trait ConfigReader {
    fn get(&self, key: &str) -> Option<serde_json::Value>;
}

/// Convenience backing for tests and simple hosts.
impl ConfigReader for HashMap<String, serde_json::Value> {
    fn get(&self, key: &str) -> Option<serde_json::Value> {
        HashMap::get(self, key).cloned()
    }
}

/// Diagnostics feature toggles, nested under `initializationOptions`.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsOptions {
    pub on_change: bool,
    pub more_info_hint: bool,
    pub ignore: Vec<String>,
}

/// Feature toggles the server receives in the initialize request.
///
/// Field names are the wire shape the server expects.
#[derive(Debug, Clone, Serialize)]
pub struct InitializationOptions {
    pub token_hover: bool,
    pub fs_watcher: bool,
    pub diagnostics: DiagnosticsOptions,
}

/// Immutable per-start session configuration.
///
/// If `enabled` is false, no session may be constructed; the manager treats
/// that as a deliberate disabled state, not a failure.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    enabled: bool,
    server_path: Option<String>,
    initialization_options: InitializationOptions,
    document_selector: DocumentSelector,
}

impl SessionConfig {
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Explicit executable override, already filtered for emptiness.
    #[must_use]
    pub fn server_path(&self) -> Option<&str> {
        self.server_path.as_deref()
    }

    #[must_use]
    pub fn initialization_options(&self) -> &InitializationOptions {
        &self.initialization_options
    }

    #[must_use]
    pub fn document_selector(&self) -> &DocumentSelector {
        &self.document_selector
    }
}

/// Resolve the host configuration into a [`SessionConfig`].
///
/// Pure function of the reader. Missing keys become defaults; a key that is
/// present with the wrong structural type is a [`ConfigError`].
pub fn resolve<C: ConfigReader + ?Sized>(reader: &C) -> Result<SessionConfig, ConfigError> {
    let enabled = read_bool(reader, "server.enable", false)?;
    let server_path = read_string(reader, "server.path")?;
    let initialization_options = InitializationOptions {
        token_hover: read_bool(reader, "server.hover.token.enable", true)?,
        fs_watcher: read_bool(reader, "server.fileSystemWatcher.enable", true)?,
        diagnostics: DiagnosticsOptions {
            on_change: read_bool(reader, "server.diagnostics.onChange.enable", true)?,
            more_info_hint: read_bool(reader, "server.diagnostics.moreInfoHint.enable", true)?,
            ignore: read_string_list(reader, "server.diagnostics.ignore")?,
        },
    };

    Ok(SessionConfig {
        enabled,
        server_path,
        initialization_options,
        document_selector: DocumentSelector::calcagebra_default()?,
    })
}

fn read_bool<C: ConfigReader + ?Sized>(
    reader: &C,
    key: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    match reader.get(key) {
        None | Some(serde_json::Value::Null) => Ok(default),
        Some(serde_json::Value::Bool(value)) => Ok(value),
        Some(_) => Err(ConfigError::InvalidType {
            key,
            expected: "boolean",
        }),
    }
}

/// Empty strings collapse to `None`: "use the bundled binary".
fn read_string<C: ConfigReader + ?Sized>(
    reader: &C,
    key: &'static str,
) -> Result<Option<String>, ConfigError> {
    match reader.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(value)) => {
            Ok(if value.is_empty() { None } else { Some(value) })
        }
        Some(_) => Err(ConfigError::InvalidType {
            key,
            expected: "string",
        }),
    }
}

fn read_string_list<C: ConfigReader + ?Sized>(
    reader: &C,
    key: &'static str,
) -> Result<Vec<String>, ConfigError> {
    let items = match reader.get(key) {
        None | Some(serde_json::Value::Null) => return Ok(Vec::new()),
        Some(serde_json::Value::Array(items)) => items,
        Some(_) => {
            return Err(ConfigError::InvalidType {
                key,
                expected: "array of strings",
            });
        }
    };

    items
        .into_iter()
        .map(|item| match item {
            serde_json::Value::String(value) => Ok(value),
            _ => Err(ConfigError::InvalidType {
                key,
                expected: "array of strings",
            }),
        })
        .collect()
}
