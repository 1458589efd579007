//! Document selectors — which editor documents a session covers.

use std::path::Path;

use globset::{GlobBuilder, GlobMatcher};
use serde::Serialize;

use crate::error::ConfigError;

/// Language identifier the session is registered for.
pub const LANGUAGE_ID: &str = "calcagebra";

/// Glob matching calcagebra source files.
pub const DEFAULT_PATTERN: &str = "**/*.{cal}";

/// One (scheme, language, pattern) rule. Never mutated after construction;
/// the glob is compiled once alongside its source pattern.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSelectorEntry {
    scheme: String,
    #[serde(rename = "language")]
    language_id: String,
    pattern: String,
    #[serde(skip)]
    matcher: GlobMatcher,
}

impl DocumentSelectorEntry {
    pub fn new(scheme: &str, language_id: &str, pattern: &str) -> Result<Self, ConfigError> {
        let mut builder = GlobBuilder::new(pattern);
        if cfg!(windows) {
            builder.case_insensitive(true);
        }
        let glob = builder
            .build()
            .map_err(|source| ConfigError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?;
        Ok(Self {
            scheme: scheme.to_string(),
            language_id: language_id.to_string(),
            pattern: pattern.to_string(),
            matcher: glob.compile_matcher(),
        })
    }

    /// A document matches iff scheme, language id, and path all agree.
    #[must_use]
    pub fn matches(&self, scheme: &str, language_id: &str, path: &Path) -> bool {
        self.scheme == scheme && self.language_id == language_id && self.matcher.is_match(path)
    }

    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    #[must_use]
    pub fn language_id(&self) -> &str {
        &self.language_id
    }

    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

/// The set of selector entries for one session.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct DocumentSelector {
    entries: Vec<DocumentSelectorEntry>,
}

impl DocumentSelector {
    #[must_use]
    pub fn new(entries: Vec<DocumentSelectorEntry>) -> Self {
        Self { entries }
    }

    /// The documented default: local-filesystem calcagebra files.
    pub fn calcagebra_default() -> Result<Self, ConfigError> {
        Ok(Self::new(vec![DocumentSelectorEntry::new(
            "file",
            LANGUAGE_ID,
            DEFAULT_PATTERN,
        )?]))
    }

    /// Whether any entry covers the document.
    #[must_use]
    pub fn matches(&self, scheme: &str, language_id: &str, path: &Path) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.matches(scheme, language_id, path))
    }

    #[must_use]
    pub fn entries(&self) -> &[DocumentSelectorEntry] {
        &self.entries
    }
}
