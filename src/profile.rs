//! Profile document used as the system instruction
//!
//! The document is opaque to the rest of the crate: it is trimmed and sent
//! verbatim as the `system` message of every completion request.

use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Profile compiled into the binary, used when no file is configured
const EMBEDDED_PROFILE: &str = include_str!("../profiles/default.md");

/// Where a profile was loaded from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileSource {
    /// Compiled-in default
    Embedded,
    /// Read from a file
    File(PathBuf),
}

/// The static profile document
#[derive(Debug, Clone)]
pub struct Profile {
    text: String,
    source: ProfileSource,
}

impl Profile {
    /// The compiled-in default profile
    #[must_use]
    pub fn embedded() -> Self {
        Self {
            text: EMBEDDED_PROFILE.trim().to_string(),
            source: ProfileSource::Embedded,
        }
    }

    /// Load a profile from a text or markdown file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is empty
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Profile(format!("failed to read {}: {e}", path.display())))?;

        let text = content.trim();
        if text.is_empty() {
            return Err(Error::Profile(format!("{} is empty", path.display())));
        }

        tracing::debug!(path = %path.display(), chars = text.len(), "loaded profile");

        Ok(Self {
            text: text.to_string(),
            source: ProfileSource::File(path.to_path_buf()),
        })
    }

    /// Load from `path` when given, otherwise fall back to the embedded profile
    ///
    /// # Errors
    ///
    /// Returns error if a configured file cannot be loaded
    pub fn load(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(|| Ok(Self::embedded()), Self::from_file)
    }

    /// Text sent as the system instruction
    #[must_use]
    pub fn system_prompt(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub const fn source(&self) -> &ProfileSource {
        &self.source
    }
}
