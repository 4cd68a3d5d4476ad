//! Persona instruction files.
//!
//! Each persona is a plain-text file `<name>.txt` in the prompts directory.
//! Names are sanitized before they touch the filesystem, and any persona
//! without a readable file falls back to the default persona, then to the
//! built-in instructions.

use std::path::{Path, PathBuf};

/// Instructions used when no persona file can be read.
pub const DEFAULT_INSTRUCTIONS: &str = "You are a helpful AI nurse assisting a patient.";

/// Strips everything except ASCII alphanumerics, `-` and `_`.
///
/// Returns `None` when nothing usable remains.
pub fn sanitize_persona(name: &str) -> Option<String> {
    let clean: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    (!clean.is_empty()).then_some(clean)
}

/// Directory of per-persona instruction files.
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    dir: PathBuf,
    default_persona: String,
}

impl PromptLibrary {
    pub fn new(dir: impl Into<PathBuf>, default_persona: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            default_persona: default_persona.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn default_persona(&self) -> &str {
        &self.default_persona
    }

    /// Path of the instruction file for a persona, if the name is usable.
    pub fn path_for(&self, persona: &str) -> Option<PathBuf> {
        sanitize_persona(persona).map(|name| self.dir.join(format!("{name}.txt")))
    }

    /// Loads the instruction text for a persona.
    ///
    /// Never fails: unreadable or empty files resolve to the default
    /// persona's text, and finally to [`DEFAULT_INSTRUCTIONS`].
    pub async fn load(&self, persona: &str) -> String {
        if let Some(text) = self.read(persona).await {
            return text;
        }
        if persona != self.default_persona {
            tracing::warn!(persona, fallback = %self.default_persona, "persona prompt unavailable");
            if let Some(text) = self.read(&self.default_persona).await {
                return text;
            }
        }
        tracing::warn!(dir = %self.dir.display(), "no prompt files readable, using built-in instructions");
        DEFAULT_INSTRUCTIONS.to_string()
    }

    async fn read(&self, persona: &str) -> Option<String> {
        let path = self.path_for(persona)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "prompt file not readable");
                None
            }
        }
    }
}
