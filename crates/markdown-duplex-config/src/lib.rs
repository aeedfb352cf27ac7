//! Persisted editor state.
//!
//! One small record: whether the rich editor is enabled and which mode the
//! author last used. Read once at startup, written on every explicit
//! toggle or mode switch, and honored for a year — stale preferences fall
//! back to the defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// How long a saved preference stays valid.
const STATE_VALIDITY_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("Failed to read state file at {state_path}: {source}")]
    StateReadError {
        state_path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse state file at {state_path}: {source}")]
    StateParseError {
        state_path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreferredMode {
    Wysiwyg,
    Markdown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorState {
    pub enabled: bool,
    pub mode: PreferredMode,
    /// Unix timestamp of the last save; entries older than a year expire.
    pub saved_at: u64,
}

impl Default for EditorState {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: PreferredMode::Wysiwyg,
            saved_at: 0,
        }
    }
}

impl EditorState {
    pub fn new(enabled: bool, mode: PreferredMode) -> Self {
        Self {
            enabled,
            mode,
            saved_at: now_secs(),
        }
    }

    /// Load from a specific path. `Ok(None)` when the file is missing or
    /// the saved preference has expired.
    pub fn load_from_path<P: AsRef<Path>>(state_path: P) -> Result<Option<Self>, StateError> {
        let state_path = state_path.as_ref();
        if !state_path.exists() {
            return Ok(None);
        }

        let content =
            std::fs::read_to_string(state_path).map_err(|source| StateError::StateReadError {
                state_path: state_path.to_path_buf(),
                source,
            })?;

        let state: EditorState =
            toml::from_str(&content).map_err(|source| StateError::StateParseError {
                state_path: state_path.to_path_buf(),
                source,
            })?;

        if state.is_expired() {
            return Ok(None);
        }
        Ok(Some(state))
    }

    pub fn load() -> Result<Option<Self>, StateError> {
        Self::load_from_path(Self::state_path())
    }

    /// Save to a specific path, stamping the current time.
    pub fn save_to_path<P: AsRef<Path>>(&self, state_path: P) -> anyhow::Result<()> {
        let state_path = state_path.as_ref();
        if let Some(parent) = state_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let stamped = Self {
            saved_at: now_secs(),
            ..self.clone()
        };
        let content = toml::to_string_pretty(&stamped)?;
        std::fs::write(state_path, content)?;
        Ok(())
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to_path(Self::state_path())
    }

    pub fn state_path() -> PathBuf {
        let state_dir = shellexpand::tilde("~/.config/markdown-duplex");
        PathBuf::from(state_dir.as_ref()).join("state.toml")
    }

    fn is_expired(&self) -> bool {
        now_secs().saturating_sub(self.saved_at) > STATE_VALIDITY_SECS
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_state_path_is_expanded() {
        let path = EditorState::state_path();
        let path_str = path.to_string_lossy();
        assert!(!path_str.starts_with('~'));
        assert!(path_str.ends_with(".config/markdown-duplex/state.toml"));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.toml");

        let state = EditorState::new(true, PreferredMode::Markdown);
        state.save_to_path(&path).unwrap();

        let loaded = EditorState::load_from_path(&path).unwrap().unwrap();
        assert!(loaded.enabled);
        assert_eq!(loaded.mode, PreferredMode::Markdown);
        assert!(loaded.saved_at > 0);
    }

    #[test]
    fn test_missing_file_loads_as_none() {
        let dir = TempDir::new().unwrap();
        let result = EditorState::load_from_path(dir.path().join("absent.toml")).unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn test_expired_state_loads_as_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.toml");
        // Saved two years ago.
        let stale = "enabled = true\nmode = \"wysiwyg\"\nsaved_at = 1\n";
        std::fs::write(&path, stale).unwrap();

        let result = EditorState::load_from_path(&path).unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn test_fresh_timestamp_is_not_expired() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.toml");
        let state = EditorState::new(false, PreferredMode::Wysiwyg);
        state.save_to_path(&path).unwrap();

        let loaded = EditorState::load_from_path(&path).unwrap().unwrap();
        assert!(!loaded.enabled);
    }

    #[test]
    fn test_malformed_file_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.toml");
        std::fs::write(&path, "not = [valid").unwrap();

        let result = EditorState::load_from_path(&path);
        assert!(matches!(result, Err(StateError::StateParseError { .. })));
    }

    #[test]
    fn test_save_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deep").join("state.toml");
        let state = EditorState::new(true, PreferredMode::Wysiwyg);
        state.save_to_path(&path).unwrap();
        assert!(path.exists());
    }
}
