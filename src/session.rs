use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One cookie as captured from the backend's Set-Cookie headers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
}

/// Opaque persisted authentication state. Only the authenticator writes it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionState {
    pub cookies: Vec<SessionCookie>,
}

impl SessionState {
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

/// Per-account session files, one JSON artifact per email. A missing or
/// corrupt file is never fatal: the caller falls back to a fresh login.
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, email: &str) -> PathBuf {
        self.dir.join(format!("{email}.session.json"))
    }

    pub fn load(&self, email: &str) -> Option<SessionState> {
        let path = self.path_for(email);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) => {
                warn!("no saved session at {}: {}", path.display(), err);
                return None;
            }
        };

        match serde_json::from_str::<SessionState>(&raw) {
            Ok(state) if !state.is_empty() => Some(state),
            Ok(_) => {
                warn!("saved session at {} is empty", path.display());
                None
            }
            Err(err) => {
                warn!("could not parse session file {}: {}", path.display(), err);
                None
            }
        }
    }

    pub fn save(&self, email: &str, state: &SessionState) -> Result<()> {
        let path = self.path_for(email);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(state)?;
        fs::write(&path, json)
            .with_context(|| format!("failed to write session file {}", path.display()))
    }

    #[cfg(test)]
    fn file_path(&self, email: &str) -> PathBuf {
        self.path_for(email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(tag: &str) -> SessionStore {
        let dir = std::env::temp_dir().join(format!("points_scraper_session_{tag}_{}", std::process::id()));
        SessionStore::new(dir)
    }

    #[test]
    fn save_then_load_roundtrip() {
        let store = temp_store("roundtrip");
        let state = SessionState {
            cookies: vec![SessionCookie {
                name: "laravel_session".into(),
                value: "abc123".into(),
            }],
        };

        store.save("user@example.com", &state).unwrap();
        let loaded = store.load("user@example.com").unwrap();
        assert_eq!(loaded, state);

        fs::remove_file(store.file_path("user@example.com")).unwrap();
    }

    #[test]
    fn missing_file_is_none_not_error() {
        let store = temp_store("missing");
        assert!(store.load("nobody@example.com").is_none());
    }

    #[test]
    fn corrupt_file_is_none_not_error() {
        let store = temp_store("corrupt");
        store
            .save("broken@example.com", &SessionState::default())
            .unwrap();
        fs::write(store.file_path("broken@example.com"), "not json {").unwrap();

        assert!(store.load("broken@example.com").is_none());
        fs::remove_file(store.file_path("broken@example.com")).unwrap();
    }
}
