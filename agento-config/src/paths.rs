//! Persisted layout under the data directory root (§6), default `~/.agento`.

use std::path::{Path, PathBuf};

/// Resolves the data directory root: `AGENTO_DATA_DIR` env var, else `~/.agento`.
pub fn data_dir() -> PathBuf {
    std::env::var_os("AGENTO_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".agento")
        })
}

/// Path to the relational store file (sqlite) under the data directory.
pub fn store_path(root: &Path) -> PathBuf {
    root.join("agento.db")
}

/// Path to the per-session log file.
pub fn session_log_path(root: &Path, session_id: &str) -> PathBuf {
    root.join("logs").join("sessions").join(format!("{session_id}.log"))
}

/// Path to an integration's filesystem-fallback JSON file.
pub fn integration_file_path(root: &Path, integration_id: &str) -> PathBuf {
    root.join("integrations").join(format!("{integration_id}.json"))
}

/// Path to the process-wide settings file.
pub fn settings_path(root: &Path) -> PathBuf {
    root.join("settings.json")
}

/// Path to a named runtime-settings profile directory.
pub fn settings_profile_dir(root: &Path, profile_id: &str) -> PathBuf {
    root.join("settings_profiles").join(profile_id)
}

/// Ensures every directory this layout writes into exists.
pub fn ensure_layout(root: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(root)?;
    std::fs::create_dir_all(root.join("logs").join("sessions"))?;
    std::fs::create_dir_all(root.join("integrations"))?;
    std::fs::create_dir_all(root.join("settings_profiles"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths_are_rooted_under_data_dir() {
        let root = PathBuf::from("/tmp/agento-test-root");
        assert_eq!(store_path(&root), root.join("agento.db"));
        assert_eq!(
            session_log_path(&root, "s1"),
            root.join("logs/sessions/s1.log")
        );
        assert_eq!(
            integration_file_path(&root, "i1"),
            root.join("integrations/i1.json")
        );
    }

    #[test]
    fn ensure_layout_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("data");
        ensure_layout(&root).unwrap();
        assert!(root.join("logs").join("sessions").is_dir());
        assert!(root.join("integrations").is_dir());
        assert!(root.join("settings_profiles").is_dir());
    }
}
