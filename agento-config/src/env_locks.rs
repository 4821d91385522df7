//! Env-lock map for the settings manager (§4.7): fields whose value is pinned by an
//! environment variable become read-only to `UserSettings::update`.

use std::collections::HashMap;

/// Settings field name -> the env var that locks it, computed once at boot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnvLocks(HashMap<&'static str, String>);

impl EnvLocks {
    /// Computes the lock map from the current process environment (§6: `AGENTO_DEFAULT_MODEL`
    /// locks `default_model`, `AGENTO_WORKING_DIR` locks `default_working_directory`).
    pub fn from_env() -> Self {
        let mut map = HashMap::new();
        if std::env::var_os("AGENTO_DEFAULT_MODEL").is_some() {
            map.insert("default_model", "AGENTO_DEFAULT_MODEL".to_string());
        }
        if std::env::var_os("AGENTO_WORKING_DIR").is_some() {
            map.insert("default_working_directory", "AGENTO_WORKING_DIR".to_string());
        }
        Self(map)
    }

    pub fn is_locked(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn locked_value(&self, field: &str) -> Option<String> {
        let var = self.0.get(field)?;
        std::env::var(var).ok()
    }

    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.0.keys().copied()
    }
}

/// Soft default for model when the user has configured none: `ANTHROPIC_DEFAULT_SONNET_MODEL`.
pub fn soft_default_model() -> Option<String> {
    std::env::var("ANTHROPIC_DEFAULT_SONNET_MODEL").ok()
}
