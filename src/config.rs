//! Runtime configuration, loaded from environment variables

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_PREFS_FILE: &str = ".prefsync/prefs.json";
const DEFAULT_STORAGE_DIR: &str = ".prefsync/storage";
const DEFAULT_DEBOUNCE_MS: u64 = 100;
const DEFAULT_POLL_MS: u64 = 500;

/// Where preferences and page state live, and how often to write or poll them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// JSON object file backing the preference bridge
    pub prefs_file: PathBuf,
    /// Directory of the file-backed local store
    pub storage_dir: PathBuf,
    /// Trailing debounce for page-state saves, in milliseconds
    pub debounce_ms: u64,
    /// How often the prefs file is checked for outside changes, in milliseconds
    pub poll_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            prefs_file: PathBuf::from(DEFAULT_PREFS_FILE),
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            poll_ms: DEFAULT_POLL_MS,
        }
    }
}

impl SyncConfig {
    /// Read `PREFSYNC_*` variables; missing or unparsable values keep the default
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            prefs_file: lookup("PREFSYNC_PREFS_FILE")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.prefs_file),
            storage_dir: lookup("PREFSYNC_STORAGE_DIR")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_dir),
            debounce_ms: parse_or(lookup("PREFSYNC_DEBOUNCE_MS"), defaults.debounce_ms),
            poll_ms: parse_or(lookup("PREFSYNC_POLL_MS"), defaults.poll_ms),
        }
    }

    pub fn debounce_interval(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }
}

fn parse_or<T: FromStr + Copy>(raw: Option<String>, default: T) -> T {
    raw.and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> SyncConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SyncConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.debounce_interval(), Duration::from_millis(100));
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PREFSYNC_PREFS_FILE", "/tmp/prefs.json"),
            ("PREFSYNC_STORAGE_DIR", "/tmp/storage"),
            ("PREFSYNC_DEBOUNCE_MS", "150"),
            ("PREFSYNC_POLL_MS", " 50 "),
        ]);
        assert_eq!(config.prefs_file, PathBuf::from("/tmp/prefs.json"));
        assert_eq!(config.storage_dir, PathBuf::from("/tmp/storage"));
        assert_eq!(config.debounce_ms, 150);
        assert_eq!(config.poll_ms, 50);
    }

    #[test]
    fn test_unparsable_values_fall_back() {
        let config = config_from(&[
            ("PREFSYNC_DEBOUNCE_MS", "soon"),
            ("PREFSYNC_POLL_MS", "-5"),
            ("PREFSYNC_PREFS_FILE", ""),
        ]);
        assert_eq!(config, SyncConfig::default());
    }
}
