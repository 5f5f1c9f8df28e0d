use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::catalog::DifficultyFilter;
use crate::identity::DEFAULT_APP_SLUG;
use crate::session::{SessionConfig, DEFAULT_SESSION_LENGTH};

pub const DEFAULT_MIN_SESSION_LENGTH: usize = 3;
pub const DEFAULT_MAX_SESSION_LENGTH: usize = 15;
pub const DEFAULT_REDIRECT_PORT: u16 = 54321;

const DEFAULT_IDENTITY_URL: &str = "https://api.srv936332.hstgr.cloud";
const DEFAULT_ANON_KEY: &str = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.eyAgCiAgICAicm9sZSI6ICJhbm9uIiwKICAgICJpc3MiOiAic3VwYWJhc2UtZGVtbyIsCiAgICAiaWF0IjogMTY0MTc2OTIwMCwKICAgICJleHAiOiAxNzk5NTM1NjAwCn0.dc_X5iR_VP_qT0zsiyj_I_OZ2T9FtRU2BBNWN8Bu4GE";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IdentityConfig {
    pub enabled: bool,
    pub url: String,
    pub anon_key: String,
    pub app_slug: String,
    pub redirect_port: u16,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: DEFAULT_IDENTITY_URL.to_string(),
            anon_key: DEFAULT_ANON_KEY.to_string(),
            app_slug: DEFAULT_APP_SLUG.to_string(),
            redirect_port: DEFAULT_REDIRECT_PORT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub difficulty: DifficultyFilter,
    pub session_length: usize,
    pub min_session_length: usize,
    pub max_session_length: usize,
    pub identity: IdentityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            difficulty: DifficultyFilter::All,
            session_length: DEFAULT_SESSION_LENGTH,
            min_session_length: DEFAULT_MIN_SESSION_LENGTH,
            max_session_length: DEFAULT_MAX_SESSION_LENGTH,
            identity: IdentityConfig::default(),
        }
    }
}

impl Config {
    /// Length bounds, tolerating a hand-edited file with min > max or a zero minimum
    pub fn length_bounds(&self) -> (usize, usize) {
        let min = self.min_session_length.max(1);
        (min, self.max_session_length.max(min))
    }

    pub fn clamp_length(&self, length: usize) -> usize {
        let (min, max) = self.length_bounds();
        length.clamp(min, max)
    }

    /// Menu settings this config starts with
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            difficulty: self.difficulty,
            length: self.clamp_length(self.session_length),
        }
    }

    /// Remember the last settings used from the menu
    pub fn remember(&mut self, session: &SessionConfig) {
        self.difficulty = session.difficulty;
        self.session_length = session.length;
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = if let Some(pd) = ProjectDirs::from("", "", "decido") {
            pd.config_dir().join("config.json")
        } else {
            PathBuf::from("decido_config.json")
        };
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        let Ok(bytes) = fs::read(&self.path) else {
            return Config::default();
        };
        match serde_json::from_slice::<Config>(&bytes) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(error = %e, path = %self.path.display(), "ignoring malformed config");
                Config::default()
            }
        }
    }

    fn save(&self, cfg: &Config) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg)?;
        fs::write(&self.path, data)
    }
}

/// Store that keeps the config in memory; used when nothing should touch disk
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    config: std::sync::Mutex<Config>,
}

impl MemoryConfigStore {
    pub fn new(config: Config) -> Self {
        Self {
            config: std::sync::Mutex::new(config),
        }
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> Config {
        self.config
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    fn save(&self, cfg: &Config) -> std::io::Result<()> {
        if let Ok(mut c) = self.config.lock() {
            *c = cfg.clone();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = FileConfigStore::with_path(&path);
        let cfg = Config::default();
        store.save(&cfg).unwrap();
        let loaded = store.load();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn save_and_load_custom_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let store = FileConfigStore::with_path(&path);
        let cfg = Config {
            difficulty: DifficultyFilter::Hard,
            session_length: 8,
            min_session_length: 2,
            max_session_length: 10,
            identity: IdentityConfig {
                enabled: false,
                redirect_port: 9000,
                ..IdentityConfig::default()
            },
        };
        store.save(&cfg).unwrap();
        let loaded = store.load();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let store = FileConfigStore::with_path(dir.path().join("absent.json"));
        assert_eq!(store.load(), Config::default());
    }

    #[test]
    fn malformed_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, b"{ not json").unwrap();
        assert_eq!(FileConfigStore::with_path(&path).load(), Config::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, br#"{"difficulty": "medium", "identity": {"enabled": false}}"#).unwrap();

        let cfg = FileConfigStore::with_path(&path).load();
        assert_eq!(cfg.difficulty, DifficultyFilter::Medium);
        assert_eq!(cfg.session_length, DEFAULT_SESSION_LENGTH);
        assert!(!cfg.identity.enabled);
        assert_eq!(cfg.identity.app_slug, DEFAULT_APP_SLUG);
    }

    #[test]
    fn clamp_length_respects_bounds() {
        let cfg = Config::default();
        assert_eq!(cfg.clamp_length(1), 3);
        assert_eq!(cfg.clamp_length(7), 7);
        assert_eq!(cfg.clamp_length(40), 15);
    }

    #[test]
    fn inverted_bounds_are_repaired() {
        let cfg = Config {
            min_session_length: 0,
            max_session_length: 0,
            ..Config::default()
        };
        assert_eq!(cfg.length_bounds(), (1, 1));

        let cfg = Config {
            min_session_length: 9,
            max_session_length: 4,
            ..Config::default()
        };
        assert_eq!(cfg.length_bounds(), (9, 9));
    }

    #[test]
    fn session_config_and_remember() {
        let mut cfg = Config {
            session_length: 99,
            ..Config::default()
        };
        assert_eq!(cfg.session_config().length, 15);

        cfg.remember(&SessionConfig {
            difficulty: DifficultyFilter::Easy,
            length: 4,
        });
        assert_eq!(cfg.difficulty, DifficultyFilter::Easy);
        assert_eq!(cfg.session_length, 4);
    }

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryConfigStore::default();
        let cfg = Config {
            session_length: 12,
            ..Config::default()
        };
        store.save(&cfg).unwrap();
        assert_eq!(store.load(), cfg);
    }
}
