use directories::ProjectDirs;
use std::path::PathBuf;

const APP_NAME: &str = "decido";

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    /// `~/.local/state/decido`, or the platform's local data dir without `$HOME`
    pub fn state_dir() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            Some(
                PathBuf::from(home)
                    .join(".local")
                    .join("state")
                    .join(APP_NAME),
            )
        } else {
            ProjectDirs::from("", "", APP_NAME).map(|pd| pd.data_local_dir().to_path_buf())
        }
    }

    /// Signed-in identity session (auth tokens only)
    pub fn auth_session_path() -> Option<PathBuf> {
        Self::state_dir().map(|dir| dir.join("auth_session.json"))
    }

    pub fn log_path() -> Option<PathBuf> {
        Self::state_dir().map(|dir| dir.join("decido.log"))
    }
}
