//! File logging. The terminal belongs to the TUI, so events go to a log file.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

/// Environment variable holding the filter directives, e.g. `DECIDO_LOG=decido=debug`
pub const LOG_ENV: &str = "DECIDO_LOG";

const DEFAULT_DIRECTIVES: &str = "info";

pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Install the global subscriber, appending to `path`
pub fn init(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(io::Error::other)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_creates_log_file_and_writes_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("decido.log");

        init(&path).unwrap();
        tracing::warn!(marker = "logging-test", "hello from the test");

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("hello from the test"));
        assert!(contents.contains("logging-test"));

        // only one global subscriber per process
        assert!(init(&path).is_err());
    }
}
