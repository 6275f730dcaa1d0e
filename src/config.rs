use clap::Parser;
use std::path::PathBuf;

use crate::state::error::LibraryError;
use crate::state::library::Library;
use crate::state::store::SqliteStore;

/// Command-line and environment configuration
#[derive(Debug, Clone, Parser)]
#[command(name = "photo-browser", version, about = "Browse, search and organise a local photo library")]
pub struct Config {
    /// Catalog database (defaults to the platform data directory)
    #[arg(long, env = "PHOTO_BROWSER_LIBRARY")]
    pub library: Option<PathBuf>,

    /// Database for persisted view state (defaults to the platform cache directory)
    #[arg(long, env = "PHOTO_BROWSER_STATE")]
    pub state_db: Option<PathBuf>,

    /// Initial grid query, e.g. "album=3&sort=quality"
    #[arg(long, default_value = "")]
    pub location: String,

    /// Device ID recorded on uploaded assets
    #[arg(long, env = "PHOTO_BROWSER_DEVICE_ID", default_value = "desktop-client")]
    pub device_id: String,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, env = "PHOTO_BROWSER_LOG", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn library_path(&self) -> Result<PathBuf, LibraryError> {
        match &self.library {
            Some(path) => Ok(path.clone()),
            None => Library::default_path(),
        }
    }

    pub fn state_path(&self) -> Result<PathBuf, LibraryError> {
        match &self.state_db {
            Some(path) => Ok(path.clone()),
            None => SqliteStore::default_path(),
        }
    }

    /// Query string to mount the grid with, without a leading '?'
    pub fn initial_query(&self) -> &str {
        let location = self.location.trim();
        location.strip_prefix('?').unwrap_or(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_paths() {
        let config = Config::try_parse_from([
            "photo-browser",
            "--library",
            "/tmp/lib.db",
            "--state-db",
            "/tmp/state.db",
            "--location",
            "?album=4&sort=quality",
            "--device-id",
            "laptop",
        ])
        .unwrap();

        assert_eq!(config.library_path().unwrap(), PathBuf::from("/tmp/lib.db"));
        assert_eq!(config.state_path().unwrap(), PathBuf::from("/tmp/state.db"));
        assert_eq!(config.initial_query(), "album=4&sort=quality");
        assert_eq!(config.device_id, "laptop");
    }

    #[test]
    fn test_location_defaults_to_all_photos() {
        let config = Config::try_parse_from(["photo-browser"]).unwrap();
        assert_eq!(config.initial_query(), "");
    }
}
