//! CONFIG: Path utilities

use std::path::PathBuf;

/// Data directory (~/.fusion, or ./.fusion when no home directory is known)
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".fusion"))
        .unwrap_or_else(|| PathBuf::from(".fusion"))
}

/// Configuration file location
pub fn config_path() -> PathBuf {
    data_dir().join("config.json")
}
