mod config;
pub mod migrations;

pub use config::{Config, IdentityConfig, StorageConfig, TrackerConfig};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Environment variable that pins the data directory (used by tests and
/// multi-profile setups).
pub const DATA_DIR_ENV: &str = "TASKCLOCK_DATA_DIR";

/// Returns the data directory, creating it if needed.
///
/// `$TASKCLOCK_DATA_DIR` wins when set. Otherwise `~/.config/taskclock[-dev]/`
/// based on TASKCLOCK_ENV; set TASKCLOCK_ENV=dev to use the development
/// directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os(DATA_DIR_ENV) {
        Some(explicit) => PathBuf::from(explicit),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env = std::env::var("TASKCLOCK_ENV").unwrap_or_else(|_| "production".to_string());

            if env == "dev" {
                base_dir.join("taskclock-dev")
            } else {
                base_dir.join("taskclock")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
