//! Configuration loading and management

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

use crate::tap::KeyCombination;

/// Key-downs swallowed before a held quit is treated as deliberate.
/// The press after this count (the fifth) is forwarded to the application.
const DEFAULT_PRESS_THRESHOLD: u32 = 4;

/// How long the confirmation HUD stays visible after a quick tap is released.
const DEFAULT_HUD_LINGER: Duration = Duration::from_secs(1);

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Path to the durable accidental-quit count
    pub stats_path: PathBuf,

    /// The guarded key combination
    pub combination: KeyCombination,

    /// Swallowed-press threshold before a quit is allowed through
    pub press_threshold: u32,

    /// Delay before the HUD is dismissed after a released attempt
    pub hud_linger: Duration,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let home = std::env::var("HOME")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("qguard");

        let socket_path = data_dir.join("daemon.sock");
        let stats_path = data_dir.join("accidental_quits");

        Ok(Self {
            socket_path,
            data_dir,
            stats_path,
            combination: KeyCombination::command_q(),
            press_threshold: DEFAULT_PRESS_THRESHOLD,
            hud_linger: DEFAULT_HUD_LINGER,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_load() {
        let config = Config::load().unwrap();
        assert!(config.socket_path.to_string_lossy().contains("qguard"));
        assert_eq!(config.press_threshold, 4);
    }

    #[test]
    fn test_stats_path_under_data_dir() {
        let config = Config::load().unwrap();
        assert!(config.stats_path.starts_with(&config.data_dir));
    }
}
