use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use starhaven_session::SessionConfig;
use tracing::warn;

pub const DEFAULT_CONFIG_PATH: &str = "config/starhaven.toml";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Name the local player joins with.
    pub player_name: String,
    /// World seed a host generates from. Random when unset.
    pub seed: Option<u64>,
    pub session: SessionConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            player_name: "Pilot".to_string(),
            seed: None,
            session: SessionConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `path`, falling back to defaults on errors.
    ///
    /// Called before logging is installed, so problems are returned as a
    /// message for the caller to log once the subscriber is up.
    pub fn load_from_path(path: &Path) -> (Self, Option<String>) {
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<AppConfig>(&contents) {
                Ok(cfg) => (cfg, None),
                Err(err) => (
                    AppConfig::default(),
                    Some(format!("Failed to parse {}: {err}. Using defaults", path.display())),
                ),
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound && path == Path::new(DEFAULT_CONFIG_PATH) => (
                AppConfig::default(),
                Some(format!("Config not found at {}. Using defaults", path.display())),
            ),
            Err(err) => (
                AppConfig::default(),
                Some(format!("Failed to read {}: {err}. Using defaults", path.display())),
            ),
        }
    }

    /// Write the configuration as TOML, creating parent directories.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        let toml = toml::to_string_pretty(self).context("Failed to serialize config")?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Clamp values that would stall or break a session.
    pub fn sanitized(mut self) -> Self {
        let session = &mut self.session;
        if session.server_update_tick.is_nan() || session.server_update_tick <= 0.0 {
            warn!(value = session.server_update_tick, "server_update_tick must be positive");
            session.server_update_tick = SessionConfig::default().server_update_tick;
        }
        session.max_update_tick_count = session.max_update_tick_count.max(1);
        if session.non_player_update_tick >= session.max_update_tick_count {
            session.non_player_update_tick = 0;
        }
        session.world_size = session.world_size.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use starhaven_core::PlanetType;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (config, problem) = AppConfig::load_from_path(&dir.path().join("absent.toml"));
        assert_eq!(config, AppConfig::default());
        assert!(problem.is_some());
    }

    #[test]
    fn partial_files_keep_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("starhaven.toml");
        fs::write(
            &path,
            "player_name = \"Vega\"\n[session]\nworld_size = 32\nstarting_planet = 2\n",
        )
        .unwrap();
        let (config, problem) = AppConfig::load_from_path(&path);
        assert!(problem.is_none());
        assert_eq!(config.player_name, "Vega");
        assert_eq!(config.session.world_size, 32);
        assert_eq!(config.session.starting_planet, PlanetType::GLACIER);
        assert_eq!(config.session.chunk_request_timeout, SessionConfig::default().chunk_request_timeout);
    }

    #[test]
    fn malformed_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "session = 3").unwrap();
        let (config, problem) = AppConfig::load_from_path(&path);
        assert_eq!(config, AppConfig::default());
        assert!(problem.unwrap().contains("Failed to parse"));
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/starhaven.toml");
        let config = AppConfig {
            seed: Some(42),
            ..AppConfig::default()
        };
        config.save_to_path(&path).unwrap();
        assert_eq!(AppConfig::load_from_path(&path).0, config);
    }

    #[test]
    fn sanitizing_repairs_the_cadence() {
        let mut config = AppConfig::default();
        config.session.server_update_tick = 0.0;
        config.session.max_update_tick_count = 0;
        let config = config.sanitized();
        assert!(config.session.server_update_tick > 0.0);
        assert_eq!(config.session.max_update_tick_count, 1);
        assert_eq!(config.session.non_player_update_tick, 0);
    }
}
