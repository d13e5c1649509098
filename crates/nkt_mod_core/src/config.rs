//! Application configuration persistence.
//!
//! The config is a small JSON file created with defaults on first run and
//! rewritten whenever a setting changes. Paths are stored as-is; relative
//! paths resolve against the working directory.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Settings for one installation of the mod manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    /// Live game asset-bundle directory (the patch target).
    pub game_dir: Utf8PathBuf,

    /// Directory scanned for mods (`<name>/` or `<name>.zip`).
    pub mod_dir: Utf8PathBuf,

    /// Root of the per-mod bundle cache.
    pub cache_dir: Utf8PathBuf,

    /// Decode bundles on a worker pool instead of sequentially.
    pub parallel_load: bool,

    /// Whether to ingest the live game directory at all (disabled for
    /// offline inspection of mod files).
    pub load_game_data: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            game_dir: default_game_dir(),
            mod_dir: Utf8PathBuf::from("mods"),
            cache_dir: Utf8PathBuf::from("cache"),
            parallel_load: true,
            load_game_data: true,
        }
    }
}

/// The game's default bundle directory lives under `AppData/LocalLow`,
/// which has no dedicated environment variable — derive it from the
/// roaming path the way the game's own installer does.
fn default_game_dir() -> Utf8PathBuf {
    match std::env::var("APPDATA") {
        Ok(appdata) => Utf8PathBuf::from(appdata.replace("Roaming", "LocalLow"))
            .join("com_proximabeta")
            .join("NIKKE")
            .join("eb"),
        Err(_) => Utf8PathBuf::new(),
    }
}

impl AppConfig {
    /// Load the config from `path`, or create it with defaults if missing.
    pub fn load_or_init(path: &Utf8Path) -> Result<Self> {
        if path.as_std_path().exists() {
            let contents = std::fs::read_to_string(path.as_std_path())?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            let config = Self::default();
            config.save(path)?;
            Ok(config)
        }
    }

    /// Write the config to `path`, creating parent directories if needed.
    pub fn save(&self, path: &Utf8Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_str().is_empty() {
                std::fs::create_dir_all(parent.as_std_path())?;
            }
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_std_path(), contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_are_relative_dirs() {
        let config = AppConfig::default();
        assert_eq!(config.mod_dir, Utf8PathBuf::from("mods"));
        assert_eq!(config.cache_dir, Utf8PathBuf::from("cache"));
        assert!(config.parallel_load);
        assert!(config.load_game_data);
    }

    #[test]
    fn load_or_init_creates_then_round_trips() {
        let dir = tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("_config.json")).unwrap();

        let created = AppConfig::load_or_init(&path).unwrap();
        assert!(path.as_std_path().exists());

        let mut changed = created.clone();
        changed.parallel_load = false;
        changed.game_dir = Utf8PathBuf::from("game_data");
        changed.save(&path).unwrap();

        let loaded = AppConfig::load_or_init(&path).unwrap();
        assert!(!loaded.parallel_load);
        assert_eq!(loaded.game_dir, Utf8PathBuf::from("game_data"));
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("_config.json")).unwrap();
        std::fs::write(path.as_std_path(), r#"{"modDir":"other_mods"}"#).unwrap();

        let loaded = AppConfig::load_or_init(&path).unwrap();
        assert_eq!(loaded.mod_dir, Utf8PathBuf::from("other_mods"));
        assert_eq!(loaded.cache_dir, Utf8PathBuf::from("cache"));
    }
}
