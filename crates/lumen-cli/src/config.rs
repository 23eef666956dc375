//! Configuration loading and management.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use lumen_core::EngineConfig;
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,

    /// Engine thresholds, freeze policy, milestone table and calendar.
    #[serde(default)]
    pub engine: EngineConfig,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("lumen.db"),
            engine: EngineConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from default locations, optionally layering a
    /// specific file on top.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (LUMEN_*, nested keys split on "__")
        figment = figment.merge(Env::prefixed("LUMEN_").split("__"));

        figment.extract()
    }
}

/// Returns the platform-specific config directory for lumen.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("lumen"))
}

/// Returns the platform-specific data directory for lumen.
///
/// On Linux: `~/.local/share/lumen`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("lumen"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use lumen_core::RewardType;

    use super::*;

    #[test]
    fn test_dirs_data_path_ends_with_lumen() {
        let path = dirs_data_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "lumen");
    }

    #[test]
    fn test_default_config_uses_data_dir_for_db() {
        let config = Config::default();
        let data_dir = dirs_data_path().unwrap();
        assert_eq!(config.database_path, data_dir.join("lumen.db"));
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn test_config_file_overrides_engine() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
database_path = "/tmp/lumen-test.db"

[engine.calendar]
utc_offset_minutes = 120

[engine.qualification]
min_xp = 40

[[engine.milestones]]
streak_threshold = 3
reward_type = "xp"
reward_amount = 30
name = "Hat Trick"
"#
        )
        .unwrap();
        file.flush().unwrap();

        let config = Config::load_from(Some(file.path())).unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/lumen-test.db"));
        assert_eq!(config.engine.calendar.utc_offset_minutes(), 120);
        assert_eq!(config.engine.qualification.min_xp, 40);
        assert_eq!(config.engine.qualification.min_questions, 5);
        assert_eq!(config.engine.milestones.entries().len(), 1);
        let hat_trick = config.engine.milestones.check(3).unwrap();
        assert_eq!(hat_trick.reward_type, RewardType::Xp);
    }

    #[test]
    fn test_invalid_milestone_table_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[[engine.milestones]]
streak_threshold = 10
reward_type = "xp"
reward_amount = 30
name = "Ten"

[[engine.milestones]]
streak_threshold = 5
reward_type = "xp"
reward_amount = 30
name = "Five"
"#
        )
        .unwrap();
        file.flush().unwrap();

        assert!(Config::load_from(Some(file.path())).is_err());
    }
}
