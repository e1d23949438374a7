//! Application-level configuration loading: storage location, polling cadence
//! and the starting values of a fresh scoreboard.

use std::{
    env, fs,
    io::ErrorKind,
    ops::RangeInclusive,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use tracing::{info, warn};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    dto::validation::{validate_color, validate_team_name},
    error::ConfigError,
    services::sync_service::DEFAULT_BROADCAST_CAPACITY,
    state::GameDefaults,
};

/// Default location on disk where the binary looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "COURTSIDE_SYNC_CONFIG_PATH";
/// Directory holding the persisted scoreboard when none is configured.
const DEFAULT_DATA_DIR: &str = ".courtside";
const DEFAULT_POLL_INTERVAL_MS: u64 = 150;
const POLL_INTERVAL_RANGE_MS: RangeInclusive<u64> = 50..=1_000;

#[derive(Debug, Clone, PartialEq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    data_dir: PathBuf,
    poll_interval: Duration,
    broadcast_capacity: usize,
    defaults: GameDefaults,
}

impl AppConfig {
    /// Load the configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        Self::load_from(&resolve_config_path())
    }

    /// Same as [`load`](Self::load) for an explicit path.
    pub fn load_from(path: &Path) -> Self {
        match Self::try_load_from(path) {
            Ok(app_config) => {
                info!(
                    path = %path.display(),
                    data_dir = %app_config.data_dir.display(),
                    poll_interval_ms = app_config.poll_interval.as_millis() as u64,
                    "loaded configuration"
                );
                app_config
            }
            Err(ConfigError::Read(err)) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to load config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Read, parse and validate the file at `path` without any fallback.
    pub fn try_load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(ConfigError::Read)?;
        let raw: RawConfig = serde_json::from_str(&contents).map_err(ConfigError::Parse)?;
        raw.validate().map_err(ConfigError::Invalid)?;
        Ok(raw.into())
    }

    /// Directory the file-backed storage writes into.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Cadence at which surfaces recompute their readout.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Storage events buffered per listening context.
    pub fn broadcast_capacity(&self) -> usize {
        self.broadcast_capacity
    }

    /// Starting values for a scoreboard with nothing persisted.
    pub fn defaults(&self) -> &GameDefaults {
        &self.defaults
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
            defaults: GameDefaults::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    data_dir: Option<PathBuf>,
    #[validate(range(min = 50, max = 1000))]
    poll_interval_ms: Option<u64>,
    #[validate(range(min = 1, max = 4096))]
    broadcast_capacity: Option<usize>,
    #[validate(nested)]
    defaults: RawDefaults,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let fallback = Self::default();
        Self {
            data_dir: value.data_dir.unwrap_or(fallback.data_dir),
            poll_interval: value
                .poll_interval_ms
                .map(|ms| {
                    Duration::from_millis(
                        ms.clamp(*POLL_INTERVAL_RANGE_MS.start(), *POLL_INTERVAL_RANGE_MS.end()),
                    )
                })
                .unwrap_or(fallback.poll_interval),
            broadcast_capacity: value
                .broadcast_capacity
                .unwrap_or(fallback.broadcast_capacity),
            defaults: value.defaults.into(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
/// JSON representation of the `defaults` section; absent keys keep the
/// built-in value.
struct RawDefaults {
    team_a_name: Option<String>,
    team_b_name: Option<String>,
    team_a_color: Option<String>,
    team_b_color: Option<String>,
    timeout_duration_secs: Option<u32>,
    timeouts_per_team: Option<u32>,
    initial_timeouts: Option<u32>,
    rest_between_quarters_secs: Option<u32>,
    game_time_ms: Option<u64>,
    total_quarters: Option<u32>,
    overtime_ms: Option<u64>,
    foul_limit: Option<u32>,
}

impl Validate for RawDefaults {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        for (field, name) in [
            ("team_a_name", &self.team_a_name),
            ("team_b_name", &self.team_b_name),
        ] {
            if let Some(name) = name {
                if let Err(e) = validate_team_name(name) {
                    errors.add(field, e);
                }
            }
        }
        for (field, color) in [
            ("team_a_color", &self.team_a_color),
            ("team_b_color", &self.team_b_color),
        ] {
            if let Some(color) = color {
                if let Err(e) = validate_color(color) {
                    errors.add(field, e);
                }
            }
        }

        check_range(&mut errors, "timeout_duration_secs", self.timeout_duration_secs.map(u64::from), 1..=600);
        check_range(&mut errors, "timeouts_per_team", self.timeouts_per_team.map(u64::from), 0..=20);
        check_range(&mut errors, "initial_timeouts", self.initial_timeouts.map(u64::from), 0..=20);
        check_range(
            &mut errors,
            "rest_between_quarters_secs",
            self.rest_between_quarters_secs.map(u64::from),
            0..=3_600,
        );
        check_range(&mut errors, "game_time_ms", self.game_time_ms, 1_000..=3_600_000);
        check_range(&mut errors, "total_quarters", self.total_quarters.map(u64::from), 1..=20);
        check_range(&mut errors, "overtime_ms", self.overtime_ms, 1_000..=3_600_000);
        check_range(&mut errors, "foul_limit", self.foul_limit.map(u64::from), 0..=50);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl From<RawDefaults> for GameDefaults {
    fn from(value: RawDefaults) -> Self {
        let fallback = GameDefaults::default();
        Self {
            team_a_name: value.team_a_name.unwrap_or(fallback.team_a_name),
            team_b_name: value.team_b_name.unwrap_or(fallback.team_b_name),
            team_a_color: value.team_a_color.unwrap_or(fallback.team_a_color),
            team_b_color: value.team_b_color.unwrap_or(fallback.team_b_color),
            timeout_duration: value.timeout_duration_secs.unwrap_or(fallback.timeout_duration),
            timeouts_per_team: value.timeouts_per_team.unwrap_or(fallback.timeouts_per_team),
            initial_timeouts: value.initial_timeouts.unwrap_or(fallback.initial_timeouts),
            rest_between_quarters: value
                .rest_between_quarters_secs
                .unwrap_or(fallback.rest_between_quarters),
            default_game_time: value.game_time_ms.unwrap_or(fallback.default_game_time),
            total_quarters: value.total_quarters.unwrap_or(fallback.total_quarters),
            overtime_duration: value.overtime_ms.unwrap_or(fallback.overtime_duration),
            foul_limit: value.foul_limit.unwrap_or(fallback.foul_limit),
        }
    }
}

fn check_range(
    errors: &mut ValidationErrors,
    field: &'static str,
    value: Option<u64>,
    range: RangeInclusive<u64>,
) {
    let Some(value) = value else {
        return;
    };
    if !range.contains(&value) {
        let mut err = ValidationError::new("range");
        err.message = Some(
            format!(
                "{field} must be between {} and {} (got {value})",
                range.start(),
                range.end()
            )
            .into(),
        );
        errors.add(field, err);
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(&dir.path().join("absent.json"));
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.poll_interval(), Duration::from_millis(150));
    }

    #[test]
    fn partial_file_overrides_only_given_values() {
        let file = write_config(
            r##"{
                "data_dir": "/var/lib/scoreboard",
                "poll_interval_ms": 100,
                "defaults": { "team_a_name": "Hawks", "team_a_color": "#0f0", "total_quarters": 2 }
            }"##,
        );
        let config = AppConfig::try_load_from(file.path()).unwrap();
        assert_eq!(config.data_dir(), Path::new("/var/lib/scoreboard"));
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.broadcast_capacity(), DEFAULT_BROADCAST_CAPACITY);
        assert_eq!(config.defaults().team_a_name, "Hawks");
        assert_eq!(config.defaults().total_quarters, 2);
        assert_eq!(config.defaults().team_b_name, "Away Team");
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let file = write_config(
            r#"{ "poll_interval_ms": 5, "defaults": { "team_b_color": "blue", "total_quarters": 0 } }"#,
        );
        let Err(ConfigError::Invalid(errors)) = AppConfig::try_load_from(file.path()) else {
            panic!("expected validation failure");
        };
        let rendered = errors.to_string();
        assert!(rendered.contains("poll_interval_ms"));
        assert!(rendered.contains("team_b_color"));
        assert!(rendered.contains("total_quarters"));

        assert_eq!(AppConfig::load_from(file.path()), AppConfig::default());
    }

    #[test]
    fn unknown_keys_fail_to_parse() {
        let file = write_config(r#"{ "colors": [] }"#);
        assert!(matches!(
            AppConfig::try_load_from(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }
}
