//! Configuration loading and typed config structures for Herald.
//!
//! The canonical configuration lives in `herald.yaml`. This module defines
//! strongly-typed structs that mirror the YAML structure, a loader that
//! reads the file and applies environment overrides, and the validation
//! that turns it into the [`ServiceSettings`] the reconciliation service
//! runs with. Validation failures are fatal at startup.

use std::collections::BTreeSet;
use std::num::NonZeroU64;
use std::path::Path;
use std::time::Duration;

use herald_types::TrackedGame;
use serde::Deserialize;

/// Errors that can occur when loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A required setting is absent.
    #[error("missing required setting: {field}")]
    Missing {
        /// Name of the setting.
        field: &'static str,
    },

    /// A setting is present but unusable.
    #[error("invalid setting {field}: {reason}")]
    Invalid {
        /// Name of the setting.
        field: &'static str,
        /// Explanation of what is wrong with it.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Milestone frequency `F`: announcements fire at multiples of this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MilestoneFrequency(NonZeroU64);

impl MilestoneFrequency {
    /// Validate a raw frequency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `value` is zero.
    pub fn new(value: u64) -> Result<Self, ConfigError> {
        NonZeroU64::new(value)
            .map(Self)
            .ok_or_else(|| ConfigError::Invalid {
                field: "milestone_frequency",
                reason: "must be greater than zero".to_owned(),
            })
    }

    /// Return the frequency as a plain integer.
    pub const fn get(self) -> u64 {
        self.0.get()
    }

    /// Return the frequency as a non-zero integer.
    pub const fn non_zero(self) -> NonZeroU64 {
        self.0
    }
}

/// Top-level Herald configuration.
///
/// Mirrors the structure of `herald.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HeraldConfig {
    /// Milestone frequency `F`. Required; there is no default.
    #[serde(default)]
    pub milestone_frequency: Option<u64>,

    /// Seconds between reconciliation passes.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Path of the persisted state document.
    #[serde(default = "default_state_path")]
    pub state_path: String,

    /// Discord role mentioned at the start of every announcement.
    #[serde(default)]
    pub announce_role_id: Option<String>,

    /// Universes to track, in announcement order.
    #[serde(default)]
    pub games: Vec<TrackedGame>,

    /// Discord REST settings.
    #[serde(default)]
    pub discord: DiscordConfig,

    /// Roblox catalog settings.
    #[serde(default)]
    pub roblox: RobloxConfig,
}

impl Default for HeraldConfig {
    fn default() -> Self {
        Self {
            milestone_frequency: None,
            poll_interval_secs: default_poll_interval_secs(),
            state_path: default_state_path(),
            announce_role_id: None,
            games: Vec::new(),
            discord: DiscordConfig::default(),
            roblox: RobloxConfig::default(),
        }
    }
}

impl HeraldConfig {
    /// Load configuration from a YAML file and apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = serde_yml::from_str(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Like [`from_file`](Self::from_file), but a missing file yields the
    /// defaults so a deployment can be configured from the environment
    /// alone.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for any failure other than the file being
    /// absent.
    pub fn from_file_or_env(path: &Path) -> Result<Self, ConfigError> {
        match Self::from_file(path) {
            Err(ConfigError::Io { source }) if source.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    path = %path.display(),
                    "Config file not found, using environment only"
                );
                let mut config = Self::default();
                config.apply_env_overrides();
                Ok(config)
            }
            other => other,
        }
    }

    /// Parse configuration from a YAML string. No environment overrides
    /// are applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Override settings with process environment variables when set.
    ///
    /// - `DISCORD_TOKEN` (or `TOKEN`) sets the bot token (never read from the file)
    /// - `MILESTONE_FREQUENCY` (or `FREQUENCY`) overrides `milestone_frequency`
    /// - `POLL_INTERVAL_SECS` overrides `poll_interval_secs`
    /// - `STATE_PATH` overrides `state_path`
    /// - `ANNOUNCE_ROLE_ID` overrides `announce_role_id`
    /// - `UNIVERSE_ID` + `CHANNEL_ID` (or `UNIVERSEID` + `CHANNELID`) append
    ///   one tracked game
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Unparseable numeric values become zero, which
    /// [`validate`](Self::validate) rejects.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup("DISCORD_TOKEN").or_else(|| lookup("TOKEN")) {
            self.discord.token = Some(token);
        }
        if let Some(raw) = lookup("MILESTONE_FREQUENCY").or_else(|| lookup("FREQUENCY")) {
            self.milestone_frequency = Some(raw.trim().parse().unwrap_or(0));
        }
        if let Some(raw) = lookup("POLL_INTERVAL_SECS") {
            self.poll_interval_secs = raw.trim().parse().unwrap_or(0);
        }
        if let Some(path) = lookup("STATE_PATH") {
            self.state_path = path;
        }
        if let Some(role) = lookup("ANNOUNCE_ROLE_ID") {
            self.announce_role_id = Some(role);
        }
        let universe_id = lookup("UNIVERSE_ID").or_else(|| lookup("UNIVERSEID"));
        let channel_id = lookup("CHANNEL_ID").or_else(|| lookup("CHANNELID"));
        if let (Some(universe_id), Some(channel_id)) = (universe_id, channel_id) {
            let already_tracked = self
                .games
                .iter()
                .any(|g| g.universe_id.as_str() == universe_id);
            if !already_tracked {
                self.games.push(TrackedGame::new(universe_id, channel_id));
            }
        }
    }

    /// Validate the configuration and derive the service settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the milestone frequency is missing or
    /// zero, the poll interval is zero, no games are tracked, or a tracked
    /// game has a blank/non-numeric universe id, a blank channel id, or a
    /// duplicate universe id.
    pub fn validate(&self) -> Result<ServiceSettings, ConfigError> {
        let frequency = MilestoneFrequency::new(
            self.milestone_frequency
                .ok_or(ConfigError::Missing { field: "milestone_frequency" })?,
        )?;

        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "poll_interval_secs",
                reason: "must be greater than zero".to_owned(),
            });
        }

        if self.games.is_empty() {
            return Err(ConfigError::Missing { field: "games" });
        }

        let mut seen = BTreeSet::new();
        for game in &self.games {
            if !game.universe_id.is_numeric() {
                return Err(ConfigError::Invalid {
                    field: "games.universe_id",
                    reason: format!("{:?} is not a numeric universe id", game.universe_id.as_str()),
                });
            }
            if game.channel_id.is_blank() {
                return Err(ConfigError::Invalid {
                    field: "games.channel_id",
                    reason: format!("universe {} has no channel", game.universe_id),
                });
            }
            if !seen.insert(&game.universe_id) {
                return Err(ConfigError::Invalid {
                    field: "games.universe_id",
                    reason: format!("universe {} is listed twice", game.universe_id),
                });
            }
        }

        Ok(ServiceSettings {
            frequency,
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            games: self.games.clone(),
            message_style: MessageStyle {
                role_id: self
                    .announce_role_id
                    .as_ref()
                    .filter(|r| !r.trim().is_empty())
                    .cloned(),
                place_url_base: self.roblox.place_url_base.clone(),
            },
        })
    }
}

/// Discord REST settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DiscordConfig {
    /// Base URL of the Discord REST API.
    #[serde(default = "default_discord_api_base")]
    pub api_base: String,

    /// Bot token. Only ever populated from `DISCORD_TOKEN`.
    #[serde(skip)]
    pub token: Option<String>,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            api_base: default_discord_api_base(),
            token: None,
        }
    }
}

/// Roblox catalog settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RobloxConfig {
    /// Base URL of the games API (universe metadata).
    #[serde(default = "default_games_api")]
    pub games_api: String,

    /// Base URL of the develop API (place listings).
    #[serde(default = "default_develop_api")]
    pub develop_api: String,

    /// Base URL place deep links are built from.
    #[serde(default = "default_place_url_base")]
    pub place_url_base: String,

    /// Maximum number of place listing pages followed per universe.
    #[serde(default = "default_max_place_pages")]
    pub max_place_pages: u32,
}

impl Default for RobloxConfig {
    fn default() -> Self {
        Self {
            games_api: default_games_api(),
            develop_api: default_develop_api(),
            place_url_base: default_place_url_base(),
            max_place_pages: default_max_place_pages(),
        }
    }
}

/// Validated settings the reconciliation service runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSettings {
    /// Milestone frequency `F`.
    pub frequency: MilestoneFrequency,
    /// Time between passes.
    pub poll_interval: Duration,
    /// Tracked games, non-empty and unique by universe id.
    pub games: Vec<TrackedGame>,
    /// Announcement formatting options.
    pub message_style: MessageStyle,
}

/// Formatting options for announcement text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageStyle {
    /// Role mentioned at the start of each announcement.
    pub role_id: Option<String>,
    /// Base URL place deep links are built from.
    pub place_url_base: String,
}

impl Default for MessageStyle {
    fn default() -> Self {
        Self {
            role_id: None,
            place_url_base: default_place_url_base(),
        }
    }
}

const fn default_poll_interval_secs() -> u64 {
    300
}

fn default_state_path() -> String {
    "herald-state.json".to_owned()
}

fn default_discord_api_base() -> String {
    "https://discord.com/api/v10".to_owned()
}

fn default_games_api() -> String {
    "https://games.roblox.com".to_owned()
}

fn default_develop_api() -> String {
    "https://develop.roblox.com".to_owned()
}

fn default_place_url_base() -> String {
    "https://www.roblox.com/games".to_owned()
}

const fn default_max_place_pages() -> u32 {
    10
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    const FULL_YAML: &str = r#"
milestone_frequency: 1000
poll_interval_secs: 60
state_path: "/var/lib/herald/state.json"
announce_role_id: "555"
games:
  - universe_id: "4922741943"
    channel_id: "1100000000000000001"
    display_name: "Tower of Trials"
  - universe_id: "12345"
    channel_id: "1100000000000000002"
discord:
  api_base: "http://localhost:9000/api"
roblox:
  games_api: "http://localhost:9001"
  max_place_pages: 3
"#;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn parse_full_yaml() {
        let config = HeraldConfig::parse(FULL_YAML).unwrap();
        assert_eq!(config.milestone_frequency, Some(1000));
        assert_eq!(config.poll_interval_secs, 60);
        assert_eq!(config.state_path, "/var/lib/herald/state.json");
        assert_eq!(config.games.len(), 2);
        assert_eq!(
            config.games.first().unwrap().display_name.as_deref(),
            Some("Tower of Trials")
        );
        assert_eq!(config.discord.api_base, "http://localhost:9000/api");
        assert!(config.discord.token.is_none());
        assert_eq!(config.roblox.games_api, "http://localhost:9001");
        assert_eq!(config.roblox.develop_api, "https://develop.roblox.com");
        assert_eq!(config.roblox.max_place_pages, 3);
    }

    #[test]
    fn validated_settings_carry_everything() {
        let settings = HeraldConfig::parse(FULL_YAML).unwrap().validate().unwrap();
        assert_eq!(settings.frequency.get(), 1000);
        assert_eq!(settings.poll_interval, Duration::from_secs(60));
        assert_eq!(settings.games.len(), 2);
        assert_eq!(settings.message_style.role_id.as_deref(), Some("555"));
        assert_eq!(
            settings.message_style.place_url_base,
            "https://www.roblox.com/games"
        );
    }

    #[test]
    fn missing_frequency_is_rejected() {
        let mut config = HeraldConfig::parse(FULL_YAML).unwrap();
        config.milestone_frequency = None;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing { field: "milestone_frequency" }));
    }

    #[test]
    fn zero_frequency_is_rejected() {
        let mut config = HeraldConfig::parse(FULL_YAML).unwrap();
        config.milestone_frequency = Some(0);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "milestone_frequency", .. }));
    }

    #[test]
    fn empty_game_list_is_rejected() {
        let config = HeraldConfig::parse("milestone_frequency: 10\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing { field: "games" }));
    }

    #[test]
    fn non_numeric_universe_is_rejected() {
        let yaml = "milestone_frequency: 10\ngames:\n  - universe_id: \"abc\"\n    channel_id: \"1\"\n";
        let err = HeraldConfig::parse(yaml).unwrap().validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "games.universe_id", .. }));
    }

    #[test]
    fn blank_channel_is_rejected() {
        let yaml = "milestone_frequency: 10\ngames:\n  - universe_id: \"1\"\n    channel_id: \" \"\n";
        let err = HeraldConfig::parse(yaml).unwrap().validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "games.channel_id", .. }));
    }

    #[test]
    fn duplicate_universe_is_rejected() {
        let yaml = "milestone_frequency: 10\ngames:\n  - universe_id: \"1\"\n    channel_id: \"2\"\n  - universe_id: \"1\"\n    channel_id: \"3\"\n";
        let err = HeraldConfig::parse(yaml).unwrap().validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "games.universe_id", .. }));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut config = HeraldConfig::parse(FULL_YAML).unwrap();
        config.poll_interval_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "poll_interval_secs", .. }));
    }

    #[test]
    fn env_only_configuration_validates() {
        let mut config = HeraldConfig::default();
        config.apply_overrides_from(env(&[
            ("DISCORD_TOKEN", "secret"),
            ("FREQUENCY", "500"),
            ("UNIVERSE_ID", "777"),
            ("CHANNEL_ID", "888"),
        ]));
        assert_eq!(config.discord.token.as_deref(), Some("secret"));

        let settings = config.validate().unwrap();
        assert_eq!(settings.frequency.get(), 500);
        let game = settings.games.first().unwrap();
        assert_eq!(game.universe_id.as_str(), "777");
        assert_eq!(game.channel_id.as_str(), "888");
    }

    #[test]
    fn short_env_names_are_accepted() {
        let mut config = HeraldConfig::default();
        config.apply_overrides_from(env(&[
            ("TOKEN", "legacy-secret"),
            ("FREQUENCY", "1000"),
            ("UNIVERSEID", "4242"),
            ("CHANNELID", "5151"),
        ]));
        assert_eq!(config.discord.token.as_deref(), Some("legacy-secret"));

        let settings = config.validate().unwrap();
        let game = settings.games.first().unwrap();
        assert_eq!(game.universe_id.as_str(), "4242");
        assert_eq!(game.channel_id.as_str(), "5151");
    }

    #[test]
    fn long_env_names_win_over_short_ones() {
        let mut config = HeraldConfig::default();
        config.apply_overrides_from(env(&[
            ("DISCORD_TOKEN", "new"),
            ("TOKEN", "old"),
            ("UNIVERSE_ID", "1"),
            ("UNIVERSEID", "2"),
            ("CHANNELID", "3"),
        ]));
        assert_eq!(config.discord.token.as_deref(), Some("new"));
        assert_eq!(config.games.len(), 1);
        let game = config.games.first().unwrap();
        assert_eq!(game.universe_id.as_str(), "1");
        assert_eq!(game.channel_id.as_str(), "3");
    }

    #[test]
    fn env_game_is_not_duplicated() {
        let mut config = HeraldConfig::parse(FULL_YAML).unwrap();
        config.apply_overrides_from(env(&[("UNIVERSE_ID", "12345"), ("CHANNEL_ID", "9")]));
        assert_eq!(config.games.len(), 2);
    }

    #[test]
    fn unparseable_env_frequency_fails_validation() {
        let mut config = HeraldConfig::parse(FULL_YAML).unwrap();
        config.apply_overrides_from(env(&[("MILESTONE_FREQUENCY", "lots")]));
        assert!(config.validate().is_err());
    }

    #[test]
    fn blank_role_is_dropped() {
        let mut config = HeraldConfig::parse(FULL_YAML).unwrap();
        config.announce_role_id = Some("  ".to_owned());
        let settings = config.validate().unwrap();
        assert!(settings.message_style.role_id.is_none());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = std::env::temp_dir().join(format!(
            "herald_config_missing_{}_{:?}",
            std::process::id(),
            std::thread::current().id(),
        ));
        let config = HeraldConfig::from_file_or_env(&dir.join("absent.yaml")).unwrap();
        assert_eq!(config.roblox, RobloxConfig::default());
        assert_eq!(config.discord.api_base, "https://discord.com/api/v10");
    }
}
