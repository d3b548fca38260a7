use std::path::PathBuf;
use std::time::Duration;

use common::PlayerError;
use serde::{Deserialize, Serialize};

/// Player configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Metadata server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Playback and recovery settings
    #[serde(default)]
    pub playback: PlaybackConfig,

    /// Timeline and scheduling settings
    #[serde(default)]
    pub timeline: TimelineConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Metadata request timeout
    #[serde(serialize_with = "crate::serde_helpers::serialize_duration")]
    #[serde(deserialize_with = "crate::serde_helpers::deserialize_duration")]
    pub request_timeout: Duration,

    /// User agent sent with metadata and manifest requests
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Live quality tier selected on mount
    pub default_quality: String,

    /// Fatal engine errors tolerated before the session is destroyed
    pub max_fatal_retries: u32,

    /// Delay before reloading after a fatal network error
    #[serde(serialize_with = "crate::serde_helpers::serialize_duration")]
    #[serde(deserialize_with = "crate::serde_helpers::deserialize_duration")]
    pub network_retry_delay: Duration,

    /// Rewind step in milliseconds
    pub rewind_step_ms: i64,

    /// Recorded range ends this far behind the live edge
    pub live_margin_ms: i64,

    /// Playhead lands this far past the end of a skipped gap
    pub missing_skip_ms: i64,

    /// Live playback trailing the edge by more than this is treated as archive
    pub live_lag_threshold_ms: i64,

    /// Fixed display offset overriding the camera's time zone
    pub utc_offset_minutes: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineConfig {
    /// Live edge heartbeat
    #[serde(serialize_with = "crate::serde_helpers::serialize_duration")]
    #[serde(deserialize_with = "crate::serde_helpers::deserialize_duration")]
    pub heartbeat_interval: Duration,

    /// Video position sampling
    #[serde(serialize_with = "crate::serde_helpers::serialize_duration")]
    #[serde(deserialize_with = "crate::serde_helpers::deserialize_duration")]
    pub position_tick_interval: Duration,

    /// Metadata refresh period
    #[serde(serialize_with = "crate::serde_helpers::serialize_duration")]
    #[serde(deserialize_with = "crate::serde_helpers::deserialize_duration")]
    pub refresh_interval: Duration,

    /// Motion overlay re-render delay after the viewport settles
    #[serde(serialize_with = "crate::serde_helpers::serialize_duration")]
    #[serde(deserialize_with = "crate::serde_helpers::deserialize_duration")]
    pub motion_settle_delay: Duration,

    /// Below this window length motion intervals are never joined
    pub join_start_ms: i64,

    /// Above this window length the join distance is capped
    pub join_end_ms: i64,

    /// Join distance used above `join_end_ms`
    pub join_max_ms: i64,

    /// Window length divisor between the thresholds
    pub join_divisor: i64,

    /// Visible window length on mount
    pub initial_window_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Print the event target
    pub with_target: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            user_agent: format!("archive-player/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            default_quality: "best".to_string(),
            max_fatal_retries: 60,
            network_retry_delay: Duration::from_secs(5),
            rewind_step_ms: 15_000,
            live_margin_ms: 60_000,
            missing_skip_ms: 1_000,
            live_lag_threshold_ms: 5_000,
            utc_offset_minutes: None,
        }
    }
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(1),
            position_tick_interval: Duration::from_millis(250),
            refresh_interval: Duration::from_secs(60),
            motion_settle_delay: Duration::from_millis(500),
            join_start_ms: 10_000_000,
            join_end_ms: 63_000_000,
            join_max_ms: 400_000,
            join_divisor: 100,
            initial_window_ms: 3_600_000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            with_target: false,
        }
    }
}

impl PlaybackConfig {
    pub fn offset_for(&self, camera_offset_minutes: i32) -> i32 {
        self.utc_offset_minutes.unwrap_or(camera_offset_minutes)
    }
}

/// Configuration manager for loading, saving, and validating configurations
pub struct ConfigManager {
    config_path: PathBuf,
    config: PlayerConfig,
}

impl ConfigManager {
    pub fn new(config_path: PathBuf) -> Self {
        Self {
            config_path,
            config: PlayerConfig::default(),
        }
    }

    /// Load configuration from file, writing the defaults when it does not exist yet
    pub async fn load(&mut self) -> Result<(), PlayerError> {
        if !self.config_path.exists() {
            self.save().await?;
            return Ok(());
        }

        let content = tokio::fs::read_to_string(&self.config_path)
            .await
            .map_err(|e| PlayerError::Config(format!("Failed to read config file: {}", e)))?;

        self.config = toml::from_str(&content)
            .map_err(|e| PlayerError::Config(format!("Failed to parse config file: {}", e)))?;

        self.validate()?;
        Ok(())
    }

    pub async fn save(&self) -> Result<(), PlayerError> {
        let content = toml::to_string_pretty(&self.config)
            .map_err(|e| PlayerError::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    PlayerError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        tokio::fs::write(&self.config_path, content)
            .await
            .map_err(|e| PlayerError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    pub fn get_config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn get_config_mut(&mut self) -> &mut PlayerConfig {
        &mut self.config
    }

    pub fn into_config(self) -> PlayerConfig {
        self.config
    }

    pub fn validate(&self) -> Result<(), PlayerError> {
        let playback = &self.config.playback;
        let timeline = &self.config.timeline;

        if playback.default_quality.is_empty() {
            return Err(PlayerError::Config("Default quality cannot be empty".to_string()));
        }

        if playback.max_fatal_retries == 0 {
            return Err(PlayerError::Config(
                "Max fatal retries must be greater than 0".to_string(),
            ));
        }

        if playback.rewind_step_ms <= 0 {
            return Err(PlayerError::Config("Rewind step must be greater than 0".to_string()));
        }

        if playback.live_margin_ms < 0 || playback.missing_skip_ms < 0 {
            return Err(PlayerError::Config("Margins cannot be negative".to_string()));
        }

        if let Some(offset) = playback.utc_offset_minutes {
            if !(-14 * 60..=14 * 60).contains(&offset) {
                return Err(PlayerError::Config(format!("UTC offset out of range: {}", offset)));
            }
        }

        if timeline.heartbeat_interval.is_zero() || timeline.position_tick_interval.is_zero() {
            return Err(PlayerError::Config("Tick intervals must be greater than 0".to_string()));
        }

        if timeline.join_start_ms > timeline.join_end_ms {
            return Err(PlayerError::Config(
                "Join start threshold must not exceed the end threshold".to_string(),
            ));
        }

        if timeline.join_divisor <= 0 {
            return Err(PlayerError::Config("Join divisor must be greater than 0".to_string()));
        }

        Ok(())
    }
}

/// Environment-based configuration override
pub struct EnvConfigOverride;

impl EnvConfigOverride {
    pub fn apply_overrides(config: &mut PlayerConfig) {
        use std::env;

        if let Ok(quality) = env::var("ARCHIVE_PLAYER_QUALITY") {
            config.playback.default_quality = quality;
        }
        if let Ok(retries) = env::var("ARCHIVE_PLAYER_MAX_RETRIES") {
            if let Ok(retries) = retries.parse::<u32>() {
                config.playback.max_fatal_retries = retries;
            }
        }
        if let Ok(offset) = env::var("ARCHIVE_PLAYER_UTC_OFFSET") {
            if let Ok(offset) = offset.parse::<i32>() {
                config.playback.utc_offset_minutes = Some(offset);
            }
        }
        if let Ok(level) = env::var("ARCHIVE_PLAYER_LOG_LEVEL") {
            config.logging.level = level;
        }
    }
}
