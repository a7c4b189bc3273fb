//! Configuration layer: typed settings with layered precedence (file → env).

use std::{path::Path, str::FromStr, time::Duration};

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::application::batching::DEFAULT_EMAIL_INTERVAL;
use crate::application::busy::{DEFAULT_MAX_BUSY_DURATION, MAX_BUSY_DURATION_LIMIT};
use crate::application::notifications::DEFAULT_MAX_NOTIFICATIONS_PER_CHANNEL;
use crate::cache::CacheConfig;
use crate::domain::types::ContentMode;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "herald";
const ENV_PREFIX: &str = "HERALD";
const DEFAULT_EMAIL_BATCHING_CADENCE_SECS: u64 = 30;
const DEFAULT_BUSY_WATCHER_PERIOD_SECS: u64 = 60;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub cache: CacheConfig,
    pub notifications: NotificationSettings,
    pub cluster: ClusterSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct NotificationSettings {
    /// Channels above this size ignore `@channel`, `@all` and `@here`.
    pub max_notifications_per_channel: u64,
    /// Batching interval for users without an `email_interval` preference.
    pub email_batching_interval: Duration,
    /// How often pending digests are evaluated.
    pub email_batching_cadence: Duration,
    pub email_content: ContentMode,
}

#[derive(Debug, Clone)]
pub struct ClusterSettings {
    pub busy_watcher_period: Duration,
    pub max_busy_duration: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (defaults file → local file →
/// explicit file → `HERALD__*` environment).
pub fn load(config_file: Option<&Path>) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = config_file {
        builder = builder.add_source(File::from(path).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let raw: RawSettings = builder.build()?.try_deserialize()?;
    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    cache: CacheConfig,
    notifications: RawNotificationSettings,
    cluster: RawClusterSettings,
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            cache,
            notifications,
            cluster,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            cache: validate_cache_config(cache)?,
            notifications: build_notification_settings(notifications)?,
            cluster: build_cluster_settings(cluster)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn validate_cache_config(cache: CacheConfig) -> Result<CacheConfig, LoadError> {
    if !cache.enable {
        return Ok(cache);
    }

    let limits = [
        ("cache.last_post_time_limit", cache.last_post_time_limit),
        ("cache.posts_limit", cache.posts_limit),
        ("cache.file_info_limit", cache.file_info_limit),
        ("cache.member_count_limit", cache.member_count_limit),
        ("cache.consume_batch_limit", cache.consume_batch_limit),
    ];
    for (key, value) in limits {
        if value == 0 {
            return Err(LoadError::invalid(
                key,
                "must be greater than zero while the cache is enabled",
            ));
        }
    }

    Ok(cache)
}

fn build_notification_settings(
    notifications: RawNotificationSettings,
) -> Result<NotificationSettings, LoadError> {
    let max_notifications_per_channel = notifications
        .max_notifications_per_channel
        .unwrap_or(DEFAULT_MAX_NOTIFICATIONS_PER_CHANNEL);
    if max_notifications_per_channel == 0 {
        return Err(LoadError::invalid(
            "notifications.max_notifications_per_channel",
            "must be greater than zero",
        ));
    }

    let email_batching_interval = positive_secs(
        notifications.email_batching_interval_seconds,
        DEFAULT_EMAIL_INTERVAL.as_secs(),
        "notifications.email_batching_interval_seconds",
    )?;
    let email_batching_cadence = positive_secs(
        notifications.email_batching_cadence_seconds,
        DEFAULT_EMAIL_BATCHING_CADENCE_SECS,
        "notifications.email_batching_cadence_seconds",
    )?;

    let email_content = match notifications.email_content.as_deref().map(str::trim) {
        None | Some("full") => ContentMode::Full,
        Some("generic") => ContentMode::Generic,
        Some(other) => {
            return Err(LoadError::invalid(
                "notifications.email_content",
                format!("expected `full` or `generic`, got `{other}`"),
            ));
        }
    };

    Ok(NotificationSettings {
        max_notifications_per_channel,
        email_batching_interval,
        email_batching_cadence,
        email_content,
    })
}

fn build_cluster_settings(cluster: RawClusterSettings) -> Result<ClusterSettings, LoadError> {
    let max_busy_duration = positive_secs(
        cluster.max_busy_duration_seconds,
        DEFAULT_MAX_BUSY_DURATION.as_secs(),
        "cluster.max_busy_duration_seconds",
    )?;
    if max_busy_duration > MAX_BUSY_DURATION_LIMIT {
        return Err(LoadError::invalid(
            "cluster.max_busy_duration_seconds",
            format!("must not exceed {}", MAX_BUSY_DURATION_LIMIT.as_secs()),
        ));
    }

    Ok(ClusterSettings {
        busy_watcher_period: positive_secs(
            cluster.busy_watcher_period_seconds,
            DEFAULT_BUSY_WATCHER_PERIOD_SECS,
            "cluster.busy_watcher_period_seconds",
        )?,
        max_busy_duration,
    })
}

fn positive_secs(value: Option<u64>, default: u64, key: &'static str) -> Result<Duration, LoadError> {
    match value.unwrap_or(default) {
        0 => Err(LoadError::invalid(key, "must be greater than zero")),
        secs => Ok(Duration::from_secs(secs)),
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawNotificationSettings {
    max_notifications_per_channel: Option<u64>,
    email_batching_interval_seconds: Option<u64>,
    email_batching_cadence_seconds: Option<u64>,
    email_content: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawClusterSettings {
    busy_watcher_period_seconds: Option<u64>,
    max_busy_duration_seconds: Option<u64>,
}
