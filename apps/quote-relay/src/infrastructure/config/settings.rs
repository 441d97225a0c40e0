//! Relay Configuration Settings
//!
//! Configuration types for the relay, loaded from environment variables.
//! Unset or unparsable values fall back to their defaults.

use std::str::FromStr;
use std::time::Duration;

use crate::application::services::DEFAULT_REFRESH_INTERVAL_MINUTES;
use crate::domain::quote::{TrackedSet, TrackedSetError};
use crate::infrastructure::coingecko::DEFAULT_BASE_URL;
use crate::infrastructure::nats::{HeartbeatConfig, NatsOptions, ReconnectConfig};

/// Which pipeline halves this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelayRole {
    /// Scheduler, fetcher and producer.
    Producer,
    /// Consumer group.
    Consumer,
    /// Both.
    #[default]
    All,
}

impl RelayRole {
    /// Parse a role name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for anything but `producer`,
    /// `consumer` or `all`.
    pub fn from_str_case_insensitive(s: &str) -> Result<Self, ConfigError> {
        match s.trim().to_lowercase().as_str() {
            "producer" => Ok(Self::Producer),
            "consumer" => Ok(Self::Consumer),
            "all" => Ok(Self::All),
            _ => Err(ConfigError::InvalidValue {
                key: "RELAY_ROLE".to_string(),
                value: s.to_string(),
            }),
        }
    }

    /// Whether the scheduler and producer run here.
    #[must_use]
    pub const fn runs_producer(self) -> bool {
        matches!(self, Self::Producer | Self::All)
    }

    /// Whether the consumer group runs here.
    #[must_use]
    pub const fn runs_consumer(self) -> bool {
        matches!(self, Self::Consumer | Self::All)
    }

    /// Get the role name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Producer => "producer",
            Self::Consumer => "consumer",
            Self::All => "all",
        }
    }
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelayEnv {
    /// Local development; error details are returned to clients.
    #[default]
    Development,
    /// Production; internal error details are hidden.
    Production,
}

impl RelayEnv {
    /// Parse environment from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    /// Check if this is the production environment.
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }

    /// Get the environment name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

/// Transport connection settings.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    /// `nats://…` server URL, or `memory://` for the in-process broker.
    pub url: String,
    /// Client name sent to the server.
    pub client_name: String,
    /// Fixed delay between reconnection attempts.
    pub reconnect_delay: Duration,
    /// Upper bound of the random extra reconnection delay.
    pub reconnect_jitter: Duration,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
    /// Bound on connect plus handshake.
    pub connect_timeout: Duration,
    /// Client `PING` interval.
    pub ping_interval: Duration,
    /// Pending command capacity while disconnected.
    pub publish_buffer: usize,
    /// Subject update events are published on.
    pub update_subject: String,
    /// Queue group shared by the consumer members.
    pub queue_group: String,
}

impl Default for TransportSettings {
    fn default() -> Self {
        let reconnect = ReconnectConfig::default();
        let nats = NatsOptions::default();
        Self {
            url: nats.url,
            client_name: nats.name,
            reconnect_delay: reconnect.delay,
            reconnect_jitter: reconnect.jitter,
            max_reconnect_attempts: reconnect.max_attempts,
            connect_timeout: nats.connect_timeout,
            ping_interval: HeartbeatConfig::default().ping_interval,
            publish_buffer: nats.publish_buffer,
            update_subject: "quotes.update".to_string(),
            queue_group: "quote-consumers".to_string(),
        }
    }
}

impl TransportSettings {
    /// Whether the in-process broker is selected.
    #[must_use]
    pub fn is_memory(&self) -> bool {
        self.url.starts_with("memory://")
    }

    /// Options for [`crate::infrastructure::nats::NatsClient::connect`].
    #[must_use]
    pub fn nats_options(&self) -> NatsOptions {
        let heartbeat = HeartbeatConfig {
            ping_interval: self.ping_interval,
            ..HeartbeatConfig::default()
        };
        NatsOptions {
            url: self.url.clone(),
            name: self.client_name.clone(),
            reconnect: ReconnectConfig::new(
                self.reconnect_delay,
                self.reconnect_jitter,
                self.max_reconnect_attempts,
            ),
            heartbeat,
            connect_timeout: self.connect_timeout,
            publish_buffer: self.publish_buffer,
            ..NatsOptions::default()
        }
    }
}

/// Refresh and consume pipeline settings.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Minutes between refreshes. Values below 1 are corrected by the scheduler.
    pub refresh_interval_minutes: u64,
    /// Consumer group members in this process.
    pub consumer_workers: usize,
    /// Base URL of the quote API.
    pub quote_api_url: String,
    /// Symbols fetched and queryable.
    pub tracked: TrackedSet,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            refresh_interval_minutes: DEFAULT_REFRESH_INTERVAL_MINUTES,
            consumer_workers: 1,
            quote_api_url: DEFAULT_BASE_URL.to_string(),
            tracked: TrackedSet::default(),
        }
    }
}

/// Sample store settings.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// `memory://` or `postgres://…`.
    pub url: String,
    /// Pool size for database stores.
    pub max_connections: u32,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            url: "memory://".to_string(),
            max_connections: 5,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Query and health HTTP port.
    pub http_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { http_port: 3000 }
    }
}

/// Complete relay configuration.
#[derive(Debug, Clone, Default)]
pub struct RelayConfig {
    /// Pipeline halves run by this process.
    pub role: RelayRole,
    /// Deployment environment.
    pub environment: RelayEnv,
    /// Transport settings.
    pub transport: TransportSettings,
    /// Pipeline settings.
    pub pipeline: PipelineSettings,
    /// Store settings.
    pub store: StoreSettings,
    /// Server port settings.
    pub server: ServerSettings,
}

impl RelayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `RELAY_ROLE` is unknown or `TRACKED_SYMBOLS`
    /// names no symbols.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// See [`RelayConfig::from_env`].
    pub fn from_source<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);

        let role = env
            .get("RELAY_ROLE")
            .map(|s| RelayRole::from_str_case_insensitive(&s))
            .transpose()?
            .unwrap_or_default();

        let environment = env
            .get("RELAY_ENV")
            .map(|s| RelayEnv::from_str_case_insensitive(&s))
            .unwrap_or_default();

        let defaults = TransportSettings::default();
        let transport = TransportSettings {
            url: env.string("NATS_URL", defaults.url),
            client_name: env.string("NATS_CLIENT_NAME", defaults.client_name),
            reconnect_delay: env.duration_millis("NATS_RECONNECT_DELAY_MS", defaults.reconnect_delay),
            reconnect_jitter: env
                .duration_millis("NATS_RECONNECT_JITTER_MS", defaults.reconnect_jitter),
            max_reconnect_attempts: env
                .parse("NATS_MAX_RECONNECT_ATTEMPTS", defaults.max_reconnect_attempts),
            connect_timeout: env
                .duration_secs("NATS_CONNECT_TIMEOUT_SECS", defaults.connect_timeout),
            ping_interval: env.duration_secs("NATS_PING_INTERVAL_SECS", defaults.ping_interval),
            publish_buffer: env.parse("NATS_PUBLISH_BUFFER", defaults.publish_buffer),
            update_subject: env.string("UPDATE_SUBJECT", defaults.update_subject),
            queue_group: env.string("QUEUE_GROUP", defaults.queue_group),
        };

        let defaults = PipelineSettings::default();
        let tracked = match env.get("TRACKED_SYMBOLS") {
            Some(raw) => TrackedSet::new(raw.split(','))?,
            None => TrackedSet::default(),
        };
        let pipeline = PipelineSettings {
            refresh_interval_minutes: env
                .parse("REFRESH_INTERVAL_MINUTES", defaults.refresh_interval_minutes),
            consumer_workers: env.parse("CONSUMER_WORKERS", defaults.consumer_workers),
            quote_api_url: env.string("QUOTE_API_URL", defaults.quote_api_url),
            tracked,
        };

        let defaults = StoreSettings::default();
        let store = StoreSettings {
            url: env.string("STORE_URL", defaults.url),
            max_connections: env.parse("STORE_MAX_CONNECTIONS", defaults.max_connections),
        };

        let server = ServerSettings {
            http_port: env.parse("HTTP_PORT", ServerSettings::default().http_port),
        };

        Ok(Self {
            role,
            environment,
            transport,
            pipeline,
            store,
            server,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Value outside the accepted set.
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Rejected value.
        value: String,
    },

    /// Tracked symbol list is empty.
    #[error("TRACKED_SYMBOLS: {0}")]
    TrackedSymbols(#[from] TrackedSetError),
}

/// Lenient typed access over a key lookup.
struct Env<'a, F>(&'a F);

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn string(&self, key: &str, default: String) -> String {
        self.get(key).map_or(default, |v| v.trim().to_string())
    }

    fn parse<T: FromStr>(&self, key: &str, default: T) -> T {
        match self.get(key) {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!(key, value = %raw, "Unparsable value, using default");
                default
            }),
            None => default,
        }
    }

    fn duration_secs(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }
}
