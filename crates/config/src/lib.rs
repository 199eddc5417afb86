use std::time::Duration;

use derive_more::derive::From;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};

#[derive(Debug, From)]
pub enum ConfigError {
    #[from(ignore)]
    IOError(std::io::Error),

    #[from(ignore)]
    DeserializationFailed(toml::de::Error),

    InvalidPath(std::path::PathBuf),

    #[from(ignore)]
    InvalidValue(&'static str),
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        Self::DeserializationFailed(value)
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::IOError(value)
    }
}

impl std::error::Error for ConfigError {}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// value_from_path returns the regular `toml::Value` object which implements the
/// `serde::DeserializeOwned` trait which allows you to directly manipulate the value object
/// instead of a defined type.
pub fn value_from_path<V: Into<std::path::PathBuf>>(target: V) -> ConfigResult<toml::Value> {
    from_path(target)
}

pub fn from_path<T, V>(target: V) -> ConfigResult<T>
where
    T: DeserializeOwned,
    V: Into<std::path::PathBuf>,
{
    let target_path = target.into();
    if !target_path.is_file() {
        return Err(ConfigError::InvalidPath(target_path));
    }

    let config_content = std::fs::read_to_string(target_path)?;
    from_str(&config_content)
}

pub fn from_str<T: DeserializeOwned>(content: &str) -> ConfigResult<T> {
    let config_obj: T = toml::from_str(content)?;
    Ok(config_obj)
}

pub const DEFAULT_HIGH_WATER_MARK: usize = 16;
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_URL_LENGTH: usize = 1024 * 1024;
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(3);

fn default_high_water_mark() -> usize {
    DEFAULT_HIGH_WATER_MARK
}

fn default_wait_timeout() -> Duration {
    DEFAULT_WAIT_TIMEOUT
}

fn default_max_url_length() -> usize {
    DEFAULT_MAX_URL_LENGTH
}

fn default_clock_skew() -> Duration {
    DEFAULT_CLOCK_SKEW
}

/// `TransportConfig` holds the knobs of the courier transport, usually loaded
/// from the `[transport]` table of a TOML file.
///
/// ```toml
/// [transport]
/// cache_enabled = true
/// stream_high_water_mark = 32
/// wait_timeout_ms = 5000
/// ```
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Whether the `cache` request option is honoured at all.
    #[serde(default)]
    pub cache_enabled: bool,

    /// Number of chunks a byte stream buffers before writers block.
    #[serde(default = "default_high_water_mark")]
    pub stream_high_water_mark: usize,

    /// Upper bound on any blocking wait for a peer (stream reads and writes,
    /// channel receives).
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "wait_timeout_ms", default = "default_wait_timeout")]
    pub wait_timeout: Duration,

    /// Capacity of each channel endpoint's inbound queue, unbounded when unset.
    #[serde(default)]
    pub channel_capacity: Option<usize>,

    #[serde(default = "default_max_url_length")]
    pub max_url_length: usize,

    /// Tolerated distance between a defaulted scheduled time and the clock.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "scheduled_clock_skew_ms", default = "default_clock_skew")]
    pub scheduled_clock_skew: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            cache_enabled: false,
            stream_high_water_mark: DEFAULT_HIGH_WATER_MARK,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            channel_capacity: None,
            max_url_length: DEFAULT_MAX_URL_LENGTH,
            scheduled_clock_skew: DEFAULT_CLOCK_SKEW,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct TransportFile {
    #[serde(default)]
    transport: TransportConfig,
}

impl TransportConfig {
    /// Loads the `[transport]` table from a TOML file, falling back to defaults
    /// for anything the file leaves out.
    pub fn load<V: Into<std::path::PathBuf>>(target: V) -> ConfigResult<Self> {
        let file: TransportFile = from_path(target)?;
        file.transport.validated()
    }

    pub fn parse(content: &str) -> ConfigResult<Self> {
        let file: TransportFile = from_str(content)?;
        file.transport.validated()
    }

    #[must_use]
    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_high_water_mark(mut self, chunks: usize) -> Self {
        self.stream_high_water_mark = chunks;
        self
    }

    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: Option<usize>) -> Self {
        self.channel_capacity = capacity;
        self
    }

    fn validated(self) -> ConfigResult<Self> {
        if self.stream_high_water_mark == 0 {
            return Err(ConfigError::InvalidValue("stream_high_water_mark"));
        }
        if self.channel_capacity == Some(0) {
            return Err(ConfigError::InvalidValue("channel_capacity"));
        }
        Ok(self)
    }
}
