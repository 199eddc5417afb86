use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The `cache` option of a request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheMode {
    #[default]
    Default,
    NoStore,
    Reload,
    NoCache,
    ForceCache,
    OnlyIfCached,
}

impl CacheMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::NoStore => "no-store",
            Self::Reload => "reload",
            Self::NoCache => "no-cache",
            Self::ForceCache => "force-cache",
            Self::OnlyIfCached => "only-if-cached",
        }
    }
}

impl core::fmt::Display for CacheMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CacheMode {
    type Err = CacheModeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "default" => Ok(Self::Default),
            "no-store" => Ok(Self::NoStore),
            "reload" => Ok(Self::Reload),
            "no-cache" => Ok(Self::NoCache),
            "force-cache" => Ok(Self::ForceCache),
            "only-if-cached" => Ok(Self::OnlyIfCached),
            other => Err(CacheModeError::Unsupported(other.to_string())),
        }
    }
}

/// Why a `cache` option was refused. The messages are relied upon by callers
/// matching on error text.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CacheModeError {
    #[error("The 'cache' field on 'RequestInitializerDict' is not implemented.")]
    NotImplemented,

    #[error("Unsupported cache mode: {0}")]
    Unsupported(String),
}

/// Validates an explicitly supplied `cache` option.
///
/// With caching disabled any explicit value is refused, `default` included.
/// With caching enabled only `no-store` is honoured. A request that never
/// set the option is not validated at all and reads back as
/// [`CacheMode::Default`].
pub fn validate_cache_mode(mode: &str, cache_enabled: bool) -> Result<CacheMode, CacheModeError> {
    if !cache_enabled {
        return Err(CacheModeError::NotImplemented);
    }
    match mode {
        "no-store" => Ok(CacheMode::NoStore),
        other => Err(CacheModeError::Unsupported(other.to_string())),
    }
}
