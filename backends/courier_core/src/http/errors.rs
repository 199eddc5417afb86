use derive_more::From;

use crate::channels::ChannelStateError;

use super::{CacheModeError, ReadError, RenderError, RequestError};

pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Everything that can go wrong between handing a request to a binding and
/// getting its response back.
#[derive(Debug, From)]
pub enum FetchError {
    Request(RequestError),
    Render(RenderError),
    Read(ReadError),
    Channel(ChannelStateError),

    /// The service returned an error or panicked.
    #[from(ignore)]
    ServiceFailed(String),

    /// A `101` response came without an endpoint or an endpoint came with
    /// another status.
    #[from(ignore)]
    InvalidUpgrade(&'static str),
}

impl FetchError {
    /// The cache refusal behind this error, if that is what it is.
    #[must_use]
    pub fn cache_error(&self) -> Option<&CacheModeError> {
        match self {
            Self::Request(RequestError::Cache(err)) => Some(err),
            _ => None,
        }
    }
}

impl std::error::Error for FetchError {}

impl core::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Request(err) => write!(f, "{err}"),
            Self::ServiceFailed(reason) => write!(f, "service failed: {reason}"),
            _ => write!(f, "{self:?}"),
        }
    }
}
