use super::ReadyState;

pub type ChannelResult<T> = std::result::Result<T, ChannelStateError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStateError {
    /// The endpoint itself is not in a state allowing the operation.
    NotOpen(ReadyState),

    SiblingNotOpen(ReadyState),

    /// Every handle to the sibling endpoint was dropped.
    SiblingGone,

    /// `accept` on an endpoint that is closing or closed.
    NotAcceptable(ReadyState),

    InvalidCloseCode(u16),

    ReasonTooLong(usize),

    Timeout,

    Cancelled,

    /// Another dispatch is running on this endpoint, usually a listener
    /// pulling events from the endpoint it listens on.
    Dispatching,
}

impl std::error::Error for ChannelStateError {}

impl core::fmt::Display for ChannelStateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}
