//! Duplex channel pairs: two linked endpoints where whatever one side sends
//! is received as an event on the other. One endpoint usually rides along a
//! `101 Switching Protocols` response while the other stays with the handler.

mod endpoint;
mod errors;
mod events;

pub use endpoint::*;
pub use errors::*;
pub use events::*;
