//! Requests, responses and the service binding that carries them between a
//! caller and an in-process [`Service`] as HTTP/1.1.

mod binding;
mod body;
mod cache;
mod errors;
mod headers;
mod method;
mod reader;
mod render;
mod request;
mod response;
mod service;
mod status;

pub use binding::*;
pub use body::*;
pub use cache::*;
pub use errors::*;
pub use headers::*;
pub use method::*;
pub use reader::*;
pub use render::*;
pub use request::{Request, RequestBuilder, RequestError, RequestResult};
pub use response::*;
pub use service::*;
pub use status::*;
