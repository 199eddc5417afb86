#[macro_use]
extern crate courier_logs;

pub mod channels;
pub mod extensions;
pub mod framing;
pub mod http;
pub mod retries;
pub mod scheduled;
pub mod streams;
pub mod synca;

pub use courier_config::TransportConfig;
