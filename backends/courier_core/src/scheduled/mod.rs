//! Scheduled invocations: a handler is run for a point in time and a trigger
//! label, and may ask for its failure not to be retried.

mod controller;
mod invoke;

pub use controller::*;
pub use invoke::*;
