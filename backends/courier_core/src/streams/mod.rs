mod errors;
mod stream;

pub use errors::*;
pub use stream::*;
