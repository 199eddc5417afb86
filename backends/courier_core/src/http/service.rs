use crate::extensions::result_ext::BoxedError;
use crate::scheduled::ScheduledController;

use super::{Request, Response};

/// `Service` is the handler side of a binding: it answers requests and,
/// optionally, scheduled invocations.
pub trait Service: Send + Sync {
    fn fetch(&self, request: Request) -> Result<Response, BoxedError>;

    /// Services without scheduled work succeed without doing anything.
    fn scheduled(&self, _controller: &ScheduledController) -> Result<(), BoxedError> {
        Ok(())
    }
}

/// A [`Service`] answering every request with a closure.
pub struct FnService<F> {
    handler: F,
}

pub fn service_fn<F>(handler: F) -> FnService<F>
where
    F: Fn(Request) -> Result<Response, BoxedError> + Send + Sync,
{
    FnService { handler }
}

impl<F> Service for FnService<F>
where
    F: Fn(Request) -> Result<Response, BoxedError> + Send + Sync,
{
    fn fetch(&self, request: Request) -> Result<Response, BoxedError> {
        (self.handler)(request)
    }
}
