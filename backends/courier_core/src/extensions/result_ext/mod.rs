pub type BoxedError = Box<dyn std::error::Error + Send>;

/// Boxes any sendable error into a [`BoxedError`].
pub trait BoxedResult {
    fn into_boxed_error(self) -> BoxedError;
}

impl<E> BoxedResult for E
where
    E: std::error::Error + Send + 'static,
{
    fn into_boxed_error(self) -> BoxedError {
        Box::new(self)
    }
}

/// `describe_panic` turns the payload of a caught panic into something that
/// can be logged or carried inside an error.
#[must_use]
pub fn describe_panic(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        return (*text).to_string();
    }
    if let Some(text) = payload.downcast_ref::<String>() {
        return text.clone();
    }
    String::from("unknown panic payload")
}
