use std::io::Cursor;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use courier_config::TransportConfig;

use crate::channels::{ChannelOptions, Endpoint, ReadyState};
use crate::extensions::result_ext::describe_panic;
use crate::retries::RetryDecider;
use crate::scheduled::{invoke, run_with_retries, ScheduledOutcome, ScheduledRun, ScheduledTrigger};
use crate::synca::CancelSignal;

use super::{
    FetchError, FetchResult, Http11Reader, RenderHttp, Request, RequestBuilder, Response, Service,
    Status,
};

/// `ServiceBinding` hands requests to an in-process [`Service`] over a
/// loopback HTTP/1.1 exchange: the request is rendered to the wire, parsed
/// back for the service, and the service's response goes through the same
/// round trip on its way back.
///
/// Every exchange gets its own cancel signal, derived from the binding's,
/// which the service sees as [`Request::signal`]. It fires when the service
/// fails or its response cannot be delivered, and it ends any wait on a
/// stalled request or response body.
#[derive(Clone)]
pub struct ServiceBinding {
    service: Arc<dyn Service>,
    config: TransportConfig,
    cancel: CancelSignal,
}

impl core::fmt::Debug for ServiceBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceBinding")
            .field("config", &self.config)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl ServiceBinding {
    pub fn new<S: Service + 'static>(service: S) -> Self {
        Self::from_arc(Arc::new(service))
    }

    pub fn from_arc(service: Arc<dyn Service>) -> Self {
        Self {
            service,
            config: TransportConfig::default(),
            cancel: CancelSignal::new(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: TransportConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Parent of every exchange signal, cancelling it abandons all of them.
    #[must_use]
    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    /// Options for channel pairs whose lifetime should follow this binding.
    #[must_use]
    pub fn channel_options(&self) -> ChannelOptions {
        ChannelOptions::from(&self.config).with_parent(&self.cancel)
    }

    /// A request builder already carrying this binding's limits and cache
    /// switch.
    #[must_use]
    pub fn request<S: Into<String>>(&self, url: S) -> RequestBuilder {
        Request::builder(url).with_config(&self.config)
    }

    /// Builds a request for `url` with `init` and fetches it. A refused
    /// option surfaces as [`FetchError::Request`], with the same error a
    /// direct build would produce.
    pub fn fetch_with<S, F>(&self, url: S, init: F) -> FetchResult<Response>
    where
        S: Into<String>,
        F: FnOnce(RequestBuilder) -> RequestBuilder,
    {
        let request = init(self.request(url)).build()?;
        self.fetch(request)
    }

    pub fn get<S: Into<String>>(&self, url: S) -> FetchResult<Response> {
        self.fetch_with(url, |builder| builder)
    }

    pub fn fetch(&self, request: Request) -> FetchResult<Response> {
        let url = request.url().clone();
        debug!("fetch {} {}", request.method(), url);

        if url.as_str().len() > self.config.max_url_length {
            return Err(FetchError::Request(super::RequestError::UrlTooLong {
                length: url.as_str().len(),
                limit: self.config.max_url_length,
            }));
        }

        let exchange = self.cancel.derive();
        let wire = request.http_render()?.with_signal(&exchange).into_bytes()?;
        let received = Http11Reader::new(Cursor::new(wire))
            .with_config(&self.config)
            .read_request()?
            .into_builder()
            .with_max_url_length(self.config.max_url_length)
            .with_signal(exchange.clone())
            .build()?;

        let service = self.service.clone();
        let mut response = match panic::catch_unwind(AssertUnwindSafe(|| service.fetch(received))) {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                warn!("service failed for {}: {}", url, err);
                exchange.cancel();
                return Err(FetchError::ServiceFailed(err.to_string()));
            }
            Err(payload) => {
                let reason = describe_panic(payload.as_ref());
                error!("service panicked for {}: {}", url, reason);
                exchange.cancel();
                return Err(FetchError::ServiceFailed(reason));
            }
        };

        let endpoint = response.take_web_socket();
        match (response.status(), &endpoint) {
            (Status::SwitchingProtocols, None) => {
                exchange.cancel();
                return Err(FetchError::InvalidUpgrade(
                    "switching protocols without an endpoint",
                ));
            }
            (status, Some(_)) if status != Status::SwitchingProtocols => {
                exchange.cancel();
                return Err(FetchError::InvalidUpgrade(
                    "endpoint on a response that is not switching protocols",
                ));
            }
            _ => {}
        }

        let mut delivered = match self.deliver(response, &exchange) {
            Ok(delivered) => delivered,
            Err(err) => {
                exchange.cancel();
                return Err(err);
            }
        };
        delivered.set_url(url);

        if let Some(endpoint) = endpoint {
            accept_upgrade(&endpoint)?;
            delivered.set_web_socket(Some(endpoint));
        }

        trace!("fetch finished with {}", delivered.status().code());
        Ok(delivered)
    }

    fn deliver(&self, response: Response, exchange: &CancelSignal) -> FetchResult<Response> {
        let wire = response.http_render()?.with_signal(exchange).into_bytes()?;
        Ok(Http11Reader::new(Cursor::new(wire))
            .with_config(&self.config)
            .read_response()?)
    }

    /// Runs the service's scheduled handler once.
    pub fn scheduled(&self, trigger: Option<ScheduledTrigger>) -> ScheduledOutcome {
        let service = self.service.clone();
        let skew = self.config.scheduled_clock_skew;
        invoke(trigger, move |controller| {
            if !controller.is_current(skew) {
                debug!(
                    "scheduled time {} is outside the {:?} window of now",
                    controller.scheduled_time(),
                    skew
                );
            }
            service.scheduled(controller)
        })
    }

    /// Runs the scheduled handler, retrying failures as `decider` allows.
    pub fn scheduled_with_retries(
        &self,
        trigger: Option<ScheduledTrigger>,
        decider: &dyn RetryDecider,
        total_allowed: u32,
    ) -> ScheduledRun {
        let service = self.service.clone();
        run_with_retries(trigger, decider, total_allowed, move |controller| {
            service.scheduled(controller)
        })
    }
}

/// Opens the caller's end of an upgrade once the service's end is open, a
/// service that has not accepted yet leaves that to the caller.
fn accept_upgrade(endpoint: &Endpoint) -> FetchResult<()> {
    match endpoint.sibling_ready_state() {
        Some(ReadyState::Open) => Ok(endpoint.accept()?),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod test_binding {
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    use ntest::timeout;
    use tracing_test::traced_test;

    use super::ServiceBinding;
    use crate::extensions::result_ext::{BoxedError, BoxedResult};
    use crate::framing::FramingError;
    use crate::http::{service_fn, FetchError, Method, RenderError, Response, Status};
    use crate::streams::{identity_stream, StreamError, StreamWriter};
    use crate::synca::CancelSignal;

    fn is_cancelled_body(err: &FetchError) -> bool {
        matches!(
            err,
            FetchError::Render(RenderError::Framing(FramingError::Stream(
                StreamError::Cancelled(_)
            )))
        )
    }

    fn cancel_later(signal: &CancelSignal) -> thread::JoinHandle<()> {
        let signal = signal.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            signal.cancel();
        })
    }

    fn failure(message: &str) -> BoxedError {
        std::io::Error::other(message.to_string()).into_boxed_error()
    }

    #[test]
    fn returns_the_service_response_with_its_url() {
        let binding = ServiceBinding::new(service_fn(|_| Ok(Response::with_status(Status::NotFound))));

        let response = binding.get("http://example.org/missing").expect("should fetch");
        assert_eq!(response.status(), Status::NotFound);
        assert!(!response.ok());
        assert_eq!(
            response.url().map(url::Url::as_str),
            Some("http://example.org/missing")
        );
    }

    #[test]
    #[traced_test]
    fn service_errors_fire_the_exchange_signal() {
        let seen: Arc<Mutex<Option<CancelSignal>>> = Arc::new(Mutex::new(None));
        let captured = seen.clone();
        let binding = ServiceBinding::new(service_fn(move |request| {
            *captured.lock().expect("not poisoned") = Some(request.signal().clone());
            Err(failure("broken handler"))
        }));

        let err = binding.get("http://example.org/").expect_err("should fail");
        assert!(matches!(err, FetchError::ServiceFailed(ref reason) if reason == "broken handler"));
        assert!(logs_contain("broken handler"));

        let signal = seen.lock().expect("not poisoned").take().expect("handler ran");
        assert!(signal.is_cancelled());
        assert!(!binding.cancel_signal().is_cancelled());
    }

    #[test]
    fn panics_become_service_failures() {
        let binding = ServiceBinding::new(service_fn(|_| panic!("handler blew up")));
        let err = binding.get("http://example.org/").expect_err("should fail");
        assert!(matches!(err, FetchError::ServiceFailed(ref reason) if reason == "handler blew up"));
    }

    #[test]
    fn switching_protocols_needs_an_endpoint() {
        let binding = ServiceBinding::new(service_fn(|_| {
            Ok(Response::with_status(Status::SwitchingProtocols))
        }));
        assert!(matches!(
            binding.get("http://example.org/ws"),
            Err(FetchError::InvalidUpgrade(_))
        ));
    }

    #[test]
    fn cancelling_the_binding_reaches_exchanges() {
        let seen: Arc<Mutex<Option<CancelSignal>>> = Arc::new(Mutex::new(None));
        let captured = seen.clone();
        let binding = ServiceBinding::new(service_fn(move |request| {
            *captured.lock().expect("not poisoned") = Some(request.signal().clone());
            Ok(Response::with_status(Status::NoContent))
        }));

        binding.get("http://example.org/").expect("should fetch");
        let signal = seen.lock().expect("not poisoned").take().expect("handler ran");
        assert!(!signal.is_cancelled());

        binding.cancel_signal().cancel();
        assert!(signal.is_cancelled());
    }

    #[test]
    #[timeout(5000)]
    fn cancelling_the_binding_ends_a_stalled_request_body() {
        let binding = ServiceBinding::new(service_fn(|_| {
            Ok(Response::with_status(Status::NoContent))
        }));

        let (mut writer, stream) = identity_stream();
        writer.write("partial").expect("should write");
        let request = binding
            .request("http://example.org/upload")
            .with_method(Method::POST)
            .with_stream(stream)
            .build()
            .expect("should build");

        let canceller = cancel_later(binding.cancel_signal());
        let err = binding.fetch(request).expect_err("should be cancelled");
        canceller.join().expect("should finish");

        assert!(is_cancelled_body(&err), "unexpected error: {err:?}");
        assert!(writer.write("more").is_err());
    }

    #[test]
    #[timeout(5000)]
    fn cancelling_the_binding_ends_a_stalled_response_body() {
        let stalled: Arc<Mutex<Option<StreamWriter>>> = Arc::new(Mutex::new(None));
        let keeper = stalled.clone();
        let binding = ServiceBinding::new(service_fn(move |_| {
            let (mut writer, stream) = identity_stream();
            writer.write("first").expect("should write");
            *keeper.lock().expect("not poisoned") = Some(writer);
            Ok(Response::builder(Status::OK).with_stream(stream).build())
        }));

        let canceller = cancel_later(binding.cancel_signal());
        let err = binding
            .get("http://example.org/slow")
            .expect_err("should be cancelled");
        canceller.join().expect("should finish");

        assert!(is_cancelled_body(&err), "unexpected error: {err:?}");
        let mut writer = stalled.lock().expect("not poisoned").take().expect("handler ran");
        assert!(writer.write("more").is_err());
    }
}
