use courier_config::{TransportConfig, DEFAULT_MAX_URL_LENGTH};
use derive_more::From;
use url::Url;

use crate::streams::ByteStream;
use crate::synca::CancelSignal;

use super::{validate_cache_mode, Body, CacheMode, CacheModeError, HeaderName, Headers, Method};

pub type RequestResult<T> = std::result::Result<T, RequestError>;

#[derive(Debug, From)]
pub enum RequestError {
    InvalidUrl(url::ParseError),

    #[from(ignore)]
    UrlTooLong { length: usize, limit: usize },

    #[from(ignore)]
    InvalidMethod(String),

    #[from(ignore)]
    InvalidHeader(String),

    #[from(ignore)]
    BodyNotAllowed(Method),

    Cache(CacheModeError),

    /// A streamed body can only be consumed once.
    #[from(ignore)]
    BodyNotClonable,
}

impl std::error::Error for RequestError {}

impl core::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cache(err) => write!(f, "{err}"),
            _ => write!(f, "{self:?}"),
        }
    }
}

/// Header values may not smuggle in line breaks, names must be tokens.
pub(crate) fn check_headers(headers: &Headers) -> Result<(), String> {
    for (name, values) in headers.iter() {
        if !name.is_valid() {
            return Err(format!("invalid header name: {name:?}"));
        }
        if values
            .iter()
            .any(|value| value.contains('\r') || value.contains('\n'))
        {
            return Err(format!("line break in value of {name}"));
        }
    }
    Ok(())
}

/// An outgoing or received HTTP request.
///
/// CORS related properties are fixed: a request is always `no-cors`,
/// `same-origin` with a `about:client` referrer, whatever the caller asked for.
#[derive(Debug)]
pub struct Request {
    method: Method,
    url: Url,
    headers: Headers,
    body: Option<Body>,
    cache: CacheMode,
    signal: CancelSignal,
}

impl Request {
    #[must_use]
    pub fn builder<S: Into<String>>(url: S) -> RequestBuilder {
        RequestBuilder::new(url)
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    #[must_use]
    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    pub fn take_body(&mut self) -> Option<Body> {
        self.body.take()
    }

    /// Reads the body as UTF-8 text, an absent body reads as empty.
    pub fn text(&mut self) -> crate::streams::StreamResult<String> {
        let content = match self.body.take() {
            Some(body) => body.read_all()?,
            None => Vec::new(),
        };
        Ok(String::from_utf8_lossy(&content).into_owned())
    }

    #[must_use]
    pub fn cache(&self) -> &CacheMode {
        &self.cache
    }

    /// Fires when the exchange carrying this request is abandoned.
    #[must_use]
    pub fn signal(&self) -> &CancelSignal {
        &self.signal
    }

    #[must_use]
    pub fn mode(&self) -> &'static str {
        "no-cors"
    }

    #[must_use]
    pub fn credentials(&self) -> &'static str {
        "same-origin"
    }

    #[must_use]
    pub fn destination(&self) -> &'static str {
        ""
    }

    #[must_use]
    pub fn referrer(&self) -> &'static str {
        "about:client"
    }

    #[must_use]
    pub fn referrer_policy(&self) -> &'static str {
        ""
    }

    #[must_use]
    pub fn redirect(&self) -> &'static str {
        "follow"
    }

    #[must_use]
    pub fn integrity(&self) -> &'static str {
        ""
    }

    #[must_use]
    pub fn keepalive(&self) -> bool {
        false
    }

    /// Duplicates the request, sharing its signal. Fails for streamed bodies.
    pub fn try_clone(&self) -> RequestResult<Self> {
        let body = match &self.body {
            Some(body) => Some(body.try_clone().ok_or(RequestError::BodyNotClonable)?),
            None => None,
        };
        Ok(Self {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            body,
            cache: self.cache.clone(),
            signal: self.signal.clone(),
        })
    }

    /// Turns the request back into a builder carrying all of its state,
    /// an already accepted cache mode is kept without being checked again.
    #[must_use]
    pub fn into_builder(self) -> RequestBuilder {
        RequestBuilder {
            url: self.url.to_string(),
            method: Some(self.method),
            headers: self.headers,
            body: self.body,
            cache: None,
            accepted_cache: Some(self.cache),
            cache_enabled: false,
            max_url_length: DEFAULT_MAX_URL_LENGTH,
            signal: Some(self.signal),
        }
    }
}

/// `RequestBuilder` collects a request's parts and validates them together
/// in [`RequestBuilder::build`].
#[derive(Debug)]
pub struct RequestBuilder {
    url: String,
    method: Option<Method>,
    headers: Headers,
    body: Option<Body>,
    cache: Option<String>,
    accepted_cache: Option<CacheMode>,
    cache_enabled: bool,
    max_url_length: usize,
    signal: Option<CancelSignal>,
}

impl RequestBuilder {
    pub fn new<S: Into<String>>(url: S) -> Self {
        Self {
            url: url.into(),
            method: None,
            headers: Headers::new(),
            body: None,
            cache: None,
            accepted_cache: None,
            cache_enabled: false,
            max_url_length: DEFAULT_MAX_URL_LENGTH,
            signal: None,
        }
    }

    /// Applies the cache switch and URL limit of `config`.
    #[must_use]
    pub fn with_config(mut self, config: &TransportConfig) -> Self {
        self.cache_enabled = config.cache_enabled;
        self.max_url_length = config.max_url_length;
        self
    }

    #[must_use]
    pub fn with_max_url_length(mut self, limit: usize) -> Self {
        self.max_url_length = limit;
        self
    }

    #[must_use]
    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_method<M: Into<Method>>(mut self, method: M) -> Self {
        self.method = Some(method.into());
        self
    }

    #[must_use]
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn add_header<H: Into<HeaderName>, S: Into<String>>(mut self, name: H, value: S) -> Self {
        self.headers.append(name, value);
        self
    }

    #[must_use]
    pub fn with_body<B: Into<Body>>(mut self, body: B) -> Self {
        self.body = Some(body.into());
        self
    }

    #[must_use]
    pub fn with_stream(self, stream: ByteStream) -> Self {
        self.with_body(stream)
    }

    /// Sets the `cache` option, checked against the cache switch at build.
    #[must_use]
    pub fn with_cache<S: Into<String>>(mut self, mode: S) -> Self {
        self.cache = Some(mode.into());
        self
    }

    #[must_use]
    pub fn with_signal(mut self, signal: CancelSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Accepted and ignored, requests are always `no-cors`.
    #[must_use]
    pub fn with_mode<S: Into<String>>(self, _mode: S) -> Self {
        self
    }

    /// Accepted and ignored, requests are always `same-origin`.
    #[must_use]
    pub fn with_credentials<S: Into<String>>(self, _credentials: S) -> Self {
        self
    }

    /// Accepted and ignored, the referrer is always `about:client`.
    #[must_use]
    pub fn with_referrer<S: Into<String>>(self, _referrer: S) -> Self {
        self
    }

    /// Accepted and ignored.
    #[must_use]
    pub fn with_referrer_policy<S: Into<String>>(self, _policy: S) -> Self {
        self
    }

    pub fn build(self) -> RequestResult<Request> {
        if self.url.len() > self.max_url_length {
            return Err(RequestError::UrlTooLong {
                length: self.url.len(),
                limit: self.max_url_length,
            });
        }
        let url = Url::parse(&self.url)?;

        let method = self.method.unwrap_or(Method::GET);
        if !method.is_valid() {
            return Err(RequestError::InvalidMethod(method.to_string()));
        }
        if self.body.is_some() && method.forbids_body() {
            return Err(RequestError::BodyNotAllowed(method));
        }

        check_headers(&self.headers).map_err(RequestError::InvalidHeader)?;

        let cache = match (self.cache, self.accepted_cache) {
            (Some(requested), _) => validate_cache_mode(&requested, self.cache_enabled)?,
            (None, Some(accepted)) => accepted,
            (None, None) => CacheMode::Default,
        };

        Ok(Request {
            method,
            url,
            headers: self.headers,
            body: self.body,
            cache,
            signal: self.signal.unwrap_or_default(),
        })
    }
}
