use std::string::FromUtf8Error;

use derive_more::From;
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::channels::Endpoint;
use crate::streams::{ByteStream, StreamError};

use super::{Body, HeaderName, Headers, Status};

pub type ResponseResult<T> = std::result::Result<T, ResponseError>;

#[derive(Debug, From)]
pub enum ResponseError {
    Stream(StreamError),
    Json(serde_json::Error),
    Utf8(FromUtf8Error),
}

impl std::error::Error for ResponseError {}

impl core::fmt::Display for ResponseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// A response produced by a service or received through a binding.
///
/// Responses never follow redirects, so [`Response::redirected`] is always
/// false.
#[derive(Debug)]
pub struct Response {
    status: Status,
    status_text: String,
    headers: Headers,
    body: Option<Body>,
    web_socket: Option<Endpoint>,
    url: Option<Url>,
}

impl Response {
    #[must_use]
    pub fn builder(status: Status) -> ResponseBuilder {
        ResponseBuilder::new(status)
    }

    /// A bodiless response with `status`.
    #[must_use]
    pub fn with_status(status: Status) -> Self {
        Self::builder(status).build()
    }

    /// A `200 OK` response carrying `value` encoded as JSON.
    pub fn json<T: Serialize>(value: &T) -> ResponseResult<Self> {
        let encoded = serde_json::to_vec(value)?;
        Ok(Self::builder(Status::OK)
            .add_header(HeaderName::CONTENT_TYPE, "application/json")
            .with_body(encoded)
            .build())
    }

    /// A `101 Switching Protocols` response handing `endpoint` to the caller.
    #[must_use]
    pub fn upgrade(endpoint: Endpoint) -> Self {
        Self::builder(Status::SwitchingProtocols)
            .with_web_socket(endpoint)
            .build()
    }

    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    #[must_use]
    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    #[must_use]
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    #[must_use]
    pub fn redirected(&self) -> bool {
        false
    }

    #[must_use]
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    pub(crate) fn set_url(&mut self, url: Url) {
        self.url = Some(url);
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

    #[must_use]
    pub fn web_socket(&self) -> Option<&Endpoint> {
        self.web_socket.as_ref()
    }

    pub fn take_web_socket(&mut self) -> Option<Endpoint> {
        self.web_socket.take()
    }

    pub(crate) fn set_web_socket(&mut self, endpoint: Option<Endpoint>) {
        self.web_socket = endpoint;
    }

    /// Consumes the body, an absent body reads as empty.
    pub fn bytes(&mut self) -> ResponseResult<Vec<u8>> {
        match self.body.take() {
            Some(body) => Ok(body.read_all()?),
            None => Ok(Vec::new()),
        }
    }

    pub fn text(&mut self) -> ResponseResult<String> {
        Ok(String::from_utf8(self.bytes()?)?)
    }

    pub fn json_body<T: DeserializeOwned>(&mut self) -> ResponseResult<T> {
        Ok(serde_json::from_slice(&self.bytes()?)?)
    }
}

#[derive(Debug)]
pub struct ResponseBuilder {
    status: Status,
    status_text: Option<String>,
    headers: Headers,
    body: Option<Body>,
    web_socket: Option<Endpoint>,
}

impl ResponseBuilder {
    #[must_use]
    pub fn new(status: Status) -> Self {
        Self {
            status,
            status_text: None,
            headers: Headers::new(),
            body: None,
            web_socket: None,
        }
    }

    /// Overrides the reason phrase, defaulting to the status' own.
    #[must_use]
    pub fn with_status_text<S: Into<String>>(mut self, text: S) -> Self {
        self.status_text = Some(text.into());
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

    #[must_use]
    pub fn with_web_socket(mut self, endpoint: Endpoint) -> Self {
        self.web_socket = Some(endpoint);
        self
    }

    #[must_use]
    pub fn build(self) -> Response {
        let status_text = self
            .status_text
            .unwrap_or_else(|| self.status.reason().to_string());
        Response {
            status: self.status,
            status_text,
            headers: self.headers,
            body: self.body,
            web_socket: self.web_socket,
            url: None,
        }
    }
}
