use std::string::FromUtf8Error;

use bytes::Bytes;
use derive_more::From;
use url::Position;

use crate::framing::{negotiate, FramedBody, Framing, FramingError};
use crate::streams::ByteStream;
use crate::synca::CancelSignal;

use super::request::check_headers;
use super::{Body, HeaderName, Headers, Request, Response};

pub type RenderResult<T> = std::result::Result<T, RenderError>;

#[derive(Debug, From)]
pub enum RenderError {
    Framing(FramingError),
    Utf8(FromUtf8Error),

    #[from(ignore)]
    InvalidHeader(String),

    #[from(ignore)]
    InvalidStatusText(String),

    /// The status code forbids a body but one was supplied.
    #[from(ignore)]
    BodyNotAllowed(u16),
}

impl std::error::Error for RenderError {}

impl core::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// `RenderHttp` lets a message be written out as HTTP/1.1.
pub trait RenderHttp {
    fn http_render(self) -> RenderResult<Http11Renderer>
    where
        Self: Sized;

    /// Renders the whole message, blocking on a streamed body until its
    /// producer closes it.
    fn http_render_bytes(self) -> RenderResult<Vec<u8>>
    where
        Self: Sized,
    {
        self.http_render()?.into_bytes()
    }

    fn http_render_string(self) -> RenderResult<String>
    where
        Self: Sized,
    {
        Ok(String::from_utf8(self.http_render_bytes()?)?)
    }
}

/// Start line, headers with framing already applied, and the body to send.
pub struct MessageHead {
    start_line: String,
    headers: Headers,
    body: Option<(ByteStream, Framing)>,
}

impl MessageHead {
    fn new(start_line: String, headers: Headers, body: Option<(ByteStream, Framing)>) -> Self {
        Self {
            start_line,
            headers,
            body,
        }
    }
}

/// The states a message goes through while being rendered. Each call to
/// [`Http11Renderer::next`] takes the current state out, produces the next
/// piece of wire data and puts the following state back, so the body is
/// only pulled from its stream as fast as the consumer asks for it.
pub enum Http11State {
    /// Renders the start line, e.g. `GET /path HTTP/1.1`.
    Intro(MessageHead),

    /// Renders every header followed by the blank line.
    Headers(MessageHead),

    /// Locks the body stream under its negotiated framing, or ends when
    /// there is no body.
    Body(Option<(ByteStream, Framing)>),

    /// Yields the framed body piece by piece.
    BodyStreaming(FramedBody),

    End,
}

/// Renders one request or response as HTTP/1.1 through an iterator.
///
/// Waits on a streamed body end when the renderer's signal fires. A request
/// brings its own [`Request::signal`], [`Http11Renderer::with_signal`] adds
/// more.
pub struct Http11Renderer {
    state: Option<Http11State>,
    signal: Option<CancelSignal>,
}

impl Http11Renderer {
    /// Prepares `request`: sets `Host` from the URL when absent and writes
    /// exactly one framing header for a body. Bodiless POST, PUT and PATCH
    /// requests announce `Content-Length: 0`.
    pub fn request(mut request: Request) -> RenderResult<Self> {
        let mut headers = request.headers().clone();
        check_headers(&headers).map_err(RenderError::InvalidHeader)?;

        let url = request.url().clone();
        if !headers.contains(HeaderName::HOST) {
            if let Some(host) = url.host_str() {
                let host = match url.port() {
                    Some(port) => format!("{host}:{port}"),
                    None => host.to_string(),
                };
                headers.set(HeaderName::HOST, host);
            }
        }

        let method = request.method().clone();
        let body = match request.take_body() {
            Some(body) => Some(frame_body(body, &mut headers)),
            None => {
                clear_framing(&mut headers);
                if method.expects_body() {
                    Framing::FixedLength(0).apply(&mut headers);
                }
                None
            }
        };

        let target = match &url[Position::BeforePath..Position::AfterQuery] {
            "" => "/",
            target => target,
        };
        let start_line = format!("{method} {target} HTTP/1.1\r\n");
        Ok(Self {
            state: Some(Http11State::Intro(MessageHead::new(start_line, headers, body))),
            signal: Some(request.signal().clone()),
        })
    }

    /// Prepares `response`. Statuses that forbid a body get no framing
    /// header, other bodiless responses are delimited by the end of the
    /// exchange.
    pub fn response(mut response: Response) -> RenderResult<Self> {
        let status = response.status();
        let mut headers = response.headers().clone();
        check_headers(&headers).map_err(RenderError::InvalidHeader)?;

        let status_text = response.status_text().to_string();
        if status_text.contains('\r') || status_text.contains('\n') {
            return Err(RenderError::InvalidStatusText(status_text));
        }

        let body = match response.take_body() {
            Some(_) if status.forbids_body() => {
                return Err(RenderError::BodyNotAllowed(status.code()));
            }
            Some(body) => Some(frame_body(body, &mut headers)),
            None => {
                clear_framing(&mut headers);
                None
            }
        };

        let start_line = if status_text.is_empty() {
            format!("HTTP/1.1 {}\r\n", status.code())
        } else {
            format!("HTTP/1.1 {} {}\r\n", status.code(), status_text)
        };
        Ok(Self {
            state: Some(Http11State::Intro(MessageHead::new(start_line, headers, body))),
            signal: None,
        })
    }

    /// Also ends body waits once `signal` fires.
    #[must_use]
    pub fn with_signal(mut self, signal: &CancelSignal) -> Self {
        self.signal = Some(match self.signal.take() {
            Some(existing) => existing.joined(signal),
            None => signal.clone(),
        });
        self
    }

    pub fn into_bytes(self) -> RenderResult<Vec<u8>> {
        let mut wire = Vec::new();
        for part in self {
            wire.extend_from_slice(&part?);
        }
        Ok(wire)
    }
}

fn clear_framing(headers: &mut Headers) {
    headers.remove(HeaderName::CONTENT_LENGTH);
    headers.remove(HeaderName::TRANSFER_ENCODING);
}

fn frame_body(body: Body, headers: &mut Headers) -> (ByteStream, Framing) {
    let stream = body.into_stream();
    let framing = negotiate(&stream);
    framing.apply(headers);
    (stream, framing)
}

impl Iterator for Http11Renderer {
    type Item = RenderResult<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.state.take()? {
            Http11State::Intro(head) => {
                let intro = Bytes::from(head.start_line.clone());
                self.state = Some(Http11State::Headers(head));
                Some(Ok(intro))
            }
            Http11State::Headers(head) => {
                let mut encoded: String = head
                    .headers
                    .iter()
                    .map(|(name, values)| format!("{name}: {}\r\n", values.join(", ")))
                    .collect();
                encoded.push_str("\r\n");

                self.state = Some(Http11State::Body(head.body));
                Some(Ok(Bytes::from(encoded)))
            }
            Http11State::Body(None) => {
                self.state = Some(Http11State::End);
                None
            }
            Http11State::Body(Some((stream, framing))) => match FramedBody::new(&stream, framing) {
                Ok(framed) => {
                    let framed = match &self.signal {
                        Some(signal) => framed.with_signal(signal),
                        None => framed,
                    };
                    self.state = Some(Http11State::BodyStreaming(framed));
                    self.next()
                }
                Err(err) => {
                    self.state = Some(Http11State::End);
                    Some(Err(err.into()))
                }
            },
            Http11State::BodyStreaming(mut framed) => match framed.next() {
                Some(Ok(part)) => {
                    self.state = Some(Http11State::BodyStreaming(framed));
                    Some(Ok(part))
                }
                Some(Err(err)) => {
                    self.state = Some(Http11State::End);
                    Some(Err(err.into()))
                }
                None => {
                    self.state = Some(Http11State::End);
                    None
                }
            },
            Http11State::End => None,
        }
    }
}

impl RenderHttp for Request {
    fn http_render(self) -> RenderResult<Http11Renderer> {
        Http11Renderer::request(self)
    }
}

impl RenderHttp for Response {
    fn http_render(self) -> RenderResult<Http11Renderer> {
        Http11Renderer::response(self)
    }
}
