use std::io::{BufRead, Read};

use courier_config::{TransportConfig, DEFAULT_MAX_URL_LENGTH};
use derive_more::From;

use crate::framing::{BodyDecoder, Framing, FramingError};
use crate::streams::ByteStream;

use super::{Body, HeaderName, Headers, Method, Request, RequestError, Response, Status};

/// Most header lines accepted in one message.
pub const MAX_HEADER_COUNT: usize = 128;

/// Longest single header line accepted.
pub const MAX_HEADER_LINE: usize = 16 * 1024;

/// Room left on a request line for the method and protocol around the target.
const START_LINE_SLACK: usize = 64;

pub type ReadResult<T> = std::result::Result<T, ReadError>;

#[derive(Debug, From)]
pub enum ReadError {
    Io(std::io::Error),
    Framing(FramingError),
    Request(RequestError),

    #[from(ignore)]
    InvalidStartLine(String),

    #[from(ignore)]
    UnsupportedVersion(String),

    #[from(ignore)]
    InvalidHeader(String),

    #[from(ignore)]
    TooManyHeaders(usize),

    #[from(ignore)]
    LineTooLong(usize),

    #[from(ignore)]
    InvalidEncoding,

    #[from(ignore)]
    UnexpectedEof,
}

impl std::error::Error for ReadError {}

impl core::fmt::Display for ReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// [`Http11Reader`] parses one HTTP/1.1 message at a time out of `source`:
/// start line, headers, then the body under whatever framing the headers
/// announce.
pub struct Http11Reader<R: BufRead> {
    source: R,
    max_url_length: usize,
    max_headers: usize,
    body_limit: Option<u64>,
}

impl<R: BufRead> Http11Reader<R> {
    pub fn new(source: R) -> Self {
        Self {
            source,
            max_url_length: DEFAULT_MAX_URL_LENGTH,
            max_headers: MAX_HEADER_COUNT,
            body_limit: None,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: &TransportConfig) -> Self {
        self.max_url_length = config.max_url_length;
        self
    }

    #[must_use]
    pub fn with_max_headers(mut self, count: usize) -> Self {
        self.max_headers = count;
        self
    }

    #[must_use]
    pub fn with_body_limit(mut self, limit: u64) -> Self {
        self.body_limit = Some(limit);
        self
    }

    pub fn into_inner(self) -> R {
        self.source
    }

    /// Reads a request. An origin-form target is resolved against the `Host`
    /// header, a request without framing headers has no body.
    pub fn read_request(&mut self) -> ReadResult<Request> {
        let line = self.read_line(self.max_url_length + START_LINE_SLACK)?;
        let mut parts = line.splitn(3, ' ');
        let (Some(method), Some(target), Some(version)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(ReadError::InvalidStartLine(line.clone()));
        };
        check_version(version)?;

        let method = Method::from(method);
        let target = target.to_string();
        let headers = self.read_headers()?;

        let url = if target.starts_with('/') {
            let host = headers
                .get(HeaderName::HOST)
                .unwrap_or_else(|| String::from("localhost"));
            format!("http://{host}{target}")
        } else {
            target
        };

        let body = match Framing::from_headers(&headers)? {
            Some(Framing::FixedLength(0)) if method.forbids_body() => None,
            Some(framing) => Some(self.read_body(framing)?),
            None => None,
        };
        trace!("read {} request for {}", method, url);

        let mut builder = Request::builder(url)
            .with_max_url_length(self.max_url_length)
            .with_method(method)
            .with_headers(headers);
        if let Some(body) = body {
            builder = builder.with_body(body);
        }
        Ok(builder.build()?)
    }

    /// Reads a response. Without framing headers the body runs to the end of
    /// `source`, statuses that forbid a body never get one.
    pub fn read_response(&mut self) -> ReadResult<Response> {
        let line = self.read_line(MAX_HEADER_LINE)?;
        let mut parts = line.splitn(3, ' ');
        let (Some(version), Some(code)) = (parts.next(), parts.next()) else {
            return Err(ReadError::InvalidStartLine(line.clone()));
        };
        check_version(version)?;

        let status = match code.parse::<u16>() {
            Ok(code) if (100..1000).contains(&code) => Status::from(code),
            _ => return Err(ReadError::InvalidStartLine(line)),
        };
        let status_text = parts.next().unwrap_or("").to_string();
        let headers = self.read_headers()?;

        let body = if status.forbids_body() {
            None
        } else {
            match Framing::from_headers(&headers)? {
                Some(framing) => Some(self.read_body(framing)?),
                None => {
                    let mut content = Vec::new();
                    self.source.read_to_end(&mut content)?;
                    Some(Body::from(content))
                }
            }
        };
        trace!("read {} response", status.code());

        let mut builder = Response::builder(status).with_headers(headers);
        if !status_text.is_empty() {
            builder = builder.with_status_text(status_text);
        }
        if let Some(body) = body {
            builder = builder.with_body(body);
        }
        Ok(builder.build())
    }

    /// Decoded chunked bodies stay without a declared length so they are
    /// chunked again when passed on.
    fn read_body(&mut self, framing: Framing) -> ReadResult<Body> {
        let mut decoder = BodyDecoder::new(&mut self.source, framing);
        if let Some(limit) = self.body_limit {
            decoder = decoder.with_limit(limit);
        }
        let content = decoder.read_to_end()?;
        Ok(match framing {
            Framing::FixedLength(_) => Body::from(content),
            Framing::Chunked => Body::Stream(ByteStream::from_unsized(content)),
        })
    }

    fn read_headers(&mut self) -> ReadResult<Headers> {
        let mut headers = Headers::new();
        let mut count = 0;
        loop {
            let line = self.read_line(MAX_HEADER_LINE)?;
            if line.is_empty() {
                return Ok(headers);
            }

            count += 1;
            if count > self.max_headers {
                return Err(ReadError::TooManyHeaders(self.max_headers));
            }

            // obsolete line folding is refused
            if line.starts_with(' ') || line.starts_with('\t') {
                return Err(ReadError::InvalidHeader(line));
            }
            let Some((name, value)) = line.split_once(':') else {
                return Err(ReadError::InvalidHeader(line.clone()));
            };
            let name = HeaderName::from(name);
            if !name.is_valid() {
                return Err(ReadError::InvalidHeader(line.clone()));
            }
            headers.append(name, value.trim());
        }
    }

    /// Reads one line without its line ending.
    fn read_line(&mut self, limit: usize) -> ReadResult<String> {
        let mut buffer = Vec::new();
        let read = self
            .source
            .by_ref()
            .take(limit as u64 + 2)
            .read_until(b'\n', &mut buffer)?;

        if read == 0 {
            return Err(ReadError::UnexpectedEof);
        }
        if buffer.last() != Some(&b'\n') {
            if buffer.len() > limit {
                return Err(ReadError::LineTooLong(limit));
            }
            return Err(ReadError::UnexpectedEof);
        }

        buffer.pop();
        if buffer.last() == Some(&b'\r') {
            buffer.pop();
        }
        if buffer.len() > limit {
            return Err(ReadError::LineTooLong(limit));
        }
        String::from_utf8(buffer).map_err(|_| ReadError::InvalidEncoding)
    }
}

fn check_version(version: &str) -> ReadResult<()> {
    match version {
        "HTTP/1.1" | "HTTP/1.0" => Ok(()),
        other => Err(ReadError::UnsupportedVersion(other.to_string())),
    }
}

#[cfg(test)]
mod test_reader {
    use std::io::Cursor;

    use super::{Http11Reader, ReadError};
    use crate::framing::FramingError;
    use crate::http::{HeaderName, Method, RenderHttp, Request, Response, Status};
    use crate::streams::StreamLength;

    fn reader(wire: &str) -> Http11Reader<Cursor<Vec<u8>>> {
        Http11Reader::new(Cursor::new(wire.as_bytes().to_vec()))
    }

    #[test]
    fn reads_a_sized_request() {
        let mut request = reader(
            "POST /body-length HTTP/1.1\r\nHost: example.org\r\nContent-Length: 3\r\n\r\nabc",
        )
        .read_request()
        .expect("should read");

        assert_eq!(request.method(), &Method::POST);
        assert_eq!(request.url().as_str(), "http://example.org/body-length");
        assert_eq!(
            request.headers().get(HeaderName::CONTENT_LENGTH),
            Some(String::from("3"))
        );
        assert_eq!(request.text().expect("should read body"), "abc");
    }

    #[test]
    fn chunked_request_body_stays_unsized() {
        let request = reader(
            "PUT / HTTP/1.1\r\nHost: h\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n0\r\n\r\n",
        )
        .read_request()
        .expect("should read");

        let body = request.body().expect("should have body");
        assert_eq!(body.declared_length(), None);
        match request.body() {
            Some(crate::http::Body::Stream(stream)) => {
                assert_eq!(stream.length(), StreamLength::Unbounded);
            }
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn reads_responses() {
        let mut response = reader("HTTP/1.1 404 Not Found\r\n\r\n")
            .read_response()
            .expect("should read");
        assert_eq!(response.status(), Status::NotFound);
        assert_eq!(response.status_text(), "Not Found");
        assert!(response.headers().is_empty());
        assert_eq!(response.body().and_then(|b| b.declared_length()), Some(0));
        assert_eq!(response.text().expect("should read"), "");

        let switching = reader("HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\n\r\n")
            .read_response()
            .expect("should read");
        assert!(switching.body().is_none());
    }

    #[test]
    fn round_trips_through_the_renderer() {
        let request = Request::builder("http://example.org/echo?q=1")
            .with_method(Method::PATCH)
            .add_header("x-trace", "abc")
            .with_body("payload")
            .build()
            .expect("should build");
        let wire = request.http_render_bytes().expect("should render");

        let mut parsed = Http11Reader::new(Cursor::new(wire))
            .read_request()
            .expect("should read");
        assert_eq!(parsed.url().as_str(), "http://example.org/echo?q=1");
        assert_eq!(parsed.headers().get("x-trace"), Some(String::from("abc")));
        assert_eq!(parsed.text().expect("should read"), "payload");

        let response = Response::builder(Status::Created).with_body("done").build();
        let wire = response.http_render_bytes().expect("should render");
        let mut parsed = Http11Reader::new(Cursor::new(wire))
            .read_response()
            .expect("should read");
        assert_eq!(parsed.status(), Status::Created);
        assert_eq!(parsed.text().expect("should read"), "done");
    }

    #[test]
    fn rejects_malformed_messages() {
        assert!(matches!(
            reader("GET / HTTP/2\r\n\r\n").read_request(),
            Err(ReadError::UnsupportedVersion(_))
        ));
        assert!(matches!(
            reader("GET / HTTP/1.1\r\n folded\r\n\r\n").read_request(),
            Err(ReadError::InvalidHeader(_))
        ));
        assert!(matches!(
            reader("GET / HTTP/1.1\r\nHost: h").read_request(),
            Err(ReadError::UnexpectedEof)
        ));
        assert!(matches!(
            reader("POST / HTTP/1.1\r\nContent-Length: 3\r\nTransfer-Encoding: chunked\r\n\r\n")
                .read_request(),
            Err(ReadError::Framing(FramingError::BothFramingHeaders))
        ));
        assert!(matches!(
            reader("HTTP/1.1 abc Nope\r\n\r\n").read_response(),
            Err(ReadError::InvalidStartLine(_))
        ));
    }

    #[test]
    fn enforces_header_limits() {
        let result = reader("GET / HTTP/1.1\r\na: 1\r\nb: 2\r\nc: 3\r\n\r\n")
            .with_max_headers(2)
            .read_request();
        assert!(matches!(result, Err(ReadError::TooManyHeaders(2))));
    }
}
