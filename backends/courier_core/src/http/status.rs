/// HTTP status
///
/// Can be converted to and from its numeral equivalent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    Continue,
    SwitchingProtocols,
    OK,
    Created,
    Accepted,
    NoContent,
    MovedPermanently,
    Found,
    SeeOther,
    NotModified,
    TemporaryRedirect,
    PermanentRedirect,
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    RequestTimeout,
    LengthRequired,
    PayloadTooLarge,
    UriTooLong,
    UpgradeRequired,
    InternalServerError,
    NotImplemented,
    BadGateway,
    ServiceUnavailable,
    /// Any other code, rendered without a reason phrase of its own.
    Other(u16),
}

impl From<u16> for Status {
    fn from(code: u16) -> Self {
        match code {
            100 => Self::Continue,
            101 => Self::SwitchingProtocols,
            200 => Self::OK,
            201 => Self::Created,
            202 => Self::Accepted,
            204 => Self::NoContent,
            301 => Self::MovedPermanently,
            302 => Self::Found,
            303 => Self::SeeOther,
            304 => Self::NotModified,
            307 => Self::TemporaryRedirect,
            308 => Self::PermanentRedirect,
            400 => Self::BadRequest,
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            405 => Self::MethodNotAllowed,
            408 => Self::RequestTimeout,
            411 => Self::LengthRequired,
            413 => Self::PayloadTooLarge,
            414 => Self::UriTooLong,
            426 => Self::UpgradeRequired,
            500 => Self::InternalServerError,
            501 => Self::NotImplemented,
            502 => Self::BadGateway,
            503 => Self::ServiceUnavailable,
            other => Self::Other(other),
        }
    }
}

impl core::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.status_line())
    }
}

impl Status {
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            Self::Continue => 100,
            Self::SwitchingProtocols => 101,
            Self::OK => 200,
            Self::Created => 201,
            Self::Accepted => 202,
            Self::NoContent => 204,
            Self::MovedPermanently => 301,
            Self::Found => 302,
            Self::SeeOther => 303,
            Self::NotModified => 304,
            Self::TemporaryRedirect => 307,
            Self::PermanentRedirect => 308,
            Self::BadRequest => 400,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::MethodNotAllowed => 405,
            Self::RequestTimeout => 408,
            Self::LengthRequired => 411,
            Self::PayloadTooLarge => 413,
            Self::UriTooLong => 414,
            Self::UpgradeRequired => 426,
            Self::InternalServerError => 500,
            Self::NotImplemented => 501,
            Self::BadGateway => 502,
            Self::ServiceUnavailable => 503,
            Self::Other(code) => *code,
        }
    }

    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Continue => "Continue",
            Self::SwitchingProtocols => "Switching Protocols",
            Self::OK => "OK",
            Self::Created => "Created",
            Self::Accepted => "Accepted",
            Self::NoContent => "No Content",
            Self::MovedPermanently => "Moved Permanently",
            Self::Found => "Found",
            Self::SeeOther => "See Other",
            Self::NotModified => "Not Modified",
            Self::TemporaryRedirect => "Temporary Redirect",
            Self::PermanentRedirect => "Permanent Redirect",
            Self::BadRequest => "Bad Request",
            Self::Unauthorized => "Unauthorized",
            Self::Forbidden => "Forbidden",
            Self::NotFound => "Not Found",
            Self::MethodNotAllowed => "Method Not Allowed",
            Self::RequestTimeout => "Request Timeout",
            Self::LengthRequired => "Length Required",
            Self::PayloadTooLarge => "Payload Too Large",
            Self::UriTooLong => "URI Too Long",
            Self::UpgradeRequired => "Upgrade Required",
            Self::InternalServerError => "Internal Server Error",
            Self::NotImplemented => "Not Implemented",
            Self::BadGateway => "Bad Gateway",
            Self::ServiceUnavailable => "Service Unavailable",
            Self::Other(_) => "",
        }
    }

    /// Returns the status' full description, e.g. `404 Not Found`.
    #[must_use]
    pub fn status_line(&self) -> String {
        let reason = self.reason();
        if reason.is_empty() {
            return self.code().to_string();
        }
        format!("{} {}", self.code(), reason)
    }

    /// Responses with these codes never carry a body or a framing header.
    #[must_use]
    pub fn forbids_body(&self) -> bool {
        let code = self.code();
        (100..200).contains(&code) || code == 204 || code == 304
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code())
    }
}

#[cfg(test)]
mod test_status {
    use super::Status;

    #[test]
    fn round_trips_known_and_unknown_codes() {
        assert_eq!(Status::from(404), Status::NotFound);
        assert_eq!(Status::NotFound.code(), 404);
        assert_eq!(Status::from(299), Status::Other(299));
        assert_eq!(Status::Other(299).code(), 299);
    }

    #[test]
    fn renders_status_lines() {
        assert_eq!(Status::SwitchingProtocols.status_line(), "101 Switching Protocols");
        assert_eq!(Status::Other(599).status_line(), "599");
    }

    #[test]
    fn bodiless_codes() {
        assert!(Status::SwitchingProtocols.forbids_body());
        assert!(Status::NoContent.forbids_body());
        assert!(Status::NotModified.forbids_body());
        assert!(!Status::OK.forbids_body());
        assert!(Status::OK.is_success());
        assert!(!Status::NotFound.is_success());
    }
}
