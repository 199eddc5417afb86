#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    HEAD,
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
    OPTIONS,
    CONNECT,
    TRACE,
    Custom(String),
}

impl core::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for Method {
    fn from(value: &str) -> Self {
        match value.to_uppercase().as_str() {
            "GET" => Self::GET,
            "HEAD" => Self::HEAD,
            "POST" => Self::POST,
            "PUT" => Self::PUT,
            "DELETE" => Self::DELETE,
            "PATCH" => Self::PATCH,
            "TRACE" => Self::TRACE,
            "CONNECT" => Self::CONNECT,
            "OPTIONS" => Self::OPTIONS,
            _ => Self::Custom(value.to_string()),
        }
    }
}

impl From<String> for Method {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl Method {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::HEAD => "HEAD",
            Self::GET => "GET",
            Self::POST => "POST",
            Self::PUT => "PUT",
            Self::DELETE => "DELETE",
            Self::PATCH => "PATCH",
            Self::OPTIONS => "OPTIONS",
            Self::CONNECT => "CONNECT",
            Self::TRACE => "TRACE",
            Self::Custom(inner) => inner.as_str(),
        }
    }

    /// Methods that normally carry a body announce an empty one with
    /// `Content-Length: 0` instead of leaving the length implied.
    #[must_use]
    pub fn expects_body(&self) -> bool {
        matches!(self, Self::POST | Self::PUT | Self::PATCH)
    }

    /// GET and HEAD requests never carry a body.
    #[must_use]
    pub fn forbids_body(&self) -> bool {
        matches!(self, Self::GET | Self::HEAD)
    }

    /// Method tokens may not contain whitespace or separators.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let token = self.as_str();
        !token.is_empty()
            && token
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
    }
}
