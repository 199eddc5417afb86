use std::collections::BTreeMap;
use std::str::FromStr;

/// HTTP header names the transport reads or writes itself, everything else
/// lives in [`HeaderName::Custom`] lowercased.
#[allow(non_camel_case_types)]
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HeaderName {
    ACCEPT,
    ACCEPT_ENCODING,
    AUTHORIZATION,
    CACHE_CONTROL,
    CONNECTION,
    CONTENT_ENCODING,
    CONTENT_LENGTH,
    CONTENT_TYPE,
    COOKIE,
    DATE,
    HOST,
    LOCATION,
    ORIGIN,
    PRAGMA,
    REFERER,
    SEC_WEBSOCKET_ACCEPT,
    SEC_WEBSOCKET_EXTENSIONS,
    SEC_WEBSOCKET_KEY,
    SEC_WEBSOCKET_PROTOCOL,
    SEC_WEBSOCKET_VERSION,
    SERVER,
    TE,
    TRAILER,
    TRANSFER_ENCODING,
    UPGRADE,
    USER_AGENT,
    Custom(String),
}

impl HeaderName {
    pub fn custom<S: Into<String>>(value: S) -> Self {
        Self::Custom(value.into().to_lowercase())
    }

    /// Lowercase wire name, the form header maps are compared and exported in.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::ACCEPT => "accept",
            Self::ACCEPT_ENCODING => "accept-encoding",
            Self::AUTHORIZATION => "authorization",
            Self::CACHE_CONTROL => "cache-control",
            Self::CONNECTION => "connection",
            Self::CONTENT_ENCODING => "content-encoding",
            Self::CONTENT_LENGTH => "content-length",
            Self::CONTENT_TYPE => "content-type",
            Self::COOKIE => "cookie",
            Self::DATE => "date",
            Self::HOST => "host",
            Self::LOCATION => "location",
            Self::ORIGIN => "origin",
            Self::PRAGMA => "pragma",
            Self::REFERER => "referer",
            Self::SEC_WEBSOCKET_ACCEPT => "sec-websocket-accept",
            Self::SEC_WEBSOCKET_EXTENSIONS => "sec-websocket-extensions",
            Self::SEC_WEBSOCKET_KEY => "sec-websocket-key",
            Self::SEC_WEBSOCKET_PROTOCOL => "sec-websocket-protocol",
            Self::SEC_WEBSOCKET_VERSION => "sec-websocket-version",
            Self::SERVER => "server",
            Self::TE => "te",
            Self::TRAILER => "trailer",
            Self::TRANSFER_ENCODING => "transfer-encoding",
            Self::UPGRADE => "upgrade",
            Self::USER_AGENT => "user-agent",
            Self::Custom(name) => name.as_str(),
        }
    }

    /// Header names are tokens, no separators, whitespace or control bytes.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let name = self.as_str();
        !name.is_empty()
            && name.bytes().all(|b| {
                b.is_ascii_alphanumeric()
                    || matches!(
                        b,
                        b'!' | b'#'
                            | b'$'
                            | b'%'
                            | b'&'
                            | b'\''
                            | b'*'
                            | b'+'
                            | b'-'
                            | b'.'
                            | b'^'
                            | b'_'
                            | b'`'
                            | b'|'
                            | b'~'
                    )
            })
    }
}

impl From<&str> for HeaderName {
    fn from(value: &str) -> Self {
        let lower = value.trim().to_lowercase();
        match lower.as_str() {
            "accept" => Self::ACCEPT,
            "accept-encoding" => Self::ACCEPT_ENCODING,
            "authorization" => Self::AUTHORIZATION,
            "cache-control" => Self::CACHE_CONTROL,
            "connection" => Self::CONNECTION,
            "content-encoding" => Self::CONTENT_ENCODING,
            "content-length" => Self::CONTENT_LENGTH,
            "content-type" => Self::CONTENT_TYPE,
            "cookie" => Self::COOKIE,
            "date" => Self::DATE,
            "host" => Self::HOST,
            "location" => Self::LOCATION,
            "origin" => Self::ORIGIN,
            "pragma" => Self::PRAGMA,
            "referer" => Self::REFERER,
            "sec-websocket-accept" => Self::SEC_WEBSOCKET_ACCEPT,
            "sec-websocket-extensions" => Self::SEC_WEBSOCKET_EXTENSIONS,
            "sec-websocket-key" => Self::SEC_WEBSOCKET_KEY,
            "sec-websocket-protocol" => Self::SEC_WEBSOCKET_PROTOCOL,
            "sec-websocket-version" => Self::SEC_WEBSOCKET_VERSION,
            "server" => Self::SERVER,
            "te" => Self::TE,
            "trailer" => Self::TRAILER,
            "transfer-encoding" => Self::TRANSFER_ENCODING,
            "upgrade" => Self::UPGRADE,
            "user-agent" => Self::USER_AGENT,
            _ => Self::Custom(lower),
        }
    }
}

impl From<String> for HeaderName {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<&HeaderName> for HeaderName {
    fn from(value: &HeaderName) -> Self {
        value.clone()
    }
}

impl FromStr for HeaderName {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl core::fmt::Display for HeaderName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Custom(name) => write!(f, "{name}"),
            Self::TE => write!(f, "TE"),
            Self::SEC_WEBSOCKET_ACCEPT => write!(f, "Sec-WebSocket-Accept"),
            Self::SEC_WEBSOCKET_EXTENSIONS => write!(f, "Sec-WebSocket-Extensions"),
            Self::SEC_WEBSOCKET_KEY => write!(f, "Sec-WebSocket-Key"),
            Self::SEC_WEBSOCKET_PROTOCOL => write!(f, "Sec-WebSocket-Protocol"),
            Self::SEC_WEBSOCKET_VERSION => write!(f, "Sec-WebSocket-Version"),
            other => {
                let canonical: Vec<String> = other
                    .as_str()
                    .split('-')
                    .map(|part| {
                        let mut chars = part.chars();
                        match chars.next() {
                            Some(first) => first.to_uppercase().chain(chars).collect(),
                            None => String::new(),
                        }
                    })
                    .collect();
                write!(f, "{}", canonical.join("-"))
            }
        }
    }
}

/// Case-insensitive multimap of header values.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Headers {
    entries: BTreeMap<HeaderName, Vec<String>>,
}

impl Headers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All values of `name` joined the way HTTP folds repeated headers.
    pub fn get<H: Into<HeaderName>>(&self, name: H) -> Option<String> {
        self.entries
            .get(&name.into())
            .map(|values| values.join(", "))
    }

    pub fn get_all<H: Into<HeaderName>>(&self, name: H) -> Option<&[String]> {
        self.entries.get(&name.into()).map(Vec::as_slice)
    }

    pub fn contains<H: Into<HeaderName>>(&self, name: H) -> bool {
        self.entries.contains_key(&name.into())
    }

    /// Replaces every value of `name`.
    pub fn set<H: Into<HeaderName>, S: Into<String>>(&mut self, name: H, value: S) {
        self.entries.insert(name.into(), vec![value.into()]);
    }

    pub fn append<H: Into<HeaderName>, S: Into<String>>(&mut self, name: H, value: S) {
        self.entries
            .entry(name.into())
            .or_default()
            .push(value.into());
    }

    pub fn remove<H: Into<HeaderName>>(&mut self, name: H) -> Option<Vec<String>> {
        self.entries.remove(&name.into())
    }

    /// Number of distinct header names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &Vec<String>)> {
        self.entries.iter()
    }

    /// Lowercase name to folded value, the shape handed to JSON encoders.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .map(|(key, values)| (key.as_str().to_string(), values.join(", ")))
            .collect()
    }
}

impl<H: Into<HeaderName>, S: Into<String>> FromIterator<(H, S)> for Headers {
    fn from_iter<T: IntoIterator<Item = (H, S)>>(iter: T) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.append(name, value);
        }
        headers
    }
}
