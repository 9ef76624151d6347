use std::fmt;

/// HTTP protocol version reported with a response head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl Version {
    pub const HTTP_10: Version = Version { major: 1, minor: 0 };
    pub const HTTP_11: Version = Version { major: 1, minor: 1 };
    pub const HTTP_2: Version = Version { major: 2, minor: 0 };
}

impl Default for Version {
    fn default() -> Self { Self::HTTP_11 }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.minor {
            0 if self.major >= 2 => write!(f, "HTTP/{}", self.major),
            minor => write!(f, "HTTP/{}.{}", self.major, minor),
        }
    }
}

/// Status line and headers of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status:  u16,
    pub headers: Vec<(String, String)>,
    pub version: Version,
}

impl ResponseHead {
    pub fn new(status: u16, headers: Vec<(String, String)>, version: Version) -> Self {
        Self {
            status,
            headers,
            version,
        }
    }

    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length")
            .and_then(|value| value.trim().parse().ok())
    }

    /// 1xx heads precede the final head of the same exchange.
    pub fn is_informational(&self) -> bool { (100..200).contains(&self.status) }

    pub fn is_success(&self) -> bool { (200..300).contains(&self.status) }
}
