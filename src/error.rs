use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Details of a rejected or unreadable upstream response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiFailure {
    pub status: Option<u16>,
    pub message: String,
    pub content_type: Option<String>,
    pub body: Option<String>,
}

impl ApiFailure {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            content_type: None,
            body: None,
        }
    }
}

impl fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (status {status})", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Error {
    /// Client construction or an otherwise unclassified reqwest failure.
    Http(Arc<reqwest::Error>),
    Timeout(Duration),
    Connection(Arc<reqwest::Error>),
    Api(ApiFailure),
    Auth(ApiFailure),
    MalformedResponse(String),
    NotFound(String),
    /// The task running a refresh cycle ended without reporting an outcome.
    RefreshAborted,
    Io(Arc<std::io::Error>),
}

impl Error {
    /// True for every non-2xx or unreadable response, authentication included.
    pub fn is_api(&self) -> bool {
        matches!(self, Error::Api(_) | Error::Auth(_))
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Error::Auth(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::Timeout(after) => write!(f, "timed out after {after:?}"),
            Error::Connection(e) => write!(f, "connection error: {e}"),
            Error::Api(failure) => write!(f, "API error: {failure}"),
            Error::Auth(failure) => write!(f, "authentication failed: {failure}"),
            Error::MalformedResponse(msg) => write!(f, "malformed response: {msg}"),
            Error::NotFound(serial) => write!(f, "unknown device: {serial}"),
            Error::RefreshAborted => write!(f, "refresh cycle aborted"),
            Error::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http(e) | Error::Connection(e) => Some(e.as_ref()),
            Error::Io(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_request() || e.is_body() {
            Error::Connection(Arc::new(e))
        } else if e.is_decode() {
            Error::Api(ApiFailure::new(format!("unreadable response body: {e}")))
        } else {
            Error::Http(Arc::new(e))
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(Arc::new(e))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_is_an_api_error() {
        let err = Error::Auth(ApiFailure::new("bad password"));
        assert!(err.is_api());
        assert!(err.is_auth());
        assert!(!Error::Timeout(Duration::from_secs(1)).is_api());
    }

    #[test]
    fn display_includes_status() {
        let failure = ApiFailure {
            status: Some(503),
            ..ApiFailure::new("service unavailable")
        };
        assert_eq!(
            Error::Api(failure).to_string(),
            "API error: service unavailable (status 503)"
        );
    }
}
