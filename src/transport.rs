use std::sync::Mutex;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use tracing::{debug, trace};

pub use reqwest::Method;

use crate::auth::AuthSession;
use crate::error::ApiFailure;
use crate::logger::MessageLogger;
use crate::protocol;
use crate::{Error, Result};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP plumbing shared by login, refresh cycles and commands.
///
/// Owns one pooled `reqwest::Client` and the bearer token session.
pub struct Transport {
    http: reqwest::Client,
    auth_url: String,
    api_url: String,
    request_timeout: Duration,
    session: AuthSession,
    logger: Option<Mutex<MessageLogger>>,
}

impl Transport {
    pub(crate) fn new(
        http: reqwest::Client,
        auth_url: String,
        api_url: String,
        request_timeout: Duration,
        session: AuthSession,
        logger: Option<MessageLogger>,
    ) -> Self {
        Self {
            http,
            auth_url: auth_url.trim_end_matches('/').to_string(),
            api_url: api_url.trim_end_matches('/').to_string(),
            request_timeout,
            session,
            logger: logger.map(Mutex::new),
        }
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub async fn login(&self) -> Result<()> {
        self.session.login(self).await
    }

    pub async fn ensure_authenticated(&self) -> Result<()> {
        self.session.ensure_authenticated(self).await
    }

    /// Issue one request and return its parsed JSON body.
    ///
    /// The token path goes to the auth host with a form body; every other
    /// path goes to the resource host with a JSON body.
    pub async fn request(
        &self,
        path: &str,
        method: Method,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let is_auth = protocol::is_auth_path(path);
        let base = if is_auth { &self.auth_url } else { &self.api_url };
        let url = format!("{base}{path}");
        trace!(method = %method, url = %url, "request");

        self.log(|logger| {
            logger.log_request(method.as_str(), path, body.map(protocol::redact).as_ref())
        });

        let mut req = self
            .http
            .request(method, &url)
            .header(ACCEPT, "*/*");
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(token) = self.session.token().await {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = if is_auth { req.form(body) } else { req.json(body) };
        }

        let exchange = async {
            let resp = req.send().await?;
            let status = resp.status();
            let content_type = resp
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();
            let text = resp.text().await?;
            Ok::<_, Error>((status, content_type, text))
        };
        let (status, content_type, text) = tokio::time::timeout(self.request_timeout, exchange)
            .await
            .map_err(|_| {
                debug!(url = %url, timeout = ?self.request_timeout, "request timed out");
                Error::Timeout(self.request_timeout)
            })??;

        let parsed = classify(is_auth, status, &content_type, &text);
        self.log(|logger| logger.log_response(path, status.as_u16(), parsed.as_ref().ok()));
        parsed
    }

    fn log(&self, f: impl FnOnce(&mut MessageLogger)) {
        if let Some(logger) = &self.logger
            && let Ok(mut guard) = logger.lock()
        {
            f(&mut *guard);
        }
    }
}

fn classify(is_auth: bool, status: StatusCode, content_type: &str, text: &str) -> Result<Value> {
    if !status.is_success() {
        let failure = ApiFailure {
            status: Some(status.as_u16()),
            message: status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string(),
            content_type: Some(content_type.to_string()).filter(|c| !c.is_empty()),
            body: Some(text.to_string()).filter(|b| !b.is_empty()),
        };
        let auth_class = is_auth
            || status == StatusCode::UNAUTHORIZED
            || status == StatusCode::FORBIDDEN;
        return Err(if auth_class {
            Error::Auth(failure)
        } else {
            Error::Api(failure)
        });
    }

    if !content_type.contains("application/json") {
        return Err(Error::Api(ApiFailure {
            status: Some(status.as_u16()),
            message: "unexpected content type".to_string(),
            content_type: Some(content_type.to_string()),
            body: Some(text.to_string()),
        }));
    }

    serde_json::from_str(text).map_err(|e| {
        Error::Api(ApiFailure {
            status: Some(status.as_u16()),
            message: format!("invalid JSON body: {e}"),
            content_type: Some(content_type.to_string()),
            body: Some(text.to_string()),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_with_json_parses() {
        let v = classify(false, StatusCode::OK, "application/json; charset=utf-8", r#"{"a":1}"#)
            .unwrap();
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn unauthorized_is_auth_error() {
        let err = classify(false, StatusCode::UNAUTHORIZED, "application/json", "{}").unwrap_err();
        assert!(err.is_auth());
    }

    #[test]
    fn any_failure_on_token_path_is_auth_error() {
        let err = classify(true, StatusCode::BAD_REQUEST, "application/json", "{}").unwrap_err();
        assert!(err.is_auth());
    }

    #[test]
    fn server_error_is_plain_api_error() {
        let err = classify(false, StatusCode::BAD_GATEWAY, "text/html", "<html>").unwrap_err();
        match err {
            Error::Api(failure) => {
                assert_eq!(failure.status, Some(502));
                assert_eq!(failure.body.as_deref(), Some("<html>"));
            }
            other => panic!("expected Api, got {other:?}"),
        }
    }

    #[test]
    fn wrong_content_type_carries_diagnostics() {
        let err = classify(false, StatusCode::OK, "text/plain", "hello").unwrap_err();
        match err {
            Error::Api(failure) => {
                assert_eq!(failure.content_type.as_deref(), Some("text/plain"));
                assert_eq!(failure.body.as_deref(), Some("hello"));
            }
            other => panic!("expected Api, got {other:?}"),
        }
    }

    #[test]
    fn invalid_json_is_api_error() {
        let err = classify(false, StatusCode::OK, "application/json", "{nope").unwrap_err();
        assert!(matches!(err, Error::Api(_)));
    }
}
