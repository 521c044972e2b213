use std::fmt;

use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::protocol::{self, DEFAULT_AUDIENCE, DEFAULT_CLIENT_ID, DEFAULT_SCOPE, TOKEN_PATH};
use crate::transport::{Method, Transport};
use crate::{Error, Result};

/// Password-grant credentials. Fixed for the lifetime of a session.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_audience")]
    pub audience: String,
    #[serde(default = "default_scope")]
    pub scope: String,
}

fn default_client_id() -> String {
    DEFAULT_CLIENT_ID.to_string()
}

fn default_audience() -> String {
    DEFAULT_AUDIENCE.to_string()
}

fn default_scope() -> String {
    DEFAULT_SCOPE.to_string()
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            client_id: default_client_id(),
            client_secret: None,
            audience: default_audience(),
            scope: default_scope(),
        }
    }

    pub fn with_client(mut self, id: impl Into<String>, secret: Option<String>) -> Self {
        self.client_id = id.into();
        self.client_secret = secret;
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = audience.into();
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "***"))
            .field("audience", &self.audience)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Bearer token state shared by every request of one transport.
///
/// The token is only ever replaced by a successful login or cleared
/// outright; a failed login leaves it as it was.
pub struct AuthSession {
    credentials: Credentials,
    token: RwLock<Option<String>>,
    login_gate: Mutex<()>,
}

impl AuthSession {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            token: RwLock::new(None),
            login_gate: Mutex::new(()),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub async fn token(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    pub async fn has_token(&self) -> bool {
        self.token.read().await.is_some()
    }

    /// Drop the token so the next cycle logs in again.
    pub async fn invalidate(&self) {
        if self.token.write().await.take().is_some() {
            debug!("bearer token invalidated");
        }
    }

    /// Exchange the credentials for a new access token.
    pub async fn login(&self, transport: &Transport) -> Result<()> {
        let _gate = self.login_gate.lock().await;
        self.exchange(transport).await
    }

    /// Log in unless a token is already held. Concurrent callers share one login.
    pub async fn ensure_authenticated(&self, transport: &Transport) -> Result<()> {
        if self.has_token().await {
            return Ok(());
        }
        let _gate = self.login_gate.lock().await;
        if self.has_token().await {
            return Ok(());
        }
        self.exchange(transport).await
    }

    async fn exchange(&self, transport: &Transport) -> Result<()> {
        debug!(username = %self.credentials.username, "logging in");
        let form = protocol::login_form(&self.credentials);
        let body = transport
            .request(TOKEN_PATH, Method::POST, &[], Some(&form))
            .await
            .inspect_err(|e| warn!(error = %e, "login failed"))?;

        let token = protocol::parse_access_token(&body).ok_or_else(|| {
            Error::MalformedResponse("login response has no access_token".to_string())
        })?;
        *self.token.write().await = Some(token);
        debug!("login succeeded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_deserialize_with_defaults() {
        let creds: Credentials =
            serde_json::from_str(r#"{"username": "a@b.c", "password": "pw"}"#).unwrap();
        assert_eq!(creds.client_id, DEFAULT_CLIENT_ID);
        assert_eq!(creds.scope, DEFAULT_SCOPE);
        assert_eq!(creds.audience, DEFAULT_AUDIENCE);
        assert!(creds.client_secret.is_none());
    }

    #[test]
    fn debug_redacts_secrets() {
        let creds = Credentials::new("a@b.c", "pw").with_client("id", Some("secret".into()));
        let out = format!("{creds:?}");
        assert!(!out.contains("pw\""));
        assert!(!out.contains("secret\""));
        assert!(out.contains("a@b.c"));
    }

    #[tokio::test]
    async fn invalidate_clears_token() {
        let session = AuthSession::new(Credentials::new("a", "b"));
        *session.token.write().await = Some("tok".into());
        assert!(session.has_token().await);
        session.invalidate().await;
        assert!(!session.has_token().await);
    }
}
