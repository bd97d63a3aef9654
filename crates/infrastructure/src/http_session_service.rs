use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

use permitra_core::{AppError, AppResult, SessionContext};

use crate::SessionRefresher;

/// Token pair issued by the auth service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionTokens {
    /// Short-lived bearer token attached to directory calls.
    pub access_token: String,
    /// Long-lived token exchanged for a new pair when the access token
    /// expires.
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
struct LoginRequestDto<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshRequestDto<'a> {
    refresh_token: &'a str,
}

/// HTTP client for the external auth service.
///
/// Holds the most recent refresh token so it can act as the
/// [`SessionRefresher`] collaborator behind the directory adapter's
/// retry-once-on-401 replay. When service-account credentials are attached,
/// a missing or rejected refresh token falls back to a fresh login.
pub struct HttpSessionService {
    http_client: reqwest::Client,
    base_url: Url,
    credentials: Option<(String, String)>,
    refresh_token: Mutex<Option<String>>,
}

impl HttpSessionService {
    /// Creates a new auth service client rooted at the service base URL.
    #[must_use]
    pub fn new(http_client: reqwest::Client, base_url: Url) -> Self {
        Self {
            http_client,
            base_url,
            credentials: None,
            refresh_token: Mutex::new(None),
        }
    }

    /// Attaches service-account credentials used when no refresh token is
    /// available.
    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Exchanges credentials for a token pair and remembers the refresh
    /// token.
    pub async fn login(&self, username: &str, password: &str) -> AppResult<SessionTokens> {
        let tokens = self
            .post_tokens("login", &LoginRequestDto { username, password })
            .await?;
        *self.refresh_token.lock().await = Some(tokens.refresh_token.clone());
        Ok(tokens)
    }

    /// Exchanges a refresh token for a new pair and remembers the rotated
    /// refresh token.
    pub async fn refresh(&self, refresh_token: &str) -> AppResult<SessionTokens> {
        let tokens = self
            .post_tokens("refresh", &RefreshRequestDto { refresh_token })
            .await?;
        *self.refresh_token.lock().await = Some(tokens.refresh_token.clone());
        Ok(tokens)
    }

    async fn post_tokens<T: Serialize>(&self, path: &str, payload: &T) -> AppResult<SessionTokens> {
        let endpoint = self.base_url.join(path).map_err(|error| {
            AppError::Internal(format!("invalid auth endpoint '{path}': {error}"))
        })?;

        let response = self
            .http_client
            .post(endpoint)
            .json(payload)
            .send()
            .await
            .map_err(|error| AppError::Upstream(format!("auth transport error: {error}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<response body unavailable>".to_owned());
            return Err(AppError::Unauthorized(format!(
                "auth service rejected token exchange with status {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|error| AppError::Upstream(format!("auth returned malformed payload: {error}")))
    }
}

#[async_trait]
impl SessionRefresher for HttpSessionService {
    async fn refresh_session(&self, session: &SessionContext) -> AppResult<SessionContext> {
        let held = self.refresh_token.lock().await.clone();

        if let Some(refresh_token) = held {
            match self.refresh(&refresh_token).await {
                Ok(tokens) => return Ok(session.with_access_token(tokens.access_token)),
                Err(error) => {
                    debug!(error = %error, "refresh token rejected, falling back to login");
                }
            }
        }

        match &self.credentials {
            Some((username, password)) => {
                let tokens = self.login(username, password).await?;
                Ok(session.with_access_token(tokens.access_token))
            }
            None => Err(AppError::Unauthorized(
                "session expired and no refresh token or credentials are held".to_owned(),
            )),
        }
    }
}
