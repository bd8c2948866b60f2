use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, TimeZone, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::info;

use crate::errors::{check_response, ServiceError};
use crate::models::{LoggedInUser, RegisteredUser};

/// Tokens issued by the backend are valid for one day.
pub const SESSION_LIFETIME_HOURS: i64 = 24;

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
    user: LoggedInUser,
}

/// Claims the backend signs into its session token.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionClaims {
    pub id: u64,
    pub email: Option<String>,
    pub exp: Option<i64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    user_id: u64,
    expires_at: DateTime<Utc>,
}

/// Bearer session for the auth and profile service.
#[derive(Clone)]
pub struct SessionAuth {
    client: Client,
    base_url: String,
    cached_token: Arc<Mutex<Option<CachedToken>>>,
}

impl SessionAuth {
    /// A session that is not logged in yet.
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            cached_token: Arc::new(Mutex::new(None)),
        }
    }

    /// Resume a session from a previously issued token.
    pub fn with_token(base_url: &str, token: String) -> Result<Self> {
        let cached = cache_token(token, Utc::now())?;
        let auth = Self::new(base_url);
        Ok(Self {
            cached_token: Arc::new(Mutex::new(Some(cached))),
            ..auth
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn http(&self) -> &Client {
        &self.client
    }

    /// Create an account. Fails with `EmailExists` when the email is taken.
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<RegisteredUser> {
        let resp = self
            .client
            .post(format!("{}/register", self.base_url))
            .json(&json!({
                "name": name,
                "email": email,
                "password": password
            }))
            .send()
            .await
            .context("POST /register failed")?;

        let resp = check_response(resp).await?;
        let user: RegisteredUser = resp.json().await?;
        info!(user_id = user.user_id, "registered new account");
        Ok(user)
    }

    /// Sign in with email and password, returning a session holding the fresh token.
    pub async fn login(base_url: &str, email: &str, password: &str) -> Result<(Self, LoggedInUser)> {
        let auth = Self::new(base_url);
        let resp = auth
            .client
            .post(format!("{}/login", auth.base_url))
            .json(&json!({
                "email": email,
                "password": password
            }))
            .send()
            .await
            .context("POST /login failed")?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            return Err(ServiceError::InvalidCredentials.into());
        }
        let resp = check_response(resp).await?;
        let login: LoginResponse = resp.json().await?;

        let cached = cache_token(login.token, Utc::now())?;
        *auth.cached_token.lock().await = Some(cached);
        info!(user_id = login.user.id, "logged in");

        Ok((auth, login.user))
    }

    /// Token to present as the bearer credential. Errors with `MissingToken` when
    /// there is no session or it has expired (with a 60s margin).
    pub async fn bearer_token(&self) -> Result<String> {
        let cached = self.cached_token.lock().await;
        match *cached {
            Some(ref token) if token.expires_at > Utc::now() + Duration::seconds(60) => {
                Ok(token.token.clone())
            }
            _ => Err(ServiceError::MissingToken.into()),
        }
    }

    /// Raw token for persisting the session, if any.
    pub async fn token(&self) -> Option<String> {
        self.cached_token.lock().await.as_ref().map(|t| t.token.clone())
    }

    pub async fn user_id(&self) -> Result<u64> {
        self.cached_token
            .lock()
            .await
            .as_ref()
            .map(|t| t.user_id)
            .ok_or_else(|| ServiceError::MissingToken.into())
    }

    pub async fn logout(&self) {
        *self.cached_token.lock().await = None;
    }
}

fn cache_token(token: String, now: DateTime<Utc>) -> Result<CachedToken> {
    let claims = decode_claims(&token)?;
    let expires_at = claims
        .exp
        .and_then(|exp| Utc.timestamp_opt(exp, 0).single())
        .unwrap_or_else(|| now + Duration::hours(SESSION_LIFETIME_HOURS));
    Ok(CachedToken {
        token,
        user_id: claims.id,
        expires_at,
    })
}

/// Read the payload of a JWT without verifying it. The backend verifies; the
/// client only needs the user id and expiry.
pub fn decode_claims(token: &str) -> Result<SessionClaims> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(anyhow!("Invalid session token format"));
    }

    let payload = parts[1].trim_end_matches('=');
    let decoded = URL_SAFE_NO_PAD
        .decode(payload)
        .context("Session token payload is not base64")?;
    serde_json::from_slice(&decoded).context("Session token payload is not valid JSON")
}
