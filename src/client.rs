use anyhow::{Context, Result};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::auth::SessionAuth;
use crate::errors::{check_response, ServiceError};
use crate::models::{LoggedInUser, Profile, RegisteredUser};

/// Client for the calorie app backend: registration, login and the profile store.
#[derive(Clone)]
pub struct CalorieClient {
    pub auth: SessionAuth,
    user: Option<LoggedInUser>,
}

impl CalorieClient {
    /// Anonymous client, enough for registering.
    pub fn new(base_url: &str) -> Self {
        Self {
            auth: SessionAuth::new(base_url),
            user: None,
        }
    }

    /// Resume with a token saved from an earlier login.
    pub fn with_token(base_url: &str, token: String) -> Result<Self> {
        Ok(Self {
            auth: SessionAuth::with_token(base_url, token)?,
            user: None,
        })
    }

    /// Sign in with email and password.
    pub async fn login(base_url: &str, email: &str, password: &str) -> Result<Self> {
        let (auth, user) = SessionAuth::login(base_url, email, password).await?;
        Ok(Self {
            auth,
            user: Some(user),
        })
    }

    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<RegisteredUser> {
        self.auth.register(name, email, password).await
    }

    /// The user returned by the last login, if this client logged in itself.
    pub fn user(&self) -> Option<&LoggedInUser> {
        self.user.as_ref()
    }

    /// Fetch the signed-in user's profile. `None` when nothing has been saved yet.
    pub async fn get_profile(&self) -> Result<Option<Profile>> {
        let token = self.auth.bearer_token().await?;
        let resp = self
            .auth
            .http()
            .get(format!("{}/profile", self.auth.base_url()))
            .bearer_auth(&token)
            .send()
            .await
            .context("GET /profile failed")?;

        let resp = check_response(resp).await?;
        let record: Value = resp.json().await?;
        let profile = Profile::from_record(&record);
        debug!(found = profile.is_some(), "fetched profile");
        Ok(profile)
    }

    /// Create or replace the signed-in user's profile.
    ///
    /// Incomplete profiles are rejected locally with a validation error and
    /// nothing is sent.
    pub async fn save_profile(&self, profile: &Profile) -> Result<()> {
        validate_profile(profile)?;
        let token = self.auth.bearer_token().await?;

        let resp = self
            .auth
            .http()
            .post(format!("{}/profile", self.auth.base_url()))
            .bearer_auth(&token)
            .json(&json!({
                "weight": profile.weight,
                "height": profile.height,
                "age": profile.age,
                "gender": profile.gender,
                "bmr": profile.bmr
            }))
            .send()
            .await
            .context("POST /profile failed")?;

        check_response(resp).await?;
        info!("profile saved");
        Ok(())
    }
}

/// Same rules the profile service applies before upserting.
pub fn validate_profile(profile: &Profile) -> Result<(), ServiceError> {
    let mut missing = Vec::new();
    if !(profile.weight.is_finite() && profile.weight > 0.0) {
        missing.push("weight");
    }
    if !(profile.height.is_finite() && profile.height > 0.0) {
        missing.push("height");
    }
    if profile.age == 0 {
        missing.push("age");
    }
    if !(profile.bmr.is_finite() && profile.bmr >= 0.0) {
        missing.push("bmr");
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::Validation(format!(
            "Missing required profile fields: {}",
            missing.join(", ")
        )))
    }
}
