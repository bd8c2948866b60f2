use reqwest::{Response, StatusCode};
use serde_json::Value;
use thiserror::Error;

/// Failures of the auth and profile service that callers need to tell apart.
///
/// These travel inside `anyhow::Error`; use `err.downcast_ref::<ServiceError>()`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("Please log in first")]
    MissingToken,
    #[error("Your session has expired, please log in again")]
    InvalidToken,
    #[error("Email not found or credentials incorrect")]
    InvalidCredentials,
    #[error("Email already exists")]
    EmailExists,
    #[error("Unexpected response: {status} - {body}")]
    Unexpected { status: u16, body: String },
}

impl ServiceError {
    /// Map a non-success status to the taxonomy. `body` is the raw response text.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        match status {
            StatusCode::BAD_REQUEST => {
                Self::Validation(server_message(body).unwrap_or_else(|| "Invalid request".into()))
            }
            StatusCode::UNAUTHORIZED => Self::MissingToken,
            StatusCode::FORBIDDEN => Self::InvalidToken,
            StatusCode::CONFLICT => Self::EmailExists,
            _ => Self::Unexpected {
                status: status.as_u16(),
                body: body.to_string(),
            },
        }
    }

    /// Whether the user has to log in (again) before retrying.
    pub fn needs_login(&self) -> bool {
        matches!(self, Self::MissingToken | Self::InvalidToken)
    }
}

/// Pass successful responses through; turn anything else into a [`ServiceError`].
pub(crate) async fn check_response(resp: Response) -> Result<Response, ServiceError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    Err(ServiceError::from_status(status, &body))
}

/// The `message` field of the backend's JSON error bodies.
fn server_message(body: &str) -> Option<String> {
    serde_json::from_str::<Value>(body)
        .ok()?
        .get("message")?
        .as_str()
        .map(String::from)
}
