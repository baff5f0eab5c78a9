use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - session expired or invalid")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            format!(
                "{}... (truncated, {} total bytes)",
                &body[..MAX_ERROR_BODY_LENGTH],
                body.len()
            )
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(truncated),
            404 => ApiError::NotFound(truncated),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }
}

/// Login failures, split so callers can show different messaging.
///
/// `InvalidCredentials` leaves the session untouched and is displayed
/// inline; `Network` is retryable; `Server` covers rejections that are
/// neither (disabled accounts, pending verification, 5xx). `Storage` means
/// the tokens could not be persisted locally.
#[derive(Error, Debug)]
pub enum LoginError {
    #[error("{0}")]
    InvalidCredentials(String),

    #[error("Could not reach the server: {0}")]
    Network(String),

    #[error("Server rejected the login: {0}")]
    Server(String),

    #[error("Could not store the session: {0}")]
    Storage(String),
}

impl From<ApiError> for LoginError {
    fn from(error: ApiError) -> Self {
        match error {
            ApiError::NetworkError(e) => LoginError::Network(e.to_string()),
            ApiError::Unauthorized => {
                LoginError::InvalidCredentials("Invalid username or password".to_string())
            }
            other => LoginError::Server(other.to_string()),
        }
    }
}
