use thiserror::Error;

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("JWT error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),

    #[error("Refresh token not found")]
    NotFound,

    #[error("Refresh token has expired")]
    RefreshExpired,

    #[error("Refresh tokens are disabled")]
    RefreshDisabled,

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),

    #[error("Invalid session configuration: {0}")]
    ConfigError(String),
}
