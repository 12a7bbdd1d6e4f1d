//! OAuth2 error types.

use thiserror::Error;

pub type OAuth2Result<T> = Result<T, OAuth2Error>;

#[derive(Debug, Error)]
pub enum OAuth2Error {
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Unknown OAuth2 provider: {0}")]
    UnknownProvider(String),

    #[error("Invalid state parameter: {0}")]
    InvalidState(#[from] StateError),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),
}

/// Failures of the signed state codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("state signature does not match")]
    InvalidSignature,

    #[error("state is malformed: {0}")]
    Malformed(String),

    #[error("state has expired")]
    Expired,

    #[error("state could not be signed: {0}")]
    Signing(String),
}

/// Failures of the outbound calls a provider makes (token exchange, profile fetch).
///
/// Transport problems are kept apart from the provider answering with an error,
/// so callers can tell a network outage from a rejected code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("request to identity provider timed out")]
    Timeout,

    #[error("network error talking to identity provider: {0}")]
    Network(String),

    #[error("identity provider rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid response from identity provider: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(err.to_string())
        }
    }
}
