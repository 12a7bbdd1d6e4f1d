//! Session token issuance for logins completed by an identity provider.
//!
//! A [`SessionService`] turns a [`VerifiedIdentity`] into a short-lived JWT
//! access token and, when enabled, an opaque single-use refresh token whose
//! hash is kept in a [`RefreshTokenStore`]. The [`transport`] module puts the
//! result on an HTTP response.

mod config;
mod error;
mod service;
mod store;
pub mod transport;

pub use config::{DEFAULT_ACCESS_TTL_SECONDS, DEFAULT_REFRESH_TTL_SECONDS, SessionConfig};
pub use error::{SessionError, SessionResult};
pub use service::{AccessClaims, SessionIssuance, SessionService};
pub use store::{InMemoryRefreshTokenStore, RefreshRecord, RefreshTokenStore, hash_token};
pub use transport::CookieSettings;

pub use ras_identity_core::VerifiedIdentity;
