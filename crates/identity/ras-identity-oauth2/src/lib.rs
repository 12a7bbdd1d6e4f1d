//! OAuth2 "Authorization Code" login with signed state.
//!
//! The crate covers both legs of the flow. [`LoginLinks`] resolves a provider
//! from the [`ProviderRegistry`] and builds its authorization URL with a
//! [`StateCodec`]-signed `state` parameter. [`CallbackOrchestrator`] validates
//! the provider's redirect back, exchanges the code, fetches and normalizes the
//! profile, and then hands control to a caller-supplied [`LoginContinuation`]
//! (usually one that issues session tokens).

mod callback;
mod client;
mod config;
mod error;
mod generic;
mod google;
mod links;
mod provider;
mod registry;
mod state;
mod types;


pub use callback::{
    CallbackError, CallbackErrorKind, CallbackOrchestrator, CallbackStage, CompletedLogin,
    CsrfRotator, DEFAULT_ERROR_MESSAGE, DEFAULT_STATUS_CODE, LoginContinuation, ObscuredError,
    UuidCsrfRotator,
};
pub use client::OAuth2HttpClient;
pub use config::{
    DEFAULT_CALLBACK_PATH, DEFAULT_REQUEST_TIMEOUT_SECONDS, GOOGLE_AUTHORIZATION_ENDPOINT,
    GOOGLE_PROFILE_ENDPOINT, GOOGLE_SCOPE, GOOGLE_TOKEN_ENDPOINT, OAuth2Config,
    OAuth2ProviderConfig, ProfileMapping, ProviderKind,
};
pub use error::{OAuth2Error, OAuth2Result, ProviderError, StateError};
pub use generic::GenericProvider;
pub use google::GoogleProvider;
pub use links::LoginLinks;
pub use provider::{OAuth2Provider, RequestContext};
pub use registry::{ProviderRegistry, ProviderRegistryBuilder};
pub use state::{DEFAULT_STATE_TTL_SECONDS, StateCodec, StatePayload};
pub use types::{AuthorizationRequest, CallbackParams, RawProfile, TokenExchangeResult};

// Re-export common types for convenience
pub use ras_identity_core::{NormalizedProfile, VerifiedIdentity};
