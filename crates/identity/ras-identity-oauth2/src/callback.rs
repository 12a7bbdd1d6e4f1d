//! The OAuth2 callback state machine.
//!
//! A callback request walks through
//! `Start -> ProviderResolved -> StateDecoded -> CodeExchanged -> ProfileFetched -> Completed`
//! and aborts at the first failing check. The checks run strictly in that
//! order: an unknown provider is reported before the state is looked at, and a
//! bad state is reported before the code is looked at.

use crate::error::OAuth2Error;
use crate::provider::RequestContext;
use crate::registry::ProviderRegistry;
use crate::state::{StateCodec, StatePayload};
use crate::types::CallbackParams;
use async_trait::async_trait;
use ras_identity_core::NormalizedProfile;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_ERROR_MESSAGE: &str = "Unauthorized";
pub const DEFAULT_STATUS_CODE: u16 = 401;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackStage {
    Start,
    ProviderResolved,
    StateDecoded,
    CodeExchanged,
    ProfileFetched,
    Completed,
    Aborted,
}

impl fmt::Display for CallbackStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::ProviderResolved => "provider_resolved",
            Self::StateDecoded => "state_decoded",
            Self::CodeExchanged => "code_exchanged",
            Self::ProfileFetched => "profile_fetched",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackErrorKind {
    UnknownProvider,
    InvalidState,
    MissingCode,
    TokenExchangeFailed,
    ProfileFetchFailed,
}

impl CallbackErrorKind {
    pub fn message(&self) -> &'static str {
        match self {
            Self::UnknownProvider => "Invalid OAuth2 provider",
            Self::InvalidState => "Invalid state or signature",
            Self::MissingCode => "Authorization code not provided",
            Self::TokenExchangeFailed => "OAuth2 token retrieval failed",
            Self::ProfileFetchFailed => "Failed to fetch user profile",
        }
    }

    /// Status used when errors are shown in debug mode.
    pub fn debug_status(&self) -> u16 {
        match self {
            Self::UnknownProvider => 404,
            Self::InvalidState | Self::MissingCode => 400,
            Self::TokenExchangeFailed | Self::ProfileFetchFailed => 502,
        }
    }
}

/// Why a callback was aborted. Carries the full diagnostic for logs; use
/// [`CallbackError::obscure`] before showing it to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackError {
    pub kind: CallbackErrorKind,
    pub diagnostic: Option<String>,
}

impl fmt::Display for CallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.diagnostic {
            Some(diagnostic) => write!(f, "{}: {}", self.kind.message(), diagnostic),
            None => f.write_str(self.kind.message()),
        }
    }
}

impl std::error::Error for CallbackError {}

/// Client-facing form of a [`CallbackError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObscuredError {
    pub reason: String,
    pub status: u16,
}

impl CallbackError {
    pub fn new(kind: CallbackErrorKind) -> Self {
        Self {
            kind,
            diagnostic: None,
        }
    }

    pub fn with_diagnostic(kind: CallbackErrorKind, diagnostic: impl Into<String>) -> Self {
        Self {
            kind,
            diagnostic: Some(diagnostic.into()),
        }
    }

    /// Outside debug mode every failure looks the same to the client.
    pub fn obscure(&self, debug: bool) -> ObscuredError {
        if debug {
            ObscuredError {
                reason: self.to_string(),
                status: self.kind.debug_status(),
            }
        } else {
            ObscuredError {
                reason: DEFAULT_ERROR_MESSAGE.to_string(),
                status: DEFAULT_STATUS_CODE,
            }
        }
    }
}

/// Rotates the anti-forgery token once a login succeeds.
pub trait CsrfRotator: Send + Sync {
    fn rotate(&self) -> String;
}

/// Issues a fresh random UUID on every rotation.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidCsrfRotator;

impl CsrfRotator for UuidCsrfRotator {
    fn rotate(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Everything the continuation learns about a successful login.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedLogin {
    pub provider: String,
    pub profile: NormalizedProfile,
    pub state: StatePayload,
    pub resource: Option<String>,
    pub csrf_token: Option<String>,
}

/// Caller-supplied step that runs after a successful callback, typically
/// issuing session tokens and building the response.
#[async_trait]
pub trait LoginContinuation: Send + Sync {
    type Output: Send;

    async fn complete(&self, login: CompletedLogin) -> Self::Output;
}

pub struct CallbackOrchestrator {
    registry: Arc<ProviderRegistry>,
    codec: Arc<StateCodec>,
    debug: bool,
    csrf_rotator: Option<Arc<dyn CsrfRotator>>,
}

impl fmt::Debug for CallbackOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackOrchestrator")
            .field("registry", &self.registry)
            .field("debug", &self.debug)
            .field("csrf_rotation", &self.csrf_rotator.is_some())
            .finish()
    }
}

impl CallbackOrchestrator {
    pub fn new(registry: Arc<ProviderRegistry>, codec: Arc<StateCodec>) -> Self {
        Self {
            registry,
            codec,
            debug: false,
            csrf_rotator: None,
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_csrf_rotator(mut self, rotator: Arc<dyn CsrfRotator>) -> Self {
        self.csrf_rotator = Some(rotator);
        self
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Run the callback for `provider_name` and hand the result to `continuation`.
    pub async fn handle<C>(
        &self,
        provider_name: &str,
        params: &CallbackParams,
        ctx: &RequestContext,
        continuation: &C,
    ) -> Result<C::Output, CallbackError>
    where
        C: LoginContinuation + ?Sized,
    {
        let login = self
            .run(provider_name, params, ctx)
            .await
            .inspect_err(|e| {
                warn!("OAuth2 callback for '{}' aborted: {}", provider_name, e);
                debug!(stage = %CallbackStage::Aborted, provider = provider_name);
            })?;

        let output = continuation.complete(login).await;
        debug!(stage = %CallbackStage::Completed, provider = provider_name);
        Ok(output)
    }

    async fn run(
        &self,
        provider_name: &str,
        params: &CallbackParams,
        ctx: &RequestContext,
    ) -> Result<CompletedLogin, CallbackError> {
        debug!(stage = %CallbackStage::Start, provider = provider_name);

        let provider = self.registry.resolve(provider_name).map_err(|e| match e {
            OAuth2Error::UnknownProvider(name) => {
                CallbackError::with_diagnostic(CallbackErrorKind::UnknownProvider, name)
            }
            other => CallbackError::with_diagnostic(
                CallbackErrorKind::UnknownProvider,
                other.to_string(),
            ),
        })?;
        debug!(stage = %CallbackStage::ProviderResolved, provider = provider.name());

        let state = self
            .codec
            .decode_param(params.state.as_deref())
            .map_err(|e| {
                CallbackError::with_diagnostic(CallbackErrorKind::InvalidState, e.to_string())
            })?;
        debug!(stage = %CallbackStage::StateDecoded, provider = provider.name());

        if let Some(error) = &params.error {
            let diagnostic = match &params.error_description {
                Some(description) => format!("{} ({})", error, description),
                None => error.clone(),
            };
            return Err(CallbackError::with_diagnostic(
                CallbackErrorKind::MissingCode,
                diagnostic,
            ));
        }

        let code = params
            .code
            .as_deref()
            .filter(|code| !code.is_empty())
            .ok_or_else(|| CallbackError::new(CallbackErrorKind::MissingCode))?;

        let token = provider
            .exchange_code_for_token(code, ctx)
            .await
            .map_err(|e| {
                CallbackError::with_diagnostic(CallbackErrorKind::TokenExchangeFailed, e.to_string())
            })?;
        debug!(stage = %CallbackStage::CodeExchanged, provider = provider.name());

        let raw_profile = provider
            .fetch_profile(&token.access_token)
            .await
            .map_err(|e| {
                CallbackError::with_diagnostic(CallbackErrorKind::ProfileFetchFailed, e.to_string())
            })?;
        debug!(stage = %CallbackStage::ProfileFetched, provider = provider.name());

        let profile = provider.normalize_profile(&raw_profile);
        let csrf_token = self.csrf_rotator.as_ref().map(|rotator| rotator.rotate());
        let resource = state
            .get("resource")
            .and_then(Value::as_str)
            .map(String::from);

        info!(
            "OAuth2 login completed for provider {} (user: {})",
            provider.name(),
            profile.username
        );

        Ok(CompletedLogin {
            provider: provider.name().to_string(),
            profile,
            state,
            resource,
            csrf_token,
        })
    }
}
