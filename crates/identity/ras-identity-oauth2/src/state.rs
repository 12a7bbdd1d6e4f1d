//! Signed state codec for the OAuth2 `state` parameter.
//!
//! The state is an HS256 JWT carrying the caller's payload under a private
//! claim. It is integrity protected, not encrypted: anyone holding the URL can
//! read the payload, nobody without the secret can forge or alter it.

use crate::error::{OAuth2Error, OAuth2Result, StateError};
use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default lifetime of an issued state.
pub const DEFAULT_STATE_TTL_SECONDS: u64 = 600;

/// Caller payload carried through the redirect round trip.
pub type StatePayload = Map<String, Value>;

#[derive(Debug, Serialize, Deserialize)]
struct StateClaims {
    pld: StatePayload,
    iat: i64,
    exp: i64,
}

/// Encodes and verifies signed state tokens with a process-wide secret.
#[derive(Clone)]
pub struct StateCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl std::fmt::Debug for StateCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateCodec")
            .field("secret", &"<redacted>")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl StateCodec {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
        }
    }

    /// Fails when `ttl_seconds` does not fit a [`Duration`].
    pub fn with_ttl_seconds(secret: &str, ttl_seconds: u64) -> OAuth2Result<Self> {
        let ttl = i64::try_from(ttl_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or_else(|| {
                OAuth2Error::ConfigError(format!(
                    "state TTL of {} seconds is out of range",
                    ttl_seconds
                ))
            })?;

        Ok(Self::new(secret, ttl))
    }

    /// Sign `payload` into a compact, URL-safe token.
    pub fn encode(&self, payload: &StatePayload) -> Result<String, StateError> {
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| StateError::Signing("state expiry is out of range".to_string()))?;
        let claims = StateClaims {
            pld: payload.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| StateError::Signing(e.to_string()))
    }

    /// Verify `encoded` and return the payload it carries.
    ///
    /// The signature is checked before the claims are deserialized, so a
    /// payload is never returned from a token we did not sign.
    pub fn decode(&self, encoded: &str) -> Result<StatePayload, StateError> {
        if encoded.trim().is_empty() {
            return Err(StateError::Malformed("state is empty".to_string()));
        }

        let data = decode::<StateClaims>(encoded, &self.decoding_key, &self.validation).map_err(
            |e| match e.kind() {
                ErrorKind::InvalidSignature => StateError::InvalidSignature,
                ErrorKind::ExpiredSignature => StateError::Expired,
                _ => StateError::Malformed(e.to_string()),
            },
        )?;

        Ok(data.claims.pld)
    }

    /// Decode an optional query parameter; absence is malformed, never an empty payload.
    pub fn decode_param(&self, encoded: Option<&str>) -> Result<StatePayload, StateError> {
        match encoded {
            Some(encoded) => self.decode(encoded),
            None => Err(StateError::Malformed("state is missing".to_string())),
        }
    }
}
