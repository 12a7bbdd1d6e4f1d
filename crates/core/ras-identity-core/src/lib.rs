//! Core identity types shared between login providers and session issuance.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Profile has no usable subject")]
    MissingSubject,
}

pub type IdentityResult<T> = Result<T, IdentityError>;

/// Provider-independent user data produced by normalizing a provider profile.
///
/// This is the only shape the rest of the system sees; how a provider's raw
/// profile maps onto it is decided by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedProfile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: String,
    pub email: String,
    pub profile_picture: Option<String>,
}

impl NormalizedProfile {
    /// "First Last" when at least one name part is known.
    pub fn display_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

/// An identity that has been verified by a login provider and is ready to be
/// bound to session credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedIdentity {
    pub provider_id: String,
    pub subject: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl VerifiedIdentity {
    /// Build an identity from a normalized provider profile.
    ///
    /// The username is the subject; a profile without one cannot back a session.
    pub fn from_profile(provider_id: &str, profile: &NormalizedProfile) -> IdentityResult<Self> {
        if profile.username.trim().is_empty() {
            return Err(IdentityError::MissingSubject);
        }

        let metadata = profile
            .profile_picture
            .as_ref()
            .map(|picture| serde_json::json!({ "picture": picture }));

        Ok(Self {
            provider_id: format!("oauth2:{}", provider_id),
            subject: profile.username.clone(),
            email: (!profile.email.is_empty()).then(|| profile.email.clone()),
            display_name: profile.display_name(),
            metadata,
        })
    }
}
