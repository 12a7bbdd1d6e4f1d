//! Session token issuance policy.

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::store::{InMemoryRefreshTokenStore, RefreshRecord, RefreshTokenStore, hash_token};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::RngCore;
use rand::rngs::OsRng;
use ras_identity_core::VerifiedIdentity;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const REFRESH_TOKEN_BYTES: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
    pub provider_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// Credentials minted for one login or refresh. The refresh fields are
/// present exactly when refresh issuance is enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIssuance {
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token: Option<String>,
    pub refresh_expires_at: Option<DateTime<Utc>>,
}

pub struct SessionService {
    config: SessionConfig,
    store: Arc<dyn RefreshTokenStore>,
}

impl SessionService {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_store(config, Arc::new(InMemoryRefreshTokenStore::new()))
    }

    pub fn with_store(config: SessionConfig, store: Arc<dyn RefreshTokenStore>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Mint an access token, plus a refresh token when enabled, for `identity`.
    pub async fn issue(&self, identity: &VerifiedIdentity) -> SessionResult<SessionIssuance> {
        let now = Utc::now();
        let access_expires_at = expires_after(now, self.config.access_ttl)?;

        let claims = AccessClaims {
            sub: identity.subject.clone(),
            exp: access_expires_at.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
            provider_id: identity.provider_id.clone(),
            email: identity.email.clone(),
            display_name: identity.display_name.clone(),
            metadata: identity.metadata.clone(),
        };

        let access_token = encode(
            &Header::new(self.config.algorithm),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )?;

        let (refresh_token, refresh_expires_at) = if self.config.refresh_enabled {
            let token = generate_refresh_token();
            let expires_at = expires_after(now, self.config.refresh_ttl)?;

            self.store
                .insert(RefreshRecord {
                    token_hash: hash_token(&token),
                    subject: identity.subject.clone(),
                    provider_id: identity.provider_id.clone(),
                    email: identity.email.clone(),
                    display_name: identity.display_name.clone(),
                    metadata: identity.metadata.clone(),
                    issued_at: now,
                    expires_at,
                })
                .await?;

            (Some(token), Some(expires_at))
        } else {
            (None, None)
        };

        info!(
            "Issued session for {} via {} (refresh: {})",
            identity.subject,
            identity.provider_id,
            refresh_token.is_some()
        );

        Ok(SessionIssuance {
            access_token,
            access_expires_at,
            refresh_token,
            refresh_expires_at,
        })
    }

    pub fn verify_access(&self, token: &str) -> SessionResult<AccessClaims> {
        let mut validation = Validation::new(self.config.algorithm);
        validation.leeway = 0;

        let token_data = decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )?;

        Ok(token_data.claims)
    }

    /// Whether a previously issued refresh token has passed its expiry.
    ///
    /// Unknown or already consumed tokens are [`SessionError::NotFound`], not "expired".
    pub async fn is_refresh_expired(&self, refresh_token: &str) -> SessionResult<bool> {
        let record = self
            .store
            .get(&hash_token(refresh_token))
            .await?
            .ok_or(SessionError::NotFound)?;

        Ok(record.is_expired_at(Utc::now()))
    }

    /// Consume `refresh_token` and issue a fresh access/refresh pair for the same identity.
    pub async fn rotate_refresh(&self, refresh_token: &str) -> SessionResult<SessionIssuance> {
        if !self.config.refresh_enabled {
            return Err(SessionError::RefreshDisabled);
        }

        let record = self
            .store
            .take(&hash_token(refresh_token))
            .await?
            .ok_or(SessionError::NotFound)?;

        if record.is_expired_at(Utc::now()) {
            warn!("Rejected expired refresh token for {}", record.subject);
            return Err(SessionError::RefreshExpired);
        }

        let identity = VerifiedIdentity {
            provider_id: record.provider_id,
            subject: record.subject,
            email: record.email,
            display_name: record.display_name,
            metadata: record.metadata,
        };

        debug!("Rotating refresh token for {}", identity.subject);
        self.issue(&identity).await
    }

    pub async fn revoke_refresh(&self, refresh_token: &str) -> SessionResult<()> {
        let record = self
            .store
            .take(&hash_token(refresh_token))
            .await?
            .ok_or(SessionError::NotFound)?;

        info!("Revoked refresh token for {}", record.subject);
        Ok(())
    }

    pub async fn purge_expired(&self) -> SessionResult<usize> {
        let purged = self.store.purge_expired(Utc::now()).await?;
        if purged > 0 {
            debug!("Purged {} expired refresh token(s)", purged);
        }
        Ok(purged)
    }
}

fn expires_after(now: DateTime<Utc>, ttl: chrono::Duration) -> SessionResult<DateTime<Utc>> {
    now.checked_add_signed(ttl).ok_or_else(|| {
        SessionError::ConfigError(format!("token lifetime {} is out of range", ttl))
    })
}

fn generate_refresh_token() -> String {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn identity() -> VerifiedIdentity {
        VerifiedIdentity {
            provider_id: "oauth2:google".to_string(),
            subject: "ann@x.io".to_string(),
            email: Some("ann@x.io".to_string()),
            display_name: Some("Ann Lee".to_string()),
            metadata: None,
        }
    }

    #[tokio::test]
    async fn test_issue_and_verify_access() {
        let service = SessionService::new(SessionConfig::new("session-secret"));
        let issuance = service.issue(&identity()).await.unwrap();

        let claims = service.verify_access(&issuance.access_token).unwrap();
        assert_eq!(claims.sub, "ann@x.io");
        assert_eq!(claims.provider_id, "oauth2:google");
        assert_eq!(claims.display_name, Some("Ann Lee".to_string()));
        assert_eq!(claims.exp, issuance.access_expires_at.timestamp());
        assert_eq!(claims.exp - claims.iat, 300);

        let refresh = issuance.refresh_token.unwrap();
        assert_eq!(URL_SAFE_NO_PAD.decode(&refresh).unwrap().len(), REFRESH_TOKEN_BYTES);
        assert!(issuance.refresh_expires_at.unwrap() > issuance.access_expires_at);
    }

    #[tokio::test]
    async fn test_refresh_disabled_issues_access_only() {
        let config = SessionConfig::new("s").with_refresh(false, Duration::days(7));
        let service = SessionService::new(config);
        let issuance = service.issue(&identity()).await.unwrap();

        assert!(issuance.refresh_token.is_none());
        assert!(issuance.refresh_expires_at.is_none());
        assert!(matches!(
            service.rotate_refresh("anything").await,
            Err(SessionError::RefreshDisabled)
        ));
    }

    #[tokio::test]
    async fn test_verify_rejects_foreign_and_expired_tokens() {
        let service = SessionService::new(SessionConfig::new("session-secret"));
        let other = SessionService::new(SessionConfig::new("other-secret"));
        let token = other.issue(&identity()).await.unwrap().access_token;
        assert!(matches!(
            service.verify_access(&token),
            Err(SessionError::JwtError(_))
        ));

        let expired = SessionService::new(
            SessionConfig::new("session-secret").with_access_ttl(Duration::seconds(-10)),
        );
        let token = expired.issue(&identity()).await.unwrap().access_token;
        assert!(matches!(
            service.verify_access(&token),
            Err(SessionError::JwtError(e))
                if matches!(e.kind(), jsonwebtoken::errors::ErrorKind::ExpiredSignature)
        ));
    }

    #[tokio::test]
    async fn test_is_refresh_expired() {
        let service = SessionService::new(SessionConfig::new("s"));
        let fresh = service.issue(&identity()).await.unwrap().refresh_token.unwrap();
        assert!(!service.is_refresh_expired(&fresh).await.unwrap());

        let lapsed_service = SessionService::new(
            SessionConfig::new("s").with_refresh(true, Duration::seconds(-1)),
        );
        let lapsed = lapsed_service
            .issue(&identity())
            .await
            .unwrap()
            .refresh_token
            .unwrap();
        assert!(lapsed_service.is_refresh_expired(&lapsed).await.unwrap());

        assert!(matches!(
            service.is_refresh_expired("never-issued").await,
            Err(SessionError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_rotation_is_single_use() {
        let service = SessionService::new(SessionConfig::new("s"));
        let first = service.issue(&identity()).await.unwrap().refresh_token.unwrap();

        let rotated = service.rotate_refresh(&first).await.unwrap();
        let second = rotated.refresh_token.unwrap();
        assert_ne!(first, second);
        assert_eq!(
            service.verify_access(&rotated.access_token).unwrap().sub,
            "ann@x.io"
        );

        assert!(matches!(
            service.rotate_refresh(&first).await,
            Err(SessionError::NotFound)
        ));
        assert!(matches!(
            service.is_refresh_expired(&first).await,
            Err(SessionError::NotFound)
        ));
        assert!(!service.is_refresh_expired(&second).await.unwrap());
    }

    #[tokio::test]
    async fn test_rotation_rejects_expired() {
        let service =
            SessionService::new(SessionConfig::new("s").with_refresh(true, Duration::seconds(-1)));
        let token = service.issue(&identity()).await.unwrap().refresh_token.unwrap();

        assert!(matches!(
            service.rotate_refresh(&token).await,
            Err(SessionError::RefreshExpired)
        ));
    }

    #[tokio::test]
    async fn test_revoke_and_purge() {
        let store = Arc::new(InMemoryRefreshTokenStore::new());
        let service = SessionService::with_store(SessionConfig::new("s"), store.clone());
        let token = service.issue(&identity()).await.unwrap().refresh_token.unwrap();

        service.revoke_refresh(&token).await.unwrap();
        assert!(matches!(
            service.revoke_refresh(&token).await,
            Err(SessionError::NotFound)
        ));

        let lapsed = SessionService::with_store(
            SessionConfig::new("s").with_refresh(true, Duration::seconds(-1)),
            store.clone(),
        );
        lapsed.issue(&identity()).await.unwrap();
        service.issue(&identity()).await.unwrap();

        assert_eq!(service.purge_expired().await.unwrap(), 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_unrepresentable_expiry_is_an_error() {
        let service = SessionService::new(SessionConfig::new("s").with_access_ttl(Duration::MAX));
        assert!(matches!(
            service.issue(&identity()).await,
            Err(SessionError::ConfigError(_))
        ));

        let store = Arc::new(InMemoryRefreshTokenStore::new());
        let service = SessionService::with_store(
            SessionConfig::new("s").with_refresh(true, Duration::MAX),
            store.clone(),
        );
        assert!(matches!(
            service.issue(&identity()).await,
            Err(SessionError::ConfigError(_))
        ));
        assert_eq!(store.len().await, 0);
    }
}
