//! Server-side refresh token records.

use crate::error::SessionResult;
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// What the server remembers about an issued refresh token. The token itself
/// is never stored, only its SHA-256 hash.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshRecord {
    pub token_hash: String,
    pub subject: String,
    pub provider_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl RefreshRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

pub fn hash_token(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn insert(&self, record: RefreshRecord) -> SessionResult<()>;

    async fn get(&self, token_hash: &str) -> SessionResult<Option<RefreshRecord>>;

    /// Remove and return the record in one step, so a token can be consumed only once.
    async fn take(&self, token_hash: &str) -> SessionResult<Option<RefreshRecord>>;

    /// Drop every record that expired before `now`; returns how many were removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> SessionResult<usize>;
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryRefreshTokenStore {
    records: Arc<RwLock<HashMap<String, RefreshRecord>>>,
}

impl InMemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryRefreshTokenStore {
    async fn insert(&self, record: RefreshRecord) -> SessionResult<()> {
        let mut records = self.records.write().await;
        records.insert(record.token_hash.clone(), record);
        Ok(())
    }

    async fn get(&self, token_hash: &str) -> SessionResult<Option<RefreshRecord>> {
        let records = self.records.read().await;
        Ok(records.get(token_hash).cloned())
    }

    async fn take(&self, token_hash: &str) -> SessionResult<Option<RefreshRecord>> {
        let mut records = self.records.write().await;
        Ok(records.remove(token_hash))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> SessionResult<usize> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| !record.is_expired_at(now));
        Ok(before - records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(token: &str, expires_in: Duration) -> RefreshRecord {
        let now = Utc::now();
        RefreshRecord {
            token_hash: hash_token(token),
            subject: "ann@example.com".to_string(),
            provider_id: "oauth2:google".to_string(),
            email: None,
            display_name: None,
            metadata: None,
            issued_at: now,
            expires_at: now + expires_in,
        }
    }

    #[test]
    fn test_hash_is_stable_and_opaque() {
        assert_eq!(hash_token("abc"), hash_token("abc"));
        assert_ne!(hash_token("abc"), hash_token("abd"));
        assert!(!hash_token("abc").contains("abc"));
    }

    #[tokio::test]
    async fn test_take_is_single_use() {
        let store = InMemoryRefreshTokenStore::new();
        store.insert(record("t1", Duration::hours(1))).await.unwrap();

        assert!(store.get(&hash_token("t1")).await.unwrap().is_some());
        assert!(store.take(&hash_token("t1")).await.unwrap().is_some());
        assert!(store.take(&hash_token("t1")).await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = InMemoryRefreshTokenStore::new();
        store.insert(record("live", Duration::hours(1))).await.unwrap();
        store.insert(record("dead", Duration::seconds(-5))).await.unwrap();

        assert_eq!(store.purge_expired(Utc::now()).await.unwrap(), 1);
        assert_eq!(store.len().await, 1);
        assert!(store.get(&hash_token("live")).await.unwrap().is_some());
    }
}
