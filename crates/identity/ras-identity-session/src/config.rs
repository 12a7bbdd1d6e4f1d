use crate::error::{SessionError, SessionResult};
use chrono::Duration;
use jsonwebtoken::Algorithm;
use std::str::FromStr;

pub const DEFAULT_ACCESS_TTL_SECONDS: i64 = 300;
pub const DEFAULT_REFRESH_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;

#[derive(Clone)]
pub struct SessionConfig {
    pub jwt_secret: String,
    pub access_ttl: Duration,
    pub refresh_enabled: bool,
    pub refresh_ttl: Duration,
    pub algorithm: Algorithm,
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("jwt_secret", &"<redacted>")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_enabled", &self.refresh_enabled)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "change-me-in-production".to_string(),
            access_ttl: Duration::seconds(DEFAULT_ACCESS_TTL_SECONDS),
            refresh_enabled: true,
            refresh_ttl: Duration::seconds(DEFAULT_REFRESH_TTL_SECONDS),
            algorithm: Algorithm::HS256,
        }
    }
}

impl SessionConfig {
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            ..Default::default()
        }
    }

    pub fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    pub fn with_refresh(mut self, enabled: bool, ttl: Duration) -> Self {
        self.refresh_enabled = enabled;
        self.refresh_ttl = ttl;
        self
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// A token lifetime from a configured number of seconds.
    pub fn ttl_from_seconds(seconds: i64) -> SessionResult<Duration> {
        Duration::try_seconds(seconds).ok_or_else(|| {
            SessionError::ConfigError(format!("TTL of {} seconds is out of range", seconds))
        })
    }

    /// Only the HMAC family is usable with a shared secret.
    pub fn parse_algorithm(name: &str) -> SessionResult<Algorithm> {
        let algorithm = Algorithm::from_str(&name.to_uppercase())
            .map_err(|_| SessionError::ConfigError(format!("Unknown JWT algorithm '{}'", name)))?;

        match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(algorithm),
            other => Err(SessionError::ConfigError(format!(
                "JWT algorithm {:?} needs a key pair, only HS256/HS384/HS512 are supported",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.access_ttl, Duration::minutes(5));
        assert_eq!(config.refresh_ttl, Duration::days(7));
        assert!(config.refresh_enabled);
        assert_eq!(config.algorithm, Algorithm::HS256);
    }

    #[test]
    fn test_parse_algorithm() {
        assert_eq!(SessionConfig::parse_algorithm("hs512").unwrap(), Algorithm::HS512);
        assert!(matches!(
            SessionConfig::parse_algorithm("RS256"),
            Err(SessionError::ConfigError(_))
        ));
        assert!(SessionConfig::parse_algorithm("none").is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", SessionConfig::new("super-secret-value"));
        assert!(!rendered.contains("super-secret-value"));
    }

    #[test]
    fn test_ttl_from_seconds_bounds() {
        assert_eq!(
            SessionConfig::ttl_from_seconds(300).unwrap(),
            Duration::minutes(5)
        );
        assert!(matches!(
            SessionConfig::ttl_from_seconds(i64::MAX),
            Err(SessionError::ConfigError(_))
        ));
    }
}
