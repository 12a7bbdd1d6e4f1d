//! Moving issued credentials onto an HTTP response: expiration headers,
//! `Set-Cookie` values and redirect query parameters.

use crate::error::SessionResult;
use crate::service::SessionIssuance;
use chrono::{DateTime, Utc};
use http::header::{COOKIE, HeaderMap, HeaderName, HeaderValue, SET_COOKIE};
use url::Url;

pub const DEFAULT_ACCESS_COOKIE: &str = "JWT";
pub const DEFAULT_REFRESH_COOKIE: &str = "JWT-refresh-token";

// `http` header names are lowercase; they match `JWT-Expiration` and
// `Refresh-Token-Expiration` on the wire.
pub const JWT_EXPIRATION_HEADER: &str = "jwt-expiration";
pub const REFRESH_TOKEN_EXPIRATION_HEADER: &str = "refresh-token-expiration";

pub const JWT_EXPIRES_PARAM: &str = "jwt_expires";
pub const REFRESH_EXPIRES_PARAM: &str = "refresh_expires";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieSettings {
    pub access_cookie_name: String,
    pub refresh_cookie_name: String,
    pub secure: bool,
    pub path: String,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            access_cookie_name: DEFAULT_ACCESS_COOKIE.to_string(),
            refresh_cookie_name: DEFAULT_REFRESH_COOKIE.to_string(),
            secure: false,
            path: "/".to_string(),
        }
    }
}

impl CookieSettings {
    fn cookie(&self, name: &str, value: &str, max_age: i64) -> String {
        let mut cookie = format!(
            "{}={}; Path={}; Max-Age={}; HttpOnly; SameSite=Lax",
            name, value, self.path, max_age
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// `Set-Cookie` values carrying the issued tokens.
    pub fn session_cookies(&self, issuance: &SessionIssuance, now: DateTime<Utc>) -> Vec<String> {
        let mut cookies = vec![self.cookie(
            &self.access_cookie_name,
            &issuance.access_token,
            seconds_until(issuance.access_expires_at, now),
        )];

        if let (Some(token), Some(expires_at)) =
            (&issuance.refresh_token, issuance.refresh_expires_at)
        {
            cookies.push(self.cookie(
                &self.refresh_cookie_name,
                token,
                seconds_until(expires_at, now),
            ));
        }

        cookies
    }

    /// `Set-Cookie` values that make the browser drop both session cookies.
    pub fn clearing_cookies(&self) -> Vec<String> {
        vec![
            self.cookie(&self.access_cookie_name, "", 0),
            self.cookie(&self.refresh_cookie_name, "", 0),
        ]
    }
}

fn seconds_until(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expires_at - now).num_seconds().max(0)
}

/// Add the expiration headers and session cookies for `issuance` to `headers`.
pub fn apply_session_headers(
    headers: &mut HeaderMap,
    settings: &CookieSettings,
    issuance: &SessionIssuance,
) -> SessionResult<()> {
    headers.insert(
        HeaderName::from_static(JWT_EXPIRATION_HEADER),
        HeaderValue::from(issuance.access_expires_at.timestamp()),
    );
    if let Some(refresh_expires_at) = issuance.refresh_expires_at {
        headers.insert(
            HeaderName::from_static(REFRESH_TOKEN_EXPIRATION_HEADER),
            HeaderValue::from(refresh_expires_at.timestamp()),
        );
    }

    for cookie in settings.session_cookies(issuance, Utc::now()) {
        headers.append(SET_COOKIE, HeaderValue::from_str(&cookie)?);
    }
    Ok(())
}

/// Set `jwt_expires` (and `refresh_expires`) on `url`, replacing earlier
/// values and keeping every other query parameter.
pub fn append_expiry_params(url: &mut Url, issuance: &SessionIssuance) {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key.as_ref() != JWT_EXPIRES_PARAM && key.as_ref() != REFRESH_EXPIRES_PARAM)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    let mut pairs = url.query_pairs_mut();
    pairs.clear();
    for (key, value) in &kept {
        pairs.append_pair(key, value);
    }
    pairs.append_pair(
        JWT_EXPIRES_PARAM,
        &issuance.access_expires_at.timestamp().to_string(),
    );
    if let Some(refresh_expires_at) = issuance.refresh_expires_at {
        pairs.append_pair(REFRESH_EXPIRES_PARAM, &refresh_expires_at.timestamp().to_string());
    }
}

/// Value of cookie `name` from the request's `Cookie` headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}
