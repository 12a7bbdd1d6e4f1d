//! HTTP handlers for the login, callback and refresh routes.

use crate::AppState;
use crate::error::ApiError;
use async_trait::async_trait;
use axum::Json;
use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use ras_identity_core::VerifiedIdentity;
use ras_identity_oauth2::{
    AuthorizationRequest, CallbackError, CallbackErrorKind, CallbackParams, CompletedLogin,
    LoginContinuation, OAuth2Error,
};
use ras_identity_session::transport::{
    append_expiry_params, apply_session_headers, cookie_value,
};
use ras_identity_session::{SessionError, SessionIssuance};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{info, warn};
use url::Url;

pub const CSRF_COOKIE: &str = "csrftoken";

#[derive(Debug, Default, Deserialize)]
pub struct LinkQuery {
    #[serde(default)]
    pub resource: String,
    /// JSON object merged into the signed state
    pub additional_state_payload: Option<String>,
}

impl LinkQuery {
    fn authorization_request(&self) -> Result<AuthorizationRequest, ApiError> {
        let request = AuthorizationRequest::new(&self.resource);

        match self.additional_state_payload.as_deref() {
            None | Some("") => Ok(request),
            Some(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(payload)) => Ok(request.with_additional_payload(payload)),
                _ => Err(ApiError::bad_request(
                    "additional_state_payload must be a JSON object",
                )),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProviderLink {
    pub provider: String,
    pub url: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub access_expires_at: i64,
    pub refresh_token: Option<String>,
    pub refresh_expires_at: Option<i64>,
}

impl From<&SessionIssuance> for TokenResponse {
    fn from(issuance: &SessionIssuance) -> Self {
        Self {
            access_token: issuance.access_token.clone(),
            access_expires_at: issuance.access_expires_at.timestamp(),
            refresh_token: issuance.refresh_token.clone(),
            refresh_expires_at: issuance.refresh_expires_at.map(|at| at.timestamp()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshStatus {
    pub expired: bool,
}

fn link_error(err: OAuth2Error) -> ApiError {
    match err {
        OAuth2Error::UnknownProvider(name) => {
            ApiError::not_found(format!("Unknown OAuth2 provider: {}", name))
        }
        other => ApiError::internal(other),
    }
}

pub async fn health() -> &'static str {
    "OK"
}

pub async fn all_links(
    State(state): State<AppState>,
    Query(query): Query<LinkQuery>,
) -> Result<Json<BTreeMap<String, String>>, ApiError> {
    let request = query.authorization_request()?;
    let links = state
        .links
        .all_links(&request, &state.request_context)
        .map_err(link_error)?;

    Ok(Json(links))
}

/// Link for a single provider. One route per registered provider is mounted
/// at startup, so `provider` is always a known name.
pub async fn provider_link(
    state: AppState,
    provider: String,
    query: LinkQuery,
) -> Result<Json<ProviderLink>, ApiError> {
    let request = query.authorization_request()?;
    let url = state
        .links
        .login_link(&provider, &request, &state.request_context)
        .map_err(link_error)?;

    Ok(Json(ProviderLink {
        provider,
        url: url.to_string(),
    }))
}

pub async fn login_redirect(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<LinkQuery>,
) -> Result<Redirect, ApiError> {
    let request = query.authorization_request()?;
    let url = state
        .links
        .login_link(&provider, &request, &state.request_context)
        .map_err(link_error)?;

    info!("Redirecting to {} login", provider);
    Ok(Redirect::to(url.as_str()))
}

pub async fn callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    query: Result<Query<CallbackParams>, QueryRejection>,
) -> Response {
    let params = match query {
        Ok(Query(params)) => params,
        Err(rejection) => {
            let err = CallbackError::with_diagnostic(
                CallbackErrorKind::InvalidState,
                rejection.body_text(),
            );
            warn!("OAuth2 callback for '{}' aborted: {}", provider, err);
            return callback_failure(&state, err);
        }
    };

    let continuation = IssueSession {
        state: state.clone(),
    };

    match state
        .orchestrator
        .handle(&provider, &params, &state.request_context, &continuation)
        .await
    {
        Ok(response) => response,
        Err(err) => callback_failure(&state, err),
    }
}

fn callback_failure(state: &AppState, err: CallbackError) -> Response {
    let obscured = err.obscure(state.orchestrator.debug());
    let status = StatusCode::from_u16(obscured.status).unwrap_or(StatusCode::UNAUTHORIZED);
    (status, obscured.reason).into_response()
}

/// Issues the session once the callback succeeded and redirects the browser
/// back to the application.
struct IssueSession {
    state: AppState,
}

#[async_trait]
impl LoginContinuation for IssueSession {
    type Output = Response;

    async fn complete(&self, login: CompletedLogin) -> Response {
        match self.issue(login).await {
            Ok(response) => response,
            Err(err) => err.into_response(),
        }
    }
}

impl IssueSession {
    async fn issue(&self, login: CompletedLogin) -> Result<Response, ApiError> {
        let identity = VerifiedIdentity::from_profile(&login.provider, &login.profile)
            .map_err(|e| ApiError::with_internal(StatusCode::UNAUTHORIZED, "Unauthorized", e))?;

        let issuance = self
            .state
            .sessions
            .issue(&identity)
            .await
            .map_err(ApiError::internal)?;

        let mut target =
            post_login_url(&self.state.login_redirect_url, login.resource.as_deref());
        append_expiry_params(&mut target, &issuance);

        let mut response = Redirect::to(target.as_str()).into_response();
        apply_session_headers(response.headers_mut(), &self.state.cookies, &issuance)
            .map_err(ApiError::internal)?;

        if let Some(csrf_token) = login.csrf_token {
            let cookie = format!("{}={}; Path=/; SameSite=Lax", CSRF_COOKIE, csrf_token);
            let value = HeaderValue::from_str(&cookie).map_err(ApiError::internal)?;
            response.headers_mut().append(SET_COOKIE, value);
        }

        Ok(response)
    }
}

/// Resolve `resource` against the post-login URL. Anything that would leave
/// its origin falls back to the post-login URL itself.
pub fn post_login_url(base: &Url, resource: Option<&str>) -> Url {
    let Some(resource) = resource.filter(|resource| !resource.is_empty()) else {
        return base.clone();
    };

    match base.join(resource) {
        Ok(joined) if joined.origin() == base.origin() => joined,
        _ => {
            warn!("Ignoring off-site login resource '{}'", resource);
            base.clone()
        }
    }
}

/// Refresh token from a JSON body, falling back to the refresh cookie.
fn refresh_token_from(
    state: &AppState,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Option<String>, ApiError> {
    if !body.is_empty() {
        let request: RefreshRequest = serde_json::from_slice(body)
            .map_err(|_| ApiError::bad_request("Invalid refresh request body"))?;
        if request.refresh_token.is_some() {
            return Ok(request.refresh_token);
        }
    }

    Ok(cookie_value(headers, &state.cookies.refresh_cookie_name))
}

pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let token = refresh_token_from(&state, &headers, &body)?
        .ok_or_else(|| ApiError::bad_request("No refresh token provided"))?;

    let issuance = state
        .sessions
        .rotate_refresh(&token)
        .await
        .map_err(|e| match e {
            SessionError::NotFound | SessionError::RefreshExpired => {
                ApiError::unauthorized(e.to_string())
            }
            SessionError::RefreshDisabled => ApiError::not_found(e.to_string()),
            other => ApiError::internal(other),
        })?;

    let mut response = Json(TokenResponse::from(&issuance)).into_response();
    apply_session_headers(response.headers_mut(), &state.cookies, &issuance)
        .map_err(ApiError::internal)?;

    Ok(response)
}

pub async fn refresh_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<RefreshStatus>, ApiError> {
    let token = refresh_token_from(&state, &headers, &body)?
        .ok_or_else(|| ApiError::bad_request("No refresh token provided"))?;

    let expired = state
        .sessions
        .is_refresh_expired(&token)
        .await
        .map_err(|e| match e {
            SessionError::NotFound => ApiError::not_found(e.to_string()),
            other => ApiError::internal(other),
        })?;

    Ok(Json(RefreshStatus { expired }))
}

pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    if let Some(token) = refresh_token_from(&state, &headers, &body)? {
        match state.sessions.revoke_refresh(&token).await {
            Ok(()) | Err(SessionError::NotFound) => {}
            Err(other) => return Err(ApiError::internal(other)),
        }
    }

    let mut response = StatusCode::NO_CONTENT.into_response();
    for cookie in state.cookies.clearing_cookies() {
        let value = HeaderValue::from_str(&cookie).map_err(ApiError::internal)?;
        response.headers_mut().append(SET_COOKIE, value);
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[test]
    fn test_post_login_url() {
        let base = Url::parse("https://app.example.com/app/").unwrap();

        assert_eq!(post_login_url(&base, None), base);
        assert_eq!(post_login_url(&base, Some("")), base);
        assert_eq!(
            post_login_url(&base, Some("dashboard")).as_str(),
            "https://app.example.com/app/dashboard"
        );
        assert_eq!(
            post_login_url(&base, Some("/settings?tab=2")).as_str(),
            "https://app.example.com/settings?tab=2"
        );
        assert_eq!(post_login_url(&base, Some("https://evil.example/")), base);
        assert_eq!(post_login_url(&base, Some("//evil.example/x")), base);
    }

    #[test]
    fn test_link_query_payload() {
        let query = LinkQuery {
            resource: "dashboard".to_string(),
            additional_state_payload: Some(r#"{"tab":"billing"}"#.to_string()),
        };
        let request = query.authorization_request().unwrap();
        let mut expected = Map::new();
        expected.insert("tab".to_string(), Value::String("billing".to_string()));
        assert_eq!(request.additional_payload, Some(expected));

        let bad = LinkQuery {
            resource: "dashboard".to_string(),
            additional_state_payload: Some("[1, 2]".to_string()),
        };
        let err = bad.authorization_request().unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }
}
