//! OAuth2 protocol types.

use crate::state::StatePayload;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Raw userinfo document returned by a provider's profile endpoint.
pub type RawProfile = Map<String, Value>;

/// Why a login was initiated. Round-tripped through the provider inside the signed state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    pub resource: String,
    #[serde(default)]
    pub additional_payload: Option<Map<String, Value>>,
}

impl AuthorizationRequest {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            additional_payload: None,
        }
    }

    pub fn with_additional_payload(mut self, payload: Map<String, Value>) -> Self {
        self.additional_payload = Some(payload);
        self
    }

    /// The payload that gets signed into the state parameter.
    ///
    /// Additional keys are merged after `resource` and win on collision.
    pub fn state_payload(&self) -> StatePayload {
        let mut payload = StatePayload::new();
        payload.insert("resource".to_string(), Value::String(self.resource.clone()));
        if let Some(additional) = &self.additional_payload {
            for (key, value) in additional {
                payload.insert(key.clone(), value.clone());
            }
        }
        payload
    }
}

/// Query parameters of an OAuth2 callback request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Successful code-for-token exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenExchangeResult {
    pub access_token: String,
    pub raw: Map<String, Value>,
}

impl TokenExchangeResult {
    /// Extract the access token from a token endpoint response body.
    pub fn from_raw(raw: Map<String, Value>) -> Option<Self> {
        let access_token = raw
            .get("access_token")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())?
            .to_string();

        Some(Self { access_token, raw })
    }
}

/// Read a string claim from a raw profile, treating non-strings and empty strings as absent.
pub(crate) fn claim_str(profile: &RawProfile, field: &str) -> Option<String> {
    profile
        .get(field)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_payload_contains_resource() {
        let payload = AuthorizationRequest::new("dashboard").state_payload();
        assert_eq!(Value::Object(payload), json!({"resource": "dashboard"}));
    }

    #[test]
    fn test_additional_payload_is_merged() {
        let extra = json!({"tab": "billing", "resource": "overridden"})
            .as_object()
            .cloned()
            .unwrap();
        let payload = AuthorizationRequest::new("dashboard")
            .with_additional_payload(extra)
            .state_payload();

        assert_eq!(
            Value::Object(payload),
            json!({"resource": "overridden", "tab": "billing"})
        );
    }

    #[test]
    fn test_token_exchange_requires_access_token() {
        let raw = json!({"access_token": "abc", "token_type": "Bearer"})
            .as_object()
            .cloned()
            .unwrap();
        let result = TokenExchangeResult::from_raw(raw).unwrap();
        assert_eq!(result.access_token, "abc");
        assert_eq!(result.raw["token_type"], "Bearer");

        let missing = json!({"token_type": "Bearer"}).as_object().cloned().unwrap();
        assert!(TokenExchangeResult::from_raw(missing).is_none());

        let empty = json!({"access_token": ""}).as_object().cloned().unwrap();
        assert!(TokenExchangeResult::from_raw(empty).is_none());
    }

    #[test]
    fn test_claim_str_ignores_non_strings() {
        let profile = json!({"email": "a@b.c", "age": 3, "blank": ""})
            .as_object()
            .cloned()
            .unwrap();
        assert_eq!(claim_str(&profile, "email"), Some("a@b.c".to_string()));
        assert_eq!(claim_str(&profile, "age"), None);
        assert_eq!(claim_str(&profile, "blank"), None);
        assert_eq!(claim_str(&profile, "missing"), None);
    }
}
