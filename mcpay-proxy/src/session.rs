//! API-key sessions.
//!
//! Callers authenticate with `Authorization: Bearer <key>`. A request with no
//! `Authorization` header runs anonymously: it reaches the pipeline without a
//! session, so the payment hook leaves payment signals to the caller.

use std::collections::HashMap;

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use mcpay::context::Session;

use crate::config::ApiKeyConfig;
use crate::error::ProxyError;

/// Resolves API keys to sessions.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    keys: HashMap<String, Session>,
}

impl SessionStore {
    /// Builds a store from the configured key table.
    #[must_use]
    pub fn from_config(api_keys: &HashMap<String, ApiKeyConfig>) -> Self {
        let keys = api_keys
            .iter()
            .map(|(key, identity)| {
                let session = Session::new(identity.user_id.clone());
                let session = match &identity.wallet_address {
                    Some(address) => session.with_wallet_address(address.clone()),
                    None => session,
                };
                (key.clone(), session)
            })
            .collect();
        Self { keys }
    }

    /// Registers a key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>, session: Session) -> Self {
        self.keys.insert(key.into(), session);
        self
    }

    /// Number of registered keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether no keys are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Looks up the session for a request's headers.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Unauthorized`] if an `Authorization` header is
    /// present but is not a bearer token for a known key.
    pub fn resolve(&self, headers: &HeaderMap) -> Result<Option<Session>, ProxyError> {
        let Some(value) = headers.get(AUTHORIZATION) else {
            return Ok(None);
        };
        let key = value
            .to_str()
            .ok()
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or(ProxyError::Unauthorized)?;
        self.keys
            .get(key)
            .cloned()
            .map(Some)
            .ok_or(ProxyError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn store() -> SessionStore {
        let mut table = HashMap::new();
        table.insert(
            "sk-alice".to_owned(),
            ApiKeyConfig {
                user_id: "alice".into(),
                wallet_address: Some("0xa11ce".into()),
            },
        );
        SessionStore::from_config(&table)
    }

    fn headers(authorization: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static(authorization));
        headers
    }

    #[test]
    fn test_known_key_resolves_session() {
        let session = store().resolve(&headers("Bearer sk-alice")).unwrap().unwrap();
        assert_eq!(session.user_id, "alice");
        assert_eq!(session.wallet_address.as_deref(), Some("0xa11ce"));
    }

    #[test]
    fn test_missing_header_is_anonymous() {
        assert_eq!(store().resolve(&HeaderMap::new()).unwrap(), None);
    }

    #[test]
    fn test_bad_credentials_are_rejected() {
        let store = store();
        assert!(matches!(
            store.resolve(&headers("Bearer sk-mallory")),
            Err(ProxyError::Unauthorized)
        ));
        assert!(matches!(
            store.resolve(&headers("Basic c2stYWxpY2U=")),
            Err(ProxyError::Unauthorized)
        ));
    }
}
