//! API key authentication (§6 "Authentication").
//!
//! Grounded on the teacher's `turbomcp-server::middleware::auth` layering —
//! a config struct plus a request-gating function — simplified to the
//! spec's single shared-secret scheme rather than JWT: a static set of keys,
//! checked against `X-API-Key` on HTTP and header-or-query-param on WS.

use std::collections::HashSet;

use axum::extract::{Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::bridge::BridgeState;

/// Configured API keys and whether auth is required at all.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    keys: HashSet<String>,
    required: bool,
}

impl AuthConfig {
    /// `auth required` defaults to enabled iff any keys are configured,
    /// unless explicitly overridden (§6 "Environment variables").
    #[must_use]
    pub fn new(keys: Vec<String>, required_override: Option<bool>) -> Self {
        let required = required_override.unwrap_or(!keys.is_empty());
        Self { keys: keys.into_iter().collect(), required }
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self { keys: HashSet::new(), required: false }
    }

    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required
    }

    #[must_use]
    pub fn accepts(&self, key: &str) -> bool {
        self.keys.contains(key)
    }
}

/// Axum middleware gating every HTTP request behind `X-API-Key` when
/// auth is required. Failure yields `401` (§7 "User-visible mapping").
pub async fn require_api_key(
    State(state): State<BridgeState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.auth.is_required() {
        return next.run(request).await;
    }

    let provided = request
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok());

    match provided {
        Some(key) if state.auth.accepts(key) => next.run(request).await,
        _ => (StatusCode::UNAUTHORIZED, "invalid or missing X-API-Key").into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    #[serde(default)]
    pub api_key: Option<String>,
}

/// WebSocket connections may pass the key as a header or as a query
/// parameter (§6); failure yields WS close code `1008`.
#[must_use]
pub fn ws_key_is_valid(
    auth: &AuthConfig,
    header_key: Option<&str>,
    query: &Query<WsAuthQuery>,
) -> bool {
    if !auth.is_required() {
        return true;
    }
    header_key.is_some_and(|k| auth.accepts(k))
        || query.api_key.as_deref().is_some_and(|k| auth.accepts(k))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_defaults_from_presence_of_keys() {
        assert!(AuthConfig::new(vec!["k".to_string()], None).is_required());
        assert!(!AuthConfig::new(vec![], None).is_required());
        assert!(AuthConfig::new(vec![], Some(true)).is_required());
        assert!(!AuthConfig::new(vec!["k".to_string()], None.or(Some(false))).is_required());
    }

    #[test]
    fn accepts_only_configured_keys() {
        let auth = AuthConfig::new(vec!["secret".to_string()], None);
        assert!(auth.accepts("secret"));
        assert!(!auth.accepts("other"));
    }
}
