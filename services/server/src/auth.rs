use axum::http::HeaderMap;
use uuid::Uuid;

use crate::state::AppState;

/// Outcome of resolving a request's credentials to a namespace.
pub enum NamespaceAuth {
    /// Bound to an existing namespace.
    Namespace(String),
    /// Test mode auto-provisioned a namespace; the raw token must be
    /// returned to the caller in the `X-EventoDB-Token` response header.
    Provisioned { namespace: String, token: String },
}

#[derive(Debug, PartialEq, Eq)]
pub enum AuthError {
    /// No credentials supplied.
    Required,
    /// Credentials supplied but malformed or unknown.
    Invalid,
    /// Registry failure while resolving.
    Internal(String),
}

pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Resolve a namespace-scoped request.
///
/// In test mode a missing token provisions a fresh namespace instead of
/// failing `AUTH_REQUIRED`.
pub async fn resolve_namespace(
    state: &AppState,
    raw_token: Option<&str>,
) -> Result<NamespaceAuth, AuthError> {
    match raw_token {
        Some(token) => match state.store.resolve_token(token) {
            Ok(Some(ns)) => Ok(NamespaceAuth::Namespace(ns)),
            Ok(None) => Err(AuthError::Invalid),
            Err(e) => Err(AuthError::Internal(e.to_string())),
        },
        None if state.test_mode => {
            let id = format!("test-{}", Uuid::new_v4().simple());
            match state.store.create_namespace(&id, Some("auto-provisioned"), None) {
                Ok((record, token)) => Ok(NamespaceAuth::Provisioned {
                    namespace: record.id,
                    token,
                }),
                Err(e) => Err(AuthError::Internal(e.to_string())),
            }
        }
        None => Err(AuthError::Required),
    }
}

/// Check credentials for namespace-administration methods.
pub fn require_admin(state: &AppState, raw_token: Option<&str>) -> Result<(), AuthError> {
    let Some(token) = raw_token else {
        return Err(AuthError::Required);
    };
    match &state.admin_token {
        Some(admin) if admin == token => Ok(()),
        _ => Err(AuthError::Invalid),
    }
}
