use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::Response;
use parking_lot::RwLock;

use crate::access::CurrentUser;
use crate::identity::UserId;
use crate::users::InMemoryUserStore;

/// Cookie carrying the session token for browser clients.
pub const SESSION_COOKIE: &str = "jwt_token";

/// Maps a bearer credential to a user. Issuing and validating credentials
/// is the auth collaborator's job; this crate only consumes the result.
pub trait SessionResolver: Send + Sync {
    fn resolve(&self, token: &str) -> Option<UserId>;
}

/// Fixed token table, e.g. pre-issued API tokens from the users file.
#[derive(Debug, Default)]
pub struct StaticSessions {
    tokens: RwLock<HashMap<String, UserId>>,
}

impl StaticSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_store(store: &InMemoryUserStore) -> Self {
        let sessions = Self::new();
        for (token, user) in store.tokens() {
            sessions.insert(token, user);
        }
        sessions
    }

    pub fn insert(&self, token: impl Into<String>, user: UserId) {
        self.tokens.write().insert(token.into(), user);
    }

    pub fn revoke(&self, token: &str) -> bool {
        self.tokens.write().remove(token).is_some()
    }
}

impl SessionResolver for StaticSessions {
    fn resolve(&self, token: &str) -> Option<UserId> {
        self.tokens.read().get(token).cloned()
    }
}

/// Bearer token from `Authorization`, falling back to the session cookie.
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    if bearer.is_some() {
        return bearer;
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|t| !t.is_empty())
}

/// Attach the [`CurrentUser`] for the request. Unknown or missing
/// credentials resolve to no user rather than a rejection.
pub async fn resolve_session(
    State(resolver): State<Arc<dyn SessionResolver>>,
    mut request: Request,
    next: Next,
) -> Response {
    let user = token_from_headers(request.headers()).and_then(|t| resolver.resolve(&t));
    tracing::trace!(user = ?user, path = %request.uri().path(), "Session resolved");
    request.extensions_mut().insert(CurrentUser(user));
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_header_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert(header::COOKIE, HeaderValue::from_static("jwt_token=xyz"));
        assert_eq!(token_from_headers(&headers).as_deref(), Some("abc"));
    }

    #[test]
    fn cookie_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; jwt_token=xyz; other=1"),
        );
        assert_eq!(token_from_headers(&headers).as_deref(), Some("xyz"));
    }

    #[test]
    fn no_credentials() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic Zm9v"));
        assert_eq!(token_from_headers(&headers), None);
    }

    #[test]
    fn static_sessions_resolve_and_revoke() {
        let sessions = StaticSessions::new();
        let alice = UserId::new("alice").unwrap();
        sessions.insert("t1", alice.clone());
        assert_eq!(sessions.resolve("t1"), Some(alice));
        assert!(sessions.revoke("t1"));
        assert_eq!(sessions.resolve("t1"), None);
    }
}
