use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::access::{AccessError, CurrentUser};
use crate::config::ManagerConfig;
use crate::identity::UserId;
use crate::users::UserStore;

/// Restricts administrative routes to the admin account.
#[derive(Debug, Clone)]
pub struct ManagerGate {
    /// Lowercased; matched against the lowercased request path.
    directory: String,
    /// Matched case-sensitively.
    route_prefixes: Vec<String>,
}

impl ManagerGate {
    pub fn new(config: &ManagerConfig) -> Self {
        Self {
            directory: config.directory.to_lowercase(),
            route_prefixes: config
                .route_prefixes
                .iter()
                .map(|p| format!("/{}", p.trim_start_matches('/')))
                .collect(),
        }
    }

    pub fn is_protected(&self, path: &str) -> bool {
        self.route_prefixes.iter().any(|p| path.starts_with(p.as_str()))
            || (!self.directory.is_empty() && path.to_lowercase().starts_with(&self.directory))
    }

    /// The admin is looked up on every call so a revoked admin loses
    /// access on their next request.
    pub fn check(
        &self,
        path: &str,
        user: Option<&UserId>,
        users: &dyn UserStore,
    ) -> Result<(), AccessError> {
        if let Some(user) = user {
            if users.admin_user().as_ref() == Some(user) {
                return Ok(());
            }
        }
        if self.is_protected(path) {
            return Err(AccessError::Forbidden);
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct ManagerAccess {
    pub gate: Arc<ManagerGate>,
    pub users: Arc<dyn UserStore>,
}

pub async fn manager_access(
    State(access): State<ManagerAccess>,
    request: Request,
    next: Next,
) -> Response {
    let user = request
        .extensions()
        .get::<CurrentUser>()
        .and_then(|c| c.0.clone());

    match access
        .gate
        .check(request.uri().path(), user.as_ref(), access.users.as_ref())
    {
        Ok(()) => next.run(request).await,
        Err(e) => {
            tracing::warn!(path = %request.uri().path(), user = ?user, "Manager access denied");
            e.into_response()
        }
    }
}
