use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::access::{AccessError, CurrentUser};
use crate::identity::{UserId, PUBLIC_OWNER};
use crate::users::UserStore;

/// Decides who may read below an owner-namespaced URL root.
///
/// For a root `/output`, the segment after it names the owner:
/// `/output/<owner>/...`. The `public` owner is open to everyone; any other
/// owner is open to that user and to admins.
#[derive(Debug, Clone)]
pub struct FolderGate {
    roots: Vec<String>,
}

impl FolderGate {
    pub fn new<I, S>(roots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let roots = roots
            .into_iter()
            .map(|r| {
                let r = r.into();
                format!("/{}", r.trim_matches('/'))
            })
            .collect();
        Self { roots }
    }

    /// Portion of `path` after the namespaced root it falls under, if any.
    fn namespaced_rest<'a>(&self, path: &'a str) -> Option<&'a str> {
        self.roots.iter().find_map(|root| {
            let rest = path.strip_prefix(root.as_str())?;
            if rest.is_empty() || rest.starts_with('/') {
                Some(rest)
            } else {
                None
            }
        })
    }

    pub fn is_namespaced(&self, path: &str) -> bool {
        self.namespaced_rest(path).is_some()
    }

    pub fn check(
        &self,
        path: &str,
        user: Option<&UserId>,
        users: &dyn UserStore,
    ) -> Result<(), AccessError> {
        let Some(rest) = self.namespaced_rest(path) else {
            return Ok(());
        };

        let mut segments = rest.strip_prefix('/').unwrap_or(rest).split('/');
        let folder_owner = match segments.next() {
            Some(s) if !s.is_empty() => s,
            _ => return Err(AccessError::NotFound),
        };
        if segments.any(|s| s == "..") || folder_owner == "." || folder_owner == ".." {
            return Err(AccessError::NotFound);
        }

        if folder_owner == PUBLIC_OWNER {
            return Ok(());
        }

        let Some(user) = user else {
            return Err(AccessError::Forbidden);
        };
        let (Some(id), Some(record)) = users.get_user(user.as_str()) else {
            return Err(AccessError::Forbidden);
        };

        if id.as_str() == folder_owner || record.admin {
            Ok(())
        } else {
            Err(AccessError::Forbidden)
        }
    }
}

#[derive(Clone)]
pub struct FolderAccess {
    pub gate: Arc<FolderGate>,
    pub users: Arc<dyn UserStore>,
}

pub async fn folder_access(
    State(access): State<FolderAccess>,
    request: Request,
    next: Next,
) -> Response {
    if !access.gate.is_namespaced(request.uri().path()) {
        return next.run(request).await;
    }

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
            tracing::warn!(
                path = %request.uri().path(),
                user = ?user,
                error = %e,
                "Folder access denied"
            );
            e.into_response()
        }
    }
}
