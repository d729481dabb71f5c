//! Request middleware for identity and access control.
//!
//! Layers run in this order, outermost first:
//!
//! 1. [`session::resolve_session`] attaches a [`CurrentUser`] to the request
//! 2. [`folder::folder_access`] guards owner-namespaced folders
//! 3. [`manager::manager_access`] guards admin-only routes
//!
//! Both gates assume the session layer already ran. Rejections never say
//! whether the folder or owner exists.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::identity::UserId;

pub mod folder;
pub mod manager;
pub mod session;

pub use folder::{folder_access, FolderAccess, FolderGate};
pub use manager::{manager_access, ManagerAccess, ManagerGate};
pub use session::{resolve_session, SessionResolver, StaticSessions};

/// User resolved by the session layer for this request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurrentUser(pub Option<UserId>);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error("Not found")]
    NotFound,

    #[error("Forbidden")]
    Forbidden,
}

impl IntoResponse for AccessError {
    fn into_response(self) -> Response {
        let status = match self {
            AccessError::NotFound => StatusCode::NOT_FOUND,
            AccessError::Forbidden => StatusCode::FORBIDDEN,
        };
        (status, self.to_string()).into_response()
    }
}
