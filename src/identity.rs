//! Caller identity.
//!
//! Every operation that depends on "who is asking" takes an explicit
//! [`Caller`]. Request handlers build one from the user id resolved by the
//! session middleware; the background worker builds one with
//! [`IdentityContext::background`]. There is no ambient per-task state.
//!
//! [`IdentityContext`] also keeps a durable fallback user: when a caller is
//! bound with `make_durable = true`, later callers that carry no user of
//! their own (for example, code running outside any request) resolve to
//! that user. The fallback is a convenience default for path resolution. It
//! is never used to decide who owns a job; dequeued work carries its owner.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, SentinelError};

/// Owner segment used for unauthenticated callers and single-tenant mode.
pub const PUBLIC_OWNER: &str = "public";

/// Opaque, validated user identifier.
///
/// The literal `public` is reserved for [`Owner::Public`] and is rejected
/// here so a real user can never share the public namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() || id.eq_ignore_ascii_case(PUBLIC_OWNER) || id.contains('/') {
            return Err(SentinelError::InvalidUserId(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for UserId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        UserId::new(raw).map_err(serde::de::Error::custom)
    }
}

/// Who a job, history record or storage namespace is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Owner {
    Public,
    User(UserId),
}

impl Owner {
    pub fn as_str(&self) -> &str {
        match self {
            Owner::Public => PUBLIC_OWNER,
            Owner::User(id) => id.as_str(),
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Owner {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Owner {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw == PUBLIC_OWNER {
            return Ok(Owner::Public);
        }
        UserId::new(raw)
            .map(Owner::User)
            .map_err(serde::de::Error::custom)
    }
}

/// Explicit identity of whoever is calling into the queue or storage layer.
#[derive(Debug, Clone)]
pub struct Caller {
    scoped: Option<UserId>,
    fallback: Option<UserId>,
    multi_tenant: bool,
}

impl Caller {
    /// The scoped user if one was bound, else the durable fallback.
    pub fn current_user(&self) -> Option<&UserId> {
        self.scoped.as_ref().or(self.fallback.as_ref())
    }

    /// Owner used to tag and filter. Collapses to `public` when
    /// multi-tenancy is off or nobody is signed in.
    pub fn owner(&self) -> Owner {
        if !self.multi_tenant {
            return Owner::Public;
        }
        match self.current_user() {
            Some(id) => Owner::User(id.clone()),
            None => Owner::Public,
        }
    }

    pub fn is_multi_tenant(&self) -> bool {
        self.multi_tenant
    }
}

/// Source of [`Caller`] values plus the durable fallback user.
#[derive(Debug, Clone)]
pub struct IdentityContext {
    durable: Arc<RwLock<Option<UserId>>>,
    multi_tenant: bool,
}

impl IdentityContext {
    pub fn new(multi_tenant: bool) -> Self {
        Self {
            durable: Arc::new(RwLock::new(None)),
            multi_tenant,
        }
    }

    /// Bind `user_id` to a new caller. With `make_durable`, the id also
    /// becomes the fallback for callers created later without a user.
    pub fn set_current_user(&self, user_id: Option<UserId>, make_durable: bool) -> Caller {
        if make_durable {
            *self.durable.write() = user_id.clone();
        }
        Caller {
            fallback: self.get_current_user(None),
            scoped: user_id,
            multi_tenant: self.multi_tenant,
        }
    }

    /// Caller for an authenticated request path. Never consults the
    /// fallback, so an anonymous request stays `public`.
    pub fn request_caller(&self, user_id: Option<UserId>) -> Caller {
        Caller {
            scoped: user_id,
            fallback: None,
            multi_tenant: self.multi_tenant,
        }
    }

    /// Caller with no scoped user, resolving through the fallback only.
    pub fn background(&self) -> Caller {
        self.set_current_user(None, false)
    }

    /// Scoped user of `caller` if given, else the durable fallback.
    pub fn get_current_user(&self, caller: Option<&Caller>) -> Option<UserId> {
        caller
            .and_then(|c| c.scoped.clone())
            .or_else(|| self.durable.read().clone())
    }

    pub fn is_multi_tenant(&self) -> bool {
        self.multi_tenant
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    #[test]
    fn user_id_rejects_reserved_and_empty() {
        assert!(UserId::new("").is_err());
        assert!(UserId::new("public").is_err());
        assert!(UserId::new("PUBLIC").is_err());
        assert!(UserId::new("a/b").is_err());
        assert!(UserId::new("alice-1").is_ok());
    }

    #[test]
    fn scoped_user_wins_over_fallback() {
        let ctx = IdentityContext::new(true);
        ctx.set_current_user(Some(uid("durable")), true);
        let caller = ctx.set_current_user(Some(uid("alice")), false);
        assert_eq!(caller.current_user(), Some(&uid("alice")));
        assert_eq!(caller.owner(), Owner::User(uid("alice")));
        assert_eq!(ctx.get_current_user(Some(&caller)), Some(uid("alice")));
    }

    #[test]
    fn background_caller_uses_fallback() {
        let ctx = IdentityContext::new(true);
        assert_eq!(ctx.background().owner(), Owner::Public);

        ctx.set_current_user(Some(uid("bob")), true);
        let bg = ctx.background();
        assert_eq!(bg.current_user(), Some(&uid("bob")));
        assert_eq!(ctx.get_current_user(None), Some(uid("bob")));
    }

    #[test]
    fn non_durable_binding_does_not_leak() {
        let ctx = IdentityContext::new(true);
        let _alice = ctx.set_current_user(Some(uid("alice")), false);
        assert!(ctx.background().current_user().is_none());
        assert_eq!(ctx.get_current_user(None), None);
    }

    #[test]
    fn request_caller_ignores_fallback() {
        let ctx = IdentityContext::new(true);
        ctx.set_current_user(Some(uid("bob")), true);
        assert_eq!(ctx.request_caller(None).owner(), Owner::Public);
        assert_eq!(
            ctx.request_caller(Some(uid("alice"))).owner(),
            Owner::User(uid("alice"))
        );
    }

    #[test]
    fn single_tenant_collapses_to_public() {
        let ctx = IdentityContext::new(false);
        let caller = ctx.set_current_user(Some(uid("alice")), false);
        assert_eq!(caller.owner(), Owner::Public);
        assert_eq!(caller.current_user(), Some(&uid("alice")));
    }

    #[test]
    fn owner_serde_round_trip() {
        let json = serde_json::to_string(&Owner::Public).unwrap();
        assert_eq!(json, "\"public\"");
        let owner: Owner = serde_json::from_str("\"carol\"").unwrap();
        assert_eq!(owner, Owner::User(uid("carol")));
    }
}
