//! Registered users.
//!
//! Credential storage and verification belong to an external user store;
//! the rest of the crate only reads it through [`UserStore`].
//! [`InMemoryUserStore`] is the bundled implementation, optionally seeded
//! from a JSON file:
//!
//! ```json
//! {
//!   "6f1c...": { "username": "alice", "password": "...", "admin": true, "token": "..." }
//! }
//! ```

use std::path::Path;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SentinelError};
use crate::identity::UserId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    /// Opaque credential. Compared as stored; hashing is the store's concern.
    pub password: String,
    #[serde(default)]
    pub admin: bool,
    /// Pre-issued bearer token, if any.
    #[serde(default)]
    pub token: Option<String>,
}

pub trait UserStore: Send + Sync {
    /// Look a user up by id first, then by username.
    fn get_user(&self, id_or_name: &str) -> (Option<UserId>, Option<UserRecord>);

    /// The account holding the admin designation, if any.
    fn admin_user(&self) -> Option<UserId>;

    fn check_credentials(&self, username: &str, password: &str) -> bool;

    /// False until the first user registers.
    fn has_users(&self) -> bool;
}

#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: RwLock<IndexMap<UserId, UserRecord>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let parsed: IndexMap<UserId, UserRecord> = serde_json::from_str(&raw)?;
        let store = Self::new();
        for (id, record) in parsed {
            store.insert(id, record)?;
        }
        tracing::info!(path = %path.display(), users = store.len(), "Loaded user store");
        Ok(store)
    }

    /// Register a user. Usernames must be unique.
    pub fn add_user(
        &self,
        id: UserId,
        username: impl Into<String>,
        password: impl Into<String>,
        admin: bool,
    ) -> Result<()> {
        self.insert(
            id,
            UserRecord {
                username: username.into(),
                password: password.into(),
                admin,
                token: None,
            },
        )
    }

    pub fn insert(&self, id: UserId, record: UserRecord) -> Result<()> {
        let mut users = self.users.write();
        if users
            .iter()
            .any(|(existing, r)| r.username == record.username && existing != &id)
        {
            return Err(SentinelError::UserStore(format!(
                "username {} already exists",
                record.username
            )));
        }
        users.insert(id, record);
        Ok(())
    }

    pub fn set_admin(&self, id: &UserId, admin: bool) -> bool {
        match self.users.write().get_mut(id) {
            Some(record) => {
                record.admin = admin;
                true
            }
            None => false,
        }
    }

    pub fn remove_user(&self, id: &UserId) -> bool {
        self.users.write().shift_remove(id).is_some()
    }

    /// `(token, user id)` pairs for users with a pre-issued token.
    pub fn tokens(&self) -> Vec<(String, UserId)> {
        self.users
            .read()
            .iter()
            .filter_map(|(id, r)| r.token.clone().map(|t| (t, id.clone())))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }
}

impl UserStore for InMemoryUserStore {
    fn get_user(&self, id_or_name: &str) -> (Option<UserId>, Option<UserRecord>) {
        let users = self.users.read();
        let found = users
            .iter()
            .find(|(id, _)| id.as_str() == id_or_name)
            .or_else(|| users.iter().find(|(_, r)| r.username == id_or_name));
        match found {
            Some((id, record)) => (Some(id.clone()), Some(record.clone())),
            None => (None, None),
        }
    }

    fn admin_user(&self) -> Option<UserId> {
        self.users
            .read()
            .iter()
            .find(|(_, r)| r.admin)
            .map(|(id, _)| id.clone())
    }

    fn check_credentials(&self, username: &str, password: &str) -> bool {
        self.users
            .read()
            .values()
            .any(|r| r.username == username && r.password == password)
    }

    fn has_users(&self) -> bool {
        !self.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn uid(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    #[test]
    fn lookup_by_id_and_name() {
        let store = InMemoryUserStore::new();
        store.add_user(uid("u1"), "alice", "pw", true).unwrap();

        let (id, record) = store.get_user("u1");
        assert_eq!(id, Some(uid("u1")));
        assert_eq!(record.unwrap().username, "alice");

        let (id, _) = store.get_user("alice");
        assert_eq!(id, Some(uid("u1")));

        assert_eq!(store.get_user("nobody"), (None, None));
    }

    #[test]
    fn duplicate_username_rejected() {
        let store = InMemoryUserStore::new();
        store.add_user(uid("u1"), "alice", "pw", true).unwrap();
        assert!(store.add_user(uid("u2"), "alice", "pw", false).is_err());
    }

    #[test]
    fn admin_and_credentials() {
        let store = InMemoryUserStore::new();
        assert!(!store.has_users());
        assert!(store.admin_user().is_none());

        store.add_user(uid("u1"), "alice", "pw", true).unwrap();
        store.add_user(uid("u2"), "bob", "secret", false).unwrap();

        assert!(store.has_users());
        assert_eq!(store.admin_user(), Some(uid("u1")));
        assert!(store.check_credentials("bob", "secret"));
        assert!(!store.check_credentials("bob", "pw"));

        store.set_admin(&uid("u1"), false);
        assert!(store.admin_user().is_none());
    }

    #[test]
    fn loads_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "u1": {{ "username": "alice", "password": "pw", "admin": true, "token": "t-alice" }},
                "u2": {{ "username": "bob", "password": "pw" }}
            }}"#
        )
        .unwrap();

        let store = InMemoryUserStore::from_json_file(file.path()).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.admin_user(), Some(uid("u1")));
        assert_eq!(store.tokens(), vec![("t-alice".to_string(), uid("u1"))]);
    }

    #[test]
    fn rejects_reserved_public_id_in_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "public": {{ "username": "x", "password": "y" }} }}"#).unwrap();
        assert!(InMemoryUserStore::from_json_file(file.path()).is_err());
    }
}
