//! Durable local storage: the registered-user table, the active session and
//! the backend's auth tokens.
//!
//! Values are JSON documents under well-known keys. Unreadable documents
//! are treated as absent so a corrupt store never blocks startup.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use mercado_common::user::{StoredUser, User};

use crate::error::LocalStoreError;
use crate::remote::AuthSession;

/// Key of the registered-user table.
pub const USERS_KEY: &str = "mc_users_db";
/// Key of the persisted session.
pub const SESSION_KEY: &str = "mc_active_session";
/// Key of the backend auth tokens behind the session.
pub const REMOTE_SESSION_KEY: &str = "mc_remote_session";

/// Minimal string key-value storage.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, LocalStoreError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), LocalStoreError>;
    fn remove(&mut self, key: &str) -> Result<(), LocalStoreError>;
}

/// In-process storage that forgets everything on drop.
#[derive(Debug, Default, Clone)]
pub struct MemoryKv {
    entries: HashMap<String, String>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<String>, LocalStoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), LocalStoreError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), LocalStoreError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// One file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileKv {
    dir: PathBuf,
}

impl FileKv {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, LocalStoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileKv {
    fn get(&self, key: &str) -> Result<Option<String>, LocalStoreError> {
        match fs::read_to_string(self.path(key)) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), LocalStoreError> {
        // Write then rename; readers never see a partial document.
        let tmp = self.dir.join(format!("{key}.json.tmp"));
        fs::write(&tmp, value)?;
        fs::rename(&tmp, self.path(key))?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), LocalStoreError> {
        match fs::remove_file(self.path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Result of a credential lookup. Unknown user and wrong password are kept
/// apart so callers can tell them to the user.
#[derive(Debug, Clone, PartialEq)]
pub enum CredentialLookup {
    NotFound,
    WrongPassword,
    Found(StoredUser),
}

/// Typed access to the user table and session on top of a [`KeyValueStore`].
pub struct LocalPersistence {
    kv: Box<dyn KeyValueStore>,
}

impl LocalPersistence {
    pub fn new(kv: impl KeyValueStore + 'static) -> Self {
        Self { kv: Box::new(kv) }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryKv::new())
    }

    pub fn get_all_users(&self) -> Vec<StoredUser> {
        self.read_json(USERS_KEY).unwrap_or_default()
    }

    /// Insert or replace by id.
    pub fn store_user(&mut self, user: StoredUser) -> Result<(), LocalStoreError> {
        let mut users = self.get_all_users();
        match users.iter_mut().find(|u| u.id == user.id) {
            Some(existing) => *existing = user,
            None => users.push(user),
        }
        self.write_json(USERS_KEY, &users)
    }

    pub fn remove_user(&mut self, id: &str) -> Result<(), LocalStoreError> {
        let mut users = self.get_all_users();
        users.retain(|u| u.id != id);
        self.write_json(USERS_KEY, &users)
    }

    /// Registered user whose phone or email equals `contact`.
    pub fn find_user_by_contact(&self, contact: &str) -> Option<StoredUser> {
        self.get_all_users()
            .into_iter()
            .find(|u| u.has_contact(contact))
    }

    /// Match `contact` against phone, email or name, then check the password.
    pub fn find_user_by_credentials(&self, contact: &str, password: &str) -> CredentialLookup {
        match self.get_all_users().into_iter().find(|u| u.answers_to(contact)) {
            None => CredentialLookup::NotFound,
            Some(u) if u.password.verify(password) => CredentialLookup::Found(u),
            Some(_) => CredentialLookup::WrongPassword,
        }
    }

    pub fn save_session(&mut self, user: &User) -> Result<(), LocalStoreError> {
        self.write_json(SESSION_KEY, user)
    }

    pub fn load_session(&self) -> Option<User> {
        self.read_json(SESSION_KEY)
    }

    pub fn clear_session(&mut self) -> Result<(), LocalStoreError> {
        self.kv.remove(SESSION_KEY)
    }

    pub fn save_remote_session(&mut self, session: &AuthSession) -> Result<(), LocalStoreError> {
        self.write_json(REMOTE_SESSION_KEY, session)
    }

    pub fn load_remote_session(&self) -> Option<AuthSession> {
        self.read_json(REMOTE_SESSION_KEY)
    }

    pub fn clear_remote_session(&mut self) -> Result<(), LocalStoreError> {
        self.kv.remove(REMOTE_SESSION_KEY)
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.kv.get(key) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!("local storage read of {key} failed: {e}");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!("ignoring unreadable {key}: {e}");
                None
            }
        }
    }

    fn write_json<T: serde::Serialize + ?Sized>(
        &mut self,
        key: &str,
        value: &T,
    ) -> Result<(), LocalStoreError> {
        let raw = serde_json::to_string(value)?;
        self.kv.set(key, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mercado_common::user::{PasswordHash, UserRole};

    fn stored(id: &str, name: &str, phone: &str, email: &str, password: &str) -> StoredUser {
        StoredUser {
            id: id.into(),
            name: name.into(),
            phone: phone.into(),
            email: email.into(),
            role: UserRole::Client,
            password: PasswordHash::new(password),
        }
    }

    #[test]
    fn store_user_upserts_by_id() {
        let mut local = LocalPersistence::in_memory();
        local.store_user(stored("1", "Ana", "5351234567", "", "secret1")).unwrap();
        local.store_user(stored("2", "Luis", "5357654321", "", "secret2")).unwrap();
        local.store_user(stored("1", "Ana María", "5351234567", "", "secret1")).unwrap();

        let users = local.get_all_users();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].name, "Ana María");
    }

    #[test]
    fn credential_lookup_is_three_way() {
        let mut local = LocalPersistence::in_memory();
        local
            .store_user(stored("1", "Ana", "5351234567", "ana@example.com", "secret1"))
            .unwrap();

        assert_eq!(
            local.find_user_by_credentials("nobody", "x"),
            CredentialLookup::NotFound
        );
        assert_eq!(
            local.find_user_by_credentials("5351234567", "wrong"),
            CredentialLookup::WrongPassword
        );
        for contact in ["5351234567", "ANA@example.com", "ana"] {
            match local.find_user_by_credentials(contact, "secret1") {
                CredentialLookup::Found(u) => assert_eq!(u.id, "1"),
                other => panic!("{contact}: {other:?}"),
            }
        }
        // Name is not a contact for registration purposes.
        assert!(local.find_user_by_contact("ana").is_none());
        assert!(local.find_user_by_contact("ana@example.com").is_some());
    }

    #[test]
    fn session_round_trips_and_clears() {
        let mut local = LocalPersistence::in_memory();
        assert!(local.load_session().is_none());
        let user = User::new_session("Ana", "5351234567", UserRole::Client);
        local.save_session(&user).unwrap();
        assert_eq!(local.load_session(), Some(user));
        local.clear_session().unwrap();
        assert!(local.load_session().is_none());
    }

    #[test]
    fn remote_tokens_are_kept_apart_from_the_session() {
        let mut local = LocalPersistence::in_memory();
        let tokens = AuthSession {
            user_id: "u1".into(),
            email: "ana@example.com".into(),
            access_token: "jwt".into(),
            refresh_token: "r1".into(),
        };
        local.save_remote_session(&tokens).unwrap();
        assert!(local.load_session().is_none());
        assert_eq!(local.load_remote_session(), Some(tokens));
        local.clear_remote_session().unwrap();
        assert!(local.load_remote_session().is_none());
    }

    #[test]
    fn corrupt_documents_read_as_empty() {
        let mut kv = MemoryKv::new();
        kv.set(USERS_KEY, "{not json").unwrap();
        kv.set(SESSION_KEY, "[]").unwrap();
        let local = LocalPersistence::new(kv);
        assert!(local.get_all_users().is_empty());
        assert!(local.load_session().is_none());
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut local = LocalPersistence::new(FileKv::open(dir.path()).unwrap());
            local.store_user(stored("1", "Ana", "5351234567", "", "secret1")).unwrap();
            local
                .save_session(&User::new_session("Ana", "5351234567", UserRole::Client))
                .unwrap();
        }
        let mut local = LocalPersistence::new(FileKv::open(dir.path()).unwrap());
        assert_eq!(local.get_all_users().len(), 1);
        assert_eq!(local.load_session().map(|u| u.name), Some("Ana".to_string()));
        local.clear_session().unwrap();
        local.clear_session().unwrap();
        assert!(local.load_session().is_none());
    }
}
