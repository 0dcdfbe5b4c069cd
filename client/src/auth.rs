//! Account registration and sign-in.
//!
//! Local accounts live in [`LocalPersistence`] and always work; the remote
//! backend is tried first when one is configured and its failures fall back
//! to the local table. Staff accounts additionally need the owner's secret
//! key, with a lockout after repeated wrong guesses.

use std::time::{Duration, Instant};

use mercado_common::ids::time_token;
use mercado_common::user::{secrets_match, PasswordHash, StoredUser, User, UserRole};

use crate::error::AuthError;
use crate::local::CredentialLookup;
use crate::remote::rows::ProfileRow;
use crate::remote::{bounded, AuthSession, RemoteBackend};
use crate::store::Store;

pub const MIN_CLIENT_PASSWORD: usize = 4;
pub const MIN_STAFF_PASSWORD: usize = 6;

pub const MAX_KEY_ATTEMPTS: u32 = 5;
pub const KEY_LOCKOUT: Duration = Duration::from_secs(15 * 60);

pub const ADMIN_KEY_SETTING: &str = "admin_secret_key";
pub const VENDOR_KEY_SETTING: &str = "vendor_secret_key";

const FALLBACK_ADMIN_KEY: &str = "MERCADOCUBA_ADMIN_2025";
const FALLBACK_VENDOR_KEY: &str = "MERCADOCUBA_VENDOR_2025";

/// Domain used to turn a phone number into a sign-in email.
const PHONE_EMAIL_DOMAIN: &str = "mercadocuba.local";

/// The email the remote auth service knows a contact by: the contact itself
/// when it is an email, otherwise the digits of the phone number.
pub fn auth_email(contact: &str) -> String {
    let contact = contact.trim();
    if contact.contains('@') {
        return contact.to_string();
    }
    let digits: String = contact.chars().filter(char::is_ascii_digit).collect();
    format!("{digits}@{PHONE_EMAIL_DOMAIN}")
}

/// Sign-up form.
#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub password: String,
    /// Repeated password. Required for staff accounts.
    pub confirm: Option<String>,
    pub role: UserRole,
}

impl Registration {
    pub fn client(
        name: impl Into<String>,
        phone: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
            email: email.into(),
            password: password.into(),
            confirm: None,
            role: UserRole::Client,
        }
    }

    fn min_password(&self) -> usize {
        if self.role.is_staff() {
            MIN_STAFF_PASSWORD
        } else {
            MIN_CLIENT_PASSWORD
        }
    }

    pub fn validate(&self) -> Result<(), AuthError> {
        if self.name.trim().is_empty() {
            return Err(AuthError::Missing("name"));
        }
        if self.phone.trim().is_empty() && self.email.trim().is_empty() {
            return Err(AuthError::Missing("phone or email"));
        }
        let min = self.min_password();
        if self.password.chars().count() < min {
            return Err(AuthError::PasswordTooShort(min));
        }
        match &self.confirm {
            Some(confirm) if *confirm != self.password => Err(AuthError::PasswordMismatch),
            None if self.role.is_staff() => Err(AuthError::Missing("password confirmation")),
            _ => Ok(()),
        }
    }

    /// Phone if given, else email.
    pub fn contact(&self) -> &str {
        if self.phone.trim().is_empty() {
            self.email.trim()
        } else {
            self.phone.trim()
        }
    }

    fn profile(&self, user_id: String) -> ProfileRow {
        let optional = |s: &str| Some(s.trim().to_string()).filter(|s| !s.is_empty());
        ProfileRow {
            id: user_id,
            name: self.name.trim().to_string(),
            phone: optional(&self.phone),
            email: optional(&self.email),
            role: Some(self.role.as_str().to_string()),
            is_frequent_customer: None,
            total_orders: None,
            total_spent: None,
        }
    }
}

/// Counts wrong staff keys and locks registration after too many.
#[derive(Debug, Default)]
pub struct StaffKeyGate {
    failures: u32,
    locked_until: Option<Instant>,
}

impl StaffKeyGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remaining_lockout(&self) -> Option<Duration> {
        self.locked_until
            .and_then(|until| until.checked_duration_since(Instant::now()))
            .filter(|left| !left.is_zero())
    }

    pub fn is_locked(&self) -> bool {
        self.remaining_lockout().is_some()
    }

    /// Accept `supplied` if it equals one of `accepted`.
    pub fn check(&mut self, supplied: &str, accepted: &[String]) -> Result<(), AuthError> {
        if let Some(left) = self.remaining_lockout() {
            return Err(AuthError::Locked(left.as_secs()));
        }
        if self.locked_until.take().is_some() {
            self.failures = 0;
        }
        if supplied.is_empty() {
            return Err(AuthError::Missing("secret key"));
        }
        if accepted.iter().any(|k| secrets_match(supplied, k)) {
            self.failures = 0;
            return Ok(());
        }
        self.failures += 1;
        tracing::warn!("wrong staff key, attempt {}/{MAX_KEY_ATTEMPTS}", self.failures);
        if self.failures >= MAX_KEY_ATTEMPTS {
            self.locked_until = Some(Instant::now() + KEY_LOCKOUT);
        }
        Err(AuthError::InvalidSecretKey {
            attempt: self.failures,
            max: MAX_KEY_ATTEMPTS,
        })
    }
}

/// Keys that unlock registration for `role`: the one stored remotely, if it
/// can be read, and the built-in fallback.
pub async fn staff_keys<B: RemoteBackend>(
    backend: Option<&B>,
    role: UserRole,
    timeout: Duration,
) -> Vec<String> {
    let (setting, fallback) = match role {
        UserRole::Admin => (ADMIN_KEY_SETTING, FALLBACK_ADMIN_KEY),
        UserRole::Vendor => (VENDOR_KEY_SETTING, FALLBACK_VENDOR_KEY),
        UserRole::Client | UserRole::Delivery => return Vec::new(),
    };
    let mut keys = Vec::with_capacity(2);
    if let Some(backend) = backend {
        match bounded(timeout, backend.get_setting(setting)).await {
            Ok(Some(key)) if !key.is_empty() => keys.push(key),
            Ok(_) => {}
            Err(e) => tracing::warn!("could not read {setting}: {e}"),
        }
    }
    keys.push(fallback.to_string());
    keys
}

async fn fetch_remote_user<B: RemoteBackend>(
    backend: &B,
    contact: &str,
    password: &str,
    timeout: Duration,
) -> Result<(User, AuthSession), AuthError> {
    let session = bounded(timeout, backend.sign_in(&auth_email(contact), password)).await?;
    let profile = bounded(timeout, backend.get_profile(&session.user_id))
        .await?
        .ok_or_else(|| AuthError::UnknownUser(contact.trim().to_string()))?;
    let mut user = User::from(profile);
    if user.phone.is_empty() && !contact.contains('@') {
        user.phone = contact.trim().to_string();
    }
    Ok((user, session))
}

/// Create the remote account and its profile.
pub async fn register_remote<B: RemoteBackend>(
    backend: &B,
    registration: &Registration,
    timeout: Duration,
) -> Result<(ProfileRow, AuthSession), AuthError> {
    let email = auth_email(if registration.email.trim().is_empty() {
        &registration.phone
    } else {
        &registration.email
    });
    let session = bounded(timeout, backend.sign_up(&email, &registration.password)).await?;
    let profile = registration.profile(session.user_id.clone());
    let profile = bounded(timeout, backend.create_profile(&profile)).await?;
    Ok((profile, session))
}

impl Store {
    /// Store a local account, replacing any with the same phone or email but
    /// keeping its id, and start a session for it.
    pub fn register_local_user(&mut self, registration: &Registration) -> Result<&User, AuthError> {
        registration.validate()?;
        let stored = self.local_account(registration, None)?;
        Ok(self.start_session(stored.to_user()))
    }

    /// Write the local copy of an account. A remote id, when known, replaces
    /// whatever id the contact had locally.
    fn local_account(
        &mut self,
        registration: &Registration,
        remote_id: Option<String>,
    ) -> Result<StoredUser, AuthError> {
        let existing = [&registration.phone, &registration.email]
            .into_iter()
            .filter(|c| !c.trim().is_empty())
            .find_map(|c| self.local.find_user_by_contact(c));
        if let (Some(old), Some(_)) = (&existing, &remote_id) {
            self.local.remove_user(&old.id)?;
        }
        let stored = StoredUser {
            id: remote_id
                .or_else(|| existing.map(|u| u.id))
                .unwrap_or_else(time_token),
            name: registration.name.trim().to_string(),
            phone: registration.phone.trim().to_string(),
            email: registration.email.trim().to_string(),
            role: registration.role,
            password: PasswordHash::new(&registration.password),
        };
        self.local.store_user(stored.clone())?;
        Ok(stored)
    }

    fn local_credentials(&self, contact: &str, password: &str) -> Result<StoredUser, AuthError> {
        if contact.trim().is_empty() {
            return Err(AuthError::Missing("phone or email"));
        }
        if password.is_empty() {
            return Err(AuthError::Missing("password"));
        }
        match self.local.find_user_by_credentials(contact, password) {
            CredentialLookup::Found(user) => Ok(user),
            CredentialLookup::WrongPassword => Err(AuthError::WrongPassword),
            CredentialLookup::NotFound => Err(AuthError::UnknownUser(contact.trim().to_string())),
        }
    }

    /// Sign in against the local account table.
    pub fn login_local_user(&mut self, contact: &str, password: &str) -> Result<&User, AuthError> {
        let user = self.local_credentials(contact, password)?;
        Ok(self.start_session(user.to_user()))
    }

    /// Remote sign-in: authenticate, fetch the profile, start a session.
    pub async fn sign_in_remote<B: RemoteBackend>(
        &mut self,
        backend: &B,
        contact: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<&User, AuthError> {
        let (user, session) = fetch_remote_user(backend, contact, password, timeout).await?;
        Ok(self.start_remote_session(user, &session))
    }

    /// Remote sign-in when a backend is available, local otherwise or when the
    /// remote attempt fails. With `staff_only`, client accounts are refused.
    pub async fn sign_in<B: RemoteBackend>(
        &mut self,
        backend: Option<&B>,
        contact: &str,
        password: &str,
        staff_only: bool,
        timeout: Duration,
    ) -> Result<&User, AuthError> {
        if let Some(backend) = backend {
            match fetch_remote_user(backend, contact, password, timeout).await {
                Ok((user, _)) if staff_only && !user.is_staff() => {
                    if let Err(e) = bounded(timeout, backend.sign_out()).await {
                        tracing::debug!("remote sign-out failed: {e}");
                    }
                    return Err(AuthError::NotStaff);
                }
                Ok((user, session)) => return Ok(self.start_remote_session(user, &session)),
                Err(e) => tracing::info!("remote sign-in failed, trying local accounts: {e}"),
            }
        }
        let user = self.local_credentials(contact, password)?;
        if staff_only && !user.role.is_staff() {
            return Err(AuthError::NotStaff);
        }
        Ok(self.start_session(user.to_user()))
    }

    /// Register locally and, best effort, remotely. Staff roles must present
    /// a valid secret key first.
    pub async fn register<B: RemoteBackend>(
        &mut self,
        backend: Option<&B>,
        registration: &Registration,
        staff_key: Option<(&mut StaffKeyGate, &str)>,
        timeout: Duration,
    ) -> Result<&User, AuthError> {
        registration.validate()?;
        if registration.role.is_staff() {
            let (gate, key) = staff_key.ok_or(AuthError::Missing("secret key"))?;
            if let Some(left) = gate.remaining_lockout() {
                return Err(AuthError::Locked(left.as_secs()));
            }
            let accepted = staff_keys(backend, registration.role, timeout).await;
            gate.check(key, &accepted)?;
        }
        if let Some(backend) = backend {
            match register_remote(backend, registration, timeout).await {
                Ok((profile, session)) => {
                    self.local_account(registration, Some(profile.id.clone()))?;
                    let user = User::from(profile);
                    return Ok(self.start_remote_session(user, &session));
                }
                Err(e) => tracing::warn!("remote registration failed, account kept locally: {e}"),
            }
        }
        self.register_local_user(registration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreOptions;
    use crate::local::LocalPersistence;
    use crate::remote::MemoryBackend;

    const T: Duration = Duration::from_secs(5);

    fn store() -> Store {
        Store::offline(StoreOptions::default(), LocalPersistence::in_memory())
    }

    fn staff(role: UserRole) -> Registration {
        Registration {
            confirm: Some("secreto1".into()),
            role,
            ..Registration::client("Marta", "5350000001", "", "secreto1")
        }
    }

    #[test]
    fn auth_email_from_phone() {
        assert_eq!(auth_email("+53 5123-4567"), "5351234567@mercadocuba.local");
        assert_eq!(auth_email(" ana@example.com "), "ana@example.com");
    }

    #[test]
    fn registration_validation() {
        let ok = Registration::client("Ana", "5351234567", "", "1234");
        assert!(ok.validate().is_ok());
        let r = Registration { name: " ".into(), ..ok.clone() };
        assert!(matches!(r.validate(), Err(AuthError::Missing("name"))));
        let r = Registration { phone: "".into(), ..ok.clone() };
        assert!(matches!(r.validate(), Err(AuthError::Missing(_))));
        let r = Registration { password: "123".into(), ..ok.clone() };
        assert!(matches!(r.validate(), Err(AuthError::PasswordTooShort(4))));

        let mut s = staff(UserRole::Admin);
        assert!(s.validate().is_ok());
        s.confirm = Some("otro".into());
        assert!(matches!(s.validate(), Err(AuthError::PasswordMismatch)));
        s.confirm = None;
        assert!(matches!(s.validate(), Err(AuthError::Missing(_))));
        let s = Registration { password: "12345".into(), confirm: Some("12345".into()), ..staff(UserRole::Vendor) };
        assert!(matches!(s.validate(), Err(AuthError::PasswordTooShort(6))));
    }

    #[test]
    fn local_register_then_login() {
        let mut store = store();
        let id = store
            .register_local_user(&Registration::client("Ana", "5351234567", "ana@x.cu", "1234"))
            .unwrap()
            .id
            .clone();
        store.logout();

        assert!(matches!(
            store.login_local_user("5350000000", "1234"),
            Err(AuthError::UnknownUser(_))
        ));
        assert!(matches!(
            store.login_local_user("5351234567", "nope"),
            Err(AuthError::WrongPassword)
        ));
        assert_eq!(store.login_local_user(" ANA@X.CU ", "1234").unwrap().id, id);
        assert_eq!(store.login_local_user("ana", "1234").unwrap().id, id);
        // Session survives a restart.
        assert_eq!(store.local.load_session().unwrap().id, id);
    }

    #[test]
    fn re_registering_a_contact_keeps_the_id() {
        let mut store = store();
        let first = store
            .register_local_user(&Registration::client("Ana", "5351234567", "", "1234"))
            .unwrap()
            .id
            .clone();
        let again = store
            .register_local_user(&Registration::client("Ana María", "5351234567", "", "abcd"))
            .unwrap()
            .clone();
        assert_eq!(again.id, first);
        assert_eq!(again.name, "Ana María");
        assert_eq!(store.local.get_all_users().len(), 1);
        assert!(store.login_local_user("5351234567", "1234").is_err());
        assert!(store.login_local_user("5351234567", "abcd").is_ok());
    }

    #[test]
    fn key_gate_locks_after_max_attempts() {
        let mut gate = StaffKeyGate::new();
        let keys = vec!["right".to_string()];
        for attempt in 1..MAX_KEY_ATTEMPTS {
            assert!(matches!(
                gate.check("wrong", &keys),
                Err(AuthError::InvalidSecretKey { attempt: a, .. }) if a == attempt
            ));
        }
        assert!(gate.check("right", &keys).is_ok());
        for _ in 0..MAX_KEY_ATTEMPTS {
            let _ = gate.check("wrong", &keys);
        }
        assert!(gate.is_locked());
        assert!(matches!(gate.check("right", &keys), Err(AuthError::Locked(_))));
    }

    #[tokio::test]
    async fn staff_registration_needs_key() {
        let mut store = store();
        let mut gate = StaffKeyGate::new();
        let none: Option<&MemoryBackend> = None;
        let reg = staff(UserRole::Admin);
        let err = store.register(none, &reg, None, T).await.unwrap_err();
        assert!(matches!(err, AuthError::Missing("secret key")));
        let err = store
            .register(none, &reg, Some((&mut gate, "guess")), T)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidSecretKey { attempt: 1, .. }));
        let user = store
            .register(none, &reg, Some((&mut gate, FALLBACK_ADMIN_KEY)), T)
            .await
            .unwrap();
        assert_eq!(user.role, UserRole::Admin);
        assert!(store.is_admin());
    }

    #[tokio::test]
    async fn remote_key_setting_is_accepted() {
        let backend = MemoryBackend::new().with_setting(VENDOR_KEY_SETTING, "tienda-2026");
        let keys = staff_keys(Some(&backend), UserRole::Vendor, T).await;
        assert_eq!(keys, vec!["tienda-2026".to_string(), FALLBACK_VENDOR_KEY.to_string()]);
        let none: Option<&MemoryBackend> = None;
        assert!(staff_keys(none, UserRole::Client, T).await.is_empty());
    }

    #[tokio::test]
    async fn remote_registration_and_sign_in() {
        let backend = MemoryBackend::new();
        let mut store = store();
        let reg = Registration::client("Ana", "53 5123 4567", "", "1234");
        let id = store.register(Some(&backend), &reg, None, T).await.unwrap().id.clone();
        assert!(crate::remote::rows::is_remote_id(&id));
        // The local fallback answers with the same identity.
        assert_eq!(store.local.get_all_users()[0].id, id);
        assert_eq!(store.local.load_remote_session().map(|s| s.user_id), Some(id));
        store.logout();
        assert!(store.local.load_remote_session().is_none());
        // Local table forgotten: only the remote account can answer.
        store.local = LocalPersistence::in_memory();

        let user = store
            .sign_in(Some(&backend), "5351234567", "1234", false, T)
            .await
            .unwrap();
        assert_eq!(user.name, "Ana");
        assert!(crate::remote::rows::is_remote_id(&user.id));
        store.logout();
        assert!(matches!(
            store.sign_in(Some(&backend), "5351234567", "1234", true, T).await,
            Err(AuthError::NotStaff)
        ));
        assert!(store.user().is_none());
    }

    #[tokio::test]
    async fn unreachable_remote_falls_back_to_local() {
        let backend = MemoryBackend::new();
        backend.set_reachable(false);
        let mut store = store();
        let reg = Registration::client("Ana", "5351234567", "", "1234");
        store.register(Some(&backend), &reg, None, T).await.unwrap();
        store.logout();
        let user = store
            .sign_in(Some(&backend), "5351234567", "1234", false, T)
            .await
            .unwrap();
        assert_eq!(user.name, "Ana");
        assert!(matches!(
            store.sign_in(Some(&backend), "5351234567", "0000", false, T).await,
            Err(AuthError::WrongPassword)
        ));
    }
}
