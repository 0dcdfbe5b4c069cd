use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::currency::Money;

/// Role a user can have in the storefront.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Client,
    Vendor,
    Admin,
    Delivery,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::Client => "client",
            UserRole::Vendor => "vendor",
            UserRole::Admin => "admin",
            UserRole::Delivery => "delivery",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "client" => Some(UserRole::Client),
            "vendor" => Some(UserRole::Vendor),
            "admin" => Some(UserRole::Admin),
            "delivery" => Some(UserRole::Delivery),
            _ => None,
        }
    }

    /// Admins and vendors may edit the catalog, orders and payment channels.
    pub fn is_staff(self) -> bool {
        matches!(self, UserRole::Admin | UserRole::Vendor)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated actor of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub email: String,
    pub role: UserRole,
    #[serde(default)]
    pub is_frequent: bool,
    #[serde(default)]
    pub total_orders: u32,
    #[serde(default)]
    pub total_spent: Money,
}

impl User {
    /// Fresh session user with a time-derived id and empty aggregates.
    pub fn new_session(name: impl Into<String>, phone: impl Into<String>, role: UserRole) -> Self {
        Self {
            id: crate::ids::time_token(),
            name: name.into(),
            phone: phone.into(),
            email: String::new(),
            role,
            is_frequent: false,
            total_orders: 0,
            total_spent: Money::ZERO,
        }
    }

    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }
}

/// Salted SHA-256 of a password, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordHash {
    pub salt: String,
    pub digest: String,
}

impl PasswordHash {
    pub fn new(password: &str) -> Self {
        let mut salt = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        let salt = hex::encode(salt);
        let digest = Self::digest(&salt, password);
        Self { salt, digest }
    }

    pub fn verify(&self, password: &str) -> bool {
        secrets_match(&Self::digest(&self.salt, password), &self.digest)
    }

    fn digest(salt: &str, password: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(b":");
        hasher.update(password.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Compare two secrets in time independent of where they differ.
pub fn secrets_match(supplied: &str, expected: &str) -> bool {
    let (supplied, expected) = (supplied.as_bytes(), expected.as_bytes());
    if supplied.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    supplied.ct_eq(expected).into()
}

/// A locally registered account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredUser {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub role: UserRole,
    pub password: PasswordHash,
}

impl StoredUser {
    /// Phone or email equal to `contact`, ignoring case and whitespace.
    pub fn has_contact(&self, contact: &str) -> bool {
        let c = normalize_contact(contact);
        !c.is_empty()
            && [&self.phone, &self.email]
                .into_iter()
                .any(|field| !field.is_empty() && normalize_contact(field) == c)
    }

    /// Like [`has_contact`](Self::has_contact) but also accepts the display name.
    pub fn answers_to(&self, contact: &str) -> bool {
        let c = normalize_contact(contact);
        self.has_contact(contact)
            || (!self.name.is_empty() && !c.is_empty() && normalize_contact(&self.name) == c)
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            name: self.name.clone(),
            phone: self.phone.clone(),
            email: self.email.clone(),
            role: self.role,
            is_frequent: false,
            total_orders: 0,
            total_spent: Money::ZERO,
        }
    }
}

/// Lowercase with all whitespace removed.
pub fn normalize_contact(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}
