//! The remote backend seam.
//!
//! Every call either succeeds with typed rows or fails with a [`RemoteError`];
//! nothing here touches application state. Callers decide what a failure
//! means (log and carry on, as a rule).

pub mod memory;
pub mod realtime;
pub mod rest;
pub mod rows;

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use mercado_common::order::OrderStatus;

use crate::error::RemoteError;
use rows::{NewOrderRow, OrderItemRow, OrderRow, ProductRow, ProductRowPatch, ProfilePatch, ProfileRow, ZoneRow};

pub use memory::MemoryBackend;
pub use rest::RestBackend;

/// Outcome of the connectivity probe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub success: bool,
    pub message: String,
}

impl ConnectionStatus {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: "connected".into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// An authenticated remote identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub user_id: String,
    pub email: String,
    pub access_token: String,
    /// Empty when the backend issues no refresh tokens.
    #[serde(default)]
    pub refresh_token: String,
}

impl AuthSession {
    /// Whether the session carries credentials worth keeping.
    pub fn is_live(&self) -> bool {
        !self.access_token.is_empty()
    }
}

/// Remote tables that can be watched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Table {
    Products,
    Orders,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Table::Products => "products",
            Table::Orders => "orders",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "INSERT" => Some(ChangeKind::Insert),
            "UPDATE" => Some(ChangeKind::Update),
            "DELETE" => Some(ChangeKind::Delete),
            _ => None,
        }
    }
}

/// A change notification. Only its arrival matters to the sync controller,
/// which re-pulls the whole table.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    pub record: serde_json::Value,
}

/// Stream of change notifications for one table. Dropping it unsubscribes.
pub type ChangeFeed = BoxStream<'static, ChangeEvent>;

/// Typed operations against the hosted backend.
#[allow(async_fn_in_trait)]
pub trait RemoteBackend {
    /// Cheap reachability probe: a one-row select on products.
    async fn test_connection(&self) -> ConnectionStatus;

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession, RemoteError>;
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, RemoteError>;
    async fn sign_out(&self) -> Result<(), RemoteError>;
    /// The live session, if any.
    async fn get_session(&self) -> Result<Option<AuthSession>, RemoteError>;
    /// Hand back a session persisted by an earlier run. It is checked on the
    /// next [`get_session`](Self::get_session).
    fn resume_session(&self, session: AuthSession);

    async fn get_profile(&self, user_id: &str) -> Result<Option<ProfileRow>, RemoteError>;
    async fn create_profile(&self, profile: &ProfileRow) -> Result<ProfileRow, RemoteError>;
    async fn update_profile(&self, user_id: &str, patch: &ProfilePatch) -> Result<(), RemoteError>;

    /// All products, newest first.
    async fn get_products(&self) -> Result<Vec<ProductRow>, RemoteError>;
    /// Insert and return the stored row with its remote id.
    async fn create_product(&self, row: &ProductRow) -> Result<ProductRow, RemoteError>;
    async fn update_product(&self, id: &str, patch: &ProductRowPatch) -> Result<(), RemoteError>;
    async fn delete_product(&self, id: &str) -> Result<(), RemoteError>;

    /// Orders with their items, newest first, optionally for one customer.
    async fn get_orders(&self, customer_id: Option<&str>) -> Result<Vec<OrderRow>, RemoteError>;
    async fn create_order(&self, order: &NewOrderRow) -> Result<OrderRow, RemoteError>;
    async fn create_order_items(&self, items: &[OrderItemRow]) -> Result<(), RemoteError>;
    async fn update_order_status(&self, id: &str, status: OrderStatus) -> Result<(), RemoteError>;
    async fn verify_payment(&self, id: &str) -> Result<(), RemoteError>;

    /// Active delivery zones.
    async fn get_delivery_zones(&self) -> Result<Vec<ZoneRow>, RemoteError>;

    /// Value of an `app_settings` entry, e.g. the staff registration keys.
    async fn get_setting(&self, key: &str) -> Result<Option<String>, RemoteError>;

    async fn subscribe_to_products(&self) -> Result<ChangeFeed, RemoteError>;
    async fn subscribe_to_orders(&self) -> Result<ChangeFeed, RemoteError>;

    /// Human-readable backend name for logs.
    fn backend_name(&self) -> &str;
}

/// Bound a remote call. Expiry is reported as [`RemoteError::Timeout`].
pub async fn bounded<T, F>(limit: std::time::Duration, call: F) -> Result<T, RemoteError>
where
    F: std::future::Future<Output = Result<T, RemoteError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or(Err(RemoteError::Timeout))
}
