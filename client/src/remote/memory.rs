//! In-process backend with the same contract as the hosted one.
//!
//! Used by the test suites and by the CLI's `--demo-remote` mode. Any
//! operation can be made to fail, and every call is recorded by name.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use futures::channel::mpsc::{self, UnboundedSender};
use futures::StreamExt;

use mercado_common::catalog::{default_products, default_zones};
use mercado_common::order::OrderStatus;

use super::rows::{
    NewOrderRow, OrderItemRow, OrderRow, ProductRow, ProductRowPatch, ProfilePatch, ProfileRow,
    ZoneRow,
};
use super::{AuthSession, ChangeEvent, ChangeFeed, ChangeKind, ConnectionStatus, RemoteBackend, Table};
use crate::error::RemoteError;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
struct Account {
    email: String,
    password: String,
    user_id: String,
}

#[derive(Default)]
struct Tables {
    products: Vec<ProductRow>,
    orders: Vec<OrderRow>,
    items: Vec<OrderItemRow>,
    zones: Vec<ZoneRow>,
    profiles: Vec<ProfileRow>,
    accounts: Vec<Account>,
    settings: HashMap<String, String>,
    session: Option<AuthSession>,
}

#[derive(Default)]
pub struct MemoryBackend {
    tables: Mutex<Tables>,
    unreachable: AtomicBool,
    failing: Mutex<HashSet<String>>,
    stalled: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
    feeds: Mutex<Vec<(Table, UnboundedSender<ChangeEvent>)>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bundled catalog and zones, as the hosted backend is first set up.
    pub fn seeded() -> Self {
        let products = default_products()
            .iter()
            .map(|p| ProductRow {
                id: Some(new_id()),
                ..ProductRow::from(p)
            })
            .collect();
        let zones = default_zones().iter().map(ZoneRow::from).collect();
        Self::new().with_products(products).with_zones(zones)
    }

    pub fn with_products(self, products: Vec<ProductRow>) -> Self {
        lock(&self.tables).products = products;
        self
    }

    pub fn with_zones(self, zones: Vec<ZoneRow>) -> Self {
        lock(&self.tables).zones = zones;
        self
    }

    pub fn with_setting(self, key: &str, value: &str) -> Self {
        lock(&self.tables).settings.insert(key.into(), value.into());
        self
    }

    pub fn with_orders(self, orders: Vec<OrderRow>) -> Self {
        lock(&self.tables).orders = orders;
        self
    }

    /// Register an account and its profile.
    pub fn with_account(self, email: &str, password: &str, profile: ProfileRow) -> Self {
        {
            let mut t = lock(&self.tables);
            t.accounts.push(Account {
                email: email.to_string(),
                password: password.to_string(),
                user_id: profile.id.clone(),
            });
            t.profiles.push(profile);
        }
        self
    }

    /// Start out signed in as the account with `email`.
    pub fn signed_in_as(self, email: &str) -> Self {
        {
            let mut t = lock(&self.tables);
            let session = t
                .accounts
                .iter()
                .find(|a| a.email == email)
                .map(session_for);
            t.session = session;
        }
        self
    }

    /// Make every call fail as if the network were down.
    /// Drop the held session, as a fresh process would start without one.
    pub fn forget_session(&self) {
        lock(&self.tables).session = None;
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.unreachable.store(!reachable, Ordering::SeqCst);
    }

    /// Make the named operation fail until [`heal`](Self::heal)ed.
    pub fn fail(&self, operation: &str) {
        lock(&self.failing).insert(operation.to_string());
    }

    pub fn heal(&self, operation: &str) {
        lock(&self.failing).remove(operation);
        lock(&self.stalled).remove(operation);
    }

    /// Make the named operation hang forever.
    pub fn stall(&self, operation: &str) {
        lock(&self.stalled).insert(operation.to_string());
    }

    /// Names of all operations called so far, in order.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        lock(&self.calls).iter().filter(|c| *c == operation).count()
    }

    pub fn products(&self) -> Vec<ProductRow> {
        lock(&self.tables).products.clone()
    }

    pub fn orders(&self) -> Vec<OrderRow> {
        lock(&self.tables).orders.clone()
    }

    pub fn order_items(&self) -> Vec<OrderItemRow> {
        lock(&self.tables).items.clone()
    }

    /// Insert a product as another client would, notifying subscribers.
    pub fn insert_product_externally(&self, mut row: ProductRow) {
        row.id.get_or_insert_with(new_id);
        let record = serde_json::to_value(&row).unwrap_or_default();
        lock(&self.tables).products.insert(0, row);
        self.notify(Table::Products, ChangeKind::Insert, record);
    }

    /// Change an order's status as another client would, notifying subscribers.
    pub fn set_order_status_externally(&self, id: &str, status: OrderStatus) {
        let found = lock(&self.tables)
            .orders
            .iter_mut()
            .find(|o| o.id == id)
            .map(|o| o.status = Some(status.as_str().to_string()))
            .is_some();
        if found {
            self.notify(
                Table::Orders,
                ChangeKind::Update,
                serde_json::json!({ "id": id, "status": status.as_str() }),
            );
        }
    }

    /// Number of live change-feed subscribers.
    pub fn subscriber_count(&self) -> usize {
        let mut feeds = lock(&self.feeds);
        feeds.retain(|(_, tx)| !tx.is_closed());
        feeds.len()
    }

    fn enter(&self, operation: &str) -> Result<(), RemoteError> {
        lock(&self.calls).push(operation.to_string());
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(RemoteError::Transport("network unreachable".into()));
        }
        if lock(&self.failing).contains(operation) {
            return Err(RemoteError::Status {
                status: 500,
                message: format!("{operation} failed"),
            });
        }
        Ok(())
    }

    async fn gate(&self, operation: &str) -> Result<(), RemoteError> {
        self.enter(operation)?;
        let stalled = lock(&self.stalled).contains(operation);
        if stalled {
            futures::future::pending::<()>().await;
        }
        Ok(())
    }

    fn notify(&self, table: Table, kind: ChangeKind, record: serde_json::Value) {
        let mut feeds = lock(&self.feeds);
        feeds.retain(|(t, tx)| {
            *t != table
                || tx
                    .unbounded_send(ChangeEvent {
                        table,
                        kind,
                        record: record.clone(),
                    })
                    .is_ok()
        });
    }

    fn subscribe(&self, table: Table) -> ChangeFeed {
        let (tx, rx) = mpsc::unbounded();
        lock(&self.feeds).push((table, tx));
        rx.boxed()
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn session_for(account: &Account) -> AuthSession {
    AuthSession {
        user_id: account.user_id.clone(),
        email: account.email.clone(),
        access_token: format!("token-{}", account.user_id),
        refresh_token: format!("refresh-{}", account.user_id),
    }
}

impl RemoteBackend for MemoryBackend {
    async fn test_connection(&self) -> ConnectionStatus {
        match self.gate("test_connection").await {
            Ok(()) => ConnectionStatus::ok(),
            Err(e) => ConnectionStatus::failed(e.to_string()),
        }
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession, RemoteError> {
        self.gate("sign_up").await?;
        let mut t = lock(&self.tables);
        if t.accounts.iter().any(|a| a.email.eq_ignore_ascii_case(email)) {
            return Err(RemoteError::Rejected("User already registered".into()));
        }
        let account = Account {
            email: email.to_string(),
            password: password.to_string(),
            user_id: new_id(),
        };
        let session = session_for(&account);
        t.accounts.push(account);
        t.session = Some(session.clone());
        Ok(session)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, RemoteError> {
        self.gate("sign_in").await?;
        let mut t = lock(&self.tables);
        let session = t
            .accounts
            .iter()
            .find(|a| a.email.eq_ignore_ascii_case(email) && a.password == password)
            .map(session_for)
            .ok_or_else(|| RemoteError::Rejected("Invalid login credentials".into()))?;
        t.session = Some(session.clone());
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), RemoteError> {
        self.gate("sign_out").await?;
        lock(&self.tables).session = None;
        Ok(())
    }

    async fn get_session(&self) -> Result<Option<AuthSession>, RemoteError> {
        self.gate("get_session").await?;
        Ok(lock(&self.tables).session.clone())
    }

    fn resume_session(&self, session: AuthSession) {
        lock(&self.calls).push("resume_session".to_string());
        let mut t = lock(&self.tables);
        // Only tokens this backend issued are honoured.
        let issued = t
            .accounts
            .iter()
            .find(|a| a.user_id == session.user_id)
            .map(session_for);
        if issued.as_ref() == Some(&session) {
            t.session = issued;
        }
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<ProfileRow>, RemoteError> {
        self.gate("get_profile").await?;
        Ok(lock(&self.tables)
            .profiles
            .iter()
            .find(|p| p.id == user_id)
            .cloned())
    }

    async fn create_profile(&self, profile: &ProfileRow) -> Result<ProfileRow, RemoteError> {
        self.gate("create_profile").await?;
        let mut t = lock(&self.tables);
        if t.profiles.iter().any(|p| p.id == profile.id) {
            return Err(RemoteError::Status {
                status: 409,
                message: "duplicate profile".into(),
            });
        }
        t.profiles.push(profile.clone());
        Ok(profile.clone())
    }

    async fn update_profile(&self, user_id: &str, patch: &ProfilePatch) -> Result<(), RemoteError> {
        self.gate("update_profile").await?;
        let mut t = lock(&self.tables);
        if let Some(p) = t.profiles.iter_mut().find(|p| p.id == user_id) {
            if let Some(name) = &patch.name {
                p.name = name.clone();
            }
            if patch.phone.is_some() {
                p.phone = patch.phone.clone();
            }
            if patch.email.is_some() {
                p.email = patch.email.clone();
            }
        }
        Ok(())
    }

    async fn get_products(&self) -> Result<Vec<ProductRow>, RemoteError> {
        self.gate("get_products").await?;
        Ok(self.products())
    }

    async fn create_product(&self, row: &ProductRow) -> Result<ProductRow, RemoteError> {
        self.gate("create_product").await?;
        let mut stored = row.clone();
        stored.id = Some(new_id());
        lock(&self.tables).products.insert(0, stored.clone());
        self.notify(
            Table::Products,
            ChangeKind::Insert,
            serde_json::to_value(&stored).unwrap_or_default(),
        );
        Ok(stored)
    }

    async fn update_product(&self, id: &str, patch: &ProductRowPatch) -> Result<(), RemoteError> {
        self.gate("update_product").await?;
        let updated = lock(&self.tables)
            .products
            .iter_mut()
            .find(|p| p.id.as_deref() == Some(id))
            .map(|p| patch.apply_to(p))
            .is_some();
        if updated {
            self.notify(Table::Products, ChangeKind::Update, serde_json::json!({ "id": id }));
        }
        Ok(())
    }

    async fn delete_product(&self, id: &str) -> Result<(), RemoteError> {
        self.gate("delete_product").await?;
        lock(&self.tables)
            .products
            .retain(|p| p.id.as_deref() != Some(id));
        self.notify(Table::Products, ChangeKind::Delete, serde_json::json!({ "id": id }));
        Ok(())
    }

    async fn get_orders(&self, customer_id: Option<&str>) -> Result<Vec<OrderRow>, RemoteError> {
        self.gate("get_orders").await?;
        let t = lock(&self.tables);
        Ok(t.orders
            .iter()
            .filter(|o| customer_id.is_none() || o.customer_id.as_deref() == customer_id)
            .map(|o| {
                let mut row = o.clone();
                row.order_items = t
                    .items
                    .iter()
                    .filter(|i| i.order_id.as_deref() == Some(o.id.as_str()))
                    .cloned()
                    .collect();
                row
            })
            .collect())
    }

    async fn create_order(&self, order: &NewOrderRow) -> Result<OrderRow, RemoteError> {
        self.gate("create_order").await?;
        let mut t = lock(&self.tables);
        if t.orders.iter().any(|o| o.order_number == order.order_number) {
            return Err(RemoteError::Status {
                status: 409,
                message: format!("duplicate order number {}", order.order_number),
            });
        }
        let row = order.clone().into_row(new_id(), Utc::now());
        t.orders.insert(0, row.clone());
        drop(t);
        self.notify(
            Table::Orders,
            ChangeKind::Insert,
            serde_json::json!({ "id": row.id }),
        );
        Ok(row)
    }

    async fn create_order_items(&self, items: &[OrderItemRow]) -> Result<(), RemoteError> {
        self.gate("create_order_items").await?;
        lock(&self.tables).items.extend_from_slice(items);
        Ok(())
    }

    async fn update_order_status(&self, id: &str, status: OrderStatus) -> Result<(), RemoteError> {
        self.gate("update_order_status").await?;
        self.set_order_status_externally(id, status);
        Ok(())
    }

    async fn verify_payment(&self, id: &str) -> Result<(), RemoteError> {
        self.gate("verify_payment").await?;
        if let Some(o) = lock(&self.tables).orders.iter_mut().find(|o| o.id == id) {
            o.payment_verified = Some(true);
        }
        Ok(())
    }

    async fn get_delivery_zones(&self) -> Result<Vec<ZoneRow>, RemoteError> {
        self.gate("get_delivery_zones").await?;
        Ok(lock(&self.tables)
            .zones
            .iter()
            .filter(|z| z.is_active != Some(false))
            .cloned()
            .collect())
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>, RemoteError> {
        self.gate("get_setting").await?;
        Ok(lock(&self.tables).settings.get(key).cloned())
    }

    async fn subscribe_to_products(&self) -> Result<ChangeFeed, RemoteError> {
        self.gate("subscribe_to_products").await?;
        Ok(self.subscribe(Table::Products))
    }

    async fn subscribe_to_orders(&self) -> Result<ChangeFeed, RemoteError> {
        self.gate("subscribe_to_orders").await?;
        Ok(self.subscribe(Table::Orders))
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}
