//! Startup synchronization and change-feed following.
//!
//! The controller never touches the store directly. It reports what it
//! learns as [`StoreEvent`]s, so the store can render local data at once and
//! pick up remote state as it arrives. Every remote call is bounded by the
//! configured timeout and every failure degrades to "offline".

use std::rc::Rc;
use std::time::Duration;

use futures::channel::mpsc::UnboundedSender;
use futures::{FutureExt, StreamExt};

use mercado_common::delivery::DeliveryZone;
use mercado_common::order::Order;
use mercado_common::product::Product;
use mercado_common::user::User;

use crate::error::RemoteError;
use crate::remote::{bounded, ChangeFeed, ConnectionStatus, RemoteBackend, Table};
use crate::store::{PullOrigin, StoreEvent};

/// How the startup sequence ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No backend configured.
    Offline,
    /// Backend configured but the probe failed.
    Unreachable(String),
    Connected,
}

pub struct SyncController<B> {
    backend: Option<Rc<B>>,
    events: UnboundedSender<StoreEvent>,
    timeout: Duration,
}

impl<B: RemoteBackend> SyncController<B> {
    /// `backend` is `None` when no remote is configured.
    pub fn new(
        backend: Option<Rc<B>>,
        events: UnboundedSender<StoreEvent>,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            events,
            timeout,
        }
    }

    fn emit(&self, event: StoreEvent) {
        if self.events.unbounded_send(event).is_err() {
            tracing::debug!("store gone, dropping sync event");
        }
    }

    /// Probe, pull and adopt a remote session. Session restore from local
    /// storage happens before this, on the store itself.
    pub async fn startup(&self) -> SyncOutcome {
        self.emit(StoreEvent::Loading(true));
        let outcome = self.connect_and_pull().await;
        self.emit(StoreEvent::Loading(false));
        outcome
    }

    async fn connect_and_pull(&self) -> SyncOutcome {
        let Some(backend) = &self.backend else {
            tracing::info!("no remote backend configured, running offline");
            self.emit(StoreEvent::RemoteStatus(false));
            return SyncOutcome::Offline;
        };

        let probe = tokio::time::timeout(self.timeout, backend.test_connection())
            .await
            .unwrap_or_else(|_| ConnectionStatus::failed("connectivity probe timed out"));
        if !probe.success {
            tracing::warn!(
                "{} backend unreachable, using local data: {}",
                backend.backend_name(),
                probe.message
            );
            self.emit(StoreEvent::RemoteStatus(false));
            return SyncOutcome::Unreachable(probe.message);
        }
        tracing::info!("connected to {} backend", backend.backend_name());
        self.emit(StoreEvent::RemoteStatus(true));

        self.pull_products(PullOrigin::Startup).await;
        self.pull_orders(PullOrigin::Startup).await;
        self.pull_zones().await;
        self.adopt_remote_session().await;
        SyncOutcome::Connected
    }

    async fn call<T, F>(&self, what: &str, call: F) -> Option<T>
    where
        F: std::future::Future<Output = Result<T, RemoteError>>,
    {
        match bounded(self.timeout, call).await {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!("could not {what}: {e}");
                None
            }
        }
    }

    /// Pull the catalog. Returns whether the pull succeeded.
    pub async fn pull_products(&self, origin: PullOrigin) -> bool {
        let Some(backend) = &self.backend else {
            return false;
        };
        let Some(rows) = self.call("pull products", backend.get_products()).await else {
            return false;
        };
        let products: Vec<Product> = rows.into_iter().map(Product::from).collect();
        tracing::debug!("pulled {} products", products.len());
        self.emit(StoreEvent::ProductsPulled { products, origin });
        true
    }

    /// Pull all orders with their items.
    pub async fn pull_orders(&self, origin: PullOrigin) -> bool {
        let Some(backend) = &self.backend else {
            return false;
        };
        let Some(rows) = self.call("pull orders", backend.get_orders(None)).await else {
            return false;
        };
        let orders: Vec<Order> = rows.into_iter().map(Order::from).collect();
        tracing::debug!("pulled {} orders", orders.len());
        self.emit(StoreEvent::OrdersPulled { orders, origin });
        true
    }

    async fn pull_zones(&self) {
        let Some(backend) = &self.backend else {
            return;
        };
        if let Some(rows) = self.call("pull delivery zones", backend.get_delivery_zones()).await {
            let zones: Vec<DeliveryZone> = rows.into_iter().map(DeliveryZone::from).collect();
            self.emit(StoreEvent::ZonesPulled(zones));
        }
    }

    /// A live remote session replaces whatever was restored locally.
    async fn adopt_remote_session(&self) {
        let Some(backend) = &self.backend else {
            return;
        };
        let Some(Some(session)) = self.call("read remote session", backend.get_session()).await
        else {
            return;
        };
        match self
            .call("fetch profile", backend.get_profile(&session.user_id))
            .await
        {
            Some(Some(profile)) => {
                tracing::info!("adopting remote session for {}", session.email);
                let user = User::from(profile);
                self.emit(StoreEvent::RemoteSession { user, session });
            }
            Some(None) => tracing::warn!("remote session {} has no profile", session.user_id),
            None => {}
        }
    }

    async fn subscribe(&self, table: Table) -> Option<ChangeFeed> {
        let backend = self.backend.as_ref()?;
        let feed = match table {
            Table::Products => backend.subscribe_to_products().left_future(),
            Table::Orders => backend.subscribe_to_orders().right_future(),
        };
        self.call(&format!("subscribe to {}", table.name()), feed)
            .await
    }

    async fn follow(&self, table: Table, mut feed: ChangeFeed) {
        while let Some(change) = feed.next().await {
            // Collapse a burst of notifications into one pull.
            let mut burst = 1;
            while let Some(Some(_)) = feed.next().now_or_never() {
                burst += 1;
            }
            tracing::debug!(
                "{burst} change(s) on {}, last {:?}; re-pulling",
                table.name(),
                change.kind
            );
            match table {
                Table::Products => self.pull_products(PullOrigin::ChangeFeed).await,
                Table::Orders => self.pull_orders(PullOrigin::ChangeFeed).await,
            };
        }
        tracing::info!("{} change feed closed", table.name());
    }

    /// Subscribe to both tables and re-pull on every change until the feeds end.
    pub async fn follow_changes(&self) {
        let products = self.subscribe(Table::Products).await;
        let orders = self.subscribe(Table::Orders).await;
        let products = async {
            if let Some(feed) = products {
                self.follow(Table::Products, feed).await;
            }
        };
        let orders = async {
            if let Some(feed) = orders {
                self.follow(Table::Orders, feed).await;
            }
        };
        futures::join!(products, orders);
    }

    /// Full lifecycle: startup, then follow changes while connected.
    pub async fn run(self) -> SyncOutcome {
        let outcome = self.startup().await;
        if outcome == SyncOutcome::Connected {
            self.follow_changes().await;
        }
        outcome
    }
}
