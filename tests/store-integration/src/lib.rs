//! Scenario harness: a store wired to an in-process backend exactly as the
//! CLI wires it to the hosted one.

use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use futures::channel::mpsc::UnboundedReceiver;
use tokio::task::{JoinHandle, LocalSet};

use mercado_client::remote::rows::{ProductRow, ProfileRow, ZoneRow};
use mercado_client::{
    Client, ClientConfig, LocalPersistence, MemoryBackend, RemoteConfig, Store, StoreEvent,
    StoreOptions, SyncController, SyncOutcome,
};
use mercado_common::user::UserRole;

pub const TIMEOUT: Duration = Duration::from_millis(300);

/// Run `scenario` on a `LocalSet` so the write-through worker can be spawned.
pub async fn local<F: Future>(scenario: F) -> F::Output {
    tracing_subscriber::fmt::try_init().ok();
    LocalSet::new().run_until(scenario).await
}

pub fn config(options: StoreOptions) -> ClientConfig {
    ClientConfig {
        remote: RemoteConfig::offline(),
        remote_timeout: TIMEOUT,
        store: options,
        data_dir: None,
    }
}

pub struct Harness {
    pub store: Store,
    pub events: UnboundedReceiver<StoreEvent>,
    pub sync: SyncController<MemoryBackend>,
    /// `None` in offline scenarios.
    pub backend: Option<Rc<MemoryBackend>>,
    worker: Option<JoinHandle<()>>,
}

impl Harness {
    pub fn online(backend: MemoryBackend) -> Self {
        Self::build(StoreOptions::default(), LocalPersistence::in_memory(), Some(backend))
    }

    pub fn offline() -> Self {
        Self::build(StoreOptions::default(), LocalPersistence::in_memory(), None)
    }

    /// Must be called inside [`local`].
    pub fn build(
        options: StoreOptions,
        local: LocalPersistence,
        backend: Option<MemoryBackend>,
    ) -> Self {
        Self::attach(options, local, backend.map(Rc::new))
    }

    /// Like [`build`](Self::build) with a backend that outlives the harness,
    /// so a second harness can play the next run of the same device.
    pub fn attach(
        options: StoreOptions,
        local: LocalPersistence,
        backend: Option<Rc<MemoryBackend>>,
    ) -> Self {
        let Client {
            store,
            events,
            sync,
            worker,
        } = Client::assemble(&config(options), local, backend.clone());
        Self {
            store,
            events,
            sync,
            backend,
            worker: worker.map(tokio::task::spawn_local),
        }
    }

    pub fn backend(&self) -> &MemoryBackend {
        self.backend.as_deref().expect("scenario has no backend")
    }

    pub async fn startup(&mut self) -> SyncOutcome {
        let outcome = self.sync.startup().await;
        self.store.drain(&mut self.events);
        outcome
    }

    /// Let the worker catch up with everything submitted so far, then apply
    /// what it reported.
    pub async fn settle(&mut self) {
        for _ in 0..64 {
            tokio::task::yield_now().await;
        }
        self.store.drain(&mut self.events);
    }

    /// Stop mirroring, wait for the worker to finish the queue and apply its
    /// last results. The store is offline afterwards.
    pub async fn flush(&mut self) {
        self.store.detach_remote();
        if let Some(worker) = self.worker.take() {
            worker.await.expect("write-through worker panicked");
        }
        self.store.drain(&mut self.events);
    }
}

pub fn product_row(name: &str, price_cup: f64, stock: i64) -> ProductRow {
    ProductRow {
        id: Some(uuid::Uuid::new_v4().to_string()),
        name: name.into(),
        description: None,
        category: "alimentos".into(),
        price_cup,
        price_mlc: None,
        unit: None,
        stock: Some(stock),
        min_stock: None,
        image_url: None,
        is_featured: None,
        is_active: Some(true),
        sales_count: None,
        expiry_date: None,
    }
}

pub fn zone_row(id: &str, name: &str, fee_cup: f64) -> ZoneRow {
    ZoneRow {
        id: id.into(),
        name: name.into(),
        fee_cup: Some(fee_cup),
        fee_mlc: Some(fee_cup / 300.0),
        estimated_time: Some("20-30 min".into()),
        is_active: Some(true),
    }
}

pub fn profile(name: &str, role: UserRole) -> ProfileRow {
    ProfileRow {
        id: uuid::Uuid::new_v4().to_string(),
        name: name.into(),
        phone: Some("5351234567".into()),
        email: None,
        role: Some(role.as_str().into()),
        is_frequent_customer: None,
        total_orders: None,
        total_spent: None,
    }
}
