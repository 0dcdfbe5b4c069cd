//! Client core for the MercadoCuba storefront: the in-memory store, its
//! optimistic write-through to a hosted backend, startup sync and the
//! checkout wizard.
//!
//! Everything runs on one thread. The [`Store`] is owned by the front end;
//! remote writes and sync results come back to it as [`StoreEvent`]s.

pub mod auth;
pub mod checkout;
pub mod config;
pub mod error;
pub mod local;
pub mod remote;
pub mod store;
pub mod sync;
pub mod write_through;

use std::rc::Rc;

use futures::channel::mpsc::{self, UnboundedReceiver};
use futures::future::LocalBoxFuture;
use futures::FutureExt;

pub use checkout::{Checkout, CheckoutStep};
pub use config::{ClientConfig, RemoteConfig, StoreOptions};
pub use error::{AuthError, LocalStoreError, RemoteError, StoreError};
pub use local::{FileKv, LocalPersistence, MemoryKv};
pub use remote::{MemoryBackend, RemoteBackend, RestBackend};
pub use store::{PullOrigin, Store, StoreEvent, View};
pub use sync::{SyncController, SyncOutcome};
pub use write_through::{ChannelWriteThrough, Offline, OptimisticWriteThrough, RemoteAction};

/// The parts a front end drives: the store, the event stream feeding it, the
/// sync controller and, when a backend is present, the write-through worker.
pub struct Client<B> {
    pub store: Store,
    pub events: UnboundedReceiver<StoreEvent>,
    pub sync: SyncController<B>,
    /// Must be polled for remote writes to happen. Finishes once the store
    /// has dropped or detached its write-through.
    pub worker: Option<LocalBoxFuture<'static, ()>>,
}

impl<B: RemoteBackend + 'static> Client<B> {
    /// Wire a store to `backend`, or run fully offline without one. The
    /// persisted session, if any, is restored before returning, and its
    /// remote tokens are handed to the backend.
    pub fn assemble(config: &ClientConfig, local: LocalPersistence, backend: Option<Rc<B>>) -> Self {
        if let (Some(backend), Some(session)) = (&backend, local.load_remote_session()) {
            tracing::debug!("resuming remote session for {}", session.email);
            backend.resume_session(session);
        }
        let (events_tx, events) = mpsc::unbounded();
        let (mut store, worker) = match &backend {
            Some(backend) => {
                let (write_through, actions) = ChannelWriteThrough::new();
                let worker = write_through::run_write_worker(
                    Rc::clone(backend),
                    actions,
                    events_tx.clone(),
                    config.remote_timeout,
                )
                .boxed_local();
                (Store::new(config.store, local, write_through), Some(worker))
            }
            None => (Store::offline(config.store, local), None),
        };
        store.restore_session();
        let sync = SyncController::new(backend, events_tx, config.remote_timeout);
        Self {
            store,
            events,
            sync,
            worker,
        }
    }
}

/// Local persistence under the configured data directory, falling back to
/// memory when no directory is available.
pub fn open_local(config: &ClientConfig) -> Result<LocalPersistence, LocalStoreError> {
    match config.data_dir.clone().or_else(config::default_data_dir) {
        Some(dir) => Ok(LocalPersistence::new(FileKv::open(dir)?)),
        None => {
            tracing::warn!("no data directory, accounts and session will not persist");
            Ok(LocalPersistence::in_memory())
        }
    }
}

/// Backend from the remote settings, if they are complete.
pub fn rest_backend(config: &ClientConfig) -> Option<Rc<RestBackend>> {
    if !config.remote.is_configured() {
        return None;
    }
    match RestBackend::from_config(&config.remote, config.remote_timeout) {
        Ok(backend) => Some(Rc::new(backend)),
        Err(e) => {
            tracing::warn!("remote backend unavailable: {e}");
            None
        }
    }
}
