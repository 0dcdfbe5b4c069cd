//! Best-effort mirroring of local mutations to the remote backend.
//!
//! Store mutators apply their change locally and hand a [`RemoteAction`] to
//! an [`OptimisticWriteThrough`]. Failures are logged and dropped; the next
//! pull or change notification brings the two sides back together.

use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::StreamExt;

use mercado_common::order::{Order, OrderId, OrderStatus};
use mercado_common::product::{Product, ProductId, ProductPatch};

use crate::error::RemoteError;
use crate::remote::rows::{NewOrderRow, OrderItemRow, ProductRow, ProductRowPatch, ProfilePatch};
use crate::remote::{bounded, RemoteBackend};
use crate::store::StoreEvent;

/// A remote write issued by a store mutator.
#[derive(Debug, Clone)]
pub enum RemoteAction {
    CreateProduct(Product),
    UpdateProduct { id: ProductId, patch: ProductPatch },
    DeleteProduct(ProductId),
    CreateOrder {
        order: Order,
        customer_id: Option<String>,
    },
    UpdateOrderStatus { id: OrderId, status: OrderStatus },
    VerifyPayment(OrderId),
    UpdateProfile { user_id: String, patch: ProfilePatch },
    SignOut,
}

impl RemoteAction {
    fn name(&self) -> &'static str {
        match self {
            RemoteAction::CreateProduct(_) => "create product",
            RemoteAction::UpdateProduct { .. } => "update product",
            RemoteAction::DeleteProduct(_) => "delete product",
            RemoteAction::CreateOrder { .. } => "create order",
            RemoteAction::UpdateOrderStatus { .. } => "update order status",
            RemoteAction::VerifyPayment(_) => "verify payment",
            RemoteAction::UpdateProfile { .. } => "update profile",
            RemoteAction::SignOut => "sign out",
        }
    }
}

/// Where store mutators send their remote writes.
pub trait OptimisticWriteThrough {
    fn submit(&self, action: RemoteAction);

    /// Whether submitted actions can reach a backend.
    fn is_remote(&self) -> bool;
}

/// No backend configured: actions are dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct Offline;

impl OptimisticWriteThrough for Offline {
    fn submit(&self, action: RemoteAction) {
        tracing::debug!("remote action (offline mode): {}", action.name());
    }

    fn is_remote(&self) -> bool {
        false
    }
}

/// Queues actions for [`run_write_worker`].
#[derive(Debug, Clone)]
pub struct ChannelWriteThrough {
    tx: UnboundedSender<RemoteAction>,
}

impl ChannelWriteThrough {
    pub fn new() -> (Self, UnboundedReceiver<RemoteAction>) {
        let (tx, rx) = mpsc::unbounded();
        (Self { tx }, rx)
    }
}

impl OptimisticWriteThrough for ChannelWriteThrough {
    fn submit(&self, action: RemoteAction) {
        if let Err(e) = self.tx.unbounded_send(action) {
            tracing::warn!(
                "write-through worker gone, dropping {}",
                e.into_inner().name()
            );
        }
    }

    fn is_remote(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Perform queued actions one at a time until every sender is dropped.
///
/// Actions are applied in submission order, so a product or order created
/// locally and then edited is edited remotely under its remote id.
pub async fn run_write_worker<B: RemoteBackend>(
    backend: Rc<B>,
    mut actions: UnboundedReceiver<RemoteAction>,
    events: UnboundedSender<StoreEvent>,
    timeout: Duration,
) {
    let mut worker = Worker {
        backend,
        events,
        timeout,
        remote_ids: HashMap::new(),
    };
    while let Some(action) = actions.next().await {
        let name = action.name();
        if let Err(e) = worker.perform(action).await {
            tracing::warn!("remote {name} failed, keeping local copy: {e}");
        }
    }
    tracing::debug!("write-through worker stopped");
}

struct Worker<B> {
    backend: Rc<B>,
    events: UnboundedSender<StoreEvent>,
    timeout: Duration,
    /// Locally minted ids that have since been assigned remote ones.
    remote_ids: HashMap<String, String>,
}

impl<B: RemoteBackend> Worker<B> {
    fn resolve(&self, id: &str) -> String {
        self.remote_ids
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    fn emit(&self, event: StoreEvent) {
        // The store may already be gone at shutdown.
        let _ = self.events.unbounded_send(event);
    }

    async fn perform(&mut self, action: RemoteAction) -> Result<(), RemoteError> {
        let backend = Rc::clone(&self.backend);
        let limit = self.timeout;
        match action {
            RemoteAction::CreateProduct(product) => {
                let stored = bounded(
                    limit,
                    backend.create_product(&ProductRow::for_insert(&product)),
                )
                .await?;
                let stored = Product::from(stored);
                tracing::debug!("product {} stored remotely as {}", product.id, stored.id);
                self.remote_ids
                    .insert(product.id.0.clone(), stored.id.0.clone());
                self.emit(StoreEvent::ProductReconciled {
                    local_id: product.id,
                    product: stored,
                });
            }
            RemoteAction::UpdateProduct { id, patch } => {
                let id = self.resolve(&id.0);
                bounded(
                    limit,
                    backend.update_product(&id, &ProductRowPatch::from(&patch)),
                )
                .await?;
            }
            RemoteAction::DeleteProduct(id) => {
                let id = self.resolve(&id.0);
                bounded(limit, backend.delete_product(&id)).await?;
            }
            RemoteAction::CreateOrder { order, customer_id } => {
                let header = NewOrderRow::new(&order, customer_id.as_deref());
                let stored = bounded(limit, backend.create_order(&header)).await?;
                let items: Vec<OrderItemRow> = order
                    .items
                    .iter()
                    .map(|line| OrderItemRow::for_order(&stored.id, line))
                    .collect();
                if let Err(e) = bounded(limit, backend.create_order_items(&items)).await {
                    tracing::warn!(
                        "order {} stored without its items: {e}",
                        order.order_number
                    );
                }
                self.remote_ids
                    .insert(order.id.0.clone(), stored.id.clone());
                self.emit(StoreEvent::OrderReconciled {
                    local_id: order.id,
                    remote_id: OrderId(stored.id),
                });
            }
            RemoteAction::UpdateOrderStatus { id, status } => {
                let id = self.resolve(&id.0);
                bounded(limit, backend.update_order_status(&id, status)).await?;
            }
            RemoteAction::VerifyPayment(id) => {
                let id = self.resolve(&id.0);
                bounded(limit, backend.verify_payment(&id)).await?;
            }
            RemoteAction::UpdateProfile { user_id, patch } => {
                bounded(limit, backend.update_profile(&user_id, &patch)).await?;
            }
            RemoteAction::SignOut => {
                bounded(limit, backend.sign_out()).await?;
            }
        }
        Ok(())
    }
}
