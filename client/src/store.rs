//! The application store: catalog, cart, orders, session and UI selection.
//!
//! A `Store` is owned by a single task. Mutators apply their change at once
//! and mirror it through the [`OptimisticWriteThrough`]; everything that
//! arrives later from the backend comes in as a [`StoreEvent`] passed to
//! [`Store::apply`].

use std::collections::HashMap;

use futures::channel::mpsc::UnboundedReceiver;

use mercado_common::cart::{Cart, CartItem};
use mercado_common::catalog::{
    default_combos, default_payment_channels, default_products, default_zones,
};
use mercado_common::combo::Combo;
use mercado_common::currency::{Currency, Money};
use mercado_common::delivery::DeliveryZone;
use mercado_common::order::{Order, OrderId, OrderStatus};
use mercado_common::payment::{PaymentInfo, PaymentInfoPatch};
use mercado_common::product::{Category, Product, ProductId, ProductPatch, StockError};
use mercado_common::user::{normalize_contact, User, UserRole};

use crate::config::StoreOptions;
use crate::error::StoreError;
use crate::local::LocalPersistence;
use crate::remote::rows::{is_remote_id, ProfilePatch};
use crate::remote::AuthSession;
use crate::write_through::{Offline, OptimisticWriteThrough, RemoteAction};

/// Screen the user is on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum View {
    #[default]
    Home,
    Catalog,
    Product,
    Cart,
    Checkout,
    Orders,
    Profile,
    Admin,
    Auth,
}

/// Where a pulled collection came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOrigin {
    /// Initial pull. An empty result leaves local data alone.
    Startup,
    /// Re-pull after a change notification. Always replaces.
    ChangeFeed,
}

/// Asynchronous results, applied on the store's task.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    RemoteStatus(bool),
    Loading(bool),
    ProductsPulled {
        products: Vec<Product>,
        origin: PullOrigin,
    },
    OrdersPulled {
        orders: Vec<Order>,
        origin: PullOrigin,
    },
    ZonesPulled(Vec<DeliveryZone>),
    RemoteSession { user: User, session: AuthSession },
    ProductReconciled {
        local_id: ProductId,
        product: Product,
    },
    OrderReconciled {
        local_id: OrderId,
        remote_id: OrderId,
    },
}

pub struct Store {
    options: StoreOptions,
    currency: Currency,
    view: View,
    products: Vec<Product>,
    cart: Cart,
    /// Most recent first.
    orders: Vec<Order>,
    combos: Vec<Combo>,
    zones: Vec<DeliveryZone>,
    payment_channels: Vec<PaymentInfo>,
    user: Option<User>,
    remote_connected: bool,
    loading: bool,
    search_query: String,
    selected_category: Option<Category>,
    selected_product: Option<ProductId>,
    pub(crate) local: LocalPersistence,
    remote: Box<dyn OptimisticWriteThrough>,
}

impl Store {
    /// A store seeded with the bundled catalog, zones and payment channels.
    pub fn new(
        options: StoreOptions,
        local: LocalPersistence,
        remote: impl OptimisticWriteThrough + 'static,
    ) -> Self {
        Self {
            options,
            currency: Currency::Cup,
            view: View::Home,
            products: default_products(),
            cart: Cart::new(),
            orders: Vec::new(),
            combos: default_combos(),
            zones: default_zones(),
            payment_channels: default_payment_channels(),
            user: None,
            remote_connected: false,
            loading: false,
            search_query: String::new(),
            selected_category: None,
            selected_product: None,
            local,
            remote: Box::new(remote),
        }
    }

    pub fn offline(options: StoreOptions, local: LocalPersistence) -> Self {
        Self::new(options, local, Offline)
    }

    pub fn options(&self) -> StoreOptions {
        self.options
    }

    // ----- connectivity -----

    pub fn is_remote_connected(&self) -> bool {
        self.remote_connected
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Stop mirroring writes. Dropping the old write-through lets its worker
    /// finish what is queued and exit.
    pub fn detach_remote(&mut self) {
        self.remote = Box::new(Offline);
    }

    // ----- view & catalog selection -----

    pub fn view(&self) -> View {
        self.view
    }

    pub fn set_view(&mut self, view: View) {
        self.view = view;
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Switch between CUP and MLC. Stored prices are untouched.
    pub fn toggle_currency(&mut self) -> Currency {
        self.currency = self.currency.toggled();
        self.currency
    }

    pub fn search_query(&self) -> &str {
        &self.search_query
    }

    pub fn set_search_query(&mut self, query: impl Into<String>) {
        self.search_query = query.into();
    }

    pub fn selected_category(&self) -> Option<&Category> {
        self.selected_category.as_ref()
    }

    /// `None` shows every category.
    pub fn set_category(&mut self, category: Option<Category>) {
        self.selected_category = category;
    }

    pub fn selected_product(&self) -> Option<&Product> {
        self.selected_product.as_ref().and_then(|id| self.product(id))
    }

    pub fn select_product(&mut self, id: &ProductId) {
        self.selected_product = Some(id.clone());
        self.view = View::Product;
    }

    // ----- products -----

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn product(&self, id: &ProductId) -> Option<&Product> {
        self.products.iter().find(|p| &p.id == id)
    }

    /// Active products matching the selected category and search query.
    pub fn visible_products(&self) -> Vec<&Product> {
        self.products
            .iter()
            .filter(|p| p.is_active)
            .filter(|p| {
                self.selected_category
                    .as_ref()
                    .map_or(true, |c| &p.category == c)
            })
            .filter(|p| p.matches_query(&self.search_query))
            .collect()
    }

    pub fn featured_products(&self) -> Vec<&Product> {
        self.products
            .iter()
            .filter(|p| p.is_active && p.is_featured)
            .collect()
    }

    pub fn add_product(&mut self, product: Product) {
        tracing::debug!("adding product {} ({})", product.id, product.name);
        self.products.push(product.clone());
        self.remote.submit(RemoteAction::CreateProduct(product));
    }

    /// Merge `patch` into the product. Returns false if there is no such product.
    pub fn update_product(&mut self, id: &ProductId, patch: ProductPatch) -> bool {
        let Some(product) = self.products.iter_mut().find(|p| &p.id == id) else {
            return false;
        };
        product.apply(&patch);
        self.remote.submit(RemoteAction::UpdateProduct {
            id: id.clone(),
            patch,
        });
        true
    }

    pub fn delete_product(&mut self, id: &ProductId) -> bool {
        let before = self.products.len();
        self.products.retain(|p| &p.id != id);
        if self.products.len() == before {
            return false;
        }
        if self.selected_product.as_ref() == Some(id) {
            self.selected_product = None;
        }
        self.remote.submit(RemoteAction::DeleteProduct(id.clone()));
        true
    }

    /// Add `delta` units of stock (negative to remove). Never goes below zero.
    pub fn adjust_stock(&mut self, id: &ProductId, delta: i64) -> Result<u32, StoreError> {
        let product = self
            .products
            .iter_mut()
            .find(|p| &p.id == id)
            .ok_or_else(|| StoreError::ProductNotFound(id.clone()))?;
        let stock = product.adjust_stock(delta).map_err(|e| match e {
            StockError::Underflow {
                available,
                requested,
            } => StoreError::InsufficientStock {
                product: id.clone(),
                available,
                requested,
            },
        })?;
        self.remote.submit(RemoteAction::UpdateProduct {
            id: id.clone(),
            patch: ProductPatch::stock(stock),
        });
        Ok(stock)
    }

    // ----- cart -----

    pub fn cart(&self) -> &Cart {
        &self.cart
    }

    pub fn cart_items(&self) -> &[CartItem] {
        self.cart.items()
    }

    /// One more unit of `product`, capped at its stock. Stock is read from
    /// the catalog entry when there is one. Returns whether the cart changed.
    pub fn add_to_cart(&mut self, product: &Product) -> bool {
        let live = self.product(&product.id).unwrap_or(product).clone();
        self.cart.add(&live)
    }

    pub fn remove_from_cart(&mut self, id: &ProductId) -> bool {
        self.cart.remove(id)
    }

    /// Set a line's quantity; zero removes it. Not checked against stock.
    pub fn update_cart_qty(&mut self, id: &ProductId, quantity: u32) -> bool {
        self.cart.set_quantity(id, quantity)
    }

    pub fn clear_cart(&mut self) {
        self.cart.clear();
    }

    /// Cart value in the active currency.
    pub fn cart_total(&self) -> Money {
        self.cart.total(self.currency)
    }

    pub fn cart_count(&self) -> u32 {
        self.cart.count()
    }

    // ----- orders -----

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn order(&self, id: &OrderId) -> Option<&Order> {
        self.orders.iter().find(|o| &o.id == id)
    }

    /// Orders placed with this phone number, most recent first.
    pub fn orders_for_customer(&self, phone: &str) -> Vec<&Order> {
        let phone = normalize_contact(phone);
        self.orders
            .iter()
            .filter(|o| !phone.is_empty() && normalize_contact(&o.customer_phone) == phone)
            .collect()
    }

    /// Record a placed order at the head of the list and mirror it remotely.
    /// Order numbers are for display and may repeat; only the id must be new.
    pub fn add_order(&mut self, order: Order) -> Result<(), StoreError> {
        if self.orders.iter().any(|o| o.id == order.id) {
            return Err(StoreError::DuplicateOrder(order.id));
        }
        if self.options.reserve_stock {
            self.reserve_stock(&order)?;
        }
        tracing::debug!("order {} placed, total {}", order.order_number, order.total);
        self.orders.insert(0, order.clone());
        self.remote.submit(RemoteAction::CreateOrder {
            order,
            customer_id: self.user.as_ref().map(|u| u.id.clone()),
        });
        Ok(())
    }

    /// Quantity per catalog product named by the order's lines.
    fn reserved_quantities(&self, order: &Order) -> HashMap<ProductId, u32> {
        let mut wanted: HashMap<ProductId, u32> = HashMap::new();
        for line in &order.items {
            if let Some(id) = line.product_id.as_ref().filter(|id| self.product(id).is_some()) {
                *wanted.entry(id.clone()).or_default() += line.quantity;
            }
        }
        wanted
    }

    /// All lines are checked before any stock is taken.
    fn reserve_stock(&mut self, order: &Order) -> Result<(), StoreError> {
        let wanted = self.reserved_quantities(order);
        for (id, &requested) in &wanted {
            if let Some(p) = self.product(id) {
                if p.stock < requested {
                    return Err(StoreError::InsufficientStock {
                        product: id.clone(),
                        available: p.stock,
                        requested,
                    });
                }
            }
        }
        for (id, requested) in wanted {
            self.adjust_stock(&id, -i64::from(requested))?;
        }
        Ok(())
    }

    fn restock(&mut self, order: &Order) {
        for (id, quantity) in self.reserved_quantities(order) {
            if let Err(e) = self.adjust_stock(&id, i64::from(quantity)) {
                tracing::warn!("could not restock {id}: {e}");
            }
        }
    }

    /// Move an order to `status`. With transition enforcement on, only the
    /// next step of the chain or a cancellation of an open order is accepted.
    pub fn update_order_status(
        &mut self,
        id: &OrderId,
        status: OrderStatus,
    ) -> Result<(), StoreError> {
        let enforce = self.options.enforce_transitions;
        let order = self
            .orders
            .iter_mut()
            .find(|o| &o.id == id)
            .ok_or_else(|| StoreError::OrderNotFound(id.clone()))?;
        let previous = order.status;
        if enforce {
            order.transition(status)?;
        } else if previous == status {
            return Ok(());
        } else {
            order.status = status;
        }
        let cancelled = status == OrderStatus::Cancelled && previous != OrderStatus::Cancelled;
        let snapshot = (cancelled && self.options.reserve_stock).then(|| order.clone());
        tracing::debug!("order {id}: {previous} -> {status}");
        if let Some(order) = snapshot {
            self.restock(&order);
        }
        self.remote.submit(RemoteAction::UpdateOrderStatus {
            id: id.clone(),
            status,
        });
        Ok(())
    }

    /// Move an order one step along the chain. Returns the new status.
    pub fn advance_order(&mut self, id: &OrderId) -> Result<OrderStatus, StoreError> {
        let status = self
            .order(id)
            .map(|o| o.status)
            .ok_or_else(|| StoreError::OrderNotFound(id.clone()))?;
        let next = status.next().ok_or_else(|| StoreError::Finished {
            id: id.clone(),
            status,
        })?;
        self.update_order_status(id, next)?;
        Ok(next)
    }

    pub fn cancel_order(&mut self, id: &OrderId) -> Result<(), StoreError> {
        self.update_order_status(id, OrderStatus::Cancelled)
    }

    /// Mark payment verified. Repeated calls change nothing and send nothing.
    /// Returns whether this call flipped the flag.
    pub fn verify_payment(&mut self, id: &OrderId) -> Result<bool, StoreError> {
        let order = self
            .orders
            .iter_mut()
            .find(|o| &o.id == id)
            .ok_or_else(|| StoreError::OrderNotFound(id.clone()))?;
        let changed = order.verify_payment();
        if changed {
            self.remote.submit(RemoteAction::VerifyPayment(id.clone()));
        }
        Ok(changed)
    }

    /// Bundles on offer, in display order.
    pub fn active_combos(&self) -> Vec<&Combo> {
        self.combos.iter().filter(|c| c.is_active).collect()
    }

    // ----- delivery zones & payment channels -----

    pub fn delivery_zones(&self) -> &[DeliveryZone] {
        &self.zones
    }

    pub fn active_zones(&self) -> Vec<&DeliveryZone> {
        self.zones.iter().filter(|z| z.is_active).collect()
    }

    pub fn zone(&self, id: &str) -> Option<&DeliveryZone> {
        self.zones.iter().find(|z| z.id == id)
    }

    pub fn payment_channels(&self) -> &[PaymentInfo] {
        &self.payment_channels
    }

    /// Channels offered at checkout, in display order.
    pub fn active_payment_channels(&self) -> Vec<&PaymentInfo> {
        self.payment_channels
            .iter()
            .filter(|p| p.is_active)
            .collect()
    }

    pub fn payment_channel(&self, id: &str) -> Option<&PaymentInfo> {
        self.payment_channels.iter().find(|p| p.id == id)
    }

    pub fn add_payment_channel(&mut self, channel: PaymentInfo) {
        self.payment_channels.push(channel);
    }

    pub fn update_payment_channel(&mut self, id: &str, patch: PaymentInfoPatch) -> bool {
        match self.payment_channels.iter_mut().find(|p| p.id == id) {
            Some(channel) => {
                channel.apply(&patch);
                true
            }
            None => false,
        }
    }

    pub fn remove_payment_channel(&mut self, id: &str) -> bool {
        let before = self.payment_channels.len();
        self.payment_channels.retain(|p| p.id != id);
        self.payment_channels.len() != before
    }

    // ----- session -----

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// Admins and vendors may manage the catalog and orders.
    pub fn is_admin(&self) -> bool {
        self.user.as_ref().is_some_and(User::is_staff)
    }

    /// Start a session for a new user built from name, phone and role.
    pub fn login(&mut self, name: &str, phone: &str, role: UserRole) -> &User {
        self.start_session(User::new_session(name, phone, role))
    }

    /// Make `user` the current session and persist it.
    pub fn start_session(&mut self, user: User) -> &User {
        if let Err(e) = self.local.save_session(&user) {
            tracing::warn!("session not persisted: {e}");
        }
        tracing::info!("signed in as {} ({})", user.name, user.role);
        self.user.insert(user)
    }

    /// Start a session backed by remote credentials. The tokens are kept so
    /// a later run can resume them.
    pub fn start_remote_session(&mut self, user: User, session: &AuthSession) -> &User {
        if session.is_live() {
            if let Err(e) = self.local.save_remote_session(session) {
                tracing::warn!("remote session not persisted: {e}");
            }
        }
        self.start_session(user)
    }

    /// Edit the signed-in user's contact details. Only accounts known to the
    /// backend are mirrored remotely. Returns false when nobody is signed in.
    pub fn update_profile(&mut self, patch: ProfilePatch) -> bool {
        let Some(user) = self.user.as_mut() else {
            return false;
        };
        if let Some(name) = &patch.name {
            user.name = name.clone();
        }
        if let Some(phone) = &patch.phone {
            user.phone = phone.clone();
        }
        if let Some(email) = &patch.email {
            user.email = email.clone();
        }
        if let Err(e) = self.local.save_session(user) {
            tracing::warn!("session not persisted: {e}");
        }
        if is_remote_id(&user.id) {
            self.remote.submit(RemoteAction::UpdateProfile {
                user_id: user.id.clone(),
                patch,
            });
        }
        true
    }

    /// Load the persisted session, if any, as the current user.
    pub fn restore_session(&mut self) -> Option<&User> {
        let user = self.local.load_session()?;
        tracing::debug!("restored session for {}", user.name);
        Some(self.user.insert(user))
    }

    pub fn logout(&mut self) {
        if self.remote.is_remote() {
            self.remote.submit(RemoteAction::SignOut);
        }
        if let Err(e) = self.local.clear_session() {
            tracing::warn!("could not clear persisted session: {e}");
        }
        if let Err(e) = self.local.clear_remote_session() {
            tracing::warn!("could not clear persisted remote session: {e}");
        }
        self.user = None;
        self.view = View::Home;
    }

    // ----- asynchronous results -----

    pub fn apply(&mut self, event: StoreEvent) {
        match event {
            StoreEvent::RemoteStatus(connected) => self.remote_connected = connected,
            StoreEvent::Loading(loading) => self.loading = loading,
            StoreEvent::ProductsPulled { products, origin } => {
                if products.is_empty() && origin == PullOrigin::Startup {
                    tracing::info!("remote catalog is empty, keeping local products");
                } else {
                    tracing::debug!("replacing catalog with {} remote products", products.len());
                    self.products = products;
                }
            }
            StoreEvent::OrdersPulled { orders, origin } => {
                if orders.is_empty() && origin == PullOrigin::Startup {
                    tracing::info!("remote has no orders, keeping local ones");
                } else {
                    tracing::debug!("replacing orders with {} remote orders", orders.len());
                    self.orders = orders;
                }
            }
            StoreEvent::ZonesPulled(zones) => {
                if !zones.is_empty() {
                    self.zones = zones;
                }
            }
            StoreEvent::RemoteSession { user, session } => {
                self.start_remote_session(user, &session);
            }
            StoreEvent::ProductReconciled { local_id, product } => {
                if self.selected_product.as_ref() == Some(&local_id) {
                    self.selected_product = Some(product.id.clone());
                }
                if self.product(&product.id).is_some() {
                    // A pull already brought the remote row in.
                    self.products.retain(|p| p.id != local_id);
                } else if let Some(slot) = self.products.iter_mut().find(|p| p.id == local_id) {
                    // Edits made while the insert was in flight stay.
                    slot.id = product.id;
                }
            }
            StoreEvent::OrderReconciled {
                local_id,
                remote_id,
            } => {
                if self.order(&remote_id).is_some() {
                    self.orders.retain(|o| o.id != local_id);
                } else if let Some(order) = self.orders.iter_mut().find(|o| o.id == local_id) {
                    order.id = remote_id;
                }
            }
        }
    }

    /// Apply every event already waiting on `events`. Returns how many.
    pub fn drain(&mut self, events: &mut UnboundedReceiver<StoreEvent>) -> usize {
        let mut applied = 0;
        while let Ok(Some(event)) = events.try_next() {
            self.apply(event);
            applied += 1;
        }
        applied
    }
}
