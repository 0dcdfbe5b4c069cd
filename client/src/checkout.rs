//! The four-step checkout wizard: customer details, delivery, payment, review.
//!
//! Each forward step is gated on the form being complete enough; the delivery
//! fee is recomputed from the form and cart on every read and only frozen
//! into the order on confirmation.

use chrono::Utc;
use thiserror::Error;

use mercado_common::currency::{format_amount, Currency, Money};
use mercado_common::delivery::delivery_fee;
use mercado_common::ids::time_token;
use mercado_common::order::{
    DeliveryMethod, Order, OrderDraft, OrderId, OrderLine, OrderNumber, PaymentMethod,
};
use mercado_common::payment::PaymentInfo;

use crate::error::StoreError;
use crate::store::{Store, View};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum CheckoutStep {
    #[default]
    Customer,
    Delivery,
    Payment,
    Review,
}

impl CheckoutStep {
    fn next(self) -> Option<CheckoutStep> {
        match self {
            CheckoutStep::Customer => Some(CheckoutStep::Delivery),
            CheckoutStep::Delivery => Some(CheckoutStep::Payment),
            CheckoutStep::Payment => Some(CheckoutStep::Review),
            CheckoutStep::Review => None,
        }
    }

    fn previous(self) -> Option<CheckoutStep> {
        match self {
            CheckoutStep::Customer => None,
            CheckoutStep::Delivery => Some(CheckoutStep::Customer),
            CheckoutStep::Payment => Some(CheckoutStep::Delivery),
            CheckoutStep::Review => Some(CheckoutStep::Payment),
        }
    }
}

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("your cart is empty")]
    EmptyCart,
    #[error("please enter your name")]
    MissingName,
    #[error("please enter a phone number")]
    MissingPhone,
    #[error("please enter a delivery address")]
    MissingAddress,
    #[error("please choose a delivery zone")]
    MissingZone,
    #[error("delivery zone {0} is not available")]
    UnknownZone(String),
    #[error("no payment method is available")]
    NoPaymentChannel,
    #[error("finish the previous steps first")]
    NotReviewed,
    #[error("this order has already been placed")]
    AlreadyPlaced,
    #[error("there is no step after the review")]
    LastStep,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What the customer has entered so far.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutForm {
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_address: String,
    pub delivery_method: DeliveryMethod,
    pub zone_id: Option<String>,
    /// Payment channel id. `None` picks the first active channel.
    pub payment_channel: Option<String>,
    pub notes: String,
}

impl Default for CheckoutForm {
    fn default() -> Self {
        Self {
            customer_name: String::new(),
            customer_phone: String::new(),
            customer_address: String::new(),
            delivery_method: DeliveryMethod::Delivery,
            zone_id: None,
            payment_channel: None,
            notes: String::new(),
        }
    }
}

/// Amounts for the current form and cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    pub currency: Currency,
    pub subtotal: Money,
    pub delivery_fee: Money,
    pub total: Money,
}

impl Quote {
    pub fn is_free_delivery(&self) -> bool {
        self.delivery_fee.is_zero()
    }
}

/// Shown once the order is placed.
#[derive(Debug, Clone, PartialEq)]
pub struct Confirmation {
    pub order_id: OrderId,
    pub order_number: OrderNumber,
    pub total: Money,
    pub currency: Currency,
    pub payment_method: PaymentMethod,
    /// Account details to transfer to, absent for cash.
    pub transfer_to: Option<PaymentInfo>,
}

impl Confirmation {
    /// Plain-text summary the customer can forward to the shop.
    pub fn share_text(&self, order: &Order) -> String {
        let mut text = format!(
            "--- NUEVO PEDIDO MercadoCuba ---\nPedido: {}\nCliente: {}\nTel: {}\nDireccion: {}\n\nPRODUCTOS:\n",
            self.order_number,
            order.customer_name,
            order.customer_phone,
            if order.delivery_method == DeliveryMethod::Pickup {
                "Recogida en punto"
            } else {
                order.customer_address.as_str()
            },
        );
        for line in &order.items {
            text.push_str(&format!("- {} x{}\n", line.name, line.quantity));
        }
        text.push_str(&format!(
            "\nTotal: {}\nPago: {}\n\nGracias por su pedido!",
            format_amount(self.total, self.currency),
            self.payment_method.label()
        ));
        text
    }
}

#[derive(Debug, Clone, Default)]
pub struct Checkout {
    step: CheckoutStep,
    form: CheckoutForm,
    placed: Option<Confirmation>,
}

fn blank(s: &str) -> bool {
    s.trim().is_empty()
}

impl Checkout {
    /// A fresh wizard, with name and phone taken from the session if any.
    pub fn new(store: &Store) -> Self {
        let mut form = CheckoutForm::default();
        if let Some(user) = store.user() {
            form.customer_name = user.name.clone();
            form.customer_phone = user.phone.clone();
        }
        Self {
            form,
            ..Self::default()
        }
    }

    pub fn step(&self) -> CheckoutStep {
        self.step
    }

    pub fn form(&self) -> &CheckoutForm {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut CheckoutForm {
        &mut self.form
    }

    pub fn confirmation(&self) -> Option<&Confirmation> {
        self.placed.as_ref()
    }

    fn check_customer(&self) -> Result<(), CheckoutError> {
        let f = &self.form;
        if blank(&f.customer_name) {
            return Err(CheckoutError::MissingName);
        }
        if blank(&f.customer_phone) {
            return Err(CheckoutError::MissingPhone);
        }
        if f.delivery_method != DeliveryMethod::Pickup && blank(&f.customer_address) {
            return Err(CheckoutError::MissingAddress);
        }
        Ok(())
    }

    fn check_delivery(&self, store: &Store) -> Result<(), CheckoutError> {
        if self.form.delivery_method == DeliveryMethod::Pickup {
            return Ok(());
        }
        let zone = self.form.zone_id.as_deref().ok_or(CheckoutError::MissingZone)?;
        match store.zone(zone) {
            Some(z) if z.is_active => Ok(()),
            _ => Err(CheckoutError::UnknownZone(zone.to_string())),
        }
    }

    /// The gate out of the current step.
    pub fn check_step(&self, store: &Store) -> Result<(), CheckoutError> {
        if store.cart().is_empty() && self.placed.is_none() {
            return Err(CheckoutError::EmptyCart);
        }
        match self.step() {
            CheckoutStep::Customer => self.check_customer(),
            CheckoutStep::Delivery => self.check_delivery(store),
            CheckoutStep::Payment | CheckoutStep::Review => Ok(()),
        }
    }

    pub fn can_advance(&self, store: &Store) -> bool {
        self.step() != CheckoutStep::Review && self.check_step(store).is_ok()
    }

    pub fn advance(&mut self, store: &Store) -> Result<CheckoutStep, CheckoutError> {
        let next = self.step().next().ok_or(CheckoutError::LastStep)?;
        self.check_step(store)?;
        self.step = next;
        Ok(next)
    }

    /// Go back one step. Returns `None` on the first step, where the UI
    /// returns to the cart.
    pub fn back(&mut self) -> Option<CheckoutStep> {
        let previous = self.step().previous()?;
        self.step = previous;
        Some(previous)
    }

    /// Subtotal, fee and total in the store's active currency.
    pub fn quote(&self, store: &Store) -> Quote {
        let currency = store.currency();
        let subtotal = store.cart_total();
        let zone = match self.form.delivery_method {
            DeliveryMethod::Pickup => None,
            _ => self.form.zone_id.as_deref().and_then(|id| store.zone(id)),
        };
        let fee = delivery_fee(self.form.delivery_method, zone, subtotal, currency);
        Quote {
            currency,
            subtotal,
            delivery_fee: fee,
            total: subtotal + fee,
        }
    }

    /// The selected payment channel if it is still offered, else the first one.
    pub fn payment_choice<'s>(&self, store: &'s Store) -> Option<&'s PaymentInfo> {
        let active = store.active_payment_channels();
        self.form
            .payment_channel
            .as_deref()
            .and_then(|id| active.iter().copied().find(|p| p.id == id))
            .or_else(|| active.first().copied())
    }

    /// Place the order: freeze the cart and fee into an [`Order`], hand it to
    /// the store and empty the cart.
    pub fn confirm(&mut self, store: &mut Store) -> Result<Confirmation, CheckoutError> {
        if self.placed.is_some() {
            return Err(CheckoutError::AlreadyPlaced);
        }
        if self.step() != CheckoutStep::Review {
            return Err(CheckoutError::NotReviewed);
        }
        if store.cart().is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        self.check_customer()?;
        self.check_delivery(store)?;
        let channel = self
            .payment_choice(store)
            .cloned()
            .ok_or(CheckoutError::NoPaymentChannel)?;

        let quote = self.quote(store);
        let items: Vec<OrderLine> = store
            .cart_items()
            .iter()
            .map(|item| OrderLine::from_cart_item(item, quote.currency))
            .collect();
        let f = &self.form;
        let pickup = f.delivery_method == DeliveryMethod::Pickup;
        let draft = OrderDraft {
            customer_name: f.customer_name.trim().to_string(),
            customer_phone: f.customer_phone.trim().to_string(),
            customer_address: f.customer_address.trim().to_string(),
            delivery_method: f.delivery_method,
            delivery_zone: if pickup { None } else { f.zone_id.clone() },
            delivery_fee: quote.delivery_fee,
            currency: quote.currency,
            payment_method: channel.method,
            notes: f.notes.trim().to_string(),
        };
        let order = Order::place(
            OrderId(time_token()),
            OrderNumber::generate(),
            draft,
            items,
            Utc::now(),
        );
        debug_assert!(order.is_consistent());

        let confirmation = Confirmation {
            order_id: order.id.clone(),
            order_number: order.order_number.clone(),
            total: order.total,
            currency: order.currency,
            payment_method: order.payment_method,
            transfer_to: channel.needs_transfer().then_some(channel),
        };
        store.add_order(order)?;
        store.clear_cart();
        store.set_view(View::Checkout);
        tracing::info!(
            "order {} confirmed: {}",
            confirmation.order_number,
            format_amount(confirmation.total, confirmation.currency)
        );
        self.placed = Some(confirmation.clone());
        Ok(confirmation)
    }
}
