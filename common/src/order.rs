use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cart::CartItem;
use crate::currency::{Currency, Money};
use crate::product::ProductId;

/// Unique order identifier (local time token until the backend assigns one).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        OrderId(s.to_string())
    }
}

/// Human-readable order code: `MC-` followed by the last six digits of the
/// epoch-millis it was created at. Unique enough for display only.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(pub String);

impl OrderNumber {
    pub const PREFIX: &'static str = "MC-";

    pub fn from_millis(millis: i64) -> Self {
        OrderNumber(format!("{}{:06}", Self::PREFIX, millis.rem_euclid(1_000_000)))
    }

    /// Next number from the process-wide id clock.
    pub fn generate() -> Self {
        Self::from_millis(crate::ids::next_millis())
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod {
    Delivery,
    Messenger,
    Pickup,
}

impl DeliveryMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryMethod::Delivery => "delivery",
            DeliveryMethod::Messenger => "messenger",
            DeliveryMethod::Pickup => "pickup",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DeliveryMethod::Delivery => "Delivery",
            DeliveryMethod::Messenger => "Mensajero",
            DeliveryMethod::Pickup => "Recogida",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "delivery" => Some(DeliveryMethod::Delivery),
            "messenger" => Some(DeliveryMethod::Messenger),
            "pickup" => Some(DeliveryMethod::Pickup),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Transfermovil,
    Enzona,
    Transfer,
    Cash,
}

impl PaymentMethod {
    pub fn all() -> &'static [PaymentMethod] {
        &[
            PaymentMethod::Transfermovil,
            PaymentMethod::Enzona,
            PaymentMethod::Transfer,
            PaymentMethod::Cash,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Transfermovil => "transfermovil",
            PaymentMethod::Enzona => "enzona",
            PaymentMethod::Transfer => "transfer",
            PaymentMethod::Cash => "cash",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PaymentMethod::Transfermovil => "Transfermóvil",
            PaymentMethod::Enzona => "EnZona",
            PaymentMethod::Transfer => "Transferencia",
            PaymentMethod::Cash => "Efectivo",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::all().iter().copied().find(|m| m.as_str() == s.trim())
    }
}

/// Order lifecycle. Advances one step at a time; `Cancelled` is reachable
/// from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    OnTheWay,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn all() -> &'static [OrderStatus] {
        &[
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Preparing,
            OrderStatus::OnTheWay,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ]
    }

    /// The state "advance" moves to, if any.
    pub fn next(self) -> Option<OrderStatus> {
        match self {
            OrderStatus::Pending => Some(OrderStatus::Confirmed),
            OrderStatus::Confirmed => Some(OrderStatus::Preparing),
            OrderStatus::Preparing => Some(OrderStatus::OnTheWay),
            OrderStatus::OnTheWay => Some(OrderStatus::Delivered),
            OrderStatus::Delivered | OrderStatus::Cancelled => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    pub fn can_advance(self) -> bool {
        self.next().is_some()
    }

    pub fn can_cancel(self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if transitioning from self to `next` is valid.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        if next == OrderStatus::Cancelled {
            return !self.is_terminal();
        }
        self.next() == Some(next)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Preparing => "preparing",
            OrderStatus::OnTheWay => "on_the_way",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pendiente",
            OrderStatus::Confirmed => "Confirmado",
            OrderStatus::Preparing => "Preparando",
            OrderStatus::OnTheWay => "En camino",
            OrderStatus::Delivered => "Entregado",
            OrderStatus::Cancelled => "Cancelado",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::all().iter().copied().find(|st| st.as_str() == s.trim())
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rejected status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusError {
    pub from: OrderStatus,
    pub to: OrderStatus,
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot move order from {} to {}", self.from, self.to)
    }
}

impl std::error::Error for StatusError {}

/// Snapshot of a cart line at checkout. Detached from the live product so
/// later catalog edits leave history alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: Option<ProductId>,
    pub name: String,
    pub unit: String,
    pub image: String,
    /// Unit price in the order's currency.
    pub unit_price: Money,
    pub quantity: u32,
}

impl OrderLine {
    pub fn from_cart_item(item: &CartItem, currency: Currency) -> Self {
        Self {
            product_id: Some(item.product.id.clone()),
            name: item.product.name.clone(),
            unit: item.product.unit.clone(),
            image: item.product.image.clone(),
            unit_price: item.product.price(currency),
            quantity: item.quantity,
        }
    }

    pub fn line_total(&self) -> Money {
        self.unit_price.times(self.quantity)
    }
}

/// Customer, delivery and payment choices collected by checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDraft {
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_address: String,
    pub delivery_method: DeliveryMethod,
    /// Zone id; `None` for pickup.
    pub delivery_zone: Option<String>,
    pub delivery_fee: Money,
    pub currency: Currency,
    pub payment_method: PaymentMethod,
    pub notes: String,
}

/// A completed checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub items: Vec<OrderLine>,
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_address: String,
    pub delivery_method: DeliveryMethod,
    pub delivery_zone: Option<String>,
    pub delivery_fee: Money,
    pub subtotal: Money,
    pub total: Money,
    pub currency: Currency,
    pub payment_method: PaymentMethod,
    pub payment_verified: bool,
    pub status: OrderStatus,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Freeze a draft and its lines into a pending order. Subtotal and total
    /// are computed here so they always agree with the lines.
    pub fn place(
        id: OrderId,
        order_number: OrderNumber,
        draft: OrderDraft,
        items: Vec<OrderLine>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let subtotal: Money = items.iter().map(OrderLine::line_total).sum();
        let total = subtotal + draft.delivery_fee;
        Self {
            id,
            order_number,
            items,
            customer_name: draft.customer_name,
            customer_phone: draft.customer_phone,
            customer_address: draft.customer_address,
            delivery_method: draft.delivery_method,
            delivery_zone: draft.delivery_zone,
            delivery_fee: draft.delivery_fee,
            subtotal,
            total,
            currency: draft.currency,
            // Cash is settled on delivery, nothing to verify.
            payment_verified: draft.payment_method == PaymentMethod::Cash,
            payment_method: draft.payment_method,
            status: OrderStatus::Pending,
            notes: draft.notes,
            created_at,
        }
    }

    /// `total == subtotal + delivery_fee` and the subtotal matches the lines.
    pub fn is_consistent(&self) -> bool {
        let lines: Money = self.items.iter().map(OrderLine::line_total).sum();
        self.total == self.subtotal + self.delivery_fee && self.subtotal == lines
    }

    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|l| l.quantity).sum()
    }

    pub fn transition(&mut self, next: OrderStatus) -> Result<(), StatusError> {
        if !self.status.can_transition_to(next) {
            return Err(StatusError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Mark payment verified. Returns whether anything changed.
    pub fn verify_payment(&mut self) -> bool {
        let changed = !self.payment_verified;
        self.payment_verified = true;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(method: PaymentMethod, fee: Money) -> OrderDraft {
        OrderDraft {
            customer_name: "Ana".into(),
            customer_phone: "+53 5555 0000".into(),
            customer_address: "Calle 1".into(),
            delivery_method: DeliveryMethod::Delivery,
            delivery_zone: Some("z1".into()),
            delivery_fee: fee,
            currency: Currency::Cup,
            payment_method: method,
            notes: String::new(),
        }
    }

    fn line(price: u64, qty: u32) -> OrderLine {
        OrderLine {
            product_id: None,
            name: "x".into(),
            unit: "unidad".into(),
            image: "📦".into(),
            unit_price: Money(price),
            quantity: qty,
        }
    }

    #[test]
    fn placed_order_totals_add_up() {
        let order = Order::place(
            OrderId::from("1"),
            OrderNumber::from_millis(1_700_000_123_456),
            draft(PaymentMethod::Transfermovil, Money(15_000)),
            vec![line(25_000, 2), line(30_000, 1)],
            Utc::now(),
        );
        assert_eq!(order.subtotal, Money(80_000));
        assert_eq!(order.total, Money(95_000));
        assert!(order.is_consistent());
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(!order.payment_verified);
        assert_eq!(order.order_number.0, "MC-123456");
    }

    #[test]
    fn cash_orders_start_verified() {
        let order = Order::place(
            OrderId::from("1"),
            OrderNumber::from_millis(1),
            draft(PaymentMethod::Cash, Money::ZERO),
            vec![line(100, 1)],
            Utc::now(),
        );
        assert!(order.payment_verified);
        assert_eq!(order.order_number.0, "MC-000001");
    }

    #[test]
    fn test_status_transitions() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Preparing));
        assert!(Preparing.can_transition_to(OnTheWay));
        assert!(OnTheWay.can_transition_to(Delivered));
        assert!(!Pending.can_transition_to(Delivered));
        assert!(!Preparing.can_transition_to(Confirmed));

        for s in [Pending, Confirmed, Preparing, OnTheWay] {
            assert!(s.can_transition_to(Cancelled));
        }
        assert!(!Delivered.can_transition_to(Cancelled));
        assert!(Pending.can_advance() && Pending.can_cancel());
        assert!(!Delivered.can_advance() && !Cancelled.can_cancel());
        assert!(!Cancelled.can_transition_to(Delivered));
        assert!(!Cancelled.can_transition_to(Cancelled));
    }

    #[test]
    fn linear_chain_reaches_delivered() {
        let mut status = OrderStatus::Pending;
        let mut visited = vec![status];
        while let Some(next) = status.next() {
            status = next;
            visited.push(status);
        }
        assert_eq!(
            visited,
            vec![
                OrderStatus::Pending,
                OrderStatus::Confirmed,
                OrderStatus::Preparing,
                OrderStatus::OnTheWay,
                OrderStatus::Delivered,
            ]
        );
    }

    #[test]
    fn verify_payment_is_idempotent() {
        let mut order = Order::place(
            OrderId::from("1"),
            OrderNumber::from_millis(1),
            draft(PaymentMethod::Enzona, Money::ZERO),
            vec![line(100, 1)],
            Utc::now(),
        );
        assert!(order.verify_payment());
        assert!(!order.verify_payment());
        assert!(order.payment_verified);
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::OnTheWay).unwrap(),
            "\"on_the_way\""
        );
        assert_eq!(OrderStatus::parse("on_the_way"), Some(OrderStatus::OnTheWay));
        assert_eq!(PaymentMethod::parse("enzona"), Some(PaymentMethod::Enzona));
    }
}
