//! Wire shapes of the remote tables and their mapping to domain types.
//!
//! Amounts travel as decimals, ids as strings. Missing or null columns fall
//! back to the same defaults a freshly created product or order would have.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use mercado_common::currency::{Currency, Money};
use mercado_common::delivery::DeliveryZone;
use mercado_common::order::{
    DeliveryMethod, Order, OrderId, OrderLine, OrderNumber, OrderStatus, PaymentMethod,
};
use mercado_common::product::{Category, Product, ProductId, ProductPatch, DEFAULT_MIN_STOCK};
use mercado_common::user::{User, UserRole};

const DEFAULT_UNIT: &str = "unidad";
const DEFAULT_IMAGE: &str = "📦";
const DEFAULT_ESTIMATED_TIME: &str = "30-60 min";

/// Foreign keys on the remote side are UUIDs; locally minted ids are not and
/// must not be sent.
pub fn is_remote_id(id: &str) -> bool {
    uuid::Uuid::parse_str(id).is_ok()
}

fn count(value: Option<i64>, default: u32) -> u32 {
    value
        .map(|v| v.clamp(0, u32::MAX as i64) as u32)
        .unwrap_or(default)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// products
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category: String,
    #[serde(default)]
    pub price_cup: f64,
    #[serde(default)]
    pub price_mlc: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub stock: Option<i64>,
    #[serde(default)]
    pub min_stock: Option<i64>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub is_featured: Option<bool>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub sales_count: Option<i64>,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
}

impl ProductRow {
    /// Row for an insert. The remote assigns the id.
    pub fn for_insert(product: &Product) -> Self {
        Self {
            id: None,
            ..Self::from(product)
        }
    }
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: ProductId(row.id.unwrap_or_default()),
            name: row.name,
            description: row.description.unwrap_or_default(),
            category: Category::from(row.category),
            price_cup: Money::from_decimal(row.price_cup),
            price_mlc: Money::from_decimal(row.price_mlc.unwrap_or_default()),
            unit: non_blank(row.unit).unwrap_or_else(|| DEFAULT_UNIT.into()),
            stock: count(row.stock, 0),
            min_stock: count(row.min_stock, DEFAULT_MIN_STOCK),
            image: non_blank(row.image_url).unwrap_or_else(|| DEFAULT_IMAGE.into()),
            is_featured: row.is_featured.unwrap_or(false),
            is_active: row.is_active.unwrap_or(true),
            sales_count: count(row.sales_count, 0),
            expiry_date: row.expiry_date,
        }
    }
}

impl From<&Product> for ProductRow {
    fn from(p: &Product) -> Self {
        Self {
            id: Some(p.id.0.clone()),
            name: p.name.clone(),
            description: Some(p.description.clone()),
            category: p.category.as_str().to_string(),
            price_cup: p.price_cup.to_decimal(),
            price_mlc: Some(p.price_mlc.to_decimal()),
            unit: Some(p.unit.clone()),
            stock: Some(p.stock as i64),
            min_stock: Some(p.min_stock as i64),
            image_url: Some(p.image.clone()),
            is_featured: Some(p.is_featured),
            is_active: Some(p.is_active),
            sales_count: Some(p.sales_count as i64),
            expiry_date: p.expiry_date,
        }
    }
}

/// Partial product update. Only fields that are set are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProductRowPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_cup: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_mlc: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_stock: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_featured: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sales_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<NaiveDate>,
}

impl From<&ProductPatch> for ProductRowPatch {
    fn from(p: &ProductPatch) -> Self {
        Self {
            name: p.name.clone(),
            description: p.description.clone(),
            category: p.category.as_ref().map(|c| c.as_str().to_string()),
            price_cup: p.price_cup.map(Money::to_decimal),
            price_mlc: p.price_mlc.map(Money::to_decimal),
            unit: p.unit.clone(),
            stock: p.stock.map(i64::from),
            min_stock: p.min_stock.map(i64::from),
            image_url: p.image.clone(),
            is_featured: p.is_featured,
            is_active: p.is_active,
            sales_count: p.sales_count.map(i64::from),
            expiry_date: p.expiry_date,
        }
    }
}

impl ProductRowPatch {
    /// Apply to a stored row, as the remote would.
    pub fn apply_to(&self, row: &mut ProductRow) {
        macro_rules! set {
            ($($field:ident),*) => {
                $(if let Some(v) = &self.$field { row.$field = Some(v.clone()); })*
            };
        }
        if let Some(name) = &self.name {
            row.name = name.clone();
        }
        if let Some(category) = &self.category {
            row.category = category.clone();
        }
        if let Some(price) = self.price_cup {
            row.price_cup = price;
        }
        set!(description, price_mlc, unit, stock, min_stock, image_url, is_featured, is_active, sales_count, expiry_date);
    }
}

// ---------------------------------------------------------------------------
// orders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItemRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    pub product_name: String,
    pub quantity: i64,
    #[serde(default)]
    pub unit_price_cup: f64,
    #[serde(default)]
    pub total_price_cup: f64,
}

impl OrderItemRow {
    pub fn for_order(order_id: &str, line: &OrderLine) -> Self {
        Self {
            order_id: Some(order_id.to_string()),
            product_id: line
                .product_id
                .as_ref()
                .map(|id| id.0.clone())
                .filter(|id| is_remote_id(id)),
            product_name: line.name.clone(),
            quantity: line.quantity as i64,
            unit_price_cup: line.unit_price.to_decimal(),
            total_price_cup: line.line_total().to_decimal(),
        }
    }
}

impl From<OrderItemRow> for OrderLine {
    fn from(row: OrderItemRow) -> Self {
        OrderLine {
            product_id: row.product_id.map(ProductId),
            name: row.product_name,
            unit: DEFAULT_UNIT.into(),
            image: DEFAULT_IMAGE.into(),
            unit_price: Money::from_decimal(row.unit_price_cup),
            quantity: count(Some(row.quantity), 0),
        }
    }
}

/// An order as read back, with its embedded items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRow {
    pub id: String,
    pub order_number: String,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub customer_phone: String,
    #[serde(default)]
    pub customer_address: Option<String>,
    #[serde(default)]
    pub delivery_zone_id: Option<String>,
    #[serde(default)]
    pub delivery_method: Option<String>,
    #[serde(default)]
    pub delivery_fee_cup: Option<f64>,
    #[serde(default)]
    pub subtotal_cup: Option<f64>,
    #[serde(default)]
    pub total_cup: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub payment_verified: Option<bool>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub order_items: Vec<OrderItemRow>,
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        Order {
            id: OrderId(row.id),
            order_number: OrderNumber(row.order_number),
            items: row.order_items.into_iter().map(OrderLine::from).collect(),
            customer_name: row.customer_name,
            customer_phone: row.customer_phone,
            customer_address: row.customer_address.unwrap_or_default(),
            delivery_method: row
                .delivery_method
                .as_deref()
                .and_then(DeliveryMethod::parse)
                .unwrap_or(DeliveryMethod::Delivery),
            delivery_zone: non_blank(row.delivery_zone_id),
            delivery_fee: Money::from_decimal(row.delivery_fee_cup.unwrap_or_default()),
            subtotal: Money::from_decimal(row.subtotal_cup.unwrap_or_default()),
            total: Money::from_decimal(row.total_cup.unwrap_or_default()),
            currency: row
                .currency
                .as_deref()
                .and_then(Currency::parse)
                .unwrap_or(Currency::Cup),
            payment_method: row
                .payment_method
                .as_deref()
                .and_then(PaymentMethod::parse)
                .unwrap_or(PaymentMethod::Cash),
            payment_verified: row.payment_verified.unwrap_or(false),
            status: row
                .status
                .as_deref()
                .and_then(OrderStatus::parse)
                .unwrap_or(OrderStatus::Pending),
            notes: row.notes.unwrap_or_default(),
            created_at: row.created_at.unwrap_or_else(Utc::now),
        }
    }
}

/// Insert payload for an order header. Items go in a second call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrderRow {
    pub order_number: String,
    pub customer_id: Option<String>,
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_address: String,
    pub delivery_zone_id: Option<String>,
    pub delivery_method: String,
    pub delivery_fee_cup: f64,
    pub subtotal_cup: f64,
    pub total_cup: f64,
    pub currency: String,
    pub payment_method: String,
    pub payment_verified: bool,
    pub status: String,
    pub notes: String,
}

impl NewOrderRow {
    pub fn new(order: &Order, customer_id: Option<&str>) -> Self {
        Self {
            order_number: order.order_number.0.clone(),
            customer_id: customer_id.filter(|id| is_remote_id(id)).map(str::to_string),
            customer_name: order.customer_name.clone(),
            customer_phone: order.customer_phone.clone(),
            customer_address: order.customer_address.clone(),
            delivery_zone_id: order.delivery_zone.clone().filter(|z| is_remote_id(z)),
            delivery_method: order.delivery_method.as_str().to_string(),
            delivery_fee_cup: order.delivery_fee.to_decimal(),
            subtotal_cup: order.subtotal.to_decimal(),
            total_cup: order.total.to_decimal(),
            currency: order.currency.code().to_string(),
            payment_method: order.payment_method.as_str().to_string(),
            payment_verified: order.payment_verified,
            status: order.status.as_str().to_string(),
            notes: order.notes.clone(),
        }
    }

    /// The row the remote would hold after inserting this payload.
    pub fn into_row(self, id: String, created_at: DateTime<Utc>) -> OrderRow {
        OrderRow {
            id,
            order_number: self.order_number,
            customer_id: self.customer_id,
            customer_name: self.customer_name,
            customer_phone: self.customer_phone,
            customer_address: Some(self.customer_address),
            delivery_zone_id: self.delivery_zone_id,
            delivery_method: Some(self.delivery_method),
            delivery_fee_cup: Some(self.delivery_fee_cup),
            subtotal_cup: Some(self.subtotal_cup),
            total_cup: Some(self.total_cup),
            currency: Some(self.currency),
            payment_method: Some(self.payment_method),
            payment_verified: Some(self.payment_verified),
            status: Some(self.status),
            notes: Some(self.notes),
            created_at: Some(created_at),
            order_items: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// delivery zones
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneRow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub fee_cup: Option<f64>,
    #[serde(default)]
    pub fee_mlc: Option<f64>,
    #[serde(default)]
    pub estimated_time: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl From<ZoneRow> for DeliveryZone {
    fn from(row: ZoneRow) -> Self {
        DeliveryZone {
            id: row.id,
            name: row.name,
            fee_cup: Money::from_decimal(row.fee_cup.unwrap_or_default()),
            fee_mlc: Money::from_decimal(row.fee_mlc.unwrap_or_default()),
            estimated_time: non_blank(row.estimated_time)
                .unwrap_or_else(|| DEFAULT_ESTIMATED_TIME.into()),
            is_active: row.is_active.unwrap_or(true),
        }
    }
}

impl From<&DeliveryZone> for ZoneRow {
    fn from(z: &DeliveryZone) -> Self {
        Self {
            id: z.id.clone(),
            name: z.name.clone(),
            fee_cup: Some(z.fee_cup.to_decimal()),
            fee_mlc: Some(z.fee_mlc.to_decimal()),
            estimated_time: Some(z.estimated_time.clone()),
            is_active: Some(z.is_active),
        }
    }
}

// ---------------------------------------------------------------------------
// profiles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub is_frequent_customer: Option<bool>,
    #[serde(default)]
    pub total_orders: Option<i64>,
    #[serde(default)]
    pub total_spent: Option<f64>,
}

impl From<ProfileRow> for User {
    fn from(row: ProfileRow) -> Self {
        User {
            id: row.id,
            name: row.name,
            phone: row.phone.unwrap_or_default(),
            email: row.email.unwrap_or_default(),
            role: row
                .role
                .as_deref()
                .and_then(UserRole::parse)
                .unwrap_or(UserRole::Client),
            is_frequent: row.is_frequent_customer.unwrap_or(false),
            total_orders: count(row.total_orders, 0),
            total_spent: Money::from_decimal(row.total_spent.unwrap_or_default()),
        }
    }
}

impl From<&User> for ProfileRow {
    fn from(u: &User) -> Self {
        Self {
            id: u.id.clone(),
            name: u.name.clone(),
            phone: Some(u.phone.clone()),
            email: Some(u.email.clone()),
            role: Some(u.role.as_str().to_string()),
            is_frequent_customer: Some(u.is_frequent),
            total_orders: Some(u.total_orders as i64),
            total_spent: Some(u.total_spent.to_decimal()),
        }
    }
}

/// Partial profile update.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}
