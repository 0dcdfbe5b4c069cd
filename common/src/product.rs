use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::currency::{Currency, Money};

/// Low-stock threshold used when a product does not set one.
pub const DEFAULT_MIN_STOCK: u32 = 5;

/// Days ahead that count as "expiring soon".
pub const EXPIRY_WARNING_DAYS: i64 = 7;

/// Opaque product identifier. Time-based when created offline, a UUID when
/// assigned by the remote backend.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub String);

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProductId {
    fn from(s: &str) -> Self {
        ProductId(s.to_string())
    }
}

/// Catalog section a product is listed under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    Alimentos,
    Cervezas,
    Refrescos,
    Aseo,
    Combos,
    /// Anything the backend knows about that this client does not.
    Other(String),
}

impl Category {
    pub fn all() -> &'static [Category] {
        &[
            Category::Alimentos,
            Category::Cervezas,
            Category::Refrescos,
            Category::Aseo,
            Category::Combos,
        ]
    }

    pub fn as_str(&self) -> &str {
        match self {
            Category::Alimentos => "alimentos",
            Category::Cervezas => "cervezas",
            Category::Refrescos => "refrescos",
            Category::Aseo => "aseo",
            Category::Combos => "combos",
            Category::Other(s) => s,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Category::Alimentos => "Alimentos",
            Category::Cervezas => "Cervezas",
            Category::Refrescos => "Refrescos",
            Category::Aseo => "Aseo",
            Category::Combos => "Combos",
            Category::Other(s) => s,
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Category::Alimentos => "🍚",
            Category::Cervezas => "🍺",
            Category::Refrescos => "🥤",
            Category::Aseo => "🧴",
            Category::Combos => "📦",
            Category::Other(_) => "🏷️",
        }
    }
}

impl From<String> for Category {
    fn from(s: String) -> Self {
        match s.trim().to_lowercase().as_str() {
            "alimentos" => Category::Alimentos,
            "cervezas" => Category::Cervezas,
            "refrescos" => Category::Refrescos,
            "aseo" => Category::Aseo,
            "combos" => Category::Combos,
            _ => Category::Other(s),
        }
    }
}

impl From<Category> for String {
    fn from(c: Category) -> Self {
        c.as_str().to_string()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sellable catalog item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub category: Category,
    pub price_cup: Money,
    pub price_mlc: Money,
    /// Free-form sale unit ("libra", "litro", ...).
    pub unit: String,
    pub stock: u32,
    pub min_stock: u32,
    /// Emoji glyph or image URL.
    pub image: String,
    pub is_featured: bool,
    /// Inactive products stay in history but are hidden from the catalog.
    pub is_active: bool,
    pub sales_count: u32,
    pub expiry_date: Option<NaiveDate>,
}

impl Product {
    /// A new active product with default unit, image and low-stock threshold.
    pub fn new(
        id: ProductId,
        name: impl Into<String>,
        category: Category,
        price_cup: Money,
        stock: u32,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            category,
            price_cup,
            price_mlc: Money::ZERO,
            unit: "unidad".into(),
            stock,
            min_stock: DEFAULT_MIN_STOCK,
            image: "📦".into(),
            is_featured: false,
            is_active: true,
            sales_count: 0,
            expiry_date: None,
        }
    }

    /// Unit price in the given currency.
    pub fn price(&self, currency: Currency) -> Money {
        match currency {
            Currency::Cup => self.price_cup,
            Currency::Mlc => self.price_mlc,
        }
    }

    pub fn is_out_of_stock(&self) -> bool {
        self.stock == 0
    }

    pub fn is_low_stock(&self) -> bool {
        self.stock > 0 && self.stock <= self.min_stock
    }

    pub fn days_until_expiry(&self, today: NaiveDate) -> Option<i64> {
        self.expiry_date.map(|d| (d - today).num_days())
    }

    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.days_until_expiry(today).is_some_and(|d| d < 0)
    }

    pub fn is_expiring_soon(&self, today: NaiveDate) -> bool {
        self.days_until_expiry(today)
            .is_some_and(|d| (0..=EXPIRY_WARNING_DAYS).contains(&d))
    }

    /// Case-insensitive match against name and description.
    pub fn matches_query(&self, query: &str) -> bool {
        let q = query.trim().to_lowercase();
        q.is_empty()
            || self.name.to_lowercase().contains(&q)
            || self.description.to_lowercase().contains(&q)
    }

    /// Merge the set fields of `patch` into this product.
    pub fn apply(&mut self, patch: &ProductPatch) {
        if let Some(v) = &patch.name {
            self.name = v.clone();
        }
        if let Some(v) = &patch.description {
            self.description = v.clone();
        }
        if let Some(v) = &patch.category {
            self.category = v.clone();
        }
        if let Some(v) = patch.price_cup {
            self.price_cup = v;
        }
        if let Some(v) = patch.price_mlc {
            self.price_mlc = v;
        }
        if let Some(v) = &patch.unit {
            self.unit = v.clone();
        }
        if let Some(v) = patch.stock {
            self.stock = v;
        }
        if let Some(v) = patch.min_stock {
            self.min_stock = v;
        }
        if let Some(v) = &patch.image {
            self.image = v.clone();
        }
        if let Some(v) = patch.is_featured {
            self.is_featured = v;
        }
        if let Some(v) = patch.is_active {
            self.is_active = v;
        }
        if let Some(v) = patch.sales_count {
            self.sales_count = v;
        }
        if let Some(v) = patch.expiry_date {
            self.expiry_date = Some(v);
        }
    }

    /// Add `delta` (possibly negative) to the stock. A result below zero is
    /// rejected and leaves the stock untouched.
    pub fn adjust_stock(&mut self, delta: i64) -> Result<u32, StockError> {
        let next = self.stock as i64 + delta;
        if next < 0 {
            return Err(StockError::Underflow {
                available: self.stock,
                requested: delta.unsigned_abs().min(u32::MAX as u64) as u32,
            });
        }
        self.stock = next.min(u32::MAX as i64) as u32;
        Ok(self.stock)
    }
}

/// A partial product update. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<Category>,
    pub price_cup: Option<Money>,
    pub price_mlc: Option<Money>,
    pub unit: Option<String>,
    pub stock: Option<u32>,
    pub min_stock: Option<u32>,
    pub image: Option<String>,
    pub is_featured: Option<bool>,
    pub is_active: Option<bool>,
    pub sales_count: Option<u32>,
    pub expiry_date: Option<NaiveDate>,
}

impl ProductPatch {
    pub fn stock(stock: u32) -> Self {
        Self {
            stock: Some(stock),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockError {
    Underflow { available: u32, requested: u32 },
}

impl fmt::Display for StockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Underflow {
                available,
                requested,
            } => write!(f, "insufficient stock: have {available}, need {requested}"),
        }
    }
}

impl std::error::Error for StockError {}
