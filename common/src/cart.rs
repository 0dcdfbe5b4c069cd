use serde::{Deserialize, Serialize};

use crate::currency::{Currency, Money};
use crate::product::{Product, ProductId};

/// One cart line. Quantity is at least 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub product: Product,
    pub quantity: u32,
}

impl CartItem {
    pub fn line_total(&self, currency: Currency) -> Money {
        self.product.price(currency).times(self.quantity)
    }
}

/// Shopping cart: at most one line per product, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    items: Vec<CartItem>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &ProductId) -> Option<&CartItem> {
        self.items.iter().find(|i| i.product.id == *id)
    }

    /// Add one unit of `product`. Returns `false` (and changes nothing) when
    /// the product is sold out or the line already holds the whole stock.
    pub fn add(&mut self, product: &Product) -> bool {
        if let Some(line) = self.items.iter_mut().find(|i| i.product.id == product.id) {
            if line.quantity >= product.stock {
                return false;
            }
            line.quantity += 1;
            return true;
        }
        if product.stock == 0 {
            return false;
        }
        self.items.push(CartItem {
            product: product.clone(),
            quantity: 1,
        });
        true
    }

    pub fn remove(&mut self, id: &ProductId) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i.product.id != *id);
        self.items.len() != before
    }

    /// Set a line's quantity; zero removes it. Not re-checked against stock.
    pub fn set_quantity(&mut self, id: &ProductId, quantity: u32) -> bool {
        if quantity == 0 {
            return self.remove(id);
        }
        match self.items.iter_mut().find(|i| i.product.id == *id) {
            Some(line) => {
                line.quantity = quantity;
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Sum of line totals in `currency`. Always recomputed.
    pub fn total(&self, currency: Currency) -> Money {
        self.items.iter().map(|i| i.line_total(currency)).sum()
    }

    /// Total number of units, not lines.
    pub fn count(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }
}
