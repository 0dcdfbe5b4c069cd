use serde::{Deserialize, Serialize};

use crate::currency::{Currency, Money};

/// A bundle of catalog goods sold at a reduced price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Combo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price_cup: Money,
    pub price_mlc: Money,
    pub savings_cup: Money,
    pub savings_mlc: Money,
    /// Display lines, e.g. "Arroz 5lb".
    pub items: Vec<String>,
    pub image: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl Combo {
    pub fn price(&self, currency: Currency) -> Money {
        match currency {
            Currency::Cup => self.price_cup,
            Currency::Mlc => self.price_mlc,
        }
    }

    pub fn savings(&self, currency: Currency) -> Money {
        match currency {
            Currency::Cup => self.savings_cup,
            Currency::Mlc => self.savings_mlc,
        }
    }

    /// What the items would cost bought one by one.
    pub fn regular_price(&self, currency: Currency) -> Money {
        self.price(currency) + self.savings(currency)
    }
}
