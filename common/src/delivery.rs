use serde::{Deserialize, Serialize};

use crate::currency::{Currency, Money};
use crate::order::DeliveryMethod;

/// A delivery area with a flat fee per currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryZone {
    pub id: String,
    pub name: String,
    pub fee_cup: Money,
    pub fee_mlc: Money,
    /// Display window, e.g. "25-40 min".
    pub estimated_time: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl DeliveryZone {
    pub fn fee(&self, currency: Currency) -> Money {
        match currency {
            Currency::Cup => self.fee_cup,
            Currency::Mlc => self.fee_mlc,
        }
    }
}

/// Delivery fee for a checkout. Pickup is free, as is any subtotal at or over
/// the currency's threshold; otherwise the zone's fee applies (zero when no
/// zone has been chosen yet).
pub fn delivery_fee(
    method: DeliveryMethod,
    zone: Option<&DeliveryZone>,
    subtotal: Money,
    currency: Currency,
) -> Money {
    if method == DeliveryMethod::Pickup || subtotal >= currency.free_delivery_threshold() {
        return Money::ZERO;
    }
    zone.map(|z| z.fee(currency)).unwrap_or(Money::ZERO)
}
