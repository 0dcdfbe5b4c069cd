use serde::{Deserialize, Serialize};

use crate::order::PaymentMethod;

/// An admin-managed payment channel offered at checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentInfo {
    pub id: String,
    pub name: String,
    pub method: PaymentMethod,
    /// Card or account number customers transfer to. Empty for cash.
    pub account: String,
    pub holder: String,
    pub instructions: String,
    pub is_active: bool,
}

impl PaymentInfo {
    /// Whether the customer has to transfer money themselves.
    pub fn needs_transfer(&self) -> bool {
        self.method != PaymentMethod::Cash
    }
}

/// Partial update of a payment channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentInfoPatch {
    pub name: Option<String>,
    pub method: Option<PaymentMethod>,
    pub account: Option<String>,
    pub holder: Option<String>,
    pub instructions: Option<String>,
    pub is_active: Option<bool>,
}

impl PaymentInfo {
    pub fn apply(&mut self, patch: &PaymentInfoPatch) {
        if let Some(v) = &patch.name {
            self.name = v.clone();
        }
        if let Some(v) = patch.method {
            self.method = v;
        }
        if let Some(v) = &patch.account {
            self.account = v.clone();
        }
        if let Some(v) = &patch.holder {
            self.holder = v.clone();
        }
        if let Some(v) = &patch.instructions {
            self.instructions = v.clone();
        }
        if let Some(v) = patch.is_active {
            self.is_active = v;
        }
    }
}
