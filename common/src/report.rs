//! Back-office views over products and orders: sales figures, best sellers,
//! stock alerts and a CSV export.

use chrono::{DateTime, NaiveDate, Utc};

use crate::currency::{Currency, Money};
use crate::order::{Order, OrderStatus};
use crate::product::Product;

/// Figures over delivered orders placed in one currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SalesSummary {
    pub currency: Currency,
    pub total_sales: Money,
    pub today_sales: Money,
    pub delivered: u32,
    pub average_ticket: Money,
}

impl SalesSummary {
    pub fn compute(orders: &[Order], currency: Currency, today: NaiveDate) -> Self {
        let delivered: Vec<&Order> = orders
            .iter()
            .filter(|o| o.status == OrderStatus::Delivered && o.currency == currency)
            .collect();
        let total_sales: Money = delivered.iter().map(|o| o.total).sum();
        let today_sales: Money = delivered
            .iter()
            .filter(|o| o.created_at.date_naive() == today)
            .map(|o| o.total)
            .sum();
        let count = delivered.len() as u32;
        let average_ticket = if count == 0 {
            Money::ZERO
        } else {
            Money(total_sales.minor() / count as u64)
        };
        Self {
            currency,
            total_sales,
            today_sales,
            delivered: count,
            average_ticket,
        }
    }
}

/// The `n` best sellers by sales count, highest first.
pub fn top_products(products: &[Product], n: usize) -> Vec<&Product> {
    let mut sorted: Vec<&Product> = products.iter().collect();
    sorted.sort_by(|a, b| b.sales_count.cmp(&a.sales_count));
    sorted.truncate(n);
    sorted
}

/// Products needing attention.
#[derive(Debug, Clone, Default)]
pub struct StockAlerts<'a> {
    pub out_of_stock: Vec<&'a Product>,
    pub low_stock: Vec<&'a Product>,
    pub expiring_soon: Vec<&'a Product>,
    pub expired: Vec<&'a Product>,
}

impl<'a> StockAlerts<'a> {
    /// Stock alerts only consider active products; expiry alerts consider all.
    pub fn collect(products: &'a [Product], today: NaiveDate) -> Self {
        let mut alerts = StockAlerts::default();
        for p in products {
            if p.is_active && p.is_out_of_stock() {
                alerts.out_of_stock.push(p);
            }
            if p.is_active && p.is_low_stock() {
                alerts.low_stock.push(p);
            }
            if p.is_expiring_soon(today) {
                alerts.expiring_soon.push(p);
            }
            if p.is_expired(today) {
                alerts.expired.push(p);
            }
        }
        alerts
    }

    pub fn total(&self) -> usize {
        self.out_of_stock.len() + self.low_stock.len() + self.expiring_soon.len() + self.expired.len()
    }
}

pub const CSV_HEADER: &str = "Pedido,Cliente,Teléfono,Total,Moneda,Estado,Pago,Fecha";

/// Orders as CSV, one row per order, header first.
pub fn orders_csv(orders: &[Order]) -> String {
    let mut out = String::from(CSV_HEADER);
    for o in orders {
        out.push('\n');
        let row = [
            o.order_number.0.clone(),
            o.customer_name.clone(),
            o.customer_phone.clone(),
            o.total.to_string(),
            o.currency.code().to_string(),
            o.status.as_str().to_string(),
            o.payment_method.as_str().to_string(),
            format_date(o.created_at),
        ];
        let cells: Vec<String> = row.iter().map(|c| csv_cell(c)).collect();
        out.push_str(&cells.join(","));
    }
    out
}

fn format_date(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d").to_string()
}

fn csv_cell(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
