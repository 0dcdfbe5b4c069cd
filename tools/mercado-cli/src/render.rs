//! Plain-text output.

use chrono::Local;

use mercado_client::checkout::{Confirmation, Quote};
use mercado_common::combo::Combo;
use mercado_common::currency::{format_amount, Currency};
use mercado_common::delivery::DeliveryZone;
use mercado_common::order::Order;
use mercado_common::payment::PaymentInfo;
use mercado_common::product::Product;
use mercado_common::report::{SalesSummary, StockAlerts};
use mercado_common::user::User;

pub fn product(p: &Product, currency: Currency) -> String {
    let mut flags = Vec::new();
    if p.is_out_of_stock() {
        flags.push("agotado");
    } else if p.is_low_stock() {
        flags.push("pocas unidades");
    }
    if p.is_featured {
        flags.push("destacado");
    }
    let flags = if flags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", flags.join(", "))
    };
    format!(
        "{} {:<36} {:>18}  stock {:>4} {}  ({}){flags}",
        p.image,
        p.name,
        format_amount(p.price(currency), currency),
        p.stock,
        p.unit,
        p.id,
    )
}

pub fn order(o: &Order) -> String {
    format!(
        "{}  {:<11} {:>18}  {:<20} {}{}",
        o.order_number,
        o.status.label(),
        format_amount(o.total, o.currency),
        o.customer_name,
        o.payment_method.label(),
        if o.payment_verified { "" } else { " (pago sin verificar)" },
    )
}

pub fn order_detail(o: &Order) -> String {
    let mut out = format!(
        "{} ({})\n  {} · {} · {}\n",
        o.order_number,
        o.id,
        o.customer_name,
        o.customer_phone,
        o.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
    );
    for line in &o.items {
        out.push_str(&format!(
            "  {} x{} {}\n",
            line.name,
            line.quantity,
            format_amount(line.line_total(), o.currency)
        ));
    }
    out.push_str(&format!(
        "  envío {} · total {} · {}",
        format_amount(o.delivery_fee, o.currency),
        format_amount(o.total, o.currency),
        o.status.label()
    ));
    out
}

pub fn combo(c: &Combo, currency: Currency) -> String {
    format!(
        "{} {:<16} {:>16}  ahorras {}\n    {}",
        c.image,
        c.name,
        format_amount(c.price(currency), currency),
        format_amount(c.savings(currency), currency),
        c.items.join(", "),
    )
}

pub fn zone(z: &DeliveryZone, currency: Currency) -> String {
    format!(
        "{:<5} {:<32} {:>16}  {}{}",
        z.id,
        z.name,
        format_amount(z.fee(currency), currency),
        z.estimated_time,
        if z.is_active { "" } else { " (inactiva)" },
    )
}

pub fn payment(p: &PaymentInfo) -> String {
    if p.needs_transfer() {
        format!("{:<5} {:<16} {} · {}", p.id, p.name, p.account, p.holder)
    } else {
        format!("{:<5} {}", p.id, p.name)
    }
}

pub fn user(u: &User) -> String {
    let contact = if u.phone.is_empty() { &u.email } else { &u.phone };
    format!("{} ({}) · {} · id {}", u.name, u.role, contact, u.id)
}

pub fn quote(q: &Quote) -> String {
    format!(
        "subtotal {}\nenvío    {}\ntotal    {}",
        format_amount(q.subtotal, q.currency),
        if q.is_free_delivery() {
            "gratis".to_string()
        } else {
            format_amount(q.delivery_fee, q.currency)
        },
        format_amount(q.total, q.currency),
    )
}

pub fn confirmation(c: &Confirmation) -> String {
    let mut out = format!(
        "Pedido {} confirmado. Total {} · {}",
        c.order_number,
        format_amount(c.total, c.currency),
        c.payment_method.label()
    );
    if let Some(p) = &c.transfer_to {
        out.push_str(&format!(
            "\nTransfiera a {} ({})\n{}",
            p.account, p.holder, p.instructions
        ));
    }
    out
}

pub fn sales(s: &SalesSummary) -> String {
    format!(
        "[{}]\nventas totales {}\nventas de hoy  {}\nentregados     {}\nticket medio   {}",
        s.currency,
        format_amount(s.total_sales, s.currency),
        format_amount(s.today_sales, s.currency),
        s.delivered,
        format_amount(s.average_ticket, s.currency),
    )
}

pub fn alerts(a: &StockAlerts<'_>) -> String {
    let section = |title: &str, products: &[&Product]| {
        let mut out = format!("{title}: {}", products.len());
        for p in products {
            out.push_str(&format!("\n  {} (stock {}, min {})", p.name, p.stock, p.min_stock));
        }
        out
    };
    [
        section("agotados", &a.out_of_stock),
        section("stock bajo", &a.low_stock),
        section("vencen pronto", &a.expiring_soon),
        section("vencidos", &a.expired),
    ]
    .join("\n")
}
